//! `Local State` parsing
//!
//! Chromium keeps profile-wide settings in `<User Data>/Local State`.
//! The protected master key lives at `os_crypt.encrypted_key`.

use crate::error::KeyError;
use base64::Engine;
use std::path::Path;
use tracing::debug;

/// Default location of the protected key inside `Local State`
pub const DEFAULT_KEY_PATH: &str = "os_crypt.encrypted_key";

/// Read `Local State` and return the decoded, still-protected key blob
pub fn read_protected_key(local_state: &Path, key_path: &str) -> Result<Vec<u8>, KeyError> {
    if !local_state.exists() {
        return Err(KeyError::LocalStateMissing(local_state.display().to_string()));
    }

    let content = std::fs::read_to_string(local_state).map_err(KeyError::LocalStateUnreadable)?;
    debug!("Read {} bytes from {:?}", content.len(), local_state);

    protected_key_from_json(&content, key_path)
}

/// Extract the base64 key at a dotted `key_path` and decode it
pub fn protected_key_from_json(content: &str, key_path: &str) -> Result<Vec<u8>, KeyError> {
    let json: serde_json::Value =
        serde_json::from_str(content).map_err(KeyError::LocalStateInvalid)?;

    let encoded = key_path
        .split('.')
        .try_fold(&json, |node, segment| node.get(segment))
        .and_then(|v| v.as_str())
        .ok_or_else(|| KeyError::FieldMissing(key_path.to_string()))?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(KeyError::InvalidBase64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_nested_key() {
        let json = r#"{"os_crypt":{"encrypted_key":"RFBBUElrZXk="},"browser":{}}"#;
        let blob = protected_key_from_json(json, DEFAULT_KEY_PATH).unwrap();
        assert_eq!(blob, b"DPAPIkey");
    }

    #[test]
    fn test_missing_field() {
        let json = r#"{"os_crypt":{}}"#;
        assert!(matches!(
            protected_key_from_json(json, DEFAULT_KEY_PATH),
            Err(KeyError::FieldMissing(_))
        ));
    }

    #[test]
    fn test_non_string_field() {
        let json = r#"{"os_crypt":{"encrypted_key":42}}"#;
        assert!(matches!(
            protected_key_from_json(json, DEFAULT_KEY_PATH),
            Err(KeyError::FieldMissing(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            protected_key_from_json("{not json", DEFAULT_KEY_PATH),
            Err(KeyError::LocalStateInvalid(_))
        ));
    }

    #[test]
    fn test_invalid_base64() {
        let json = r#"{"os_crypt":{"encrypted_key":"***"}}"#;
        assert!(matches!(
            protected_key_from_json(json, DEFAULT_KEY_PATH),
            Err(KeyError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_custom_key_path() {
        let json = r#"{"custom":{"deep":{"key":"QUJDREVm"}}}"#;
        assert_eq!(protected_key_from_json(json, "custom.deep.key").unwrap(), b"ABCDEf");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_protected_key(&dir.path().join("Local State"), DEFAULT_KEY_PATH).unwrap_err();
        assert!(matches!(err, KeyError::LocalStateMissing(_)));
    }
}
