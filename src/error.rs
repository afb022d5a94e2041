//! Error types for key recovery and per-record decryption

use std::time::Duration;
use thiserror::Error;

/// Marker written in place of a secret when legacy fallback is exhausted
pub const DECRYPTION_ERROR: &str = "DECRYPTION_ERROR";

/// Failure reported by the OS key-protection service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtectorError {
    #[error("OS key protection rejected the blob: {0}")]
    Rejected(String),

    #[error("OS key protection is not supported on this platform")]
    Unsupported,
}

/// Failure to recover the master key. Fatal to the whole batch.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Local State file not found: {0}")]
    LocalStateMissing(String),

    #[error("Failed to read Local State: {0}")]
    LocalStateUnreadable(#[source] std::io::Error),

    #[error("Failed to parse Local State: {0}")]
    LocalStateInvalid(#[source] serde_json::Error),

    #[error("Local State has no string field at `{0}`")]
    FieldMissing(String),

    #[error("Encrypted key is not valid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),

    #[error("Encrypted key is {0} bytes, shorter than its 5-byte prefix")]
    BlobTooShort(usize),

    #[error(transparent)]
    Protector(#[from] ProtectorError),
}

/// Failure of one record. Never aborts the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("Master key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Malformed envelope: {len} bytes, need at least {min}")]
    MalformedEnvelope { len: usize, min: usize },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("OS unwrap of the record failed: {0}")]
    Unprotect(String),

    #[error("Plaintext is not valid UTF-8: {0}")]
    DecodeFailed(String),

    #[error("All decryption strategies failed (last: {last})")]
    LegacyFallbackFailed { last: String },

    #[error("Decryption timed out after {0:?}")]
    TimedOut(Duration),
}

impl DecryptError {
    /// Report marker written instead of the secret
    pub fn marker(&self) -> &'static str {
        match self {
            DecryptError::KeyUnavailable(_) => "KEY_UNAVAILABLE",
            DecryptError::MalformedEnvelope { .. } => "MALFORMED_ENVELOPE",
            DecryptError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            DecryptError::Unprotect(_) => "UNPROTECT_FAILED",
            DecryptError::DecodeFailed(_) => "DECODE_FAILED",
            DecryptError::LegacyFallbackFailed { .. } => DECRYPTION_ERROR,
            DecryptError::TimedOut(_) => "TIMED_OUT",
        }
    }

    /// Whether a later strategy may still recover the record.
    ///
    /// A malformed envelope or a UTF-8 failure after a verified tag settles
    /// the outcome; only a rejected ciphertext is handed to the next strategy.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            DecryptError::AuthenticationFailed | DecryptError::Unprotect(_)
        )
    }
}

impl From<KeyError> for DecryptError {
    fn from(err: KeyError) -> Self {
        DecryptError::KeyUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        let err = DecryptError::LegacyFallbackFailed {
            last: "rejected".to_string(),
        };
        assert_eq!(err.marker(), DECRYPTION_ERROR);
        assert_eq!(
            DecryptError::MalformedEnvelope { len: 30, min: 31 }.marker(),
            "MALFORMED_ENVELOPE"
        );
        assert_eq!(
            DecryptError::TimedOut(Duration::from_millis(5)).marker(),
            "TIMED_OUT"
        );
    }

    #[test]
    fn test_fallback_policy() {
        assert!(DecryptError::AuthenticationFailed.allows_fallback());
        assert!(DecryptError::Unprotect("rejected".into()).allows_fallback());
        assert!(!DecryptError::KeyUnavailable("no key".into()).allows_fallback());
        assert!(!DecryptError::DecodeFailed("bad".into()).allows_fallback());
        assert!(!DecryptError::MalformedEnvelope { len: 0, min: 31 }.allows_fallback());
    }

    #[test]
    fn test_key_error_maps_to_key_unavailable() {
        let err: DecryptError = KeyError::FieldMissing("os_crypt.encrypted_key".into()).into();
        assert!(matches!(err, DecryptError::KeyUnavailable(_)));
    }
}
