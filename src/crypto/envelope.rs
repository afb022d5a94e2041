//! Versioned ciphertext envelope
//!
//! Layout: `[3 bytes: format tag][12 bytes: nonce][ciphertext][16 bytes: GCM tag]`

use crate::error::DecryptError;
use std::fmt;

pub const FORMAT_TAG_LEN: usize = 3;
pub const NONCE_LEN: usize = 12;
pub const AUTH_TAG_LEN: usize = 16;

/// Shortest byte string that can hold a tag, a nonce and a GCM tag
pub const MIN_ENVELOPE_LEN: usize = FORMAT_TAG_LEN + NONCE_LEN + AUTH_TAG_LEN;

/// Tags Chromium is known to write for AES-GCM records
const KNOWN_TAGS: [&[u8; 3]; 2] = [b"v10", b"v11"];

/// The 3-byte version prefix. Never validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTag(pub [u8; FORMAT_TAG_LEN]);

impl FormatTag {
    pub fn known(&self) -> bool {
        KNOWN_TAGS.iter().any(|t| **t == self.0)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
        }
    }
}

/// Borrowed view of a parsed envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherEnvelope<'a> {
    pub tag: FormatTag,
    pub nonce: &'a [u8; NONCE_LEN],
    /// Ciphertext with the authentication tag still appended
    pub sealed: &'a [u8],
}

impl<'a> CipherEnvelope<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self, DecryptError> {
        if raw.len() < MIN_ENVELOPE_LEN {
            return Err(DecryptError::MalformedEnvelope {
                len: raw.len(),
                min: MIN_ENVELOPE_LEN,
            });
        }

        let (tag, rest) = raw.split_at(FORMAT_TAG_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        Ok(CipherEnvelope {
            tag: FormatTag([tag[0], tag[1], tag[2]]),
            nonce: nonce
                .try_into()
                .map_err(|_| DecryptError::MalformedEnvelope {
                    len: raw.len(),
                    min: MIN_ENVELOPE_LEN,
                })?,
            sealed,
        })
    }

    /// Ciphertext without the trailing tag
    pub fn payload(&self) -> &'a [u8] {
        &self.sealed[..self.sealed.len() - AUTH_TAG_LEN]
    }

    pub fn auth_tag(&self) -> &'a [u8] {
        &self.sealed[self.sealed.len() - AUTH_TAG_LEN..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_boundary() {
        let err = CipherEnvelope::parse(&[0u8; 30]).unwrap_err();
        assert_eq!(err, DecryptError::MalformedEnvelope { len: 30, min: 31 });

        let env = CipherEnvelope::parse(&[0u8; 31]).unwrap();
        assert!(env.payload().is_empty());
        assert_eq!(env.auth_tag().len(), AUTH_TAG_LEN);
    }

    #[test]
    fn test_empty_is_malformed() {
        assert!(matches!(
            CipherEnvelope::parse(&[]),
            Err(DecryptError::MalformedEnvelope { len: 0, .. })
        ));
    }

    #[test]
    fn test_field_offsets() {
        let mut raw = b"v10".to_vec();
        raw.extend(1u8..=12);
        raw.extend_from_slice(b"secret");
        raw.extend_from_slice(&[0xEE; 16]);

        let env = CipherEnvelope::parse(&raw).unwrap();
        assert_eq!(env.tag, FormatTag(*b"v10"));
        assert_eq!(env.nonce[0], 1);
        assert_eq!(env.nonce[11], 12);
        assert_eq!(env.payload(), b"secret");
        assert_eq!(env.auth_tag(), &[0xEE; 16]);
    }

    #[test]
    fn test_any_tag_is_accepted() {
        let mut raw = vec![0xFF, 0x00, 0x7F];
        raw.extend_from_slice(&[0u8; 28]);
        let env = CipherEnvelope::parse(&raw).unwrap();
        assert!(!env.tag.known());
        assert_eq!(env.tag.to_string(), "0xff007f");

        assert!(FormatTag(*b"v11").known());
        assert_eq!(FormatTag(*b"v20").to_string(), "v20");
    }
}
