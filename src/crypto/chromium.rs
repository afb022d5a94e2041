//! Chromium password decryption for Windows profiles
//!
//! Two record formats can share one `Login Data` store:
//! - `v10`/`v11` envelopes: AES-256-GCM under the master key from `Local State`
//! - older records: the whole value is a DPAPI blob, unwrapped per record
//!
//! [`Decryptor`] tries an ordered list of strategies and stops at the first
//! success, so callers never need to know which format a record uses.

use crate::crypto::envelope::CipherEnvelope;
use crate::crypto::protector::{KeyProtector, MasterKey};
use crate::error::DecryptError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use std::sync::Arc;
use tracing::{debug, trace};
use zeroize::Zeroize;

/// One way of turning a stored value into plaintext
pub trait DecryptStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decrypt(&self, raw: &[u8]) -> Result<String, DecryptError>;
}

/// AES-256-GCM over the versioned envelope
pub fn decrypt_envelope(envelope: &CipherEnvelope<'_>, key: &[u8]) -> Result<String, DecryptError> {
    // A key of the wrong size can never verify a tag
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| DecryptError::AuthenticationFailed)?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(envelope.nonce), envelope.sealed)
        .map_err(|_| DecryptError::AuthenticationFailed)?;

    decode_utf8(plaintext)
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String, DecryptError> {
    String::from_utf8(bytes).map_err(|e| {
        let reason = e.utf8_error().to_string();
        e.into_bytes().zeroize();
        DecryptError::DecodeFailed(reason)
    })
}

/// Versioned AEAD records keyed by the master key
pub struct AeadStrategy {
    key: Arc<MasterKey>,
}

impl AeadStrategy {
    pub fn new(key: Arc<MasterKey>) -> Self {
        Self { key }
    }
}

impl DecryptStrategy for AeadStrategy {
    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn decrypt(&self, raw: &[u8]) -> Result<String, DecryptError> {
        let envelope = CipherEnvelope::parse(raw)?;
        if !envelope.tag.known() {
            debug!("Unrecognised envelope tag {}, trying anyway", envelope.tag);
        }
        decrypt_envelope(&envelope, self.key.as_bytes())
    }
}

/// Pre-envelope records: the entire value is an OS-protected blob
pub struct LegacyProtectedStrategy {
    protector: Arc<dyn KeyProtector>,
}

impl LegacyProtectedStrategy {
    pub fn new(protector: Arc<dyn KeyProtector>) -> Self {
        Self { protector }
    }
}

impl DecryptStrategy for LegacyProtectedStrategy {
    fn name(&self) -> &'static str {
        "legacy-protected"
    }

    fn decrypt(&self, raw: &[u8]) -> Result<String, DecryptError> {
        let plaintext = self
            .protector
            .unprotect(raw)
            .map_err(|e| DecryptError::Unprotect(e.to_string()))?;
        decode_utf8(plaintext)
    }
}

/// Ordered list of strategies applied to each record
pub struct Decryptor {
    strategies: Vec<Box<dyn DecryptStrategy>>,
}

impl Decryptor {
    /// AEAD first, then the legacy per-record blob
    pub fn new(key: Arc<MasterKey>, protector: Arc<dyn KeyProtector>) -> Self {
        Self::with_strategies(vec![
            Box::new(AeadStrategy::new(key)),
            Box::new(LegacyProtectedStrategy::new(protector)),
        ])
    }

    pub fn aead_only(key: Arc<MasterKey>) -> Self {
        Self::with_strategies(vec![Box::new(AeadStrategy::new(key))])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn DecryptStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Decrypt one stored value.
    ///
    /// Each strategy runs at most once. With more than one strategy
    /// configured, exhausting them all yields `LegacyFallbackFailed`.
    pub fn decrypt(&self, raw: &[u8]) -> Result<String, DecryptError> {
        let mut last_err = None;

        for strategy in &self.strategies {
            match strategy.decrypt(raw) {
                Ok(plaintext) => {
                    trace!("Decrypted {} bytes with {}", raw.len(), strategy.name());
                    return Ok(plaintext);
                }
                Err(e) if e.allows_fallback() => {
                    debug!("{} strategy failed: {}", strategy.name(), e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_err {
            Some(e) if self.strategies.len() == 1 => Err(e),
            Some(e) => Err(DecryptError::LegacyFallbackFailed {
                last: e.to_string(),
            }),
            None => Err(DecryptError::LegacyFallbackFailed {
                last: "no strategies configured".to_string(),
            }),
        }
    }
}
