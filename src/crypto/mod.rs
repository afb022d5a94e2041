//! Crypto module for browser password decryption
//!
//! Supports Chromium-based browsers on Windows (DPAPI + AES-256-GCM).

pub mod chromium;
pub mod envelope;
pub mod protector;

pub use chromium::{decrypt_envelope, AeadStrategy, DecryptStrategy, Decryptor, LegacyProtectedStrategy};
pub use envelope::{CipherEnvelope, FormatTag, MIN_ENVELOPE_LEN};
pub use protector::{unwrap_master_key, DpapiProtector, KeyProtector, MasterKey};
