//! Master key recovery through the OS key-protection service
//!
//! Chromium on Windows stores its AES-256 key in `Local State` as
//! `base64("DPAPI" + CryptProtectData(key))`. The key is bound to the
//! current user's logon credentials, so only DPAPI in that session can
//! unwrap it.

use crate::error::{KeyError, ProtectorError};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the format prefix in front of the protected key
pub const KEY_PREFIX_LEN: usize = 5;

/// OS service that reverses user-scoped data protection
pub trait KeyProtector: Send + Sync {
    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, ProtectorError>;
}

/// Raw symmetric key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MasterKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED; {}])", self.0.len())
    }
}

/// Strip the 5-byte prefix and unwrap the rest through `protector`.
///
/// The prefix is dropped without looking at it.
pub fn unwrap_master_key(
    protector: &dyn KeyProtector,
    blob: &[u8],
) -> Result<MasterKey, KeyError> {
    if blob.len() < KEY_PREFIX_LEN {
        return Err(KeyError::BlobTooShort(blob.len()));
    }

    let key = protector.unprotect(&blob[KEY_PREFIX_LEN..])?;
    debug!("Unwrapped master key ({} bytes)", key.len());

    Ok(MasterKey::from_bytes(key))
}

/// DPAPI (`CryptUnprotectData`) for the current user
#[derive(Debug, Default, Clone, Copy)]
pub struct DpapiProtector;

#[cfg(windows)]
impl KeyProtector for DpapiProtector {
    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, ProtectorError> {
        use std::ptr;
        use windows_sys::Win32::Foundation::LocalFree;
        use windows_sys::Win32::Security::Cryptography::{CryptUnprotectData, CRYPT_INTEGER_BLOB};

        let len = u32::try_from(blob.len())
            .map_err(|_| ProtectorError::Rejected(format!("blob too large: {} bytes", blob.len())))?;

        let input = CRYPT_INTEGER_BLOB {
            cbData: len,
            pbData: blob.as_ptr() as *mut u8,
        };
        let mut output = CRYPT_INTEGER_BLOB {
            cbData: 0,
            pbData: ptr::null_mut(),
        };

        // SAFETY: `input` points at `blob`, which outlives the call; DPAPI
        // only reads it. `output` is allocated by DPAPI and released below.
        let ok = unsafe {
            CryptUnprotectData(
                &input,
                ptr::null_mut(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                &mut output,
            )
        };

        if ok == 0 {
            return Err(ProtectorError::Rejected(
                std::io::Error::last_os_error().to_string(),
            ));
        }

        // SAFETY: on success `output.pbData` holds `output.cbData` bytes.
        let plain = unsafe {
            let bytes = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();
            std::ptr::write_bytes(output.pbData, 0, output.cbData as usize);
            LocalFree(output.pbData as _);
            bytes
        };

        Ok(plain)
    }
}

#[cfg(not(windows))]
impl KeyProtector for DpapiProtector {
    fn unprotect(&self, _blob: &[u8]) -> Result<Vec<u8>, ProtectorError> {
        Err(ProtectorError::Unsupported)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test double: "unprotects" by stripping a known marker
    pub struct MarkerProtector {
        pub marker: Vec<u8>,
        pub calls: AtomicUsize,
    }

    impl MarkerProtector {
        pub fn new(marker: &[u8]) -> Self {
            Self {
                marker: marker.to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl KeyProtector for MarkerProtector {
        fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, ProtectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            blob.strip_prefix(self.marker.as_slice())
                .map(|rest| rest.to_vec())
                .ok_or_else(|| ProtectorError::Rejected("not protected for this user".into()))
        }
    }

    #[test]
    fn test_prefix_is_stripped_unconditionally() {
        let protector = MarkerProtector::new(b"PROT");
        let mut blob = b"XXXXX".to_vec();
        blob.extend_from_slice(b"PROT");
        blob.extend_from_slice(&[7u8; 32]);

        let key = unwrap_master_key(&protector, &blob).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_rejected_blob() {
        let protector = MarkerProtector::new(b"PROT");
        let err = unwrap_master_key(&protector, b"DPAPIgarbage").unwrap_err();
        assert!(matches!(err, KeyError::Protector(ProtectorError::Rejected(_))));
    }

    #[test]
    fn test_blob_shorter_than_prefix() {
        let protector = MarkerProtector::new(b"");
        let err = unwrap_master_key(&protector, b"DPA").unwrap_err();
        assert!(matches!(err, KeyError::BlobTooShort(3)));
        assert_eq!(protector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = MasterKey::from_bytes(vec![0xAB; 32]);
        let shown = format!("{:?}", key);
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_dpapi_unsupported_off_windows() {
        assert_eq!(
            DpapiProtector.unprotect(b"anything"),
            Err(ProtectorError::Unsupported)
        );
    }
}
