//! Decrypts the saved passwords of a Chromium profile for the current user.
//!
//! The master key in `Local State` is unwrapped once through the OS
//! key-protection service, then each `Login Data` record is decrypted on
//! its own with AES-256-GCM, falling back to per-record OS unwrapping for
//! records that predate the versioned format.

pub mod batch;
pub mod config;
pub mod crypto;
pub mod data_types;
pub mod db_safety;
pub mod error;
pub mod export;
pub mod local_state;
pub mod progress;

pub use batch::{BatchOptions, BatchProcessor, BatchReport, BatchSummary};
pub use error::{DecryptError, KeyError, ProtectorError, DECRYPTION_ERROR};
