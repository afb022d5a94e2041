//! End-to-end runs over one browser profile

use crate::batch::{BatchProcessor, BatchReport};
use crate::config::ExportConfig;
use crate::crypto::{CipherEnvelope, KeyProtector};
use crate::data_types::password::{read_chromium_logins, Record};
use crate::local_state::read_protected_key;
use crate::progress;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Recover the master key and decrypt every saved login of the profile
pub fn decrypt_profile(
    config: &ExportConfig,
    protector: Arc<dyn KeyProtector>,
    show_progress: bool,
) -> Result<BatchReport> {
    let key_blob = read_protected_key(&config.paths.local_state, &config.key_path)
        .context("Master key unavailable")?;

    let records = read_chromium_logins(&config.paths.login_db)?;
    info!("📖 Read {} saved logins", records.len());

    let mut processor = BatchProcessor::new(protector).with_options(config.batch.clone());
    let pb = show_progress.then(|| progress::create_record_progress_bar(records.len() as u64, "Decrypting"));
    if let Some(pb) = &pb {
        processor = processor.with_progress(pb.clone());
    }

    let report = processor
        .process(&key_blob, &records)
        .context("Master key unavailable")?;

    if let Some(pb) = &pb {
        progress::finish_with_success(pb, &format!("{} decrypted", report.summary.decrypted));
    }

    Ok(report)
}

/// Envelope metadata for one stored login, no key required
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub origin: String,
    pub username: String,
    pub tag: Option<String>,
    pub ciphertext_len: usize,
}

impl From<&Record> for RecordInfo {
    fn from(record: &Record) -> Self {
        let tag = CipherEnvelope::parse(&record.encrypted_password)
            .ok()
            .map(|env| env.tag.to_string());
        Self {
            origin: record.origin_url.clone(),
            username: record.username.clone(),
            tag,
            ciphertext_len: record.encrypted_password.len(),
        }
    }
}

/// List stored logins with their envelope tags
pub fn inspect_logins(login_db: &Path) -> Result<Vec<RecordInfo>> {
    let records = read_chromium_logins(login_db)?;
    Ok(records.iter().map(RecordInfo::from).collect())
}
