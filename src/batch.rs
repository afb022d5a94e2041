//! Batch decryption of login records
//!
//! The master key is unwrapped once per batch. Every record is then
//! decrypted on its own; a failing record turns into an error entry and
//! never stops the rest.

use crate::crypto::{unwrap_master_key, Decryptor, KeyProtector, MasterKey};
use crate::data_types::password::{chrome_time, Record, ReportEntry, Secret};
use crate::error::{DecryptError, KeyError};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Most decrypt workers alive at once, stalled ones included
const MAX_LIVE_WORKERS: usize = 32;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Decrypt records on the rayon pool
    pub parallel: bool,
    /// Give up on a single record after this long
    pub record_timeout: Option<Duration>,
    /// Try the per-record OS unwrap when AES-GCM fails
    pub legacy_fallback: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            record_timeout: None,
            legacy_fallback: true,
        }
    }
}

/// Counters for one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub with_ciphertext: usize,
    pub decrypted: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub entries: Vec<ReportEntry>,
    pub summary: BatchSummary,
}

pub struct BatchProcessor {
    protector: Arc<dyn KeyProtector>,
    options: BatchOptions,
    progress: Option<ProgressBar>,
}

impl BatchProcessor {
    pub fn new(protector: Arc<dyn KeyProtector>) -> Self {
        Self {
            protector,
            options: BatchOptions::default(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Unwrap `key_blob` once, then decrypt every record.
    ///
    /// A key failure is returned before any record is touched.
    pub fn process(&self, key_blob: &[u8], records: &[Record]) -> Result<BatchReport, KeyError> {
        let key = unwrap_master_key(self.protector.as_ref(), key_blob)?;
        info!("🔑 Master key recovered");
        Ok(self.process_with_key(key, records))
    }

    /// Decrypt every record with an already recovered key
    pub fn process_with_key(&self, key: MasterKey, records: &[Record]) -> BatchReport {
        let key = Arc::new(key);
        let decryptor = Arc::new(if self.options.legacy_fallback {
            Decryptor::new(key, Arc::clone(&self.protector))
        } else {
            Decryptor::aead_only(key)
        });
        debug!("Decryption strategies: {:?}", decryptor.strategy_names());
        let watchdog = Watchdog::new(MAX_LIVE_WORKERS);

        let handle = |record: &Record| -> Option<ReportEntry> {
            let entry = self.process_record(&decryptor, &watchdog, record);
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
            entry
        };

        let results: Vec<Option<ReportEntry>> = if self.options.parallel {
            records.par_iter().map(handle).collect()
        } else {
            records.iter().map(handle).collect()
        };

        let mut summary = BatchSummary {
            total: records.len(),
            with_ciphertext: records
                .iter()
                .filter(|r| !r.encrypted_password.is_empty())
                .count(),
            ..Default::default()
        };

        let entries: Vec<ReportEntry> = results.into_iter().flatten().collect();
        summary.skipped = records.len() - entries.len();
        summary.decrypted = entries.iter().filter(|e| e.secret.is_plaintext()).count();
        summary.failed = entries.len() - summary.decrypted;

        info!(
            "📊 {} records, {} with ciphertext, {} decrypted, {} failed, {} skipped",
            summary.total, summary.with_ciphertext, summary.decrypted, summary.failed, summary.skipped
        );

        BatchReport { entries, summary }
    }

    fn process_record(
        &self,
        decryptor: &Arc<Decryptor>,
        watchdog: &Watchdog,
        record: &Record,
    ) -> Option<ReportEntry> {
        if record.is_blank() {
            return None;
        }

        let secret = match watchdog.run(
            decryptor,
            &record.encrypted_password,
            self.options.record_timeout,
        ) {
            Ok(plaintext) => Secret::Plaintext(plaintext),
            Err(e) => {
                warn!("⚠️  {} ({}): {}", record.origin_url, record.username, e);
                Secret::Error(e.marker().to_string())
            }
        };

        Some(ReportEntry {
            origin: record.origin_url.clone(),
            username: record.username.clone(),
            secret,
            created_at: chrome_time(record.date_created),
            last_used_at: chrome_time(record.date_last_used),
        })
    }
}

/// Runs records on worker threads when a timeout is set.
///
/// A record that overruns is reported as timed out; its worker is left to
/// finish on its own and its result is discarded. Workers still running
/// count against `limit`; once it is reached, records are decrypted inline
/// without a timeout until a worker exits.
struct Watchdog {
    live: Arc<AtomicUsize>,
    limit: usize,
}

/// Releases a worker slot when the worker ends
struct WorkerSlot(Arc<AtomicUsize>);

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Watchdog {
    fn new(limit: usize) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn run(
        &self,
        decryptor: &Arc<Decryptor>,
        raw: &[u8],
        timeout: Option<Duration>,
    ) -> Result<String, DecryptError> {
        let Some(limit) = timeout else {
            return decryptor.decrypt(raw);
        };

        let reserved = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            warn!(
                "{} decrypt workers still running, decrypting inline without a timeout",
                self.limit
            );
            return decryptor.decrypt(raw);
        }

        let slot = WorkerSlot(Arc::clone(&self.live));
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(decryptor);
        let owned = raw.to_vec();

        let spawned = thread::Builder::new()
            .name("record-decrypt".to_string())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(worker.decrypt(&owned));
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn decrypt worker, decrypting inline: {}", e);
            return decryptor.decrypt(raw);
        }

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DecryptError::TimedOut(limit)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DecryptError::LegacyFallbackFailed {
                last: "decrypt worker exited without a result".to_string(),
            }),
        }
    }
}
