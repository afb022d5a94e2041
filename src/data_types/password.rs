//! Password records and report entries
//!
//! Reads the `logins` table of a Chromium `Login Data` database and writes
//! decrypted entries as text, CSV or JSON.

use crate::db_safety::DbSnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Chromium's "unset" timestamp: one day past the 1601 epoch
const CHROME_TIME_UNSET: i64 = 86_400_000_000;

/// One row of the `logins` table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub origin_url: String,
    pub action_url: String,
    pub username: String,
    pub encrypted_password: Vec<u8>,
    pub date_created: i64,
    pub date_last_used: i64,
}

impl Record {
    /// Rows with no username and no ciphertext carry nothing to report
    pub fn is_blank(&self) -> bool {
        self.username.is_empty() && self.encrypted_password.is_empty()
    }
}

/// Decrypted secret or the marker for why it could not be recovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Secret {
    Plaintext(String),
    Error(String),
}

impl Secret {
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Secret::Plaintext(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Secret::Plaintext(s) | Secret::Error(s) => s,
        }
    }
}

/// One line of the output report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub origin: String,
    pub username: String,
    pub secret: Secret,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Convert a Chromium timestamp (µs since 1601-01-01 UTC)
pub fn chrome_time(micros: i64) -> Option<DateTime<Utc>> {
    if micros == 0 || micros == CHROME_TIME_UNSET {
        return None;
    }
    let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).single()?;
    epoch.checked_add_signed(Duration::microseconds(micros))
}

/// Read all logins from a snapshot of `db_path`, oldest first
pub fn read_chromium_logins(db_path: &Path) -> Result<Vec<Record>> {
    let snapshot = DbSnapshot::create(db_path)?;
    let conn = snapshot.open()?;

    let mut stmt = conn
        .prepare(
            "SELECT origin_url, action_url, username_value, password_value, date_created, date_last_used
             FROM logins ORDER BY date_created, rowid",
        )
        .context("Login Data has no readable logins table")?;

    let rows = stmt.query_map([], |row| {
        Ok(Record {
            origin_url: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            action_url: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            username: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            encrypted_password: row.get::<_, Option<Vec<u8>>>(3)?.unwrap_or_default(),
            date_created: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
            date_last_used: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        })
    })?;

    let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    debug!("Read {} login rows from {:?}", records.len(), db_path);

    Ok(records)
}

/// Output format for [`write_report`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Csv,
    Json,
}

/// Write entries to `output_path` in the chosen format
pub fn write_report(entries: &[ReportEntry], output_path: &Path, format: ReportFormat) -> Result<()> {
    let mut file = std::fs::File::create(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;

    match format {
        ReportFormat::Text => write_text(entries, &mut file)?,
        ReportFormat::Csv => write_csv(entries, &mut file)?,
        ReportFormat::Json => serde_json::to_writer_pretty(&mut file, entries)?,
    }

    file.flush()?;
    Ok(())
}

/// `URL:/User:/Pass:` blocks separated by a dashed rule
pub fn write_text<W: Write>(entries: &[ReportEntry], out: &mut W) -> Result<()> {
    let rule = "-".repeat(20);
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "URL: {}", entry.origin)?;
        writeln!(out, "User: {}", entry.username)?;
        writeln!(out, "Pass: {}", entry.secret.as_str())?;
        write!(out, "{}", rule)?;
    }
    Ok(())
}

pub fn write_csv<W: Write>(entries: &[ReportEntry], out: &mut W) -> Result<()> {
    writeln!(out, "url,username,password,status,created_at")?;

    for entry in entries {
        let status = if entry.secret.is_plaintext() { "ok" } else { "error" };
        writeln!(
            out,
            "\"{}\",\"{}\",\"{}\",{},{}",
            entry.origin.replace('"', "\"\""),
            entry.username.replace('"', "\"\""),
            entry.secret.as_str().replace('"', "\"\""),
            status,
            entry.created_at.map(|t| t.to_rfc3339()).unwrap_or_default()
        )?;
    }

    Ok(())
}
