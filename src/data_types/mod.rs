//! Data types module for browser data extraction
//!
//! Supports: passwords

pub mod password;

pub use password::{read_chromium_logins, write_report, Record, ReportEntry, ReportFormat, Secret};
