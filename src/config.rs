//! Run configuration assembled from CLI arguments

use crate::batch::BatchOptions;
use crate::local_state::DEFAULT_KEY_PATH;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PROFILE: &str = "Default";

/// Locations of the two files a run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    pub local_state: PathBuf,
    pub login_db: PathBuf,
}

impl ProfilePaths {
    /// Derive paths from a `User Data` directory; explicit paths win.
    ///
    /// `<User Data>/Local State` and `<User Data>/<profile>/Login Data`.
    pub fn resolve(
        user_data_dir: Option<&Path>,
        profile: &str,
        local_state: Option<PathBuf>,
        login_db: Option<PathBuf>,
    ) -> Result<Self> {
        let local_state = match (local_state, user_data_dir) {
            (Some(p), _) => p,
            (None, Some(dir)) => dir.join("Local State"),
            (None, None) => bail!("Pass --user-data-dir or --local-state"),
        };
        let login_db = match (login_db, user_data_dir) {
            (Some(p), _) => p,
            (None, Some(dir)) => dir.join(profile).join("Login Data"),
            (None, None) => bail!("Pass --user-data-dir or --login-db"),
        };

        debug!("Local State: {:?}, Login Data: {:?}", local_state, login_db);
        Ok(Self {
            local_state,
            login_db,
        })
    }
}

pub struct ExportConfig {
    pub paths: ProfilePaths,
    pub key_path: String,
    pub batch: BatchOptions,
}

impl ExportConfig {
    pub fn new(paths: ProfilePaths) -> Self {
        Self {
            paths,
            key_path: DEFAULT_KEY_PATH.to_string(),
            batch: BatchOptions::default(),
        }
    }

    pub fn key_path(mut self, key_path: Option<String>) -> Self {
        if let Some(path) = key_path {
            self.key_path = path;
        }
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.batch.parallel = parallel;
        self
    }

    pub fn record_timeout_ms(mut self, millis: Option<u64>) -> Self {
        self.batch.record_timeout = millis.filter(|ms| *ms > 0).map(Duration::from_millis);
        self
    }

    pub fn legacy_fallback(mut self, enabled: bool) -> Self {
        self.batch.legacy_fallback = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_from_user_data_dir() {
        let paths = ProfilePaths::resolve(Some(Path::new("/ud")), "Profile 1", None, None).unwrap();
        assert_eq!(paths.local_state, PathBuf::from("/ud/Local State"));
        assert_eq!(paths.login_db, PathBuf::from("/ud/Profile 1/Login Data"));
    }

    #[test]
    fn test_explicit_paths_win() {
        let paths = ProfilePaths::resolve(
            Some(Path::new("/ud")),
            DEFAULT_PROFILE,
            Some(PathBuf::from("/elsewhere/ls.json")),
            None,
        )
        .unwrap();
        assert_eq!(paths.local_state, PathBuf::from("/elsewhere/ls.json"));
        assert_eq!(paths.login_db, PathBuf::from("/ud/Default/Login Data"));
    }

    #[test]
    fn test_missing_inputs() {
        assert!(ProfilePaths::resolve(None, DEFAULT_PROFILE, None, Some(PathBuf::from("db"))).is_err());
    }

    #[test]
    fn test_builder() {
        let paths = ProfilePaths::resolve(Some(Path::new("/ud")), DEFAULT_PROFILE, None, None).unwrap();
        let config = ExportConfig::new(paths)
            .key_path(None)
            .parallel(true)
            .record_timeout_ms(Some(0))
            .legacy_fallback(false);
        assert_eq!(config.key_path, DEFAULT_KEY_PATH);
        assert!(config.batch.parallel);
        assert_eq!(config.batch.record_timeout, None);
        assert!(!config.batch.legacy_fallback);
    }
}
