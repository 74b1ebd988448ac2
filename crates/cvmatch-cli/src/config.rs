//! CLI configuration loaded from environment variables.
//!
//! Everything has a default so `cvmatch` works with zero configuration.

use std::path::PathBuf;

use cvmatch_shared::constants::DEFAULT_DB_KEY;
use cvmatch_store::FsBlobStore;

/// Fallback when the platform has no data directory (e.g. no home dir).
const FALLBACK_DATA_DIR: &str = "./cvmatch-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Directory holding the persisted database image.
    /// Env: `CVMATCH_DATA_DIR`
    /// Default: platform data directory
    pub data_dir: PathBuf,

    /// Blob-store key the image is stored under.
    /// Env: `CVMATCH_DB_KEY`
    /// Default: `dbFile`
    pub db_key: String,

    /// Where `export` writes when `--out` is not given.
    /// Env: `CVMATCH_EXPORT_DIR`
    /// Default: current directory
    pub export_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: FsBlobStore::default_dir()
                .unwrap_or_else(|_| PathBuf::from(FALLBACK_DATA_DIR)),
            db_key: DEFAULT_DB_KEY.to_string(),
            export_dir: PathBuf::from("."),
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("CVMATCH_DATA_DIR") {
            if dir.trim().is_empty() {
                tracing::warn!("Empty CVMATCH_DATA_DIR, using default");
            } else {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(key) = lookup("CVMATCH_DB_KEY") {
            if FsBlobStore::validate_key(&key).is_ok() {
                config.db_key = key;
            } else {
                tracing::warn!(value = %key, "Invalid CVMATCH_DB_KEY, using default");
            }
        }

        if let Some(dir) = lookup("CVMATCH_EXPORT_DIR") {
            if dir.trim().is_empty() {
                tracing::warn!("Empty CVMATCH_EXPORT_DIR, using default");
            } else {
                config.export_dir = PathBuf::from(dir);
            }
        }

        config
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> CliConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]);
        assert_eq!(config.db_key, "dbFile");
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert!(!config.data_dir.as_os_str().is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let config = load(&[
            ("CVMATCH_DATA_DIR", "/srv/cvmatch"),
            ("CVMATCH_DB_KEY", "hiring-2024.db"),
            ("CVMATCH_EXPORT_DIR", "/tmp/exports"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/srv/cvmatch"));
        assert_eq!(config.db_key, "hiring-2024.db");
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("CVMATCH_DATA_DIR", "   "),
            ("CVMATCH_DB_KEY", "../outside"),
            ("CVMATCH_EXPORT_DIR", ""),
        ]);
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_flag_beats_env() {
        let config = load(&[("CVMATCH_DATA_DIR", "/srv/cvmatch")])
            .with_data_dir(Some(PathBuf::from("/mnt/data")));
        assert_eq!(config.data_dir, PathBuf::from("/mnt/data"));

        let unchanged = load(&[("CVMATCH_DATA_DIR", "/srv/cvmatch")]).with_data_dir(None);
        assert_eq!(unchanged.data_dir, PathBuf::from("/srv/cvmatch"));
    }

    #[test]
    fn test_reserved_db_key_ignored() {
        for key in [".write-check", "dbFile.tmp", "a/b", ""] {
            assert_eq!(load(&[("CVMATCH_DB_KEY", key)]).db_key, DEFAULT_DB_KEY, "key {key:?}");
        }
        assert_eq!(load(&[("CVMATCH_DB_KEY", "team-db")]).db_key, "team-db");
    }
}
