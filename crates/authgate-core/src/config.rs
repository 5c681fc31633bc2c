//! Security configuration
//!
//! Loaded once by the host at bridge initialization. Every field has a default,
//! so an empty JSON object is a valid configuration.

use crate::policy::AuthPolicy;
use crate::trust::TamperChecks;
use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment override for the state database location
pub const STATE_DB_PATH_ENV: &str = "AUTHGATE_STATE_DB_PATH";

/// File name of the state database inside the data directory
pub const STATE_DB_FILE_NAME: &str = "security_state.db";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Policy for unlock and the background timeout
    pub policy: AuthPolicy,
    /// Device tamper checks
    pub tamper_checks: TamperChecks,
    /// State database location (`None` uses the platform data directory)
    pub state_db_path: Option<PathBuf>,
}

impl SecurityConfig {
    /// Parse JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::PolicyMisconfigured(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Persistence(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Validate nested settings
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()
    }

    /// Where the state database lives.
    ///
    /// Order: explicit path, `AUTHGATE_STATE_DB_PATH`, platform data directory,
    /// current directory.
    pub fn resolve_state_db_path(&self) -> PathBuf {
        if let Some(path) = &self.state_db_path {
            return path.clone();
        }
        if let Ok(path) = std::env::var(STATE_DB_PATH_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        ProjectDirs::from("com", "AuthGate", "authgate")
            .map(|dirs| dirs.data_local_dir().join(STATE_DB_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(STATE_DB_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_json_is_default() {
        let config = SecurityConfig::from_json("{}").unwrap();
        assert_eq!(config, SecurityConfig::default());
        assert_eq!(config.policy.reuse_window_secs, 300);
        assert!(!config.tamper_checks.simulator);
    }

    #[test]
    fn test_partial_json() {
        let config = SecurityConfig::from_json(
            r#"{
                "policy": { "reuse_window_secs": 30, "fallback_label": "Enter PIN" },
                "tamper_checks": { "simulator": true },
                "state_db_path": "/tmp/state.db"
            }"#,
        )
        .unwrap();

        assert_eq!(config.policy.reuse_window_secs, 30);
        assert_eq!(config.policy.fallback_label.as_deref(), Some("Enter PIN"));
        assert!(config.policy.allow_passcode_fallback);
        assert!(config.tamper_checks.simulator);
        assert!(!config.tamper_checks.artifact_paths.is_empty());
        assert_eq!(config.resolve_state_db_path(), PathBuf::from("/tmp/state.db"));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let err = SecurityConfig::from_json(r#"{ "policy": { "reuse_window_secs": 3600 } }"#)
            .unwrap_err();
        assert!(matches!(err, Error::PolicyMisconfigured(_)));
        assert!(SecurityConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "policy": {{ "timeout_secs": 15 }} }}"#).unwrap();

        let config = SecurityConfig::load(file.path()).unwrap();
        assert_eq!(config.policy.timeout_secs, Some(15));

        let missing = SecurityConfig::load(Path::new("/nonexistent/authgate.json"));
        assert!(matches!(missing, Err(Error::Persistence(_))));
    }
}
