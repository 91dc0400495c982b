//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{GateError, Result};

/// Full gatekeeper configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub store: StoreConfig,
    pub policy: PolicyConfig,
    pub audit: AuditConfig,
    pub paths: PathsConfig,
}

/// SQLite store tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Seed missing override flags to their enforcing value on open.
    pub seed_default_settings: bool,
}

/// Policy knobs for the ban/registration engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Registrations sharing one hardware serial before the serial is
    /// considered abusive. The flagging threshold is strictly greater than
    /// this count.
    pub abuse_registration_limit: i64,
}

/// Decision audit-log behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Bounded channel capacity between session threads and the log writer.
    pub channel_capacity: usize,
    /// Rotate the JSONL file once it grows past this size.
    pub max_log_bytes: u64,
}

/// Filesystem paths used by the gatekeeper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub sqlite_db: PathBuf,
    pub jsonl_log: PathBuf,
    pub fallback_log: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            seed_default_settings: true,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            abuse_registration_limit: 2,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 1_024,
            max_log_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[GK-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir
            .join(".config")
            .join("gatekeeper")
            .join("config.toml");
        let data = home_dir.join(".local").join("share").join("gatekeeper");
        Self {
            config_file: cfg,
            sqlite_db: data.join("gatekeeper.sqlite3"),
            jsonl_log: data.join("decisions.jsonl"),
            fallback_log: PathBuf::from("/dev/shm/gatekeeper-decisions.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| GateError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(GateError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_u64("GK_STORE_BUSY_TIMEOUT_MS", &mut self.store.busy_timeout_ms)?;
        set_env_bool(
            "GK_STORE_SEED_DEFAULT_SETTINGS",
            &mut self.store.seed_default_settings,
        )?;

        set_env_i64(
            "GK_POLICY_ABUSE_REGISTRATION_LIMIT",
            &mut self.policy.abuse_registration_limit,
        )?;

        set_env_bool("GK_AUDIT_ENABLED", &mut self.audit.enabled)?;
        set_env_usize("GK_AUDIT_CHANNEL_CAPACITY", &mut self.audit.channel_capacity)?;
        set_env_u64("GK_AUDIT_MAX_LOG_BYTES", &mut self.audit.max_log_bytes)?;

        set_env_path("GK_PATHS_SQLITE_DB", &mut self.paths.sqlite_db);
        set_env_path("GK_PATHS_JSONL_LOG", &mut self.paths.jsonl_log);
        set_env_path("GK_PATHS_FALLBACK_LOG", &mut self.paths.fallback_log);

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.policy.abuse_registration_limit < 1 {
            return Err(GateError::InvalidConfig {
                details: format!(
                    "policy.abuse_registration_limit must be >= 1, got {}",
                    self.policy.abuse_registration_limit
                ),
            });
        }
        if self.audit.channel_capacity == 0 {
            return Err(GateError::InvalidConfig {
                details: "audit.channel_capacity must be >= 1".to_string(),
            });
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(GateError::InvalidConfig {
                details: "store.busy_timeout_ms must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

// ──────────────────── env parsing helpers ────────────────────

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn set_env_u64(name: &str, target: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *target = raw.trim().parse().map_err(|_| GateError::InvalidConfig {
            details: format!("{name} must be an unsigned integer, got {raw:?}"),
        })?;
    }
    Ok(())
}

fn set_env_i64(name: &str, target: &mut i64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *target = raw.trim().parse().map_err(|_| GateError::InvalidConfig {
            details: format!("{name} must be an integer, got {raw:?}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, target: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *target = raw.trim().parse().map_err(|_| GateError::InvalidConfig {
            details: format!("{name} must be an unsigned integer, got {raw:?}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, target: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *target = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(GateError::InvalidConfig {
                    details: format!("{name} must be a boolean, got {raw:?}"),
                });
            }
        };
    }
    Ok(())
}

fn set_env_path(name: &str, target: &mut PathBuf) {
    if let Some(raw) = env_var(name) {
        *target = PathBuf::from(raw);
    }
}
