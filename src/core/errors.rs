//! GK-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, GateError>;

/// Top-level error type for the session gatekeeper.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("[GK-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[GK-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[GK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[GK-2001] setting '{name}' is not present in the store")]
    MissingSetting { name: String },

    #[error("[GK-2002] setting '{name}' holds non-integer value {value:?}")]
    SettingNotInteger { name: String, value: String },

    #[error("[GK-2003] setting '{name}' holds {value}, outside the recognized domain")]
    SettingOutOfRange { name: String, value: i64 },

    #[error("[GK-3001] request field '{field}' is required but absent")]
    MissingField { field: &'static str },

    #[error("[GK-3002] request field '{field}' is malformed: {details}")]
    MalformedField {
        field: &'static str,
        details: String,
    },

    #[error("[GK-4001] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[GK-4002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[GK-4101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[GK-4900] runtime failure: {details}")]
    Runtime { details: String },
}

impl GateError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "GK-1001",
            Self::MissingConfig { .. } => "GK-1002",
            Self::ConfigParse { .. } => "GK-1003",
            Self::MissingSetting { .. } => "GK-2001",
            Self::SettingNotInteger { .. } => "GK-2002",
            Self::SettingOutOfRange { .. } => "GK-2003",
            Self::MissingField { .. } => "GK-3001",
            Self::MalformedField { .. } => "GK-3002",
            Self::Sql { .. } => "GK-4001",
            Self::Io { .. } => "GK-4002",
            Self::Serialization { .. } => "GK-4101",
            Self::Runtime { .. } => "GK-4900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Configuration and caller-contract faults need operator or caller
    /// intervention; store and IO failures can be transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Sql { .. } | Self::Io { .. } | Self::Runtime { .. })
    }

    /// Whether the failure is a configuration fault (bad or absent setting).
    ///
    /// The session layer treats these as "deny and page an operator" rather
    /// than "deny and log."
    #[must_use]
    pub const fn is_config_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::MissingSetting { .. }
                | Self::SettingNotInteger { .. }
                | Self::SettingOutOfRange { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for GateError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for GateError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GateError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
