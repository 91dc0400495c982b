//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use session_gatekeeper::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{GateError, Result};

// Store
pub use crate::store::db::GateStore;
pub use crate::store::settings::{ActivationPolicy, OverrideFlag, SettingsStore};

// Policy
pub use crate::policy::abuse::AbuseMonitor;
pub use crate::policy::allowlist::GameAllowlist;
pub use crate::policy::bans::{BanCategory, BanRecord, BanRegistry};
pub use crate::policy::consoles::{
    ConsolePlatform, ConsoleRecord, DeviceRegistry, RegistrationOutcome,
};
pub use crate::policy::facade::BanPolicyFacade;
pub use crate::policy::request::{SessionRequest, is_valid_hardware_address};

// Audit
pub use crate::audit::channel::{AuditLoggerHandle, spawn_logger};
pub use crate::audit::jsonl::{DecisionEntry, Operation, Verdict};
