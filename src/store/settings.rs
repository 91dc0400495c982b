//! Settings read contract: named integer settings and the two-valued
//! override flags parsed from them.
//!
//! Flags are parsed once into explicit enums. A value outside the recognized
//! `{0, 1}` domain is a configuration fault and surfaces as an error; it is
//! never silently treated as enforce or bypass.

use std::fmt;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::core::errors::{GateError, Result};
use crate::store::db::GateStore;

// ──────────────────── recognized setting names ────────────────────

/// Bypass flag for access-point ban enforcement.
pub const AP_ALLOWBANNED: &str = "ap_allowbanned";
/// Bypass flag for IP-address ban enforcement.
pub const IP_ALLOWBANNED: &str = "ip_allowbanned";
/// Bypass flag for console-hardware ban enforcement.
pub const MAC_ALLOWBANNED: &str = "mac_allowbanned";
/// Bypass flag for profile ban enforcement.
pub const PROFILE_ALLOWBANNED: &str = "profile_allowbanned";
/// When set, newly registered consoles start disabled pending approval.
pub const CONSOLE_MANUALACTIVATION: &str = "console_manualactivation";

/// Override flags seeded to their enforcing value when absent.
pub const DEFAULT_SETTINGS: &[(&str, i64)] = &[
    (AP_ALLOWBANNED, 0),
    (IP_ALLOWBANNED, 0),
    (MAC_ALLOWBANNED, 0),
    (PROFILE_ALLOWBANNED, 0),
    (CONSOLE_MANUALACTIVATION, 0),
];

// ──────────────────── parsed flag domains ────────────────────

/// Per-category enforcement override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideFlag {
    /// `0`: the associated check runs against stored records.
    Enforce,
    /// `1`: the associated check is disabled entirely.
    Bypass,
}

impl OverrideFlag {
    /// Parse a raw setting value, rejecting anything outside `{0, 1}`.
    pub fn from_setting(name: &str, value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Enforce),
            1 => Ok(Self::Bypass),
            other => Err(GateError::SettingOutOfRange {
                name: name.to_string(),
                value: other,
            }),
        }
    }

    /// Whether this flag disables the associated check.
    #[must_use]
    pub const fn bypasses(self) -> bool {
        matches!(self, Self::Bypass)
    }
}

impl fmt::Display for OverrideFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforce => write!(f, "enforce"),
            Self::Bypass => write!(f, "bypass"),
        }
    }
}

/// Console enrollment policy parsed from `console_manualactivation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// `0`: new consoles are enabled on registration.
    Immediate,
    /// `1`: new consoles start disabled pending operator approval.
    Manual,
}

impl ActivationPolicy {
    /// Parse a raw setting value, rejecting anything outside `{0, 1}`.
    pub fn from_setting(name: &str, value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Immediate),
            1 => Ok(Self::Manual),
            other => Err(GateError::SettingOutOfRange {
                name: name.to_string(),
                value: other,
            }),
        }
    }
}

// ──────────────────── transaction-scoped reads ────────────────────
//
// Components read settings inside their own open transaction so the flag and
// the records it governs are observed atomically.

/// Read a setting as an integer, coercing stored text.
pub(crate) fn setting_value(conn: &Connection, name: &str) -> Result<i64> {
    let raw: Option<Value> = conn
        .query_row(
            "SELECT value FROM settings WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        None => Err(GateError::MissingSetting {
            name: name.to_string(),
        }),
        Some(Value::Integer(value)) => Ok(value),
        Some(Value::Text(text)) => {
            text.trim()
                .parse::<i64>()
                .map_err(|_| GateError::SettingNotInteger {
                    name: name.to_string(),
                    value: text,
                })
        }
        Some(other) => Err(GateError::SettingNotInteger {
            name: name.to_string(),
            value: format!("{other:?}"),
        }),
    }
}

pub(crate) fn override_flag(conn: &Connection, name: &str) -> Result<OverrideFlag> {
    OverrideFlag::from_setting(name, setting_value(conn, name)?)
}

pub(crate) fn activation_policy(conn: &Connection) -> Result<ActivationPolicy> {
    ActivationPolicy::from_setting(
        CONSOLE_MANUALACTIVATION,
        setting_value(conn, CONSOLE_MANUALACTIVATION)?,
    )
}

// ──────────────────── public component ────────────────────

/// Read-only lookup of named settings. Pure reads, no side effects.
pub struct SettingsStore {
    store: Arc<GateStore>,
}

impl SettingsStore {
    /// Wrap a shared store handle.
    #[must_use]
    pub fn new(store: Arc<GateStore>) -> Self {
        Self { store }
    }

    /// Read a setting as an integer.
    pub fn get(&self, name: &str) -> Result<i64> {
        self.store.read_tx(|tx| setting_value(tx, name))
    }

    /// Read and parse an override flag.
    pub fn override_flag(&self, name: &str) -> Result<OverrideFlag> {
        self.store.read_tx(|tx| override_flag(tx, name))
    }

    /// Read and parse the console activation policy.
    pub fn activation_policy(&self) -> Result<ActivationPolicy> {
        self.store.read_tx(|tx| activation_policy(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;

    fn store() -> Arc<GateStore> {
        Arc::new(GateStore::open_in_memory(&StoreConfig::default()).unwrap())
    }

    #[test]
    fn get_reads_seeded_defaults() {
        let settings = SettingsStore::new(store());
        assert_eq!(settings.get(AP_ALLOWBANNED).unwrap(), 0);
        assert_eq!(settings.get(CONSOLE_MANUALACTIVATION).unwrap(), 0);
    }

    #[test]
    fn get_missing_setting_errors() {
        let settings = SettingsStore::new(store());
        let err = settings.get("no_such_setting").unwrap_err();
        assert_eq!(err.code(), "GK-2001");
    }

    #[test]
    fn get_coerces_stored_text() {
        let store = store();
        store.set_setting(IP_ALLOWBANNED, " 1 ").unwrap();
        let settings = SettingsStore::new(store);
        assert_eq!(settings.get(IP_ALLOWBANNED).unwrap(), 1);
        assert_eq!(
            settings.override_flag(IP_ALLOWBANNED).unwrap(),
            OverrideFlag::Bypass
        );
    }

    #[test]
    fn get_rejects_non_integer_text() {
        let store = store();
        store.set_setting(IP_ALLOWBANNED, "banana").unwrap();
        let settings = SettingsStore::new(store);
        let err = settings.get(IP_ALLOWBANNED).unwrap_err();
        assert_eq!(err.code(), "GK-2002");
    }

    #[test]
    fn override_flag_domain() {
        assert_eq!(
            OverrideFlag::from_setting("x", 0).unwrap(),
            OverrideFlag::Enforce
        );
        assert_eq!(
            OverrideFlag::from_setting("x", 1).unwrap(),
            OverrideFlag::Bypass
        );
        for bad in [-1, 2, 7, i64::MAX] {
            let err = OverrideFlag::from_setting("x", bad).unwrap_err();
            assert_eq!(err.code(), "GK-2003");
        }
    }

    #[test]
    fn activation_policy_domain() {
        assert_eq!(
            ActivationPolicy::from_setting("x", 0).unwrap(),
            ActivationPolicy::Immediate
        );
        assert_eq!(
            ActivationPolicy::from_setting("x", 1).unwrap(),
            ActivationPolicy::Manual
        );
        assert!(ActivationPolicy::from_setting("x", 3).is_err());
    }

    #[test]
    fn override_flag_out_of_range_from_store() {
        let store = store();
        store.set_setting(PROFILE_ALLOWBANNED, "2").unwrap();
        let settings = SettingsStore::new(store);
        let err = settings.override_flag(PROFILE_ALLOWBANNED).unwrap_err();
        assert_eq!(err.code(), "GK-2003");
    }
}
