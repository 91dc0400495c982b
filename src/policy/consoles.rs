//! Console enrollment: hardware registration and the manual-activation
//! policy.

use std::fmt;
use std::sync::Arc;

use rusqlite::params;
use serde::Serialize;

use crate::core::errors::Result;
use crate::store::db::GateStore;
use crate::store::settings::{self, ActivationPolicy};

// ──────────────────── records ────────────────────

/// Hardware platform a console registers as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolePlatform {
    /// Serial-carrying hardware.
    Wii,
    /// Everything else; registers without a serial number.
    Other,
}

impl ConsolePlatform {
    /// Platform discriminator as stored in the `consoles` table.
    #[must_use]
    pub const fn as_store_str(self) -> &'static str {
        match self {
            Self::Wii => "wii",
            Self::Other => "other",
        }
    }

    /// Parse a stored platform discriminator.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wii" => Some(Self::Wii),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ConsolePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_store_str())
    }
}

/// A registered console. Unique per `(mac_address, platform)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleRecord {
    /// 12-character hardware address.
    pub mac_address: String,
    /// Manufacturer serial, when the platform carries one.
    pub serial_number: Option<String>,
    /// Registering platform.
    pub platform: ConsolePlatform,
    /// `false` means pending manual activation, not banned.
    pub enabled: bool,
    /// Set by the abuse monitor; never cleared by this engine.
    pub abuse_flagged: bool,
}

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// New record inserted, enabled immediately.
    Activated,
    /// New record inserted, disabled pending operator approval.
    PendingActivation,
    /// A record for this `(mac_address, platform)` already existed; nothing
    /// was written.
    AlreadyRegistered,
}

impl RegistrationOutcome {
    /// Whether this attempt created the record.
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::Activated | Self::PendingActivation)
    }
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated => write!(f, "activated"),
            Self::PendingActivation => write!(f, "pending activation"),
            Self::AlreadyRegistered => write!(f, "already registered"),
        }
    }
}

// ──────────────────── registry ────────────────────

/// Registers and looks up client hardware.
pub struct DeviceRegistry {
    store: Arc<GateStore>,
}

impl DeviceRegistry {
    /// Wrap a shared store handle.
    #[must_use]
    pub fn new(store: Arc<GateStore>) -> Self {
        Self { store }
    }

    /// Register a console, honoring the manual-activation policy.
    ///
    /// Runs in one write transaction: an existing `(mac_address, platform)`
    /// record short-circuits to [`RegistrationOutcome::AlreadyRegistered`]
    /// without reading settings or writing anything. Otherwise the
    /// `console_manualactivation` setting decides whether the new record
    /// starts enabled.
    pub fn register(
        &self,
        mac_address: &str,
        platform: ConsolePlatform,
        serial_number: Option<&str>,
    ) -> Result<RegistrationOutcome> {
        self.store.write_tx(|tx| {
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM consoles WHERE mac_address = ?1 AND platform = ?2",
                params![mac_address, platform.as_store_str()],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Ok(RegistrationOutcome::AlreadyRegistered);
            }

            let enabled = matches!(settings::activation_policy(tx)?, ActivationPolicy::Immediate);
            // A writer in another process can insert between the count and
            // this statement; the unique key turns that into a conflict
            // no-op instead of a duplicate row.
            let inserted = tx.execute(
                "INSERT INTO consoles (mac_address, serial_number, platform, enabled, abuse_flagged)
                 VALUES (?1, ?2, ?3, ?4, 0)
                 ON CONFLICT(mac_address, platform) DO NOTHING",
                params![mac_address, serial_number, platform.as_store_str(), enabled],
            )?;
            if inserted == 0 {
                return Ok(RegistrationOutcome::AlreadyRegistered);
            }
            Ok(if enabled {
                RegistrationOutcome::Activated
            } else {
                RegistrationOutcome::PendingActivation
            })
        })
    }

    /// Whether any record for this hardware address awaits manual approval.
    pub fn is_pending(&self, mac_address: &str) -> Result<bool> {
        self.store.read_tx(|tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM consoles WHERE mac_address = ?1 AND enabled = 0",
                params![mac_address],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}
