//! Ban evaluation: stored ban records by identifier, category, and expiry,
//! subject to a per-category override flag.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use crate::core::errors::Result;
use crate::store::db::GateStore;
use crate::store::settings::{
    self, AP_ALLOWBANNED, IP_ALLOWBANNED, MAC_ALLOWBANNED, PROFILE_ALLOWBANNED,
};

// ──────────────────── categories ────────────────────

/// Independent authorization axes a ban can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BanCategory {
    /// Network access point (BSSID-like identifier).
    AccessPoint,
    /// Client IP address.
    IpAddress,
    /// Console hardware address.
    ConsoleHardware,
    /// User profile/account identifier.
    Profile,
}

impl BanCategory {
    /// All categories, in facade evaluation order.
    pub const ALL: [Self; 4] = [
        Self::AccessPoint,
        Self::IpAddress,
        Self::ConsoleHardware,
        Self::Profile,
    ];

    /// Category discriminator as stored in the `banned` table.
    #[must_use]
    pub const fn as_store_str(self) -> &'static str {
        match self {
            Self::AccessPoint => "ap",
            Self::IpAddress => "ip",
            Self::ConsoleHardware => "console",
            Self::Profile => "profile",
        }
    }

    /// Parse a stored category discriminator.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ap" => Some(Self::AccessPoint),
            "ip" => Some(Self::IpAddress),
            "console" => Some(Self::ConsoleHardware),
            "profile" => Some(Self::Profile),
            _ => None,
        }
    }

    /// Name of the override setting that can bypass this category.
    #[must_use]
    pub const fn override_setting(self) -> &'static str {
        match self {
            Self::AccessPoint => AP_ALLOWBANNED,
            Self::IpAddress => IP_ALLOWBANNED,
            Self::ConsoleHardware => MAC_ALLOWBANNED,
            Self::Profile => PROFILE_ALLOWBANNED,
        }
    }
}

impl fmt::Display for BanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessPoint => write!(f, "access point"),
            Self::IpAddress => write!(f, "ip address"),
            Self::ConsoleHardware => write!(f, "console hardware"),
            Self::Profile => write!(f, "profile"),
        }
    }
}

/// A stored ban entry. Active iff `expires_at > now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanRecord {
    /// The banned identifier within its category.
    pub identifier: String,
    /// Category the ban applies to.
    pub category: BanCategory,
    /// Unban time, unix seconds.
    pub expires_at: i64,
}

impl BanRecord {
    /// Whether the ban is still in force at `now` (unix seconds).
    #[must_use]
    pub const fn is_active_at(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

// ──────────────────── registry ────────────────────

/// Evaluates ban records against the store. Never mutates.
pub struct BanRegistry {
    store: Arc<GateStore>,
}

impl BanRegistry {
    /// Wrap a shared store handle.
    #[must_use]
    pub fn new(store: Arc<GateStore>) -> Self {
        Self { store }
    }

    /// Whether any active ban of `category` exists for `identifier`.
    ///
    /// The category's override flag is read in the same transaction as the
    /// ban records. `Bypass` short-circuits to `false` without touching the
    /// `banned` table; a flag value outside `{0, 1}` is a configuration
    /// fault and propagates as an error.
    pub fn is_banned(&self, category: BanCategory, identifier: &str) -> Result<bool> {
        self.is_banned_at(category, identifier, Utc::now().timestamp())
    }

    /// [`Self::is_banned`] with an explicit evaluation time (unix seconds).
    pub fn is_banned_at(
        &self,
        category: BanCategory,
        identifier: &str,
        now: i64,
    ) -> Result<bool> {
        self.store.read_tx(|tx| {
            let flag = settings::override_flag(tx, category.override_setting())?;
            if flag.bypasses() {
                return Ok(false);
            }
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM banned
                 WHERE identifier = ?1 AND category = ?2 AND expires_at > ?3",
                params![identifier, category.as_store_str(), now],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;

    const NOW: i64 = 1_700_000_000;

    fn registry() -> (Arc<GateStore>, BanRegistry) {
        let store = Arc::new(GateStore::open_in_memory(&StoreConfig::default()).unwrap());
        (Arc::clone(&store), BanRegistry::new(store))
    }

    #[test]
    fn category_store_strings_round_trip() {
        for category in BanCategory::ALL {
            assert_eq!(BanCategory::parse(category.as_store_str()), Some(category));
        }
        assert_eq!(BanCategory::parse("mac"), None);
    }

    #[test]
    fn active_ban_is_reported() {
        let (store, registry) = registry();
        store
            .add_ban(BanCategory::AccessPoint, "AA:BB:CC:DD:EE:FF", NOW + 3_600)
            .unwrap();
        assert!(
            registry
                .is_banned_at(BanCategory::AccessPoint, "AA:BB:CC:DD:EE:FF", NOW)
                .unwrap()
        );
    }

    #[test]
    fn expired_ban_is_not_reported() {
        let (store, registry) = registry();
        store
            .add_ban(BanCategory::IpAddress, "1.2.3.4", NOW - 1)
            .unwrap();
        assert!(
            !registry
                .is_banned_at(BanCategory::IpAddress, "1.2.3.4", NOW)
                .unwrap()
        );
        // Boundary: a ban expiring exactly now is no longer active.
        store
            .add_ban(BanCategory::IpAddress, "5.6.7.8", NOW)
            .unwrap();
        assert!(
            !registry
                .is_banned_at(BanCategory::IpAddress, "5.6.7.8", NOW)
                .unwrap()
        );
    }

    #[test]
    fn category_must_match() {
        let (store, registry) = registry();
        store
            .add_ban(BanCategory::Profile, "player01", NOW + 3_600)
            .unwrap();
        assert!(
            registry
                .is_banned_at(BanCategory::Profile, "player01", NOW)
                .unwrap()
        );
        assert!(
            !registry
                .is_banned_at(BanCategory::IpAddress, "player01", NOW)
                .unwrap()
        );
    }

    #[test]
    fn bypass_flag_wins_over_stored_records() {
        let (store, registry) = registry();
        store
            .add_ban(BanCategory::ConsoleHardware, "001122334455", NOW + 3_600)
            .unwrap();
        store.set_setting(MAC_ALLOWBANNED, "1").unwrap();
        assert!(
            !registry
                .is_banned_at(BanCategory::ConsoleHardware, "001122334455", NOW)
                .unwrap()
        );
    }

    #[test]
    fn out_of_range_flag_is_an_error_not_a_default() {
        let (store, registry) = registry();
        store.set_setting(AP_ALLOWBANNED, "7").unwrap();
        let err = registry
            .is_banned_at(BanCategory::AccessPoint, "AA:BB:CC:DD:EE:FF", NOW)
            .unwrap_err();
        assert_eq!(err.code(), "GK-2003");
    }

    #[test]
    fn missing_flag_is_an_error() {
        let cfg = StoreConfig {
            seed_default_settings: false,
            ..StoreConfig::default()
        };
        let store = Arc::new(GateStore::open_in_memory(&cfg).unwrap());
        let registry = BanRegistry::new(store);
        let err = registry
            .is_banned_at(BanCategory::Profile, "player01", NOW)
            .unwrap_err();
        assert_eq!(err.code(), "GK-2001");
    }

    #[test]
    fn any_active_record_among_many_bans() {
        let (store, registry) = registry();
        store
            .add_ban(BanCategory::Profile, "player01", NOW - 100)
            .unwrap();
        store
            .add_ban(BanCategory::Profile, "player01", NOW + 100)
            .unwrap();
        assert!(
            registry
                .is_banned_at(BanCategory::Profile, "player01", NOW)
                .unwrap()
        );
    }

    #[test]
    fn evaluation_never_mutates() {
        let (store, registry) = registry();
        store
            .add_ban(BanCategory::Profile, "player01", NOW + 100)
            .unwrap();
        for _ in 0..3 {
            registry
                .is_banned_at(BanCategory::Profile, "player01", NOW)
                .unwrap();
        }
        assert_eq!(store.list_bans().unwrap().len(), 1);
    }

    #[test]
    fn record_activity_boundary() {
        let record = BanRecord {
            identifier: "x".to_string(),
            category: BanCategory::Profile,
            expires_at: NOW,
        };
        assert!(record.is_active_at(NOW - 1));
        assert!(!record.is_active_at(NOW));
    }
}
