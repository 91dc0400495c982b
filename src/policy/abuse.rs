//! Over-registration detection: flag hardware serials that accumulate too
//! many console records.

use std::sync::Arc;

use rusqlite::params;

use crate::core::errors::Result;
use crate::store::db::GateStore;

/// Detects a single serial number registered across too many consoles.
///
/// The count is deliberately global across platforms and MAC addresses; a
/// serial reused on any combination of hardware identities counts toward the
/// limit.
pub struct AbuseMonitor {
    store: Arc<GateStore>,
    registration_limit: i64,
}

impl AbuseMonitor {
    /// Wrap a shared store handle with the configured registration limit.
    #[must_use]
    pub fn new(store: Arc<GateStore>, registration_limit: i64) -> Self {
        Self {
            store,
            registration_limit,
        }
    }

    /// Check a serial for over-registration.
    ///
    /// Counts console records sharing `serial_number`; a count strictly
    /// greater than the limit flags every matching record and returns `true`.
    /// At or below the limit nothing is written. Flagging is monotonic:
    /// nothing in this engine clears it.
    pub fn check(&self, serial_number: &str) -> Result<bool> {
        self.store.write_tx(|tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM consoles WHERE serial_number = ?1",
                params![serial_number],
                |row| row.get(0),
            )?;
            if count <= self.registration_limit {
                return Ok(false);
            }
            tx.execute(
                "UPDATE consoles SET abuse_flagged = 1 WHERE serial_number = ?1",
                params![serial_number],
            )?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;
    use crate::policy::consoles::{ConsolePlatform, DeviceRegistry};

    fn fixture() -> (Arc<GateStore>, DeviceRegistry, AbuseMonitor) {
        let store = Arc::new(GateStore::open_in_memory(&StoreConfig::default()).unwrap());
        (
            Arc::clone(&store),
            DeviceRegistry::new(Arc::clone(&store)),
            AbuseMonitor::new(store, 2),
        )
    }

    #[test]
    fn under_the_limit_is_clean() {
        let (_store, registry, monitor) = fixture();
        registry
            .register("000000000001", ConsolePlatform::Wii, Some("777"))
            .unwrap();
        assert!(!monitor.check("777").unwrap());

        registry
            .register("000000000002", ConsolePlatform::Wii, Some("777"))
            .unwrap();
        assert!(!monitor.check("777").unwrap());
    }

    #[test]
    fn third_registration_flags_every_record() {
        let (store, registry, monitor) = fixture();
        for mac in ["000000000001", "000000000002", "000000000003"] {
            registry
                .register(mac, ConsolePlatform::Wii, Some("777"))
                .unwrap();
        }
        assert!(monitor.check("777").unwrap());

        let consoles = store.list_consoles().unwrap();
        assert_eq!(consoles.len(), 3);
        assert!(consoles.iter().all(|c| c.abuse_flagged));
    }

    #[test]
    fn clean_serials_are_untouched_by_flagging() {
        let (store, registry, monitor) = fixture();
        for mac in ["000000000001", "000000000002", "000000000003"] {
            registry
                .register(mac, ConsolePlatform::Wii, Some("777"))
                .unwrap();
        }
        registry
            .register("0000000000aa", ConsolePlatform::Wii, Some("888"))
            .unwrap();

        assert!(monitor.check("777").unwrap());
        assert!(!monitor.check("888").unwrap());

        let consoles = store.list_consoles().unwrap();
        let other = consoles
            .iter()
            .find(|c| c.serial_number.as_deref() == Some("888"))
            .unwrap();
        assert!(!other.abuse_flagged);
    }

    #[test]
    fn count_spans_platforms() {
        let (_store, registry, monitor) = fixture();
        registry
            .register("000000000001", ConsolePlatform::Wii, Some("777"))
            .unwrap();
        registry
            .register("000000000002", ConsolePlatform::Other, Some("777"))
            .unwrap();
        registry
            .register("000000000003", ConsolePlatform::Wii, Some("777"))
            .unwrap();
        assert!(monitor.check("777").unwrap());
    }

    #[test]
    fn configured_limit_is_honored() {
        let store = Arc::new(GateStore::open_in_memory(&StoreConfig::default()).unwrap());
        let registry = DeviceRegistry::new(Arc::clone(&store));
        let monitor = AbuseMonitor::new(Arc::clone(&store), 4);
        for i in 0..4 {
            registry
                .register(&format!("00000000000{i}"), ConsolePlatform::Wii, Some("777"))
                .unwrap();
        }
        assert!(!monitor.check("777").unwrap());
        registry
            .register("0000000000ff", ConsolePlatform::Wii, Some("777"))
            .unwrap();
        assert!(monitor.check("777").unwrap());
    }

    #[test]
    fn serial_less_records_do_not_count() {
        let (_store, registry, monitor) = fixture();
        for mac in ["000000000001", "000000000002", "000000000003"] {
            registry
                .register(mac, ConsolePlatform::Other, None)
                .unwrap();
        }
        // NULL serials never match a serial lookup.
        assert!(!monitor.check("777").unwrap());
    }
}
