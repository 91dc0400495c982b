//! Integration tests: full gate-evaluation scenarios against a real SQLite
//! store, including audit wiring and concurrent registration.

use std::sync::Arc;
use std::thread;

use session_gatekeeper::audit::channel::{AuditLoggerConfig, spawn_logger};
use session_gatekeeper::audit::jsonl::JsonlConfig;
use session_gatekeeper::core::config::{PolicyConfig, StoreConfig};
use session_gatekeeper::policy::bans::{BanCategory, BanRegistry};
use session_gatekeeper::policy::consoles::RegistrationOutcome;
use session_gatekeeper::policy::facade::BanPolicyFacade;
use session_gatekeeper::policy::request::SessionRequest;
use session_gatekeeper::store::db::GateStore;

const FUTURE: i64 = 4_000_000_000;

fn file_store(dir: &tempfile::TempDir) -> Arc<GateStore> {
    let path = dir.path().join("gate.sqlite3");
    Arc::new(GateStore::open(&path, &StoreConfig::default()).unwrap())
}

fn facade(store: &Arc<GateStore>) -> BanPolicyFacade {
    BanPolicyFacade::new(Arc::clone(store), &PolicyConfig::default())
}

#[test]
fn active_access_point_ban_denies_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store
        .add_ban(BanCategory::AccessPoint, "AA:BB:CC:DD:EE:FF", FUTURE)
        .unwrap();

    let req = SessionRequest::new()
        .with("bssid", "AA:BB:CC:DD:EE:FF")
        .with("ipaddr", "1.2.3.4");
    let facade = facade(&store);
    assert!(facade.is_access_point_banned(&req).unwrap());
    assert_eq!(
        facade.banned_category(&req).unwrap(),
        Some(BanCategory::AccessPoint)
    );
}

#[test]
fn bypass_flag_admits_a_banned_ip() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store
        .add_ban(BanCategory::IpAddress, "1.2.3.4", FUTURE)
        .unwrap();
    store.set_setting("ip_allowbanned", "1").unwrap();

    let req = SessionRequest::new().with("ipaddr", "1.2.3.4");
    assert!(!facade(&store).is_ip_banned(&req).unwrap());
}

#[test]
fn expired_bans_do_not_deny() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store.add_ban(BanCategory::Profile, "player01", 1).unwrap();

    let req = SessionRequest::new()
        .with("ipaddr", "1.2.3.4")
        .with("gsbrcd", "player01");
    assert_eq!(facade(&store).banned_category(&req).unwrap(), None);
}

#[test]
fn repeated_ban_checks_leave_the_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store
        .add_ban(BanCategory::Profile, "player01", FUTURE)
        .unwrap();
    let registry = BanRegistry::new(Arc::clone(&store));

    for _ in 0..5 {
        assert!(registry.is_banned(BanCategory::Profile, "player01").unwrap());
    }
    assert_eq!(store.list_bans().unwrap().len(), 1);
    assert!(store.list_consoles().unwrap().is_empty());
}

#[test]
fn registration_then_duplicate_then_abuse_flow() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    let facade = facade(&store);

    let console = |mac: &str| {
        SessionRequest::new()
            .with("macadr", mac)
            .with("csnum", "777")
    };

    // First two registrations are clean.
    assert_eq!(
        facade.register_console(&console("000000000001")).unwrap(),
        RegistrationOutcome::Activated
    );
    assert!(!facade.check_console_abuse(&console("000000000001")).unwrap());
    assert_eq!(
        facade.register_console(&console("000000000002")).unwrap(),
        RegistrationOutcome::Activated
    );
    assert!(!facade.check_console_abuse(&console("000000000002")).unwrap());

    // Duplicate registration reports itself and writes nothing.
    assert_eq!(
        facade.register_console(&console("000000000001")).unwrap(),
        RegistrationOutcome::AlreadyRegistered
    );
    assert_eq!(store.list_consoles().unwrap().len(), 2);

    // Third distinct console under the same serial trips the monitor.
    assert_eq!(
        facade.register_console(&console("000000000003")).unwrap(),
        RegistrationOutcome::Activated
    );
    assert!(facade.check_console_abuse(&console("000000000003")).unwrap());
    let consoles = store.list_consoles().unwrap();
    assert_eq!(consoles.len(), 3);
    assert!(consoles.iter().all(|c| c.abuse_flagged));
}

#[test]
fn manual_activation_gates_the_console_until_approved() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store.set_setting("console_manualactivation", "1").unwrap();
    let facade = facade(&store);

    let req = SessionRequest::new()
        .with("macadr", "001122334455")
        .with("csnum", "777");
    assert_eq!(
        facade.register_console(&req).unwrap(),
        RegistrationOutcome::PendingActivation
    );
    assert!(facade.is_console_pending(&req).unwrap());

    store
        .activate_console(
            "001122334455",
            session_gatekeeper::policy::consoles::ConsolePlatform::Wii,
        )
        .unwrap();
    assert!(!facade.is_console_pending(&req).unwrap());
}

#[test]
fn missing_profile_field_skips_the_store_entirely() {
    // No settings seeded: any flag read would surface GK-2001. The
    // permissive path must therefore never reach the store.
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        seed_default_settings: false,
        ..StoreConfig::default()
    };
    let store = Arc::new(
        GateStore::open(&dir.path().join("gate.sqlite3"), &cfg).unwrap(),
    );
    let facade = BanPolicyFacade::new(Arc::clone(&store), &PolicyConfig::default());

    assert!(!facade.is_profile_banned(&SessionRequest::new()).unwrap());

    // With the field present the same store does error.
    let req = SessionRequest::new().with("gsbrcd", "player01");
    assert_eq!(
        facade.is_profile_banned(&req).unwrap_err().code(),
        "GK-2001"
    );
}

#[test]
fn misconfigured_flag_denies_loudly_not_silently() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store.set_setting("mac_allowbanned", "2").unwrap();

    let req = SessionRequest::new().with("macadr", "001122334455");
    let err = facade(&store).is_console_banned(&req).unwrap_err();
    assert_eq!(err.code(), "GK-2003");
    assert!(err.is_config_fault());
}

#[test]
fn game_allowlist_prefix_equivalence() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store.add_allowed_game("RMC").unwrap();
    let facade = facade(&store);

    let check = |code: &str| {
        facade
            .is_game_allowed(&SessionRequest::new().with("gamecd", code))
            .unwrap()
    };
    assert!(check("RMCJ"));
    assert_eq!(check("RMCxyz"), check("RMC123"));
    assert!(!check("RSBJ"));
}

#[test]
fn clean_login_flow_passes_every_gate() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store.add_allowed_game("RMC").unwrap();
    let facade = facade(&store);

    let req = SessionRequest::new()
        .with("bssid", "AA:BB:CC:DD:EE:FF")
        .with("ipaddr", "203.0.113.9")
        .with("macadr", "001122334455")
        .with("gsbrcd", "player01")
        .with("csnum", "777")
        .with("gamecd", "RMCJ");

    assert_eq!(facade.banned_category(&req).unwrap(), None);
    assert!(facade.has_valid_hardware_address(&req).unwrap());
    assert!(facade.register_console(&req).unwrap().is_new());
    assert!(!facade.is_console_pending(&req).unwrap());
    assert!(!facade.check_console_abuse(&req).unwrap());
    assert!(facade.is_game_allowed(&req).unwrap());
}

#[test]
fn decisions_reach_the_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    store
        .add_ban(BanCategory::IpAddress, "1.2.3.4", FUTURE)
        .unwrap();

    let log_path = dir.path().join("decisions.jsonl");
    let (handle, join) = spawn_logger(AuditLoggerConfig {
        jsonl: JsonlConfig {
            path: log_path.clone(),
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
        },
        channel_capacity: 64,
    })
    .unwrap();

    let facade = BanPolicyFacade::new(Arc::clone(&store), &PolicyConfig::default())
        .with_audit(handle.clone());
    let req = SessionRequest::new().with("ipaddr", "1.2.3.4");
    assert!(facade.is_ip_banned(&req).unwrap());
    assert!(
        !facade
            .is_access_point_banned(&SessionRequest::new())
            .unwrap()
    );

    handle.shutdown();
    join.join().unwrap();

    let raw = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("ip_ban_check"));
    assert!(lines[0].contains("deny"));
    assert!(lines[1].contains("access_point_ban_check"));
    assert!(lines[1].contains("bssid absent"));
}

#[test]
fn concurrent_registration_yields_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let facade = BanPolicyFacade::new(store, &PolicyConfig::default());
            let req = SessionRequest::new()
                .with("macadr", "001122334455")
                .with("csnum", "777");
            facade.register_console(&req).unwrap()
        }));
    }

    let outcomes: Vec<RegistrationOutcome> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
    let new = outcomes.iter().filter(|o| o.is_new()).count();
    assert_eq!(new, 1, "exactly one thread must win the insert: {outcomes:?}");
    assert_eq!(store.list_consoles().unwrap().len(), 1);
}
