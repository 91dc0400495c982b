//! Composed policy entry point: the surface a session handler calls with an
//! inbound request record.
//!
//! Each operation maps request fields onto one underlying component. Ban
//! checks whose identifying field is absent return "not banned" without
//! touching the store; that permissive default is inherited behavior the
//! session protocol depends on. Every decision is emitted to the audit log
//! when a handle is attached.

use std::sync::Arc;

use crate::audit::channel::AuditLoggerHandle;
use crate::audit::jsonl::{DecisionEntry, Operation, Verdict};
use crate::core::config::PolicyConfig;
use crate::core::errors::{GateError, Result};
use crate::policy::abuse::AbuseMonitor;
use crate::policy::allowlist::GameAllowlist;
use crate::policy::bans::{BanCategory, BanRegistry};
use crate::policy::consoles::{ConsolePlatform, DeviceRegistry, RegistrationOutcome};
use crate::policy::request::{
    self, BSSID, CSNUM, GAMECD, GSBRCD, IPADDR, MACADR, SessionRequest,
};
use crate::store::db::GateStore;

/// Ban checking and device registration, composed over one shared store.
pub struct BanPolicyFacade {
    bans: BanRegistry,
    consoles: DeviceRegistry,
    abuse: AbuseMonitor,
    allowlist: GameAllowlist,
    audit: Option<AuditLoggerHandle>,
}

impl BanPolicyFacade {
    /// Build the facade over a shared store handle.
    #[must_use]
    pub fn new(store: Arc<GateStore>, policy: &PolicyConfig) -> Self {
        Self {
            bans: BanRegistry::new(Arc::clone(&store)),
            consoles: DeviceRegistry::new(Arc::clone(&store)),
            abuse: AbuseMonitor::new(Arc::clone(&store), policy.abuse_registration_limit),
            allowlist: GameAllowlist::new(store),
            audit: None,
        }
    }

    /// Attach an audit logger handle.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLoggerHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    // ──────────────────── ban checks ────────────────────

    /// Whether the request's access point is banned. Missing `bssid` is not
    /// banned.
    pub fn is_access_point_banned(&self, req: &SessionRequest) -> Result<bool> {
        self.ban_check(
            Operation::AccessPointBanCheck,
            BanCategory::AccessPoint,
            BSSID,
            false,
            req,
        )
    }

    /// Whether the request's IP address is banned. `ipaddr` is required.
    pub fn is_ip_banned(&self, req: &SessionRequest) -> Result<bool> {
        self.ban_check(
            Operation::IpBanCheck,
            BanCategory::IpAddress,
            IPADDR,
            true,
            req,
        )
    }

    /// Whether the request's console hardware is banned. Missing `macadr` is
    /// not banned.
    pub fn is_console_banned(&self, req: &SessionRequest) -> Result<bool> {
        self.ban_check(
            Operation::ConsoleBanCheck,
            BanCategory::ConsoleHardware,
            MACADR,
            false,
            req,
        )
    }

    /// Whether the request's profile is banned. Missing `gsbrcd` is not
    /// banned.
    pub fn is_profile_banned(&self, req: &SessionRequest) -> Result<bool> {
        self.ban_check(
            Operation::ProfileBanCheck,
            BanCategory::Profile,
            GSBRCD,
            false,
            req,
        )
    }

    /// First ban category matching the request, in evaluation order: access
    /// point, IP address, console hardware, profile.
    pub fn banned_category(&self, req: &SessionRequest) -> Result<Option<BanCategory>> {
        if self.is_access_point_banned(req)? {
            return Ok(Some(BanCategory::AccessPoint));
        }
        if self.is_ip_banned(req)? {
            return Ok(Some(BanCategory::IpAddress));
        }
        if self.is_console_banned(req)? {
            return Ok(Some(BanCategory::ConsoleHardware));
        }
        if self.is_profile_banned(req)? {
            return Ok(Some(BanCategory::Profile));
        }
        Ok(None)
    }

    // ──────────────────── console enrollment ────────────────────

    /// Register the request's console. A `csnum`-carrying request registers
    /// as Wii hardware with its serial recorded; otherwise as `other` with
    /// no serial.
    pub fn register_console(&self, req: &SessionRequest) -> Result<RegistrationOutcome> {
        let mac = match req.require(MACADR) {
            Ok(mac) => mac,
            Err(e) => {
                self.audit_error(Operation::ConsoleRegistration, None, &e);
                return Err(e);
            }
        };
        let serial = req.get(CSNUM);
        let platform = if serial.is_some() {
            ConsolePlatform::Wii
        } else {
            ConsolePlatform::Other
        };

        let result = self.consoles.register(mac, platform, serial);
        if let Some(audit) = &self.audit {
            audit.record(match &result {
                Ok(outcome) => {
                    DecisionEntry::new(Operation::ConsoleRegistration, Verdict::Allow)
                        .with_identifier(mac)
                        .with_detail(outcome.to_string())
                }
                Err(e) => DecisionEntry::new(Operation::ConsoleRegistration, Verdict::Error)
                    .with_identifier(mac)
                    .with_error_code(e.code()),
            });
        }
        result
    }

    /// Whether the request's console awaits manual activation. `macadr` is
    /// required.
    pub fn is_console_pending(&self, req: &SessionRequest) -> Result<bool> {
        let mac = match req.require(MACADR) {
            Ok(mac) => mac,
            Err(e) => {
                self.audit_error(Operation::PendingConsoleCheck, None, &e);
                return Err(e);
            }
        };
        let result = self.consoles.is_pending(mac);
        self.audit_deny_when(Operation::PendingConsoleCheck, mac, &result, "pending activation");
        result
    }

    /// Check the request's hardware serial for over-registration. Requests
    /// without a `csnum` are exempt; no store access is performed.
    pub fn check_console_abuse(&self, req: &SessionRequest) -> Result<bool> {
        let Some(serial) = req.get(CSNUM) else {
            self.audit_field_absent(Operation::AbuseCheck, CSNUM);
            return Ok(false);
        };
        let result = self.abuse.check(serial);
        self.audit_deny_when(Operation::AbuseCheck, serial, &result, "serial over-registered");
        result
    }

    /// Whether the request's hardware address is well-formed. `macadr` is
    /// required.
    pub fn has_valid_hardware_address(&self, req: &SessionRequest) -> Result<bool> {
        let mac = match req.require(MACADR) {
            Ok(mac) => mac,
            Err(e) => {
                self.audit_error(Operation::HardwareAddressCheck, None, &e);
                return Err(e);
            }
        };
        let valid = request::is_valid_hardware_address(mac);
        if let Some(audit) = &self.audit {
            let verdict = if valid { Verdict::Allow } else { Verdict::Deny };
            audit.record(
                DecisionEntry::new(Operation::HardwareAddressCheck, verdict).with_identifier(mac),
            );
        }
        Ok(valid)
    }

    // ──────────────────── game gating ────────────────────

    /// Whether the request's game code prefix is allowlisted. `gamecd` is
    /// required and must be at least 3 characters.
    pub fn is_game_allowed(&self, req: &SessionRequest) -> Result<bool> {
        let code = match req.require(GAMECD) {
            Ok(code) => code,
            Err(e) => {
                self.audit_error(Operation::GameAllowCheck, None, &e);
                return Err(e);
            }
        };
        let result = self.allowlist.is_allowed(code);
        if let Some(audit) = &self.audit {
            audit.record(match &result {
                Ok(true) => DecisionEntry::new(Operation::GameAllowCheck, Verdict::Allow)
                    .with_identifier(code),
                Ok(false) => DecisionEntry::new(Operation::GameAllowCheck, Verdict::Deny)
                    .with_identifier(code)
                    .with_detail("prefix not allowlisted"),
                Err(e) => DecisionEntry::new(Operation::GameAllowCheck, Verdict::Error)
                    .with_identifier(code)
                    .with_error_code(e.code()),
            });
        }
        result
    }

    // ──────────────────── audit plumbing ────────────────────

    fn ban_check(
        &self,
        operation: Operation,
        category: BanCategory,
        field: &'static str,
        required: bool,
        req: &SessionRequest,
    ) -> Result<bool> {
        let Some(identifier) = req.get(field) else {
            if required {
                let e = GateError::MissingField { field };
                self.audit_error(operation, None, &e);
                return Err(e);
            }
            self.audit_field_absent(operation, field);
            return Ok(false);
        };
        let result = self.bans.is_banned(category, identifier);
        self.audit_deny_when(operation, identifier, &result, "active ban");
        result
    }

    fn audit_deny_when(
        &self,
        operation: Operation,
        identifier: &str,
        result: &Result<bool>,
        deny_detail: &str,
    ) {
        let Some(audit) = &self.audit else { return };
        audit.record(match result {
            Ok(true) => DecisionEntry::new(operation, Verdict::Deny)
                .with_identifier(identifier)
                .with_detail(deny_detail),
            Ok(false) => DecisionEntry::new(operation, Verdict::Allow).with_identifier(identifier),
            Err(e) => DecisionEntry::new(operation, Verdict::Error)
                .with_identifier(identifier)
                .with_error_code(e.code()),
        });
    }

    fn audit_field_absent(&self, operation: Operation, field: &'static str) {
        if let Some(audit) = &self.audit {
            audit.record(
                DecisionEntry::new(operation, Verdict::Allow)
                    .with_detail(format!("{field} absent, check skipped")),
            );
        }
    }

    fn audit_error(&self, operation: Operation, identifier: Option<&str>, error: &GateError) {
        if let Some(audit) = &self.audit {
            let mut entry =
                DecisionEntry::new(operation, Verdict::Error).with_error_code(error.code());
            if let Some(identifier) = identifier {
                entry = entry.with_identifier(identifier);
            }
            audit.record(entry);
        }
    }
}
