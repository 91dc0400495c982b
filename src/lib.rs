#![forbid(unsafe_code)]

//! Session gatekeeper — ban checking and device registration for an online
//! multiplayer backend.
//!
//! For each inbound session request the engine decides whether the
//! originating access point, IP address, console hardware, or user profile
//! is banned, and separately manages console enrollment with an
//! over-registration (abuse) threshold. All state lives in one SQLite store
//! queried inside scoped transactions; each ban category is individually
//! overridable through stored settings.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use session_gatekeeper::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use session_gatekeeper::policy::facade::BanPolicyFacade;
//! use session_gatekeeper::store::db::GateStore;
//! ```

pub mod prelude;

pub mod audit;
pub mod core;
pub mod policy;
pub mod store;
