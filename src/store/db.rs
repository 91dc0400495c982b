//! SQLite policy store: WAL-mode database holding ban records, settings,
//! console registrations, and the game allowlist.
//!
//! One connection guarded by a mutex; every public operation runs inside a
//! scoped transaction. Write transactions open `IMMEDIATE` so conflicting
//! writers serialize at acquire time instead of failing at commit.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior, params};

use crate::core::config::StoreConfig;
use crate::core::errors::{GateError, Result};
use crate::policy::bans::{BanCategory, BanRecord};
use crate::policy::consoles::{ConsolePlatform, ConsoleRecord};
use crate::store::settings;

/// Shared persistent store for the gatekeeper engine.
pub struct GateStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl GateStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path, cfg: &StoreConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| GateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self::from_connection(conn, Some(path.to_path_buf()), cfg)?;
        Ok(store)
    }

    /// Open an in-memory store, mainly for tests and ephemeral evaluation.
    pub fn open_in_memory(cfg: &StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None, cfg)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        cfg: &StoreConfig,
    ) -> Result<Self> {
        apply_pragmas(&conn, cfg, path.is_some())?;
        apply_schema(&conn)?;
        let store = Self { conn: Mutex::new(conn), path };
        if cfg.seed_default_settings {
            store.seed_default_settings()?;
        }
        Ok(store)
    }

    /// Path to the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ──────────────────── scoped transactions ────────────────────

    /// Run `f` inside a read transaction. Commits on success; the transaction
    /// guard rolls back on any error or early-exit path.
    pub fn read_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside an `IMMEDIATE` transaction, taking the write lock at
    /// acquire time. Same commit/rollback discipline as [`Self::read_tx`].
    pub fn write_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ──────────────────── administrative surface ────────────────────
    //
    // Ban records, settings, and allowlist entries are created by operators,
    // not by the per-request engine. These back the CLI and test fixtures.

    /// Insert a ban record expiring at `expires_at` (unix seconds).
    pub fn add_ban(
        &self,
        category: BanCategory,
        identifier: &str,
        expires_at: i64,
    ) -> Result<()> {
        self.write_tx(|tx| {
            tx.prepare_cached(
                "INSERT INTO banned (identifier, category, expires_at) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![identifier, category.as_store_str(), expires_at])?;
            Ok(())
        })
    }

    /// All ban records, newest first.
    pub fn list_bans(&self) -> Result<Vec<BanRecord>> {
        self.read_tx(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT identifier, category, expires_at FROM banned ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(identifier, category, expires_at)| {
                    let category = BanCategory::parse(&category).ok_or_else(|| GateError::Sql {
                        context: "banned.category",
                        details: format!("unrecognized category {category:?}"),
                    })?;
                    Ok(BanRecord {
                        identifier,
                        category,
                        expires_at,
                    })
                })
                .collect()
        })
    }

    /// Store a setting verbatim. Integer coercion happens on read.
    pub fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        self.write_tx(|tx| {
            tx.prepare_cached(
                "INSERT INTO settings (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            )?
            .execute(params![name, value])?;
            Ok(())
        })
    }

    /// All settings as raw text, sorted by name.
    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        self.read_tx(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT name, CAST(value AS TEXT) FROM settings ORDER BY name ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Insert any recognized override flag that is absent, with its
    /// enforcing value. Returns the number of settings seeded.
    pub fn seed_default_settings(&self) -> Result<usize> {
        self.write_tx(|tx| {
            let mut seeded = 0;
            let mut stmt = tx.prepare_cached(
                "INSERT INTO settings (name, value) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            )?;
            for (name, value) in settings::DEFAULT_SETTINGS {
                seeded += stmt.execute(params![name, value])?;
            }
            Ok(seeded)
        })
    }

    /// Add a 3-character game code prefix to the allowlist.
    pub fn add_allowed_game(&self, prefix: &str) -> Result<()> {
        if prefix.chars().count() != 3 {
            return Err(GateError::MalformedField {
                field: "gamecd",
                details: format!("allowlist prefix must be exactly 3 characters, got {prefix:?}"),
            });
        }
        self.write_tx(|tx| {
            tx.prepare_cached(
                "INSERT INTO allowed_games (game_code_prefix) VALUES (?1)
                 ON CONFLICT(game_code_prefix) DO NOTHING",
            )?
            .execute(params![prefix])?;
            Ok(())
        })
    }

    /// All allowlisted prefixes, sorted.
    pub fn list_allowed_games(&self) -> Result<Vec<String>> {
        self.read_tx(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT game_code_prefix FROM allowed_games ORDER BY game_code_prefix ASC",
            )?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All registered consoles, oldest first.
    pub fn list_consoles(&self) -> Result<Vec<ConsoleRecord>> {
        self.read_tx(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT mac_address, serial_number, platform, enabled, abuse_flagged
                 FROM consoles ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(mac_address, serial_number, platform, enabled, abuse_flagged)| {
                    let platform =
                        ConsolePlatform::parse(&platform).ok_or_else(|| GateError::Sql {
                            context: "consoles.platform",
                            details: format!("unrecognized platform {platform:?}"),
                        })?;
                    Ok(ConsoleRecord {
                        mac_address,
                        serial_number,
                        platform,
                        enabled,
                        abuse_flagged,
                    })
                })
                .collect()
        })
    }

    /// Flip a pending console to enabled. Returns whether a row changed.
    pub fn activate_console(&self, mac_address: &str, platform: ConsolePlatform) -> Result<bool> {
        self.write_tx(|tx| {
            let changed = tx
                .prepare_cached(
                    "UPDATE consoles SET enabled = 1
                     WHERE mac_address = ?1 AND platform = ?2 AND enabled = 0",
                )?
                .execute(params![mac_address, platform.as_store_str()])?;
            Ok(changed > 0)
        })
    }
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection, cfg: &StoreConfig, file_backed: bool) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = {};",
        cfg.busy_timeout_ms
    ))?;
    // In-memory databases report journal_mode=memory; only verify WAL for
    // file-backed stores.
    if file_backed {
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            eprintln!("[GK-STORE] WARNING: requested WAL mode but got '{mode}'");
        }
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS banned (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL,
            category TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            name TEXT PRIMARY KEY,
            value NOT NULL
        ) WITHOUT ROWID;

        CREATE TABLE IF NOT EXISTS consoles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mac_address TEXT NOT NULL,
            serial_number TEXT,
            platform TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            abuse_flagged INTEGER NOT NULL DEFAULT 0,
            UNIQUE (mac_address, platform)
        );

        CREATE TABLE IF NOT EXISTS allowed_games (
            game_code_prefix TEXT PRIMARY KEY
        ) WITHOUT ROWID;

        CREATE INDEX IF NOT EXISTS idx_banned_identifier_category
            ON banned(identifier, category);
        CREATE INDEX IF NOT EXISTS idx_consoles_serial ON consoles(serial_number);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
