//! Game allowlist: gate access by the first 3 characters of a game code.

use std::sync::Arc;

use rusqlite::params;

use crate::core::errors::{GateError, Result};
use crate::store::db::GateStore;

/// Checks whether a game code's prefix is permitted.
pub struct GameAllowlist {
    store: Arc<GateStore>,
}

impl GameAllowlist {
    /// Wrap a shared store handle.
    #[must_use]
    pub fn new(store: Arc<GateStore>) -> Self {
        Self { store }
    }

    /// Whether the first 3 characters of `game_code` match a stored prefix.
    ///
    /// Codes shorter than 3 characters violate the caller contract and fail
    /// rather than silently denying.
    pub fn is_allowed(&self, game_code: &str) -> Result<bool> {
        let prefix: String = game_code.chars().take(3).collect();
        if prefix.chars().count() < 3 {
            return Err(GateError::MalformedField {
                field: "gamecd",
                details: format!("game code must be at least 3 characters, got {game_code:?}"),
            });
        }
        self.store.read_tx(|tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM allowed_games WHERE game_code_prefix = ?1",
                params![prefix],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}
