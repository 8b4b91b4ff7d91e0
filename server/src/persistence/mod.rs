//! Cache and durable-record stores.
//!
//! Two stores back every session:
//! - the **session cache** holds the serialized [`SessionState`](crate::session::SessionState)
//!   bytes and is the source of truth for an active game;
//! - the **game record store** keeps one [`DurableGameRecord`] per session as
//!   permanent audit history. Records are never deleted, only marked over.

mod memory;
pub mod sqlite;
mod traits;

pub use memory::MemorySessionCache;
pub use traits::{GameRecordStore, SessionCache};

use chess::Winner;
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No record for session {0}")]
    NotFound(String),
}

/// Durable audit row for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableGameRecord {
    pub session_id: String,
    pub created_at: u64,
    pub modified_at: u64,
    pub fen: String,
    pub is_over: bool,
    pub winner: Winner,
    pub rating: u32,
    /// The session's cache entry has not been deleted yet.
    pub cache_live: bool,
}

impl DurableGameRecord {
    /// A fresh, open record stamped with `now`.
    pub fn new(session_id: impl Into<String>, fen: impl Into<String>, rating: u32, now: u64) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: now,
            modified_at: now,
            fen: fen.into(),
            is_over: false,
            winner: Winner::None,
            rating,
            cache_live: true,
        }
    }

    /// Open and untouched since before `cutoff`.
    pub fn is_stale(&self, cutoff: u64) -> bool {
        !self.is_over && self.modified_at < cutoff
    }

    /// Finished, idle since before `cutoff`, and still holding cache state.
    pub fn is_evictable(&self, cutoff: u64) -> bool {
        self.is_over && self.cache_live && self.modified_at < cutoff
    }
}

/// Get the current unix timestamp in seconds.
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
