//! SQLite-backed store implementations.
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode**, so request handlers and the reaper can read while one writes;
//! - **embedded migrations**: `sqlx::migrate!` runs `migrations/*.sql` when
//!   [`Database::open`] is called. The schema is idempotent.
//!
//! | Type | Trait |
//! |------|-------|
//! | [`SqliteGameRecordStore`] | `GameRecordStore` |
//! | [`SqliteSessionCache`] | `SessionCache` |

mod cache_repo;
mod database;
mod game_repo;

pub use cache_repo::SqliteSessionCache;
pub use database::Database;
pub use game_repo::SqliteGameRecordStore;

use super::{MemorySessionCache, PersistenceError, SessionCache};

/// Cache implementation chosen at startup.
pub enum CacheBackend {
    Memory(MemorySessionCache),
    Sqlite(SqliteSessionCache),
}

impl SessionCache for CacheBackend {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match self {
            Self::Memory(cache) => cache.get(session_id).await,
            Self::Sqlite(cache) => cache.get(session_id).await,
        }
    }

    async fn set(&self, session_id: &str, payload: Vec<u8>) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(cache) => cache.set(session_id, payload).await,
            Self::Sqlite(cache) => cache.set(session_id, payload).await,
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(cache) => cache.delete(session_id).await,
            Self::Sqlite(cache) => cache.delete(session_id).await,
        }
    }
}
