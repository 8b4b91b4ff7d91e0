//! SQLite-backed session cache.

use sqlx::SqlitePool;

use crate::persistence::traits::SessionCache;
use crate::persistence::{now_timestamp, PersistenceError};

/// Session cache stored in the `session_cache` table.
pub struct SqliteSessionCache {
    pool: SqlitePool,
}

impl SqliteSessionCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SessionCache for SqliteSessionCache {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT payload FROM session_cache WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(payload,)| payload))
    }

    async fn set(&self, session_id: &str, payload: Vec<u8>) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO session_cache (session_id, payload, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(payload)
        .bind(now_timestamp() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM session_cache WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
