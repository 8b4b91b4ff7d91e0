//! SQLite-backed durable game records.

use chess::Winner;
use sqlx::SqlitePool;

use crate::persistence::traits::GameRecordStore;
use crate::persistence::{DurableGameRecord, PersistenceError};

type RecordRow = (String, i64, i64, String, bool, String, i64, bool);

const SELECT_COLUMNS: &str =
    "SELECT session_id, created_at, modified_at, fen, is_over, winner, rating, cache_live FROM game_records";

/// SQLite implementation of [`GameRecordStore`].
pub struct SqliteGameRecordStore {
    pool: SqlitePool,
}

impl SqliteGameRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode_record(
    (session_id, created_at, modified_at, fen, is_over, winner, rating, cache_live): RecordRow,
) -> DurableGameRecord {
    let winner = winner.parse::<Winner>().unwrap_or_else(|e| {
        tracing::warn!(session_id = %session_id, "{}; treating as none", e);
        Winner::None
    });
    DurableGameRecord {
        session_id,
        created_at: created_at as u64,
        modified_at: modified_at as u64,
        fen,
        is_over,
        winner,
        rating: rating as u32,
        cache_live,
    }
}

impl GameRecordStore for SqliteGameRecordStore {
    async fn create_record(&self, record: &DurableGameRecord) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO game_records
                (session_id, created_at, modified_at, fen, is_over, winner, rating, cache_live)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.session_id)
        .bind(record.created_at as i64)
        .bind(record.modified_at as i64)
        .bind(&record.fen)
        .bind(record.is_over)
        .bind(record.winner.as_str())
        .bind(record.rating as i64)
        .bind(record.cache_live)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_record(&self, session_id: &str) -> Result<Option<DurableGameRecord>, PersistenceError> {
        let row: Option<RecordRow> =
            sqlx::query_as(&format!("{} WHERE session_id = ?", SELECT_COLUMNS))
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(decode_record))
    }

    async fn update_progress(
        &self,
        session_id: &str,
        fen: &str,
        is_over: bool,
        winner: Winner,
        now: u64,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE game_records
            SET fen = ?, is_over = ?, winner = ?, modified_at = ?, cache_live = 1
            WHERE session_id = ?
            "#,
        )
        .bind(fen)
        .bind(is_over)
        .bind(winner.as_str())
        .bind(now as i64)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn mark_over(&self, session_id: &str, winner: Winner, now: u64) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            "UPDATE game_records SET is_over = 1, winner = ?, modified_at = ?, cache_live = 0 WHERE session_id = ?",
        )
        .bind(winner.as_str())
        .bind(now as i64)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn list_stale(&self, cutoff: u64) -> Result<Vec<DurableGameRecord>, PersistenceError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{} WHERE is_over = 0 AND modified_at < ? ORDER BY modified_at ASC",
            SELECT_COLUMNS
        ))
        .bind(cutoff as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(decode_record).collect())
    }

    async fn list_finished_cached(&self, cutoff: u64) -> Result<Vec<DurableGameRecord>, PersistenceError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{} WHERE is_over = 1 AND cache_live = 1 AND modified_at < ? ORDER BY modified_at ASC",
            SELECT_COLUMNS
        ))
        .bind(cutoff as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(decode_record).collect())
    }

    async fn mark_cache_evicted(&self, session_id: &str) -> Result<(), PersistenceError> {
        let result = sqlx::query("UPDATE game_records SET cache_live = 0 WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(session_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::Database;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    async fn test_store() -> (Database, SqliteGameRecordStore) {
        let db = Database::new_in_memory().await.unwrap();
        let store = SqliteGameRecordStore::new(db.pool().clone());
        (db, store)
    }

    #[tokio::test]
    async fn test_create_and_load_roundtrip() {
        let (_db, store) = test_store().await;
        let record = DurableGameRecord::new("s1", START_FEN, 1800, 1_000);
        store.create_record(&record).await.unwrap();
        assert_eq!(store.load_record("s1").await.unwrap(), Some(record));
        assert_eq!(store.load_record("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let (_db, store) = test_store().await;
        let record = DurableGameRecord::new("s1", START_FEN, 1800, 1_000);
        store.create_record(&record).await.unwrap();
        assert!(matches!(
            store.create_record(&record).await,
            Err(PersistenceError::Sqlx(_))
        ));
    }

    #[tokio::test]
    async fn test_update_progress_is_partial() {
        let (_db, store) = test_store().await;
        store
            .create_record(&DurableGameRecord::new("s1", START_FEN, 1800, 1_000))
            .await
            .unwrap();

        store
            .update_progress("s1", "after-mate", true, Winner::White, 2_000)
            .await
            .unwrap();

        let loaded = store.load_record("s1").await.unwrap().unwrap();
        assert_eq!(loaded.created_at, 1_000);
        assert_eq!(loaded.modified_at, 2_000);
        assert_eq!(loaded.fen, "after-mate");
        assert!(loaded.is_over);
        assert_eq!(loaded.winner, Winner::White);
        assert_eq!(loaded.rating, 1800);
    }

    #[tokio::test]
    async fn test_updates_on_missing_record_fail() {
        let (_db, store) = test_store().await;
        assert!(matches!(
            store.update_progress("ghost", START_FEN, false, Winner::None, 1).await,
            Err(PersistenceError::NotFound(id)) if id == "ghost"
        ));
        assert!(matches!(
            store.mark_over("ghost", Winner::None, 1).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_over_keeps_position() {
        let (_db, store) = test_store().await;
        store
            .create_record(&DurableGameRecord::new("s1", START_FEN, 1500, 10))
            .await
            .unwrap();
        store.mark_over("s1", Winner::None, 20).await.unwrap();

        let loaded = store.load_record("s1").await.unwrap().unwrap();
        assert!(loaded.is_over);
        assert!(!loaded.cache_live);
        assert_eq!(loaded.fen, START_FEN);
        assert_eq!(loaded.modified_at, 20);
    }

    #[tokio::test]
    async fn test_finished_games_listed_until_cache_evicted() {
        let (_db, store) = test_store().await;
        let now = 10_000;
        for id in ["mated", "recent", "open"] {
            store
                .create_record(&DurableGameRecord::new(id, START_FEN, 1500, now - 90 * 60))
                .await
                .unwrap();
        }
        store
            .update_progress("mated", START_FEN, true, Winner::White, now - 40 * 60)
            .await
            .unwrap();
        store
            .update_progress("recent", START_FEN, true, Winner::None, now - 5 * 60)
            .await
            .unwrap();

        let cutoff = now - 30 * 60;
        let finished = store.list_finished_cached(cutoff).await.unwrap();
        let ids: Vec<&str> = finished.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["mated"]);
        assert!(finished[0].is_evictable(cutoff));

        store.mark_cache_evicted("mated").await.unwrap();
        assert!(store.list_finished_cached(cutoff).await.unwrap().is_empty());
        let mated = store.load_record("mated").await.unwrap().unwrap();
        assert_eq!(mated.modified_at, now - 40 * 60);
        assert_eq!(mated.winner, Winner::White);

        assert!(matches!(
            store.mark_cache_evicted("ghost").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_stale_filters_open_and_old() {
        let (_db, store) = test_store().await;
        let now = 10_000;
        store
            .create_record(&DurableGameRecord::new("old", START_FEN, 1500, now - 31 * 60))
            .await
            .unwrap();
        store
            .create_record(&DurableGameRecord::new("older", START_FEN, 1500, now - 90 * 60))
            .await
            .unwrap();
        store
            .create_record(&DurableGameRecord::new("fresh", START_FEN, 1500, now - 10 * 60))
            .await
            .unwrap();
        store
            .create_record(&DurableGameRecord::new("done", START_FEN, 1500, now - 90 * 60))
            .await
            .unwrap();
        store.mark_over("done", Winner::Black, now - 80 * 60).await.unwrap();

        let stale = store.list_stale(now - 30 * 60).await.unwrap();
        let ids: Vec<&str> = stale.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["older", "old"]);
    }
}
