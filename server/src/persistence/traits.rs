//! Async store trait definitions.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send`, which `tokio::spawn` requires of the
//! reaper loop.

use super::{DurableGameRecord, PersistenceError};
use chess::Winner;
use std::future::Future;

/// Byte-blob store keyed by session id.
pub trait SessionCache: Send + Sync + 'static {
    fn get(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, PersistenceError>> + Send;
    fn set(
        &self,
        session_id: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Deleting a missing key is not an error.
    fn delete(&self, session_id: &str) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Durable per-session records with partial updates and a staleness query.
///
/// Implementations never physically delete a record.
pub trait GameRecordStore: Send + Sync + 'static {
    fn create_record(
        &self,
        record: &DurableGameRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn load_record(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Option<DurableGameRecord>, PersistenceError>> + Send;
    /// Set the position snapshot and terminal fields. Fails with
    /// [`PersistenceError::NotFound`] when no record exists.
    fn update_progress(
        &self,
        session_id: &str,
        fen: &str,
        is_over: bool,
        winner: Winner,
        now: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Mark a record terminal without touching its position snapshot. The
    /// caller has already deleted the cache entry.
    fn mark_over(
        &self,
        session_id: &str,
        winner: Winner,
        now: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Open records with `modified_at < cutoff`, oldest first.
    fn list_stale(
        &self,
        cutoff: u64,
    ) -> impl Future<Output = Result<Vec<DurableGameRecord>, PersistenceError>> + Send;
    /// Finished records with `modified_at < cutoff` whose cache entry is
    /// still live, oldest first.
    fn list_finished_cached(
        &self,
        cutoff: u64,
    ) -> impl Future<Output = Result<Vec<DurableGameRecord>, PersistenceError>> + Send;
    /// Record that the cache entry is gone. `modified_at` is left alone.
    fn mark_cache_evicted(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
