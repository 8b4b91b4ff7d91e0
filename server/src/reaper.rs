//! Background sweep that closes abandoned sessions.
//!
//! A session is stale when its durable record is still open and has not been
//! modified within the staleness threshold. Reaping one releases its pooled
//! engine, deletes its cache entry and marks the record over with no winner.
//!
//! Games that finished by mate or draw keep their cache entry so callers can
//! still read or undo them. Once such a game has been idle past the same
//! threshold its cache entry is evicted; the record is left as it was.

use std::sync::Arc;
use std::time::Duration;

use chess::Winner;
use engine::EngineLauncher;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::ServiceError;
use crate::persistence::{now_timestamp, GameRecordStore, PersistenceError, SessionCache};
use crate::pool::EnginePool;
use crate::session::{GameSession, SessionLocks};

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub reaped: usize,
    /// Revived or closed by a request between the query and the lock.
    pub skipped: usize,
    pub failed: usize,
    /// Finished games whose cache entry was dropped.
    pub evicted: usize,
}

pub struct StaleSessionReaper<C, D, L: EngineLauncher> {
    cache: Arc<C>,
    records: Arc<D>,
    pool: Arc<EnginePool<L>>,
    locks: Arc<SessionLocks>,
    stale_after: Duration,
    interval: Duration,
}

impl<C, D, L> StaleSessionReaper<C, D, L>
where
    C: SessionCache,
    D: GameRecordStore,
    L: EngineLauncher,
{
    pub fn new(
        cache: Arc<C>,
        records: Arc<D>,
        pool: Arc<EnginePool<L>>,
        locks: Arc<SessionLocks>,
        stale_after: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            records,
            pool,
            locks,
            stale_after,
            interval,
        }
    }

    /// Sweep on every interval tick, starting immediately, until `shutdown`
    /// turns true or its sender is dropped. Sweep failures never end the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Stale session reaper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep(now_timestamp()).await {
                        Ok(report) if report != SweepReport::default() => {
                            tracing::info!(
                                candidates = report.candidates,
                                reaped = report.reaped,
                                skipped = report.skipped,
                                failed = report.failed,
                                evicted = report.evicted,
                                "Sweep finished"
                            );
                        }
                        Ok(_) => tracing::debug!("Sweep found no stale sessions"),
                        Err(e) => tracing::error!("Sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Stale session reaper stopped");
    }

    /// One pass over the records that were stale at `now`, then over the
    /// finished games idle since the same cutoff.
    ///
    /// Fails only when a listing query fails; a failure on one session is
    /// counted and the rest of the batch still runs.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sweep(&self, now: u64) -> Result<SweepReport, PersistenceError> {
        let cutoff = now.saturating_sub(self.stale_after.as_secs());
        let candidates = self.records.list_stale(cutoff).await?;

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for record in candidates {
            let session_id = record.session_id;
            match self.reap(&session_id, cutoff, now).await {
                Ok(true) => report.reaped += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(session_id = %session_id, "Failed to reap session: {}", e);
                }
            }
        }

        for record in self.records.list_finished_cached(cutoff).await? {
            let session_id = record.session_id;
            match self.evict(&session_id, cutoff).await {
                Ok(true) => report.evicted += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(session_id = %session_id, "Failed to evict finished session: {}", e);
                }
            }
        }

        let pruned = self.locks.prune().await;
        tracing::trace!(pruned, "Pruned idle session locks");
        Ok(report)
    }

    async fn reap(&self, session_id: &str, cutoff: u64, now: u64) -> Result<bool, ServiceError> {
        let _guard = self.locks.lock(session_id).await;

        let still_stale = self
            .records
            .load_record(session_id)
            .await?
            .is_some_and(|record| record.is_stale(cutoff));
        if !still_stale {
            tracing::debug!(session_id = %session_id, "Session revived before reaping");
            return Ok(false);
        }

        match self.cache.get(session_id).await? {
            Some(bytes) => match GameSession::from_bytes(session_id, &bytes) {
                Ok(session) => tracing::debug!(
                    session_id = %session_id,
                    plies = session.game().move_count(),
                    "Reaping abandoned session"
                ),
                Err(e) => tracing::warn!(session_id = %session_id, "Reaping session with unreadable state: {}", e),
            },
            None => tracing::debug!(session_id = %session_id, "No cached state; reaping record only"),
        }

        self.pool.release(session_id).await;
        self.cache.delete(session_id).await?;
        self.records.mark_over(session_id, Winner::None, now).await?;

        tracing::info!(session_id = %session_id, "Reaped stale session");
        Ok(true)
    }

    async fn evict(&self, session_id: &str, cutoff: u64) -> Result<bool, ServiceError> {
        let _guard = self.locks.lock(session_id).await;

        let still_idle = self
            .records
            .load_record(session_id)
            .await?
            .is_some_and(|record| record.is_evictable(cutoff));
        if !still_idle {
            tracing::debug!(session_id = %session_id, "Finished session touched before eviction");
            return Ok(false);
        }

        self.pool.release(session_id).await;
        self.cache.delete(session_id).await?;
        self.records.mark_cache_evicted(session_id).await?;

        tracing::debug!(session_id = %session_id, "Evicted finished session state");
        Ok(true)
    }
}
