//! Test doubles for the engine boundary and the record store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess::{format_move_for, parse_move_for, Game, Winner};
use cozy_chess::Move;
use engine::{AbsoluteScore, Engine, EngineError, EngineLauncher, RankedMove};

use crate::persistence::{DurableGameRecord, GameRecordStore, PersistenceError};

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicUsize,
    stopped: AtomicUsize,
    fail_launch: AtomicBool,
    fail_query: AtomicBool,
    /// Replies consumed in order before falling back to the first legal move.
    script: Mutex<VecDeque<String>>,
}

/// Launcher that counts launches and hands out [`FakeEngine`]s.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    counters: Arc<Counters>,
    launch_delay: Duration,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn spawned(&self) -> usize {
        self.counters.spawned.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }

    pub fn fail_launches(&self, fail: bool) {
        self.counters.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.counters.fail_query.store(fail, Ordering::SeqCst);
    }

    /// Queue engine replies, in UCI.
    pub fn script(&self, replies: &[&str]) {
        let mut script = self.counters.script.lock().unwrap();
        script.extend(replies.iter().map(|r| r.to_string()));
    }
}

impl EngineLauncher for FakeLauncher {
    type Engine = FakeEngine;

    async fn launch(&self, rating: u32) -> Result<FakeEngine, EngineError> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        if self.counters.fail_launch.load(Ordering::SeqCst) {
            return Err(EngineError::Spawn("launch disabled".into()));
        }
        self.counters.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEngine {
            rating,
            counters: self.counters.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FakeEngine {
    rating: u32,
    counters: Arc<Counters>,
}

impl FakeEngine {
    pub fn rating(&self) -> u32 {
        self.rating
    }
}

impl Engine for FakeEngine {
    async fn best_move(&self, game: &Game, _budget: Duration) -> Result<Move, EngineError> {
        if self.counters.fail_query.load(Ordering::SeqCst) {
            return Err(EngineError::Terminated);
        }
        let legal = game.legal_moves();
        let scripted = self.counters.script.lock().unwrap().pop_front();
        match scripted {
            Some(text) => parse_move_for(game.position(), &text, &legal)
                .map_err(|e| EngineError::Query(e.to_string())),
            None => legal
                .first()
                .copied()
                .ok_or_else(|| EngineError::Query("no legal moves".into())),
        }
    }

    async fn top_moves(&self, game: &Game, n: usize, _depth: u8) -> Result<Vec<RankedMove>, EngineError> {
        if self.counters.fail_query.load(Ordering::SeqCst) {
            return Err(EngineError::Terminated);
        }
        Ok(game
            .legal_moves()
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, mv)| RankedMove {
                mv: format_move_for(game.position(), mv),
                score: AbsoluteScore::Centipawns(-(i as i32) * 10),
            })
            .collect())
    }

    async fn stop(&self) {
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Record store whose `mark_over` fails for chosen session ids.
pub struct FlakyRecords<D> {
    pub inner: D,
    pub fail_mark_over: Vec<String>,
}

impl<D: GameRecordStore> GameRecordStore for FlakyRecords<D> {
    async fn create_record(&self, record: &DurableGameRecord) -> Result<(), PersistenceError> {
        self.inner.create_record(record).await
    }

    async fn load_record(&self, session_id: &str) -> Result<Option<DurableGameRecord>, PersistenceError> {
        self.inner.load_record(session_id).await
    }

    async fn update_progress(
        &self,
        session_id: &str,
        fen: &str,
        is_over: bool,
        winner: Winner,
        now: u64,
    ) -> Result<(), PersistenceError> {
        self.inner
            .update_progress(session_id, fen, is_over, winner, now)
            .await
    }

    async fn mark_over(&self, session_id: &str, winner: Winner, now: u64) -> Result<(), PersistenceError> {
        if self.fail_mark_over.iter().any(|id| id == session_id) {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected failure",
            )));
        }
        self.inner.mark_over(session_id, winner, now).await
    }

    async fn list_stale(&self, cutoff: u64) -> Result<Vec<DurableGameRecord>, PersistenceError> {
        self.inner.list_stale(cutoff).await
    }

    async fn list_finished_cached(&self, cutoff: u64) -> Result<Vec<DurableGameRecord>, PersistenceError> {
        self.inner.list_finished_cached(cutoff).await
    }

    async fn mark_cache_evicted(&self, session_id: &str) -> Result<(), PersistenceError> {
        self.inner.mark_cache_evicted(session_id).await
    }
}
