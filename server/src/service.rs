//! Request orchestration: load → decode → mutate → engine → encode → store.
//!
//! Every mutating call holds the session's lock from the cache read until
//! both stores are written, so concurrent requests for one session cannot
//! lose updates. Engine failures return before any store is touched.

use std::sync::Arc;
use std::time::Duration;

use chess::Winner;
use engine::{Engine, EngineLauncher, RankedMove};
use serde::Serialize;

use crate::error::ServiceError;
use crate::persistence::{now_timestamp, DurableGameRecord, GameRecordStore, SessionCache};
use crate::pool::EnginePool;
use crate::session::{EngineTurn, GameSession, SessionLocks};

/// Engine budgets applied to every session.
#[derive(Debug, Clone)]
pub struct PlaySettings {
    pub move_time: Duration,
    pub analysis_depth: u8,
    pub analysis_lines: usize,
}

impl Default for PlaySettings {
    fn default() -> Self {
        Self {
            move_time: Duration::from_secs(2),
            analysis_depth: 18,
            analysis_lines: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Ongoing,
    EndedOnUserMove,
    EndedOnEngineMove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub user_move: String,
    pub engine_move: Option<String>,
    pub engine_move_san: Option<String>,
    pub fen: String,
    pub status: MoveStatus,
    pub winner: Winner,
}

/// Snapshot of a session as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameView {
    pub session_id: String,
    pub fen: String,
    pub moves: Vec<String>,
    pub rating: u32,
    pub is_over: bool,
    pub winner: Winner,
}

impl From<&GameSession> for GameView {
    fn from(session: &GameSession) -> Self {
        Self {
            session_id: session.session_id().to_string(),
            fen: session.fen(),
            moves: session.game().uci_moves(),
            rating: session.rating(),
            is_over: session.is_over(),
            winner: session.winner(),
        }
    }
}

/// Precomputed payload for narrative generation by an external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisHandoff {
    pub fen: String,
    pub moves: Vec<RankedMove>,
}

pub struct GameService<C, D, L: EngineLauncher> {
    cache: Arc<C>,
    records: Arc<D>,
    pool: Arc<EnginePool<L>>,
    locks: Arc<SessionLocks>,
    settings: PlaySettings,
}

impl<C, D, L> GameService<C, D, L>
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
        settings: PlaySettings,
    ) -> Self {
        Self {
            cache,
            records,
            pool,
            locks,
            settings,
        }
    }

    /// Create a session at `rating`. The engine is launched lazily on the
    /// first move or analysis request.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn start_game(&self, rating: u32) -> Result<GameView, ServiceError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let _guard = self.locks.lock(&session_id).await;

        let session = GameSession::new(session_id.clone(), rating);
        self.cache.set(&session_id, session.to_bytes()?).await?;

        let record = DurableGameRecord::new(&session_id, session.fen(), rating, now_timestamp());
        if let Err(e) = self.records.create_record(&record).await {
            if let Err(cleanup) = self.cache.delete(&session_id).await {
                tracing::warn!(session_id = %session_id, "Failed to remove orphaned cache entry: {}", cleanup);
            }
            return Err(e.into());
        }

        tracing::info!(session_id = %session_id, rating, "Game started");
        Ok(GameView::from(&session))
    }

    /// Play the user's move and, unless it ended the game, the engine's reply.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn play_move(&self, session_id: &str, uci: &str) -> Result<MoveOutcome, ServiceError> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;

        let user_move = session.apply_user_move(uci)?;
        let turn = session
            .apply_engine_move(&self.pool, self.settings.move_time)
            .await?;

        let (engine_move, engine_move_san, status) = match turn {
            EngineTurn::NoMove => (None, None, MoveStatus::EndedOnUserMove),
            EngineTurn::Played { mv, san, is_over } => {
                let status = if is_over {
                    MoveStatus::EndedOnEngineMove
                } else {
                    MoveStatus::Ongoing
                };
                (Some(mv), Some(san), status)
            }
        };

        self.store(&session).await?;

        let winner = session.winner();
        if status != MoveStatus::Ongoing {
            tracing::info!(
                session_id = %session_id,
                reason = session.outcome().reason(),
                winner = %winner,
                "Game over"
            );
            self.pool.release(session_id).await;
        }

        Ok(MoveOutcome {
            user_move,
            engine_move,
            engine_move_san,
            fen: session.fen(),
            status,
            winner,
        })
    }

    /// Take back the last engine reply and the user move before it. A game
    /// that ended on the user's move has no reply to take back and fails
    /// with `EmptyHistory`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn undo(&self, session_id: &str) -> Result<GameView, ServiceError> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;

        session.undo()?;
        self.store(&session).await?;

        Ok(GameView::from(&session))
    }

    /// Full-strength candidate moves for the current position.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn top_moves(&self, session_id: &str) -> Result<AnalysisHandoff, ServiceError> {
        let _guard = self.locks.lock(session_id).await;
        let session = self.load(session_id).await?;

        let fen = session.fen();
        if session.is_over() {
            return Ok(AnalysisHandoff {
                fen,
                moves: Vec::new(),
            });
        }

        let engine = self.pool.acquire(session_id, session.rating()).await?;
        let moves = engine
            .top_moves(
                session.game(),
                self.settings.analysis_lines,
                self.settings.analysis_depth,
            )
            .await?;

        Ok(AnalysisHandoff { fen, moves })
    }

    pub async fn game_state(&self, session_id: &str) -> Result<GameView, ServiceError> {
        let session = self.load(session_id).await?;
        Ok(GameView::from(&session))
    }

    /// Close a session: release its engine, drop the cache entry and mark the
    /// durable record over. Unreadable cache state does not block cleanup.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn end_game(&self, session_id: &str) -> Result<Winner, ServiceError> {
        let _guard = self.locks.lock(session_id).await;

        let winner = match self.load(session_id).await {
            Ok(session) => session.winner(),
            Err(ServiceError::SessionNotFound(_)) => Winner::None,
            Err(e @ ServiceError::CorruptState { .. }) => {
                tracing::warn!(session_id = %session_id, "Ending session with unreadable state: {}", e);
                Winner::None
            }
            Err(e) => return Err(e),
        };

        self.pool.release(session_id).await;
        self.cache.delete(session_id).await?;
        self.records
            .mark_over(session_id, winner, now_timestamp())
            .await?;

        tracing::info!(session_id = %session_id, winner = %winner, "Game ended");
        Ok(winner)
    }

    async fn load(&self, session_id: &str) -> Result<GameSession, ServiceError> {
        let bytes = self
            .cache
            .get(session_id)
            .await?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;
        GameSession::from_bytes(session_id, &bytes).inspect_err(|e| {
            tracing::error!(session_id = %session_id, "Discarding cached state: {}", e);
        })
    }

    async fn store(&self, session: &GameSession) -> Result<(), ServiceError> {
        let session_id = session.session_id();
        self.cache.set(session_id, session.to_bytes()?).await?;
        self.records
            .update_progress(
                session_id,
                &session.fen(),
                session.is_over(),
                session.winner(),
                now_timestamp(),
            )
            .await?;
        Ok(())
    }
}
