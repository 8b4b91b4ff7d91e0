pub mod analysis;
pub mod stockfish;
pub mod strength;
pub mod uci;

pub use analysis::{AbsoluteScore, PrincipalLines, RankedMove};
pub use stockfish::{StockfishEngine, StockfishLauncher, StockfishOptions};
pub use strength::{StrengthTable, StrengthTier, MAX_SKILL_LEVEL};
pub use uci::{UciError, UciMessage};

use std::future::Future;
use std::time::Duration;

use chess::Game;

/// A live engine bound to one session.
///
/// Methods take `&self`; implementations serialize requests internally so a
/// shared handle can be used from any task. Futures are `Send` so callers can
/// drive them from `tokio::spawn`.
pub trait Engine: Send + Sync + 'static {
    /// Best move for the current position of `game`, searched for at most
    /// `budget`. The returned move is legal in that position.
    fn best_move(
        &self,
        game: &Game,
        budget: Duration,
    ) -> impl Future<Output = Result<cozy_chess::Move, EngineError>> + Send;

    /// Up to `min(n, legal moves)` distinct candidate moves at full strength.
    fn top_moves(
        &self,
        game: &Game,
        n: usize,
        depth: u8,
    ) -> impl Future<Output = Result<Vec<RankedMove>, EngineError>> + Send;

    /// Best-effort termination. Never fails; problems are logged.
    fn stop(&self) -> impl Future<Output = ()> + Send;
}

/// Creates engines configured for a playing strength.
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: Engine;

    fn launch(&self, rating: u32) -> impl Future<Output = Result<Self::Engine, EngineError>> + Send;
}

/// Engine analysis information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineInfo {
    pub depth: Option<u8>,
    pub seldepth: Option<u8>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    /// Set when the score is a lowerbound/upperbound.
    pub bounded: bool,
    pub pv: Vec<String>, // Principal variation
    pub multipv: Option<u8>,
    pub currmove: Option<String>,
    pub hashfull: Option<u16>,
    pub nps: Option<u64>,
}

/// Score relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine binary not found at {0}")]
    NotFound(String),
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),
    #[error("Engine handshake failed: {0}")]
    Handshake(String),
    #[error("Engine IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine query failed: {0}")]
    Query(String),
    #[error("Engine process terminated")]
    Terminated,
    #[error("Engine did not answer within {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    /// Failures that happen while bringing a process up, as opposed to
    /// failures of a request against a running process.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Spawn(_) | Self::Handshake(_))
    }
}
