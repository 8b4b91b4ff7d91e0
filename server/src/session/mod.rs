//! Per-request game session rebuilt from its cache record.

mod locks;
mod record;

pub use locks::SessionLocks;
pub use record::{RecordError, SessionState, SESSION_STATE_VERSION};

use std::time::Duration;

use chess::{Game, GameError, GameOutcome, Winner};
use engine::{Engine, EngineError, EngineLauncher};

use crate::error::ServiceError;
use crate::pool::EnginePool;

/// Result of asking the engine to reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineTurn {
    /// The game was already over, so the engine did not move.
    NoMove,
    Played {
        mv: String,
        san: String,
        is_over: bool,
    },
}

/// A game decoded for the duration of one request.
///
/// State machine: *active* until the position after some move is terminal,
/// then *over*. Only undo can move it back.
#[derive(Debug, Clone)]
pub struct GameSession {
    session_id: String,
    rating: u32,
    game: Game,
}

impl GameSession {
    pub fn new(session_id: impl Into<String>, rating: u32) -> Self {
        Self {
            session_id: session_id.into(),
            rating,
            game: Game::new(),
        }
    }

    /// Replay the recorded moves from the starting position.
    pub fn decode(state: &SessionState) -> Result<Self, ServiceError> {
        let game = Game::replay(&state.moves).map_err(|e| ServiceError::CorruptState {
            session_id: state.session_id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            session_id: state.session_id.clone(),
            rating: state.rating,
            game,
        })
    }

    /// Decode cache bytes stored under `session_id`.
    pub fn from_bytes(session_id: &str, bytes: &[u8]) -> Result<Self, ServiceError> {
        let corrupt = |reason: String| ServiceError::CorruptState {
            session_id: session_id.to_string(),
            reason,
        };
        let state = SessionState::from_bytes(bytes).map_err(|e| corrupt(e.to_string()))?;
        if state.session_id != session_id {
            return Err(corrupt(format!("record belongs to {}", state.session_id)));
        }
        Self::decode(&state)
    }

    pub fn encode(&self) -> SessionState {
        SessionState {
            session_id: self.session_id.clone(),
            moves: self.game.uci_moves(),
            rating: self.rating,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ServiceError> {
        self.encode()
            .to_bytes()
            .map_err(|e| ServiceError::StoreUnavailable(e.into()))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn rating(&self) -> u32 {
        self.rating
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn fen(&self) -> String {
        self.game.to_fen()
    }

    pub fn outcome(&self) -> GameOutcome {
        self.game.outcome()
    }

    pub fn is_over(&self) -> bool {
        self.game.is_over()
    }

    pub fn winner(&self) -> Winner {
        self.outcome().winner()
    }

    /// Play the user's move. Rejected moves leave the session unchanged.
    pub fn apply_user_move(&mut self, uci: &str) -> Result<String, ServiceError> {
        if self.is_over() {
            return Err(ServiceError::IllegalMove(format!("{} (game is over)", uci)));
        }
        match self.game.play_uci(uci.trim()) {
            Ok(entry) => Ok(entry.uci),
            Err(GameError::IllegalMove(_) | GameError::Notation(_)) => {
                Err(ServiceError::IllegalMove(uci.to_string()))
            }
            Err(e) => Err(ServiceError::IllegalMove(format!("{}: {}", uci, e))),
        }
    }

    /// Let the pooled engine for this session reply within `budget`.
    pub async fn apply_engine_move<L: EngineLauncher>(
        &mut self,
        pool: &EnginePool<L>,
        budget: Duration,
    ) -> Result<EngineTurn, ServiceError> {
        if self.is_over() {
            return Ok(EngineTurn::NoMove);
        }

        let engine = pool.acquire(&self.session_id, self.rating).await?;
        let mv = engine.best_move(&self.game, budget).await?;
        let entry = self.game.make_move(mv).map_err(|e| {
            ServiceError::EngineQuery(EngineError::Query(format!("engine move rejected: {}", e)))
        })?;

        tracing::debug!(session_id = %self.session_id, mv = %entry.uci, "Engine replied");
        Ok(EngineTurn::Played {
            mv: entry.uci,
            san: entry.san,
            is_over: self.is_over(),
        })
    }

    /// Take back the engine's reply and the user's move before it.
    /// Returns the resulting position.
    ///
    /// An odd-length history ends in a user move the engine never answered
    /// (the game ended on it), so there is no pair to take back.
    pub fn undo(&mut self) -> Result<String, ServiceError> {
        if self.game.move_count() % 2 != 0 {
            return Err(ServiceError::EmptyHistory);
        }
        self.game.undo_plies(2).map_err(|_| ServiceError::EmptyHistory)?;
        Ok(self.fen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn session_with(moves: &[&str]) -> GameSession {
        GameSession::decode(&SessionState {
            session_id: "s1".to_string(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
            rating: 1600,
        })
        .unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_position() {
        let session = session_with(&["e2e4", "c7c5", "g1f3", "d7d6", "d2d4"]);
        let bytes = session.to_bytes().unwrap();
        let decoded = GameSession::from_bytes("s1", &bytes).unwrap();
        assert_eq!(decoded.fen(), session.fen());
        assert_eq!(decoded.rating(), 1600);
        assert_eq!(decoded.encode(), session.encode());
    }

    #[test]
    fn test_unreplayable_record_is_corrupt() {
        let state = SessionState {
            session_id: "s1".to_string(),
            moves: vec!["e2e4".to_string(), "e2e4".to_string()],
            rating: 1500,
        };
        assert!(matches!(
            GameSession::decode(&state),
            Err(ServiceError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_record_for_other_session_is_corrupt() {
        let bytes = session_with(&[]).to_bytes().unwrap();
        assert!(matches!(
            GameSession::from_bytes("someone-else", &bytes),
            Err(ServiceError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_illegal_user_move_does_not_mutate() {
        let mut session = session_with(&["e2e4"]);
        let before = session.encode();
        assert!(matches!(
            session.apply_user_move("e7e4"),
            Err(ServiceError::IllegalMove(_))
        ));
        assert!(matches!(
            session.apply_user_move("zz"),
            Err(ServiceError::IllegalMove(_))
        ));
        assert_eq!(session.encode(), before);
    }

    #[tokio::test]
    async fn test_engine_move_appends_and_undo_restores() {
        let launcher = FakeLauncher::new();
        let pool = EnginePool::new(launcher.clone());
        let mut session = GameSession::new("s1", 1500);
        assert_eq!(session.fen(), START_FEN);

        session.apply_user_move("d2d4").unwrap();
        let turn = session
            .apply_engine_move(&pool, Duration::from_millis(10))
            .await
            .unwrap();
        let EngineTurn::Played { mv, san, is_over } = turn else {
            panic!("engine did not move");
        };
        assert!(!is_over);
        assert_eq!(session.game().history()[1].san, san);
        assert_eq!(session.game().uci_moves()[1], mv);
        assert_eq!(session.game().move_count(), 2);
        assert_eq!(launcher.spawned(), 1);

        assert_eq!(session.undo().unwrap(), START_FEN);
        assert_eq!(session.game().move_count(), 0);
    }

    #[tokio::test]
    async fn test_no_engine_move_after_user_mates() {
        let launcher = FakeLauncher::new();
        let pool = EnginePool::new(launcher.clone());
        let mut session = session_with(&["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6"]);

        session.apply_user_move("h5f7").unwrap();
        assert!(session.is_over());
        assert_eq!(session.winner(), Winner::White);

        let turn = session
            .apply_engine_move(&pool, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(turn, EngineTurn::NoMove);
        assert_eq!(launcher.spawned(), 0);
        assert!(matches!(
            session.apply_user_move("a2a3"),
            Err(ServiceError::IllegalMove(_))
        ));

        assert!(matches!(session.undo(), Err(ServiceError::EmptyHistory)));
        assert_eq!(session.game().move_count(), 7);
        assert_eq!(session.game().side_to_move(), chess::Side::Black);
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_moves_unchanged() {
        let launcher = FakeLauncher::new();
        launcher.fail_queries(true);
        let pool = EnginePool::new(launcher.clone());
        let mut session = session_with(&["e2e4"]);

        let err = session
            .apply_engine_move(&pool, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EngineQuery(_)));
        assert_eq!(session.game().move_count(), 1);
    }

    #[test]
    fn test_undo_requires_two_moves() {
        let mut empty = session_with(&[]);
        assert!(matches!(empty.undo(), Err(ServiceError::EmptyHistory)));

        let mut one = session_with(&["e2e4"]);
        assert!(matches!(one.undo(), Err(ServiceError::EmptyHistory)));
        assert_eq!(one.game().move_count(), 1);
    }
}
