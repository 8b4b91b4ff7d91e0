use engine::EngineError;

use crate::persistence::PersistenceError;

/// Errors surfaced to callers of the game service.
///
/// Engine and store errors are wrapped here so callers never see
/// process- or database-specific shapes.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Engine could not be started: {0}")]
    EngineSpawn(#[source] EngineError),
    #[error("Engine request failed: {0}")]
    EngineQuery(#[source] EngineError),
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Session {session_id} has unreadable state: {reason}")]
    CorruptState { session_id: String, reason: String },
    #[error("No engine-answered move to undo")]
    EmptyHistory,
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] PersistenceError),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl ServiceError {
    /// Transient store or engine-request failures. Everything else is
    /// terminal for the request as issued.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::EngineQuery(_))
    }

    /// Corrupt state is reported to callers as a missing session.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::CorruptState { .. })
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        if err.is_spawn_failure() {
            Self::EngineSpawn(err)
        } else {
            Self::EngineQuery(err)
        }
    }
}

impl From<PersistenceError> for ServiceError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(session_id) => Self::SessionNotFound(session_id),
            other => Self::StoreUnavailable(other),
        }
    }
}
