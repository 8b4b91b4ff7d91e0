//! Versioned cache record for a session.
//!
//! Only the move list and configuration are stored. The board is always
//! rebuilt by replay and the engine handle lives in the pool.

use serde::{Deserialize, Serialize};

pub const SESSION_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Canonical UCI moves from the standard starting position.
    pub moves: Vec<String>,
    pub rating: u32,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    #[serde(flatten)]
    state: &'a SessionState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    #[serde(flatten)]
    state: SessionState,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed session record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported session record version {0}")]
    UnsupportedVersion(u32),
}

impl SessionState {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&EnvelopeRef {
            version: SESSION_STATE_VERSION,
            state: self,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.version != SESSION_STATE_VERSION {
            return Err(RecordError::UnsupportedVersion(probe.version));
        }
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        debug_assert_eq!(envelope.version, SESSION_STATE_VERSION);
        Ok(envelope.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let state = SessionState {
            session_id: "abc".to_string(),
            moves: vec!["e2e4".to_string(), "c7c5".to_string()],
            rating: 1700,
        };
        let json: serde_json::Value = serde_json::from_slice(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "version": 1,
                "session_id": "abc",
                "moves": ["e2e4", "c7c5"],
                "rating": 1700
            })
        );
        assert_eq!(SessionState::from_bytes(&state.to_bytes().unwrap()).unwrap(), state);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let bytes = br#"{"version":2,"session_id":"abc","moves":[],"rating":1500}"#;
        assert!(matches!(
            SessionState::from_bytes(bytes),
            Err(RecordError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            SessionState::from_bytes(b"\x80\x04pickle"),
            Err(RecordError::Malformed(_))
        ));
        assert!(matches!(
            SessionState::from_bytes(br#"{"version":1,"moves":[]}"#),
            Err(RecordError::Malformed(_))
        ));
    }
}
