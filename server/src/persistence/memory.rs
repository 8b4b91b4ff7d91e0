use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{PersistenceError, SessionCache};

/// Process-local cache. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for MemorySessionCache {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.entries.read().await.get(session_id).cloned())
    }

    async fn set(&self, session_id: &str, payload: Vec<u8>) -> Result<(), PersistenceError> {
        self.entries
            .write()
            .await
            .insert(session_id.to_string(), payload);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        self.entries.write().await.remove(session_id);
        Ok(())
    }
}
