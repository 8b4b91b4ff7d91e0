//! Session-to-engine pool.
//!
//! Each session id maps to at most one live engine. The map lock is held only
//! to find or insert a slot; engine start-up happens inside the slot's
//! `OnceCell`, so concurrent `acquire` calls for the same fresh id share a
//! single launch while other sessions proceed unblocked.

use std::collections::HashMap;
use std::sync::Arc;

use engine::{Engine, EngineError, EngineLauncher};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinSet;

type Slot<E> = Arc<OnceCell<Arc<E>>>;

pub struct EnginePool<L: EngineLauncher> {
    launcher: L,
    slots: Mutex<HashMap<String, Slot<L::Engine>>>,
}

impl<L: EngineLauncher> EnginePool<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Engine for `session_id`, launching one at `rating` if none exists.
    ///
    /// An existing engine is returned as-is; its strength is not reapplied
    /// when `rating` differs from the one it was launched with.
    pub async fn acquire(&self, session_id: &str, rating: u32) -> Result<Arc<L::Engine>, EngineError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(session_id.to_string()).or_default().clone()
        };

        let launched = slot
            .get_or_try_init(|| async {
                tracing::info!(session_id = %session_id, rating, "Launching engine for session");
                self.launcher.launch(rating).await.map(Arc::new)
            })
            .await;

        match launched {
            Ok(engine) => Ok(engine.clone()),
            Err(e) => {
                tracing::error!(session_id = %session_id, "Engine launch failed: {}", e);
                let mut slots = self.slots.lock().await;
                let is_empty_slot = slots
                    .get(session_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && current.get().is_none());
                if is_empty_slot {
                    slots.remove(session_id);
                }
                Err(e)
            }
        }
    }

    /// Stop and remove the engine for `session_id`. Returns whether an engine
    /// was running; releasing an unknown id is a no-op.
    ///
    /// A launch still in flight is awaited and its engine stopped, so the
    /// engine never outlives its slot. The caller that started that launch
    /// gets an engine that has already been told to quit.
    pub async fn release(&self, session_id: &str) -> bool {
        let Some(slot) = self.slots.lock().await.remove(session_id) else {
            return false;
        };
        match settled(&slot).await {
            Some(engine) => {
                engine.stop().await;
                tracing::info!(session_id = %session_id, "Released engine");
                true
            }
            None => false,
        }
    }

    /// Stop every pooled engine, including ones still launching. Returns how
    /// many were stopped.
    pub async fn shutdown_all(&self) -> usize {
        let drained: Vec<(String, Slot<L::Engine>)> = self.slots.lock().await.drain().collect();

        let mut stops = JoinSet::new();
        for (session_id, slot) in drained {
            stops.spawn(async move {
                let engine = settled(&slot).await?;
                engine.stop().await;
                Some(session_id)
            });
        }

        let mut stopped = 0;
        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok(Some(session_id)) => {
                    tracing::debug!(session_id = %session_id, "Engine stopped during shutdown");
                    stopped += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Engine stop task failed: {}", e),
            }
        }
        tracing::info!(stopped, "Engine pool shut down");
        stopped
    }

    /// Number of sessions with a running engine.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        let slots = self.slots.lock().await;
        slots.get(session_id).is_some_and(|slot| slot.initialized())
    }
}

/// The slot's engine once any launch in flight has finished. An empty slot
/// with no launch running yields `None` without starting one.
async fn settled<E>(slot: &Slot<E>) -> Option<Arc<E>> {
    slot.get_or_try_init(|| async { Err(()) })
        .await
        .ok()
        .cloned()
}
