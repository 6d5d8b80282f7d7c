use std::collections::HashMap;
use std::sync::Arc;

use memodi_core::{ChatBackend, SessionState};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A live session and the model backend bound to it at creation.
#[derive(Clone)]
pub struct SessionHandle {
    pub state: Arc<Mutex<SessionState>>,
    pub backend: Arc<dyn ChatBackend>,
}

impl SessionHandle {
    pub fn new(state: SessionState, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            backend,
        }
    }
}

/// In-memory session table. Each session is locked independently, so one
/// slow model call never blocks another session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, handle);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
