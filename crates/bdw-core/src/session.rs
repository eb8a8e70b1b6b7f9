use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::engine::{EngineContext, EngineSettings, EngineSlot, ResolutionEngine, ResolvedProject};

/// Resolved projects handed out to the host by opaque handle.
#[derive(Debug, Default)]
pub struct ProjectHandles {
    inner: Mutex<HashMap<String, ResolvedProject>>,
}

impl ProjectHandles {
    pub fn register(&self, project: &ResolvedProject) -> String {
        let handle = Uuid::new_v4().to_string();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.clone(), project.clone());
        handle
    }

    pub fn get(&self, handle: &str) -> Option<ResolvedProject> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

pub struct EngineSession {
    pub id: String,
    pub engine: Arc<dyn ResolutionEngine>,
    pub settings: EngineSettings,
    pub slot: EngineSlot,
    pub handles: Arc<ProjectHandles>,
}

impl EngineSession {
    pub fn new(engine: Arc<dyn ResolutionEngine>, settings: EngineSettings) -> Self {
        let slot = EngineSlot::new(EngineContext::new(settings.logging_threshold));
        Self {
            id: Uuid::new_v4().to_string(),
            engine,
            settings,
            slot,
            handles: Arc::new(ProjectHandles::default()),
        }
    }
}

/// A lightweight session for index operations; it carries no engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSession {
    pub id: String,
    pub created_at: i64,
}

impl IndexSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: bdw_util::now_millis(),
        }
    }
}

impl Default for IndexSession {
    fn default() -> Self {
        Self::new()
    }
}

pub enum Session {
    Engine(Arc<EngineSession>),
    Index(IndexSession),
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<AsyncMutex<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub async fn insert_engine(&self, session: EngineSession) -> Arc<EngineSession> {
        let session = Arc::new(session);
        self.inner
            .lock()
            .await
            .insert(session.id.clone(), Session::Engine(Arc::clone(&session)));
        session
    }

    pub async fn insert_index(&self, session: IndexSession) -> String {
        let id = session.id.clone();
        self.inner
            .lock()
            .await
            .insert(id.clone(), Session::Index(session));
        id
    }

    pub async fn engine(&self, id: &str) -> Option<Arc<EngineSession>> {
        match self.inner.lock().await.get(id) {
            Some(Session::Engine(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.inner.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
