use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Console severities, ordered so that a threshold comparison is a plain `<`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
    Disabled = 5,
}

impl ConsoleLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(ConsoleLevel::Debug),
            "info" => Some(ConsoleLevel::Info),
            "warn" | "warning" => Some(ConsoleLevel::Warn),
            "error" => Some(ConsoleLevel::Error),
            "fatal" => Some(ConsoleLevel::Fatal),
            "disabled" | "off" => Some(ConsoleLevel::Disabled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolveKind {
    Dependency,
    Plugin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactEventKind {
    Started,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactEvent {
    pub resolve_kind: ResolveKind,
    pub kind: ArtifactEventKind,
    pub dependency_id: String,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
}

impl ArtifactEvent {
    pub fn started(resolve_kind: ResolveKind, dependency_id: impl Into<String>) -> Self {
        Self {
            resolve_kind,
            kind: ArtifactEventKind::Started,
            dependency_id: dependency_id.into(),
            error_message: None,
            error_detail: None,
        }
    }

    pub fn completed(resolve_kind: ResolveKind, dependency_id: impl Into<String>) -> Self {
        Self {
            kind: ArtifactEventKind::Completed,
            ..Self::started(resolve_kind, dependency_id)
        }
    }

    pub fn failed(
        resolve_kind: ResolveKind,
        dependency_id: impl Into<String>,
        error_message: impl Into<String>,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            resolve_kind,
            kind: ArtifactEventKind::Failed,
            dependency_id: dependency_id.into(),
            error_message: Some(error_message.into()),
            error_detail,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleEvent {
    pub level: ConsoleLevel,
    pub message: String,
    pub error_detail: Option<String>,
}

/// Per-command progress state: two event queues and a one-way cancel flag.
///
/// The worker side pushes; the host side drains by polling. A drain of an
/// empty queue yields `None`, never an empty batch.
#[derive(Debug, Default)]
pub struct EventChannel {
    canceled: AtomicBool,
    downloads: Mutex<VecDeque<ArtifactEvent>>,
    console: Mutex<VecDeque<ConsoleEvent>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_download(&self, event: ArtifactEvent) {
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    pub fn push_console(&self, event: ConsoleEvent) {
        self.console
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    pub fn drain_downloads(&self) -> Option<Vec<ArtifactEvent>> {
        drain(&self.downloads)
    }

    pub fn drain_console(&self) -> Option<Vec<ConsoleEvent>> {
        drain(&self.console)
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    // Indicator updates are accepted and dropped.

    pub fn set_text(&self, _text: &str) {}

    pub fn set_text2(&self, _text: &str) {}

    pub fn set_fraction(&self, _fraction: f64) {}

    pub fn set_indeterminate(&self, _indeterminate: bool) {}
}

fn drain<T>(queue: &Mutex<VecDeque<T>>) -> Option<Vec<T>> {
    let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
    if queue.is_empty() {
        return None;
    }
    Some(queue.drain(..).collect())
}

/// Channels of the commands currently open, keyed by command id.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    inner: Arc<AsyncMutex<HashMap<String, Arc<EventChannel>>>>,
}

impl ChannelRegistry {
    pub async fn open(&self) -> String {
        let command_id = Uuid::new_v4().to_string();
        self.inner
            .lock()
            .await
            .insert(command_id.clone(), Arc::new(EventChannel::new()));
        command_id
    }

    pub async fn get(&self, command_id: &str) -> Option<Arc<EventChannel>> {
        self.inner.lock().await.get(command_id).cloned()
    }

    pub async fn close(&self, command_id: &str) -> bool {
        self.inner.lock().await.remove(command_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
