use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    channel::{ArtifactEvent, ConsoleEvent, ConsoleLevel, EventChannel},
    error::{GatewayError, GatewayResult},
    executor::WorkError,
    model::{ArtifactCoordinates, ArtifactKey, Model, Repository},
    properties::Properties,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    AlwaysUpdate,
    DoNotUpdate,
}

/// What the host asks for when it creates a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub offline: bool,
    pub logging_threshold: ConsoleLevel,
    pub engine_home: Option<PathBuf>,
    pub user_settings_path: Option<PathBuf>,
    pub global_settings_path: Option<PathBuf>,
    pub local_repository_path: Option<PathBuf>,
    pub extra_cli_args: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            offline: false,
            logging_threshold: ConsoleLevel::Info,
            engine_home: None,
            user_settings_path: None,
            global_settings_path: None,
            local_repository_path: None,
            extra_cli_args: Vec::new(),
        }
    }
}

/// Settings an engine is created with, derived from [`SessionSettings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub offline: bool,
    pub logging_threshold: ConsoleLevel,
    pub engine_home: Option<PathBuf>,
    pub user_settings_path: Option<PathBuf>,
    pub global_settings_path: Option<PathBuf>,
    pub local_repository_path: Option<PathBuf>,
    pub snapshot_update_policy: UpdatePolicy,
    pub plugin_update_policy: UpdatePolicy,
    pub properties: Properties,
}

impl EngineSettings {
    /// `-U`/`--update-snapshots` in the extra arguments switches both update
    /// policies to always-update; `-Dname[=value]` adds an execution property
    /// on top of the system properties.
    pub fn configure(session: &SessionSettings, system_properties: &Properties) -> Self {
        let update = session
            .extra_cli_args
            .iter()
            .any(|arg| arg == "-U" || arg == "--update-snapshots");
        let policy = if update {
            UpdatePolicy::AlwaysUpdate
        } else {
            UpdatePolicy::DoNotUpdate
        };

        let mut properties = system_properties.clone();
        for arg in &session.extra_cli_args {
            let Some(definition) = arg.strip_prefix("-D") else {
                continue;
            };
            let (name, value) = definition.split_once('=').unwrap_or((definition, "true"));
            if !name.is_empty() {
                properties.insert(name.to_string(), value.to_string());
            }
        }

        Self {
            offline: session.offline,
            logging_threshold: session.logging_threshold,
            engine_home: session.engine_home.clone(),
            user_settings_path: session.user_settings_path.clone(),
            global_settings_path: session.global_settings_path.clone(),
            local_repository_path: session.local_repository_path.clone(),
            snapshot_update_policy: policy,
            plugin_update_policy: policy,
            properties,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("resolution failed: {0}")]
    Resolution(String),
    #[error("canceled")]
    Canceled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Failures that artifact resolution reports as "nothing resolved".
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_) | EngineError::Resolution(_))
    }
}

impl From<EngineError> for WorkError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Canceled => WorkError::Canceled,
            EngineError::NotFound(message) => WorkError::failed("NotFound", message),
            EngineError::Resolution(message) => WorkError::failed("Resolution", message),
            EngineError::Io(err) => WorkError::failed("Io", err.to_string()),
            EngineError::Other(message) => WorkError::failed("Engine", message),
        }
    }
}

/// A failure the engine recorded while building one project. These are
/// turned into per-file problems, never raised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineFailure {
    InvalidModel {
        message: String,
        validation_messages: Option<Vec<String>>,
        cause: Option<String>,
    },
    ProjectBuilding {
        message: String,
        cause: Option<String>,
    },
    Other {
        message: String,
    },
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineFailure::InvalidModel { message, .. } => write!(f, "invalid model: {message}"),
            EngineFailure::ProjectBuilding { message, .. } => {
                write!(f, "project building failed: {message}")
            }
            EngineFailure::Other { message } => f.write_str(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedProject {
    pub model: Model,
    pub active_profiles: Vec<String>,
    pub parent: Option<Box<ResolvedProject>>,
}

/// Everything one project resolution produced: the project when it could be
/// built, plus whatever went wrong along the way.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectOutcome {
    pub project: Option<ResolvedProject>,
    pub failures: Vec<EngineFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub coordinates: ArtifactCoordinates,
    pub remote_repositories: Vec<Repository>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub coordinates: ArtifactCoordinates,
    pub file: Option<PathBuf>,
    pub resolved: bool,
}

/// The dependency-resolution collaborator behind a session.
///
/// Calls run on blocking threads and receive the batch's [`EngineContext`];
/// implementations should poll [`EngineContext::is_canceled`] between steps
/// and return [`EngineError::Canceled`] when it flips.
pub trait ResolutionEngine: Send + Sync {
    fn resolve_project(
        &self,
        context: &EngineContext,
        file: &Path,
        active_profiles: &[String],
        inactive_profiles: &[String],
    ) -> Result<ProjectOutcome, EngineError>;

    fn resolve_artifacts(
        &self,
        context: &EngineContext,
        requests: &[ArtifactRequest],
    ) -> Result<Vec<ResolvedArtifact>, EngineError>;

    /// The given artifacts plus everything they depend on at runtime.
    fn resolve_artifacts_transitively(
        &self,
        context: &EngineContext,
        artifacts: &[ArtifactCoordinates],
        remote_repositories: &[Repository],
    ) -> Result<Vec<ResolvedArtifact>, EngineError>;

    /// Runs one goal against the project described by `file`. An empty list
    /// means the goal succeeded.
    fn execute_goal(
        &self,
        context: &EngineContext,
        file: &Path,
        active_profiles: &[String],
        inactive_profiles: &[String],
        goal: &str,
    ) -> Result<Vec<EngineFailure>, EngineError>;

    fn project_cache_len(&self) -> usize;

    fn clear_project_caches(&self);

    fn release(&self) {}
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, settings: &EngineSettings) -> Result<Arc<dyn ResolutionEngine>, EngineError>;
}

/// Console sink of the engine. Messages below the threshold are dropped; the
/// rest go, newline-terminated, to the channel of the command in progress.
#[derive(Debug)]
pub struct ConsoleLogger {
    threshold: ConsoleLevel,
    wrappee: RwLock<Option<Arc<EventChannel>>>,
}

impl ConsoleLogger {
    pub fn new(threshold: ConsoleLevel) -> Self {
        Self {
            threshold,
            wrappee: RwLock::new(None),
        }
    }

    pub fn threshold(&self) -> ConsoleLevel {
        self.threshold
    }

    pub fn set_wrappee(&self, channel: Option<Arc<EventChannel>>) {
        *self.wrappee.write().unwrap_or_else(PoisonError::into_inner) = channel;
    }

    pub fn wrappee(&self) -> Option<Arc<EventChannel>> {
        self.wrappee
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_enabled(&self, level: ConsoleLevel) -> bool {
        level >= self.threshold && level != ConsoleLevel::Disabled
    }

    pub fn print(&self, level: ConsoleLevel, message: &str, error_detail: Option<String>) {
        if !self.is_enabled(level) {
            return;
        }
        if let Some(channel) = self.wrappee() {
            channel.push_console(ConsoleEvent {
                level,
                message: format!("{message}\n"),
                error_detail,
            });
        }
    }

    pub fn debug(&self, message: &str) {
        self.print(ConsoleLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.print(ConsoleLevel::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.print(ConsoleLevel::Warn, message, None);
    }

    pub fn error(&self, message: &str, error_detail: Option<String>) {
        self.print(ConsoleLevel::Error, message, error_detail);
    }
}

/// Engine state scoped to one resolution batch: the command channel, the
/// unresolved-artifact collector and the artifact lookup cache.
#[derive(Debug)]
pub struct EngineContext {
    console: ConsoleLogger,
    unresolved: Mutex<BTreeSet<ArtifactKey>>,
    artifacts: Mutex<HashMap<ArtifactCoordinates, Option<PathBuf>>>,
}

impl EngineContext {
    pub fn new(threshold: ConsoleLevel) -> Self {
        Self {
            console: ConsoleLogger::new(threshold),
            unresolved: Mutex::new(BTreeSet::new()),
            artifacts: Mutex::new(HashMap::new()),
        }
    }

    pub fn console(&self) -> &ConsoleLogger {
        &self.console
    }

    pub fn attach(&self, channel: Arc<EventChannel>) {
        self.console.set_wrappee(Some(channel));
    }

    /// Detaches the channel and drops every per-batch cache.
    pub fn reset(&self) {
        self.console.set_wrappee(None);
        self.unresolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_canceled(&self) -> bool {
        self.console
            .wrappee()
            .is_some_and(|channel| channel.is_canceled())
    }

    /// Forwards an indicator update; `None` marks the work as indeterminate.
    pub fn progress(&self, text: &str, fraction: Option<f64>) {
        let Some(channel) = self.console.wrappee() else {
            return;
        };
        channel.set_text(text);
        match fraction {
            Some(fraction) => channel.set_fraction(fraction),
            None => channel.set_indeterminate(true),
        }
    }

    pub fn download_event(&self, event: ArtifactEvent) {
        if let Some(channel) = self.console.wrappee() {
            channel.push_download(event);
        }
    }

    pub fn record_unresolved(&self, key: ArtifactKey) {
        self.unresolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    pub fn take_unresolved(&self) -> BTreeSet<ArtifactKey> {
        std::mem::take(&mut *self.unresolved.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn cached_artifact(&self, coordinates: &ArtifactCoordinates) -> Option<Option<PathBuf>> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(coordinates)
            .cloned()
    }

    pub fn cache_artifact(&self, coordinates: ArtifactCoordinates, file: Option<PathBuf>) {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(coordinates, file);
    }

    pub fn cached_artifact_count(&self) -> usize {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Owner of a session's [`EngineContext`]. One batch at a time holds it.
#[derive(Clone, Debug)]
pub struct EngineSlot {
    lock: Arc<AsyncMutex<()>>,
    context: Arc<EngineContext>,
}

impl EngineSlot {
    pub fn new(context: EngineContext) -> Self {
        Self {
            lock: Arc::new(AsyncMutex::new(())),
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Waits for the context, giving up with `Canceled` once the command's
    /// channel is canceled. The returned guard is meant to be cloned into
    /// every piece of work of the batch, so detached work keeps the context
    /// until it really ends.
    pub async fn acquire(
        &self,
        channel: Arc<EventChannel>,
        poll_interval: Duration,
    ) -> GatewayResult<Arc<BatchGuard>> {
        loop {
            if channel.is_canceled() {
                return Err(GatewayError::Canceled);
            }
            let lock = Arc::clone(&self.lock);
            if let Ok(permit) = tokio::time::timeout(poll_interval, lock.lock_owned()).await {
                self.context.attach(channel);
                return Ok(Arc::new(BatchGuard {
                    context: Arc::clone(&self.context),
                    _permit: permit,
                }));
            }
        }
    }
}

pub struct BatchGuard {
    context: Arc<EngineContext>,
    _permit: OwnedMutexGuard<()>,
}

impl BatchGuard {
    pub fn context(&self) -> &EngineContext {
        &self.context
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.context.reset();
    }
}
