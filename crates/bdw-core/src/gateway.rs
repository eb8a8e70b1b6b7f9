use std::{collections::BTreeSet, path::Path, sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    assembler::ModelAssembler,
    channel::{ArtifactEvent, ChannelRegistry, ConsoleEvent, EventChannel},
    engine::{ArtifactRequest, EngineFactory, EngineSettings, ResolvedArtifact, SessionSettings},
    error::{GatewayError, GatewayResult},
    executor::{reclassify, TaskExecutor, WorkError, DEFAULT_POLL_INTERVAL},
    lease::LeaseCounter,
    model::{ArtifactCoordinates, Model, Repository},
    profiles::{ExplicitProfiles, ProfileApplication, ProfileResolver},
    properties::{system_properties, Properties},
    result::{
        build_execution_result, build_goal_result, ExecutionRequest, ExecutionResult,
        GoalExecutionResult, LongRunningTaskStatus,
    },
    session::{EngineSession, IndexSession, Session, SessionRegistry},
    token::{Token, TokenGuard},
};

/// Reports whether the host that launched the worker is still around.
pub trait Watchdog: Send + Sync {
    fn is_alive(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub poll_interval: Duration,
    pub system_properties: Properties,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            system_properties: system_properties(),
        }
    }
}

impl GatewayConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_system_properties(mut self, system_properties: Properties) -> Self {
        self.system_properties = system_properties;
        self
    }
}

/// The worker's command surface. Every operation validates the token before
/// it touches any state.
pub struct Gateway {
    guard: TokenGuard,
    executor: TaskExecutor,
    assembler: ModelAssembler,
    system_properties: Properties,
    factory: Arc<dyn EngineFactory>,
    sessions: SessionRegistry,
    channels: ChannelRegistry,
    leases: LeaseCounter,
    watchdog: Option<Arc<dyn Watchdog>>,
}

impl Gateway {
    pub fn new(token: Token, factory: Arc<dyn EngineFactory>, config: GatewayConfig) -> Self {
        Self {
            guard: TokenGuard::new(token),
            executor: TaskExecutor::new(config.poll_interval),
            assembler: ModelAssembler::default(),
            system_properties: config.system_properties,
            factory,
            sessions: SessionRegistry::default(),
            channels: ChannelRegistry::default(),
            leases: LeaseCounter::new(),
            watchdog: None,
        }
    }

    pub fn with_watchdog(mut self, watchdog: Arc<dyn Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn with_assembler(mut self, assembler: ModelAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn leases(&self) -> &LeaseCounter {
        &self.leases
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.leases.subscribe()
    }

    /// Token check alone, for callers that decode request payloads before
    /// handing them to an operation.
    pub fn authorize(&self, token: &str) -> GatewayResult<()> {
        self.guard.validate(token)
    }

    /// Server liveness: true only while a registered watchdog reports the
    /// host alive.
    pub fn ping(&self, token: &str) -> GatewayResult<bool> {
        self.guard.validate(token)?;
        Ok(self.watchdog.as_ref().is_some_and(|w| w.is_alive()))
    }

    pub async fn create_session(&self, token: &str, settings: SessionSettings) -> GatewayResult<String> {
        self.guard.validate(token)?;
        let engine_settings = EngineSettings::configure(&settings, &self.system_properties);
        let engine = self
            .factory
            .create(&engine_settings)
            .map_err(|err| reclassify(err.into()))?;
        let session = self
            .sessions
            .insert_engine(EngineSession::new(engine, engine_settings))
            .await;
        info!(
            "session {} created (offline={}, threshold={:?})",
            session.id, session.settings.offline, session.settings.logging_threshold
        );
        Ok(session.id.clone())
    }

    pub async fn create_index_session(&self, token: &str) -> GatewayResult<String> {
        self.guard.validate(token)?;
        let id = self.sessions.insert_index(IndexSession::new()).await;
        info!("index session {id} created");
        Ok(id)
    }

    /// Session liveness; a known session always answers true.
    pub async fn ping_session(&self, token: &str, session_id: &str) -> GatewayResult<bool> {
        self.guard.validate(token)?;
        if self.sessions.contains(session_id).await {
            Ok(true)
        } else {
            Err(GatewayError::UnknownSession(session_id.to_string()))
        }
    }

    /// Tears down session state. Releasing an unknown or already released
    /// session answers `false`.
    pub async fn release(&self, token: &str, session_id: &str) -> GatewayResult<bool> {
        self.guard.validate(token)?;
        match self.sessions.remove(session_id).await {
            Some(Session::Engine(session)) => {
                session.handles.clear();
                session.engine.clear_project_caches();
                session.engine.release();
                info!("session {session_id} released");
                Ok(true)
            }
            Some(Session::Index(_)) => {
                info!("index session {session_id} released");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn interpolate_and_align(&self, token: &str, model: &Model, base_dir: &Path) -> GatewayResult<Model> {
        self.guard.validate(token)?;
        Ok(self
            .assembler
            .interpolate_and_align(model, base_dir, &self.system_properties))
    }

    pub fn assemble_inheritance(&self, token: &str, child: &Model, parent: &Model) -> GatewayResult<Model> {
        self.guard.validate(token)?;
        Ok(self.assembler.assemble_inheritance(child, parent))
    }

    pub fn apply_profiles(
        &self,
        token: &str,
        model: &Model,
        base_dir: &Path,
        explicit: &ExplicitProfiles,
        always_on: &BTreeSet<String>,
    ) -> GatewayResult<ProfileApplication> {
        self.guard.validate(token)?;
        let resolver = ProfileResolver::new(self.assembler.clone(), self.system_properties.clone());
        Ok(resolver.apply(model, base_dir, explicit, always_on))
    }

    pub async fn open_command(&self, token: &str) -> GatewayResult<String> {
        self.guard.validate(token)?;
        Ok(self.channels.open().await)
    }

    pub async fn close_command(&self, token: &str, command_id: &str) -> GatewayResult<bool> {
        self.guard.validate(token)?;
        Ok(self.channels.close(command_id).await)
    }

    pub async fn cancel_command(&self, token: &str, command_id: &str) -> GatewayResult<bool> {
        self.guard.validate(token)?;
        let channel = self.channel(command_id).await?;
        channel.cancel();
        info!("command {command_id} canceled");
        Ok(true)
    }

    pub async fn pull_download_events(
        &self,
        token: &str,
        command_id: &str,
    ) -> GatewayResult<Option<Vec<ArtifactEvent>>> {
        self.guard.validate(token)?;
        Ok(self.channel(command_id).await?.drain_downloads())
    }

    pub async fn pull_console_events(
        &self,
        token: &str,
        command_id: &str,
    ) -> GatewayResult<Option<Vec<ConsoleEvent>>> {
        self.guard.validate(token)?;
        Ok(self.channel(command_id).await?.drain_console())
    }

    /// Resolves every file of the request, one background run per file.
    ///
    /// A file that fails becomes a result carrying the failure as a problem;
    /// only cancellation aborts the batch. Handles handed out by an earlier
    /// batch of the session stop being valid once a new batch starts.
    pub async fn resolve_projects(
        &self,
        token: &str,
        session_id: &str,
        command_id: &str,
        request: ExecutionRequest,
    ) -> GatewayResult<Vec<ExecutionResult>> {
        self.guard.validate(token)?;
        let session = self.engine_session(session_id).await?;
        let channel = self.channel(command_id).await?;
        let batch = session
            .slot
            .acquire(Arc::clone(&channel), self.executor.poll_interval())
            .await?;
        session.handles.clear();

        let active = Arc::new(request.active_profiles);
        let inactive = Arc::new(request.inactive_profiles);
        let mut results = Vec::with_capacity(request.files.len());

        for file in request.files {
            let batch = Arc::clone(&batch);
            let engine = Arc::clone(&session.engine);
            let handles = Arc::clone(&session.handles);
            let active = Arc::clone(&active);
            let inactive = Arc::clone(&inactive);
            let work_file = file.clone();

            let outcome = self
                .executor
                .run(&channel, move || {
                    let context = batch.context();
                    let outcome = engine
                        .resolve_project(context, &work_file, &active, &inactive)
                        .map_err(|err| WorkError::from(err).context("resolving project"))?;
                    let unresolved = context.take_unresolved();
                    Ok(build_execution_result(&work_file, outcome, unresolved, |project| {
                        handles.register(project)
                    }))
                })
                .await;

            match outcome {
                Ok(result) => results.push(result),
                Err(GatewayError::Canceled) => return Err(GatewayError::Canceled),
                Err(err) => {
                    warn!("resolving {} failed: {err}", file.display());
                    results.push(ExecutionResult::failed(&file, failure_message(err)));
                }
            }
        }
        Ok(results)
    }

    /// Resolves artifacts against the session's engine. "Not found" style
    /// failures are logged and yield an empty list.
    pub async fn resolve_artifacts(
        &self,
        token: &str,
        session_id: &str,
        command_id: Option<&str>,
        requests: Vec<ArtifactRequest>,
    ) -> GatewayResult<Vec<ResolvedArtifact>> {
        self.guard.validate(token)?;
        let session = self.engine_session(session_id).await?;
        let channel = match command_id {
            Some(id) => self.channel(id).await?,
            None => Arc::new(EventChannel::new()),
        };
        let batch = session
            .slot
            .acquire(Arc::clone(&channel), self.executor.poll_interval())
            .await?;
        let engine = Arc::clone(&session.engine);

        self.executor
            .run(&channel, move || {
                match engine.resolve_artifacts(batch.context(), &requests) {
                    Ok(artifacts) => Ok(artifacts),
                    Err(err) if err.is_not_found() => {
                        info!("artifact resolution found nothing: {err}");
                        Ok(Vec::new())
                    }
                    Err(err) => Err(WorkError::from(err).context("resolving artifacts")),
                }
            })
            .await
    }

    /// Runs `goal` against every file of the request, one background run per
    /// file. Failures land in the file's result; only cancellation aborts.
    pub async fn execute_goal(
        &self,
        token: &str,
        session_id: &str,
        command_id: &str,
        request: ExecutionRequest,
        goal: &str,
    ) -> GatewayResult<Vec<GoalExecutionResult>> {
        self.guard.validate(token)?;
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(GatewayError::InvalidArgument("goal is required".into()));
        }
        let session = self.engine_session(session_id).await?;
        let channel = self.channel(command_id).await?;
        let batch = session
            .slot
            .acquire(Arc::clone(&channel), self.executor.poll_interval())
            .await?;
        info!("executing {goal} on {} file(s)", request.files.len());

        let goal: Arc<str> = Arc::from(goal);
        let active = Arc::new(request.active_profiles);
        let inactive = Arc::new(request.inactive_profiles);
        let mut results = Vec::with_capacity(request.files.len());

        for file in request.files {
            let batch = Arc::clone(&batch);
            let engine = Arc::clone(&session.engine);
            let work_goal = Arc::clone(&goal);
            let active = Arc::clone(&active);
            let inactive = Arc::clone(&inactive);
            let work_file = file.clone();

            let outcome = self
                .executor
                .run(&channel, move || {
                    let failures = engine
                        .execute_goal(batch.context(), &work_file, &active, &inactive, &work_goal)
                        .map_err(|err| WorkError::from(err).context("executing goal"))?;
                    Ok(build_goal_result(&work_file, &failures))
                })
                .await;

            match outcome {
                Ok(result) => results.push(result),
                Err(GatewayError::Canceled) => return Err(GatewayError::Canceled),
                Err(err) => {
                    warn!("{goal} on {} failed: {err}", file.display());
                    results.push(GoalExecutionResult::failed(&file, failure_message(err)));
                }
            }
        }
        Ok(results)
    }

    /// Resolves the artifacts and their runtime dependencies. "Not found"
    /// style failures are logged and yield an empty list.
    pub async fn resolve_artifacts_transitively(
        &self,
        token: &str,
        session_id: &str,
        command_id: Option<&str>,
        artifacts: Vec<ArtifactCoordinates>,
        remote_repositories: Vec<Repository>,
    ) -> GatewayResult<Vec<ResolvedArtifact>> {
        self.guard.validate(token)?;
        let session = self.engine_session(session_id).await?;
        let channel = match command_id {
            Some(id) => self.channel(id).await?,
            None => Arc::new(EventChannel::new()),
        };
        let batch = session
            .slot
            .acquire(Arc::clone(&channel), self.executor.poll_interval())
            .await?;
        let engine = Arc::clone(&session.engine);

        self.executor
            .run(&channel, move || {
                match engine.resolve_artifacts_transitively(
                    batch.context(),
                    &artifacts,
                    &remote_repositories,
                ) {
                    Ok(resolved) => Ok(resolved),
                    Err(err) if err.is_not_found() => {
                        info!("transitive resolution found nothing: {err}");
                        Ok(Vec::new())
                    }
                    Err(err) => Err(WorkError::from(err).context("resolving artifacts")),
                }
            })
            .await
    }

    pub fn acquire_lease(&self, token: &str) -> GatewayResult<u64> {
        self.guard.validate(token)?;
        Ok(self.leases.acquire())
    }

    pub fn release_lease(&self, token: &str) -> GatewayResult<u64> {
        self.guard.validate(token)?;
        Ok(self.leases.release())
    }

    pub fn long_running_task_status(
        &self,
        token: &str,
        _task_id: &str,
    ) -> GatewayResult<LongRunningTaskStatus> {
        self.guard.validate(token)?;
        Ok(LongRunningTaskStatus::empty())
    }

    pub fn cancel_long_running_task(&self, token: &str, _task_id: &str) -> GatewayResult<bool> {
        self.guard.validate(token)?;
        Ok(false)
    }

    async fn engine_session(&self, session_id: &str) -> GatewayResult<Arc<EngineSession>> {
        self.sessions
            .engine(session_id)
            .await
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))
    }

    async fn channel(&self, command_id: &str) -> GatewayResult<Arc<EventChannel>> {
        self.channels
            .get(command_id)
            .await
            .ok_or_else(|| GatewayError::UnknownCommand(command_id.to_string()))
    }
}

fn failure_message(err: GatewayError) -> String {
    match err {
        GatewayError::TransportFailure { message, .. } => message,
        other => other.to_string(),
    }
}
