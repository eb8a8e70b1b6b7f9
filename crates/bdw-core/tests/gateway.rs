use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bdw_core::{
    channel::{ArtifactEventKind, ResolveKind},
    model::{ArtifactCoordinates, ArtifactKey, Profile, ProfileSource, Repository},
    ArtifactEvent, ArtifactRequest, EngineContext, EngineError, EngineFactory, EngineFailure,
    EngineSettings, ExecutionRequest, ExplicitProfiles, Gateway, GatewayConfig, GatewayError,
    Model, ProjectOutcome, ResolutionEngine, ResolvedArtifact, ResolvedProject, SessionSettings,
    Token, Watchdog,
};
use pretty_assertions::assert_eq;

const TOKEN: &str = "launch-token";

#[derive(Default)]
struct FakeEngine {
    cached_projects: AtomicUsize,
    released: AtomicBool,
    slow_done: Arc<AtomicBool>,
}

impl ResolutionEngine for FakeEngine {
    fn resolve_project(
        &self,
        context: &EngineContext,
        file: &Path,
        active_profiles: &[String],
        _inactive_profiles: &[String],
    ) -> Result<ProjectOutcome, EngineError> {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match name {
            "slow.json" => {
                std::thread::sleep(Duration::from_millis(400));
                self.slow_done.store(true, Ordering::SeqCst);
                Ok(ProjectOutcome::default())
            }
            "broken.json" => Err(EngineError::Other("disk on fire".into())),
            "invalid.json" => Ok(ProjectOutcome {
                project: None,
                failures: vec![EngineFailure::InvalidModel {
                    message: "invalid".into(),
                    validation_messages: Some(vec!["artifactId is missing".into()]),
                    cause: None,
                }],
            }),
            _ => {
                context.console().info(&format!("resolving {name}"));
                context.download_event(ArtifactEvent::started(ResolveKind::Dependency, "g:dep:1"));
                context.download_event(ArtifactEvent::failed(
                    ResolveKind::Dependency,
                    "g:dep:1",
                    "not in repository",
                    None,
                ));
                context.record_unresolved(ArtifactKey {
                    group_id: "g".into(),
                    artifact_id: "dep".into(),
                    version: "1".into(),
                });
                self.cached_projects.fetch_add(1, Ordering::SeqCst);
                Ok(ProjectOutcome {
                    project: Some(ResolvedProject {
                        model: Model {
                            artifact_id: Some(name.trim_end_matches(".json").into()),
                            ..Model::default()
                        },
                        active_profiles: active_profiles.to_vec(),
                        parent: None,
                    }),
                    failures: Vec::new(),
                })
            }
        }
    }

    fn resolve_artifacts(
        &self,
        _context: &EngineContext,
        requests: &[ArtifactRequest],
    ) -> Result<Vec<ResolvedArtifact>, EngineError> {
        let first = requests.first().map(|r| r.coordinates.artifact_id.as_str());
        match first {
            Some("absent") => Err(EngineError::NotFound("absent".into())),
            Some("exploding") => Err(EngineError::Other("transport broke".into())),
            _ => Ok(requests
                .iter()
                .map(|r| ResolvedArtifact {
                    coordinates: r.coordinates.clone(),
                    file: Some(PathBuf::from("/repo").join(r.coordinates.repository_path())),
                    resolved: true,
                })
                .collect()),
        }
    }

    fn resolve_artifacts_transitively(
        &self,
        context: &EngineContext,
        artifacts: &[ArtifactCoordinates],
        _remote_repositories: &[Repository],
    ) -> Result<Vec<ResolvedArtifact>, EngineError> {
        let mut resolved = Vec::new();
        for coordinates in artifacts {
            if coordinates.artifact_id == "absent" {
                return Err(EngineError::NotFound("absent".into()));
            }
            context.progress(&coordinates.to_string(), None);
            let runtime = ArtifactCoordinates {
                artifact_id: format!("{}-runtime", coordinates.artifact_id),
                ..coordinates.clone()
            };
            for coordinates in [coordinates.clone(), runtime] {
                resolved.push(ResolvedArtifact {
                    file: Some(PathBuf::from("/repo").join(coordinates.repository_path())),
                    coordinates,
                    resolved: true,
                });
            }
        }
        Ok(resolved)
    }

    fn execute_goal(
        &self,
        context: &EngineContext,
        file: &Path,
        _active_profiles: &[String],
        _inactive_profiles: &[String],
        goal: &str,
    ) -> Result<Vec<EngineFailure>, EngineError> {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name == "broken.json" {
            return Err(EngineError::Other("disk on fire".into()));
        }
        context.console().info(&format!("{goal} {name}"));
        match goal {
            "validate" => Ok(Vec::new()),
            other => Ok(vec![EngineFailure::Other {
                message: format!("unknown goal {other}"),
            }]),
        }
    }

    fn project_cache_len(&self) -> usize {
        self.cached_projects.load(Ordering::SeqCst)
    }

    fn clear_project_caches(&self) {
        self.cached_projects.store(0, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeFactory {
    engines: std::sync::Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeFactory {
    fn last(&self) -> Arc<FakeEngine> {
        self.engines.lock().unwrap().last().cloned().expect("engine created")
    }
}

impl EngineFactory for FakeFactory {
    fn create(&self, _settings: &EngineSettings) -> Result<Arc<dyn ResolutionEngine>, EngineError> {
        let engine = Arc::new(FakeEngine::default());
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

struct FixedWatchdog(bool);

impl Watchdog for FixedWatchdog {
    fn is_alive(&self) -> bool {
        self.0
    }
}

fn gateway() -> (Gateway, Arc<FakeFactory>) {
    let factory = Arc::new(FakeFactory::default());
    let config = GatewayConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_system_properties(Default::default());
    let gateway = Gateway::new(Token::new(TOKEN), factory.clone(), config);
    (gateway, factory)
}

fn request(files: &[&str]) -> ExecutionRequest {
    ExecutionRequest {
        files: files.iter().map(|f| PathBuf::from("/ws").join(f)).collect(),
        active_profiles: vec!["ci".into()],
        inactive_profiles: Vec::new(),
    }
}

#[tokio::test]
async fn invalid_token_is_denied_without_side_effects() {
    let (gateway, _) = gateway();
    let bad = "forged";
    let model = Model::default();

    assert_eq!(gateway.ping(bad), Err(GatewayError::AccessDenied));
    assert_eq!(
        gateway.create_session(bad, SessionSettings::default()).await,
        Err(GatewayError::AccessDenied)
    );
    assert_eq!(gateway.create_index_session(bad).await, Err(GatewayError::AccessDenied));
    assert_eq!(gateway.open_command(bad).await, Err(GatewayError::AccessDenied));
    assert_eq!(
        gateway.interpolate_and_align(bad, &model, Path::new("/")),
        Err(GatewayError::AccessDenied)
    );
    assert_eq!(
        gateway.assemble_inheritance(bad, &model, &model),
        Err(GatewayError::AccessDenied)
    );
    assert!(matches!(
        gateway.apply_profiles(bad, &model, Path::new("/"), &ExplicitProfiles::default(), &BTreeSet::new()),
        Err(GatewayError::AccessDenied)
    ));
    assert_eq!(gateway.acquire_lease(bad), Err(GatewayError::AccessDenied));
    assert_eq!(gateway.release_lease(bad), Err(GatewayError::AccessDenied));
    assert_eq!(
        gateway.cancel_long_running_task(bad, "task"),
        Err(GatewayError::AccessDenied)
    );

    let command = gateway.open_command(TOKEN).await.unwrap();
    assert_eq!(
        gateway.cancel_command(bad, &command).await,
        Err(GatewayError::AccessDenied)
    );
    assert_eq!(
        gateway.pull_console_events(bad, &command).await,
        Err(GatewayError::AccessDenied)
    );
    assert_eq!(
        gateway.close_command(bad, &command).await,
        Err(GatewayError::AccessDenied)
    );

    assert!(gateway.sessions().is_empty().await);
    assert_eq!(gateway.channels().len().await, 1);
    assert!(!gateway.channels().get(&command).await.unwrap().is_canceled());
    assert_eq!(gateway.leases().holders(), 0);
}

#[tokio::test]
async fn session_release_is_idempotent() {
    let (gateway, factory) = gateway();
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    assert_eq!(gateway.ping_session(TOKEN, &session).await, Ok(true));

    let command = gateway.open_command(TOKEN).await.unwrap();
    gateway
        .resolve_projects(TOKEN, &session, &command, request(&["app.json"]))
        .await
        .unwrap();
    let engine = factory.last();
    assert_eq!(engine.project_cache_len(), 1);

    assert_eq!(gateway.release(TOKEN, &session).await, Ok(true));
    assert_eq!(gateway.release(TOKEN, &session).await, Ok(false));
    assert_eq!(engine.project_cache_len(), 0);
    assert!(engine.released.load(Ordering::SeqCst));
    assert_eq!(
        gateway.ping_session(TOKEN, &session).await,
        Err(GatewayError::UnknownSession(session.clone()))
    );

    let index = gateway.create_index_session(TOKEN).await.unwrap();
    assert_eq!(gateway.ping_session(TOKEN, &index).await, Ok(true));
    assert_eq!(gateway.release(TOKEN, &index).await, Ok(true));
}

#[tokio::test]
async fn one_failing_file_does_not_sink_the_batch() {
    let (gateway, _) = gateway();
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    let command = gateway.open_command(TOKEN).await.unwrap();

    let results = gateway
        .resolve_projects(
            TOKEN,
            &session,
            &command,
            request(&["app.json", "broken.json", "invalid.json"]),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    let app = &results[0];
    let data = app.project.as_ref().expect("project data");
    assert_eq!(data.model.artifact_id.as_deref(), Some("app"));
    assert_eq!(data.activated_profiles, BTreeSet::from(["ci".to_string()]));
    assert!(!data.handle.is_empty());
    assert_eq!(app.unresolved_artifacts.len(), 1);

    let broken = &results[1];
    assert!(broken.project.is_none());
    assert_eq!(broken.problems[0].message, "disk on fire");
    assert_eq!(broken.problems[0].path, "/ws/broken.json");

    let invalid = &results[2];
    assert_eq!(invalid.problems[0].message, "artifactId is missing");
    assert!(invalid.unresolved_artifacts.is_empty());

    let console = gateway.pull_console_events(TOKEN, &command).await.unwrap();
    assert_eq!(
        console.unwrap().iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
        vec!["resolving app.json\n"]
    );
    let downloads = gateway.pull_download_events(TOKEN, &command).await.unwrap().unwrap();
    let kinds: Vec<_> = downloads.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ArtifactEventKind::Started, ArtifactEventKind::Failed]);
    assert_eq!(gateway.pull_download_events(TOKEN, &command).await, Ok(None));
    assert_eq!(gateway.pull_console_events(TOKEN, &command).await, Ok(None));

    assert_eq!(gateway.close_command(TOKEN, &command).await, Ok(true));
    assert_eq!(
        gateway.pull_console_events(TOKEN, &command).await,
        Err(GatewayError::UnknownCommand(command.clone()))
    );
}

#[tokio::test]
async fn cancel_returns_promptly_and_next_batch_waits_for_detached_work() {
    let (gateway, factory) = gateway();
    let gateway = Arc::new(gateway);
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    let engine = factory.last();
    let command = gateway.open_command(TOKEN).await.unwrap();

    let started = Instant::now();
    let running = {
        let gateway = Arc::clone(&gateway);
        let session = session.clone();
        let command = command.clone();
        tokio::spawn(async move {
            gateway
                .resolve_projects(TOKEN, &session, &command, request(&["slow.json"]))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.cancel_command(TOKEN, &command).await, Ok(true));

    let outcome = running.await.unwrap();
    assert_eq!(outcome, Err(GatewayError::Canceled));
    assert!(started.elapsed() < Duration::from_millis(300));
    assert!(!engine.slow_done.load(Ordering::SeqCst));

    let next = gateway.open_command(TOKEN).await.unwrap();
    let results = gateway
        .resolve_projects(TOKEN, &session, &next, request(&["app.json"]))
        .await
        .unwrap();
    assert!(engine.slow_done.load(Ordering::SeqCst));
    assert_eq!(results.len(), 1);
    assert!(results[0].project.is_some());
}

#[tokio::test]
async fn handles_live_until_the_next_batch() {
    let (gateway, _) = gateway();
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    let command = gateway.open_command(TOKEN).await.unwrap();
    let handles = Arc::clone(&gateway.sessions().engine(&session).await.unwrap().handles);

    let first = gateway
        .resolve_projects(TOKEN, &session, &command, request(&["app.json", "lib.json"]))
        .await
        .unwrap();
    assert_eq!(handles.len(), 2);
    let first_handle = first[0].project.as_ref().unwrap().handle.clone();
    assert!(handles.get(&first_handle).is_some());

    for _ in 0..3 {
        gateway
            .resolve_projects(TOKEN, &session, &command, request(&["app.json"]))
            .await
            .unwrap();
    }
    assert_eq!(handles.len(), 1);
    assert!(handles.get(&first_handle).is_none());
}

#[tokio::test]
async fn goals_report_per_file_success_and_problems() {
    let (gateway, _) = gateway();
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    let command = gateway.open_command(TOKEN).await.unwrap();

    let results = gateway
        .execute_goal(
            TOKEN,
            &session,
            &command,
            request(&["app.json", "broken.json"]),
            "validate",
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(results[0].problems.is_empty());
    assert!(!results[1].success);
    assert_eq!(results[1].problems[0].message, "disk on fire");
    assert_eq!(results[1].file, PathBuf::from("/ws/broken.json"));

    let unknown = gateway
        .execute_goal(TOKEN, &session, &command, request(&["app.json"]), "deploy")
        .await
        .unwrap();
    assert!(!unknown[0].success);
    assert_eq!(unknown[0].problems[0].message, "unknown goal deploy");

    let console = gateway.pull_console_events(TOKEN, &command).await.unwrap().unwrap();
    assert_eq!(
        console.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
        vec!["validate app.json\n", "deploy app.json\n"]
    );

    assert_eq!(
        gateway
            .execute_goal(TOKEN, &session, &command, request(&["app.json"]), "  ")
            .await,
        Err(GatewayError::InvalidArgument("goal is required".into()))
    );
    assert_eq!(
        gateway
            .execute_goal("forged", &session, &command, request(&["app.json"]), "validate")
            .await,
        Err(GatewayError::AccessDenied)
    );
}

#[tokio::test]
async fn transitive_resolution_includes_dependencies() {
    let (gateway, _) = gateway();
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    let coordinates = |id: &str| ArtifactCoordinates {
        group_id: "org.acme".into(),
        artifact_id: id.into(),
        version: "1.0".into(),
        packaging: "jar".into(),
        classifier: None,
    };

    let resolved = gateway
        .resolve_artifacts_transitively(TOKEN, &session, None, vec![coordinates("lib")], Vec::new())
        .await
        .unwrap();
    let ids: Vec<_> = resolved
        .iter()
        .map(|a| a.coordinates.artifact_id.as_str())
        .collect();
    assert_eq!(ids, vec!["lib", "lib-runtime"]);

    let absent = gateway
        .resolve_artifacts_transitively(
            TOKEN,
            &session,
            None,
            vec![coordinates("absent")],
            vec![Repository {
                id: "central".into(),
                url: "https://repo.example/maven2".into(),
                name: None,
            }],
        )
        .await;
    assert_eq!(absent, Ok(Vec::new()));

    assert_eq!(
        gateway
            .resolve_artifacts_transitively(TOKEN, "nope", None, Vec::new(), Vec::new())
            .await,
        Err(GatewayError::UnknownSession("nope".into()))
    );
}

#[tokio::test]
async fn artifact_resolution_swallows_not_found() {
    let (gateway, _) = gateway();
    let session = gateway
        .create_session(TOKEN, SessionSettings::default())
        .await
        .unwrap();
    let artifact = |id: &str| ArtifactRequest {
        coordinates: ArtifactCoordinates {
            group_id: "org.acme".into(),
            artifact_id: id.into(),
            version: "1.0".into(),
            packaging: "jar".into(),
            classifier: None,
        },
        remote_repositories: Vec::new(),
    };

    let found = gateway
        .resolve_artifacts(TOKEN, &session, None, vec![artifact("lib")])
        .await
        .unwrap();
    assert_eq!(
        found[0].file.as_deref(),
        Some(Path::new("/repo/org/acme/lib/1.0/lib-1.0.jar"))
    );

    let absent = gateway
        .resolve_artifacts(TOKEN, &session, None, vec![artifact("absent")])
        .await;
    assert_eq!(absent, Ok(Vec::new()));

    let exploding = gateway
        .resolve_artifacts(TOKEN, &session, None, vec![artifact("exploding")])
        .await;
    assert_eq!(
        exploding,
        Err(GatewayError::transport("Engine", "transport broke"))
    );

    assert_eq!(
        gateway
            .resolve_artifacts(TOKEN, "nope", None, vec![artifact("lib")])
            .await,
        Err(GatewayError::UnknownSession("nope".into()))
    );
}

#[tokio::test]
async fn profiles_apply_through_the_gateway() {
    let (gateway, _) = gateway();
    let model = Model {
        profiles: vec![
            Profile::new("P1", ProfileSource::Description),
            Profile::new("P2", ProfileSource::Description)
                .with_activation(bdw_core::model::Activation::by_default()),
        ],
        ..Model::default()
    };

    let fallback = gateway
        .apply_profiles(TOKEN, &model, Path::new("/"), &ExplicitProfiles::default(), &BTreeSet::new())
        .unwrap();
    assert_eq!(fallback.activated, BTreeSet::from(["P2".to_string()]));
    assert!(fallback.deactivated.is_empty());

    let explicit = ExplicitProfiles::new(["P1"], Vec::<String>::new());
    let chosen = gateway
        .apply_profiles(TOKEN, &model, Path::new("/"), &explicit, &BTreeSet::new())
        .unwrap();
    assert_eq!(chosen.activated, BTreeSet::from(["P1".to_string()]));
}

#[tokio::test]
async fn ping_reflects_the_watchdog() {
    let (gateway, _) = gateway();
    assert_eq!(gateway.ping(TOKEN), Ok(false));
    let gateway = gateway.with_watchdog(Arc::new(FixedWatchdog(true)));
    assert_eq!(gateway.ping(TOKEN), Ok(true));
}

#[tokio::test]
async fn last_lease_release_requests_shutdown() {
    let (gateway, _) = gateway();
    let signal = gateway.shutdown_signal();
    assert_eq!(gateway.acquire_lease(TOKEN), Ok(1));
    assert_eq!(gateway.acquire_lease(TOKEN), Ok(2));
    assert_eq!(gateway.release_lease(TOKEN), Ok(1));
    assert!(!*signal.borrow());
    assert_eq!(gateway.release_lease(TOKEN), Ok(0));
    assert!(*signal.borrow());
}

#[tokio::test]
async fn long_running_task_surface_is_inert() {
    let (gateway, _) = gateway();
    let status = gateway.long_running_task_status(TOKEN, "any").unwrap();
    assert_eq!(status.fraction, 0.0);
    assert!(status.console_events.is_empty() && status.download_events.is_empty());
    assert_eq!(gateway.cancel_long_running_task(TOKEN, "any"), Ok(false));
}
