use std::{collections::BTreeSet, sync::Arc};

use bdw_core::{ExecutionRequest, ExplicitProfiles, Gateway, SessionSettings};
use bdw_proto::bdw::v1::{
    build_worker_server::BuildWorker, ApplyProfilesRequest, ApplyProfilesResponse,
    CancelCommandResponse, CancelLongRunningTaskResponse, CloseCommandResponse, CommandRef,
    CommandRequest, ConsoleEventBatch, CreateIndexSessionRequest, CreateSessionRequest,
    CreateSessionResponse, DownloadEventBatch, ExecuteGoalRequest, ExecuteGoalResponse,
    InheritanceRequest, InterpolateRequest,
    LeaseRequest, LeaseResponse, LongRunningTaskRequest, LongRunningTaskStatusResponse,
    ModelResponse, OpenCommandRequest, PingRequest, PingResponse, PullConsoleEventsResponse,
    PullDownloadEventsResponse, ReleaseResponse, ResolveArtifactsRequest,
    ResolveArtifactsResponse, ResolveArtifactsTransitivelyRequest, ResolveProjectsRequest,
    ResolveProjectsResponse, SessionRequest,
};
use tonic::{Request, Response, Status};
use tracing::info;

use crate::convert::{
    absolute_files, artifact_event_to_proto, artifact_request_from_proto, artifacts_from_proto,
    console_event_to_proto, execution_result_to_proto, goal_result_to_proto, model_json,
    parse_model, repositories_from_proto, required_path, resolved_artifact_to_proto,
    session_settings, status_from, task_status_to_proto,
};

#[derive(Clone)]
pub(crate) struct Svc {
    gateway: Arc<Gateway>,
    session_defaults: SessionSettings,
}

impl Svc {
    pub(crate) fn new(gateway: Arc<Gateway>, session_defaults: SessionSettings) -> Self {
        Self {
            gateway,
            session_defaults,
        }
    }
}

#[tonic::async_trait]
impl BuildWorker for Svc {
    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        let req = request.into_inner();
        let alive = self.gateway.ping(&req.token).map_err(status_from)?;
        Ok(Response::new(PingResponse { alive }))
    }

    async fn create_session(
        &self,
        request: Request<CreateSessionRequest>,
    ) -> Result<Response<CreateSessionResponse>, Status> {
        let req = request.into_inner();
        let settings = session_settings(req.settings, &self.session_defaults);
        let session_id = self
            .gateway
            .create_session(&req.token, settings)
            .await
            .map_err(status_from)?;
        Ok(Response::new(CreateSessionResponse { session_id }))
    }

    async fn create_index_session(
        &self,
        request: Request<CreateIndexSessionRequest>,
    ) -> Result<Response<CreateSessionResponse>, Status> {
        let req = request.into_inner();
        let session_id = self
            .gateway
            .create_index_session(&req.token)
            .await
            .map_err(status_from)?;
        Ok(Response::new(CreateSessionResponse { session_id }))
    }

    async fn ping_session(
        &self,
        request: Request<SessionRequest>,
    ) -> Result<Response<PingResponse>, Status> {
        let req = request.into_inner();
        let alive = self
            .gateway
            .ping_session(&req.token, &req.session_id)
            .await
            .map_err(status_from)?;
        Ok(Response::new(PingResponse { alive }))
    }

    async fn release(
        &self,
        request: Request<SessionRequest>,
    ) -> Result<Response<ReleaseResponse>, Status> {
        let req = request.into_inner();
        let released = self
            .gateway
            .release(&req.token, &req.session_id)
            .await
            .map_err(status_from)?;
        Ok(Response::new(ReleaseResponse { released }))
    }

    async fn interpolate_and_align_model(
        &self,
        request: Request<InterpolateRequest>,
    ) -> Result<Response<ModelResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let model = parse_model("model_json", &req.model_json)?;
        let base_dir = required_path("base_dir", &req.base_dir)?;
        let model = self
            .gateway
            .interpolate_and_align(&req.token, &model, &base_dir)
            .map_err(status_from)?;
        Ok(Response::new(ModelResponse {
            model_json: model_json(&model)?,
        }))
    }

    async fn assemble_inheritance(
        &self,
        request: Request<InheritanceRequest>,
    ) -> Result<Response<ModelResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let child = parse_model("model_json", &req.model_json)?;
        let parent = parse_model("parent_json", &req.parent_json)?;
        let model = self
            .gateway
            .assemble_inheritance(&req.token, &child, &parent)
            .map_err(status_from)?;
        Ok(Response::new(ModelResponse {
            model_json: model_json(&model)?,
        }))
    }

    async fn apply_profiles(
        &self,
        request: Request<ApplyProfilesRequest>,
    ) -> Result<Response<ApplyProfilesResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let model = parse_model("model_json", &req.model_json)?;
        let base_dir = required_path("base_dir", &req.base_dir)?;
        let explicit = ExplicitProfiles::new(req.enabled_profiles, req.disabled_profiles);
        let always_on: BTreeSet<String> = req.always_on_profiles.into_iter().collect();
        let applied = self
            .gateway
            .apply_profiles(&req.token, &model, &base_dir, &explicit, &always_on)
            .map_err(status_from)?;
        Ok(Response::new(ApplyProfilesResponse {
            model_json: model_json(&applied.model)?,
            activated_profiles: applied.activated.into_iter().collect(),
            deactivated_profiles: applied.deactivated.into_iter().collect(),
        }))
    }

    async fn open_command(
        &self,
        request: Request<OpenCommandRequest>,
    ) -> Result<Response<CommandRef>, Status> {
        let req = request.into_inner();
        let command_id = self
            .gateway
            .open_command(&req.token)
            .await
            .map_err(status_from)?;
        Ok(Response::new(CommandRef { command_id }))
    }

    async fn close_command(
        &self,
        request: Request<CommandRequest>,
    ) -> Result<Response<CloseCommandResponse>, Status> {
        let req = request.into_inner();
        let closed = self
            .gateway
            .close_command(&req.token, &req.command_id)
            .await
            .map_err(status_from)?;
        Ok(Response::new(CloseCommandResponse { closed }))
    }

    async fn cancel_command(
        &self,
        request: Request<CommandRequest>,
    ) -> Result<Response<CancelCommandResponse>, Status> {
        let req = request.into_inner();
        let accepted = self
            .gateway
            .cancel_command(&req.token, &req.command_id)
            .await
            .map_err(status_from)?;
        Ok(Response::new(CancelCommandResponse { accepted }))
    }

    async fn pull_download_events(
        &self,
        request: Request<CommandRequest>,
    ) -> Result<Response<PullDownloadEventsResponse>, Status> {
        let req = request.into_inner();
        let batch = self
            .gateway
            .pull_download_events(&req.token, &req.command_id)
            .await
            .map_err(status_from)?;
        Ok(Response::new(PullDownloadEventsResponse {
            batch: batch.map(|events| DownloadEventBatch {
                events: events.into_iter().map(artifact_event_to_proto).collect(),
            }),
        }))
    }

    async fn pull_console_events(
        &self,
        request: Request<CommandRequest>,
    ) -> Result<Response<PullConsoleEventsResponse>, Status> {
        let req = request.into_inner();
        let batch = self
            .gateway
            .pull_console_events(&req.token, &req.command_id)
            .await
            .map_err(status_from)?;
        Ok(Response::new(PullConsoleEventsResponse {
            batch: batch.map(|events| ConsoleEventBatch {
                events: events.into_iter().map(console_event_to_proto).collect(),
            }),
        }))
    }

    async fn resolve_projects(
        &self,
        request: Request<ResolveProjectsRequest>,
    ) -> Result<Response<ResolveProjectsResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let execution = ExecutionRequest {
            files: absolute_files(req.files)?,
            active_profiles: req.active_profiles,
            inactive_profiles: req.inactive_profiles,
        };
        info!(
            "resolving {} project(s) in session {}",
            execution.files.len(),
            req.session_id
        );
        let results = self
            .gateway
            .resolve_projects(&req.token, &req.session_id, &req.command_id, execution)
            .await
            .map_err(status_from)?;
        let results = results
            .into_iter()
            .map(execution_result_to_proto)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Response::new(ResolveProjectsResponse { results }))
    }

    async fn resolve_artifacts(
        &self,
        request: Request<ResolveArtifactsRequest>,
    ) -> Result<Response<ResolveArtifactsResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let requests = req
            .requests
            .into_iter()
            .map(artifact_request_from_proto)
            .collect::<Result<Vec<_>, _>>()?;
        let command_id = Some(req.command_id.as_str()).filter(|id| !id.is_empty());
        let artifacts = self
            .gateway
            .resolve_artifacts(&req.token, &req.session_id, command_id, requests)
            .await
            .map_err(status_from)?;
        Ok(Response::new(ResolveArtifactsResponse {
            artifacts: artifacts.into_iter().map(resolved_artifact_to_proto).collect(),
        }))
    }

    async fn execute_goal(
        &self,
        request: Request<ExecuteGoalRequest>,
    ) -> Result<Response<ExecuteGoalResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let execution = ExecutionRequest {
            files: absolute_files(req.files)?,
            active_profiles: req.active_profiles,
            inactive_profiles: req.inactive_profiles,
        };
        let results = self
            .gateway
            .execute_goal(&req.token, &req.session_id, &req.command_id, execution, &req.goal)
            .await
            .map_err(status_from)?;
        Ok(Response::new(ExecuteGoalResponse {
            results: results.into_iter().map(goal_result_to_proto).collect(),
        }))
    }

    async fn resolve_artifacts_transitively(
        &self,
        request: Request<ResolveArtifactsTransitivelyRequest>,
    ) -> Result<Response<ResolveArtifactsResponse>, Status> {
        let req = request.into_inner();
        self.gateway.authorize(&req.token).map_err(status_from)?;
        let artifacts = artifacts_from_proto(req.artifacts)?;
        let remote_repositories = repositories_from_proto(req.remote_repositories);
        let command_id = Some(req.command_id.as_str()).filter(|id| !id.is_empty());
        let resolved = self
            .gateway
            .resolve_artifacts_transitively(
                &req.token,
                &req.session_id,
                command_id,
                artifacts,
                remote_repositories,
            )
            .await
            .map_err(status_from)?;
        Ok(Response::new(ResolveArtifactsResponse {
            artifacts: resolved.into_iter().map(resolved_artifact_to_proto).collect(),
        }))
    }

    async fn acquire_lease(
        &self,
        request: Request<LeaseRequest>,
    ) -> Result<Response<LeaseResponse>, Status> {
        let req = request.into_inner();
        let holders = self.gateway.acquire_lease(&req.token).map_err(status_from)?;
        Ok(Response::new(LeaseResponse { holders }))
    }

    async fn release_lease(
        &self,
        request: Request<LeaseRequest>,
    ) -> Result<Response<LeaseResponse>, Status> {
        let req = request.into_inner();
        let holders = self.gateway.release_lease(&req.token).map_err(status_from)?;
        Ok(Response::new(LeaseResponse { holders }))
    }

    async fn get_long_running_task_status(
        &self,
        request: Request<LongRunningTaskRequest>,
    ) -> Result<Response<LongRunningTaskStatusResponse>, Status> {
        let req = request.into_inner();
        let status = self
            .gateway
            .long_running_task_status(&req.token, &req.task_id)
            .map_err(status_from)?;
        Ok(Response::new(task_status_to_proto(status)))
    }

    async fn cancel_long_running_task(
        &self,
        request: Request<LongRunningTaskRequest>,
    ) -> Result<Response<CancelLongRunningTaskResponse>, Status> {
        let req = request.into_inner();
        let accepted = self
            .gateway
            .cancel_long_running_task(&req.token, &req.task_id)
            .map_err(status_from)?;
        Ok(Response::new(CancelLongRunningTaskResponse { accepted }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdw_core::{GatewayConfig, Token};
    use bdw_proto::bdw::v1::{ArtifactCoordinates, ArtifactResolutionRequest, EngineSettings};
    use pretty_assertions::assert_eq;
    use tonic::Code;

    use crate::engine::LocalEngineFactory;

    const TOKEN: &str = "secret";

    fn svc(repository: &std::path::Path) -> Svc {
        let gateway = Gateway::new(
            Token::new(TOKEN),
            Arc::new(LocalEngineFactory::new(repository.to_path_buf())),
            GatewayConfig::default(),
        );
        Svc::new(Arc::new(gateway), SessionSettings::default())
    }

    #[tokio::test]
    async fn wrong_token_is_permission_denied_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let svc = svc(dir.path());
        let err = svc
            .interpolate_and_align_model(Request::new(InterpolateRequest {
                token: "wrong".into(),
                model_json: "not json".into(),
                base_dir: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);

        let err = svc
            .interpolate_and_align_model(Request::new(InterpolateRequest {
                token: TOKEN.into(),
                model_json: "not json".into(),
                base_dir: "/w".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn session_flow_over_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("project.json");
        std::fs::write(
            &file,
            r#"{"groupId": "org.acme", "artifactId": "app", "version": "1.0",
                "build": {"directory": "target"}}"#,
        )
        .unwrap();
        let svc = svc(dir.path());

        let session_id = svc
            .create_session(Request::new(CreateSessionRequest {
                token: TOKEN.into(),
                settings: Some(EngineSettings {
                    local_repository_path: dir.path().join("repo").display().to_string(),
                    ..EngineSettings::default()
                }),
            }))
            .await
            .unwrap()
            .into_inner()
            .session_id;
        let command_id = svc
            .open_command(Request::new(OpenCommandRequest {
                token: TOKEN.into(),
            }))
            .await
            .unwrap()
            .into_inner()
            .command_id;

        let results = svc
            .resolve_projects(Request::new(ResolveProjectsRequest {
                token: TOKEN.into(),
                session_id: session_id.clone(),
                command_id: command_id.clone(),
                files: vec![file.display().to_string()],
                active_profiles: Vec::new(),
                inactive_profiles: Vec::new(),
            }))
            .await
            .unwrap()
            .into_inner()
            .results;
        assert_eq!(results.len(), 1);
        let project = results[0].project.as_ref().expect("project");
        assert_eq!(
            project.raw_model.get("build.directory").map(String::as_str),
            Some(dir.path().join("target").to_str().unwrap())
        );
        assert!(!project.handle.is_empty());

        let console = svc
            .pull_console_events(Request::new(CommandRequest {
                token: TOKEN.into(),
                command_id: command_id.clone(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(console.batch.is_some_and(|b| !b.events.is_empty()));

        let missing = svc
            .resolve_artifacts(Request::new(ResolveArtifactsRequest {
                token: TOKEN.into(),
                session_id: session_id.clone(),
                command_id: String::new(),
                requests: vec![ArtifactResolutionRequest {
                    artifact: Some(ArtifactCoordinates {
                        group_id: "org.acme".into(),
                        artifact_id: "absent".into(),
                        version: "1".into(),
                        packaging: "jar".into(),
                        classifier: String::new(),
                    }),
                    remote_repositories: Vec::new(),
                }],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(missing.artifacts.is_empty());

        let released = svc
            .release(Request::new(SessionRequest {
                token: TOKEN.into(),
                session_id: session_id.clone(),
            }))
            .await
            .unwrap()
            .into_inner()
            .released;
        assert!(released);

        let err = svc
            .ping_session(Request::new(SessionRequest {
                token: TOKEN.into(),
                session_id,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    async fn open_session(svc: &Svc, repository: &std::path::Path) -> (String, String) {
        let session_id = svc
            .create_session(Request::new(CreateSessionRequest {
                token: TOKEN.into(),
                settings: Some(EngineSettings {
                    local_repository_path: repository.display().to_string(),
                    ..EngineSettings::default()
                }),
            }))
            .await
            .unwrap()
            .into_inner()
            .session_id;
        let command_id = svc
            .open_command(Request::new(OpenCommandRequest {
                token: TOKEN.into(),
            }))
            .await
            .unwrap()
            .into_inner()
            .command_id;
        (session_id, command_id)
    }

    #[tokio::test]
    async fn relative_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let svc = svc(dir.path());
        let (session_id, command_id) = open_session(&svc, dir.path()).await;

        let err = svc
            .resolve_projects(Request::new(ResolveProjectsRequest {
                token: TOKEN.into(),
                session_id: session_id.clone(),
                command_id: command_id.clone(),
                files: vec!["app/project.json".into()],
                active_profiles: Vec::new(),
                inactive_profiles: Vec::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = svc
            .execute_goal(Request::new(ExecuteGoalRequest {
                token: TOKEN.into(),
                session_id,
                command_id,
                files: vec!["project.json".into()],
                goal: "validate".into(),
                ..ExecuteGoalRequest::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn goals_and_transitive_resolution_over_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let repository = dir.path().join("repo");
        let jar = repository.join("org/acme/lib/1.0/lib-1.0.jar");
        std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
        std::fs::write(&jar, b"jar").unwrap();
        let file = dir.path().join("project.json");
        std::fs::write(
            &file,
            r#"{"groupId": "org.acme", "artifactId": "app", "version": "1.0",
                "dependencies": [{"groupId": "org.acme", "artifactId": "lib", "version": "1.0"}]}"#,
        )
        .unwrap();
        let svc = svc(dir.path());
        let (session_id, command_id) = open_session(&svc, &repository).await;

        let results = svc
            .execute_goal(Request::new(ExecuteGoalRequest {
                token: TOKEN.into(),
                session_id: session_id.clone(),
                command_id: command_id.clone(),
                files: vec![file.display().to_string()],
                goal: "resolve".into(),
                ..ExecuteGoalRequest::default()
            }))
            .await
            .unwrap()
            .into_inner()
            .results;
        assert_eq!(results.len(), 1);
        assert!(results[0].success, "{:?}", results[0].problems);

        let err = svc
            .execute_goal(Request::new(ExecuteGoalRequest {
                token: TOKEN.into(),
                session_id: session_id.clone(),
                command_id,
                files: vec![file.display().to_string()],
                goal: String::new(),
                ..ExecuteGoalRequest::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let artifacts = svc
            .resolve_artifacts_transitively(Request::new(ResolveArtifactsTransitivelyRequest {
                token: TOKEN.into(),
                session_id,
                command_id: String::new(),
                artifacts: vec![ArtifactCoordinates {
                    group_id: "org.acme".into(),
                    artifact_id: "lib".into(),
                    version: "1.0".into(),
                    packaging: "jar".into(),
                    classifier: String::new(),
                }],
                remote_repositories: Vec::new(),
            }))
            .await
            .unwrap()
            .into_inner()
            .artifacts;
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].resolved);
        assert_eq!(artifacts[0].file, jar.display().to_string());
    }

    #[tokio::test]
    async fn unknown_command_cancel_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = svc(dir.path())
            .cancel_command(Request::new(CommandRequest {
                token: TOKEN.into(),
                command_id: "nope".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}
