use std::path::PathBuf;

use bdw_core::{
    channel::{ArtifactEventKind, ResolveKind},
    model::{ArtifactCoordinates, Repository},
    result::{ProblemKind, ProjectData, ProjectProblem},
    ArtifactEvent, ArtifactRequest, ConsoleEvent, ConsoleLevel, ExecutionResult, GatewayError,
    GoalExecutionResult, LongRunningTaskStatus, Model, ResolvedArtifact, SessionSettings,
};
use bdw_proto::bdw::v1 as pb;
use bdw_util::ORIGIN_METADATA_KEY;
use tonic::{metadata::AsciiMetadataValue, Status};

pub(crate) fn status_from(err: GatewayError) -> Status {
    match err {
        GatewayError::AccessDenied => Status::permission_denied("access denied"),
        GatewayError::Canceled => Status::cancelled("command canceled"),
        GatewayError::TransportFailure { origin, message } => {
            let mut status = Status::internal(message);
            if let Ok(value) = origin.parse::<AsciiMetadataValue>() {
                status.metadata_mut().insert(ORIGIN_METADATA_KEY, value);
            }
            status
        }
        GatewayError::UnknownSession(id) => Status::not_found(format!("unknown session: {id}")),
        GatewayError::UnknownCommand(id) => Status::not_found(format!("unknown command: {id}")),
        GatewayError::InvalidArgument(message) => Status::invalid_argument(message),
    }
}

pub(crate) fn parse_model(field: &str, text: &str) -> Result<Model, Status> {
    if text.trim().is_empty() {
        return Err(Status::invalid_argument(format!("{field} is required")));
    }
    Model::from_json(text)
        .map_err(|e| Status::invalid_argument(format!("{field} is not a valid model: {e}")))
}

pub(crate) fn model_json(model: &Model) -> Result<String, Status> {
    model
        .to_json()
        .map_err(|e| Status::internal(format!("failed to encode model: {e}")))
}

pub(crate) fn required_path(field: &str, value: &str) -> Result<PathBuf, Status> {
    if value.trim().is_empty() {
        return Err(Status::invalid_argument(format!("{field} is required")));
    }
    Ok(PathBuf::from(value))
}

/// Description files of a batch. Relative paths have no base directory to be
/// aligned against, so they are refused.
pub(crate) fn absolute_files(files: Vec<String>) -> Result<Vec<PathBuf>, Status> {
    files
        .into_iter()
        .map(|file| {
            let path = PathBuf::from(&file);
            if file.trim().is_empty() {
                Err(Status::invalid_argument("files must not contain empty paths"))
            } else if !path.is_absolute() {
                Err(Status::invalid_argument(format!("file must be absolute: {file}")))
            } else {
                Ok(path)
            }
        })
        .collect()
}

fn optional_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Request settings over the worker defaults. An empty path, an empty argument
/// list or an unspecified threshold keeps the default.
pub(crate) fn session_settings(
    settings: Option<pb::EngineSettings>,
    defaults: &SessionSettings,
) -> SessionSettings {
    let Some(settings) = settings else {
        return defaults.clone();
    };
    SessionSettings {
        offline: settings.offline || defaults.offline,
        logging_threshold: level_from_proto(settings.logging_threshold)
            .unwrap_or(defaults.logging_threshold),
        engine_home: optional_path(settings.engine_home).or_else(|| defaults.engine_home.clone()),
        user_settings_path: optional_path(settings.user_settings_path)
            .or_else(|| defaults.user_settings_path.clone()),
        global_settings_path: optional_path(settings.global_settings_path)
            .or_else(|| defaults.global_settings_path.clone()),
        local_repository_path: optional_path(settings.local_repository_path)
            .or_else(|| defaults.local_repository_path.clone()),
        extra_cli_args: if settings.extra_cli_args.is_empty() {
            defaults.extra_cli_args.clone()
        } else {
            settings.extra_cli_args
        },
    }
}

fn level_from_proto(value: i32) -> Option<ConsoleLevel> {
    match pb::ConsoleLevel::try_from(value).ok()? {
        pb::ConsoleLevel::Unspecified => None,
        pb::ConsoleLevel::Debug => Some(ConsoleLevel::Debug),
        pb::ConsoleLevel::Info => Some(ConsoleLevel::Info),
        pb::ConsoleLevel::Warn => Some(ConsoleLevel::Warn),
        pb::ConsoleLevel::Error => Some(ConsoleLevel::Error),
        pb::ConsoleLevel::Fatal => Some(ConsoleLevel::Fatal),
        pb::ConsoleLevel::Disabled => Some(ConsoleLevel::Disabled),
    }
}

fn level_to_proto(level: ConsoleLevel) -> pb::ConsoleLevel {
    match level {
        ConsoleLevel::Debug => pb::ConsoleLevel::Debug,
        ConsoleLevel::Info => pb::ConsoleLevel::Info,
        ConsoleLevel::Warn => pb::ConsoleLevel::Warn,
        ConsoleLevel::Error => pb::ConsoleLevel::Error,
        ConsoleLevel::Fatal => pb::ConsoleLevel::Fatal,
        ConsoleLevel::Disabled => pb::ConsoleLevel::Disabled,
    }
}

pub(crate) fn console_event_to_proto(event: ConsoleEvent) -> pb::ConsoleEvent {
    pb::ConsoleEvent {
        level: level_to_proto(event.level) as i32,
        message: event.message,
        error_detail: event.error_detail,
    }
}

pub(crate) fn artifact_event_to_proto(event: ArtifactEvent) -> pb::ArtifactEvent {
    let resolve_kind = match event.resolve_kind {
        ResolveKind::Dependency => pb::ResolveKind::Dependency,
        ResolveKind::Plugin => pb::ResolveKind::Plugin,
    };
    let kind = match event.kind {
        ArtifactEventKind::Started => pb::ArtifactEventKind::DownloadStarted,
        ArtifactEventKind::Completed => pb::ArtifactEventKind::DownloadCompleted,
        ArtifactEventKind::Failed => pb::ArtifactEventKind::DownloadFailed,
    };
    pb::ArtifactEvent {
        resolve_kind: resolve_kind as i32,
        kind: kind as i32,
        dependency_id: event.dependency_id,
        error_message: event.error_message,
        error_detail: event.error_detail,
    }
}

fn problem_to_proto(problem: ProjectProblem) -> pb::ProjectProblem {
    let kind = match problem.kind {
        ProblemKind::Structure => pb::ProblemKind::Structure,
    };
    pb::ProjectProblem {
        kind: kind as i32,
        path: problem.path,
        message: problem.message,
    }
}

fn project_to_proto(project: ProjectData) -> Result<pb::ProjectData, Status> {
    Ok(pb::ProjectData {
        model_json: model_json(&project.model)?,
        raw_model: project.raw_model,
        handle: project.handle,
        activated_profiles: project.activated_profiles.into_iter().collect(),
    })
}

pub(crate) fn execution_result_to_proto(result: ExecutionResult) -> Result<pb::ExecutionResult, Status> {
    Ok(pb::ExecutionResult {
        file: result.file.display().to_string(),
        project: result.project.map(project_to_proto).transpose()?,
        problems: result.problems.into_iter().map(problem_to_proto).collect(),
        unresolved_artifacts: result
            .unresolved_artifacts
            .into_iter()
            .map(|key| pb::ArtifactId {
                group_id: key.group_id,
                artifact_id: key.artifact_id,
                version: key.version,
            })
            .collect(),
    })
}

pub(crate) fn goal_result_to_proto(result: GoalExecutionResult) -> pb::GoalExecutionResult {
    pb::GoalExecutionResult {
        file: result.file.display().to_string(),
        success: result.success,
        problems: result.problems.into_iter().map(problem_to_proto).collect(),
    }
}

fn coordinates_from_proto(artifact: pb::ArtifactCoordinates) -> Result<ArtifactCoordinates, Status> {
    if artifact.group_id.is_empty() || artifact.artifact_id.is_empty() || artifact.version.is_empty() {
        return Err(Status::invalid_argument(
            "artifact group_id, artifact_id and version are required",
        ));
    }
    Ok(ArtifactCoordinates {
        group_id: artifact.group_id,
        artifact_id: artifact.artifact_id,
        version: artifact.version,
        packaging: if artifact.packaging.is_empty() {
            "jar".into()
        } else {
            artifact.packaging
        },
        classifier: Some(artifact.classifier).filter(|c| !c.is_empty()),
    })
}

fn coordinates_to_proto(coordinates: ArtifactCoordinates) -> pb::ArtifactCoordinates {
    pb::ArtifactCoordinates {
        group_id: coordinates.group_id,
        artifact_id: coordinates.artifact_id,
        version: coordinates.version,
        packaging: coordinates.packaging,
        classifier: coordinates.classifier.unwrap_or_default(),
    }
}

pub(crate) fn artifact_request_from_proto(
    request: pb::ArtifactResolutionRequest,
) -> Result<ArtifactRequest, Status> {
    let artifact = request
        .artifact
        .ok_or_else(|| Status::invalid_argument("artifact is required"))?;
    Ok(ArtifactRequest {
        coordinates: coordinates_from_proto(artifact)?,
        remote_repositories: repositories_from_proto(request.remote_repositories),
    })
}

pub(crate) fn artifacts_from_proto(
    artifacts: Vec<pb::ArtifactCoordinates>,
) -> Result<Vec<ArtifactCoordinates>, Status> {
    artifacts.into_iter().map(coordinates_from_proto).collect()
}

pub(crate) fn repositories_from_proto(repositories: Vec<pb::RemoteRepository>) -> Vec<Repository> {
    repositories
        .into_iter()
        .map(|repo| Repository {
            id: repo.id,
            url: repo.url,
            name: None,
        })
        .collect()
}

pub(crate) fn resolved_artifact_to_proto(artifact: ResolvedArtifact) -> pb::ResolvedArtifact {
    pb::ResolvedArtifact {
        artifact: Some(coordinates_to_proto(artifact.coordinates)),
        file: artifact
            .file
            .map(|file| file.display().to_string())
            .unwrap_or_default(),
        resolved: artifact.resolved,
    }
}

pub(crate) fn task_status_to_proto(status: LongRunningTaskStatus) -> pb::LongRunningTaskStatusResponse {
    pb::LongRunningTaskStatusResponse {
        fraction: status.fraction,
        console_events: status
            .console_events
            .into_iter()
            .map(console_event_to_proto)
            .collect(),
        download_events: status
            .download_events
            .into_iter()
            .map(artifact_event_to_proto)
            .collect(),
    }
}
