use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    channel::{ArtifactEvent, ConsoleEvent},
    engine::{EngineFailure, ProjectOutcome, ResolvedProject},
    model::{to_keyed_map, ArtifactKey, Model},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
    Structure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectProblem {
    pub kind: ProblemKind,
    pub path: String,
    pub message: String,
}

impl ProjectProblem {
    pub fn structure(path: &Path, message: impl Into<String>) -> Self {
        Self {
            kind: ProblemKind::Structure,
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectData {
    pub model: Model,
    pub raw_model: BTreeMap<String, String>,
    pub handle: String,
    pub activated_profiles: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub file: PathBuf,
    pub project: Option<ProjectData>,
    pub problems: Vec<ProjectProblem>,
    pub unresolved_artifacts: BTreeSet<ArtifactKey>,
}

impl ExecutionResult {
    /// Result for a file whose resolution failed outright.
    pub fn failed(file: &Path, message: impl Into<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            project: None,
            problems: vec![ProjectProblem::structure(file, message)],
            unresolved_artifacts: BTreeSet::new(),
        }
    }
}

/// Per-file outcome of running a goal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoalExecutionResult {
    pub file: PathBuf,
    pub success: bool,
    pub problems: Vec<ProjectProblem>,
}

impl GoalExecutionResult {
    pub fn failed(file: &Path, message: impl Into<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            success: false,
            problems: vec![ProjectProblem::structure(file, message)],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub files: Vec<PathBuf>,
    pub active_profiles: Vec<String>,
    pub inactive_profiles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LongRunningTaskStatus {
    pub fraction: f64,
    pub console_events: Vec<ConsoleEvent>,
    pub download_events: Vec<ArtifactEvent>,
}

impl LongRunningTaskStatus {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Turns an engine outcome into the per-file result handed to the host.
///
/// `register` stores the resolved project and returns its opaque handle.
pub fn build_execution_result<F>(
    file: &Path,
    outcome: ProjectOutcome,
    unresolved: BTreeSet<ArtifactKey>,
    register: F,
) -> ExecutionResult
where
    F: FnOnce(&ResolvedProject) -> String,
{
    let problems = validate(file, &outcome.failures);

    let project = outcome.project.map(|project| {
        let handle = register(&project);
        ProjectData {
            raw_model: to_keyed_map(&project.model),
            activated_profiles: collect_activated_profiles(&project),
            model: project.model,
            handle,
        }
    });

    ExecutionResult {
        file: file.to_path_buf(),
        project,
        problems,
        unresolved_artifacts: unresolved,
    }
}

pub fn build_goal_result(file: &Path, failures: &[EngineFailure]) -> GoalExecutionResult {
    GoalExecutionResult {
        file: file.to_path_buf(),
        success: failures.is_empty(),
        problems: validate(file, failures),
    }
}

fn validate(file: &Path, failures: &[EngineFailure]) -> Vec<ProjectProblem> {
    let mut problems = Vec::new();
    for failure in failures {
        info!("{}: {failure}", file.display());
        match failure {
            EngineFailure::InvalidModel {
                validation_messages: Some(messages),
                ..
            } => {
                problems.extend(
                    messages
                        .iter()
                        .map(|message| ProjectProblem::structure(file, message.clone())),
                );
            }
            EngineFailure::InvalidModel {
                message, cause, ..
            }
            | EngineFailure::ProjectBuilding { message, cause } => {
                let text = cause.as_ref().unwrap_or(message);
                problems.push(ProjectProblem::structure(file, text.clone()));
            }
            EngineFailure::Other { message } => {
                problems.push(ProjectProblem::structure(file, message.clone()));
            }
        }
    }
    problems
}

/// Active profile ids of the project and of every parent above it.
pub fn collect_activated_profiles(project: &ResolvedProject) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let mut current = Some(project);
    while let Some(node) = current {
        ids.extend(node.active_profiles.iter().filter(|id| !id.is_empty()).cloned());
        current = node.parent.as_deref();
    }
    ids
}
