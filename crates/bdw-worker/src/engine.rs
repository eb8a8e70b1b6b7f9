use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    fs, io,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use bdw_core::{
    channel::ResolveKind,
    engine::UpdatePolicy,
    model::{ArtifactCoordinates, Dependency, ParentRef, Repository},
    properties::Properties,
    ArtifactEvent, ArtifactRequest, EngineContext, EngineError, EngineFactory, EngineFailure,
    EngineSettings, ExplicitProfiles, Model, ModelAssembler, ProfileResolver, ProjectOutcome,
    ResolutionEngine, ResolvedArtifact, ResolvedProject,
};
use tracing::{debug, info};

const MAX_PARENT_DEPTH: usize = 32;

/// Creates a [`LocalEngine`] per session.
#[derive(Debug, Default)]
pub(crate) struct LocalEngineFactory {
    fallback_repository: Option<PathBuf>,
}

impl LocalEngineFactory {
    pub(crate) fn new(fallback_repository: PathBuf) -> Self {
        Self {
            fallback_repository: Some(fallback_repository),
        }
    }
}

impl EngineFactory for LocalEngineFactory {
    fn create(&self, settings: &EngineSettings) -> Result<Arc<dyn ResolutionEngine>, EngineError> {
        let repository = settings
            .local_repository_path
            .clone()
            .or_else(|| self.fallback_repository.clone())
            .ok_or_else(|| EngineError::Other("local repository path is not configured".into()))?;
        info!(
            "local engine over {} (offline={})",
            repository.display(),
            settings.offline
        );
        Ok(Arc::new(LocalEngine::new(repository, settings.clone())))
    }
}

#[derive(Debug, Clone)]
struct CachedDescription {
    modified: Option<SystemTime>,
    model: Model,
}

#[derive(Debug)]
enum LoadError {
    Io(io::Error),
    Parse(serde_json::Error),
}

/// Level of the parent chain: the inherited model before interpolation and
/// the effective project built from it.
struct Assembled {
    inherited: Model,
    project: ResolvedProject,
}

/// Resolution engine over JSON build descriptions and a local artifact
/// repository laid out by coordinates.
pub(crate) struct LocalEngine {
    repository: PathBuf,
    settings: EngineSettings,
    assembler: ModelAssembler,
    descriptions: Mutex<HashMap<PathBuf, CachedDescription>>,
}

impl LocalEngine {
    pub(crate) fn new(repository: PathBuf, settings: EngineSettings) -> Self {
        Self {
            repository,
            settings,
            assembler: ModelAssembler::default(),
            descriptions: Mutex::new(HashMap::new()),
        }
    }

    fn properties(&self) -> &Properties {
        &self.settings.properties
    }

    fn load(&self, file: &Path) -> Result<Model, LoadError> {
        let modified = fs::metadata(file)
            .map_err(LoadError::Io)?
            .modified()
            .ok();
        let mut cache = self
            .descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(file) {
            if cached.modified.is_some() && cached.modified == modified {
                return Ok(cached.model.clone());
            }
        }
        let data = fs::read_to_string(file).map_err(LoadError::Io)?;
        let model = Model::from_json(&data).map_err(LoadError::Parse)?;
        cache.insert(
            file.to_path_buf(),
            CachedDescription {
                modified,
                model: model.clone(),
            },
        );
        Ok(model)
    }

    fn assemble(
        &self,
        context: &EngineContext,
        file: &Path,
        explicit: &ExplicitProfiles,
        depth: usize,
    ) -> Result<Assembled, EngineFailure> {
        if depth > MAX_PARENT_DEPTH {
            return Err(EngineFailure::ProjectBuilding {
                message: format!("parent chain of {} is too deep", file.display()),
                cause: None,
            });
        }
        let raw = self.load(file).map_err(|err| match err {
            LoadError::Io(err) => EngineFailure::ProjectBuilding {
                message: format!("failed to read {}", file.display()),
                cause: Some(err.to_string()),
            },
            LoadError::Parse(err) => EngineFailure::InvalidModel {
                message: format!("failed to parse {}", file.display()),
                validation_messages: None,
                cause: Some(err.to_string()),
            },
        })?;
        let base_dir = file.parent().unwrap_or(Path::new("."));

        let resolver = ProfileResolver::new(self.assembler.clone(), self.properties().clone());
        let profiled = resolver.apply(&raw, base_dir, explicit, &BTreeSet::new());
        if !profiled.activated.is_empty() {
            context.console().debug(&format!(
                "{}: active profiles {}",
                file.display(),
                profiled.activated.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }

        let (inherited, parent) = match &raw.parent {
            Some(parent_ref) => {
                let parent_file = parent_path(file, parent_ref);
                if !parent_file.is_file() {
                    return Err(EngineFailure::ProjectBuilding {
                        message: format!("parent {} not found", parent_ref.key()),
                        cause: Some(format!("no description at {}", parent_file.display())),
                    });
                }
                let parent = self.assemble(context, &parent_file, explicit, depth + 1)?;
                let found = parent.inherited.key();
                if found.artifact_id != parent_ref.artifact_id {
                    return Err(EngineFailure::ProjectBuilding {
                        message: format!(
                            "parent {} expected at {}, found {found}",
                            parent_ref.key(),
                            parent_file.display()
                        ),
                        cause: None,
                    });
                }
                let inherited = self
                    .assembler
                    .assemble_inheritance(&profiled.model, &parent.inherited);
                (inherited, Some(Box::new(parent.project)))
            }
            None => (profiled.model, None),
        };

        let effective = self
            .assembler
            .interpolate_and_align(&inherited, base_dir, self.properties());
        Ok(Assembled {
            inherited,
            project: ResolvedProject {
                model: effective,
                active_profiles: profiled.activated.into_iter().collect(),
                parent,
            },
        })
    }

    /// Looks an artifact up in the local repository, reporting the attempt on
    /// the command channel. Misses are recorded as unresolved.
    fn resolve_local(
        &self,
        context: &EngineContext,
        kind: ResolveKind,
        coordinates: &ArtifactCoordinates,
    ) -> Option<PathBuf> {
        let refresh = self.settings.snapshot_update_policy == UpdatePolicy::AlwaysUpdate
            && coordinates.version.ends_with("-SNAPSHOT");
        if !refresh {
            if let Some(cached) = context.cached_artifact(coordinates) {
                if cached.is_none() {
                    context.record_unresolved(coordinates.key());
                }
                return cached;
            }
        }

        let id = coordinates.to_string();
        context.download_event(ArtifactEvent::started(kind, id.clone()));
        let path = self.repository.join(coordinates.repository_path());
        let found = path.is_file().then_some(path);
        match &found {
            Some(path) => {
                context.console().debug(&format!("found {id} at {}", path.display()));
                context.download_event(ArtifactEvent::completed(kind, id));
            }
            None => {
                let mut message = format!(
                    "could not find artifact {id} in {}",
                    self.repository.display()
                );
                if self.settings.offline {
                    message.push_str(" (offline)");
                }
                context.console().warn(&message);
                context.download_event(ArtifactEvent::failed(kind, id, message, None));
                context.record_unresolved(coordinates.key());
            }
        }
        context.cache_artifact(coordinates.clone(), found.clone());
        found
    }

    /// Builds the effective project of `file` and checks it. A project that
    /// cannot be built or fails the checks comes back as failures only.
    fn effective_project(
        &self,
        context: &EngineContext,
        file: &Path,
        active_profiles: &[String],
        inactive_profiles: &[String],
    ) -> Result<ProjectOutcome, EngineError> {
        if context.is_canceled() {
            return Err(EngineError::Canceled);
        }
        context
            .console()
            .info(&format!("Resolving {}", file.display()));
        let explicit = ExplicitProfiles::new(
            active_profiles.iter().cloned(),
            inactive_profiles.iter().cloned(),
        );

        let project = match self.assemble(context, file, &explicit, 0) {
            Ok(assembled) => assembled.project,
            Err(failure) => {
                context.console().error(&failure.to_string(), None);
                return Ok(ProjectOutcome {
                    project: None,
                    failures: vec![failure],
                });
            }
        };

        let problems = validate(&project.model);
        if !problems.is_empty() {
            return Ok(ProjectOutcome {
                project: None,
                failures: vec![EngineFailure::InvalidModel {
                    message: format!("{} has an invalid model", file.display()),
                    validation_messages: Some(problems),
                    cause: None,
                }],
            });
        }
        Ok(ProjectOutcome {
            project: Some(project),
            failures: Vec::new(),
        })
    }

    /// Looks up every dependency of the project and returns the ones missing
    /// from the repository.
    fn resolve_dependencies(
        &self,
        context: &EngineContext,
        model: &Model,
    ) -> Result<Vec<ArtifactCoordinates>, EngineError> {
        let mut missing = Vec::new();
        let total = model.dependencies.len();
        for (index, dependency) in model.dependencies.iter().enumerate() {
            if context.is_canceled() {
                return Err(EngineError::Canceled);
            }
            let coordinates = dependency_coordinates(model, dependency);
            context.progress(&coordinates.to_string(), Some(index as f64 / total as f64));
            if self
                .resolve_local(context, ResolveKind::Dependency, &coordinates)
                .is_none()
            {
                missing.push(coordinates);
            }
        }
        Ok(missing)
    }

    /// Runtime dependencies declared by the description installed next to an
    /// artifact. An artifact without one has none.
    fn installed_dependencies(
        &self,
        context: &EngineContext,
        coordinates: &ArtifactCoordinates,
    ) -> Vec<ArtifactCoordinates> {
        let description = ArtifactCoordinates {
            packaging: "json".into(),
            classifier: None,
            ..coordinates.clone()
        };
        let file = self.repository.join(description.repository_path());
        if !file.is_file() {
            return Vec::new();
        }
        let model = match self.load(&file) {
            Ok(model) => model,
            Err(LoadError::Io(err)) => {
                context
                    .console()
                    .warn(&format!("cannot read {}: {err}", file.display()));
                return Vec::new();
            }
            Err(LoadError::Parse(err)) => {
                context
                    .console()
                    .warn(&format!("cannot parse {}: {err}", file.display()));
                return Vec::new();
            }
        };
        let base_dir = file.parent().unwrap_or(Path::new("."));
        let model = self.assembler.interpolate(&model, base_dir, self.properties());
        model
            .dependencies
            .iter()
            .filter(|dependency| is_runtime(dependency))
            .map(|dependency| dependency_coordinates(&model, dependency))
            .filter(|coordinates| {
                let known = !coordinates.version.is_empty();
                if !known {
                    debug!("{coordinates} has no version in {}", file.display());
                }
                known
            })
            .collect()
    }
}

impl ResolutionEngine for LocalEngine {
    fn resolve_project(
        &self,
        context: &EngineContext,
        file: &Path,
        active_profiles: &[String],
        inactive_profiles: &[String],
    ) -> Result<ProjectOutcome, EngineError> {
        let outcome = self.effective_project(context, file, active_profiles, inactive_profiles)?;
        let Some(project) = &outcome.project else {
            return Ok(outcome);
        };
        self.resolve_dependencies(context, &project.model)?;
        context
            .console()
            .info(&format!("Resolved {}", project.model.key()));
        Ok(outcome)
    }

    fn resolve_artifacts(
        &self,
        context: &EngineContext,
        requests: &[ArtifactRequest],
    ) -> Result<Vec<ResolvedArtifact>, EngineError> {
        let mut artifacts = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            if context.is_canceled() {
                return Err(EngineError::Canceled);
            }
            for repo in &request.remote_repositories {
                debug!("ignoring remote repository {} ({})", repo.id, repo.url);
            }
            context.progress(
                &request.coordinates.to_string(),
                Some(index as f64 / requests.len() as f64),
            );
            let file = self.resolve_local(context, ResolveKind::Dependency, &request.coordinates);
            let Some(file) = file else {
                return Err(EngineError::NotFound(format!(
                    "could not find artifact {}",
                    request.coordinates
                )));
            };
            artifacts.push(ResolvedArtifact {
                coordinates: request.coordinates.clone(),
                file: Some(file),
                resolved: true,
            });
        }
        Ok(artifacts)
    }

    fn resolve_artifacts_transitively(
        &self,
        context: &EngineContext,
        artifacts: &[ArtifactCoordinates],
        remote_repositories: &[Repository],
    ) -> Result<Vec<ResolvedArtifact>, EngineError> {
        for repo in remote_repositories {
            debug!("ignoring remote repository {} ({})", repo.id, repo.url);
        }
        // Breadth first, so the nearest version of an artifact wins.
        let mut seen = HashSet::new();
        let mut pending: VecDeque<ArtifactCoordinates> = artifacts.iter().cloned().collect();
        let mut resolved = Vec::new();
        while let Some(coordinates) = pending.pop_front() {
            if context.is_canceled() {
                return Err(EngineError::Canceled);
            }
            let identity = (
                coordinates.group_id.clone(),
                coordinates.artifact_id.clone(),
                coordinates.classifier.clone(),
            );
            if !seen.insert(identity) {
                continue;
            }
            context.progress(&coordinates.to_string(), None);
            let Some(file) = self.resolve_local(context, ResolveKind::Dependency, &coordinates)
            else {
                return Err(EngineError::NotFound(format!(
                    "could not find artifact {coordinates}"
                )));
            };
            pending.extend(self.installed_dependencies(context, &coordinates));
            resolved.push(ResolvedArtifact {
                coordinates,
                file: Some(file),
                resolved: true,
            });
        }
        Ok(resolved)
    }

    fn execute_goal(
        &self,
        context: &EngineContext,
        file: &Path,
        active_profiles: &[String],
        inactive_profiles: &[String],
        goal: &str,
    ) -> Result<Vec<EngineFailure>, EngineError> {
        let outcome = self.effective_project(context, file, active_profiles, inactive_profiles)?;
        let Some(project) = outcome.project else {
            return Ok(outcome.failures);
        };
        let base_dir = file.parent().unwrap_or(Path::new("."));
        let failures: Vec<EngineFailure> = match goal {
            "validate" => Vec::new(),
            "resolve" | "dependency:resolve" => self
                .resolve_dependencies(context, &project.model)?
                .into_iter()
                .map(|missing| EngineFailure::Other {
                    message: format!("could not resolve dependency {missing}"),
                })
                .collect(),
            "clean" => clean(context, &project.model, base_dir).err().into_iter().collect(),
            other => vec![EngineFailure::Other {
                message: format!("unknown goal {other}"),
            }],
        };
        if failures.is_empty() {
            context
                .console()
                .info(&format!("{goal} succeeded for {}", project.model.key()));
        } else {
            for failure in &failures {
                context.console().error(&failure.to_string(), None);
            }
        }
        Ok(failures)
    }

    fn project_cache_len(&self) -> usize {
        self.descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn clear_project_caches(&self) {
        self.descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn release(&self) {
        debug!("local engine over {} released", self.repository.display());
    }
}

/// `relativePath` from the description's directory, `../<same file name>`
/// when absent. A directory gets the description's file name appended.
fn parent_path(file: &Path, parent: &ParentRef) -> PathBuf {
    let base_dir = file.parent().unwrap_or(Path::new("."));
    let file_name = file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "project.json".into());
    match parent.relative_path.as_deref() {
        Some(relative) if !relative.is_empty() => {
            let candidate = base_dir.join(relative);
            if candidate.is_dir() {
                candidate.join(file_name)
            } else {
                candidate
            }
        }
        _ => base_dir.join("..").join(file_name),
    }
}

/// Deletes the build directory. Directories outside the project are left
/// alone and reported.
fn clean(context: &EngineContext, model: &Model, base_dir: &Path) -> Result<(), EngineFailure> {
    let Some(directory) = model.build.directory.as_deref().map(Path::new) else {
        return Ok(());
    };
    let escapes = directory
        .components()
        .any(|component| component == Component::ParentDir);
    if escapes || directory == base_dir || !directory.starts_with(base_dir) {
        return Err(EngineFailure::Other {
            message: format!(
                "build directory {} is outside {}",
                directory.display(),
                base_dir.display()
            ),
        });
    }
    if !directory.exists() {
        return Ok(());
    }
    context
        .console()
        .info(&format!("Deleting {}", directory.display()));
    fs::remove_dir_all(directory).map_err(|err| EngineFailure::Other {
        message: format!("failed to delete {}: {err}", directory.display()),
    })
}

fn dependency_coordinates(model: &Model, dependency: &Dependency) -> ArtifactCoordinates {
    let mut coordinates = dependency.coordinates();
    if coordinates.version.is_empty() {
        if let Some(version) = managed_version(model, &dependency.management_key()) {
            coordinates.version = version;
        }
    }
    coordinates
}

fn is_runtime(dependency: &Dependency) -> bool {
    !dependency.optional
        && !matches!(
            dependency.scope.as_deref(),
            Some("test") | Some("provided") | Some("system")
        )
}

fn managed_version(model: &Model, management_key: &str) -> Option<String> {
    model
        .dependency_management
        .iter()
        .find(|managed| managed.management_key() == management_key)
        .and_then(|managed| managed.version.clone())
}

fn validate(model: &Model) -> Vec<String> {
    let mut problems = Vec::new();
    let key = model.key();
    if key.artifact_id.is_empty() {
        problems.push("artifactId is missing".to_string());
    }
    if key.group_id.is_empty() {
        problems.push("groupId is missing".to_string());
    }
    if key.version.is_empty() {
        problems.push("version is missing".to_string());
    }
    for dependency in &model.dependencies {
        let has_version = dependency.version.as_deref().is_some_and(|v| !v.is_empty())
            || managed_version(model, &dependency.management_key()).is_some();
        if !has_version {
            problems.push(format!(
                "dependencies.dependency.version for {} is missing",
                dependency.management_key()
            ));
        }
    }
    problems
}
