use std::{
    collections::{BTreeMap, HashSet},
    hash::Hash,
    path::Path,
};

use tracing::warn;

use crate::{
    interpolation::interpolate_model,
    model::{Build, Dependency, Model, Profile, Repository, Resource},
    properties::Properties,
};

/// How a collection-valued field of a parent reaches the child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDirection {
    /// Parent entries first, then the child's; the child wins on equal keys.
    ParentFirst,
    /// Child entries first, then parent entries the child does not override.
    ChildFirst,
    /// The parent's entries only when the child declares none.
    ReplaceIfEmpty,
    NotInherited,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionField {
    Modules,
    Dependencies,
    DependencyManagement,
    Repositories,
    Resources,
    TestResources,
    Filters,
    Profiles,
}

/// Per-field merge table consulted by [`ModelAssembler::assemble_inheritance`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InheritancePolicy {
    fields: BTreeMap<CollectionField, MergeDirection>,
}

impl Default for InheritancePolicy {
    fn default() -> Self {
        use CollectionField::*;
        use MergeDirection::*;
        Self {
            fields: BTreeMap::from([
                (Modules, NotInherited),
                (Dependencies, ChildFirst),
                (DependencyManagement, ChildFirst),
                (Repositories, ParentFirst),
                (Resources, ReplaceIfEmpty),
                (TestResources, ReplaceIfEmpty),
                (Filters, ChildFirst),
                (Profiles, NotInherited),
            ]),
        }
    }
}

impl InheritancePolicy {
    pub fn with(mut self, field: CollectionField, direction: MergeDirection) -> Self {
        self.fields.insert(field, direction);
        self
    }

    pub fn direction(&self, field: CollectionField) -> MergeDirection {
        self.fields
            .get(&field)
            .copied()
            .unwrap_or(MergeDirection::NotInherited)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelAssembler {
    policy: InheritancePolicy,
}

impl ModelAssembler {
    pub fn new(policy: InheritancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &InheritancePolicy {
        &self.policy
    }

    /// Fills everything the child leaves unset from the parent.
    pub fn assemble_inheritance(&self, child: &Model, parent: &Model) -> Model {
        use CollectionField::*;
        let policy = &self.policy;

        let mut properties = parent.properties.clone();
        properties.extend(child.properties.clone());

        Model {
            group_id: child.group_id.clone().or_else(|| parent.group_id.clone()),
            artifact_id: child.artifact_id.clone(),
            version: child.version.clone().or_else(|| parent.version.clone()),
            packaging: child.packaging.clone(),
            name: child.name.clone(),
            description: child
                .description
                .clone()
                .or_else(|| parent.description.clone()),
            parent: child.parent.clone(),
            properties,
            modules: merge_by_key(
                &child.modules,
                &parent.modules,
                policy.direction(Modules),
                String::clone,
            ),
            dependencies: merge_by_key(
                &child.dependencies,
                &parent.dependencies,
                policy.direction(Dependencies),
                Dependency::management_key,
            ),
            dependency_management: merge_by_key(
                &child.dependency_management,
                &parent.dependency_management,
                policy.direction(DependencyManagement),
                Dependency::management_key,
            ),
            repositories: merge_by_key(
                &child.repositories,
                &parent.repositories,
                policy.direction(Repositories),
                |r: &Repository| r.id.clone(),
            ),
            build: self.inherit_build(&child.build, &parent.build),
            profiles: merge_by_key(
                &child.profiles,
                &parent.profiles,
                policy.direction(Profiles),
                |p: &Profile| p.id.clone(),
            ),
        }
    }

    fn inherit_build(&self, child: &Build, parent: &Build) -> Build {
        use CollectionField::*;
        let pick = |c: &Option<String>, p: &Option<String>| c.clone().or_else(|| p.clone());
        Build {
            directory: pick(&child.directory, &parent.directory),
            source_directory: pick(&child.source_directory, &parent.source_directory),
            test_source_directory: pick(&child.test_source_directory, &parent.test_source_directory),
            script_source_directory: pick(
                &child.script_source_directory,
                &parent.script_source_directory,
            ),
            output_directory: pick(&child.output_directory, &parent.output_directory),
            test_output_directory: pick(&child.test_output_directory, &parent.test_output_directory),
            final_name: pick(&child.final_name, &parent.final_name),
            default_goal: pick(&child.default_goal, &parent.default_goal),
            resources: merge_by_key(
                &child.resources,
                &parent.resources,
                self.policy.direction(Resources),
                |r: &Resource| r.directory.clone(),
            ),
            test_resources: merge_by_key(
                &child.test_resources,
                &parent.test_resources,
                self.policy.direction(TestResources),
                |r: &Resource| r.directory.clone(),
            ),
            filters: merge_by_key(
                &child.filters,
                &parent.filters,
                self.policy.direction(Filters),
                String::clone,
            ),
        }
    }

    /// Applies a profile's overlay onto the model; profile values win.
    pub fn inject_profile(&self, profile: &Profile, model: &mut Model) {
        model.properties.extend(profile.properties.clone());
        for module in &profile.modules {
            if !model.modules.contains(module) {
                model.modules.push(module.clone());
            }
        }
        upsert_all(
            &mut model.dependencies,
            &profile.dependencies,
            Dependency::management_key,
        );
        upsert_all(
            &mut model.dependency_management,
            &profile.dependency_management,
            Dependency::management_key,
        );
        upsert_all(
            &mut model.repositories,
            &profile.repositories,
            |r: &Repository| r.id.clone(),
        );

        let overlay = &profile.build;
        let build = &mut model.build;
        if overlay.directory.is_some() {
            build.directory = overlay.directory.clone();
        }
        if overlay.final_name.is_some() {
            build.final_name = overlay.final_name.clone();
        }
        if overlay.default_goal.is_some() {
            build.default_goal = overlay.default_goal.clone();
        }
        if !overlay.resources.is_empty() {
            build.resources = overlay.resources.clone();
        }
        if !overlay.test_resources.is_empty() {
            build.test_resources = overlay.test_resources.clone();
        }
        for filter in &overlay.filters {
            if !build.filters.contains(filter) {
                build.filters.push(filter.clone());
            }
        }
    }

    /// Interpolates the model; on failure logs and hands back an unchanged
    /// copy.
    pub fn interpolate(&self, model: &Model, base_dir: &Path, properties: &Properties) -> Model {
        match interpolate_model(model, base_dir, properties) {
            Ok(model) => model,
            Err(err) => {
                warn!("skipping interpolation of {}: {err}", model.key());
                model.clone()
            }
        }
    }

    /// Makes build and resource directories absolute against `base_dir`.
    pub fn align_paths(&self, mut model: Model, base_dir: &Path) -> Model {
        let build = &mut model.build;
        for dir in [
            &mut build.directory,
            &mut build.source_directory,
            &mut build.test_source_directory,
            &mut build.script_source_directory,
            &mut build.output_directory,
            &mut build.test_output_directory,
        ]
        .into_iter()
        .flatten()
        {
            align(dir, base_dir);
        }
        for resource in build.resources.iter_mut().chain(build.test_resources.iter_mut()) {
            align(&mut resource.directory, base_dir);
        }
        for filter in build.filters.iter_mut() {
            align(filter, base_dir);
        }
        model
    }

    pub fn interpolate_and_align(
        &self,
        model: &Model,
        base_dir: &Path,
        system_properties: &Properties,
    ) -> Model {
        let interpolated = self.interpolate(model, base_dir, system_properties);
        self.align_paths(interpolated, base_dir)
    }
}

fn align(path: &mut String, base_dir: &Path) {
    if path.is_empty() || Path::new(path.as_str()).is_absolute() {
        return;
    }
    *path = base_dir.join(path.as_str()).display().to_string();
}

fn merge_by_key<T, K, F>(child: &[T], parent: &[T], direction: MergeDirection, key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let inherited = || {
        let child_keys: HashSet<K> = child.iter().map(&key).collect();
        parent
            .iter()
            .filter(|item| !child_keys.contains(&key(*item)))
            .cloned()
            .collect::<Vec<_>>()
    };
    match direction {
        MergeDirection::NotInherited => child.to_vec(),
        MergeDirection::ReplaceIfEmpty if child.is_empty() => parent.to_vec(),
        MergeDirection::ReplaceIfEmpty => child.to_vec(),
        MergeDirection::ChildFirst => {
            let mut out = child.to_vec();
            out.extend(inherited());
            out
        }
        MergeDirection::ParentFirst => {
            let mut out = inherited();
            out.extend(child.iter().cloned());
            out
        }
    }
}

fn upsert_all<T, K, F>(target: &mut Vec<T>, overlay: &[T], key: F)
where
    T: Clone,
    K: Eq,
    F: Fn(&T) -> K,
{
    for item in overlay {
        let wanted = key(item);
        match target.iter_mut().find(|existing| key(existing) == wanted) {
            Some(existing) => *existing = item.clone(),
            None => target.push(item.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProfileSource;
    use pretty_assertions::assert_eq;

    fn dep(artifact: &str, version: &str) -> Dependency {
        Dependency {
            group_id: "g".into(),
            artifact_id: artifact.into(),
            version: Some(version.into()),
            ..Dependency::default()
        }
    }

    fn repo(id: &str, url: &str) -> Repository {
        Repository {
            id: id.into(),
            url: url.into(),
            name: None,
        }
    }

    fn parent() -> Model {
        let mut parent = Model {
            group_id: Some("org.acme".into()),
            artifact_id: Some("root".into()),
            version: Some("1.0".into()),
            packaging: Some("pom".into()),
            modules: vec!["app".into()],
            dependencies: vec![dep("a", "1"), dep("b", "1")],
            repositories: vec![repo("central", "https://parent"), repo("corp", "https://corp")],
            ..Model::default()
        };
        parent.properties.insert("shared".into(), "parent".into());
        parent.properties.insert("only.parent".into(), "yes".into());
        parent.build.directory = Some("out".into());
        parent.build.resources = vec![Resource {
            directory: "res".into(),
            ..Resource::default()
        }];
        parent.profiles = vec![Profile::new("parent-only", ProfileSource::Description)];
        parent
    }

    #[test]
    fn inheritance_follows_the_default_policy() {
        let mut child = Model {
            artifact_id: Some("app".into()),
            dependencies: vec![dep("b", "2"), dep("c", "1")],
            repositories: vec![repo("central", "https://child")],
            ..Model::default()
        };
        child.properties.insert("shared".into(), "child".into());

        let out = ModelAssembler::default().assemble_inheritance(&child, &parent());

        assert_eq!(out.group_id.as_deref(), Some("org.acme"));
        assert_eq!(out.version.as_deref(), Some("1.0"));
        assert_eq!(out.artifact_id.as_deref(), Some("app"));
        assert_eq!(out.packaging, None);
        assert!(out.modules.is_empty());
        assert!(out.profiles.is_empty());
        assert_eq!(out.properties.get("shared").map(String::as_str), Some("child"));
        assert_eq!(out.properties.get("only.parent").map(String::as_str), Some("yes"));

        let deps: Vec<_> = out
            .dependencies
            .iter()
            .map(|d| format!("{}:{}", d.artifact_id, d.version.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(deps, vec!["b:2", "c:1", "a:1"]);

        let repos: Vec<_> = out.repositories.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(repos, vec!["https://corp", "https://child"]);

        assert_eq!(out.build.directory.as_deref(), Some("out"));
        assert_eq!(out.build.resources.len(), 1);
    }

    #[test]
    fn policy_entries_are_pluggable() {
        let policy = InheritancePolicy::default()
            .with(CollectionField::Modules, MergeDirection::ParentFirst)
            .with(CollectionField::Dependencies, MergeDirection::NotInherited);
        let child = Model {
            modules: vec!["extra".into()],
            ..Model::default()
        };
        let out = ModelAssembler::new(policy).assemble_inheritance(&child, &parent());
        assert_eq!(out.modules, vec!["app".to_string(), "extra".to_string()]);
        assert!(out.dependencies.is_empty());
    }

    #[test]
    fn profile_overlay_wins() {
        let mut model = parent();
        let mut profile = Profile::new("ci", ProfileSource::Description);
        profile.properties.insert("shared".into(), "profile".into());
        profile.modules = vec!["app".into(), "it".into()];
        profile.dependencies = vec![dep("a", "9")];
        profile.build.directory = Some("ci-out".into());

        ModelAssembler::default().inject_profile(&profile, &mut model);

        assert_eq!(model.properties.get("shared").map(String::as_str), Some("profile"));
        assert_eq!(model.modules, vec!["app".to_string(), "it".to_string()]);
        assert_eq!(model.dependencies[0].version.as_deref(), Some("9"));
        assert_eq!(model.dependencies.len(), 2);
        assert_eq!(model.build.directory.as_deref(), Some("ci-out"));
        assert_eq!(model.build.resources.len(), 1);
    }

    #[test]
    fn align_makes_relative_paths_absolute() {
        let mut model = Model::default();
        model.build.directory = Some("target".into());
        model.build.source_directory = Some("/abs/src".into());
        model.build.resources = vec![Resource {
            directory: "src/main/resources".into(),
            ..Resource::default()
        }];

        let out = ModelAssembler::default().align_paths(model, Path::new("/work/app"));

        assert_eq!(out.build.directory.as_deref(), Some("/work/app/target"));
        assert_eq!(out.build.source_directory.as_deref(), Some("/abs/src"));
        assert_eq!(out.build.resources[0].directory, "/work/app/src/main/resources");
        assert_eq!(out.build.test_output_directory, None);
    }

    #[test]
    fn failed_interpolation_leaves_the_model_alone() {
        let mut model = Model::default();
        model.properties.insert("loop".into(), "${loop}".into());
        model.build.directory = Some("${loop}".into());
        let out = ModelAssembler::default().interpolate(&model, Path::new("/"), &Properties::new());
        assert_eq!(out, model);
    }

    #[test]
    fn interpolate_and_align_runs_both_steps() {
        let mut model = Model::default();
        model.properties.insert("out".into(), "build-out".into());
        model.build.directory = Some("${out}".into());
        let out = ModelAssembler::default().interpolate_and_align(
            &model,
            Path::new("/w"),
            &Properties::new(),
        );
        assert_eq!(out.build.directory.as_deref(), Some("/w/build-out"));
    }
}
