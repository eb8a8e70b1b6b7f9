use std::{collections::BTreeSet, path::Path};

use tracing::{debug, warn};

use crate::{
    activation::{default_activators, ProfileActivator},
    assembler::ModelAssembler,
    model::{Model, Profile, ProfileSource},
    properties::Properties,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExplicitProfiles {
    pub enabled: BTreeSet<String>,
    pub disabled: BTreeSet<String>,
}

impl ExplicitProfiles {
    pub fn new<I, J, S, T>(enabled: I, disabled: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileApplication {
    pub model: Model,
    pub activated: BTreeSet<String>,
    pub deactivated: BTreeSet<String>,
}

/// Decides which profiles of a model apply and injects them.
pub struct ProfileResolver {
    assembler: ModelAssembler,
    system_properties: Properties,
    activators: Option<Vec<Box<dyn ProfileActivator>>>,
}

impl ProfileResolver {
    pub fn new(assembler: ModelAssembler, system_properties: Properties) -> Self {
        Self {
            assembler,
            system_properties,
            activators: None,
        }
    }

    /// Replaces the per-call default predicate list with a fixed one.
    pub fn with_activators(mut self, activators: Vec<Box<dyn ProfileActivator>>) -> Self {
        self.activators = Some(activators);
        self
    }

    pub fn apply(
        &self,
        model: &Model,
        base_dir: &Path,
        explicit: &ExplicitProfiles,
        always_on: &BTreeSet<String>,
    ) -> ProfileApplication {
        let defaults;
        let activators: &[Box<dyn ProfileActivator>] = match &self.activators {
            Some(list) => list,
            None => {
                defaults = default_activators(base_dir, &self.system_properties);
                &defaults
            }
        };

        let mut from_description: Vec<&Profile> = Vec::new();
        let mut external: Vec<&Profile> = Vec::new();
        let mut by_default: Vec<&Profile> = Vec::new();
        let mut deactivated: Vec<&Profile> = Vec::new();
        let mut expanded: Option<Vec<Profile>> = None;

        for (index, raw) in model.profiles.iter().enumerate() {
            if explicit.disabled.contains(&raw.id) {
                deactivated.push(raw);
                continue;
            }

            let mut should_activate =
                explicit.enabled.contains(&raw.id) || always_on.contains(&raw.id);

            if let Some(activation) = &raw.activation {
                if activation.active_by_default {
                    by_default.push(raw);
                }

                let expanded = expanded.get_or_insert_with(|| {
                    self.assembler
                        .interpolate(model, base_dir, &self.system_properties)
                        .profiles
                });
                let candidate = expanded.get(index).unwrap_or(raw);

                for activator in activators {
                    if !activator.can_determine_activation(candidate) {
                        continue;
                    }
                    match activator.is_active(candidate) {
                        Ok(true) => {
                            debug!("profile {} activated by {}", raw.id, activator.name());
                            should_activate = true;
                            break;
                        }
                        Ok(false) => {}
                        Err(err) => warn!("{} activation check failed: {err}", activator.name()),
                    }
                }
            }

            if should_activate {
                match raw.source {
                    ProfileSource::Description => from_description.push(raw),
                    ProfileSource::External => external.push(raw),
                }
            }
        }

        let mut activated = if from_description.is_empty() {
            by_default
        } else {
            from_description
        };
        activated.extend(external);

        let mut out = model.clone();
        for profile in &activated {
            self.assembler.inject_profile(profile, &mut out);
        }

        ProfileApplication {
            model: out,
            activated: collect_ids(&activated),
            deactivated: collect_ids(&deactivated),
        }
    }
}

fn collect_ids(profiles: &[&Profile]) -> BTreeSet<String> {
    profiles
        .iter()
        .filter(|p| !p.id.is_empty())
        .map(|p| p.id.clone())
        .collect()
}
