use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{model::Profile, properties::Properties};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("profile {profile}: unresolved expression in {value}")]
    Unresolved { profile: String, value: String },
    #[error("profile {profile}: {message}")]
    Invalid { profile: String, message: String },
    #[error("profile {profile}: {name} is not known")]
    Unavailable { profile: String, name: String },
}

/// One activation predicate. Callers ask `can_determine_activation` first and
/// only then `is_active`.
pub trait ProfileActivator: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_determine_activation(&self, profile: &Profile) -> bool;
    fn is_active(&self, profile: &Profile) -> Result<bool, ActivationError>;
}

/// The fixed evaluation order: file presence, property, JDK prefix, OS.
pub fn default_activators(base_dir: &Path, properties: &Properties) -> Vec<Box<dyn ProfileActivator>> {
    vec![
        Box::new(FileActivator::new(base_dir)),
        Box::new(PropertyActivator::new(properties.clone())),
        Box::new(JdkPrefixActivator::new(properties.get("java.version").cloned())),
        Box::new(OsActivator::from_properties(properties)),
    ]
}

fn negated(value: &str) -> (bool, &str) {
    match value.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, value),
    }
}

pub struct FileActivator {
    base_dir: PathBuf,
}

impl FileActivator {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }
}

impl ProfileActivator for FileActivator {
    fn name(&self) -> &'static str {
        "file"
    }

    fn can_determine_activation(&self, profile: &Profile) -> bool {
        profile
            .activation
            .as_ref()
            .and_then(|a| a.file.as_ref())
            .is_some_and(|f| f.exists.is_some() || f.missing.is_some())
    }

    fn is_active(&self, profile: &Profile) -> Result<bool, ActivationError> {
        let Some(file) = profile.activation.as_ref().and_then(|a| a.file.as_ref()) else {
            return Ok(false);
        };
        let (raw, want_present) = match (&file.exists, &file.missing) {
            (Some(path), _) => (path, true),
            (None, Some(path)) => (path, false),
            (None, None) => return Ok(false),
        };
        if raw.contains("${") {
            return Err(ActivationError::Unresolved {
                profile: profile.id.clone(),
                value: raw.clone(),
            });
        }
        let path = Path::new(raw);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        Ok(path.exists() == want_present)
    }
}

pub struct PropertyActivator {
    properties: Properties,
}

impl PropertyActivator {
    pub fn new(properties: Properties) -> Self {
        Self { properties }
    }
}

impl ProfileActivator for PropertyActivator {
    fn name(&self) -> &'static str {
        "property"
    }

    fn can_determine_activation(&self, profile: &Profile) -> bool {
        profile
            .activation
            .as_ref()
            .is_some_and(|a| a.property.is_some())
    }

    fn is_active(&self, profile: &Profile) -> Result<bool, ActivationError> {
        let Some(property) = profile.activation.as_ref().and_then(|a| a.property.as_ref()) else {
            return Ok(false);
        };
        let (reverse_name, name) = negated(property.name.trim());
        if name.is_empty() {
            return Err(ActivationError::Invalid {
                profile: profile.id.clone(),
                message: "property activation without a name".into(),
            });
        }
        let actual = self.properties.get(name).map(String::as_str);
        match property.value.as_deref().filter(|v| !v.is_empty()) {
            Some(expected) => {
                let (reverse_value, expected) = negated(expected);
                let matches = actual == Some(expected);
                Ok(matches != reverse_value)
            }
            None => {
                let present = actual.is_some_and(|v| !v.is_empty());
                Ok(present != reverse_name)
            }
        }
    }
}

pub struct JdkPrefixActivator {
    java_version: Option<String>,
}

impl JdkPrefixActivator {
    pub fn new(java_version: Option<String>) -> Self {
        Self { java_version }
    }
}

impl ProfileActivator for JdkPrefixActivator {
    fn name(&self) -> &'static str {
        "jdk"
    }

    fn can_determine_activation(&self, profile: &Profile) -> bool {
        profile.activation.as_ref().is_some_and(|a| a.jdk.is_some())
    }

    fn is_active(&self, profile: &Profile) -> Result<bool, ActivationError> {
        let Some(jdk) = profile.activation.as_ref().and_then(|a| a.jdk.as_deref()) else {
            return Ok(false);
        };
        let Some(version) = self.java_version.as_deref() else {
            return Err(ActivationError::Unavailable {
                profile: profile.id.clone(),
                name: "java.version".into(),
            });
        };
        let (reverse, prefix) = negated(jdk.trim());
        Ok(version.starts_with(prefix) != reverse)
    }
}

pub struct OsActivator {
    name: String,
    family: String,
    arch: String,
    version: Option<String>,
}

impl OsActivator {
    pub fn new(
        name: impl Into<String>,
        family: impl Into<String>,
        arch: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            family: family.into(),
            arch: arch.into(),
            version,
        }
    }

    pub fn from_properties(properties: &Properties) -> Self {
        let name = properties
            .get("os.name")
            .cloned()
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let family = properties
            .get("os.family")
            .cloned()
            .unwrap_or_else(|| std::env::consts::FAMILY.to_string());
        let arch = properties
            .get("os.arch")
            .cloned()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());
        Self::new(name, family, arch, properties.get("os.version").cloned())
    }

    fn family_matches(&self, family: &str) -> bool {
        let name = self.name.to_ascii_lowercase();
        match family {
            "windows" => self.family.eq_ignore_ascii_case("windows"),
            "unix" => self.family.eq_ignore_ascii_case("unix"),
            "mac" => name.contains("mac") || name.contains("darwin"),
            other => name.contains(other),
        }
    }
}

impl ProfileActivator for OsActivator {
    fn name(&self) -> &'static str {
        "os"
    }

    fn can_determine_activation(&self, profile: &Profile) -> bool {
        profile.activation.as_ref().is_some_and(|a| a.os.is_some())
    }

    fn is_active(&self, profile: &Profile) -> Result<bool, ActivationError> {
        let Some(os) = profile.activation.as_ref().and_then(|a| a.os.as_ref()) else {
            return Ok(false);
        };
        let active = os_field_matches(os.family.as_deref(), |v| self.family_matches(v))
            && os_field_matches(os.name.as_deref(), |v| self.name.eq_ignore_ascii_case(v))
            && os_field_matches(os.arch.as_deref(), |v| self.arch.eq_ignore_ascii_case(v))
            && os_field_matches(os.version.as_deref(), |v| {
                self.version
                    .as_deref()
                    .is_some_and(|actual| actual.eq_ignore_ascii_case(v))
            });
        Ok(active)
    }
}

fn os_field_matches(wanted: Option<&str>, test: impl Fn(&str) -> bool) -> bool {
    match wanted {
        None => true,
        Some(raw) => {
            let (reverse, value) = negated(raw.trim());
            test(&value.to_ascii_lowercase()) != reverse
        }
    }
}
