use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::{model::Model, properties::Properties};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("expression cycle detected at ${{{0}}}")]
    Cycle(String),
    #[error("model conversion failed: {0}")]
    Conversion(String),
}

/// Replaces `${expr}` placeholders in every string of the model.
///
/// Expressions are looked up in order: `basedir`, `project.*` / `pom.*`
/// fields of the model, the supplied properties, the model's own
/// properties, then `env.*`. Unknown expressions are kept verbatim.
pub fn interpolate_model(
    model: &Model,
    base_dir: &Path,
    properties: &Properties,
) -> Result<Model, InterpolationError> {
    let tree =
        serde_json::to_value(model).map_err(|err| InterpolationError::Conversion(err.to_string()))?;
    let resolver = Resolver {
        base_dir: base_dir.display().to_string(),
        tree: &tree,
        properties,
        model_properties: &model.properties,
    };
    let mut out = tree.clone();
    resolver.walk(&mut out)?;
    serde_json::from_value(out).map_err(|err| InterpolationError::Conversion(err.to_string()))
}

/// Interpolates a single string against the same sources as
/// [`interpolate_model`].
pub fn interpolate_str(
    text: &str,
    model: &Model,
    base_dir: &Path,
    properties: &Properties,
) -> Result<String, InterpolationError> {
    let tree =
        serde_json::to_value(model).map_err(|err| InterpolationError::Conversion(err.to_string()))?;
    let resolver = Resolver {
        base_dir: base_dir.display().to_string(),
        tree: &tree,
        properties,
        model_properties: &model.properties,
    };
    resolver.resolve(text, &mut Vec::new())
}

struct Resolver<'a> {
    base_dir: String,
    tree: &'a Value,
    properties: &'a Properties,
    model_properties: &'a Properties,
}

impl Resolver<'_> {
    fn walk(&self, value: &mut Value) -> Result<(), InterpolationError> {
        match value {
            Value::String(text) if text.contains("${") => {
                *text = self.resolve(text, &mut Vec::new())?;
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item)?;
                }
            }
            Value::Object(map) => {
                for (_, item) in map.iter_mut() {
                    self.walk(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve(&self, text: &str, stack: &mut Vec<String>) -> Result<String, InterpolationError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let expr = &after[..end];
            match self.lookup(expr) {
                Some(raw) => {
                    if stack.iter().any(|seen| seen == expr) {
                        return Err(InterpolationError::Cycle(expr.to_string()));
                    }
                    stack.push(expr.to_string());
                    let resolved = self.resolve(&raw, stack)?;
                    stack.pop();
                    out.push_str(&resolved);
                }
                None => {
                    out.push_str("${");
                    out.push_str(expr);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn lookup(&self, expr: &str) -> Option<String> {
        let expr = expr.trim();
        if matches!(expr, "basedir" | "project.basedir" | "pom.basedir") {
            return Some(self.base_dir.clone());
        }
        if let Some(path) = expr
            .strip_prefix("project.")
            .or_else(|| expr.strip_prefix("pom."))
        {
            if let Some(found) = self.model_field(path) {
                return Some(found);
            }
        }
        if let Some(value) = self.properties.get(expr) {
            return Some(value.clone());
        }
        if let Some(value) = self.model_properties.get(expr) {
            return Some(value.clone());
        }
        expr.strip_prefix("env.")
            .and_then(|name| std::env::var(name).ok())
    }

    fn model_field(&self, path: &str) -> Option<String> {
        field_at(self.tree, path).or_else(|| match path {
            "groupId" => field_at(self.tree, "parent.groupId"),
            "version" => field_at(self.tree, "parent.version"),
            _ => None,
        })
    }
}

fn field_at(tree: &Value, path: &str) -> Option<String> {
    let mut node = tree;
    for segment in path.split('.') {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match node {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParentRef;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sample() -> Model {
        let mut model = Model {
            artifact_id: Some("app".into()),
            parent: Some(ParentRef {
                group_id: "org.acme".into(),
                artifact_id: "root".into(),
                version: "3.1".into(),
                relative_path: None,
            }),
            ..Model::default()
        };
        model
            .properties
            .insert("out".into(), "${project.build.directory}/out".into());
        model.build.directory = Some("${basedir}/target".into());
        model.build.final_name = Some("${project.artifactId}-${project.version}".into());
        model
    }

    #[test]
    fn resolves_model_fields_and_properties() {
        let base = PathBuf::from("/work/app");
        let out = interpolate_model(&sample(), &base, &Properties::new()).unwrap();
        assert_eq!(out.build.directory.as_deref(), Some("/work/app/target"));
        assert_eq!(out.build.final_name.as_deref(), Some("app-3.1"));
        assert_eq!(
            out.properties.get("out").map(String::as_str),
            Some("/work/app/target/out")
        );
    }

    #[test]
    fn supplied_properties_win_over_model_properties() {
        let mut model = Model::default();
        model.properties.insert("flavor".into(), "model".into());
        model.description = Some("${flavor}".into());
        let props = Properties::from([("flavor".to_string(), "system".to_string())]);
        let out = interpolate_model(&model, Path::new("/"), &props).unwrap();
        assert_eq!(out.description.as_deref(), Some("system"));
    }

    #[test]
    fn unknown_expressions_stay_verbatim() {
        let mut model = Model::default();
        model.description = Some("a ${nope} b ${unterminated".into());
        let out = interpolate_model(&model, Path::new("/"), &Properties::new()).unwrap();
        assert_eq!(out.description.as_deref(), Some("a ${nope} b ${unterminated"));
    }

    #[test]
    fn cycles_are_errors() {
        let mut model = Model::default();
        model.properties.insert("a".into(), "${b}".into());
        model.properties.insert("b".into(), "${a}".into());
        let err = interpolate_model(&model, Path::new("/"), &Properties::new()).unwrap_err();
        assert!(matches!(err, InterpolationError::Cycle(_)));
    }

    #[test]
    fn interpolating_twice_changes_nothing_more() {
        let base = PathBuf::from("/work/app");
        let once = interpolate_model(&sample(), &base, &Properties::new()).unwrap();
        let twice = interpolate_model(&once, &base, &Properties::new()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn single_strings_interpolate_against_the_model() {
        let text = interpolate_str(
            "${project.groupId}/${basedir}",
            &sample(),
            Path::new("/b"),
            &Properties::new(),
        )
        .unwrap();
        assert_eq!(text, "org.acme//b");
    }
}
