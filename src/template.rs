//! Merges resources from included templates into the main template through
//! its top-level `IncludedResources` section.

use std::fs;
use std::path::Path;

use regex::Regex;
use serde_yaml::{Mapping, Value};

const INCLUDED_RESOURCES: &str = "IncludedResources";
const RESOURCES: &str = "Resources";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Failed to parse template {0}: {1}")]
    Parse(String, String),

    #[error("Failed to serialize template: {0}")]
    Serialize(String),

    #[error("IncludedResources item \"{0}\" must have a mapping value (use {{}} for empty)")]
    InvalidInclude(String),

    #[error("IncludedResources pattern \"{0}\" is not a valid regular expression: {1}")]
    InvalidPattern(String, String),

    #[error("Template section \"{0}\" must be a mapping")]
    InvalidSection(&'static str),

    #[error("The following IncludedResources did not match a resource in any included template: {0}")]
    Unmatched(String),

    #[error("I/O error on {0}: {1}")]
    Io(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn detect(contents: &str) -> Self {
        if contents.trim_start().starts_with('{') {
            return TemplateFormat::Json;
        }
        return TemplateFormat::Yaml;
    }
}

pub fn load(name: &str, contents: &str) -> Result<(Value, TemplateFormat), Error> {
    let value: Value = serde_yaml::from_str(contents)
        .map_err(|error| Error::Parse(name.to_string(), error.to_string()))?;
    return Ok((value, TemplateFormat::detect(contents)));
}

pub fn dump(value: &Value, format: TemplateFormat) -> Result<String, Error> {
    return match format {
        TemplateFormat::Json => serde_json::to_string_pretty(value)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|error| Error::Serialize(error.to_string())),
        TemplateFormat::Yaml => {
            serde_yaml::to_string(value).map_err(|error| Error::Serialize(error.to_string()))
        }
    };
}

/// Recursively overlays `overlay` onto `base`. Nested mappings merge, every
/// other value from `overlay` replaces what `base` had.
pub fn deep_merge(base: Value, overlay: &Value) -> Value {
    let overlay = match overlay {
        Value::Mapping(mapping) => mapping,
        other => return other.clone(),
    };

    let mut merged = match base {
        Value::Mapping(mapping) => mapping,
        _ => Mapping::new(),
    };
    for (key, value) in overlay {
        let next = match value {
            Value::Mapping(_) => deep_merge(merged.get(key).cloned().unwrap_or(Value::Null), value),
            _ => value.clone(),
        };
        merged.insert(key.clone(), next);
    }

    return Value::Mapping(merged);
}

fn section_mut<'a>(
    template: &'a mut Mapping,
    key: &'static str,
) -> Result<&'a mut Mapping, Error> {
    let section = template
        .entry(Value::from(key))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    return match section {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(Error::InvalidSection(key)),
    };
}

/// Applies one included template. Each pattern consumes the first matching
/// resource, so earlier included templates win.
pub fn apply_includes(template: &Value, included: &Value) -> Result<Value, Error> {
    let mut template = match template {
        Value::Mapping(mapping) => mapping.clone(),
        _ => return Err(Error::InvalidSection("template root")),
    };

    let included_resources = match included.get(RESOURCES) {
        Some(Value::Mapping(mapping)) => mapping.clone(),
        Some(_) => return Err(Error::InvalidSection(RESOURCES)),
        None => Mapping::new(),
    };

    let patterns = section_mut(&mut template, INCLUDED_RESOURCES)?.clone();
    let mut remaining = patterns.clone();
    let mut merged = Vec::new();

    for (pattern, overlay) in &patterns {
        let pattern_text = match pattern.as_str() {
            Some(text) => text,
            None => return Err(Error::InvalidInclude(format!("{:?}", pattern))),
        };
        if !overlay.is_mapping() {
            return Err(Error::InvalidInclude(pattern_text.to_string()));
        }

        let regex = Regex::new(&format!("^(?:{})$", pattern_text))
            .map_err(|error| Error::InvalidPattern(pattern_text.to_string(), error.to_string()))?;

        let matched = included_resources
            .iter()
            .find(|(key, _)| key.as_str().map_or(false, |key| regex.is_match(key)));
        if let Some((key, resource)) = matched {
            tracing::debug!(pattern = pattern_text, resource = ?key, "IncludedResources pattern matched");
            merged.push((key.clone(), deep_merge(resource.clone(), overlay)));
            remaining.remove(pattern);
        }
    }

    *section_mut(&mut template, INCLUDED_RESOURCES)? = remaining;
    let resources = section_mut(&mut template, RESOURCES)?;
    for (key, resource) in merged {
        resources.insert(key, resource);
    }

    return Ok(Value::Mapping(template));
}

/// Applies every included template in order, then requires that all
/// `IncludedResources` patterns were consumed and drops the section.
pub fn include_all(template: &Value, included: &[Value]) -> Result<Value, Error> {
    let mut template = template.clone();
    for included_template in included {
        template = apply_includes(&template, included_template)?;
    }

    let mut mapping = match template {
        Value::Mapping(mapping) => mapping,
        _ => return Err(Error::InvalidSection("template root")),
    };

    if let Some(Value::Mapping(unmatched)) = mapping.remove(INCLUDED_RESOURCES) {
        if !unmatched.is_empty() {
            let names = unmatched
                .iter()
                .map(|(key, _)| key.as_str().unwrap_or("?").to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Unmatched(names));
        }
    }

    return Ok(Value::Mapping(mapping));
}

/// Rewrites the template at `path` with resources pulled in from `included`,
/// keeping its JSON or YAML format.
pub fn apply_to_file(path: &Path, included: &[(String, String)]) -> Result<(), Error> {
    let name = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|error| Error::Io(name.clone(), error.to_string()))?;
    let (template, format) = load(&name, &contents)?;

    let mut included_values = Vec::with_capacity(included.len());
    for (included_name, included_contents) in included {
        tracing::info!(template = %included_name, "including resources");
        let (value, _) = load(included_name, included_contents)?;
        included_values.push(value);
    }

    let merged = include_all(&template, &included_values)?;
    let output = dump(&merged, format)?;
    tracing::debug!(template = %name, "template after includes applied:\n{}", output);

    fs::write(path, output).map_err(|error| Error::Io(name, error.to_string()))?;
    return Ok(());
}
