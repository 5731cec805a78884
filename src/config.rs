use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};
use validator::{Validate, ValidationError};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Stack config file {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Stack config is missing the required top-level key \"{0}\"")]
    MissingKey(&'static str),

    #[error("Referenced template file {0} does not exist")]
    TemplateNotFound(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// Stack config as it appears on disk. Required keys stay optional here so
/// that a missing key is reported by name rather than by serde.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct RawStackConfig {
    #[validate(custom = "not_blank")]
    pub region: Option<String>,

    #[validate(custom = "not_blank")]
    pub bucket: Option<String>,

    #[validate(custom = "not_blank")]
    pub name: Option<String>,

    pub template: Option<PathBuf>,

    #[serde(default)]
    pub jinja: bool,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub extras: Vec<String>,

    #[serde(default)]
    pub jinja_extras: Vec<String>,

    #[serde(default)]
    pub jinja_extras_context: BTreeMap<String, serde_yaml::Value>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    return Ok(());
}

/// A loaded and validated stack config.
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfig {
    pub region: String,
    pub bucket: String,
    pub name: String,

    /// Template path, already joined onto the config file's directory.
    pub template: PathBuf,

    pub jinja: bool,
    pub tags: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, serde_yaml::Value>,
    pub extras: Vec<String>,
    pub jinja_extras: Vec<String>,
    pub jinja_extras_context: BTreeMap<String, serde_yaml::Value>,

    /// Directory holding the config file. Relative extras are expanded from here.
    pub config_dir: PathBuf,
}

pub fn parse(path: &Path) -> Result<StackConfig, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let raw: RawStackConfig = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    if let Err(error) = raw.validate() {
        return Err(Error::ValidationError(error.to_string()));
    }

    let config_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    return from_raw(raw, config_dir);
}

fn from_raw(raw: RawStackConfig, config_dir: PathBuf) -> Result<StackConfig, Error> {
    let region = raw.region.ok_or(Error::MissingKey("Region"))?;
    let bucket = raw.bucket.ok_or(Error::MissingKey("Bucket"))?;
    let name = raw.name.ok_or(Error::MissingKey("Name"))?;
    let template = raw.template.ok_or(Error::MissingKey("Template"))?;

    let template = config_dir.join(template);
    if !template.is_file() {
        return Err(Error::TemplateNotFound(template.display().to_string()));
    }

    return Ok(StackConfig {
        region,
        bucket,
        name,
        template,
        jinja: raw.jinja,
        tags: raw.tags,
        parameters: raw.parameters,
        extras: raw.extras,
        jinja_extras: raw.jinja_extras,
        jinja_extras_context: raw.jinja_extras_context,
        config_dir,
    });
}
