use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Extra \"{0}\" does not exist")]
    ExtraNotFound(String),

    #[error("Invalid glob pattern \"{0}\": {1}")]
    InvalidPattern(String, String),

    #[error("Extra \"{0}\" has no file name to stage it under")]
    UnnamedExtra(String),

    #[error("Extra \"{0}\" would replace the stack template in the staging directory")]
    ConflictsWithTemplate(String),

    #[error("I/O error on {0}: {1}")]
    Io(String, String),
}

impl Error {
    fn io(path: &Path, error: impl std::fmt::Display) -> Self {
        return Error::Io(path.display().to_string(), error.to_string());
    }
}

/// One `Extras` or `JinjaExtras` entry, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Extra {
    pub pattern: String,
    pub render: bool,
}

impl Extra {
    pub fn plain(pattern: impl Into<String>) -> Self {
        return Self {
            pattern: pattern.into(),
            render: false,
        };
    }

    pub fn jinja(pattern: impl Into<String>) -> Self {
        return Self {
            pattern: pattern.into(),
            render: true,
        };
    }
}

/// Temporary tree holding the template and every staged extra. The tree is
/// removed when the value is dropped.
#[derive(Debug)]
pub struct StagingDirectory {
    dir: TempDir,
    template: PathBuf,
    entries: Vec<String>,
    files: BTreeMap<PathBuf, bool>,
}

impl StagingDirectory {
    pub fn create(template_source: &Path) -> Result<Self, Error> {
        let dir = tempfile::Builder::new()
            .prefix("stack_")
            .tempdir()
            .map_err(|error| Error::io(&std::env::temp_dir(), error))?;

        let file_name = template_source
            .file_name()
            .ok_or_else(|| Error::UnnamedExtra(template_source.display().to_string()))?;
        let template = dir.path().join(file_name);
        fs::copy(template_source, &template).map_err(|error| Error::io(template_source, error))?;

        return Ok(Self {
            dir,
            template,
            entries: Vec::new(),
            files: BTreeMap::new(),
        });
    }

    pub fn path(&self) -> &Path {
        return self.dir.path();
    }

    pub fn template_path(&self) -> &Path {
        return &self.template;
    }

    /// Top-level names of staged extras, in the order they first appeared.
    pub fn entries(&self) -> &[String] {
        return &self.entries;
    }

    /// Files, relative to the staging root, whose final copy came from a
    /// `JinjaExtras` entry.
    pub fn jinja_files(&self) -> Vec<PathBuf> {
        return self
            .files
            .iter()
            .filter(|(_, render)| **render)
            .map(|(path, _)| path.clone())
            .collect();
    }

    /// Copies `source` into the staging root under its last path component.
    /// Directories merge recursively with whatever is already staged there,
    /// and later files replace earlier ones.
    pub fn stage(&mut self, source: &Path, render: bool) -> Result<(), Error> {
        let name = match source.file_name() {
            Some(name) => PathBuf::from(name),
            None => return Err(Error::UnnamedExtra(source.display().to_string())),
        };
        if Some(name.as_os_str()) == self.template.file_name() {
            return Err(Error::ConflictsWithTemplate(source.display().to_string()));
        }

        let destination = self.dir.path().join(&name);
        if source.is_dir() {
            if destination.is_file() {
                fs::remove_file(&destination).map_err(|error| Error::io(&destination, error))?;
                self.files.remove(&name);
            }

            for entry in WalkDir::new(source).follow_links(true) {
                let entry = entry.map_err(|error| Error::io(source, error))?;
                let relative = match entry.path().strip_prefix(source) {
                    Ok(relative) => relative,
                    Err(error) => return Err(Error::io(entry.path(), error)),
                };
                let target = destination.join(relative);

                if entry.file_type().is_dir() {
                    if target.is_file() {
                        fs::remove_file(&target).map_err(|error| Error::io(&target, error))?;
                        self.files.remove(&name.join(relative));
                    }
                    fs::create_dir_all(&target).map_err(|error| Error::io(&target, error))?;
                } else {
                    self.copy_file(entry.path(), &target, name.join(relative), render)?;
                }
            }
        } else if source.is_file() {
            self.copy_file(source, &destination, name.clone(), render)?;
        } else {
            return Err(Error::ExtraNotFound(source.display().to_string()));
        }

        let name = name.to_string_lossy().into_owned();
        if !self.entries.contains(&name) {
            self.entries.push(name);
        }

        return Ok(());
    }

    fn copy_file(
        &mut self,
        source: &Path,
        target: &Path,
        relative: PathBuf,
        render: bool,
    ) -> Result<(), Error> {
        if target.is_dir() {
            fs::remove_dir_all(target).map_err(|error| Error::io(target, error))?;
            self.files.retain(|path, _| !path.starts_with(&relative));
        }

        fs::copy(source, target).map_err(|error| Error::io(source, error))?;
        self.files.insert(relative, render);

        return Ok(());
    }
}

/// Expands a path or glob pattern from `root`. Absolute patterns ignore `root`.
/// An existing path is taken literally even when it contains glob characters.
/// Matches come back in lexical order.
pub fn expand(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, Error> {
    let candidate = Path::new(pattern);
    let literal = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    if literal.exists() {
        return Ok(vec![literal]);
    }
    if !pattern.contains(['*', '?', '[']) {
        return Err(Error::ExtraNotFound(literal.display().to_string()));
    }

    let full_pattern = if candidate.is_absolute() || root.as_os_str().is_empty() {
        pattern.to_string()
    } else {
        let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
        format!("{}/{}", escaped_root.trim_end_matches('/'), pattern)
    };

    let paths = glob::glob(&full_pattern)
        .map_err(|error| Error::InvalidPattern(pattern.to_string(), error.to_string()))?;

    let mut matches = Vec::new();
    for path in paths {
        match path {
            Ok(path) => matches.push(path),
            Err(error) => return Err(Error::io(error.path(), error.error())),
        }
    }

    if matches.is_empty() {
        tracing::warn!(
            pattern,
            root = %root.display(),
            "glob pattern matches nothing"
        );
    }

    return Ok(matches);
}

/// Builds the staging directory: the template first, then every extra in
/// declaration order.
pub fn assemble(
    config_dir: &Path,
    template: &Path,
    extras: &[Extra],
) -> Result<StagingDirectory, Error> {
    let mut staging = StagingDirectory::create(template)?;
    tracing::debug!(path = %staging.path().display(), "created staging directory");

    for extra in extras {
        for path in expand(config_dir, &extra.pattern)? {
            tracing::info!(
                extra = %path.display(),
                jinja = extra.render,
                "staging extra"
            );
            staging.stage(&path, extra.render)?;
        }
    }

    return Ok(staging);
}
