use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::{fs, io};

use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use rand::Rng;
use serde_yaml::Value;

use crate::staging::StagingDirectory;

const DEPLOY_STAMP_LEN: usize = 6;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub type Context = BTreeMap<String, Value>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Failed to render {0}: {1}")]
    Template(String, String),

    #[error("I/O error on {0}: {1}")]
    Io(String, String),
}

/// Resolves a `/`-separated template name under `root`. Names that climb out
/// with `..` are not found; dotfiles and dot-directories load normally.
fn load_template(root: &Path, name: &str) -> Result<Option<String>, minijinja::Error> {
    let mut path = root.to_path_buf();
    for segment in name.split('/') {
        match segment {
            ".." => return Ok(None),
            "" | "." => continue,
            _ => path.push(segment),
        }
    }

    return match fs::read_to_string(&path) {
        Ok(source) => Ok(Some(source)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot load {}: {}", path.display(), error),
        )),
    };
}

fn environment(root: &Path) -> Environment<'static> {
    let root = root.to_path_buf();
    let mut env = Environment::new();
    env.set_loader(move |name| load_template(&root, name));
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    return env;
}

/// Loader names are `/`-separated regardless of platform.
fn template_name(relative: &Path) -> String {
    return relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
}

/// Renders `path` as the template `name`. Only `include`/`import` go through
/// the loader.
fn render_path(
    env: &Environment,
    name: &str,
    path: &Path,
    context: &Context,
) -> Result<String, Error> {
    let source = fs::read_to_string(path)
        .map_err(|error| Error::Io(path.display().to_string(), error.to_string()))?;

    return env
        .render_named_str(name, &source, context)
        .map_err(|error| Error::Template(name.to_string(), error.to_string()));
}

/// A short string of ASCII letters, fresh for every deployment.
pub fn deploy_stamp() -> String {
    let mut rng = rand::thread_rng();
    return (0..DEPLOY_STAMP_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect();
}

/// Context for the main template: `deploy_stamp` plus caller-supplied values,
/// which may override it.
pub fn main_template_context(vars: &[(String, String)]) -> Context {
    let mut context = Context::new();
    context.insert(String::from("deploy_stamp"), Value::from(deploy_stamp()));
    for (key, value) in vars {
        context.insert(key.clone(), Value::from(value.as_str()));
    }
    return context;
}

/// Renders a template file from its own directory, so `include` and
/// `import` resolve against its siblings.
pub fn render_file(path: &Path, context: &Context) -> Result<String, Error> {
    let root = path.parent().unwrap_or_else(|| Path::new(""));
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            return Err(Error::Io(
                path.display().to_string(),
                String::from("not a file"),
            ))
        }
    };

    return render_path(&environment(root), &name, path, context);
}

/// Renders the source template into its staged copy.
pub fn render_main_template(
    source: &Path,
    staging: &StagingDirectory,
    context: &Context,
) -> Result<(), Error> {
    tracing::info!(template = %source.display(), "processing main template with Jinja");
    let output = render_file(source, context)?;

    let staged = staging.template_path();
    fs::write(staged, output)
        .map_err(|error| Error::Io(staged.display().to_string(), error.to_string()))?;

    return Ok(());
}

/// Renders every staged `JinjaExtras` file in place. Templates load from the
/// staging root, so extras can include one another.
pub fn render_jinja_extras(staging: &StagingDirectory, context: &Context) -> Result<(), Error> {
    let env = environment(staging.path());

    for relative in staging.jinja_files() {
        let name = template_name(&relative);
        tracing::info!(extra = %name, "processing Jinja extra");

        let target = staging.path().join(&relative);
        let output = render_path(&env, &name, &target, context)?;
        fs::write(&target, output)
            .map_err(|error| Error::Io(target.display().to_string(), error.to_string()))?;
    }

    return Ok(());
}
