use std::fs;
use std::path::PathBuf;

use crate::config::{self, StackConfig};
use crate::error::Error;
use crate::parameters::{self, AwsSecretStore, SecretStore};
use crate::render;
use crate::stack::{self, Action, CloudFormation, DeployOptions, Outcome, StackApi, StackRequest, WaitConfig};
use crate::staging::{self, Extra, StagingDirectory};
use crate::storage::{self, ArtifactStore, S3ArtifactStore};
use crate::template;

/// Everything the command line contributes on top of the stack config.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub action: Action,
    pub extras: Vec<String>,
    pub jinja_extras: Vec<String>,
    pub include_templates: Vec<PathBuf>,
    pub vars: Vec<(String, String)>,
    pub wait: bool,
    pub ignore_empty_updates: bool,
    pub change_set: bool,
    pub role_arn: Option<String>,
    pub profile: Option<String>,
}

impl RunOptions {
    pub fn new(config_path: PathBuf, action: Action) -> Self {
        return Self {
            config_path,
            action,
            extras: Vec::new(),
            jinja_extras: Vec::new(),
            include_templates: Vec::new(),
            vars: Vec::new(),
            wait: false,
            ignore_empty_updates: false,
            change_set: false,
            role_arn: None,
            profile: None,
        };
    }
}

pub async fn run(options: &RunOptions) -> Result<Outcome, Error> {
    let config = config::parse(&options.config_path)?;
    tracing::info!(
        stack = %config.name,
        region = %config.region,
        bucket = %config.bucket,
        "loaded stack config"
    );

    let sdk_config = crate::aws::load_sdk_config(&config.region, options.profile.as_deref()).await;
    let secrets = AwsSecretStore::new(&sdk_config);
    let store = S3ArtifactStore::new(&sdk_config, &config.bucket);
    let stacks = CloudFormation::new(&sdk_config);

    return execute(&config, options, &secrets, &store, &stacks).await;
}

/// Runs every stage after config loading against the given services.
pub async fn execute<S, U, A>(
    config: &StackConfig,
    options: &RunOptions,
    secrets: &S,
    store: &U,
    stacks: &A,
) -> Result<Outcome, Error>
where
    S: SecretStore + ?Sized,
    U: ArtifactStore + ?Sized,
    A: StackApi + ?Sized,
{
    let parameters = parameters::resolve(&config.parameters, secrets).await?;
    tracing::info!(count = parameters.len(), "resolved parameters");

    let staging = prepare(config, options)?;

    let template_key = storage::upload_staging(store, &staging, &config.name).await?;
    let template_url = storage::template_url(&config.region, &config.bucket, &template_key);
    drop(staging);

    let request = StackRequest {
        stack_name: config.name.clone(),
        template_url,
        parameters,
        tags: config.tags.clone(),
        role_arn: options.role_arn.clone(),
    };
    let deploy_options = DeployOptions {
        action: options.action,
        wait: options.wait.then(WaitConfig::default),
        ignore_empty_updates: options.ignore_empty_updates,
        change_set: options.change_set,
        region: config.region.clone(),
    };

    let outcome = stack::deploy(stacks, &request, &deploy_options).await?;
    return Ok(outcome);
}

/// Stages the template and extras, then applies Jinja and includes in place.
pub fn prepare(config: &StackConfig, options: &RunOptions) -> Result<StagingDirectory, Error> {
    let extras = config
        .extras
        .iter()
        .chain(options.extras.iter())
        .map(|pattern| Extra::plain(pattern.as_str()))
        .chain(
            config
                .jinja_extras
                .iter()
                .chain(options.jinja_extras.iter())
                .map(|pattern| Extra::jinja(pattern.as_str())),
        )
        .collect::<Vec<_>>();

    let staging = staging::assemble(&config.config_dir, &config.template, &extras)?;

    let main_context = render::main_template_context(&options.vars);
    if config.jinja {
        render::render_main_template(&config.template, &staging, &main_context)?;
    }
    render::render_jinja_extras(&staging, &config.jinja_extras_context)?;

    if !options.include_templates.is_empty() {
        let mut included = Vec::with_capacity(options.include_templates.len());
        for path in &options.include_templates {
            let contents = if config.jinja {
                render::render_file(path, &main_context)?
            } else {
                fs::read_to_string(path)
                    .map_err(|error| Error::Io(format!("{}: {}", path.display(), error)))?
            };
            included.push((path.display().to_string(), contents));
        }
        template::apply_to_file(staging.template_path(), &included)?;
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        let contents = fs::read_to_string(staging.template_path()).unwrap_or_default();
        tracing::debug!("stack template after processing:\n{}", contents);
    }

    return Ok(staging);
}
