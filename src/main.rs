use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod aws;
pub mod config;
pub mod error;
pub mod parameters;
pub mod pipeline;
pub mod render;
pub mod stack;
pub mod staging;
pub mod storage;
pub mod template;

use pipeline::RunOptions;
use stack::{Action, Outcome};

#[derive(Parser)]
#[command(name = "cfn-stack", version)]
#[command(about = "Create and update CloudFormation stacks from a YAML stack config", long_about = None)]
struct Cli {
    /// Log debug output, including the processed template
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new stack
    CreateStack(StackArgs),

    /// Update an existing stack
    UpdateStack(StackArgs),

    /// Create the stack if it does not exist yet, update it otherwise
    Deploy(StackArgs),
}

#[derive(Args)]
struct StackArgs {
    /// Path to the stack config YAML file
    config: PathBuf,

    /// Include this file, directory or glob as an extra
    #[arg(short = 'e', long = "extra")]
    extras: Vec<String>,

    /// Include this file, directory or glob as a Jinja extra
    #[arg(short = 'j', long = "jinja-extra")]
    jinja_extras: Vec<String>,

    /// Template to pull IncludedResources from (repeatable, first match wins)
    #[arg(short = 'i', long = "include-template")]
    include_templates: Vec<PathBuf>,

    /// Extra main template context value (KEY=VALUE)
    #[arg(long = "var", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,

    /// Wait until the stack operation finishes
    #[arg(long)]
    wait: bool,

    /// Treat an update without changes as success
    #[arg(long)]
    ignore_empty_updates: bool,

    /// Create a change set to review in the console instead of applying it
    #[arg(long)]
    change_set: bool,

    /// IAM role CloudFormation assumes for the operation
    #[arg(long)]
    role_arn: Option<String>,

    /// AWS named profile
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,
}

const DEFAULT_LOG_FILTER: &str = "warn,cfn_stack=info";
const VERBOSE_LOG_DIRECTIVE: &str = "cfn_stack=debug";

/// `RUST_LOG` replaces the default filter; `--verbose` applies on top of either.
fn log_filter(rust_log: Option<&str>, verbose: bool) -> String {
    let base = match rust_log {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ => DEFAULT_LOG_FILTER,
    };
    if verbose {
        return format!("{},{}", base, VERBOSE_LOG_DIRECTIVE);
    }
    return base.to_string();
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    return match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    };
}

/// Command line extras are relative to the working directory, not to the
/// stack config.
fn from_working_dir(cwd: &Path, pattern: String) -> String {
    if Path::new(&pattern).is_absolute() {
        return pattern;
    }
    let escaped = glob::Pattern::escape(&cwd.to_string_lossy());
    return format!("{}/{}", escaped.trim_end_matches('/'), pattern);
}

impl StackArgs {
    fn into_options(self, action: Action, cwd: &Path) -> RunOptions {
        let mut options = RunOptions::new(self.config, action);
        options.extras = self
            .extras
            .into_iter()
            .map(|pattern| from_working_dir(cwd, pattern))
            .collect();
        options.jinja_extras = self
            .jinja_extras
            .into_iter()
            .map(|pattern| from_working_dir(cwd, pattern))
            .collect();
        options.include_templates = self.include_templates;
        options.vars = self.vars;
        options.wait = self.wait;
        options.ignore_empty_updates = self.ignore_empty_updates;
        options.change_set = self.change_set;
        options.role_arn = self.role_arn;
        options.profile = self.profile;
        return options;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_filter(rust_log.as_deref(), cli.verbose)))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false),
        )
        .init();

    let (action, args) = match cli.command {
        Commands::CreateStack(args) => (Action::Create, args),
        Commands::UpdateStack(args) => (Action::Update, args),
        Commands::Deploy(args) => (Action::CreateOrUpdate, args),
    };

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(error) => {
            tracing::error!("ERROR: cannot read the working directory: {}", error);
            return ExitCode::FAILURE;
        }
    };
    let options = args.into_options(action, &cwd);

    return match pipeline::run(&options).await {
        Ok(Outcome::Created(stack_id)) => {
            tracing::info!(%stack_id, "stack creation started");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Updated(stack_id)) => {
            tracing::info!(%stack_id, "stack update started");
            ExitCode::SUCCESS
        }
        Ok(Outcome::ChangeSetCreated(console_url)) => {
            tracing::info!("change set ready for review");
            println!("{}", console_url);
            ExitCode::SUCCESS
        }
        Ok(Outcome::Unchanged) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("ERROR: {}", error);
            ExitCode::from(error.exit_code())
        }
    };
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use clap::Parser;

    use super::{from_working_dir, log_filter, parse_key_value, Cli, Commands};
    use crate::stack::Action;

    #[test]
    fn key_value_pairs() {
        assert_eq!(
            parse_key_value("env=prod=1"),
            Ok((String::from("env"), String::from("prod=1")))
        );
        assert!(parse_key_value("=x").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn verbose_applies_on_top_of_rust_log() {
        assert_eq!(log_filter(None, false), "warn,cfn_stack=info");
        assert_eq!(log_filter(None, true), "warn,cfn_stack=info,cfn_stack=debug");
        assert_eq!(log_filter(Some("aws_config=trace"), false), "aws_config=trace");
        assert_eq!(
            log_filter(Some("aws_config=trace"), true),
            "aws_config=trace,cfn_stack=debug"
        );
        assert_eq!(log_filter(Some(" "), false), "warn,cfn_stack=info");
    }

    #[test]
    fn relative_command_line_extras_use_the_working_directory() {
        assert_eq!(
            from_working_dir(Path::new("/work"), String::from("dist/*.zip")),
            "/work/dist/*.zip"
        );
        assert_eq!(
            from_working_dir(Path::new("/work"), String::from("/abs/file")),
            "/abs/file"
        );
    }

    #[test]
    fn parses_subcommands_and_options() {
        let cli = Cli::parse_from([
            "cfn-stack",
            "deploy",
            "stack.yaml",
            "-e",
            "dist/a.zip",
            "--jinja-extra",
            "conf",
            "--var",
            "env=prod",
            "--wait",
            "--role-arn",
            "arn:aws:iam::1:role/deploy",
            "--change-set",
        ]);

        let args = match cli.command {
            Commands::Deploy(args) => args,
            _ => panic!("Expected `deploy` subcommand"),
        };
        let options = args.into_options(Action::CreateOrUpdate, Path::new("/work"));

        assert_eq!(options.config_path, PathBuf::from("stack.yaml"));
        assert_eq!(options.extras, vec![String::from("/work/dist/a.zip")]);
        assert_eq!(options.jinja_extras, vec![String::from("/work/conf")]);
        assert_eq!(options.vars, vec![(String::from("env"), String::from("prod"))]);
        assert!(options.wait);
        assert!(!options.ignore_empty_updates);
        assert!(options.change_set);
        assert_eq!(options.role_arn.as_deref(), Some("arn:aws:iam::1:role/deploy"));
    }
}
