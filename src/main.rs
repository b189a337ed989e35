//! Keel CLI entrypoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use keel_deploy::cli::{BackendKind, Cli, Commands, LogFormat, OutputFormatter, ReleaseCommands};
use keel_deploy::config::{find_workspace_file, ConfigParser, ConfigValidator, Extension, Workspace};
use keel_deploy::error::{ConfigError, Result};
use keel_deploy::generator::{GenerationContext, Pipeline, SpecFileGenerator};
use keel_deploy::release::{ReleaseKey, ReleaseManager};
use keel_deploy::resource::ResourceGraph;
use keel_deploy::runtime::RuntimeRegistry;
use keel_deploy::secrets::{FakeSecretStoreFactory, SecretResolver, SecretStoreRegistry};
use keel_deploy::state::{LocalReleaseStore, ReleaseStore, S3ReleaseStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(&cli, &formatter)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", formatter.error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins unless `--verbose` is given.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: &Cli, formatter: &OutputFormatter) -> Result<()> {
    match &cli.command {
        Commands::Validate { warnings, extensions } => {
            cmd_validate(cli, *warnings, extensions.as_deref(), formatter)
        }
        Commands::Graph { spec, destroy } => cmd_graph(spec, *destroy, formatter),
        Commands::Preview {
            spec,
            extensions,
            detailed,
        } => cmd_preview(cli, spec, extensions.as_deref(), *detailed, formatter).await,
        Commands::Release { command } => match command {
            ReleaseCommands::List => cmd_release_list(cli, formatter).await,
            ReleaseCommands::Show { revision } => cmd_release_show(cli, *revision, formatter).await,
        },
    }
}

/// Validate the workspace and, optionally, project extensions.
fn cmd_validate(
    cli: &Cli,
    show_warnings: bool,
    extensions: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let path = resolve_workspace_path(cli.workspace_file.as_ref())?;
    info!("Validating workspace: {}", path.display());

    let parser = parser_for(&path);
    parser.load_dotenv()?;
    let workspace = parser.load_with_env(&path)?;

    let validator = ConfigValidator::new();
    let mut result = validator.check(&workspace);
    if let Some(extensions) = extensions {
        let extensions = parser.load_extensions(extensions)?;
        let extension_result = validator.validate_extensions(&extensions)?;
        result.warnings.extend(extension_result.warnings);
    }

    eprintln!("{}", formatter.format_validation(&result, show_warnings));
    eprintln!("  Workspace: {}", workspace_name(cli, &workspace));
    eprintln!("  Modules:   {}", workspace.modules.len());

    match result.errors.first() {
        Some(first) => Err(ConfigError::validation(first.message.clone(), first.field.clone()).into()),
        None => Ok(()),
    }
}

/// Print the apply or destroy order of a spec file.
fn cmd_graph(spec: &Path, destroy: bool, formatter: &OutputFormatter) -> Result<()> {
    let spec = ConfigParser::new().load_spec(spec)?;
    let graph = ResourceGraph::build(&spec.resources)?;
    debug!("Built graph with {} resources", graph.len());

    eprintln!("{}", formatter.format_graph(&graph, destroy));
    Ok(())
}

/// Generate a spec, plan it against the last release, and record a preview release.
async fn cmd_preview(
    cli: &Cli,
    spec: &Path,
    extensions: Option<&Path>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = load_workspace(cli)?;
    let validator = ConfigValidator::new();
    for warning in validator.validate(&workspace)?.warnings {
        warn!("{warning}");
    }

    let extensions: Vec<Extension> = match extensions {
        Some(path) => {
            let extensions = ConfigParser::new().load_extensions(path)?;
            validator.validate_extensions(&extensions)?;
            extensions
        }
        None => Vec::new(),
    };

    let pipeline = Pipeline::new()
        .with_generator(SpecFileGenerator::new(spec))
        .with_extensions(&extensions)?
        .with_workspace_patchers(&workspace);

    let mut registry = SecretStoreRegistry::new();
    let (kind, factory) = FakeSecretStoreFactory::shared();
    registry.register(kind, factory);
    let resolver = SecretResolver::new(registry);

    let key = release_key(cli, &workspace)?;
    let ctx = GenerationContext::new(&key.project, &key.stack, &workspace, &resolver);

    let store = open_store(cli).await?;
    let runtimes = RuntimeRegistry::new();
    let manager = ReleaseManager::new(&store, &runtimes);

    let outcome = manager.preview(&key, &pipeline, &ctx, false).await?;

    eprintln!("{}", formatter.format_plan(&outcome.plan, detailed));
    eprintln!(
        "{}",
        formatter.success(&format!(
            "Recorded preview release {} for {key}",
            outcome.release.revision
        ))
    );
    Ok(())
}

/// List the release history of the stack.
async fn cmd_release_list(cli: &Cli, formatter: &OutputFormatter) -> Result<()> {
    let workspace = load_workspace(cli)?;
    let key = release_key(cli, &workspace)?;
    let store = open_store(cli).await?;

    let mut releases = Vec::new();
    for revision in store.list_revisions(&key).await? {
        releases.push(store.get_release(&key, revision).await?);
    }

    eprintln!("{}", formatter.format_release_list(&releases));
    Ok(())
}

/// Show one release, or the latest one.
async fn cmd_release_show(cli: &Cli, revision: Option<u64>, formatter: &OutputFormatter) -> Result<()> {
    let workspace = load_workspace(cli)?;
    let key = release_key(cli, &workspace)?;
    let store = open_store(cli).await?;

    let release = match revision {
        Some(revision) => Some(store.get_release(&key, revision).await?),
        None => store.get_latest_release(&key).await?,
    };

    match release {
        Some(release) => eprintln!("{}", formatter.format_release(&release)),
        None => eprintln!("{}", formatter.warning(&format!("No releases found for {key}"))),
    }
    Ok(())
}

/// Resolves the workspace file path.
fn resolve_workspace_path(workspace_file: Option<&PathBuf>) -> Result<PathBuf> {
    match workspace_file {
        Some(path) => Ok(path.clone()),
        None => find_workspace_file(std::env::current_dir()?),
    }
}

fn parser_for(path: &Path) -> ConfigParser {
    ConfigParser::new().with_base_path(path.parent().unwrap_or_else(|| Path::new(".")))
}

/// Loads the workspace, falling back to an empty one when no file exists.
fn load_workspace(cli: &Cli) -> Result<Workspace> {
    let path = match resolve_workspace_path(cli.workspace_file.as_ref()) {
        Ok(path) => path,
        Err(e) if cli.workspace_file.is_none() => {
            debug!("No workspace file found: {e}");
            let mut workspace = Workspace::default();
            ConfigParser::apply_env_overrides(&mut workspace);
            return Ok(workspace);
        }
        Err(e) => return Err(e),
    };

    let parser = parser_for(&path);
    parser.load_dotenv()?;
    parser.load_with_env(&path)
}

fn workspace_name(cli: &Cli, workspace: &Workspace) -> String {
    cli.workspace
        .clone()
        .filter(|name| !name.is_empty())
        .or_else(|| Some(workspace.name.clone()).filter(|name| !name.is_empty()))
        .unwrap_or_else(|| String::from("default"))
}

/// Builds the release key from flags, the workspace, and the current directory.
fn release_key(cli: &Cli, workspace: &Workspace) -> Result<ReleaseKey> {
    let project = match &cli.project {
        Some(project) => project.clone(),
        None => std::env::current_dir()?
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| ConfigError::validation("Cannot infer a project name; pass --project", "project"))?,
    };

    let key = ReleaseKey::new(project, workspace_name(cli, workspace), cli.stack.clone());
    key.validate()?;
    Ok(key)
}

/// Opens the configured release store.
async fn open_store(cli: &Cli) -> Result<Box<dyn ReleaseStore>> {
    match cli.backend {
        BackendKind::Local => {
            let store = match &cli.state_path {
                Some(path) => LocalReleaseStore::with_base_dir(path),
                None => LocalReleaseStore::new()?,
            };
            info!("Using local release store at {}", store.base_dir().display());
            Ok(Box::new(store))
        }
        BackendKind::S3 => {
            let bucket = cli.bucket.as_deref().ok_or_else(|| ConfigError::MissingEnvVar {
                name: String::from("KEEL_S3_BUCKET"),
            })?;
            info!("Using s3 release store in bucket {bucket}");
            let store = S3ReleaseStore::new(bucket, cli.prefix.as_deref(), cli.region.as_deref()).await?;
            Ok(Box::new(store))
        }
    }
}
