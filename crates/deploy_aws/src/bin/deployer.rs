use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use deploy_aws::AwsCloud;
use deploy_core::config::DeployConfig;
use deploy_core::error::DeployError;
use deploy_core::handler::DeploymentManifest;
use deploy_engine::artifacts::FsArtifacts;
use deploy_engine::cleanup::{cleanup, status, CleanupPolicy, CleanupScope};
use deploy_engine::orchestrator::deploy_project;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "deployer",
    about = "Deploy, inspect, and clean up declared handlers on AWS",
    long_about = "Reconciles a deployment manifest against AWS: creates or updates\n\
                  each handler's resources, reports tag inventory, and deletes\n\
                  owned resources by handler, orphan status, or stage."
)]
struct Cli {
    /// AWS region; the manifest's region wins when it names one
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every handler in a manifest
    Deploy {
        /// Path to the manifest JSON
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Delete owned resources
    Cleanup {
        /// Path to the manifest JSON
        #[arg(long)]
        manifest: PathBuf,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Print the plan without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Per-handler inventory of a project stage
    Status {
        #[arg(long)]
        project: String,
        #[arg(long)]
        stage: String,
        /// Manifest whose handlers count as declared; without one every
        /// handler is reported as orphaned
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ScopeArgs {
    /// Only resources tagged with this handler
    #[arg(long)]
    handler: Option<String>,
    /// Resources of handlers no longer in the manifest
    #[arg(long)]
    orphaned: bool,
    /// Everything tagged with the project and stage
    #[arg(long)]
    all: bool,
}

impl ScopeArgs {
    fn scope(&self, manifest: &DeploymentManifest) -> CleanupScope {
        match &self.handler {
            Some(handler) => CleanupScope::Handler(handler.clone()),
            None if self.orphaned => CleanupScope::Orphaned {
                declared: manifest.handler_names(),
            },
            None => CleanupScope::All,
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────

const EXIT_FAILED: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("DEPLOY_LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => {}
        Ok(false) => exit(EXIT_FAILED),
        Err(err) => {
            error!(error = %err, "deployer failed");
            exit(EXIT_ERROR);
        }
    }
}

/// Returns whether the command fully succeeded.
async fn run(cli: Cli) -> Result<bool, DeployError> {
    let config = DeployConfig::from_env()?;
    match cli.command {
        Commands::Deploy { manifest } => {
            let (manifest, base_dir) = load_manifest(&manifest)?;
            let provider = connect(&manifest, cli.region).await?;
            let artifacts = Arc::new(FsArtifacts::new(Some(base_dir)));
            let summary = deploy_project(provider, config, &manifest, artifacts).await?;
            info!(
                project = %summary.project,
                stage = %summary.stage,
                failures = summary.failures.len(),
                elapsed_ms = summary.elapsed_ms,
                "deployment finished"
            );
            print_json(&summary)?;
            Ok(summary.is_success())
        }
        Commands::Cleanup {
            manifest,
            scope,
            dry_run,
        } => {
            let (manifest, _) = load_manifest(&manifest)?;
            let provider = connect(&manifest, cli.region).await?;
            let report = cleanup(
                &provider,
                CleanupPolicy::from_config(&config),
                &manifest.project,
                &manifest.stage,
                &scope.scope(&manifest),
                dry_run,
            )
            .await?;
            print_json(&report)?;
            Ok(report.is_success())
        }
        Commands::Status {
            project,
            stage,
            manifest,
        } => {
            let (declared, region) = match manifest {
                Some(path) => {
                    let (manifest, _) = load_manifest(&path)?;
                    (manifest.handler_names(), manifest.region.or(cli.region))
                }
                None => (Vec::new(), cli.region),
            };
            let provider = AwsCloud::load(region).await?.into_provider();
            let inventory = status(&provider, &project, &stage, &declared).await?;
            print_json(&inventory)?;
            Ok(true)
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Parsed manifest plus the directory relative paths in it resolve against.
fn load_manifest(path: &Path) -> Result<(DeploymentManifest, PathBuf), DeployError> {
    let raw = fs::read_to_string(path).map_err(|source| DeployError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut manifest = DeploymentManifest::from_json(&raw)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if let Some(project_dir) = manifest.project_dir.take() {
        manifest.project_dir = Some(if project_dir.is_relative() {
            base_dir.join(project_dir)
        } else {
            project_dir
        });
    }
    Ok((manifest, base_dir))
}

async fn connect(
    manifest: &DeploymentManifest,
    region: Option<String>,
) -> Result<deploy_engine::ports::Provider, DeployError> {
    let region = manifest.region.clone().or(region);
    Ok(AwsCloud::load(region).await?.into_provider())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), DeployError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| DeployError::Manifest(format!("rendering output failed: {err}")))?;
    println!("{rendered}");
    Ok(())
}
