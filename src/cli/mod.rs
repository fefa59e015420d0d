//! # Command Line Interface
//!
//! Subcommands for rendering variables (remotely or locally), driving runs,
//! approving or discarding pending runs, and reconciling workspace settings.

use crate::config::{RemoteSettings, StoreSettings, SyncSpec, VariableSource};
use crate::providers::{CipherEngineType, CipherResolver, HttpSecretStore, SecretStore};
use crate::reconcile::{local, variables, workspace};
use crate::remote::RemoteClient;
use crate::resolver::Resolver;
use crate::run::{RunOptions, RunOrchestrator, RunOutcome};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_RUN_MESSAGE: &str = "triggered by driftsync";

#[derive(Parser)]
#[command(name = "driftsync")]
#[command(about = "Sync secrets and variables into a remote workspace and drive its runs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the sync specification file
    #[arg(short = 'c', long, global = true, default_value = "driftsync.toml")]
    pub config: PathBuf,

    /// Directory holding the configuration to upload or render into
    #[arg(short = 'd', long, global = true, default_value = ".")]
    pub directory: PathBuf,

    /// Log level for driftsync output
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as newline-delimited JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve configured variables and write them to a sink
    Render {
        /// Sink to render into
        #[arg(long, value_enum, default_value_t = RenderTarget::Remote)]
        on: RenderTarget,

        /// Log intended mutations without performing them
        #[arg(long)]
        dry_run: bool,

        /// Refresh every variable, ignoring live TTL entries
        #[arg(long)]
        force_update: bool,
    },

    /// Render variables, then create a run and drive it to completion
    Run {
        /// Approve the plan without prompting when it has changes
        #[arg(long, conflicts_with = "auto_discard")]
        auto_approve: bool,

        /// Discard the plan without prompting when it has changes
        #[arg(long)]
        auto_discard: bool,

        /// Never prompt; leave the run pending if no auto decision applies
        #[arg(long)]
        no_prompt: bool,

        /// Message attached to the run
        #[arg(long)]
        message: Option<String>,

        /// Fail if the plan has not finished within this many seconds (0 disables)
        #[arg(long, default_value_t = 0)]
        start_timeout: u64,

        /// Write the created run id to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip the variable render that normally precedes the run
        #[arg(long)]
        skip_render: bool,
    },

    /// Approve a pending run and follow its apply
    Approve {
        run_id: String,

        #[arg(long)]
        message: Option<String>,
    },

    /// Discard a pending run
    Discard {
        run_id: String,

        #[arg(long)]
        message: Option<String>,
    },

    /// Workspace management commands
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },

    /// Resolve every configured variable without writing to any sink
    Validate,
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Reconcile workspace settings with the spec
    Configure {
        #[arg(long)]
        dry_run: bool,
    },

    /// Show whether the workspace is locked by a run or idle
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderTarget {
    /// Sync variables into the remote workspace
    Remote,
    /// Write variables to local dotfiles
    Local,
    /// Resolve nothing and exit successfully
    Disabled,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    crate::observability::init_tracing(&cli.log_level, cli.log_json);

    let spec = SyncSpec::from_file(&cli.config)
        .with_context(|| format!("loading spec from {}", cli.config.display()))?;

    match cli.command {
        Commands::Render { on, dry_run, force_update } => {
            render(&cli.directory, &spec, on, dry_run, force_update).await
        }
        Commands::Run {
            auto_approve,
            auto_discard,
            no_prompt,
            message,
            start_timeout,
            output,
            skip_render,
        } => {
            if !skip_render {
                render(&cli.directory, &spec, RenderTarget::Remote, false, false).await?;
            }

            let client = remote_client(&spec)?;
            let workspace = workspace::reconcile(&client, &spec.remote, false).await?;

            let options = RunOptions {
                message: message.unwrap_or_else(|| DEFAULT_RUN_MESSAGE.to_string()),
                auto_approve,
                auto_discard,
                no_prompt,
                start_timeout: match start_timeout {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                },
                output_path: output,
            };

            let orchestrator = RunOrchestrator::new(client);
            let outcome = orchestrator
                .create_run(&workspace, &cli.directory, &options, &mut std::io::stdout())
                .await?;

            match outcome {
                RunOutcome::NoChanges { run_id } => {
                    info!(run_id = %run_id, "run finished, no changes")
                }
                RunOutcome::Applied { run_id } => info!(run_id = %run_id, "run applied"),
                RunOutcome::Discarded { run_id } => info!(run_id = %run_id, "run discarded"),
                RunOutcome::Pending { run_id } => {
                    info!(run_id = %run_id, "run left pending approval");
                    println!("{}", run_id);
                }
            }
            Ok(())
        }
        Commands::Approve { run_id, message } => {
            let orchestrator = RunOrchestrator::new(remote_client(&spec)?);
            orchestrator
                .approve_run(
                    &run_id,
                    message.as_deref().unwrap_or(DEFAULT_RUN_MESSAGE),
                    &mut std::io::stdout(),
                )
                .await?;
            Ok(())
        }
        Commands::Discard { run_id, message } => {
            let orchestrator = RunOrchestrator::new(remote_client(&spec)?);
            orchestrator
                .discard_run(&run_id, message.as_deref().unwrap_or(DEFAULT_RUN_MESSAGE))
                .await?;
            Ok(())
        }
        Commands::Workspace { command } => match command {
            WorkspaceCommands::Configure { dry_run } => {
                let client = remote_client(&spec)?;
                workspace::reconcile(&client, &spec.remote, dry_run).await?;
                Ok(())
            }
            WorkspaceCommands::Status => {
                let client = remote_client(&spec)?;
                let workspace = client.read_workspace(&spec.remote.workspace.name).await?;
                match (workspace.locked, workspace.current_run_id) {
                    (true, Some(run_id)) => {
                        println!("workspace '{}' is locked by run {}", workspace.name, run_id)
                    }
                    (true, None) => println!("workspace '{}' is locked", workspace.name),
                    _ => println!("workspace '{}' is idle", workspace.name),
                }
                Ok(())
            }
        },
        Commands::Validate => validate(&spec).await,
    }
}

async fn render(
    directory: &Path,
    spec: &SyncSpec,
    target: RenderTarget,
    dry_run: bool,
    force_update: bool,
) -> anyhow::Result<()> {
    if target == RenderTarget::Disabled {
        info!("variable rendering is disabled, nothing to do");
        return Ok(());
    }

    let resolver = Arc::new(build_resolver(spec)?);

    match target {
        RenderTarget::Remote => {
            let client = remote_client(spec)?;
            let workspace = workspace::reconcile(&client, &spec.remote, dry_run).await?;
            let options = variables::SyncOptions { dry_run, force_update };
            variables::sync_remote(&client, &workspace, spec, resolver, options).await?;
        }
        RenderTarget::Local => {
            if dry_run {
                warn!("[dry-run] would render variables locally");
                return Ok(());
            }
            let defaults = spec.variable_defaults();
            local::render_local(resolver, spec.variables(), &defaults, directory).await?;
        }
        RenderTarget::Disabled => unreachable!("handled above"),
    }

    Ok(())
}

/// Resolve every configured variable and discard the values. Catches bad
/// provider blocks, duplicate names, and unreachable secrets before a real
/// render mutates anything.
async fn validate(spec: &SyncSpec) -> anyhow::Result<()> {
    let resolver = Arc::new(build_resolver(spec)?);

    let mut count = 0usize;
    let mut rx = resolver.stream(spec.variables());
    while let Some(item) = rx.recv().await {
        item?;
        count += 1;
    }

    info!(count, "configuration is valid, all variables resolve");
    Ok(())
}

fn remote_client(spec: &SyncSpec) -> anyhow::Result<RemoteClient> {
    let settings = RemoteSettings::resolve(&spec.remote)?;
    Ok(RemoteClient::new(&settings)?)
}

/// Build the resolver, connecting to the secret store only when some
/// variable actually needs it.
fn build_resolver(spec: &SyncSpec) -> anyhow::Result<Resolver> {
    let store_settings = if needs_store(spec) {
        Some(StoreSettings::resolve(spec.store.as_ref())?)
    } else {
        None
    };

    let store: Option<Arc<dyn SecretStore>> = store_settings
        .clone()
        .map(|settings| Arc::new(HttpSecretStore::new(settings)) as Arc<dyn SecretStore>);

    let cipher = CipherResolver::new(spec.defaults.as_ref(), store_settings);
    Ok(Resolver::new(cipher, store))
}

/// Whether any configured variable reaches for the secret store, either as
/// its source or through a transit cipher engine.
fn needs_store(spec: &SyncSpec) -> bool {
    let default_engine =
        spec.defaults.as_ref().and_then(|d| d.cipher.as_ref()).and_then(|c| c.engine);

    spec.variables().iter().any(|variable| match variable.spec.source() {
        Ok(VariableSource::Store(_)) => true,
        Ok(VariableSource::Cipher(cipher)) => {
            cipher.engine.or(default_engine) == Some(CipherEngineType::Transit)
        }
        _ => false,
    })
}
