//! Warden CLI - Main entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warden_kernel::{commands, HandlerRegistry, KernelConfig, Orchestrator};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - self-auditing policy kernel", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Kernel configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one operation or an array of operations
    Process {
        /// JSON file, or "-" for stdin
        input: PathBuf,
    },

    /// Print the compliance status report
    Status,

    /// Verify the audit hash chain
    Verify,

    /// Search the audit trail
    Search {
        /// Filter by event type
        #[arg(long)]
        event_type: Option<String>,
        /// Filter by principle code (e.g. P-001)
        #[arg(long)]
        principle: Option<String>,
        /// Maximum number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Restore the last SAFE checkpoint
    Rollback {
        /// Reason recorded in the audit trail
        #[arg(long, default_value = "manual rollback")]
        reason: String,
    },

    /// List the rule catalog
    Rules,

    /// Release an engaged lockdown
    ReleaseLockdown {
        /// Operator taking responsibility for the release
        #[arg(long)]
        operator: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Rules are static; no stores needed
    if let Commands::Rules = cli.command {
        return commands::rules();
    }

    let config = match &cli.config {
        Some(path) => KernelConfig::from_file(path)?,
        None => KernelConfig::default(),
    }
    .with_data_dir(cli.data.clone());

    let orchestrator = Orchestrator::start(config, HandlerRegistry::with_defaults()).await?;

    match cli.command {
        Commands::Process { input } => {
            if !commands::process(&orchestrator, &input).await? {
                anyhow::bail!("One or more operations were rejected");
            }
        }

        Commands::Status => {
            commands::status(&orchestrator).await?;
        }

        Commands::Verify => {
            if !commands::verify(&orchestrator).await? {
                anyhow::bail!("Audit chain verification failed");
            }
        }

        Commands::Search {
            event_type,
            principle,
            limit,
        } => {
            commands::search(
                &orchestrator,
                event_type.as_deref(),
                principle.as_deref(),
                limit,
            )
            .await?;
        }

        Commands::Rollback { reason } => {
            commands::rollback(&orchestrator, &reason).await?;
        }

        Commands::Rules => commands::rules()?,

        Commands::ReleaseLockdown { operator } => {
            commands::release_lockdown(&orchestrator, &operator).await?;
        }
    }

    Ok(())
}
