#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

mod command;
mod console;
mod session;
mod wizard;

use clap::{Parser, Subcommand};
use command::{
    CheckInput, CheckStrategy, CommandStrategy, InfoStrategy, InitStrategy, RunInput,
    RunStrategy, VersionStrategy,
};
use parley_config::Config;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Run scripted question/answer conversations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a wizard script on this terminal
    Run {
        /// Script file, or a name inside the configured scripts directory
        script: PathBuf,

        /// Timeout in seconds for questions that declare none (0 disables)
        #[arg(short = 't', long)]
        timeout_secs: Option<u64>,
    },
    /// Validate a wizard script
    Check {
        /// Script file, or a name inside the configured scripts directory
        script: PathBuf,
    },
    /// Initialize configuration
    Init,
    /// Show effective configuration
    Info,
    /// Show version
    Version,
}

/// Log to stderr so prompts and the final record on stdout stay clean.
fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        let configured = Config::load_or_default()
            .map(|config| config.log.filter)
            .unwrap_or_else(|_| "warn".to_string());
        EnvFilter::try_new(configured)
    })?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            timeout_secs,
        } => {
            RunStrategy
                .execute(RunInput {
                    script,
                    timeout_secs,
                })
                .await?;
        }
        Commands::Check { script } => {
            CheckStrategy.execute(CheckInput { script }).await?;
        }
        Commands::Init => {
            InitStrategy.execute(()).await?;
        }
        Commands::Info => {
            InfoStrategy.execute(()).await?;
        }
        Commands::Version => {
            VersionStrategy.execute(()).await?;
        }
    }

    Ok(())
}
