//! Subatomic CLI.
//!
//! Provisions software delivery environments on OpenShift: namespaces,
//! quotas, application templates, rollouts and credentials, with progress
//! reported to a chat destination as an in-place-updating status board.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod pipeline;
mod ui;

use commands::provision::ProvisionCommand;

/// Subatomic - delivery environment provisioner.
#[derive(Parser)]
#[command(
    name = "subatomic",
    version,
    about = "Provision delivery environments",
    long_about = "Provision software delivery environments on OpenShift.\n\n\
                  Creates namespaces, applies quotas, instantiates application\n\
                  templates and registers credentials, reporting progress to a\n\
                  chat channel.\n\n\
                  Steps are idempotent - re-running the same command after a\n\
                  failure skips objects that already exist."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision one or more environments for a project.
    Provision(ProvisionCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("info,provision=debug,openshift=debug,subatomic=debug")
    } else {
        EnvFilter::new("warn,provision=info,openshift=info,subatomic=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Provision(cmd) => cmd.run().await,
    }
}
