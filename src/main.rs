//! Kolosal Workbench - command-line entry point

use clap::Parser;
use kolosal_workbench::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workbench=info,kolosal_workbench=info".into()),
        )
        .init();

    let cli = Cli::parse();
    cli::run(cli).await
}
