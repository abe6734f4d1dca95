use anyhow::Result;
use auto_accept::cli::{self, Cli, Commands};
use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: auto-accept --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // rustls needs a process-wide crypto provider before the first TLS handshake.
    // aws-lc-rs everywhere but Windows, where ring avoids the NASM/CMake toolchain.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("auto_accept=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("auto_accept=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match cli.command {
        Commands::Run { dry_run, once } => {
            tracing::info!("Starting mailbox watcher");
            cli::run_watcher(&cli.config, dry_run, once).await
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");
            cli::init_config(&output, force).await
        }

        Commands::Status => cli::show_status(&cli.config).await,

        Commands::Extract { file, all } => cli::extract_file(&file, all).await,
    }
}
