//! Command-line interface

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::action::{LinkActionHandler, LogOnlyHandler, SystemBrowserHandler};
use crate::config::{Config, LedgerConfig};
use crate::connection::{ConnectionManager, ConnectionPolicy};
use crate::error::WatchError;
use crate::extractor::{extract_links, extract_links_with_label};
use crate::imap::ImapConnector;
use crate::ledger::ProcessedLedger;
use crate::mime::parse_message;
use crate::models::MessageId;
use crate::orchestrator::{ScanOrchestrator, ScanSettings};
use crate::output::{ConsoleSink, StatusSink};

#[derive(Parser, Debug)]
#[command(name = "auto-accept")]
#[command(version)]
#[command(about = "Watch a mailbox and act on task links as they arrive", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "auto-accept.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start watching the mailbox
    Run {
        /// Log the links that would be opened instead of opening them
        #[arg(long)]
        dry_run: bool,

        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "auto-accept.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show how many messages have been processed
    Status,

    /// Print the links found in a saved message
    Extract {
        /// A raw .eml file, or any other file treated as a plain message body
        file: PathBuf,

        /// Print every URL instead of labeled links
        #[arg(long)]
        all: bool,
    },
}

/// Pick the action handler for a run
pub fn build_handler(config: &Config, dry_run: bool) -> Box<dyn LinkActionHandler> {
    if dry_run || config.action.handler == "log" {
        return Box::new(LogOnlyHandler::new());
    }

    if let Some(label) = &config.links.click_label {
        warn!("The browser handler cannot click '{}'; links will only be opened", label);
    }
    let login_url = config.platform.as_ref().and_then(|p| p.login_url.clone());
    Box::new(SystemBrowserHandler::new(login_url))
}

pub async fn run_watcher(config_path: &Path, dry_run: bool, once: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).await?;
    let settings = ScanSettings::from(&config);

    let sink = Arc::new(ConsoleSink::new());
    sink.startup_banner(&settings);
    if dry_run {
        sink.info("Running in DRY RUN mode - links will only be logged", 0);
    }

    let connection = ConnectionManager::new(
        Box::new(ImapConnector::new(&config.mailbox)),
        ConnectionPolicy::from(&config.connection),
    );
    let ledger = ProcessedLedger::load(&config.ledger.path).await;
    let handler = build_handler(&config, dry_run);

    let mut orchestrator = ScanOrchestrator::new(connection, ledger, handler, sink.clone(), settings);

    if once {
        orchestrator.start().await?;
        let result = orchestrator.scan_once().await;
        orchestrator.shutdown().await;
        let report = result?;

        sink.info(
            &format!(
                "Cycle complete: {} found, {} processed, {} links opened, {} failures",
                report.messages_found,
                report.messages_processed(),
                report.links_opened,
                report.action_failures
            ),
            0,
        );
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping after the current cycle");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                warn!("Could not listen for Ctrl+C: {}", e);
                // keep the sender alive so the watcher is not stopped
                std::future::pending::<()>().await;
            }
        }
    });

    let summary = orchestrator.run(stop_rx).await?;
    info!(
        "Run {} finished after {} cycles",
        summary.run_id, summary.cycles
    );
    Ok(())
}

pub async fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        return Err(WatchError::Config(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        ))
        .into());
    }

    Config::create_example(output).await?;

    println!("Created example configuration file at: {:?}", output);
    println!("\nPlease edit this file to customize your settings.");
    println!("Key settings to review:");
    println!("  - mailbox.username / mailbox.password: IMAP credentials (app password for Gmail)");
    println!("  - scan.subject: Subject text that identifies task notifications");
    println!("  - links.filter_text: Only act on links whose label contains this text");
    println!("  - links.click_label: Button to click after a link opens");
    println!("\nSecrets can also come from AUTO_ACCEPT_MAILBOX_PASSWORD and AUTO_ACCEPT_PLATFORM_SECRET.");

    Ok(())
}

pub async fn show_status(config_path: &Path) -> anyhow::Result<()> {
    let ledger_path = if config_path.exists() {
        let contents = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("reading {:?}", config_path))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing {:?}", config_path))?;
        config.ledger.path
    } else {
        LedgerConfig::default().path
    };

    let ledger = ProcessedLedger::load(&ledger_path).await;

    println!("\n========================================");
    println!("Watcher Status");
    println!("========================================");
    println!("Config file: {:?}", config_path);
    println!("Ledger file: {:?}", ledger.path());
    println!("Messages processed: {}", ledger.len());
    println!("========================================");

    Ok(())
}

pub async fn extract_file(file: &Path, all: bool) -> anyhow::Result<()> {
    let raw = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {:?}", file))?;

    let is_eml = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"));
    let body = if is_eml {
        let message = parse_message(MessageId(0), &raw)?;
        println!("Subject: {}", message.subject);
        println!("From:    {}\n", message.sender);
        message.body
    } else {
        String::from_utf8_lossy(&raw).into_owned()
    };

    if all {
        let urls = extract_links(&body);
        for url in &urls {
            println!("{}", url);
        }
        println!("\n{} URLs found", urls.len());
    } else {
        let links = extract_links_with_label(&body);
        for link in &links {
            if link.label.is_empty() {
                println!("{}", link.url);
            } else {
                println!("{}  [{}]", link.url, link.label);
            }
        }
        println!("\n{} links found", links.len());
    }

    Ok(())
}
