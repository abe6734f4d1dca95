//! Mailbox Link Watcher
//!
//! Watches an IMAP mailbox for task notifications, pulls the actionable links out
//! of each new message and hands them to a browser-level action handler.
//!
//! # Overview
//!
//! - **Connection management**: one IMAP session with lazy keep-alive, periodic
//!   refresh and retry with exponential backoff
//! - **Link extraction**: anchor tags first, plain-text URLs with inferred labels
//!   as a fallback
//! - **Deduplication**: a persisted ledger of processed message ids survives restarts
//! - **Orchestration**: the poll loop that marks messages read, records them and
//!   dispatches their links
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use auto_accept::{
//!     action::LogOnlyHandler,
//!     config::Config,
//!     connection::{ConnectionManager, ConnectionPolicy},
//!     imap::ImapConnector,
//!     ledger::ProcessedLedger,
//!     orchestrator::{ScanOrchestrator, ScanSettings},
//!     output::ConsoleSink,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("auto-accept.toml".as_ref()).await?;
//!
//!     let connection = ConnectionManager::new(
//!         Box::new(ImapConnector::new(&config.mailbox)),
//!         ConnectionPolicy::from(&config.connection),
//!     );
//!     let ledger = ProcessedLedger::load(&config.ledger.path).await;
//!
//!     let mut orchestrator = ScanOrchestrator::new(
//!         connection,
//!         ledger,
//!         Box::new(LogOnlyHandler::new()),
//!         Arc::new(ConsoleSink::new()),
//!         ScanSettings::from(&config),
//!     );
//!
//!     orchestrator.start().await?;
//!     let report = orchestrator.scan_once().await?;
//!     orchestrator.shutdown().await;
//!
//!     println!("Opened {} links", report.links_opened);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`action`] - Link action handler seam and built-in handlers
//! - [`cli`] - Command-line interface and command implementations
//! - [`config`] - Configuration management
//! - [`connection`] - Session lifecycle, keep-alive and retry
//! - [`error`] - Error types and result aliases
//! - [`extractor`] - Link and label extraction from message bodies
//! - [`imap`] - IMAP over TLS
//! - [`ledger`] - Persisted set of processed message ids
//! - [`mailbox`] - Mailbox protocol traits
//! - [`mime`] - Raw message decoding
//! - [`models`] - Core data structures
//! - [`orchestrator`] - The poll loop
//! - [`output`] - Operator-facing status output

pub mod action;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod extractor;
pub mod imap;
pub mod ledger;
pub mod mailbox;
pub mod mime;
pub mod models;
pub mod orchestrator;
pub mod output;

// Re-export commonly used types for convenience
pub use error::{Result, WatchError};

// Core data models
pub use models::{Link, Message, MessageId, RunSummary, ScanReport};

// Extraction
pub use extractor::{extract_links, extract_links_with_label, filter_by_label, LabelPolicy, LinkExtractor};

// Config types
pub use config::Config;

// Mailbox seams
pub use connection::{ConnectionManager, ConnectionPolicy, ConnectionStatus, RetryPolicy};
pub use mailbox::{MailboxConnector, MailboxSession};

pub use ledger::ProcessedLedger;

pub use action::{ActionOutcome, LinkActionHandler};
pub use orchestrator::{OrchestratorPhase, ScanOrchestrator, ScanSettings};
pub use output::{ConsoleSink, StatusSink};

// CLI types (for binary usage)
pub use cli::{Cli, Commands};
