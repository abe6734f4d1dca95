//! Poll loop
//!
//! One cycle: search → skip ledgered ids → mark read → record in ledger →
//! extract links → filter by label → open (and optionally click) each link.
//!
//! The ledger is written only after the mailbox accepted the \Seen flag, so it
//! is never ahead of the mailbox's own read state. Stop requests are observed
//! between cycles; an in-flight handler interaction always finishes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::action::{validate_link_url, LinkActionHandler};
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::{Result, WatchError};
use crate::extractor::{extract_links_with_label, filter_by_label};
use crate::ledger::ProcessedLedger;
use crate::models::{Link, Message, RunSummary, ScanReport};
use crate::output::StatusSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorPhase {
    Idle,
    LoginRequired,
    Running,
    Stopped,
}

/// Platform credentials for the one-time login at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformLogin {
    pub name: String,
    pub identity: String,
    pub secret: String,
}

/// What each cycle looks for and what it does with matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub subject: String,
    pub unread_only: bool,
    pub interval: Duration,
    /// Keep only links whose label contains this text
    pub filter_text: Option<String>,
    /// Click the element with this text after opening each link
    pub click_label: Option<String>,
    pub action_timeout: Duration,
    pub platform: Option<PlatformLogin>,
}

impl ScanSettings {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            unread_only: true,
            interval: Duration::from_secs(5),
            filter_text: None,
            click_label: None,
            action_timeout: Duration::from_secs(10),
            platform: None,
        }
    }
}

impl From<&Config> for ScanSettings {
    fn from(config: &Config) -> Self {
        Self {
            subject: config.scan.subject.clone(),
            unread_only: config.scan.unread_only,
            interval: Duration::from_secs(config.scan.interval_secs),
            filter_text: config.links.filter_text.clone(),
            click_label: config.links.click_label.clone(),
            action_timeout: Duration::from_secs(config.links.action_timeout_secs),
            platform: config.platform.as_ref().map(|p| PlatformLogin {
                name: p.name.clone(),
                identity: p.identity.clone(),
                secret: p.secret.clone(),
            }),
        }
    }
}

pub struct ScanOrchestrator {
    connection: ConnectionManager,
    ledger: ProcessedLedger,
    handler: Box<dyn LinkActionHandler>,
    sink: Arc<dyn StatusSink>,
    settings: ScanSettings,
    phase: OrchestratorPhase,
}

impl ScanOrchestrator {
    pub fn new(
        connection: ConnectionManager,
        ledger: ProcessedLedger,
        handler: Box<dyn LinkActionHandler>,
        sink: Arc<dyn StatusSink>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            connection,
            ledger,
            handler,
            sink,
            settings,
            phase: OrchestratorPhase::Idle,
        }
    }

    pub fn phase(&self) -> OrchestratorPhase {
        self.phase
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Connect to the mailbox and sign in to the platform.
    ///
    /// Rejected mailbox credentials and a failed platform login are fatal: both
    /// resources are closed and the orchestrator ends up `Stopped`. An
    /// unreachable mailbox is not; the next cycle connects again.
    pub async fn start(&mut self) -> Result<()> {
        if self.phase != OrchestratorPhase::Idle {
            return Err(WatchError::Config(format!(
                "cannot start orchestrator in phase {:?}",
                self.phase
            )));
        }
        self.phase = OrchestratorPhase::LoginRequired;

        match self.connection.connect().await {
            Ok(()) => self.sink.success("Connected to mailbox", 0),
            Err(e) if e.is_transient() => {
                self.sink
                    .warning(&format!("{}. Will retry on the next cycle", e), 0);
            }
            Err(e) => {
                self.sink.error(&e.to_string(), 0);
                self.shutdown().await;
                return Err(e);
            }
        }

        if let Some(platform) = self.settings.platform.clone() {
            self.sink
                .info(&format!("Logging in to {}...", platform.name), 0);
            let outcome = self
                .handler
                .login_to_platform(&platform.identity, &platform.secret)
                .await;

            if !outcome.is_success() {
                let err = WatchError::PlatformLogin(format!("{}: {}", platform.name, outcome));
                self.sink.error(&err.to_string(), 0);
                self.shutdown().await;
                return Err(err);
            }
            self.sink
                .success(&format!("Logged in to {}", platform.name), 0);
        }

        self.phase = OrchestratorPhase::Running;
        info!("Watching for messages with subject containing {:?}", self.settings.subject);
        Ok(())
    }

    /// Run a single poll cycle.
    ///
    /// Only fatal errors are returned; everything else is folded into the report.
    /// Fails without touching the mailbox unless the orchestrator is `Running`.
    pub async fn scan_once(&mut self) -> Result<ScanReport> {
        if self.phase != OrchestratorPhase::Running {
            return Err(WatchError::Config(format!(
                "cannot scan in phase {:?}",
                self.phase
            )));
        }
        let mut report = ScanReport::new();

        match self.scan_messages(&mut report).await {
            Ok(()) => Ok(report),
            Err(WatchError::NotConnected) => {
                self.sink
                    .warning("Mailbox connection lost. Reconnecting on the next cycle", 0);
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    async fn scan_messages(&mut self, report: &mut ScanReport) -> Result<()> {
        if !self.connection.is_connected() {
            self.sink.info("Reconnecting to mailbox...", 0);
            match self.connection.connect().await {
                Ok(()) => self.sink.success("Reconnected to mailbox", 0),
                Err(e) if e.is_transient() => {
                    self.sink.warning(&e.to_string(), 1);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        let messages = self
            .connection
            .search_messages(&self.settings.subject, self.settings.unread_only)
            .await?;
        report.messages_found = messages.len();
        debug!("Cycle found {} candidate messages", messages.len());

        for message in messages {
            let key = message.id.ledger_key();
            if self.ledger.is_processed(&key) {
                report.already_processed += 1;
                continue;
            }

            if !self.connection.mark_seen(message.id).await? {
                report.mark_read_failed += 1;
                self.sink.warning(
                    &format!(
                        "Could not mark '{}' as read, will retry next cycle",
                        message.subject
                    ),
                    0,
                );
                continue;
            }

            self.ledger.mark_processed(&key).await?;
            report.processed_ids.push(message.id);

            self.process_message(&message, report).await;
        }

        Ok(())
    }

    async fn process_message(&mut self, message: &Message, report: &mut ScanReport) {
        self.sink
            .success(&format!("New message: {}", message.subject), 0);
        debug!("Processing message {} from {}", message.id, message.sender);

        let links = extract_links_with_label(&message.body);
        let found = links.len();
        let links = filter_by_label(links, self.settings.filter_text.as_deref());
        report.links_found += links.len();

        if links.is_empty() {
            self.sink.info(
                &format!("No matching links ({} extracted)", found),
                1,
            );
            return;
        }

        for link in &links {
            if self.act_on_link(link).await {
                report.links_opened += 1;
            } else {
                report.action_failures += 1;
            }
        }
    }

    /// Open `link` and, if configured, click the target label.
    /// `true` when the link was opened.
    async fn act_on_link(&mut self, link: &Link) -> bool {
        if let Err(reason) = validate_link_url(&link.url) {
            let err = WatchError::Action(format!("refusing to open {}: {}", link.url, reason));
            warn!("{}", err);
            self.sink.warning(&err.to_string(), 1);
            return false;
        }

        let timeout = self.settings.action_timeout;
        let outcome = self.handler.open(&link.url, timeout).await;
        if !outcome.is_success() {
            let err = WatchError::Action(format!("open {}: {}", link.url, outcome));
            warn!("{}", err);
            self.sink.warning(&err.to_string(), 1);
            return false;
        }
        self.sink.success(&format!("Opened {}", link.url), 1);

        if let Some(label) = self.settings.click_label.clone() {
            let outcome = self.handler.click_by_label(&label, timeout).await;
            if outcome.is_success() {
                self.sink.success(&format!("Clicked '{}'", label), 2);
            } else {
                let err = WatchError::Action(format!("click '{}': {}", label, outcome));
                warn!("{}", err);
                self.sink.warning(&err.to_string(), 2);
            }
        }

        true
    }

    /// Poll until `shutdown` flips to `true` or a fatal error occurs.
    ///
    /// Starts the orchestrator first if needed. Resources are closed on every exit path.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        let span = info_span!("run", run_id = %summary.run_id);

        async {
            match self.phase {
                OrchestratorPhase::Idle => {
                    if let Err(e) = self.start().await {
                        return Err(e);
                    }
                }
                OrchestratorPhase::Stopped => return Ok(summary),
                _ => {}
            }

            let result = loop {
                if *shutdown.borrow() {
                    info!("Stop requested");
                    break Ok(());
                }

                match self.scan_once().await {
                    Ok(report) => {
                        summary.record(&report);
                        debug!(
                            "Cycle {}: {} found, {} processed, {} links opened",
                            summary.cycles,
                            report.messages_found,
                            report.messages_processed(),
                            report.links_opened
                        );
                    }
                    Err(e) if e.is_fatal() => {
                        error!("Stopping: {}", e);
                        self.sink.error(&e.to_string(), 0);
                        break Err(e);
                    }
                    Err(e) => {
                        warn!("Cycle failed: {}", e);
                        self.sink.warning(&format!("Cycle failed: {}", e), 0);
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.settings.interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            debug!("Stop signal source dropped");
                            break Ok(());
                        }
                    }
                }
            };

            self.shutdown().await;
            self.sink.info(
                &format!(
                    "Stopped after {} cycles: {} messages processed, {} links opened",
                    summary.cycles, summary.messages_processed, summary.links_opened
                ),
                0,
            );
            result.map(|()| summary)
        }
        .instrument(span)
        .await
    }

    /// Close the mailbox session and the action handler. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.phase == OrchestratorPhase::Stopped {
            return;
        }
        self.phase = OrchestratorPhase::Stopped;

        self.connection.close().await;
        self.handler.close().await;
        info!("Watcher stopped");
    }
}
