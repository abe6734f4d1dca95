use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mailbox-assigned message identifier (an IMAP UID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl MessageId {
    /// Key used in the processed ledger
    pub fn ledger_key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fetched and decoded message. Discarded after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub subject: String,
    pub sender: String,
    pub body: String,
}

/// An actionable link found in a message body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Link {
    pub url: String,
    /// Human-readable text associated with the url, possibly empty
    pub label: String,
}

impl Link {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
        }
    }
}

/// Outcome of a single poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub messages_found: usize,
    pub already_processed: usize,
    pub mark_read_failed: usize,
    pub processed_ids: Vec<MessageId>,
    pub links_found: usize,
    pub links_opened: usize,
    pub action_failures: usize,
}

impl ScanReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            messages_found: 0,
            already_processed: 0,
            mark_read_failed: 0,
            processed_ids: Vec::new(),
            links_found: 0,
            links_opened: 0,
            action_failures: 0,
        }
    }

    pub fn messages_processed(&self) -> usize {
        self.processed_ids.len()
    }
}

impl Default for ScanReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals for a whole watcher run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub cycles: usize,
    pub messages_processed: usize,
    pub links_opened: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            cycles: 0,
            messages_processed: 0,
            links_opened: 0,
        }
    }

    pub fn record(&mut self, report: &ScanReport) {
        self.cycles += 1;
        self.messages_processed += report.messages_processed();
        self.links_opened += report.links_opened;
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
