//! Mailbox protocol seam
//!
//! [`MailboxConnector`] opens authenticated sessions and [`MailboxSession`] runs
//! the handful of commands the watcher needs. The production implementation lives
//! in [`crate::imap`]; tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;

/// One authenticated session with the configured folder selected
#[async_trait]
pub trait MailboxSession: Send {
    /// Run a search and return matching UIDs in ascending order
    async fn search(&mut self, query: &str) -> Result<Vec<u32>>;

    /// Fetch the full raw message without setting the \Seen flag.
    /// `None` if the message no longer exists.
    async fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    /// Set the \Seen flag
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// No-op round trip used as a keep-alive
    async fn noop(&mut self) -> Result<()>;

    async fn logout(&mut self) -> Result<()>;
}

/// Factory for new sessions.
///
/// Must fail with `WatchError::Authentication` when credentials are rejected and
/// `WatchError::Connection` for anything transport related.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailboxSession>>;

    /// Human-readable endpoint for log lines
    fn describe(&self) -> String;
}

/// Build the search predicate for messages whose subject contains `subject`.
///
/// `SUBJECT` is a case-insensitive substring match on the server.
pub fn build_search_query(subject: &str, unread_only: bool) -> String {
    let quoted = quote_string(subject);
    if unread_only {
        format!("UNSEEN SUBJECT {}", quoted)
    } else {
        format!("SUBJECT {}", quoted)
    }
}

/// IMAP quoted string
fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\r' | '\n' => quoted.push(' '),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
