//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use auto_accept::action::{ActionOutcome, LinkActionHandler};
use auto_accept::connection::{ConnectionManager, ConnectionPolicy};
use auto_accept::error::{Result, WatchError};
use auto_accept::mailbox::{MailboxConnector, MailboxSession};
use auto_accept::output::StatusSink;
use mockall::mock;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

mock! {
    pub Handler {}

    #[async_trait]
    impl LinkActionHandler for Handler {
        async fn login_to_platform(&mut self, identity: &str, secret: &str) -> ActionOutcome;
        async fn open(&mut self, url: &str, timeout: Duration) -> ActionOutcome;
        async fn click_by_label(&mut self, label: &str, timeout: Duration) -> ActionOutcome;
        async fn close(&mut self);
    }
}

/// Create a raw HTML notification message
pub fn raw_message(subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: Tasks <noreply@tasks.example.com>\r\n\
         To: me@example.com\r\n\
         Subject: {}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         \r\n\
         {}\r\n",
        subject, body
    )
    .into_bytes()
}

/// Create a raw plain-text message
pub fn raw_plain_message(subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: Tasks <noreply@tasks.example.com>\r\n\
         Subject: {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {}\r\n",
        subject, body
    )
    .into_bytes()
}

/// Scripted failure for the next connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Connection,
    Auth,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub subject: String,
    pub raw: Vec<u8>,
    pub seen: bool,
}

/// Everything the fake mailbox has seen and will do
#[derive(Debug, Default)]
pub struct MailboxState {
    pub messages: Vec<StoredMessage>,
    /// UIDs that are still returned by search but vanish before fetch
    pub vanished: HashSet<u32>,

    pub connects: usize,
    pub logouts: usize,
    pub noops: usize,
    pub queries: Vec<String>,
    pub search_times: Vec<Instant>,
    pub marked: Vec<u32>,

    pub connect_failures: VecDeque<Failure>,
    pub search_failures: usize,
    pub fetch_failures: usize,
    pub mark_failures: usize,
    pub noop_failures: usize,
}

fn take_failure(counter: &mut usize, operation: &str) -> Result<()> {
    if *counter > 0 {
        *counter -= 1;
        return Err(WatchError::Connection(format!("{}: connection reset", operation)));
    }
    Ok(())
}

/// In-memory mailbox shared between a test and the sessions it hands out
#[derive(Debug, Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, uid: u32, subject: &str, body: &str) {
        self.add_raw(uid, subject, raw_message(subject, body));
    }

    pub fn add_raw(&self, uid: u32, subject: &str, raw: Vec<u8>) {
        self.with(|state| {
            state.messages.push(StoredMessage {
                uid,
                subject: subject.to_string(),
                raw,
                seen: false,
            })
        });
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MailboxState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn connector(&self) -> Box<dyn MailboxConnector> {
        Box::new(FakeConnector {
            state: Arc::clone(&self.state),
        })
    }

    pub fn manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.connector(), ConnectionPolicy::default())
    }
}

pub struct FakeConnector {
    state: Arc<Mutex<MailboxState>>,
}

#[async_trait]
impl MailboxConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn MailboxSession>> {
        let mut state = self.state.lock().unwrap();
        match state.connect_failures.pop_front() {
            Some(Failure::Auth) => {
                return Err(WatchError::Authentication("invalid credentials".to_string()))
            }
            Some(Failure::Connection) => {
                return Err(WatchError::Connection("connection refused".to_string()))
            }
            None => {}
        }

        state.connects += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        "me@example.com@fake:993".to_string()
    }
}

pub struct FakeSession {
    state: Arc<Mutex<MailboxState>>,
}

/// Text between the first and last double quote of a search query
fn quoted_subject(query: &str) -> String {
    match (query.find('"'), query.rfind('"')) {
        (Some(start), Some(end)) if end > start => query[start + 1..end].to_lowercase(),
        _ => String::new(),
    }
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());
        state.search_times.push(Instant::now());
        take_failure(&mut state.search_failures, "search")?;

        let unseen_only = query.starts_with("UNSEEN");
        let subject = quoted_subject(query);
        let mut uids: Vec<u32> = state
            .messages
            .iter()
            .filter(|m| !(unseen_only && m.seen))
            .filter(|m| m.subject.to_lowercase().contains(&subject))
            .map(|m| m.uid)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        take_failure(&mut state.fetch_failures, "fetch")?;

        if state.vanished.contains(&uid) {
            return Ok(None);
        }
        Ok(state
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .map(|m| m.raw.clone()))
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        take_failure(&mut state.mark_failures, "store")?;

        if let Some(message) = state.messages.iter_mut().find(|m| m.uid == uid) {
            message.seen = true;
        }
        state.marked.push(uid);
        Ok(())
    }

    async fn noop(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.noops += 1;
        take_failure(&mut state.noop_failures, "noop")
    }

    async fn logout(&mut self) -> Result<()> {
        self.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Warning,
    Error,
    Info,
}

/// Captures status lines instead of printing them
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, level: Level, text: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, line)| *l == level && line.contains(text))
    }

    fn push(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

impl StatusSink for RecordingSink {
    fn success(&self, message: &str, _indent: usize) {
        self.push(Level::Success, message);
    }

    fn warning(&self, message: &str, _indent: usize) {
        self.push(Level::Warning, message);
    }

    fn error(&self, message: &str, _indent: usize) {
        self.push(Level::Error, message);
    }

    fn info(&self, message: &str, _indent: usize) {
        self.push(Level::Info, message);
    }
}
