//! Mailbox session lifecycle
//!
//! [`ConnectionManager`] owns the single mailbox session and decides, right before
//! each operation, whether it can still be trusted:
//!
//! - **Refresh**: a session older than the refresh interval is replaced outright
//! - **Keep-alive**: a session idle past the keep-alive interval gets a `NOOP`;
//!   a failed `NOOP` forces a reconnect
//!
//! Staleness is only evaluated lazily, there is no background timer, so an idle
//! watcher generates no traffic.
//!
//! Every mailbox operation goes through [`ConnectionManager::with_retry`], which
//! reconnects and retries transient failures with exponential backoff and turns
//! exhaustion into a soft failure (`Ok(None)`).

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Result, WatchError};
use crate::mailbox::{build_search_query, MailboxConnector, MailboxSession};
use crate::mime::parse_message;
use crate::models::{Message, MessageId};

/// Sessions older than this are replaced before the next operation
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 60);
/// Sessions idle longer than this are pinged before the next operation
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timestamps of the live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected_at: Instant,
    pub last_keepalive_at: Instant,
}

impl ConnectionState {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            connected_at: now,
            last_keepalive_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    /// An interval has elapsed; the next operation will ping or refresh first
    Stale,
}

/// Attempts and delays for retried mailbox operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Jitter-free exponential delay generator (1s, 2s, 4s, ... by default)
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(None)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPolicy {
    pub refresh_interval: Duration,
    pub keepalive_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            refresh_interval: REFRESH_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&ConnectionConfig> for ConnectionPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            keepalive_interval: Duration::from_secs(config.keepalive_interval_secs),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                initial_backoff: Duration::from_millis(config.initial_backoff_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Owns the mailbox session and its health bookkeeping.
///
/// State machine: `Disconnected -> Connected -> Stale -> Connected | Disconnected`.
/// Operations issued while disconnected fail with [`WatchError::NotConnected`];
/// only [`ConnectionManager::connect`] establishes a session from scratch.
pub struct ConnectionManager {
    connector: Box<dyn MailboxConnector>,
    session: Option<Box<dyn MailboxSession>>,
    state: Option<ConnectionState>,
    policy: ConnectionPolicy,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn MailboxConnector>, policy: ConnectionPolicy) -> Self {
        Self {
            connector,
            session: None,
            state: None,
            policy,
        }
    }

    /// Authenticate and open a new session, replacing any existing one
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            self.close().await;
        }

        info!("Connecting to mailbox {}", self.connector.describe());
        let session = self.connector.connect().await?;

        self.session = Some(session);
        self.state = Some(ConnectionState::fresh());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.state
    }

    pub fn policy(&self) -> &ConnectionPolicy {
        &self.policy
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            None => ConnectionStatus::Disconnected,
            Some(state) => {
                let now = Instant::now();
                if now.duration_since(state.connected_at) > self.policy.refresh_interval
                    || now.duration_since(state.last_keepalive_at) > self.policy.keepalive_interval
                {
                    ConnectionStatus::Stale
                } else {
                    ConnectionStatus::Connected
                }
            }
        }
    }

    /// Refresh or ping the session if an interval has elapsed.
    ///
    /// A failed forced reconnect leaves the manager disconnected and returns the
    /// connect error unchanged.
    pub async fn ensure_healthy(&mut self) -> Result<()> {
        let state = self.state.ok_or(WatchError::NotConnected)?;
        let now = Instant::now();

        let age = now.duration_since(state.connected_at);
        if age > self.policy.refresh_interval {
            info!("Mailbox session is {:?} old, refreshing", age);
            return self.reconnect().await;
        }

        let idle = now.duration_since(state.last_keepalive_at);
        if idle > self.policy.keepalive_interval {
            let ping = match self.session.as_mut() {
                Some(session) => session.noop().await,
                None => Err(WatchError::NotConnected),
            };

            match ping {
                Ok(()) => {
                    debug!("Keep-alive succeeded after {:?} idle", idle);
                    if let Some(state) = self.state.as_mut() {
                        state.last_keepalive_at = Instant::now();
                    }
                }
                Err(e) => {
                    warn!("Keep-alive failed: {}. Reconnecting", e);
                    return self.reconnect().await;
                }
            }
        }

        Ok(())
    }

    /// Drop the current session and open a new one
    pub async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        self.connect().await
    }

    /// Best-effort logout. Safe to call any number of times.
    pub async fn close(&mut self) {
        self.state = None;

        if let Some(mut session) = self.session.take() {
            match tokio::time::timeout(LOGOUT_TIMEOUT, session.logout()).await {
                Ok(Ok(())) => debug!("Logged out of mailbox"),
                Ok(Err(e)) => debug!("Logout failed: {}", e),
                Err(_) => debug!("Logout timed out after {:?}", LOGOUT_TIMEOUT),
            }
        }
    }

    /// Run a mailbox operation with health checks, reconnects and backoff.
    ///
    /// Returns `Ok(Some(value))` on success and `Ok(None)` once every attempt has
    /// failed transiently; callers treat `None` as "try again next poll", never as
    /// an empty mailbox. Non-transient errors (authentication, not connected) are
    /// returned immediately.
    pub async fn with_retry<T, F>(&mut self, operation: &str, mut op: F) -> Result<Option<T>>
    where
        F: for<'s> FnMut(&'s mut dyn MailboxSession) -> BoxFuture<'s, Result<T>>,
    {
        let max_attempts = self.policy.retry.max_attempts.max(1);
        let mut backoff = self.policy.retry.backoff();
        let mut last_error: Option<WatchError> = None;

        for attempt in 1..=max_attempts {
            if let Some(error) = &last_error {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or(self.policy.retry.initial_backoff);
                warn!(
                    "{} failed (attempt {}/{}): {}. Reconnecting and retrying in {:?}...",
                    operation,
                    attempt - 1,
                    max_attempts,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(last_error.is_some(), &mut op).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}/{}", operation, attempt, max_attempts);
                    }
                    return Ok(Some(value));
                }
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        if let Some(error) = last_error {
            warn!(
                "{} failed after {} attempts: {}. Will try again next poll",
                operation, max_attempts, error
            );
        }
        Ok(None)
    }

    async fn attempt<T, F>(&mut self, reconnect_first: bool, op: &mut F) -> Result<T>
    where
        F: for<'s> FnMut(&'s mut dyn MailboxSession) -> BoxFuture<'s, Result<T>>,
    {
        if reconnect_first {
            self.reconnect().await?;
        }
        self.ensure_healthy().await?;

        let session = self.session.as_mut().ok_or(WatchError::NotConnected)?;
        op(&mut **session).await
    }

    /// Fetch every message whose subject contains `subject`.
    ///
    /// Messages that vanished or fail to parse are skipped. If the mailbox stays
    /// unreachable the result is empty (or holds whatever was fetched so far).
    pub async fn search_messages(&mut self, subject: &str, unread_only: bool) -> Result<Vec<Message>> {
        let query = build_search_query(subject, unread_only);

        let uids = self
            .with_retry("search", |session| {
                let query = query.clone();
                async move { session.search(&query).await }.boxed()
            })
            .await?;
        let Some(uids) = uids else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::with_capacity(uids.len());
        for uid in uids {
            let fetched = self
                .with_retry("fetch", move |session| {
                    async move { session.fetch(uid).await }.boxed()
                })
                .await?;

            let raw = match fetched {
                Some(Some(raw)) => raw,
                Some(None) => {
                    warn!("Message {} disappeared before it could be fetched", uid);
                    continue;
                }
                None => break,
            };

            match parse_message(MessageId(uid), &raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("{}. Skipping message", e),
            }
        }

        debug!("Fetched {} messages matching {:?}", messages.len(), subject);
        Ok(messages)
    }

    /// Set the \Seen flag. `false` means every attempt failed.
    pub async fn mark_seen(&mut self, id: MessageId) -> Result<bool> {
        let uid = id.0;
        let stored = self
            .with_retry("mark read", move |session| {
                async move { session.mark_seen(uid).await }.boxed()
            })
            .await?;
        Ok(stored.is_some())
    }
}
