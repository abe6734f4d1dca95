use thiserror::Error;

/// Type alias for Result with WatchError
pub type Result<T> = std::result::Result<T, WatchError>;

/// Error types for the mailbox watcher
#[derive(Error, Debug)]
pub enum WatchError {
    /// Mailbox rejected the credentials. Never retried automatically.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport, TLS or protocol failure talking to the mailbox
    #[error("Connection error: {0}")]
    Connection(String),

    /// A mailbox operation was issued while no session exists
    #[error("Not connected to the mailbox")]
    NotConnected,

    /// A single message could not be parsed
    #[error("Failed to parse message {id}: {reason}")]
    Parse { id: String, reason: String },

    /// The persisted ledger could not be read or decoded
    #[error("Ledger is corrupted: {0}")]
    LedgerCorruption(String),

    /// The ledger could not be persisted (disk full, permissions, ...)
    #[error("Failed to persist ledger: {0}")]
    LedgerWrite(String),

    /// The action handler reported a failure for a link
    #[error("Action failed: {0}")]
    Action(String),

    /// Logging into the target platform failed at startup
    #[error("Platform login failed: {0}")]
    PlatformLogin(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    /// Check if the error is transient and the operation should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, WatchError::Connection(_))
    }

    /// Check if the error must end the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WatchError::Authentication(_)
                | WatchError::LedgerWrite(_)
                | WatchError::PlatformLogin(_)
                | WatchError::Config(_)
        )
    }
}

impl From<async_imap::error::Error> for WatchError {
    fn from(error: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match error {
            ImapError::Io(err) => WatchError::Connection(format!("I/O: {}", err)),
            ImapError::Bad(msg) => WatchError::Connection(format!("server said BAD: {}", msg)),
            ImapError::No(msg) => WatchError::Connection(format!("server said NO: {}", msg)),
            other => WatchError::Connection(other.to_string()),
        }
    }
}
