use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, WatchError};

/// Environment variable that overrides `mailbox.password`
pub const MAILBOX_PASSWORD_ENV: &str = "AUTO_ACCEPT_MAILBOX_PASSWORD";
/// Environment variable that overrides `platform.secret`
pub const PLATFORM_SECRET_ENV: &str = "AUTO_ACCEPT_PLATFORM_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub platform: Option<PlatformConfig>,
    #[serde(default)]
    pub action: ActionConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            folder: default_folder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub subject: String,
    #[serde(default = "default_unread_only")]
    pub unread_only: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            subject: String::new(),
            unread_only: default_unread_only(),
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Only act on links whose label contains this text
    #[serde(default)]
    pub filter_text: Option<String>,
    /// Label of the element to click after a link is opened
    #[serde(default)]
    pub click_label: Option<String>,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            filter_text: None,
            click_label: None,
            action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default = "default_handler")]
    pub handler: String,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            handler: default_handler(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_unread_only() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    5
}

fn default_action_timeout_secs() -> u64 {
    10
}

fn default_handler() -> String {
    "browser".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    20 * 60
}

fn default_keepalive_interval_secs() -> u64 {
    5 * 60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(".auto-accept/processed_emails.json")
}

impl Config {
    /// Load, apply environment overrides and validate
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WatchError::Config(format!(
                "Config file not found at {:?}. Create one with `auto-accept init-config`",
                path
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WatchError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| WatchError::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    WatchError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| WatchError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| WatchError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Secrets may come from the environment instead of the file
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(password) = lookup(MAILBOX_PASSWORD_ENV).filter(|v| !v.is_empty()) {
            self.mailbox.password = password;
        }
        if let Some(platform) = self.platform.as_mut() {
            if let Some(secret) = lookup(PLATFORM_SECRET_ENV).filter(|v| !v.is_empty()) {
                platform.secret = secret;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.host.trim().is_empty() {
            return Err(WatchError::Config("mailbox.host cannot be empty".to_string()));
        }
        if self.mailbox.port == 0 {
            return Err(WatchError::Config("mailbox.port must be greater than 0".to_string()));
        }
        if self.mailbox.username.trim().is_empty() {
            return Err(WatchError::Config("mailbox.username cannot be empty".to_string()));
        }
        if self.mailbox.password.is_empty() {
            return Err(WatchError::Config(format!(
                "mailbox.password is empty (set it in the file or via {})",
                MAILBOX_PASSWORD_ENV
            )));
        }
        if self.mailbox.folder.trim().is_empty() {
            return Err(WatchError::Config("mailbox.folder cannot be empty".to_string()));
        }

        if self.scan.subject.trim().is_empty() {
            return Err(WatchError::Config("scan.subject cannot be empty".to_string()));
        }
        // SUBJECT is sent as a plain quoted string, which servers reject outside ASCII
        if !self.scan.subject.is_ascii() {
            return Err(WatchError::Config(
                "scan.subject must be ASCII (use an ASCII fragment of the subject)".to_string(),
            ));
        }
        if self.scan.interval_secs == 0 {
            return Err(WatchError::Config(
                "scan.interval_secs must be at least 1".to_string(),
            ));
        }

        if matches!(self.links.filter_text.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(WatchError::Config(
                "links.filter_text cannot be empty (omit it to act on every link)".to_string(),
            ));
        }
        if matches!(self.links.click_label.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(WatchError::Config(
                "links.click_label cannot be empty (omit it to only open links)".to_string(),
            ));
        }
        if self.links.action_timeout_secs == 0 {
            return Err(WatchError::Config(
                "links.action_timeout_secs must be at least 1".to_string(),
            ));
        }

        if let Some(platform) = &self.platform {
            if platform.name.trim().is_empty() {
                return Err(WatchError::Config("platform.name cannot be empty".to_string()));
            }
        }

        match self.action.handler.as_str() {
            "browser" | "log" => {}
            other => {
                return Err(WatchError::Config(format!(
                    "Invalid action.handler: '{}'. Must be 'browser' or 'log'",
                    other
                )));
            }
        }

        if self.connection.max_attempts == 0 {
            return Err(WatchError::Config(
                "connection.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.connection.keepalive_interval_secs >= self.connection.refresh_interval_secs {
            return Err(WatchError::Config(
                "connection.keepalive_interval_secs must be shorter than connection.refresh_interval_secs"
                    .to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Configuration written by `init-config`
    pub fn example() -> Self {
        Self {
            mailbox: MailboxConfig {
                username: "you@gmail.com".to_string(),
                ..MailboxConfig::default()
            },
            scan: ScanConfig {
                subject: "New task".to_string(),
                ..ScanConfig::default()
            },
            links: LinksConfig {
                filter_text: Some("Go to task".to_string()),
                ..LinksConfig::default()
            },
            platform: Some(PlatformConfig {
                name: "smartcat".to_string(),
                login_url: Some("https://smartcat.com/sign-in".to_string()),
                identity: "you@example.com".to_string(),
                secret: String::new(),
            }),
            ..Self::default()
        }
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::example().save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config() -> Config {
        let mut config = Config::example();
        config.mailbox.password = "app-password".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.mailbox.host, "imap.gmail.com");
        assert_eq!(config.mailbox.port, 993);
        assert_eq!(config.mailbox.folder, "INBOX");
        assert!(config.scan.unread_only);
        assert_eq!(config.scan.interval_secs, 5);
        assert_eq!(config.links.action_timeout_secs, 10);
        assert_eq!(config.action.handler, "browser");
        assert_eq!(config.connection.refresh_interval_secs, 1200);
        assert_eq!(config.connection.keepalive_interval_secs, 300);
        assert_eq!(config.connection.max_attempts, 3);
        assert_eq!(config.connection.initial_backoff_ms, 1000);
        assert!(config.platform.is_none());
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_example_requires_password() {
        let result = Config::example().validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains(MAILBOX_PASSWORD_ENV));
    }

    #[test]
    fn test_config_validation_empty_subject() {
        let mut config = valid_config();
        config.scan.subject = "  ".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("scan.subject"));
    }

    #[test]
    fn test_config_validation_non_ascii_subject() {
        let mut config = valid_config();
        config.scan.subject = "Nouvelle tâche".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be ASCII"));

        config.scan.subject = "Nouvelle t".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_does_not_click_with_browser_handler() {
        let config = Config::example();
        assert_eq!(config.action.handler, "browser");
        assert!(config.links.click_label.is_none());
    }

    #[test]
    fn test_config_validation_interval_zero() {
        let mut config = valid_config();
        config.scan.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_filter_text() {
        let mut config = valid_config();
        config.links.filter_text = Some(String::new());
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("links.filter_text"));

        config.links.filter_text = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_handler() {
        let mut config = valid_config();
        config.action.handler = "selenium".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid action.handler"));

        config.action.handler = "log".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_keepalive_longer_than_refresh() {
        let mut config = valid_config();
        config.connection.keepalive_interval_secs = 1200;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("keepalive_interval_secs"));
    }

    #[test]
    fn test_config_validation_max_attempts_zero() {
        let mut config = valid_config();
        config.connection.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::example();
        config.apply_overrides(|key| match key {
            MAILBOX_PASSWORD_ENV => Some("from-env".to_string()),
            PLATFORM_SECRET_ENV => Some("platform-env".to_string()),
            _ => None,
        });

        assert_eq!(config.mailbox.password, "from-env");
        assert_eq!(config.platform.unwrap().secret, "platform-env");
    }

    #[test]
    fn test_apply_overrides_ignores_empty() {
        let mut config = valid_config();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config.mailbox.password, "app-password");
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auto-accept.toml");

        let config = valid_config();
        config.save(&path).await.unwrap();

        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded.mailbox.username, "you@gmail.com");
        assert_eq!(loaded.scan.subject, "New task");
        assert_eq!(loaded.links.filter_text.as_deref(), Some("Go to task"));
        assert!(loaded.links.click_label.is_none());
        assert_eq!(loaded.platform.unwrap().name, "smartcat");
    }

    #[tokio::test]
    async fn test_config_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(&temp_dir.path().join("missing.toml")).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("init-config"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [mailbox]
            username = "me@example.com"
            password = "secret"

            [scan]
            subject = "Task ready"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.mailbox.host, "imap.gmail.com");
        assert!(config.links.filter_text.is_none());
        assert!(config.platform.is_none());
        assert_eq!(config.ledger.path, PathBuf::from(".auto-accept/processed_emails.json"));
    }
}
