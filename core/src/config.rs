//! Configuration management for Gmailbox

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GmailboxError, GmailboxResult};
use crate::{GMAIL_DOMAIN, GMAIL_IMAP_HOST, GMAIL_IMAP_PORT, GMAIL_SMTP_HOST, GMAIL_SMTP_PORT};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IMAP server settings
    pub imap: ServerConfig,
    /// SMTP server settings
    pub smtp: ServerConfig,
    /// Session behaviour
    pub session: SessionConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Address of a mail server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name
    pub host: String,
    /// TCP port
    pub port: u16,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Domain appended to usernames given without one
    pub default_domain: String,
    /// Fetch bodies immediately when searching
    pub prefetch: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level, overridden by `RUST_LOG`
    pub level: String,
}

impl ServerConfig {
    /// Create a server address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::gmail()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_domain: GMAIL_DOMAIN.to_string(),
            prefetch: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default settings for a Gmail account
    pub fn gmail() -> Self {
        Self {
            imap: ServerConfig::new(GMAIL_IMAP_HOST, GMAIL_IMAP_PORT),
            smtp: ServerConfig::new(GMAIL_SMTP_HOST, GMAIL_SMTP_PORT),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from file
    pub fn load(config_path: &Path) -> GmailboxResult<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::gmail())
        }
    }

    /// Save configuration to file
    pub fn save(&self, config_path: &Path) -> GmailboxResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables on top of the Gmail defaults
    pub fn load_from_env() -> Self {
        let mut config = Config::gmail();
        config.apply_env();
        config
    }

    /// Override fields from `GMAILBOX_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("GMAILBOX_IMAP_HOST") {
            self.imap.host = host;
        }

        if let Ok(port) = std::env::var("GMAILBOX_IMAP_PORT") {
            if let Ok(port) = port.parse() {
                self.imap.port = port;
            }
        }

        if let Ok(host) = std::env::var("GMAILBOX_SMTP_HOST") {
            self.smtp.host = host;
        }

        if let Ok(port) = std::env::var("GMAILBOX_SMTP_PORT") {
            if let Ok(port) = port.parse() {
                self.smtp.port = port;
            }
        }

        if let Ok(domain) = std::env::var("GMAILBOX_DEFAULT_DOMAIN") {
            self.session.default_domain = domain;
        }

        if let Ok(prefetch) = std::env::var("GMAILBOX_PREFETCH") {
            self.session.prefetch = prefetch == "1" || prefetch.to_lowercase() == "true";
        }

        if let Ok(level) = std::env::var("GMAILBOX_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Install the global tracing subscriber at `logging.level`.
    ///
    /// `RUST_LOG` still takes precedence. Fails if a subscriber is already set.
    pub fn init_logging(&self) -> GmailboxResult<()> {
        crate::init_logging(&self.logging.level)
    }

    /// Validate the configuration
    pub fn validate(&self) -> GmailboxResult<()> {
        for (name, server) in [("IMAP", &self.imap), ("SMTP", &self.smtp)] {
            if server.host.trim().is_empty() {
                return Err(GmailboxError::config(format!("{} host cannot be empty", name)));
            }
            if server.port == 0 {
                return Err(GmailboxError::config(format!("{} port cannot be zero", name)));
            }
        }

        if self.session.default_domain.contains('@') {
            return Err(GmailboxError::config("Default domain must not contain '@'"));
        }

        Ok(())
    }
}
