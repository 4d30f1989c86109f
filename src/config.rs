//! Configuration types.
//!
//! The configuration is read once from a TOML file with `[email]`, `[org]`
//! and optional `[log]` sections and is immutable afterwards. Every
//! component receives the section it needs by reference.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Config file used when no path is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "org-mail-todo.toml";

/// Environment variable that overrides `email.password`.
pub const PASSWORD_ENV: &str = "ORG_MAIL_TODO_PASSWORD";

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_levels_per_heading() -> usize {
    1
}

/// Full scraper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub email: EmailConfig,
    pub org: OrgConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Mailbox connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// IMAP server host name (implicit TLS).
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    #[serde(default = "empty_secret")]
    pub password: SecretString,
    /// Only unread mail from these addresses is turned into todos.
    #[serde(default)]
    pub authorized_senders: Vec<String>,
    /// Mailbox to select.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

/// Outline (org file) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgConfig {
    /// Outline file that receives the new entries.
    pub diary_file: PathBuf,
    /// Property line (e.g. `:TODO-TARGET: true`) marking the parent heading.
    pub todo_target_property_line: String,
    /// Subjects that mean "the title is the first body line".
    #[serde(default)]
    pub todo_subject_keywords: Vec<String>,
    /// Stars added per nesting level. Use 2 for odd-levels-only outlines.
    #[serde(default = "default_levels_per_heading")]
    pub levels_per_heading: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Append log output to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Config {
    /// Read, parse and validate a config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            tracing::debug!("Using mailbox password from {PASSWORD_ENV}");
            config.email.password = SecretString::from(password);
        }

        Ok(config)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("email.server", &self.email.server, "Set the IMAP host name")?;
        require("email.username", &self.email.username, "Set the mailbox login")?;
        require(
            "org.todo_target_property_line",
            &self.org.todo_target_property_line,
            "Set the property line that marks the parent heading, e.g. \":TODO-TARGET: true\"",
        )?;

        if self.org.diary_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "org.diary_file".into(),
                hint: "Set the path of the outline file".into(),
            });
        }

        if self
            .email
            .authorized_senders
            .iter()
            .all(|s| s.trim().is_empty())
        {
            return Err(ConfigError::MissingRequired {
                key: "email.authorized_senders".into(),
                hint: "List at least one sender address allowed to create todos".into(),
            });
        }

        if self.org.levels_per_heading == 0 {
            return Err(ConfigError::InvalidValue {
                key: "org.levels_per_heading".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    /// Authorized senders with blanks removed and whitespace trimmed.
    pub fn senders(&self) -> Vec<String> {
        self.email
            .authorized_senders
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn require(key: &str, value: &str, hint: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: key.into(),
            hint: hint.into(),
        });
    }
    Ok(())
}
