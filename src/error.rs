//! Error types for org-mail-todo.

use std::path::PathBuf;

/// Top-level error type for a scrape run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Outline patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Mailbox (IMAP) errors. Any of these aborts the run before the outline is touched.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox {server} unavailable: {reason}")]
    Unavailable { server: String, reason: String },

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("Unexpected response to {command}: {response}")]
    Protocol { command: String, response: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors turning a raw message into a task item.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },
}

/// Errors splicing task items into the outline.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Anchor property {anchor:?} not found in outline")]
    AnchorNotFound { anchor: String },

    #[error("Property block opened by {anchor:?} at line {line} has no :END: terminator")]
    UnterminatedPropertyBlock { anchor: String, line: usize },
}

/// Errors reading, backing up or replacing the outline file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Diary file {path} is not available: {source}")]
    DiaryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to back up {path} to {backup}: {source}")]
    Backup {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path} (original kept at {backup}): {source}")]
    Write {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for a scrape run.
pub type Result<T> = std::result::Result<T, Error>;
