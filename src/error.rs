//! Centralized error types for mailrelay.

use std::path::PathBuf;
use thiserror::Error;

use crate::chat::ChatError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::mailbox::MailboxError;

/// All errors produced by the mailrelay library.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The raw bytes could not be parsed as an RFC 5322 message.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A parsed message without a single MIME part.
    #[error("Message has no MIME parts")]
    EmptyMessage,

    /// The message carries no `Message-ID`, so it cannot be deduplicated.
    #[error("Message has no Message-ID header")]
    MissingMessageId,

    /// The reply heuristics could not be initialized.
    #[error("Failed to initialize reply heuristics: {0}")]
    Heuristics(#[from] regex::Error),

    /// Configuration or environment problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Delivery ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Mailbox transport failure.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// Chat transport failure.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// The chat API answered `ok: false`.
    #[error("Chat API rejected the post: {0}")]
    Rejected(String),
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
