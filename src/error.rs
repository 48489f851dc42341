//! Error types for mailbox-engine

use crate::model::{MailId, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt receiver list: {0}")]
    CorruptReceiverList(String),

    #[error("No mailbox state for user {0}")]
    NoMailboxState(UserId),

    #[error("Mail {mail} is not archived for user {user}")]
    NotArchived { user: UserId, mail: MailId },

    #[error("Mailbox of user {user} references missing mail {mail}")]
    DanglingMailReference { user: UserId, mail: MailId },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Transport status the routing layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::UnknownUser(_) => 401,
            Self::InvalidInput(_) | Self::NotArchived { .. } => 400,
            Self::CorruptReceiverList(_)
            | Self::NoMailboxState(_)
            | Self::DanglingMailReference { .. }
            | Self::DeliveryFailed(_)
            | Self::Storage(_)
            | Self::Imap(_)
            | Self::Parse(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Tls(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("JSON: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
