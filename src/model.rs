//! Mail records, users and the views built from them

use crate::receivers::ReceiverBlob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifier of an account owned by the authentication subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Identifier of a mail record, assigned monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl FromStr for MailId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for MailId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An account as seen by the engine: only the id and address are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

/// An immutable stored message, shared by every user.
///
/// Recipients are kept in their persisted encoding; visibility for a
/// given user is computed at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRecord {
    pub id: MailId,
    pub sender: String,
    pub recipients: ReceiverBlob,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A mail record before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMail {
    pub sender: String,
    pub recipients: ReceiverBlob,
    pub subject: String,
    pub body: String,
}

/// Inbox and Sent entry with the recipient list decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailView {
    pub id: MailId,
    pub sender: String,
    pub receivers: Vec<String>,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl MailView {
    #[must_use]
    pub fn new(record: MailRecord, receivers: Vec<String>) -> Self {
        Self {
            id: record.id,
            sender: record.sender,
            receivers,
            subject: record.subject,
            body: record.body,
            created_at: record.created_at,
        }
    }
}

/// Trash entry. Sender and recipients are deliberately omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashEntry {
    pub id: MailId,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<MailRecord> for TrashEntry {
    fn from(record: MailRecord) -> Self {
        Self {
            id: record.id,
            subject: record.subject,
            body: record.body,
            created_at: record.created_at,
        }
    }
}
