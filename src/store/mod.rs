//! Persistence contract for the mail table, accounts and overlays
//!
//! The engine only needs a handful of operations from its storage
//! driver: filtered reads of the shared mail table, appends to it, and
//! whole-record reads and writes of a user's overlay. Serializing
//! overlay writes per user is the caller's job (see
//! [`crate::MailboxStateStore`]).

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{MailId, MailRecord, NewMail, User, UserId};
use crate::state::MailboxState;
use async_trait::async_trait;

/// Predicate for [`MailStore::find_mail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailFilter {
    /// Every record in the table.
    All,
    /// Records whose sender equals the address exactly.
    Sender(String),
}

impl MailFilter {
    #[must_use]
    pub fn matches(&self, mail: &MailRecord) -> bool {
        match self {
            Self::All => true,
            Self::Sender(address) => mail.sender == *address,
        }
    }
}

#[async_trait]
pub trait MailStore: Send + Sync {
    /// Look up an account by id.
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    /// All mail records matching `filter`, in id order.
    async fn find_mail(&self, filter: &MailFilter) -> Result<Vec<MailRecord>>;

    /// A single mail record, if it exists.
    async fn find_mail_by_id(&self, id: MailId) -> Result<Option<MailRecord>>;

    /// Append a record, assigning its id and creation time.
    async fn create_mail(&self, mail: NewMail) -> Result<MailRecord>;

    /// The stored overlay of a user, if one was ever saved.
    async fn load_overlay(&self, user: UserId) -> Result<Option<MailboxState>>;

    /// Replace the stored overlay of `state.user_id()`.
    async fn save_overlay(&self, state: &MailboxState) -> Result<()>;
}
