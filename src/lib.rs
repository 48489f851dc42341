//! Mailbox state engine for a webmail backend
//!
//! Derives per-user Inbox, Sent and Trash views from a single shared
//! table of mail records and a per-user overlay of archived and deleted
//! mail ids. Visibility is computed on every read: recipients are
//! decoded with the [`ReceiverBlob`] codec (which still reads the
//! legacy storage shapes) and matched against the user's address.
//!
//! Storage, outbound delivery and the external mailbox are reached
//! through the [`MailStore`], [`Delivery`] and [`MessageSource`]
//! traits. Implementations are provided for an in-memory or JSON-file
//! store, SMTP relaying and IMAP polling.

mod config;
mod delivery;
mod error;
mod imap;
mod ingest;
mod membership;
mod model;
mod overlay;
mod receivers;
mod service;
mod state;
mod store;

pub use config::{EngineConfig, ImapConfig, ImapSecurity, SmtpConfig};
pub use delivery::{Delivery, SmtpDelivery};
pub use error::{Error, Result};
pub use imap::{ImapSource, parse_message};
pub use ingest::{InboundMessage, MessageSource, ingest_once, spawn_ingestion};
pub use membership::is_recipient;
pub use model::{MailId, MailRecord, MailView, NewMail, TrashEntry, User, UserId};
pub use overlay::MailboxStateStore;
pub use receivers::{ReceiverBlob, Receivers, legacy_address};
pub use service::MailboxService;
pub use state::{MailState, MailboxState};
pub use store::{JsonFileStore, MailFilter, MailStore, MemoryStore};
pub use tokio_util::sync::CancellationToken;
