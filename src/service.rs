//! Mailbox views and transitions
//!
//! Inbox, Sent and Trash are computed on every request from the shared
//! mail table and the requesting user's overlay. Nothing is cached.

use crate::delivery::Delivery;
use crate::error::{Error, Result};
use crate::membership;
use crate::model::{MailId, MailRecord, MailView, NewMail, TrashEntry, User, UserId};
use crate::overlay::MailboxStateStore;
use crate::receivers::{ReceiverBlob, Receivers};
use crate::state::MailboxState;
use crate::store::{MailFilter, MailStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-user mailbox operations over a shared [`MailStore`].
pub struct MailboxService {
    store: Arc<dyn MailStore>,
    states: MailboxStateStore,
    delivery: Arc<dyn Delivery>,
    local_domain: String,
}

impl MailboxService {
    #[must_use]
    pub fn new(
        store: Arc<dyn MailStore>,
        delivery: Arc<dyn Delivery>,
        local_domain: impl Into<String>,
    ) -> Self {
        Self {
            states: MailboxStateStore::new(Arc::clone(&store)),
            store,
            delivery,
            local_domain: local_domain.into().trim().to_string(),
        }
    }

    /// The overlay store backing archive and delete.
    #[must_use]
    pub const fn states(&self) -> &MailboxStateStore {
        &self.states
    }

    /// Visible mail addressed to the user.
    ///
    /// A record whose recipient list cannot be decoded is skipped and
    /// logged; the rest of the listing still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownUser`] if the account does not exist, or
    /// a storage error.
    pub async fn get_inbox(&self, user_id: UserId) -> Result<Vec<MailView>> {
        let user = self.user(user_id).await?;
        let state = self.states.state_or_empty(user_id).await?;
        let mails = self.store.find_mail(&MailFilter::All).await?;

        let inbox: Vec<MailView> = mails
            .into_iter()
            .filter(|mail| state.is_visible(mail.id))
            .filter_map(|mail| {
                let receivers = decode_or_skip(&mail)?;
                membership::matches(&receivers, &user.email)
                    .then(|| MailView::new(mail, receivers.into_addresses()))
            })
            .collect();

        debug!("Inbox of user {} has {} mail(s)", user_id, inbox.len());
        Ok(inbox)
    }

    /// Visible mail sent by the user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownUser`] if the account does not exist, or
    /// a storage error.
    pub async fn get_sent(&self, user_id: UserId) -> Result<Vec<MailView>> {
        let user = self.user(user_id).await?;
        let state = self.states.state_or_empty(user_id).await?;
        let mails = self
            .store
            .find_mail(&MailFilter::Sender(user.email.clone()))
            .await?;

        Ok(visible_views(&state, mails))
    }

    /// Mail the user moved to the trash, in id order.
    ///
    /// A user without any mailbox state has an empty trash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingMailReference`] if the trash names a mail
    /// id that no longer exists, or a storage error.
    pub async fn get_trash(&self, user_id: UserId) -> Result<Vec<TrashEntry>> {
        let state = match self.states.get_state(user_id).await {
            Ok(state) => state,
            Err(Error::NoMailboxState(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut trash = Vec::new();
        for mail_id in state.deleted() {
            let mail = self
                .store
                .find_mail_by_id(mail_id)
                .await?
                .ok_or(Error::DanglingMailReference {
                    user: user_id,
                    mail: mail_id,
                })?;
            trash.push(TrashEntry::from(mail));
        }
        Ok(trash)
    }

    /// Hide a mail from the user's Inbox and Sent views.
    ///
    /// The mail id is not checked against the user's mail.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn archive_mail(&self, user_id: UserId, mail_id: MailId) -> Result<()> {
        self.states.archive(user_id, mail_id).await
    }

    /// Bring an archived mail back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotArchived`] if the mail is not archived.
    pub async fn unarchive_mail(&self, user_id: UserId, mail_id: MailId) -> Result<()> {
        self.states.unarchive(user_id, mail_id).await
    }

    /// Move a mail to the user's trash.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn delete_mail(&self, user_id: UserId, mail_id: MailId) -> Result<()> {
        self.states.soft_delete(user_id, mail_id).await
    }

    /// Send a mail from the user and record it.
    ///
    /// Addresses outside the local domain are delivered first; the
    /// record is only created once delivery succeeded. Local addresses
    /// see the mail through their Inbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty or blank receiver,
    /// [`Error::UnknownUser`] for a missing account, the delivery error
    /// if relaying fails, or a storage error.
    pub async fn send_mail(
        &self,
        user_id: UserId,
        receivers: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<MailRecord> {
        let receivers: Vec<String> = receivers.into_iter().map(|r| r.trim().to_string()).collect();
        if receivers.is_empty() {
            return Err(Error::InvalidInput("no receivers".into()));
        }
        if receivers.iter().any(String::is_empty) {
            return Err(Error::InvalidInput("blank receiver address".into()));
        }

        let user = self.user(user_id).await?;
        let subject = subject.into();
        let body = body.into();

        let external: Vec<String> = receivers
            .iter()
            .filter(|r| !self.is_local(r))
            .cloned()
            .collect();
        if !external.is_empty() {
            self.delivery
                .deliver(&user.email, &external, &subject, &body)
                .await?;
        }

        let record = self
            .store
            .create_mail(NewMail {
                sender: user.email,
                recipients: ReceiverBlob::encode(&receivers),
                subject,
                body,
            })
            .await?;

        info!(
            "Stored mail {} ({} local, {} relayed)",
            record.id,
            receivers.len() - external.len(),
            external.len()
        );
        Ok(record)
    }

    /// An empty local domain makes every address external.
    fn is_local(&self, address: &str) -> bool {
        !self.local_domain.is_empty() && address.contains(&self.local_domain)
    }

    async fn user(&self, user_id: UserId) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(Error::UnknownUser(user_id))
    }
}

fn visible_views(state: &MailboxState, mails: Vec<MailRecord>) -> Vec<MailView> {
    mails
        .into_iter()
        .filter(|mail| state.is_visible(mail.id))
        .filter_map(|mail| {
            let receivers = decode_or_skip(&mail)?;
            Some(MailView::new(mail, receivers.into_addresses()))
        })
        .collect()
}

fn decode_or_skip(mail: &MailRecord) -> Option<Receivers> {
    match mail.recipients.decode() {
        Ok(receivers) => Some(receivers),
        Err(e) => {
            warn!("Skipping mail {}: {}", mail.id, e);
            None
        }
    }
}
