//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use mailbox_engine::{
    Delivery, Error, MailFilter, MailId, MailRecord, MailStore, MailboxService, MailboxState,
    MemoryStore, NewMail, Result, User, UserId,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One captured call to [`Delivery::deliver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records every delivery and always succeeds.
#[derive(Default)]
pub struct RecordingDelivery {
    pub delivered: Mutex<Vec<Delivered>>,
}

impl RecordingDelivery {
    pub fn calls(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, from: &str, to: &[String], subject: &str, body: &str) -> Result<()> {
        self.delivered.lock().unwrap().push(Delivered {
            from: from.to_string(),
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Fails every delivery like an unreachable relay.
pub struct FailingDelivery;

#[async_trait]
impl Delivery for FailingDelivery {
    async fn deliver(&self, _: &str, _: &[String], _: &str, _: &str) -> Result<()> {
        Err(Error::DeliveryFailed("connection refused".into()))
    }
}

/// A [`MemoryStore`] that sleeps between reading and writing overlays,
/// widening the window in which unserialized updates would be lost.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

#[async_trait]
impl MailStore for SlowStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        self.inner.find_user(id).await
    }

    async fn find_mail(&self, filter: &MailFilter) -> Result<Vec<MailRecord>> {
        self.inner.find_mail(filter).await
    }

    async fn find_mail_by_id(&self, id: MailId) -> Result<Option<MailRecord>> {
        self.inner.find_mail_by_id(id).await
    }

    async fn create_mail(&self, mail: NewMail) -> Result<MailRecord> {
        self.inner.create_mail(mail).await
    }

    async fn load_overlay(&self, user: UserId) -> Result<Option<MailboxState>> {
        let state = self.inner.load_overlay(user).await?;
        tokio::time::sleep(self.delay).await;
        Ok(state)
    }

    async fn save_overlay(&self, state: &MailboxState) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.save_overlay(state).await
    }
}

/// A service over a fresh [`MemoryStore`] with a recording relay.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub delivery: Arc<RecordingDelivery>,
    pub service: MailboxService,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(RecordingDelivery::default());
        let service = MailboxService::new(
            Arc::clone(&store) as Arc<dyn MailStore>,
            Arc::clone(&delivery) as Arc<dyn Delivery>,
            "gomail.kurs",
        );
        Self {
            store,
            delivery,
            service,
        }
    }

    pub fn user(&self, email: &str) -> User {
        self.store.add_user(email).unwrap()
    }

    /// Store a record with a raw recipient column, bypassing the codec.
    pub async fn raw_mail(&self, sender: &str, recipients: mailbox_engine::ReceiverBlob) -> MailRecord {
        self.store
            .create_mail(NewMail {
                sender: sender.to_string(),
                recipients,
                subject: "raw".to_string(),
                body: "raw body".to_string(),
            })
            .await
            .unwrap()
    }
}
