//! Background ingestion of external mail
//!
//! A [`MessageSource`] hands over new messages; each one becomes a mail
//! record in the shared table, and the messages that were stored are
//! then marked consumed at the source. The periodic job retries by
//! polling: a failed pass is logged and the next tick tries again.

use crate::error::Result;
use crate::model::NewMail;
use crate::receivers::{ReceiverBlob, legacy_address};
use crate::store::MailStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A message decoded from the external mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Source-side identifier used to mark the message consumed.
    pub uid: u32,
    pub from: String,
    /// The `To` header text as received.
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MessageSource: Send {
    /// Messages not yet consumed. Finite per call.
    async fn fetch_new_messages(&mut self) -> Result<Vec<InboundMessage>>;

    /// Mark messages consumed so they are not fetched again.
    async fn mark_consumed(&mut self, uids: &[u32]) -> Result<()>;
}

/// Run one ingestion pass and return the number of stored messages.
///
/// Recipients go through the legacy single-address path: only the
/// first whitespace-separated token of `To` is kept. A message that
/// fails to store stays unconsumed for the next pass.
///
/// # Errors
///
/// Returns an error if fetching from or acknowledging to the source
/// fails. A failed acknowledgement leaves the stored messages at the
/// source, so the next pass stores them again; their UIDs are logged.
pub async fn ingest_once<S>(store: &dyn MailStore, source: &mut S) -> Result<usize>
where
    S: MessageSource + ?Sized,
{
    let messages = source.fetch_new_messages().await?;
    if messages.is_empty() {
        debug!("No new messages");
        return Ok(0);
    }

    let mut consumed = Vec::with_capacity(messages.len());
    for message in messages {
        let uid = message.uid;
        let mail = NewMail {
            recipients: ReceiverBlob::encode(&[legacy_address(&message.to)]),
            sender: message.from,
            subject: message.subject,
            body: message.body,
        };
        match store.create_mail(mail).await {
            Ok(record) => {
                debug!("Stored inbound UID {} as mail {}", uid, record.id);
                consumed.push(uid);
            }
            Err(e) => warn!("Failed to store inbound UID {}: {}", uid, e),
        }
    }

    if !consumed.is_empty() {
        if let Err(e) = source.mark_consumed(&consumed).await {
            warn!(
                "Stored UIDs {:?} but could not mark them consumed; they will be fetched again: {}",
                consumed, e
            );
            return Err(e);
        }
    }
    info!("Ingested {} message(s)", consumed.len());
    Ok(consumed.len())
}

/// Spawn the periodic ingestion job.
///
/// The first pass runs immediately, then once per `interval`, until
/// `cancel` fires.
pub fn spawn_ingestion<S>(
    store: Arc<dyn MailStore>,
    mut source: S,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: MessageSource + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = ingest_once(store.as_ref(), &mut source).await {
                warn!("Error reading emails: {}", e);
            }
        }
        info!("Ingestion stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::store::{MailFilter, MemoryStore};

    #[derive(Default)]
    struct QueueSource {
        pending: Vec<InboundMessage>,
        consumed: Vec<u32>,
        fail_fetch: bool,
        fail_ack: bool,
    }

    #[async_trait]
    impl MessageSource for QueueSource {
        async fn fetch_new_messages(&mut self) -> Result<Vec<InboundMessage>> {
            if self.fail_fetch {
                return Err(Error::Imap("connection refused".into()));
            }
            Ok(self.pending.clone())
        }

        async fn mark_consumed(&mut self, uids: &[u32]) -> Result<()> {
            if self.fail_ack {
                return Err(Error::Imap("expunge failed".into()));
            }
            self.pending.retain(|m| !uids.contains(&m.uid));
            self.consumed.extend_from_slice(uids);
            Ok(())
        }
    }

    fn inbound(uid: u32, to: &str) -> InboundMessage {
        InboundMessage {
            uid,
            from: "ext@example.com".into(),
            to: to.into(),
            subject: format!("message {uid}"),
            body: "hello".into(),
        }
    }

    #[tokio::test]
    async fn stores_and_consumes() {
        let store = MemoryStore::new();
        let mut source = QueueSource {
            pending: vec![inbound(10, "a@gomail.kurs"), inbound(11, "b@gomail.kurs")],
            ..QueueSource::default()
        };

        assert_eq!(ingest_once(&store, &mut source).await.unwrap(), 2);
        assert_eq!(source.consumed, vec![10, 11]);
        assert!(source.pending.is_empty());
        assert_eq!(ingest_once(&store, &mut source).await.unwrap(), 0);

        let mails = store.find_mail(&MailFilter::All).await.unwrap();
        assert_eq!(mails.len(), 2);
        assert_eq!(mails[0].sender, "ext@example.com");
    }

    #[tokio::test]
    async fn keeps_only_first_recipient_token() {
        let store = MemoryStore::new();
        let mut source = QueueSource {
            pending: vec![inbound(1, "a@gomail.kurs b@gomail.kurs")],
            ..QueueSource::default()
        };
        ingest_once(&store, &mut source).await.unwrap();

        let mails = store.find_mail(&MailFilter::All).await.unwrap();
        let receivers = mails[0].recipients.decode().unwrap();
        assert_eq!(receivers.into_addresses(), vec!["a@gomail.kurs"]);
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let store = MemoryStore::new();
        let mut source = QueueSource {
            fail_fetch: true,
            ..QueueSource::default()
        };
        assert!(ingest_once(&store, &mut source).await.is_err());
    }

    #[tokio::test]
    async fn failed_ack_keeps_messages_pending() {
        let store = MemoryStore::new();
        let mut source = QueueSource {
            pending: vec![inbound(3, "a@gomail.kurs")],
            fail_ack: true,
            ..QueueSource::default()
        };

        assert!(matches!(
            ingest_once(&store, &mut source).await,
            Err(Error::Imap(_))
        ));
        assert_eq!(store.find_mail(&MailFilter::All).await.unwrap().len(), 1);
        assert_eq!(source.pending.len(), 1);
        assert!(source.consumed.is_empty());
    }

    #[tokio::test]
    async fn periodic_job_stops_on_cancel() {
        let store: Arc<dyn MailStore> = Arc::new(MemoryStore::new());
        let source = QueueSource {
            pending: vec![inbound(1, "a@gomail.kurs")],
            ..QueueSource::default()
        };
        let cancel = CancellationToken::new();
        let handle = spawn_ingestion(
            Arc::clone(&store),
            source,
            Duration::from_millis(10),
            cancel.clone(),
        );

        for _ in 0..100 {
            if !store.find_mail(&MailFilter::All).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.find_mail(&MailFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn periodic_job_survives_failures() {
        let store: Arc<dyn MailStore> = Arc::new(MemoryStore::new());
        let source = QueueSource {
            fail_fetch: true,
            ..QueueSource::default()
        };
        let cancel = CancellationToken::new();
        let handle = spawn_ingestion(store, source, Duration::from_millis(5), cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        cancel.cancel();
        handle.await.unwrap();
    }
}
