//! JSON-file backed mail store

use super::memory::{MemoryStore, Tables};
use super::{MailFilter, MailStore};
use crate::error::Result;
use crate::model::{MailId, MailRecord, NewMail, User, UserId};
use crate::state::MailboxState;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A [`MemoryStore`] whose tables are written to a JSON file on every
/// mutation.
///
/// A mutation is applied to a copy of the tables, written out, and only
/// then made visible. If the write fails the store is left unchanged.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    flush: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not
    /// a valid snapshot.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Tables>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened mail store at {}", path.display());

        Ok(Self {
            path,
            inner: MemoryStore::from_tables(tables),
            flush: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register an account and persist it.
    ///
    /// # Errors
    ///
    /// See [`MemoryStore::add_user`]; also fails if the file cannot be
    /// written.
    pub async fn add_user(&self, email: &str) -> Result<User> {
        self.commit(|tables| tables.insert_user(email)).await
    }

    /// All registered accounts.
    ///
    /// # Errors
    ///
    /// See [`MemoryStore::users`].
    pub fn users(&self) -> Result<Vec<User>> {
        self.inner.users()
    }

    /// Apply `apply` to a copy of the tables, persist the copy, then
    /// swap it in. Mutations are serialized by the flush lock.
    async fn commit<T: Send>(
        &self,
        apply: impl FnOnce(&mut Tables) -> Result<T> + Send,
    ) -> Result<T> {
        let _guard = self.flush.lock().await;
        let mut next = self.inner.snapshot()?;
        let out = apply(&mut next)?;
        self.write_file(&next).await?;
        self.inner.replace(next)?;
        Ok(out)
    }

    async fn write_file(&self, tables: &Tables) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(tables)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            warn!("Failed to write mail store {}: {}", self.path.display(), e);
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MailStore for JsonFileStore {
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
        self.commit(|tables| Ok(tables.insert_mail(mail))).await
    }

    async fn load_overlay(&self, user: UserId) -> Result<Option<MailboxState>> {
        self.inner.load_overlay(user).await
    }

    async fn save_overlay(&self, state: &MailboxState) -> Result<()> {
        self.commit(|tables| {
            tables.put_overlay(state);
            Ok(())
        })
        .await
    }
}
