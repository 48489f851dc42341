//! In-process mail store

use super::{MailFilter, MailStore};
use crate::error::{Error, Result};
use crate::model::{MailId, MailRecord, NewMail, User, UserId};
use crate::state::MailboxState;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Everything the store holds. Also the on-disk snapshot format of
/// [`super::JsonFileStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    mails: Vec<MailRecord>,
    #[serde(default)]
    overlays: Vec<MailboxState>,
    #[serde(default)]
    last_user_id: u64,
    #[serde(default)]
    last_mail_id: u64,
}

impl Tables {
    /// Restore the invariants the store relies on after loading a
    /// snapshot: mails ordered by id and id counters past every stored
    /// id.
    pub(crate) fn normalized(mut self) -> Self {
        self.mails.sort_by_key(|m| m.id);
        self.mails.dedup_by_key(|m| m.id);
        if let Some(max) = self.mails.last().map(|m| m.id.0) {
            self.last_mail_id = self.last_mail_id.max(max);
        }
        if let Some(max) = self.users.iter().map(|u| u.id.0).max() {
            self.last_user_id = self.last_user_id.max(max);
        }
        self
    }

    pub(crate) fn insert_user(&mut self, email: &str) -> Result<User> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::InvalidInput("empty email address".into()));
        }
        if self.users.iter().any(|u| u.email == email) {
            return Err(Error::InvalidInput(format!("{email} is already registered")));
        }

        self.last_user_id += 1;
        let user = User {
            id: UserId(self.last_user_id),
            email: email.to_string(),
        };
        self.users.push(user.clone());
        Ok(user)
    }

    pub(crate) fn insert_mail(&mut self, mail: NewMail) -> MailRecord {
        self.last_mail_id += 1;
        let record = MailRecord {
            id: MailId(self.last_mail_id),
            sender: mail.sender,
            recipients: mail.recipients,
            subject: mail.subject,
            body: mail.body,
            created_at: Utc::now(),
        };
        self.mails.push(record.clone());
        record
    }

    pub(crate) fn put_overlay(&mut self, state: &MailboxState) {
        match self
            .overlays
            .iter_mut()
            .find(|o| o.user_id() == state.user_id())
        {
            Some(existing) => existing.clone_from(state),
            None => self.overlays.push(state.clone()),
        }
    }
}

/// A [`MailStore`] that keeps every table in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables.normalized()),
        }
    }

    pub(crate) fn snapshot(&self) -> Result<Tables> {
        Ok(self.read()?.clone())
    }

    pub(crate) fn replace(&self, tables: Tables) -> Result<()> {
        *self.write()? = tables;
        Ok(())
    }

    /// Register an account and return it with its new id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the address is empty or
    /// already taken.
    pub fn add_user(&self, email: &str) -> Result<User> {
        self.write()?.insert_user(email)
    }

    /// All registered accounts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store lock is poisoned.
    pub fn users(&self) -> Result<Vec<User>> {
        Ok(self.read()?.users.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_mail(&self, filter: &MailFilter) -> Result<Vec<MailRecord>> {
        Ok(self
            .read()?
            .mails
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn find_mail_by_id(&self, id: MailId) -> Result<Option<MailRecord>> {
        let tables = self.read()?;
        Ok(tables
            .mails
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|idx| tables.mails[idx].clone()))
    }

    async fn create_mail(&self, mail: NewMail) -> Result<MailRecord> {
        Ok(self.write()?.insert_mail(mail))
    }

    async fn load_overlay(&self, user: UserId) -> Result<Option<MailboxState>> {
        Ok(self
            .read()?
            .overlays
            .iter()
            .find(|o| o.user_id() == user)
            .cloned())
    }

    async fn save_overlay(&self, state: &MailboxState) -> Result<()> {
        self.write()?.put_overlay(state);
        Ok(())
    }
}
