//! Mailbox state store
//!
//! Owns the read-modify-write cycle on each user's overlay record. All
//! mutations for one user run under that user's exclusive section, so
//! concurrent archive/unarchive/delete calls on different mail ids of
//! the same user never lose updates. Different users never contend.

use crate::error::{Error, Result};
use crate::model::{MailId, UserId};
use crate::state::MailboxState;
use crate::store::MailStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type UserLock = Arc<tokio::sync::Mutex<()>>;

pub struct MailboxStateStore {
    store: Arc<dyn MailStore>,
    locks: Mutex<HashMap<UserId, UserLock>>,
}

impl MailboxStateStore {
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The stored overlay of `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxState`] if the user never had one.
    pub async fn get_state(&self, user: UserId) -> Result<MailboxState> {
        self.store
            .load_overlay(user)
            .await?
            .ok_or(Error::NoMailboxState(user))
    }

    /// The stored overlay of `user`, or an empty one if none exists.
    /// Nothing is written.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn state_or_empty(&self, user: UserId) -> Result<MailboxState> {
        Ok(self
            .store
            .load_overlay(user)
            .await?
            .unwrap_or_else(|| MailboxState::new(user)))
    }

    /// Create an empty overlay for `user` unless one exists.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn ensure(&self, user: UserId) -> Result<()> {
        let lock = self.user_lock(user);
        let result = async {
            let _guard = lock.lock().await;
            if self.store.load_overlay(user).await?.is_none() {
                debug!("Creating mailbox state for user {}", user);
                self.store.save_overlay(&MailboxState::new(user)).await?;
            }
            Ok::<_, Error>(())
        }
        .await;
        self.release(user, lock);
        result
    }

    /// Archive `mail` for `user`. Archiving an archived or deleted
    /// mail is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn archive(&self, user: UserId, mail: MailId) -> Result<()> {
        let changed = self.mutate(user, |state| state.archive(mail)).await?;
        debug!("archive user={} mail={} changed={}", user, mail, changed);
        Ok(())
    }

    /// Make an archived mail visible again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotArchived`] if `mail` is not archived for
    /// `user`, or a storage error.
    pub async fn unarchive(&self, user: UserId, mail: MailId) -> Result<()> {
        if self.mutate(user, |state| state.unarchive(mail)).await? {
            debug!("unarchive user={} mail={}", user, mail);
            Ok(())
        } else {
            Err(Error::NotArchived { user, mail })
        }
    }

    /// Move `mail` to the user's trash, dropping any archive mark.
    /// Mail that was never archived is fine.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn soft_delete(&self, user: UserId, mail: MailId) -> Result<()> {
        let changed = self.mutate(user, |state| state.soft_delete(mail)).await?;
        debug!("delete user={} mail={} changed={}", user, mail, changed);
        Ok(())
    }

    /// Load, apply `f`, and save if `f` reports a change, all under the
    /// user's lock.
    async fn mutate<F>(&self, user: UserId, f: F) -> Result<bool>
    where
        F: FnOnce(&mut MailboxState) -> bool + Send,
    {
        let lock = self.user_lock(user);
        let result = async {
            let _guard = lock.lock().await;
            let mut state = self.state_or_empty(user).await?;
            let changed = f(&mut state);
            if changed {
                self.store.save_overlay(&state).await?;
            }
            Ok::<_, Error>(changed)
        }
        .await;
        self.release(user, lock);
        result
    }

    fn user_lock(&self, user: UserId) -> UserLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user).or_default())
    }

    /// Drop a handle from [`Self::user_lock`], removing the map entry
    /// once nobody else holds or waits on it. Handles are only cloned
    /// under the map lock, so a count of one cannot race with a new
    /// waiter.
    fn release(&self, user: UserId, lock: UserLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(&user).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&user);
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
