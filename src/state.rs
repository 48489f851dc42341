//! Per-user mailbox state
//!
//! Each user owns one overlay over the shared mail table recording
//! which mail ids they archived or moved to trash. The overlay is a map
//! keyed by mail id, so a mail is in at most one state and removal
//! never depends on positions in a list.
//!
//! On disk the overlay keeps its historical shape: two integer lists,
//! `archived` and `deleted`. Loading collapses duplicates and lets
//! `deleted` win over `archived`.

use crate::model::{MailId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of one mail item from one user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MailState {
    /// No overlay entry: the item shows up in Inbox or Sent.
    Visible,
    /// Hidden from Inbox and Sent until unarchived.
    Archived,
    /// In the trash. Terminal.
    Deleted,
}

/// The archive/delete overlay of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OverlayRecord", into = "OverlayRecord")]
pub struct MailboxState {
    user_id: UserId,
    marks: BTreeMap<MailId, MailState>,
}

impl MailboxState {
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            marks: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn state_of(&self, mail: MailId) -> MailState {
        self.marks.get(&mail).copied().unwrap_or(MailState::Visible)
    }

    #[must_use]
    pub fn is_visible(&self, mail: MailId) -> bool {
        self.state_of(mail) == MailState::Visible
    }

    /// Archived ids in ascending order.
    pub fn archived(&self) -> impl Iterator<Item = MailId> + '_ {
        self.ids_in(MailState::Archived)
    }

    /// Deleted ids in ascending order.
    pub fn deleted(&self) -> impl Iterator<Item = MailId> + '_ {
        self.ids_in(MailState::Deleted)
    }

    /// Mark a visible mail archived. Returns whether anything changed;
    /// archived or deleted mail is left alone.
    pub fn archive(&mut self, mail: MailId) -> bool {
        if self.is_visible(mail) {
            self.marks.insert(mail, MailState::Archived);
            true
        } else {
            false
        }
    }

    /// Make an archived mail visible again. Returns `false` when the
    /// mail was not archived.
    pub fn unarchive(&mut self, mail: MailId) -> bool {
        if self.state_of(mail) == MailState::Archived {
            self.marks.remove(&mail);
            true
        } else {
            false
        }
    }

    /// Move a mail to the trash, dropping any archive mark first.
    /// Returns whether anything changed.
    pub fn soft_delete(&mut self, mail: MailId) -> bool {
        self.marks.insert(mail, MailState::Deleted) != Some(MailState::Deleted)
    }

    fn ids_in(&self, state: MailState) -> impl Iterator<Item = MailId> + '_ {
        self.marks
            .iter()
            .filter(move |(_, s)| **s == state)
            .map(|(id, _)| *id)
    }
}

#[derive(Serialize, Deserialize)]
struct OverlayRecord {
    user_id: UserId,
    #[serde(default)]
    archived: Vec<MailId>,
    #[serde(default)]
    deleted: Vec<MailId>,
}

impl From<OverlayRecord> for MailboxState {
    fn from(record: OverlayRecord) -> Self {
        let mut state = Self::new(record.user_id);
        for id in record.archived {
            state.archive(id);
        }
        for id in record.deleted {
            state.soft_delete(id);
        }
        state
    }
}

impl From<MailboxState> for OverlayRecord {
    fn from(state: MailboxState) -> Self {
        Self {
            user_id: state.user_id,
            archived: state.archived().collect(),
            deleted: state.deleted().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> MailboxState {
        MailboxState::new(UserId(1))
    }

    #[test]
    fn fresh_mail_is_visible() {
        assert_eq!(state().state_of(MailId(5)), MailState::Visible);
    }

    #[test]
    fn archive_then_unarchive_restores_visible() {
        let mut s = state();
        assert!(s.archive(MailId(5)));
        assert_eq!(s.state_of(MailId(5)), MailState::Archived);
        assert!(s.unarchive(MailId(5)));
        assert!(s.is_visible(MailId(5)));
    }

    #[test]
    fn archive_is_idempotent() {
        let mut s = state();
        assert!(s.archive(MailId(5)));
        assert!(!s.archive(MailId(5)));
        assert_eq!(s.archived().collect::<Vec<_>>(), vec![MailId(5)]);
    }

    #[test]
    fn unarchive_of_unknown_mail_reports_false() {
        let mut s = state();
        s.archive(MailId(1));
        assert!(!s.unarchive(MailId(5)));
        assert_eq!(s.archived().collect::<Vec<_>>(), vec![MailId(1)]);
    }

    #[test]
    fn soft_delete_moves_archived_to_deleted() {
        let mut s = state();
        s.archive(MailId(5));
        assert!(s.soft_delete(MailId(5)));
        assert_eq!(s.archived().count(), 0);
        assert_eq!(s.deleted().collect::<Vec<_>>(), vec![MailId(5)]);
        assert!(!s.soft_delete(MailId(5)));
    }

    #[test]
    fn deleted_is_terminal() {
        let mut s = state();
        s.soft_delete(MailId(5));
        assert!(!s.archive(MailId(5)));
        assert!(!s.unarchive(MailId(5)));
        assert_eq!(s.state_of(MailId(5)), MailState::Deleted);
    }

    #[test]
    fn serializes_as_two_lists() {
        let mut s = state();
        s.archive(MailId(3));
        s.archive(MailId(1));
        s.soft_delete(MailId(2));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "user_id": 1, "archived": [1, 3], "deleted": [2] })
        );
    }

    #[test]
    fn legacy_lists_are_normalized() {
        let s: MailboxState = serde_json::from_str(
            r#"{ "user_id": 9, "archived": [4, 4, 7], "deleted": [7, 8, 8] }"#,
        )
        .unwrap();
        assert_eq!(s.user_id(), UserId(9));
        assert_eq!(s.archived().collect::<Vec<_>>(), vec![MailId(4)]);
        assert_eq!(s.deleted().collect::<Vec<_>>(), vec![MailId(7), MailId(8)]);
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let s: MailboxState = serde_json::from_str(r#"{ "user_id": 2 }"#).unwrap();
        assert_eq!(s, MailboxState::new(UserId(2)));
    }
}
