//! Recipient membership

use crate::error::Result;
use crate::model::MailRecord;
use crate::receivers::Receivers;

/// Whether `candidate` is an intended recipient of `mail`.
///
/// List-shaped recipients need an exact, case-sensitive element match.
/// Legacy single-string recipients match when `candidate` occurs
/// anywhere inside the string.
///
/// # Errors
///
/// Propagates [`crate::Error::CorruptReceiverList`] from decoding.
pub fn is_recipient(mail: &MailRecord, candidate: &str) -> Result<bool> {
    Ok(matches(&mail.recipients.decode()?, candidate))
}

/// Membership test on an already-decoded list.
#[must_use]
pub fn matches(receivers: &Receivers, candidate: &str) -> bool {
    match receivers {
        Receivers::List(addresses) => addresses.iter().any(|a| a == candidate),
        Receivers::Single(text) => text.contains(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::model::MailId;
    use crate::receivers::ReceiverBlob;
    use chrono::Utc;

    fn mail_with(recipients: ReceiverBlob) -> MailRecord {
        MailRecord {
            id: MailId(1),
            sender: "s@x".into(),
            recipients,
            subject: String::new(),
            body: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn list_requires_exact_match() {
        let mail = mail_with(ReceiverBlob::encode(&["a@x", "b@y"]));
        assert!(is_recipient(&mail, "a@x").unwrap());
        assert!(is_recipient(&mail, "b@y").unwrap());
        assert!(!is_recipient(&mail, "a@xyz").unwrap());
        assert!(!is_recipient(&mail, "A@X").unwrap());
    }

    #[test]
    fn legacy_string_uses_substring() {
        let mail = mail_with(ReceiverBlob::from_raw("a@x extra"));
        assert!(is_recipient(&mail, "a@x").unwrap());
        assert!(is_recipient(&mail, "extra").unwrap());
        assert!(!is_recipient(&mail, "b@y").unwrap());
    }

    #[test]
    fn corrupt_recipients_propagate() {
        let mail = mail_with(ReceiverBlob::from_raw("{broken"));
        assert!(matches!(
            is_recipient(&mail, "a@x"),
            Err(Error::CorruptReceiverList(_))
        ));
    }
}
