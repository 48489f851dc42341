//! Receiver-list codec
//!
//! Recipients are persisted as a JSON object `{"Bytes": "<base64>"}`
//! whose payload is a JSON array of addresses. Older rows use two other
//! shapes that must still be readable:
//!
//! - the same envelope, but the payload is a single JSON string;
//! - no envelope at all, just the plain-text address.
//!
//! Writes always produce the canonical array form.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The persisted recipient column, kept opaque until decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiverBlob(String);

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Bytes")]
    bytes: String,
}

/// A decoded recipient list, tagged by the shape it was stored in.
///
/// Membership checks branch on the tag: a [`Receivers::List`] needs an
/// exact element match, a [`Receivers::Single`] is tested by substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receivers {
    /// Canonical form: an ordered list of addresses.
    List(Vec<String>),
    /// Legacy form: one string, possibly holding several addresses.
    Single(String),
}

impl Receivers {
    /// Whether this came from one of the legacy single-string shapes.
    #[must_use]
    pub const fn is_single_string(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Split into the address sequence and the single-string flag.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, bool) {
        match self {
            Self::List(addresses) => (addresses, false),
            Self::Single(address) => (vec![address], true),
        }
    }

    #[must_use]
    pub fn into_addresses(self) -> Vec<String> {
        self.into_parts().0
    }
}

impl ReceiverBlob {
    /// Encode addresses in the canonical form.
    ///
    /// An empty slice yields a valid envelope around `[]`.
    #[must_use]
    pub fn encode<S: AsRef<str>>(addresses: &[S]) -> Self {
        let payload = Value::Array(
            addresses
                .iter()
                .map(|a| Value::String(a.as_ref().to_owned()))
                .collect(),
        )
        .to_string();
        let envelope = json!({ "Bytes": BASE64_STANDARD.encode(payload) });
        Self(envelope.to_string())
    }

    /// Wrap a column value exactly as it was read from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the column, accepting every known shape.
    ///
    /// The array payload is tried before the string payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptReceiverList`] when the column is empty,
    /// the envelope or base64 is malformed, or the payload is neither a
    /// string array nor a string.
    pub fn decode(&self) -> Result<Receivers> {
        let text = self.0.trim();
        if text.is_empty() {
            return Err(Error::CorruptReceiverList("empty receiver column".into()));
        }

        // Pre-codec rows hold the address itself.
        if !text.starts_with('{') {
            return Ok(Receivers::Single(text.to_owned()));
        }

        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| Error::CorruptReceiverList(format!("envelope: {e}")))?;
        let payload = BASE64_STANDARD
            .decode(envelope.bytes.trim())
            .map_err(|e| Error::CorruptReceiverList(format!("base64: {e}")))?;

        if let Ok(addresses) = serde_json::from_slice::<Vec<String>>(&payload) {
            return Ok(Receivers::List(addresses));
        }
        serde_json::from_slice::<String>(&payload)
            .map(Receivers::Single)
            .map_err(|e| Error::CorruptReceiverList(format!("payload: {e}")))
    }
}

/// The address kept from a whitespace-delimited legacy `To` text.
///
/// Only the first token survives; anything after it is discarded.
#[must_use]
pub fn legacy_address(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_around(payload: &str) -> ReceiverBlob {
        ReceiverBlob::from_raw(json!({ "Bytes": BASE64_STANDARD.encode(payload) }).to_string())
    }

    #[test]
    fn canonical_round_trip() {
        let addresses = vec!["a@x".to_string(), "b@y".to_string()];
        let decoded = ReceiverBlob::encode(&addresses).decode().unwrap();
        assert_eq!(decoded.into_parts(), (addresses, false));
    }

    #[test]
    fn canonical_shape_on_disk() {
        let blob = ReceiverBlob::encode(&["a@x"]);
        let value: Value = serde_json::from_str(blob.as_str()).unwrap();
        let bytes = value["Bytes"].as_str().unwrap();
        assert_eq!(BASE64_STANDARD.decode(bytes).unwrap(), br#"["a@x"]"#);
    }

    #[test]
    fn empty_list_is_valid() {
        let decoded = ReceiverBlob::encode::<&str>(&[]).decode().unwrap();
        assert_eq!(decoded, Receivers::List(vec![]));
    }

    #[test]
    fn bare_json_string_payload() {
        let decoded = envelope_around(r#""the string""#).decode().unwrap();
        assert!(decoded.is_single_string());
        assert_eq!(decoded.into_parts(), (vec!["the string".to_string()], true));
    }

    #[test]
    fn plain_text_column() {
        let decoded = ReceiverBlob::from_raw(" a@x extra ").decode().unwrap();
        assert_eq!(decoded, Receivers::Single("a@x extra".into()));
    }

    #[test]
    fn corrupt_columns() {
        let cases = [
            ReceiverBlob::from_raw(""),
            ReceiverBlob::from_raw("{not json"),
            ReceiverBlob::from_raw(r#"{"Other": "x"}"#),
            ReceiverBlob::from_raw(r#"{"Bytes": "%%%"}"#),
            envelope_around("42"),
            envelope_around("[1, 2]"),
        ];
        for blob in cases {
            assert!(
                matches!(blob.decode(), Err(Error::CorruptReceiverList(_))),
                "expected corrupt: {blob:?}"
            );
        }
    }

    #[test]
    fn legacy_address_keeps_first_token() {
        assert_eq!(legacy_address("a@x b@y"), "a@x");
        assert_eq!(legacy_address("  a@x\tb@y"), "a@x");
        assert_eq!(legacy_address(""), "");
    }
}
