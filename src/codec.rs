//! Reversible encoding of structured values into attribute-safe strings
//!
//! An [`ObjectCodec`] serializes a value to compact JSON, swaps every single
//! quote for a per-codec random marker, and percent-encodes the result. The
//! marker is chosen once, when the codec is built, so every value embedded in
//! one document must go through the same codec, and the consumer must decode
//! with a codec carrying that same marker (see [`ObjectCodec::with_marker`]).
//!
//! Decoding normalizes whitespace: tabs are dropped and raw line breaks become
//! the JSON `\n` escape. Values produced by [`ObjectCodec::encode`] never
//! contain either, so only hand-authored payloads are affected.
//!
//! [`ObjectCodec`]: struct.ObjectCodec.html
//! [`ObjectCodec::encode`]: struct.ObjectCodec.html#method.encode
//! [`ObjectCodec::with_marker`]: struct.ObjectCodec.html#method.with_marker

use crate::error::CodecError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Fixed start of every quote marker
pub const MARKER_PREFIX: &str = "~Q";

/// Fixed end of every quote marker
pub const MARKER_SUFFIX: &str = "Q~";

/// Total length of a quote marker, sentinels included
pub const MARKER_LEN: usize = 16;

/// Characters left alone by `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Encodes and decodes embedded objects for a single document
#[derive(Clone, Debug)]
pub struct ObjectCodec {
    marker: String,
}

impl ObjectCodec {
    /// Creates a codec with a freshly generated marker
    pub fn new() -> Self {
        let random_len = MARKER_LEN - MARKER_PREFIX.len() - MARKER_SUFFIX.len();
        let body: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(random_len)
            .map(char::from)
            .collect();
        ObjectCodec {
            marker: format!("{}{}{}", MARKER_PREFIX, body, MARKER_SUFFIX),
        }
    }

    /// Creates a codec for a document that was encoded with `marker`
    pub fn with_marker<S: Into<String>>(marker: S) -> Self {
        ObjectCodec {
            marker: marker.into(),
        }
    }

    /// The marker standing in for single quotes
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Encodes `value` into a string safe for an attribute or text position
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError> {
        let json = serde_json::to_string(value).map_err(CodecError::Serialize)?;
        let guarded = json.replace('\'', &self.marker);
        Ok(utf8_percent_encode(&guarded, COMPONENT).to_string())
    }

    /// Decodes `text`, reporting why it failed if it does
    pub fn try_decode(&self, text: &str) -> Result<Value, CodecError> {
        let decoded = percent_decode_str(text).decode_utf8()?;
        let normalized = decoded
            .replace('\t', "")
            .replace("\r\n", "\\n")
            .replace('\r', "\\n")
            .replace('\n', "\\n")
            .replace(self.marker.as_str(), "'");
        serde_json::from_str(&normalized).map_err(CodecError::Parse)
    }

    /// Decodes `text`, logging and returning `None` on failure
    pub fn decode(&self, text: &str) -> Option<Value> {
        match self.try_decode(text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "could not decode embedded object");
                None
            }
        }
    }

    /// Decodes `text` straight into `T`
    pub fn decode_as<T: DeserializeOwned>(&self, text: &str) -> Option<T> {
        let value = self.decode(text)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "decoded object has an unexpected shape");
                None
            }
        }
    }
}

impl Default for ObjectCodec {
    fn default() -> Self {
        ObjectCodec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marker_shape() {
        let codec = ObjectCodec::new();
        let marker = codec.marker();
        assert_eq!(marker.len(), MARKER_LEN);
        assert!(marker.starts_with(MARKER_PREFIX));
        assert!(marker.ends_with(MARKER_SUFFIX));
    }

    #[test]
    fn markers_are_fresh_per_codec() {
        let a = ObjectCodec::new();
        let b = ObjectCodec::new();
        assert_ne!(a.marker(), b.marker());
    }

    #[test]
    fn quotes_survive() {
        let codec = ObjectCodec::new();
        let value = json!({ "text": "It's Bob's 'turn'", "n": 3 });
        let encoded = codec.encode(&value).unwrap();
        assert!(!encoded.contains('\''));
        assert!(!encoded.contains('"'));
        assert_eq!(codec.decode(&encoded), Some(value));
    }

    #[test]
    fn other_marker_cannot_restore_quotes() {
        let a = ObjectCodec::new();
        let b = ObjectCodec::new();
        let encoded = a.encode(&json!("'")).unwrap();
        assert_ne!(b.decode(&encoded), Some(json!("'")));
    }

    #[test]
    fn with_marker_decodes_foreign_document() {
        let a = ObjectCodec::new();
        let encoded = a.encode(&json!({"text": "don't"})).unwrap();
        let b = ObjectCodec::with_marker(a.marker());
        assert_eq!(b.decode(&encoded), Some(json!({"text": "don't"})));
    }

    #[test]
    fn tabs_stripped_and_newlines_tokenized() {
        let codec = ObjectCodec::new();
        let raw = "{\"text\":\"one\r\ntwo\nthree\tfour\"}";
        let encoded = utf8_percent_encode(raw, COMPONENT).to_string();
        assert_eq!(
            codec.decode(&encoded),
            Some(json!({"text": "one\ntwo\nthreefour"}))
        );
    }

    #[test]
    fn garbage_decodes_to_none() {
        let codec = ObjectCodec::new();
        assert_eq!(codec.decode("%7Bnot-json"), None);
        assert!(matches!(
            codec.try_decode("%FF%FE"),
            Err(CodecError::Utf8(_))
        ));
    }

    #[test]
    fn decode_as_typed() {
        let codec = ObjectCodec::new();
        let encoded = codec.encode(&vec![1, 2, 3]).unwrap();
        let back: Option<Vec<u32>> = codec.decode_as(&encoded);
        assert_eq!(back, Some(vec![1, 2, 3]));
        let wrong: Option<String> = codec.decode_as(&encoded);
        assert_eq!(wrong, None);
    }
}
