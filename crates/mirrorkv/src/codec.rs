//! Pluggable serialization between values and raw backend text.
//!
//! The undefined sentinel is handled here, outside the pluggable pair:
//! custom encoders and decoders never see the literal and cannot change
//! its meaning.

use crate::value::{Snapshot, Value, UNDEFINED_LITERAL};
use std::sync::Arc;

/// Encodes a value into the raw text the backend stores.
pub type EncodeFn = Arc<dyn Fn(&Value) -> anyhow::Result<String> + Send + Sync>;

/// Decodes raw backend text into a value.
pub type DecodeFn = Arc<dyn Fn(&str) -> anyhow::Result<Value> + Send + Sync>;

/// An encode/decode pair for one engine.
#[derive(Clone)]
pub struct Codec {
    encode: EncodeFn,
    decode: DecodeFn,
}

impl Codec {
    /// The default codec: compact JSON text.
    pub fn json() -> Self {
        Self {
            encode: Arc::new(|value: &Value| Ok(serde_json::to_string(value)?)),
            decode: Arc::new(|raw: &str| Ok(serde_json::from_str(raw)?)),
        }
    }

    /// Replace the encoder.
    pub fn with_encode(
        mut self,
        encode: impl Fn(&Value) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.encode = Arc::new(encode);
        self
    }

    /// Replace the decoder.
    pub fn with_decode(
        mut self,
        decode: impl Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.decode = Arc::new(decode);
        self
    }

    /// Encode a snapshot for storage.
    ///
    /// The undefined sentinel encodes to its literal without invoking the
    /// encoder.
    pub fn encode_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<String> {
        match snapshot {
            None => Ok(UNDEFINED_LITERAL.to_string()),
            Some(value) => (self.encode)(value),
        }
    }

    /// Decode raw text as read from the backend.
    ///
    /// An absent value and the literal `undefined` both decode to the
    /// sentinel without invoking the decoder.
    pub fn decode_raw(&self, raw: Option<&str>) -> anyhow::Result<Snapshot> {
        match raw {
            None => Ok(None),
            Some(UNDEFINED_LITERAL) => Ok(None),
            Some(text) => (self.decode)(text).map(Some),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_codec_round_trips_json() {
        let codec = Codec::json();
        let snapshot = Some(json!({"name": "test", "count": 3}));

        let raw = codec.encode_snapshot(&snapshot).unwrap();
        let decoded = codec.decode_raw(Some(&raw)).unwrap();

        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn undefined_sentinel_encodes_to_literal() {
        let codec = Codec::json()
            .with_encode(|_| anyhow::bail!("encoder must not run for the sentinel"));

        assert_eq!(codec.encode_snapshot(&None).unwrap(), "undefined");
    }

    #[test]
    fn undefined_literal_decodes_without_decoder() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let codec = Codec::json().with_decode(move |raw| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::from_str(raw)?)
        });

        assert_eq!(codec.decode_raw(Some("undefined")).unwrap(), None);
        assert_eq!(codec.decode_raw(None).unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(codec.decode_raw(Some("5")).unwrap(), Some(json!(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_pair_is_used() {
        let codec = Codec::json()
            .with_encode(|value| Ok(format!("wrapped:{value}")))
            .with_decode(|raw| {
                let stripped = raw.strip_prefix("wrapped:").unwrap_or(raw);
                Ok(serde_json::from_str(stripped)?)
            });

        let raw = codec.encode_snapshot(&Some(json!(7))).unwrap();
        assert_eq!(raw, "wrapped:7");
        assert_eq!(codec.decode_raw(Some(&raw)).unwrap(), Some(json!(7)));
    }

    #[test]
    fn decode_failure_surfaces_error() {
        let codec = Codec::json();
        assert!(codec.decode_raw(Some("{not json")).is_err());
    }
}
