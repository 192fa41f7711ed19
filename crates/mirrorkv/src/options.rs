//! Per-engine configuration.

use crate::codec::Codec;
use crate::error::StoreError;
use crate::value::{Snapshot, Value};
use std::sync::Arc;
use tracing::{error, warn};

/// Destination for store errors.
///
/// Every failure the engine encounters goes through exactly one sink call,
/// whether or not the error is also returned to the caller.
#[derive(Clone)]
pub struct LogSink(Arc<dyn Fn(&StoreError) + Send + Sync>);

impl LogSink {
    /// Create a sink from a closure.
    pub fn new(sink: impl Fn(&StoreError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// Report an error to the sink.
    pub fn report(&self, err: &StoreError) {
        (self.0)(err);
    }
}

impl Default for LogSink {
    /// Routes to `tracing`: discarded undecodable data is a warning,
    /// backend and encode failures are errors.
    fn default() -> Self {
        Self::new(|err| match err {
            StoreError::Decode { .. } => {
                warn!(key = err.key(), error = %err, "Discarding undecodable value");
            }
            _ => {
                error!(key = err.key(), error = %err, "Store operation failed");
            }
        })
    }
}

/// Predicate run once per key against the already-persisted snapshot.
pub type InitValidator = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// Options for one engine instantiation.
#[derive(Clone)]
pub struct Options {
    /// Serialization pair; JSON text by default.
    pub codec: Codec,
    /// Error sink; `tracing` by default.
    pub log: LogSink,
    /// Validates a pre-existing persisted value the first time a key is
    /// initialized in a context.
    pub validate_init: Option<InitValidator>,
    /// Absorb cross-context change events (default `true`).
    pub sync: bool,
    /// Swallow backend and encode failures after logging (default `true`).
    /// When `false`, those failures are returned to the caller.
    pub silent: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            log: LogSink::default(),
            validate_init: None,
            sync: true,
            silent: true,
        }
    }
}

impl Options {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value-to-text encoder.
    pub fn with_stringify(
        mut self,
        stringify: impl Fn(&Value) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.codec = self.codec.with_encode(stringify);
        self
    }

    /// Replace the text-to-value decoder.
    pub fn with_parse(
        mut self,
        parse: impl Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.codec = self.codec.with_decode(parse);
        self
    }

    /// Replace the whole codec.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the error sink.
    pub fn with_log(mut self, sink: impl Fn(&StoreError) + Send + Sync + 'static) -> Self {
        self.log = LogSink::new(sink);
        self
    }

    /// Replace the error sink wholesale.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log = sink;
        self
    }

    /// Set the one-time init validator.
    pub fn with_validate_init(
        mut self,
        validator: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validate_init = Some(Arc::new(validator));
        self
    }

    /// Enable or disable cross-context sync.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Enable or disable silent error handling.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn defaults_are_sync_and_silent() {
        let options = Options::default();
        assert!(options.sync);
        assert!(options.silent);
        assert!(options.validate_init.is_none());
    }

    #[test]
    fn builders_replace_fields() {
        let options = Options::new()
            .with_sync(false)
            .with_silent(false)
            .with_validate_init(|snapshot| snapshot.is_some());

        assert!(!options.sync);
        assert!(!options.silent);
        let validator = options.validate_init.unwrap();
        assert!(validator(&Some(Value::Bool(true))));
        assert!(!validator(&None));
    }

    #[test]
    fn custom_sink_receives_reports() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let options = Options::new().with_log(move |err| {
            record.lock().unwrap().push(err.key().to_string());
        });

        let err = StoreError::decode("bad-key", anyhow::anyhow!("nope"));
        options.log.report(&err);

        assert_eq!(seen.lock().unwrap().as_slice(), ["bad-key"]);
    }

    #[test]
    fn stringify_and_parse_reach_the_codec() {
        let options = Options::new()
            .with_stringify(|value| Ok(format!("<{value}>")))
            .with_parse(|raw| {
                let inner = raw.trim_start_matches('<').trim_end_matches('>');
                Ok(serde_json::from_str(inner)?)
            });

        let raw = options
            .codec
            .encode_snapshot(&Some(Value::from(1)))
            .unwrap();
        assert_eq!(raw, "<1>");
        assert_eq!(
            options.codec.decode_raw(Some(&raw)).unwrap(),
            Some(Value::from(1))
        );
    }
}
