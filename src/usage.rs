//! Usage telemetry sink.
//!
//! The only process-wide observability hook in the crate. It is an injected
//! value with a no-op default, never a singleton: callers that want telemetry
//! pass their own sink to the trainer or attach one to a model.

use std::sync::Arc;

/// Receiver for coarse usage events.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// training loop and from every single-row inference.
pub trait UsageSink: std::fmt::Debug + Send + Sync {
    /// A training run is starting on `num_examples` examples.
    fn on_training_start(&self, num_examples: u64) {
        let _ = num_examples;
    }

    /// A training run finished, producing `num_trees` trees.
    fn on_training_end(&self, num_examples: u64, num_trees: usize) {
        let _ = (num_examples, num_trees);
    }

    /// `num_examples` examples were scored.
    fn on_inference(&self, num_examples: u64) {
        let _ = num_examples;
    }
}

/// The default sink: drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUsage;

impl UsageSink for NullUsage {}

/// Shared handle to a usage sink.
pub type SharedUsageSink = Arc<dyn UsageSink>;

/// A fresh handle to the null sink.
pub fn null_usage() -> SharedUsageSink {
    Arc::new(NullUsage)
}
