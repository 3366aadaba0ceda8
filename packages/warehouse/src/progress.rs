//! Stage progress reporting for the warehouse pipeline.
//!
//! The engine reports through [`ProgressCallback`] and never renders
//! anything itself. The CLI supplies an `indicatif` implementation; tests
//! and library callers use [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from the pipeline.
///
/// Implementations must be `Send + Sync` so a single callback can be
/// shared with rayon worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of pipeline stages (or records) expected.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message shown next to the indicator (usually the stage
    /// name).
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
