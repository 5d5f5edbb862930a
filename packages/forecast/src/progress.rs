//! Progress reporting for batch forecasts.
//!
//! [`crate::ForecastEngine::predict_many`] reports one unit of work per
//! municipality through a [`ProgressCallback`]. The CLI renders it with an
//! `indicatif` bar; tests and library callers pass [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a long-running forecast batch.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of forecasts in the batch.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` forecasts.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the batch as complete with a final message.
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

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
