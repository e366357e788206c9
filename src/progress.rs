//! Progress-callback trait for phase and step events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the State Manager drives the run. The CLI renders them with a
//! progress bar; tests count them.
//!
//! # Example
//!
//! ```rust
//! use gmkit_pdf2md::{ConversionProgressCallback, ConversionConfig, Phase};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for PageCounter {
//!     fn on_step_complete(&self, phase: Phase, _step: usize, _total: usize) {
//!         if phase == Phase::TextExtraction {
//!             self.pages.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(PageCounter { pages: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::Phase;
use std::sync::Arc;

/// Called by the State Manager as it advances through phases.
///
/// Implementations must be `Send + Sync`: step events of the extraction
/// phases are emitted from the task that collects the worker pool's results.
/// All methods have default no-op implementations.
pub trait ConversionProgressCallback: Send + Sync {
    /// A phase attempt is starting. `attempt` is 1-based.
    fn on_phase_start(&self, phase: Phase, attempt: u32) {
        let _ = (phase, attempt);
    }

    /// One step of a multi-step phase finished (page or issue).
    fn on_step_complete(&self, phase: Phase, step: usize, total: usize) {
        let _ = (phase, step, total);
    }

    /// A phase succeeded.
    fn on_phase_complete(&self, phase: Phase) {
        let _ = phase;
    }

    /// A phase attempt failed. `will_retry` is false once attempts run out.
    fn on_phase_failed(&self, phase: Phase, attempt: u32, error: &str, will_retry: bool) {
        let _ = (phase, attempt, error, will_retry);
    }

    /// The run is about to block on (or suspend for) a human checkpoint.
    fn on_checkpoint(&self, phase: Phase, description: &str) {
        let _ = (phase, description);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        steps: AtomicUsize,
        failures: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_phase_start(&self, _phase: Phase, _attempt: u32) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_step_complete(&self, _phase: Phase, _step: usize, _total: usize) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }

        fn on_phase_failed(&self, _phase: Phase, _attempt: u32, _error: &str, _retry: bool) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_phase_start(Phase::Preflight, 1);
        cb.on_step_complete(Phase::TextExtraction, 1, 3);
        cb.on_phase_failed(Phase::TextExtraction, 1, "disk", true);
        cb.on_checkpoint(Phase::FontMappingReview, "confirm mapping");
        cb.on_phase_complete(Phase::Report);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        };
        tracker.on_phase_start(Phase::ImageExtraction, 1);
        tracker.on_step_complete(Phase::ImageExtraction, 1, 2);
        tracker.on_step_complete(Phase::ImageExtraction, 2, 2);
        tracker.on_phase_failed(Phase::ImageExtraction, 1, "x", true);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.steps.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_phase_start(Phase::Setup, 2);
    }
}
