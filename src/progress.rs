//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring a render,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`] for
//! progress snapshots. Progress is reported once per image: after an image's
//! block of frames has been written, never in the middle of it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use slidereel::{
//!     Mode, Pipeline, ProgressCallback, ProgressInfo, RenderOptions, RenderRequest,
//!     SlideReelError,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{}] {:.1}% complete", info.stage, info.percentage);
//!     }
//! }
//!
//! let request = RenderRequest::new(vec!["a.png".into(), "b.png".into()], Mode::Shorts, "out.mp4");
//! let options = RenderOptions::new().with_progress(Arc::new(PrintProgress));
//! Pipeline::run(&request, &options)?;
//! # Ok::<(), SlideReelError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The stage of a render a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Stage {
    /// Normalizing images and encoding their frames.
    Encoding,
    /// Aligning the audio track and muxing it with the video.
    Muxing,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Stage::Encoding => f.write_str("encoding"),
            Stage::Muxing => f.write_str("muxing"),
        }
    }
}

/// A snapshot of render progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Which stage is reporting.
    pub stage: Stage,
    /// Units finished so far. For [`Stage::Encoding`] this is images written.
    pub completed: u64,
    /// Units expected in this stage.
    pub total: u64,
    /// Completion percentage (0.0 – 100.0).
    pub percentage: f32,
    /// Wall-clock time since the stage started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// Output timestamp reached, when the stage has one.
    pub position: Option<Duration>,
}

/// Trait for receiving progress updates during a render.
///
/// Implementations must be [`Send`] and [`Sync`] because renders may run on
/// a worker thread (see [`Pipeline::spawn`](crate::Pipeline::spawn)).
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// render. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called after each unit of work completes.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call [`cancel`](CancellationToken::cancel)
/// from any thread to request cancellation of the associated render.
/// The encoder checks [`is_cancelled`](CancellationToken::is_cancelled)
/// between images, so a render stops at most one image after the request.
///
/// # Example
///
/// ```
/// use slidereel::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// // From another thread (or a UI button handler):
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks progress timing for one stage and emits callbacks.
///
/// `completed` only ever grows; calling [`advance`](Self::advance) past
/// `total` is clamped.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    stage: Stage,
    total: u64,
    completed: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, stage: Stage, total: u64) -> Self {
        Self {
            callback,
            stage,
            total,
            completed: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one completed unit and report it.
    pub(crate) fn advance(&mut self, position: Option<Duration>) {
        self.completed = (self.completed + 1).min(self.total);
        self.report(position);
    }

    #[cfg(test)]
    pub(crate) fn completed(&self) -> u64 {
        self.completed
    }

    fn report(&self, position: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = if self.total > 0 {
            (self.completed as f32 / self.total as f32) * 100.0
        } else {
            100.0
        };

        let estimated_remaining = if self.completed > 0 {
            let remaining = self.total.saturating_sub(self.completed);
            let per_item = elapsed / self.completed as u32;
            Some(per_item * remaining as u32)
        } else {
            None
        };

        let info = ProgressInfo {
            stage: self.stage,
            completed: self.completed,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            position,
        };

        self.callback.on_progress(&info);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, u64)>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push((info.completed, info.total));
        }
    }

    #[test]
    fn tracker_reports_each_unit_and_clamps() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Stage::Encoding, 2);
        tracker.advance(None);
        tracker.advance(None);
        tracker.advance(None);

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![(1, 2), (2, 2), (2, 2)]);
        assert_eq!(tracker.completed(), 2);
    }
}
