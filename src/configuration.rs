//! Render configuration.
//!
//! Fixed constants that define the output profile, the [`Mode`] selector, the
//! canvas and fit policies, and [`RenderOptions`], a builder that threads
//! progress callbacks, cancellation tokens, and encoder tuning through a run
//! without polluting every function signature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use slidereel::{
//!     CancellationToken, CanvasPolicy, FitPolicy, ProgressCallback, ProgressInfo, RenderOptions,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {}/{}", info.stage, info.completed, info.total);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = RenderOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_canvas_policy(CanvasPolicy::LargestImage)
//!     .with_fit_policy(FitPolicy::BlurredBackground);
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::encode::VideoEncoderOptions;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Frames per second used for every render.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Display time of each image in Shorts mode, in seconds.
pub const SHORTS_SECONDS_PER_IMAGE: f64 = 1.0;

/// Upper bound on the total length of a Shorts video.
pub const SHORTS_MAX_DURATION: Duration = Duration::from_secs(60);

/// Sample rate of the muxed audio track.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Bit rate of the muxed AAC audio track, in bits per second.
pub const AUDIO_BIT_RATE: usize = 128_000;

/// FFmpeg muxer name for the output container.
pub const CONTAINER_FORMAT: &str = "mp4";

/// Canvas used by [`CanvasPolicy::ModePreset`] for regular videos.
pub const LANDSCAPE_CANVAS: (u32, u32) = (1920, 1080);

/// Canvas used by [`CanvasPolicy::ModePreset`] for Shorts.
pub const PORTRAIT_CANVAS: (u32, u32) = (1080, 1920);

/// Duration regime of a render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Short-form profile: one second per image, at most
    /// [`SHORTS_MAX_DURATION`] in total. Images past the cap are dropped.
    Shorts,
    /// Every image is shown for the same caller-chosen time.
    Regular {
        /// Display time of each image, in seconds. Must be positive.
        seconds_per_image: f64,
    },
}

impl Mode {
    /// Convenience constructor for [`Mode::Regular`].
    pub fn regular(seconds_per_image: f64) -> Self {
        Mode::Regular { seconds_per_image }
    }

    /// Display time of each image, in seconds.
    pub fn seconds_per_image(&self) -> f64 {
        match self {
            Mode::Shorts => SHORTS_SECONDS_PER_IMAGE,
            Mode::Regular { seconds_per_image } => *seconds_per_image,
        }
    }

    /// Cap on the total output duration, if this mode has one.
    pub fn max_duration(&self) -> Option<Duration> {
        match self {
            Mode::Shorts => Some(SHORTS_MAX_DURATION),
            Mode::Regular { .. } => None,
        }
    }

    /// Returns `true` for [`Mode::Shorts`].
    pub fn is_shorts(&self) -> bool {
        matches!(self, Mode::Shorts)
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Mode::Shorts => write!(f, "shorts"),
            Mode::Regular { seconds_per_image } => write!(f, "regular ({seconds_per_image}s/image)"),
        }
    }
}

/// How the output canvas size is chosen from the image set.
///
/// The canvas is fixed once per run; every frame is fitted to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasPolicy {
    /// Use the first image's dimensions. This is the default.
    #[default]
    FirstImage,
    /// Use the largest width and largest height found across all rendered images.
    LargestImage,
    /// Use an explicit size.
    Fixed {
        /// Canvas width in pixels.
        width: u32,
        /// Canvas height in pixels.
        height: u32,
    },
    /// 1920×1080 for regular videos, 1080×1920 for Shorts.
    ModePreset,
}

/// How each image is fitted onto the canvas.
///
/// A single policy applies to every image in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitPolicy {
    /// Preserve aspect ratio, centre, and pad with the background colour.
    /// This is the default.
    #[default]
    Letterbox,
    /// Preserve aspect ratio, centre, and fill the bars with a blurred,
    /// stretched copy of the same image.
    BlurredBackground,
    /// Resize to the canvas exactly, ignoring aspect ratio.
    Stretch,
}

/// Configuration for a render run.
///
/// Carries progress, cancellation, canvas, and encoder settings. All fields
/// have sensible defaults: a default-constructed value renders a 30 fps H.264
/// MP4 on the first image's canvas with black letterboxing.
#[derive(Clone)]
pub struct RenderOptions {
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) canvas: CanvasPolicy,
    pub(crate) fit: FitPolicy,
    /// Letterbox colour as RGB.
    pub(crate) background: [u8; 3],
    pub(crate) encoder: VideoEncoderOptions,
}

impl Debug for RenderOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RenderOptions")
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("canvas", &self.canvas)
            .field("fit", &self.fit)
            .field("background", &self.background)
            .field("encoder", &self.encoder)
            .finish()
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            canvas: CanvasPolicy::default(),
            fit: FitPolicy::default(),
            background: [0, 0, 0],
            encoder: VideoEncoderOptions::default(),
        }
    }

    /// Attach a progress callback, invoked once per image boundary.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// The token is checked between images; once cancelled, the run stops
    /// and returns [`SlideReelError::Cancelled`](crate::SlideReelError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Choose how the canvas size is derived.
    #[must_use]
    pub fn with_canvas_policy(mut self, policy: CanvasPolicy) -> Self {
        self.canvas = policy;
        self
    }

    /// Choose how images are fitted onto the canvas.
    #[must_use]
    pub fn with_fit_policy(mut self, policy: FitPolicy) -> Self {
        self.fit = policy;
        self
    }

    /// Set the letterbox colour.
    #[must_use]
    pub fn with_background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self
    }

    /// Replace the video encoder settings.
    #[must_use]
    pub fn with_encoder_options(mut self, options: VideoEncoderOptions) -> Self {
        self.encoder = options;
        self
    }

    /// Render at `fps` frames per second instead of [`DEFAULT_FRAME_RATE`].
    #[must_use]
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.encoder.fps = fps;
        self
    }

    /// The frame rate in effect.
    pub fn frame_rate(&self) -> u32 {
        self.encoder.fps
    }

    /// The canvas policy in effect.
    pub fn canvas_policy(&self) -> CanvasPolicy {
        self.canvas
    }

    /// The fit policy in effect.
    pub fn fit_policy(&self) -> FitPolicy {
        self.fit
    }

    /// The video encoder settings in effect.
    pub fn encoder_options(&self) -> &VideoEncoderOptions {
        &self.encoder
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
