//! # slidereel
//!
//! Assemble an ordered set of still images into an MP4 slideshow, optionally
//! with a background audio track that is looped or trimmed to fit.
//!
//! Every image is shown for the same whole number of frames. Two timing
//! regimes are supported:
//!
//! - [`Mode::Shorts`]: one second per image, capped at sixty seconds in total.
//!   Images past the cap are dropped.
//! - [`Mode::Regular`]: a caller-chosen number of seconds per image, no cap.
//!
//! Encoding is done in-process through
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next); images are decoded
//! and fitted with the [`image`](https://crates.io/crates/image) crate.
//!
//! ## Quick Start
//!
//! ### Render a slideshow
//!
//! ```no_run
//! use slidereel::{Mode, Pipeline, RenderOptions, RenderRequest};
//!
//! let request = RenderRequest::new(
//!     vec!["1.jpg".into(), "2.jpg".into(), "3.jpg".into()],
//!     Mode::regular(2.0),
//!     "slideshow.mp4",
//! );
//! let output = Pipeline::run(&request, &RenderOptions::new()).unwrap();
//! assert_eq!(output.duration.as_secs(), 6);
//! ```
//!
//! ### Render a Short with music on a worker thread
//!
//! ```no_run
//! use slidereel::{CanvasPolicy, Mode, Pipeline, RenderOptions, RenderRequest};
//!
//! let images = slidereel::ImageSet::from_directory("photos").unwrap();
//! let paths = images.sources().iter().map(|s| s.path().to_path_buf()).collect();
//! let request = RenderRequest::new(paths, Mode::Shorts, "short.mp4").with_audio("song.mp3");
//! let options = RenderOptions::new().with_canvas_policy(CanvasPolicy::ModePreset);
//!
//! let handle = Pipeline::spawn(request, options).unwrap();
//! for event in handle.events() {
//!     println!("{event:?}");
//! }
//! handle.wait().unwrap();
//! ```
//!
//! ### Plan without rendering
//!
//! ```
//! use slidereel::{Mode, Timeline};
//!
//! let timeline = Timeline::plan(Mode::Shorts, 90, 30).unwrap();
//! assert_eq!(timeline.rendered_images(), 60);
//! assert_eq!(timeline.total_frames(), 1800);
//! ```
//!
//! ## Building blocks
//!
//! The pipeline is built from components that can also be used directly:
//! [`Timeline`] plans frame counts, [`FrameNormalizer`] fits images onto a
//! fixed [`Canvas`], [`VideoEncoder`] writes the silent video,
//! [`AudioAligner`] loops or trims audio and muxes it in, and
//! [`ArtifactProbe`] inspects the result.
//!
//! ## Requirements
//!
//! FFmpeg development libraries with an H.264 and an AAC encoder must be
//! installed. [`encoders_available`] reports whether the linked build has
//! them.

pub mod audio;
pub mod configuration;
mod conversion;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod normalize;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod timeline;
pub mod validation;

pub use audio::{AudioAligner, AudioFormat, AudioTrack, PcmBuffer};
pub use configuration::{CanvasPolicy, FitPolicy, Mode, RenderOptions};
pub use encode::{EncodeHooks, EncodeSummary, VideoCodec, VideoEncoder, VideoEncoderOptions};
pub use error::{ErrorKind, SlideReelError};
pub use ffmpeg::{
    FfmpegLogLevel, codec_available, encoders_available, get_ffmpeg_log_level,
    set_ffmpeg_log_level,
};
pub use normalize::{
    Canvas, FrameNormalizer, FrameStream, ImageFormat, ImageSet, ImageSource, NormalizedFrame,
};
pub use pipeline::{
    Pipeline, PipelineState, RenderEvent, RenderHandle, RenderOutput, RenderRequest,
};
pub use probe::{ArtifactInfo, ArtifactProbe, AudioStreamInfo};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo, Stage};
pub use timeline::Timeline;
pub use validation::{RenderPlan, validate};
