//! Error types for the `slidereel` crate.
//!
//! This module defines [`SlideReelError`], the unified error type returned by
//! every fallible operation, and [`ErrorKind`], the closed taxonomy callers
//! match on to decide what to tell the user. Errors carry the file path and
//! stage that failed so a front end can act on them without extra logging.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::PathBuf,
};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `slidereel` operations.
///
/// Every public method that can fail returns `Result<T, SlideReelError>`.
/// Use [`kind`](SlideReelError::kind) to classify an error without matching
/// on every variant.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SlideReelError {
    /// A per-image duration or frame rate cannot produce at least one frame.
    #[error("Invalid duration: {reason}")]
    InvalidDuration {
        /// What was wrong with the requested timing.
        reason: String,
    },

    /// The request did not contain any images.
    #[error("No images were supplied")]
    EmptyImageSet,

    /// An image could not be opened, decoded, or has an unsupported format.
    #[error("Unreadable image {path}: {reason}")]
    UnreadableImage {
        /// The offending image file.
        path: PathBuf,
        /// Underlying reason the image was rejected.
        reason: String,
    },

    /// The output location cannot be written to.
    #[error("Cannot write output to {path}: {reason}")]
    UnwritableOutputPath {
        /// The requested output path.
        path: PathBuf,
        /// Underlying reason the location was rejected.
        reason: String,
    },

    /// The video stream could not be encoded or written.
    #[error("Video encoding error: {0}")]
    EncodingError(String),

    /// The audio track could not be opened, decoded, or has an unsupported format.
    #[error("Unreadable audio {path}: {reason}")]
    UnreadableAudio {
        /// The offending audio file.
        path: PathBuf,
        /// Underlying reason the audio was rejected.
        reason: String,
    },

    /// Combining the audio track with the video stream failed.
    #[error("Failed to mux audio into video: {0}")]
    MuxError(String),

    /// The run was stopped through a [`CancellationToken`](crate::CancellationToken).
    #[error("Render cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries outside a specific stage.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while handling output or temporary files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl SlideReelError {
    /// Classify this error into the closed [`ErrorKind`] taxonomy.
    ///
    /// FFmpeg and I/O failures that escape a specific stage are reported as
    /// [`ErrorKind::EncodingError`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            SlideReelError::InvalidDuration { .. } => ErrorKind::InvalidDuration,
            SlideReelError::EmptyImageSet => ErrorKind::EmptyImageSet,
            SlideReelError::UnreadableImage { .. } => ErrorKind::UnreadableImage,
            SlideReelError::UnwritableOutputPath { .. } => ErrorKind::UnwritableOutputPath,
            SlideReelError::EncodingError(_)
            | SlideReelError::Ffmpeg(_)
            | SlideReelError::Io(_) => ErrorKind::EncodingError,
            SlideReelError::UnreadableAudio { .. } => ErrorKind::UnreadableAudio,
            SlideReelError::MuxError(_) => ErrorKind::MuxError,
            SlideReelError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns `true` if the run stopped because the user asked it to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SlideReelError::Cancelled)
    }

    pub(crate) fn invalid_duration(reason: impl Into<String>) -> Self {
        SlideReelError::InvalidDuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn unreadable_image(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        SlideReelError::UnreadableImage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unreadable_audio(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        SlideReelError::UnreadableAudio {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unwritable_output(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        SlideReelError::UnwritableOutputPath {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<FfmpegError> for SlideReelError {
    fn from(error: FfmpegError) -> Self {
        SlideReelError::Ffmpeg(error.to_string())
    }
}

/// The closed set of failure kinds a render can end with.
///
/// [`Cancelled`](ErrorKind::Cancelled) is reported through the same channel
/// as real failures so callers can tell a user-initiated stop from a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timing parameters cannot produce a valid timeline.
    InvalidDuration,
    /// No images were supplied.
    EmptyImageSet,
    /// An image could not be read.
    UnreadableImage,
    /// The output location is not writable.
    UnwritableOutputPath,
    /// Video encoding or writing failed.
    EncodingError,
    /// The audio track could not be read.
    UnreadableAudio,
    /// Muxing audio with video failed.
    MuxError,
    /// The run was cancelled.
    Cancelled,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            ErrorKind::InvalidDuration => "invalid-duration",
            ErrorKind::EmptyImageSet => "empty-image-set",
            ErrorKind::UnreadableImage => "unreadable-image",
            ErrorKind::UnwritableOutputPath => "unwritable-output-path",
            ErrorKind::EncodingError => "encoding-error",
            ErrorKind::UnreadableAudio => "unreadable-audio",
            ErrorKind::MuxError => "mux-error",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
