//! FFmpeg process-wide setup.
//!
//! FFmpeg keeps its own console logger, separate from the Rust
//! [`log`](https://crates.io/crates/log) facade used by this crate. By default
//! it prints warnings to stderr, which is noisy under a progress bar. This
//! module lets callers tune that output, and checks which encoders the linked
//! FFmpeg build provides.
//!
//! # Example
//!
//! ```no_run
//! use slidereel::FfmpegLogLevel;
//!
//! // Keep FFmpeg quiet unless something goes badly wrong.
//! slidereel::set_ffmpeg_log_level(FfmpegLogLevel::Fatal);
//!
//! if !slidereel::encoders_available() {
//!     eprintln!("this FFmpeg build cannot encode H.264 + AAC");
//! }
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::Error as FfmpegError;
use ffmpeg_next::codec::Id;
use ffmpeg_next::error::EAGAIN;
use ffmpeg_next::util::log::Level;

use crate::encode::VideoCodec;
use crate::error::SlideReelError;

/// FFmpeg console verbosity, from silent to most verbose.
///
/// Setting a level suppresses all FFmpeg messages below that severity.
/// Rust-side `log` output is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

const LEVELS: [(FfmpegLogLevel, Level, &str); 9] = [
    (FfmpegLogLevel::Quiet, Level::Quiet, "quiet"),
    (FfmpegLogLevel::Panic, Level::Panic, "panic"),
    (FfmpegLogLevel::Fatal, Level::Fatal, "fatal"),
    (FfmpegLogLevel::Error, Level::Error, "error"),
    (FfmpegLogLevel::Warning, Level::Warning, "warning"),
    (FfmpegLogLevel::Info, Level::Info, "info"),
    (FfmpegLogLevel::Verbose, Level::Verbose, "verbose"),
    (FfmpegLogLevel::Debug, Level::Debug, "debug"),
    (FfmpegLogLevel::Trace, Level::Trace, "trace"),
];

impl FfmpegLogLevel {
    fn entry(self) -> (FfmpegLogLevel, Level, &'static str) {
        LEVELS[self as usize]
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.entry().2)
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = if wanted == "warn" { "warning".to_string() } else { wanted };
        LEVELS
            .iter()
            .find(|(_, _, name)| *name == wanted)
            .map(|(level, _, _)| *level)
            .ok_or_else(|| format!("unknown FFmpeg log level '{s}'"))
    }
}

/// Set FFmpeg's console verbosity.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.entry().1);
}

/// Get FFmpeg's current console verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    let current = ffmpeg_next::util::log::get_level().ok()?;
    LEVELS
        .iter()
        .find(|(_, level, _)| *level == current)
        .map(|(level, _, _)| *level)
}

/// Returns `true` if the linked FFmpeg can encode the default output:
/// H.264 video and AAC audio.
pub fn encoders_available() -> bool {
    initialize().is_ok() && codec_available(VideoCodec::H264) && audio_encoder_available()
}

/// Returns `true` if an encoder for `codec` is linked in.
pub fn codec_available(codec: VideoCodec) -> bool {
    initialize().is_ok() && ffmpeg_next::encoder::find(codec.codec_id()).is_some()
}

fn audio_encoder_available() -> bool {
    ffmpeg_next::encoder::find(Id::AAC).is_some()
}

/// Initialize FFmpeg. Safe to call repeatedly.
pub(crate) fn initialize() -> Result<(), SlideReelError> {
    ffmpeg_next::init()
        .map_err(|e| SlideReelError::EncodingError(format!("cannot initialize FFmpeg: {e}")))
}

/// Returns `true` if a `receive_*` call failed only because the codec wants
/// more input or has nothing left to give.
pub(crate) fn is_drained(error: &FfmpegError) -> bool {
    matches!(error, FfmpegError::Eof | FfmpegError::Other { errno: EAGAIN })
}
