//! Fail-fast request validation.
//!
//! [`validate`] checks a [`RenderRequest`] in a fixed order and stops at the
//! first problem, before any file is written or any image is decoded:
//!
//! 1. the image list is not empty,
//! 2. the mode yields a valid [`Timeline`],
//! 3. the output location is writable,
//! 4. every image has a supported format and exists,
//! 5. the audio track, if any, has a supported format and exists.
//!
//! A caller can run it ahead of time (for example to enable a "Render"
//! button) and [`Pipeline::run`](crate::Pipeline::run) runs it again as its
//! first stage.

use std::path::{Path, PathBuf};

use crate::audio::AudioTrack;
use crate::error::SlideReelError;
use crate::normalize::ImageSet;
use crate::pipeline::RenderRequest;
use crate::timeline::Timeline;

/// Prefix of every temporary file this crate creates next to an output.
pub(crate) const TEMP_PREFIX: &str = ".slidereel-";

/// A request that passed validation, with everything derived from it.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// The images, format-checked, in display order.
    pub images: ImageSet,
    /// Frame layout of the output.
    pub timeline: Timeline,
    /// Background audio, if requested.
    pub audio: Option<AudioTrack>,
    /// Final output path.
    pub output: PathBuf,
    /// Directory that holds the output and all temporary files.
    pub output_dir: PathBuf,
}

/// Validate `request` for a render at `frame_rate` fps.
///
/// # Errors
///
/// The first of [`SlideReelError::EmptyImageSet`],
/// [`SlideReelError::InvalidDuration`], [`SlideReelError::UnwritableOutputPath`],
/// [`SlideReelError::UnreadableImage`], or [`SlideReelError::UnreadableAudio`]
/// that applies, in that order.
pub fn validate(request: &RenderRequest, frame_rate: u32) -> Result<RenderPlan, SlideReelError> {
    if request.images.is_empty() {
        return Err(SlideReelError::EmptyImageSet);
    }

    let timeline = Timeline::plan(request.mode, request.images.len(), frame_rate)?;
    let output_dir = check_output(&request.output)?;
    let images = ImageSet::new(request.images.iter().cloned())?;
    let audio = request.audio.as_ref().map(AudioTrack::open).transpose()?;

    log::debug!(
        "Validated {} images ({}), audio: {}",
        images.len(),
        request.mode,
        audio.is_some(),
    );

    Ok(RenderPlan {
        images,
        timeline,
        audio,
        output: request.output.clone(),
        output_dir,
    })
}

/// Check that a file can be created at `output`; return its directory.
fn check_output(output: &Path) -> Result<PathBuf, SlideReelError> {
    if output.file_name().is_none() {
        return Err(SlideReelError::unwritable_output(output, "path has no file name"));
    }
    if output.is_dir() {
        return Err(SlideReelError::unwritable_output(output, "path is a directory"));
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.exists() {
        return Err(SlideReelError::unwritable_output(
            output,
            format!("directory {} does not exist", dir.display()),
        ));
    }
    if !dir.is_dir() {
        return Err(SlideReelError::unwritable_output(
            output,
            format!("{} is not a directory", dir.display()),
        ));
    }

    // Creating and dropping a scratch file is the only reliable write check.
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(&dir)
        .map_err(|e| SlideReelError::unwritable_output(output, e))?;

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn output_directory_defaults_to_current_dir() {
        let dir = check_output(Path::new("video.mp4")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
    }

    #[test]
    fn output_without_file_name_is_rejected() {
        let err = check_output(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnwritableOutputPath);
    }

    #[test]
    fn missing_output_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_output(&dir.path().join("missing").join("out.mp4")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnwritableOutputPath);
    }
}
