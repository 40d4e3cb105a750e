//! Timeline planning.
//!
//! A [`Timeline`] turns a [`Mode`] and an image count into the exact number
//! of frames each image occupies and the total length of the output. It is
//! pure arithmetic: nothing here touches the filesystem.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use slidereel::{Mode, Timeline};
//!
//! let timeline = Timeline::plan(Mode::regular(2.0), 3, 30)?;
//! assert_eq!(timeline.frames_per_image(), 60);
//! assert_eq!(timeline.total_duration(), Duration::from_secs(6));
//!
//! let shorts = Timeline::plan(Mode::Shorts, 90, 30)?;
//! assert_eq!(shorts.rendered_images(), 60);
//! assert_eq!(shorts.dropped_images(), 30);
//! # Ok::<(), slidereel::SlideReelError>(())
//! ```

use std::ops::Range;
use std::time::Duration;

use crate::configuration::Mode;
use crate::conversion::frames_to_duration;
use crate::error::SlideReelError;

/// Frame layout of one render.
///
/// Every rendered image occupies the same number of consecutive frames;
/// images are laid out back to back with no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    frame_rate: u32,
    frames_per_image: u64,
    source_images: usize,
    rendered_images: usize,
}

impl Timeline {
    /// Plan the frame layout for `image_count` images at `frame_rate` fps.
    ///
    /// In [`Mode::Shorts`], images that would push the output past the
    /// 60-second cap are dropped from the end.
    ///
    /// # Errors
    ///
    /// - [`SlideReelError::EmptyImageSet`] if `image_count` is zero.
    /// - [`SlideReelError::InvalidDuration`] if `frame_rate` is zero, the
    ///   per-image duration is not a positive finite number, it is too
    ///   short to cover a single frame, or the total frame count does not
    ///   fit in a timestamp.
    pub fn plan(mode: Mode, image_count: usize, frame_rate: u32) -> Result<Self, SlideReelError> {
        if image_count == 0 {
            return Err(SlideReelError::EmptyImageSet);
        }
        if frame_rate == 0 {
            return Err(SlideReelError::invalid_duration("frame rate must be positive"));
        }

        let seconds = mode.seconds_per_image();
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(SlideReelError::invalid_duration(format!(
                "seconds per image must be a positive number, got {seconds}"
            )));
        }

        let frames = (frame_rate as f64 * seconds).round();
        if frames < 1.0 {
            return Err(SlideReelError::invalid_duration(format!(
                "{seconds}s per image is shorter than one frame at {frame_rate} fps"
            )));
        }
        // Frame numbers become signed 64-bit PTS values.
        if frames >= i64::MAX as f64 {
            return Err(SlideReelError::invalid_duration(format!(
                "{seconds}s per image is too long to encode"
            )));
        }
        let frames_per_image = frames as u64;

        let rendered_images = match mode.max_duration() {
            Some(cap) => {
                let cap_frames = (cap.as_secs_f64() * frame_rate as f64).round() as u64;
                let fit = (cap_frames / frames_per_image).max(1) as usize;
                image_count.min(fit)
            }
            None => image_count,
        };

        let total_frames = frames_per_image
            .checked_mul(rendered_images as u64)
            .filter(|&total| total <= i64::MAX as u64);
        if total_frames.is_none() {
            return Err(SlideReelError::invalid_duration(format!(
                "{rendered_images} images at {seconds}s each is too long to encode"
            )));
        }

        if rendered_images < image_count {
            log::warn!(
                "{mode} keeps the first {rendered_images} of {image_count} images; the rest are dropped"
            );
        }

        Ok(Self {
            frame_rate,
            frames_per_image,
            source_images: image_count,
            rendered_images,
        })
    }

    /// Frames per second of the output.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Consecutive frames each image is shown for.
    pub fn frames_per_image(&self) -> u64 {
        self.frames_per_image
    }

    /// Number of images the caller supplied.
    pub fn source_images(&self) -> usize {
        self.source_images
    }

    /// Number of images that make it into the output.
    pub fn rendered_images(&self) -> usize {
        self.rendered_images
    }

    /// Number of trailing images left out by the duration cap.
    pub fn dropped_images(&self) -> usize {
        self.source_images - self.rendered_images
    }

    /// Total frames in the output.
    pub fn total_frames(&self) -> u64 {
        self.frames_per_image * self.rendered_images as u64
    }

    /// Total length of the output.
    pub fn total_duration(&self) -> Duration {
        frames_to_duration(self.total_frames(), self.frame_rate)
    }

    /// Time at which image `index` first appears, or `None` if it is not rendered.
    pub fn image_start(&self, index: usize) -> Option<Duration> {
        self.frame_range(index)
            .map(|range| frames_to_duration(range.start, self.frame_rate))
    }

    /// Frame numbers occupied by image `index`, or `None` if it is not rendered.
    pub fn frame_range(&self, index: usize) -> Option<Range<u64>> {
        if index >= self.rendered_images {
            return None;
        }
        let start = index as u64 * self.frames_per_image;
        Some(start..start + self.frames_per_image)
    }
}
