//! Internal utility functions.
//!
//! Pixel copies between `image` buffers and FFmpeg frames, and the
//! frame/sample/timestamp arithmetic shared by the encoder, the audio
//! aligner, and the probe.

use std::time::Duration;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use image::RgbImage;

/// Copy an RGB24 image into a freshly allocated FFmpeg frame, honouring the
/// frame's row stride.
pub fn rgb_image_to_frame(image: &RgbImage) -> VideoFrame {
    let (width, height) = image.dimensions();
    let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
    let stride = frame.stride(0);
    let row_len = (width as usize) * 3;
    let source = image.as_raw();
    let destination = frame.data_mut(0);

    for y in 0..height as usize {
        let src_start = y * row_len;
        let dst_start = y * stride;
        destination[dst_start..dst_start + row_len]
            .copy_from_slice(&source[src_start..src_start + row_len]);
    }

    frame
}

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is the number of bytes per pixel of the frame's format
/// (3 for RGB24).
pub fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Exact wall-clock length of `frames` frames at `frame_rate` fps.
pub fn frames_to_duration(frames: u64, frame_rate: u32) -> Duration {
    if frame_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = (frames as u128 * 1_000_000_000) / frame_rate as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Number of audio samples (per channel) covering `duration` at
/// `sample_rate`, rounded to the nearest sample.
pub fn duration_to_samples(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Rescale a PTS value from stream time base to seconds.
pub fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_durations_are_exact() {
        assert_eq!(frames_to_duration(180, 30), Duration::from_secs(6));
        assert_eq!(frames_to_duration(1, 30), Duration::from_nanos(33_333_333));
        assert_eq!(frames_to_duration(10, 0), Duration::ZERO);
    }

    #[test]
    fn sample_counts_round_to_nearest() {
        assert_eq!(duration_to_samples(Duration::from_secs(2), 44_100), 88_200);
        assert_eq!(duration_to_samples(Duration::from_millis(500), 44_100), 22_050);
        assert_eq!(
            duration_to_samples(frames_to_duration(1, 30), 44_100),
            1_470
        );
    }

    #[test]
    fn pts_seconds_use_time_base() {
        assert_eq!(pts_to_seconds(90, Rational::new(1, 30)), 3.0);
        assert_eq!(pts_to_seconds(44_100, Rational::new(1, 44_100)), 1.0);
    }
}
