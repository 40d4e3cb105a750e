//! Inspection of rendered artifacts.
//!
//! [`ArtifactProbe`] opens a finished video, reads its stream parameters and
//! walks every packet once, so the reported counts and durations describe what
//! was actually written rather than what the container header claims.
//! [`decode_frames`] goes one step further and decodes every video frame back
//! to RGB, which is how the test suite checks pixel content.
//!
//! # Example
//!
//! ```no_run
//! use slidereel::ArtifactProbe;
//!
//! let info = ArtifactProbe::probe("slideshow.mp4")?;
//! println!("{}x{} @ {} fps, {} frames", info.width, info.height, info.frame_rate, info.video_packets);
//! if let Some(audio) = &info.audio {
//!     println!("audio: {:?} at {} Hz", audio.duration, audio.sample_rate);
//! }
//! # Ok::<(), slidereel::SlideReelError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Packet, Rational};
use image::RgbImage;

use crate::conversion::{frame_to_buffer, pts_to_seconds};
use crate::error::SlideReelError;
use crate::ffmpeg::is_drained;

/// What a rendered file contains.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactInfo {
    /// The probed file.
    pub path: PathBuf,
    /// Container format name reported by FFmpeg.
    pub format: String,
    /// Video frame width in pixels.
    pub width: u32,
    /// Video frame height in pixels.
    pub height: u32,
    /// Average frame rate of the video stream.
    pub frame_rate: f64,
    /// Video packets found in the file. Every packet holds one frame.
    pub video_packets: u64,
    /// End of the last video packet.
    pub video_duration: Duration,
    /// Duration stored in the container header.
    pub container_duration: Duration,
    /// Video codec name.
    pub video_codec: String,
    /// The audio stream, if the file has one.
    pub audio: Option<AudioStreamInfo>,
}

impl ArtifactInfo {
    /// Returns `true` if the file has an audio stream.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// The audio stream of a rendered file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u32,
    /// Audio codec name.
    pub codec: String,
    /// Audio packets found in the file.
    pub packets: u64,
    /// End of the last audio packet.
    pub duration: Duration,
}

/// Reads stream metadata and packet statistics from a rendered file.
pub struct ArtifactProbe;

impl ArtifactProbe {
    /// Probe `path`.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::Ffmpeg`] if the file cannot be opened, has no video
    /// stream, or a stream cannot be read.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<ArtifactInfo, SlideReelError> {
        let path = path.as_ref();
        let mut input = open(path)?;

        let video_index = input
            .streams()
            .best(Type::Video)
            .map(|stream| stream.index())
            .ok_or_else(|| SlideReelError::Ffmpeg(format!("{} has no video stream", path.display())))?;
        let audio_index = input.streams().best(Type::Audio).map(|stream| stream.index());

        let container_duration = match input.duration() {
            micros if micros > 0 => Duration::from_micros(micros as u64),
            _ => Duration::ZERO,
        };
        let format = input.format().name().to_string();

        let (width, height, frame_rate, video_codec, video_time_base) = {
            let stream = input
                .stream(video_index)
                .ok_or_else(|| SlideReelError::Ffmpeg("video stream vanished".to_string()))?;
            let decoder = CodecContext::from_parameters(stream.parameters())?
                .decoder()
                .video()?;
            let rate = stream.avg_frame_rate();
            let frame_rate = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            let codec = decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (decoder.width(), decoder.height(), frame_rate, codec, stream.time_base())
        };

        let audio = match audio_index {
            Some(index) => {
                let stream = input
                    .stream(index)
                    .ok_or_else(|| SlideReelError::Ffmpeg("audio stream vanished".to_string()))?;
                let decoder = CodecContext::from_parameters(stream.parameters())?
                    .decoder()
                    .audio()?;
                let codec = decoder
                    .codec()
                    .map(|codec| codec.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Some((
                    index,
                    stream.time_base(),
                    decoder.rate(),
                    decoder.ch_layout().channels(),
                    codec,
                ))
            }
            None => None,
        };

        let mut video = PacketStats::default();
        let mut audio_stats = PacketStats::default();
        for (stream, packet) in input.packets() {
            if stream.index() == video_index {
                video.record(&packet, video_time_base);
            } else if let Some((index, time_base, ..)) = &audio
                && stream.index() == *index
            {
                audio_stats.record(&packet, *time_base);
            }
        }

        log::debug!(
            "Probed {}: {} video packets, audio: {}",
            path.display(),
            video.packets,
            audio.is_some(),
        );

        Ok(ArtifactInfo {
            path: path.to_path_buf(),
            format,
            width,
            height,
            frame_rate,
            video_packets: video.packets,
            video_duration: video.duration(),
            container_duration,
            video_codec,
            audio: audio.map(|(_, _, sample_rate, channels, codec)| AudioStreamInfo {
                sample_rate,
                channels,
                codec,
                packets: audio_stats.packets,
                duration: audio_stats.duration(),
            }),
        })
    }
}

#[derive(Default)]
struct PacketStats {
    packets: u64,
    end_seconds: f64,
}

impl PacketStats {
    fn record(&mut self, packet: &Packet, time_base: Rational) {
        self.packets += 1;
        if let Some(pts) = packet.pts() {
            let end = pts_to_seconds(pts + packet.duration(), time_base);
            self.end_seconds = self.end_seconds.max(end);
        }
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.end_seconds.max(0.0))
    }
}

/// Decode every video frame of `path` to RGB, in presentation order.
///
/// Intended for verifying small outputs; every frame is held in memory.
///
/// # Errors
///
/// [`SlideReelError::Ffmpeg`] if the file cannot be opened or decoded.
pub fn decode_frames<P: AsRef<Path>>(path: P) -> Result<Vec<RgbImage>, SlideReelError> {
    let path = path.as_ref();
    let mut input = open(path)?;

    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| SlideReelError::Ffmpeg(format!("{} has no video stream", path.display())))?;
    let video_index = stream.index();
    let mut decoder = CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .video()?;

    let (width, height) = (decoder.width(), decoder.height());
    let mut scaler = ScalingContext::get(
        decoder.format(),
        width,
        height,
        Pixel::RGB24,
        width,
        height,
        ScalingFlags::BILINEAR,
    )?;

    let mut images = Vec::new();
    let mut decoded = VideoFrame::empty();
    let mut rgb = VideoFrame::empty();
    let mut collect = |decoded: &VideoFrame| -> Result<(), SlideReelError> {
        scaler.run(decoded, &mut rgb)?;
        let buffer = frame_to_buffer(&rgb, width, height, 3);
        let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            SlideReelError::Ffmpeg("decoded frame has an unexpected size".to_string())
        })?;
        images.push(image);
        Ok(())
    };

    for (stream, packet) in input.packets() {
        if stream.index() != video_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        loop {
            match decoder.receive_frame(&mut decoded) {
                Ok(()) => collect(&decoded)?,
                Err(e) if is_drained(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
    }

    decoder.send_eof()?;
    loop {
        match decoder.receive_frame(&mut decoded) {
            Ok(()) => collect(&decoded)?,
            Err(e) if is_drained(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(images)
}

fn open(path: &Path) -> Result<Input, SlideReelError> {
    crate::ffmpeg::initialize()?;
    ffmpeg_next::format::input(&path)
        .map_err(|e| SlideReelError::Ffmpeg(format!("cannot open {}: {e}", path.display())))
}
