//! Video encoder: turns a stream of canvas-sized frames into an MP4 file.
//!
//! Each normalized image is converted to YUV once and then submitted to the
//! encoder [`Timeline::frames_per_image`] times with consecutive timestamps,
//! so an image's block of frames is produced without re-decoding or
//! re-scaling. Progress is reported and cancellation checked only between
//! blocks.
//!
//! # Example
//!
//! ```no_run
//! use slidereel::{
//!     Canvas, CanvasPolicy, EncodeHooks, FitPolicy, FrameNormalizer, ImageSet, Mode,
//!     SlideReelError, Timeline, VideoEncoder, VideoEncoderOptions,
//! };
//!
//! let images = ImageSet::new(["a.png", "b.png"])?;
//! let timeline = Timeline::plan(Mode::regular(2.0), images.len(), 30)?;
//! let canvas = Canvas::derive(CanvasPolicy::FirstImage, images.sources(), Mode::Shorts)?;
//! let normalizer = FrameNormalizer::new(canvas, FitPolicy::Letterbox);
//!
//! let summary = VideoEncoder::new(VideoEncoderOptions::default()).encode(
//!     "silent.mp4",
//!     normalizer.stream(images.sources()),
//!     &timeline,
//!     &EncodeHooks::default(),
//! )?;
//! println!("{} frames", summary.frames_written);
//! # Ok::<(), SlideReelError>(())
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::Video as OpenedVideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};
use image::RgbImage;

use crate::configuration::{CONTAINER_FORMAT, DEFAULT_FRAME_RATE};
use crate::conversion::{frames_to_duration, rgb_image_to_frame};
use crate::error::SlideReelError;
use crate::ffmpeg::is_drained;
use crate::normalize::{Canvas, NormalizedFrame};
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback, ProgressTracker, Stage};
use crate::timeline::Timeline;

/// Options for the video encoder.
///
/// Controls the output codec, frame rate, and quality.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderOptions {
    /// Frames per second (default: 30).
    pub fps: u32,
    /// Codec to use. Default is H.264.
    pub codec: VideoCodec,
    /// Constant Rate Factor (0-51, lower is better, 0 is lossless for
    /// H.264). Default: 23. Ignored by MPEG-4.
    pub crf: Option<u32>,
    /// Encoder speed preset such as `"medium"` or `"veryslow"`. Default: `"medium"`.
    pub preset: Option<String>,
    /// Bitrate in bits per second. If set, used instead of CRF.
    pub bitrate: Option<usize>,
}

impl Default for VideoEncoderOptions {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FRAME_RATE,
            codec: VideoCodec::H264,
            crf: Some(23),
            preset: Some("medium".to_string()),
            bitrate: None,
        }
    }
}

impl VideoEncoderOptions {
    /// Set the frame rate.
    #[must_use]
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value.
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the encoder speed preset.
    #[must_use]
    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    fn codec_options(&self) -> Dictionary<'static> {
        let mut options = Dictionary::new();
        if self.codec == VideoCodec::Mpeg4 {
            return options;
        }
        if let (None, Some(crf)) = (self.bitrate, self.crf) {
            options.set("crf", &crf.to_string());
        }
        if let Some(preset) = &self.preset {
            options.set("preset", preset);
        }
        options
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

impl VideoCodec {
    pub(crate) fn codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }
}

/// Observers attached to one encode: a progress callback fired after each
/// image's block, and an optional cancellation token checked before the next.
#[derive(Clone)]
pub struct EncodeHooks {
    /// Receives one [`Stage::Encoding`] report per image.
    pub progress: Arc<dyn ProgressCallback>,
    /// Stops the encode at the next image boundary once cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl Default for EncodeHooks {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }
}

impl EncodeHooks {
    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// What an encode produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Images whose full block of frames was written.
    pub images_written: usize,
    /// Frames submitted to the encoder.
    pub frames_written: u64,
    /// `frames_written` at the output frame rate.
    pub duration: Duration,
    /// Frame size of the stream.
    pub canvas: Canvas,
}

/// Encodes normalized frames into a video file.
///
/// Create via [`VideoEncoder::new`], then call [`encode`](VideoEncoder::encode).
#[derive(Debug, Clone)]
pub struct VideoEncoder {
    config: VideoEncoderOptions,
}

impl VideoEncoder {
    /// Create a new video encoder with the given options.
    pub fn new(config: VideoEncoderOptions) -> Self {
        Self { config }
    }

    /// Encode `frames` to `path` following `timeline`.
    ///
    /// The stream size is taken from the first frame; every later frame must
    /// match it. At most [`Timeline::rendered_images`] frames are consumed.
    /// `path` is always written as MP4 and is overwritten if it exists. If
    /// the encode fails once the file has been opened, it is removed.
    ///
    /// # Errors
    ///
    /// - [`SlideReelError::EncodingError`] if the container or codec cannot be
    ///   opened, a frame has the wrong size, or a write fails.
    /// - [`SlideReelError::UnreadableImage`] if the frame stream fails.
    /// - [`SlideReelError::Cancelled`] if `hooks` requests cancellation.
    pub fn encode<P, I>(
        &self,
        path: P,
        frames: I,
        timeline: &Timeline,
        hooks: &EncodeHooks,
    ) -> Result<EncodeSummary, SlideReelError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = Result<NormalizedFrame, SlideReelError>>,
    {
        let path = path.as_ref();
        if timeline.frame_rate() != self.config.fps {
            return Err(SlideReelError::EncodingError(format!(
                "timeline planned at {} fps but encoder runs at {} fps",
                timeline.frame_rate(),
                self.config.fps,
            )));
        }

        log::info!(
            "Encoding {} images x {} frames to {:?} (codec={:?}, fps={})",
            timeline.rendered_images(),
            timeline.frames_per_image(),
            path,
            self.config.codec,
            self.config.fps,
        );

        if hooks.is_cancelled() {
            return Err(SlideReelError::Cancelled);
        }

        let mut frames = frames.into_iter().take(timeline.rendered_images());
        let first = frames
            .next()
            .ok_or_else(|| SlideReelError::EncodingError("no frames to write".to_string()))??;

        let output = ffmpeg_next::format::output_as(&path, CONTAINER_FORMAT)
            .map_err(|e| SlideReelError::EncodingError(format!("cannot open output: {e}")))?;

        // `write` consumes the container, so the file is closed before removal.
        let result = self.write(output, first, frames, timeline, hooks);
        if result.is_err() {
            discard_partial(path);
        }
        result
    }

    fn write<F>(
        &self,
        output: Output,
        first: NormalizedFrame,
        mut frames: F,
        timeline: &Timeline,
        hooks: &EncodeHooks,
    ) -> Result<EncodeSummary, SlideReelError>
    where
        F: Iterator<Item = Result<NormalizedFrame, SlideReelError>>,
    {
        let mut tracker = ProgressTracker::new(
            Arc::clone(&hooks.progress),
            Stage::Encoding,
            timeline.rendered_images() as u64,
        );

        let mut writer = VideoWriter::open(output, &first.image, &self.config)?;

        let mut pending = Some(Ok(first));
        let mut images_written = 0;

        while let Some(frame) = pending.take().or_else(|| frames.next()) {
            let frame = frame?;
            let converted = writer.convert(&frame.image)?;
            writer.push(converted, timeline.frames_per_image())?;
            images_written += 1;

            log::debug!(
                "Wrote {} ({images_written}/{})",
                frame.source.display(),
                timeline.rendered_images(),
            );
            tracker.advance(Some(frames_to_duration(writer.next_pts as u64, self.config.fps)));

            if images_written < timeline.rendered_images() && hooks.is_cancelled() {
                log::info!("Encoding cancelled after {images_written} images");
                return Err(SlideReelError::Cancelled);
            }
        }

        let canvas = writer.canvas;
        let frames_written = writer.finish()?;

        Ok(EncodeSummary {
            images_written,
            frames_written,
            duration: frames_to_duration(frames_written, self.config.fps),
            canvas,
        })
    }
}

/// Remove a file the encoder started but could not finish.
fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove partial output {}: {e}", path.display()),
    }
}

/// An open MP4 file with one video stream, accepting frames in order.
struct VideoWriter {
    output: Output,
    encoder: OpenedVideoEncoder,
    scaler: ScalingContext,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    canvas: Canvas,
    next_pts: i64,
}

impl VideoWriter {
    fn open(
        mut output: Output,
        first: &RgbImage,
        config: &VideoEncoderOptions,
    ) -> Result<Self, SlideReelError> {
        let (width, height) = first.dimensions();
        let canvas = Canvas::new(width, height);
        if (canvas.width, canvas.height) != (width, height) {
            return Err(SlideReelError::EncodingError(format!(
                "frame size {width}x{height} is not even"
            )));
        }
        if config.fps == 0 {
            return Err(SlideReelError::EncodingError("frame rate must be positive".to_string()));
        }

        let codec_id = config.codec.codec_id();
        let encoder_time_base = Rational::new(1, config.fps as i32);

        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            SlideReelError::EncodingError(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|e| SlideReelError::EncodingError(format!("cannot add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.encoder().video())
            .map_err(|e| SlideReelError::EncodingError(format!("cannot create video encoder: {e}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(config.fps as i32, 1)));
        if let Some(bitrate) = config.bitrate {
            encoder.set_bit_rate(bitrate);
        }

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder
            .open_as_with(encoder_codec, config.codec_options())
            .map_err(|e| SlideReelError::EncodingError(format!("cannot open encoder: {e}")))?;

        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .map_err(|e| SlideReelError::EncodingError(format!("cannot write header: {e}")))?;

        // The muxer may replace the stream time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| SlideReelError::EncodingError("output stream vanished".to_string()))?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| SlideReelError::EncodingError(format!("cannot create scaler: {e}")))?;

        log::debug!("Opened {codec_id:?} encoder at {canvas}, stream time base {stream_time_base}");

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            canvas,
            next_pts: 0,
        })
    }

    /// Convert one canvas-sized RGB24 image to an encoder-ready YUV frame.
    fn convert(&mut self, image: &RgbImage) -> Result<VideoFrame, SlideReelError> {
        if image.dimensions() != (self.canvas.width, self.canvas.height) {
            return Err(SlideReelError::EncodingError(format!(
                "frame is {}x{} but the stream is {}",
                image.width(),
                image.height(),
                self.canvas,
            )));
        }

        let source = rgb_image_to_frame(image);
        let mut converted = VideoFrame::empty();
        self.scaler
            .run(&source, &mut converted)
            .map_err(|e| SlideReelError::EncodingError(format!("scaling failed: {e}")))?;
        Ok(converted)
    }

    /// Submit `frame` `repeats` times with consecutive timestamps.
    fn push(&mut self, mut frame: VideoFrame, repeats: u64) -> Result<(), SlideReelError> {
        for _ in 0..repeats {
            frame.set_pts(Some(self.next_pts));
            self.next_pts += 1;

            self.encoder
                .send_frame(&frame)
                .map_err(|e| SlideReelError::EncodingError(format!("send_frame failed: {e}")))?;
            self.drain()?;
        }
        Ok(())
    }

    /// Write every packet the encoder has ready.
    fn drain(&mut self) -> Result<(), SlideReelError> {
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet.write_interleaved(&mut self.output).map_err(|e| {
                        SlideReelError::EncodingError(format!("write packet failed: {e}"))
                    })?;
                }
                Err(e) if is_drained(&e) => return Ok(()),
                Err(e) => {
                    return Err(SlideReelError::EncodingError(format!(
                        "receive_packet failed: {e}"
                    )));
                }
            }
        }
    }

    /// Flush the encoder and finalize the container. Returns the frame count.
    fn finish(mut self) -> Result<u64, SlideReelError> {
        self.encoder
            .send_eof()
            .map_err(|e| SlideReelError::EncodingError(format!("send_eof failed: {e}")))?;
        self.drain()?;

        self.output
            .write_trailer()
            .map_err(|e| SlideReelError::EncodingError(format!("cannot write trailer: {e}")))?;

        Ok(self.next_pts as u64)
    }
}
