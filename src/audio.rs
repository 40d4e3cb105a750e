//! Background audio: decoding, length alignment, and muxing.
//!
//! An [`AudioTrack`] is decoded to planar 32-bit float stereo at
//! [`AUDIO_SAMPLE_RATE`] into a [`PcmBuffer`], never past the video's length.
//! The [`AudioAligner`] encodes that buffer to AAC, looping it from the start
//! or cutting it to exactly the video's length as it goes (the same samples
//! [`PcmBuffer::aligned_to`] produces), and writes it next to a
//! packet-for-packet copy of an already encoded video stream.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use slidereel::{AudioAligner, AudioTrack, SlideReelError};
//!
//! let track = AudioTrack::open("music.mp3")?;
//! AudioAligner::new().mux("silent.mp4", &track, Duration::from_secs(12), "final.mp4")?;
//! # Ok::<(), SlideReelError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::Audio as AudioEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Sample, sample::Type as SampleType};
use ffmpeg_next::frame::Audio as AudioFrame;
use ffmpeg_next::media::Type as MediaType;
use ffmpeg_next::software::resampling::Context as ResamplingContext;
use ffmpeg_next::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg_next::{Packet, Rational};

use crate::configuration::{AUDIO_BIT_RATE, AUDIO_SAMPLE_RATE, CONTAINER_FORMAT};
use crate::conversion::{duration_to_samples, pts_to_seconds};
use crate::error::SlideReelError;
use crate::ffmpeg::is_drained;

/// Channel count of every decoded and encoded buffer.
const CHANNELS: usize = 2;

/// Spare output capacity per resampler call, covering its internal delay.
const RESAMPLER_HEADROOM: usize = 4096;

/// Frame size used when the AAC encoder does not report one.
const FALLBACK_FRAME_SIZE: usize = 1024;

/// Audio file formats accepted as background audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    /// MPEG-1 Layer III (`.mp3`).
    Mp3,
    /// RIFF WAVE (`.wav`).
    Wav,
    /// Raw ADTS AAC (`.aac`).
    Aac,
    /// AAC in an MPEG-4 container (`.m4a`).
    M4a,
    /// Free Lossless Audio Codec (`.flac`).
    Flac,
    /// Ogg Vorbis or Opus (`.ogg`, `.oga`, `.opus`).
    Ogg,
}

impl AudioFormat {
    /// Detect the format from a file extension, case-insensitively.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" | "wave" => Some(AudioFormat::Wav),
            "aac" => Some(AudioFormat::Aac),
            "m4a" => Some(AudioFormat::M4a),
            "flac" => Some(AudioFormat::Flac),
            "ogg" | "oga" | "opus" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AudioFormat::Mp3 => write!(f, "MP3"),
            AudioFormat::Wav => write!(f, "WAV"),
            AudioFormat::Aac => write!(f, "AAC"),
            AudioFormat::M4a => write!(f, "M4A"),
            AudioFormat::Flac => write!(f, "FLAC"),
            AudioFormat::Ogg => write!(f, "OGG"),
        }
    }
}

/// A background audio file chosen for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    path: PathBuf,
    format: AudioFormat,
}

impl AudioTrack {
    /// Check that `path` has a supported extension and exists.
    ///
    /// The file is not decoded until the track is muxed.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::UnreadableAudio`] if the extension is unsupported or
    /// the file is missing.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, SlideReelError> {
        let path = path.into();
        let format = AudioFormat::from_path(&path).ok_or_else(|| {
            SlideReelError::unreadable_audio(
                &path,
                "unsupported audio format (expected MP3, WAV, AAC, M4A, FLAC or OGG)",
            )
        })?;
        if !path.is_file() {
            return Err(SlideReelError::unreadable_audio(&path, "file does not exist"));
        }
        Ok(Self { path, format })
    }

    /// The audio file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The detected format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Decode to stereo float PCM at [`AUDIO_SAMPLE_RATE`].
    ///
    /// Decoding stops once `limit` samples per channel are available, so a
    /// long track is never decoded past what the video needs. `None` decodes
    /// the whole file.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::UnreadableAudio`] if the file cannot be opened, has
    /// no audio stream, fails to decode, or yields no samples at all.
    pub fn decode(&self, limit: Option<usize>) -> Result<PcmBuffer, SlideReelError> {
        crate::ffmpeg::initialize()?;
        let unreadable = |reason: String| SlideReelError::unreadable_audio(&self.path, reason);

        let mut input = ffmpeg_next::format::input(&self.path)
            .map_err(|e| unreadable(format!("cannot open: {e}")))?;
        let stream = input
            .streams()
            .best(MediaType::Audio)
            .ok_or_else(|| unreadable("no audio stream".to_string()))?;
        let stream_index = stream.index();

        let mut decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().audio())
            .map_err(|e| unreadable(format!("cannot open decoder: {e}")))?;

        let mut sink = PcmSink::new(limit);
        let mut decoded = AudioFrame::empty();

        for (stream, packet) in input.packets() {
            if sink.is_full() {
                break;
            }
            if stream.index() != stream_index {
                continue;
            }
            decoder
                .send_packet(&packet)
                .map_err(|e| unreadable(format!("decode failed: {e}")))?;
            receive_into(&mut decoder, &mut decoded, &mut sink).map_err(&unreadable)?;
        }

        if !sink.is_full() {
            let _ = decoder.send_eof();
            receive_into(&mut decoder, &mut decoded, &mut sink).map_err(&unreadable)?;
            sink.flush();
        }

        let buffer = sink.into_buffer();
        if buffer.is_empty() {
            return Err(unreadable("no audio samples decoded".to_string()));
        }

        log::debug!(
            "Decoded {} samples ({:.2}s) from {}",
            buffer.len(),
            buffer.duration().as_secs_f64(),
            self.path.display(),
        );
        Ok(buffer)
    }
}

/// Resamples decoded frames into a growing stereo [`PcmBuffer`].
struct PcmSink {
    resampler: Option<ResamplingContext>,
    buffer: PcmBuffer,
    limit: Option<usize>,
}

impl PcmSink {
    fn new(limit: Option<usize>) -> Self {
        Self {
            resampler: None,
            buffer: PcmBuffer::silence(AUDIO_SAMPLE_RATE, 0),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.buffer.len() >= limit)
    }

    fn push(&mut self, frame: &AudioFrame) -> Result<(), String> {
        if frame.samples() == 0 || self.is_full() {
            return Ok(());
        }

        if self.resampler.is_none() {
            // The frame's own layout is passed through so that a source with
            // an unspecified channel order still matches on later frames.
            let resampler = ResamplingContext::get2(
                frame.format(),
                frame.ch_layout(),
                frame.rate(),
                Sample::F32(SampleType::Planar),
                ChannelLayout::STEREO,
                AUDIO_SAMPLE_RATE,
            )
            .map_err(|e| format!("cannot create resampler: {e}"))?;
            self.resampler = Some(resampler);
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };

        let capacity = frame.samples() * AUDIO_SAMPLE_RATE as usize / frame.rate().max(1) as usize
            + RESAMPLER_HEADROOM;
        let mut converted = output_frame(capacity);
        resampler
            .run(frame, &mut converted)
            .map_err(|e| format!("resampling failed: {e}"))?;
        self.append(&converted);
        Ok(())
    }

    /// Collect whatever the resampler still holds. Losing this tail only
    /// shortens the track by a few samples, so failures are logged.
    fn flush(&mut self) {
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        let mut converted = output_frame(RESAMPLER_HEADROOM);
        match resampler.flush(&mut converted) {
            Ok(_) => self.append(&converted),
            Err(e) => log::debug!("Resampler flush failed: {e}"),
        }
    }

    fn append(&mut self, frame: &AudioFrame) {
        let samples = frame.samples();
        if samples == 0 {
            return;
        }
        for channel in 0..CHANNELS {
            self.buffer.planes[channel].extend_from_slice(float_plane(frame, channel, samples));
        }
    }

    fn into_buffer(mut self) -> PcmBuffer {
        if let Some(limit) = self.limit {
            self.buffer.truncate(limit);
        }
        self.buffer
    }
}

/// Hand every frame the decoder has ready to `sink`.
fn receive_into(
    decoder: &mut ffmpeg_next::decoder::Audio,
    decoded: &mut AudioFrame,
    sink: &mut PcmSink,
) -> Result<(), String> {
    loop {
        match decoder.receive_frame(decoded) {
            Ok(()) => sink.push(decoded)?,
            Err(e) if is_drained(&e) => return Ok(()),
            Err(e) => return Err(format!("decode failed: {e}")),
        }
    }
}

/// Fill `out` from `source` starting at `offset`, wrapping to the start of
/// `source` whenever it runs out. An empty `source` yields silence.
fn fill_cyclic(source: &[f32], offset: usize, out: &mut [f32]) {
    if source.is_empty() {
        out.fill(0.0);
        return;
    }
    let mut position = offset % source.len();
    let mut written = 0;
    while written < out.len() {
        let run = (source.len() - position).min(out.len() - written);
        out[written..written + run].copy_from_slice(&source[position..position + run]);
        written += run;
        position = 0;
    }
}

/// An empty planar-float stereo frame with room for `capacity` samples.
fn output_frame(capacity: usize) -> AudioFrame {
    let mut frame = AudioFrame::new(
        Sample::F32(SampleType::Planar),
        capacity,
        ChannelLayoutMask::STEREO,
    );
    frame.set_rate(AUDIO_SAMPLE_RATE);
    frame
}

/// View one plane of a planar-float stereo frame.
fn float_plane(frame: &AudioFrame, channel: usize, samples: usize) -> &[f32] {
    // SAFETY: the frame was produced by a resampler configured for planar
    // f32 stereo, so data pointer `channel` holds `samples` aligned f32s.
    unsafe { std::slice::from_raw_parts(frame.data(channel).as_ptr() as *const f32, samples) }
}

/// Mutable view of one plane of a planar-float stereo frame.
fn float_plane_mut(frame: &mut AudioFrame, channel: usize, samples: usize) -> &mut [f32] {
    // SAFETY: the frame was allocated by `AudioFrame::new` as planar f32
    // stereo with room for `samples` samples per plane.
    unsafe {
        std::slice::from_raw_parts_mut(frame.data_mut(channel).as_mut_ptr() as *mut f32, samples)
    }
}

/// Decoded stereo audio as planar 32-bit floats.
///
/// Both planes always hold the same number of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    planes: [Vec<f32>; CHANNELS],
}

impl PcmBuffer {
    /// Build a buffer from left and right planes.
    ///
    /// The longer plane is cut to the length of the shorter one.
    pub fn from_stereo(sample_rate: u32, mut left: Vec<f32>, mut right: Vec<f32>) -> Self {
        let len = left.len().min(right.len());
        left.truncate(len);
        right.truncate(len);
        Self {
            sample_rate,
            planes: [left, right],
        }
    }

    /// Build a buffer that plays `samples` on both channels.
    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            planes: [samples.clone(), samples],
        }
    }

    /// `len` samples of silence.
    pub fn silence(sample_rate: u32, len: usize) -> Self {
        Self::from_mono(sample_rate, vec![0.0; len])
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.planes[0].len()
    }

    /// Returns `true` if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples per second.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Play length of the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    /// One channel's samples; `0` is left and `1` is right.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is not 0 or 1.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    /// Loop or truncate to exactly `target` samples per channel.
    ///
    /// A shorter buffer is repeated from its start as many times as needed
    /// and the last copy cut short; a longer one is cut. No fades are
    /// applied at the seams. An empty buffer is padded with silence.
    pub fn aligned_to(&self, target: usize) -> PcmBuffer {
        let planes = self.planes.each_ref().map(|plane| {
            let mut aligned = vec![0.0; target];
            fill_cyclic(plane, 0, &mut aligned);
            aligned
        });
        PcmBuffer {
            sample_rate: self.sample_rate,
            planes,
        }
    }

    fn truncate(&mut self, len: usize) {
        for plane in &mut self.planes {
            plane.truncate(len);
        }
    }

    /// Loop or truncate to cover `duration` exactly, rounded to the nearest sample.
    pub fn aligned_to_duration(&self, duration: Duration) -> PcmBuffer {
        self.aligned_to(duration_to_samples(duration, self.sample_rate))
    }
}

/// Encodes aligned PCM to AAC and muxes it with an encoded video stream.
#[derive(Debug, Clone, Copy)]
pub struct AudioAligner {
    sample_rate: u32,
    bit_rate: usize,
}

impl Default for AudioAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioAligner {
    /// An aligner producing [`AUDIO_SAMPLE_RATE`] Hz AAC at [`AUDIO_BIT_RATE`].
    pub fn new() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            bit_rate: AUDIO_BIT_RATE,
        }
    }

    /// Write `output` holding the video of `silent_video` plus `track`
    /// looped or truncated to `video_duration`.
    ///
    /// The video stream is copied without re-encoding. Returns the length of
    /// the audio that was written.
    ///
    /// # Errors
    ///
    /// - [`SlideReelError::UnreadableAudio`] if the track cannot be decoded.
    /// - [`SlideReelError::MuxError`] if the output cannot be written.
    pub fn mux<P, Q>(
        &self,
        silent_video: P,
        track: &AudioTrack,
        video_duration: Duration,
        output: Q,
    ) -> Result<Duration, SlideReelError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let silent_video = silent_video.as_ref();
        let output = output.as_ref();
        let target = duration_to_samples(video_duration, self.sample_rate);

        log::info!(
            "Muxing {} ({}) into {:?}, {target} samples",
            track.path().display(),
            track.format(),
            output,
        );

        // Only the source is held in memory; looping happens while encoding.
        let pcm = track.decode(Some(target))?;
        log::debug!(
            "Audio {} from {:.3}s to {:.3}s",
            if pcm.len() < target { "looped" } else { "truncated" },
            pcm.duration().as_secs_f64(),
            target as f64 / self.sample_rate as f64,
        );

        self.write(silent_video, pcm, target, output)?;
        Ok(Duration::from_secs_f64(target as f64 / self.sample_rate as f64))
    }

    fn write(
        &self,
        silent_video: &Path,
        pcm: PcmBuffer,
        target: usize,
        output: &Path,
    ) -> Result<(), SlideReelError> {
        let mux_error = |context: &str, e: ffmpeg_next::Error| {
            SlideReelError::MuxError(format!("{context}: {e}"))
        };

        let mut input = ffmpeg_next::format::input(&silent_video)
            .map_err(|e| mux_error("cannot open video", e))?;
        let mut octx = ffmpeg_next::format::output_as(&output, CONTAINER_FORMAT)
            .map_err(|e| mux_error("cannot open output", e))?;

        let (video_in_index, video_in_time_base) = {
            let stream = input
                .streams()
                .best(MediaType::Video)
                .ok_or_else(|| SlideReelError::MuxError("silent video has no video stream".to_string()))?;
            (stream.index(), stream.time_base())
        };

        let video_out_index = {
            let in_stream = input
                .stream(video_in_index)
                .ok_or_else(|| SlideReelError::MuxError("video stream vanished".to_string()))?;
            let mut out_stream = octx
                .add_stream(ffmpeg_next::encoder::find(Id::None))
                .map_err(|e| mux_error("cannot add video stream", e))?;
            out_stream.set_parameters(in_stream.parameters());
            // Let the muxer pick the tag for the target container.
            unsafe {
                (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
            out_stream.set_time_base(video_in_time_base);
            out_stream.index()
        };

        let mut aac = AacStream::open(&mut octx, pcm, target, self.sample_rate, self.bit_rate)?;

        octx.write_header()
            .map_err(|e| mux_error("cannot write header", e))?;

        let video_out_time_base = octx
            .stream(video_out_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| SlideReelError::MuxError("output video stream vanished".to_string()))?;
        aac.resolve_time_base(&octx)?;

        for (stream, mut packet) in input.packets() {
            if stream.index() != video_in_index {
                continue;
            }

            let video_time = packet
                .dts()
                .or(packet.pts())
                .map(|ts| pts_to_seconds(ts, video_in_time_base))
                .unwrap_or(0.0);
            while !aac.is_finished() && aac.position_seconds() <= video_time {
                aac.write_next(&mut octx)?;
            }

            packet.rescale_ts(video_in_time_base, video_out_time_base);
            packet.set_stream(video_out_index);
            packet.set_position(-1);
            packet
                .write_interleaved(&mut octx)
                .map_err(|e| mux_error("cannot write video packet", e))?;
        }

        while !aac.is_finished() {
            aac.write_next(&mut octx)?;
        }

        octx.write_trailer()
            .map_err(|e| mux_error("cannot write trailer", e))?;
        Ok(())
    }
}

/// AAC encoder feeding one output stream with `target` samples, read from
/// an in-memory PCM buffer that is looped or cut as needed.
struct AacStream {
    encoder: AudioEncoder,
    pcm: PcmBuffer,
    target: usize,
    cursor: usize,
    frame_size: usize,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    finished: bool,
}

impl AacStream {
    fn open(
        octx: &mut Output,
        pcm: PcmBuffer,
        target: usize,
        sample_rate: u32,
        bit_rate: usize,
    ) -> Result<Self, SlideReelError> {
        let mux_error = |context: &str, e: ffmpeg_next::Error| {
            SlideReelError::MuxError(format!("{context}: {e}"))
        };

        let codec = ffmpeg_next::encoder::find(Id::AAC)
            .ok_or_else(|| SlideReelError::MuxError("AAC encoder not available".to_string()))?;
        let needs_global_header = octx.format().flags().contains(FormatFlags::GLOBAL_HEADER);
        let time_base = Rational::new(1, sample_rate as i32);

        let mut encoder = CodecContext::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| mux_error("cannot create AAC encoder", e))?;
        encoder.set_rate(sample_rate as i32);
        encoder.set_ch_layout(ChannelLayout::STEREO);
        encoder.set_format(Sample::F32(SampleType::Planar));
        encoder.set_bit_rate(bit_rate);
        encoder.set_time_base(time_base);
        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder
            .open_as(codec)
            .map_err(|e| mux_error("cannot open AAC encoder", e))?;
        let frame_size = match encoder.frame_size() as usize {
            0 => FALLBACK_FRAME_SIZE,
            size => size,
        };

        let stream_index = {
            let mut stream = octx
                .add_stream(codec)
                .map_err(|e| mux_error("cannot add audio stream", e))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(time_base);
            stream.index()
        };

        Ok(Self {
            encoder,
            pcm,
            target,
            cursor: 0,
            frame_size,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base: time_base,
            finished: false,
        })
    }

    /// Pick up the time base the muxer settled on in `write_header`.
    fn resolve_time_base(&mut self, octx: &Output) -> Result<(), SlideReelError> {
        self.stream_time_base = octx
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| SlideReelError::MuxError("output audio stream vanished".to_string()))?;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    /// Start time of the next frame to be encoded.
    fn position_seconds(&self) -> f64 {
        self.cursor as f64 / self.pcm.sample_rate() as f64
    }

    /// Encode one frame, or flush the encoder once the buffer is exhausted.
    fn write_next(&mut self, octx: &mut Output) -> Result<(), SlideReelError> {
        if self.cursor >= self.target {
            self.encoder
                .send_eof()
                .map_err(|e| SlideReelError::MuxError(format!("AAC flush failed: {e}")))?;
            self.drain(octx)?;
            self.finished = true;
            return Ok(());
        }

        // The final frame may be short; the AAC encoder pads it internally.
        let samples = self.frame_size.min(self.target - self.cursor);
        let mut frame = output_frame(samples);
        frame.set_pts(Some(self.cursor as i64));
        for channel in 0..CHANNELS {
            fill_cyclic(
                self.pcm.channel(channel),
                self.cursor,
                float_plane_mut(&mut frame, channel, samples),
            );
        }
        self.cursor += samples;

        self.encoder
            .send_frame(&frame)
            .map_err(|e| SlideReelError::MuxError(format!("AAC encode failed: {e}")))?;
        self.drain(octx)
    }

    fn drain(&mut self, octx: &mut Output) -> Result<(), SlideReelError> {
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet.write_interleaved(octx).map_err(|e| {
                        SlideReelError::MuxError(format!("cannot write audio packet: {e}"))
                    })?;
                }
                Err(e) if is_drained(&e) => return Ok(()),
                Err(e) => {
                    return Err(SlideReelError::MuxError(format!("AAC encode failed: {e}")));
                }
            }
        }
    }
}
