//! Render orchestration.
//!
//! [`Pipeline`] runs one render from a [`RenderRequest`] to a finished file,
//! moving through [`PipelineState`]s in a fixed order:
//!
//! ```text
//! Idle → Validating → Normalizing → Encoding → (Muxing) → Done
//!                         any non-terminal state → Failed
//! ```
//!
//! Every intermediate artifact is a temporary file next to the output. The
//! output path itself is only touched once, by an atomic rename of the
//! finished file; on failure or cancellation the temporaries are deleted and
//! the output path is left as it was.
//!
//! # Example
//!
//! ```no_run
//! use slidereel::{Mode, Pipeline, RenderEvent, RenderOptions, RenderRequest};
//!
//! let request = RenderRequest::new(
//!     vec!["one.jpg".into(), "two.jpg".into()],
//!     Mode::regular(3.0),
//!     "slideshow.mp4",
//! )
//! .with_audio("music.mp3");
//!
//! let handle = Pipeline::spawn(request, RenderOptions::new())?;
//! for event in handle.events() {
//!     match event {
//!         RenderEvent::State(state) => println!("{state}"),
//!         RenderEvent::Progress(info) => println!("{}/{}", info.completed, info.total),
//!     }
//! }
//! let output = handle.wait()?;
//! println!("wrote {} ({:?})", output.path.display(), output.duration);
//! # Ok::<(), slidereel::SlideReelError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tempfile::TempPath;

use crate::audio::AudioAligner;
use crate::configuration::{Mode, RenderOptions};
use crate::encode::{EncodeHooks, VideoEncoder};
use crate::error::SlideReelError;
use crate::normalize::{Canvas, FrameNormalizer};
use crate::progress::{CancellationToken, ProgressCallback, ProgressInfo, ProgressTracker, Stage};
use crate::validation::{self, RenderPlan, TEMP_PREFIX};

/// What to render. Built once from UI state and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Image files in display order.
    pub images: Vec<PathBuf>,
    /// Optional background audio file.
    pub audio: Option<PathBuf>,
    /// Duration regime.
    pub mode: Mode,
    /// Destination of the finished MP4.
    pub output: PathBuf,
}

impl RenderRequest {
    /// A request without audio.
    pub fn new(images: Vec<PathBuf>, mode: Mode, output: impl Into<PathBuf>) -> Self {
        Self {
            images,
            audio: None,
            mode,
            output: output.into(),
        }
    }

    /// Add a background audio track.
    #[must_use]
    pub fn with_audio(mut self, audio: impl Into<PathBuf>) -> Self {
        self.audio = Some(audio.into());
        self
    }
}

/// Lifecycle of one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Checking the request; nothing has been written.
    Validating,
    /// Deciding the canvas from image headers.
    Normalizing,
    /// Decoding images and encoding video frames.
    Encoding,
    /// Aligning audio and muxing it with the video.
    Muxing,
    /// The output file is in place.
    Done,
    /// The render stopped with an error or was cancelled.
    Failed,
}

impl PipelineState {
    /// Returns `true` for [`Done`](Self::Done) and [`Failed`](Self::Failed).
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether a render may move from `self` to `next`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Validating)
            | (Validating, Normalizing)
            | (Normalizing, Encoding)
            | (Encoding, Muxing)
            | (Encoding, Done)
            | (Muxing, Done) => true,
            _ => false,
        }
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Normalizing => "normalizing",
            PipelineState::Encoding => "encoding",
            PipelineState::Muxing => "muxing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The finished artifact of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    /// Where the file was written.
    pub path: PathBuf,
    /// Length of the video.
    pub duration: Duration,
    /// Images shown in the video.
    pub images_rendered: usize,
    /// Images left out by the Shorts duration cap.
    pub images_dropped: usize,
    /// Video frames written.
    pub frames_written: u64,
    /// Frame size of the video.
    pub canvas: Canvas,
    /// Whether an audio track was muxed in.
    pub has_audio: bool,
}

/// A message from a render running on a worker thread.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// The render entered a new state.
    State(PipelineState),
    /// A unit of work finished.
    Progress(ProgressInfo),
}

/// Entry point for rendering.
pub struct Pipeline;

impl Pipeline {
    /// Render on the calling thread and block until finished.
    ///
    /// # Errors
    ///
    /// Any [`SlideReelError`]; validation errors are returned before any file
    /// is written, and [`SlideReelError::Cancelled`] if `options` carries a
    /// token that gets cancelled.
    pub fn run(request: &RenderRequest, options: &RenderOptions) -> Result<RenderOutput, SlideReelError> {
        Run::new(None).execute(request, options)
    }

    /// Render on a dedicated worker thread.
    ///
    /// State changes and progress arrive on [`RenderHandle::events`]. The
    /// progress callback in `options`, if any, is still called as well. If
    /// `options` has no cancellation token, one is created so that
    /// [`RenderHandle::cancel`] works.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::Io`] if the thread cannot be started.
    pub fn spawn(request: RenderRequest, options: RenderOptions) -> Result<RenderHandle, SlideReelError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let token = options.cancellation.clone().unwrap_or_default();

        let progress: Arc<dyn ProgressCallback> = Arc::new(ChannelProgress {
            sender: sender.clone(),
            inner: Arc::clone(&options.progress),
        });
        let options = options
            .with_progress(progress)
            .with_cancellation(token.clone());

        let thread = std::thread::Builder::new()
            .name("slidereel-render".to_string())
            .spawn(move || Run::new(Some(sender)).execute(&request, &options))?;

        Ok(RenderHandle {
            events: receiver,
            token,
            thread,
        })
    }
}

/// A render running on a worker thread.
pub struct RenderHandle {
    events: Receiver<RenderEvent>,
    token: CancellationToken,
    thread: JoinHandle<Result<RenderOutput, SlideReelError>>,
}

impl RenderHandle {
    /// Events from the worker. Iterating it ends once the render finishes.
    pub fn events(&self) -> &Receiver<RenderEvent> {
        &self.events
    }

    /// Ask the render to stop at the next image boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The token [`cancel`](Self::cancel) flips.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns `true` once the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the render finishes and return its result.
    ///
    /// A panic on the worker is reported as [`SlideReelError::EncodingError`].
    pub fn wait(self) -> Result<RenderOutput, SlideReelError> {
        self.thread
            .join()
            .map_err(|_| SlideReelError::EncodingError("render thread panicked".to_string()))?
    }
}

/// Forwards progress to a channel, after the caller's own callback.
struct ChannelProgress {
    sender: Sender<RenderEvent>,
    inner: Arc<dyn ProgressCallback>,
}

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.inner.on_progress(info);
        // A dropped receiver only means nobody is listening.
        let _ = self.sender.send(RenderEvent::Progress(info.clone()));
    }
}

/// State of one render in flight.
struct Run {
    state: PipelineState,
    events: Option<Sender<RenderEvent>>,
}

impl Run {
    fn new(events: Option<Sender<RenderEvent>>) -> Self {
        Self {
            state: PipelineState::Idle,
            events,
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<(), SlideReelError> {
        if !self.state.can_transition_to(next) {
            return Err(SlideReelError::EncodingError(format!(
                "illegal pipeline transition {} -> {next}",
                self.state
            )));
        }
        log::debug!("Pipeline {} -> {next}", self.state);
        self.state = next;
        if let Some(events) = &self.events {
            let _ = events.send(RenderEvent::State(next));
        }
        Ok(())
    }

    fn execute(mut self, request: &RenderRequest, options: &RenderOptions) -> Result<RenderOutput, SlideReelError> {
        log::info!(
            "Rendering {} images ({}) to {}",
            request.images.len(),
            request.mode,
            request.output.display(),
        );

        let result = self.render(request, options);
        match &result {
            Ok(output) => log::info!(
                "Rendered {} ({:.2}s, {} frames)",
                output.path.display(),
                output.duration.as_secs_f64(),
                output.frames_written,
            ),
            Err(error) => {
                log::info!("Render failed: {error}");
                if !self.state.is_terminal() {
                    self.advance(PipelineState::Failed)?;
                }
            }
        }
        result
    }

    fn render(&mut self, request: &RenderRequest, options: &RenderOptions) -> Result<RenderOutput, SlideReelError> {
        let frame_rate = options.encoder.fps;

        self.advance(PipelineState::Validating)?;
        let RenderPlan {
            images,
            timeline,
            audio,
            output,
            output_dir,
        } = validation::validate(request, frame_rate)?;
        crate::ffmpeg::initialize()?;

        self.advance(PipelineState::Normalizing)?;
        let sources = &images.sources()[..timeline.rendered_images()];
        let canvas = Canvas::derive(options.canvas, sources, request.mode)?;
        let normalizer = FrameNormalizer::new(canvas, options.fit).with_background(options.background);

        self.advance(PipelineState::Encoding)?;
        let silent = temp_path(&output_dir, &output)?;
        let hooks = EncodeHooks {
            progress: Arc::clone(&options.progress),
            cancellation: options.cancellation.clone(),
        };
        let summary = VideoEncoder::new(options.encoder.clone()).encode(
            &silent,
            normalizer.stream(sources),
            &timeline,
            &hooks,
        )?;
        if summary.frames_written != timeline.total_frames() {
            return Err(SlideReelError::EncodingError(format!(
                "wrote {} frames, expected {}",
                summary.frames_written,
                timeline.total_frames(),
            )));
        }

        let finished = match &audio {
            Some(track) => {
                if options.is_cancelled() {
                    return Err(SlideReelError::Cancelled);
                }
                self.advance(PipelineState::Muxing)?;

                let muxed = temp_path(&output_dir, &output)?;
                let mut tracker = ProgressTracker::new(Arc::clone(&options.progress), Stage::Muxing, 1);
                let audio_duration =
                    AudioAligner::new().mux(&silent, track, timeline.total_duration(), &muxed)?;
                tracker.advance(Some(audio_duration));

                if let Err(e) = silent.close() {
                    log::warn!("Could not remove intermediate video: {e}");
                }
                muxed
            }
            None => silent,
        };

        if options.is_cancelled() {
            return Err(SlideReelError::Cancelled);
        }

        inherit_permissions(&finished, &output)?;
        finished
            .persist(&output)
            .map_err(|e| SlideReelError::unwritable_output(&output, e.error))?;
        self.advance(PipelineState::Done)?;

        Ok(RenderOutput {
            path: output,
            duration: timeline.total_duration(),
            images_rendered: timeline.rendered_images(),
            images_dropped: timeline.dropped_images(),
            frames_written: summary.frames_written,
            canvas: summary.canvas,
            has_audio: audio.is_some(),
        })
    }
}

/// A hidden temporary file next to `output`, deleted when dropped.
///
/// On Unix the file is created `0666` minus the umask, like any file a
/// program writes, rather than tempfile's owner-only default.
fn temp_path(dir: &Path, output: &Path) -> Result<TempPath, SlideReelError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX).suffix(".mp4");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let file = builder
        .tempfile_in(dir)
        .map_err(|e| SlideReelError::unwritable_output(output, e))?;
    Ok(file.into_temp_path())
}

/// Give `finished` the permissions of the file it is about to replace.
fn inherit_permissions(finished: &Path, output: &Path) -> Result<(), SlideReelError> {
    match fs::metadata(output) {
        Ok(existing) => fs::set_permissions(finished, existing.permissions())
            .map_err(|e| SlideReelError::unwritable_output(output, e)),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        use PipelineState::*;
        let with_audio = [Idle, Validating, Normalizing, Encoding, Muxing, Done];
        for pair in with_audio.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Encoding.can_transition_to(Done));
    }

    #[test]
    fn terminal_states_are_final() {
        use PipelineState::*;
        for next in [Idle, Validating, Normalizing, Encoding, Muxing, Done, Failed] {
            assert!(!Done.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn stages_cannot_be_skipped() {
        use PipelineState::*;
        assert!(!Idle.can_transition_to(Encoding));
        assert!(!Validating.can_transition_to(Done));
        assert!(!Muxing.can_transition_to(Encoding));
        assert!(Normalizing.can_transition_to(Failed));
    }

    #[test]
    fn failure_is_reported_through_events() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let request = RenderRequest::new(Vec::new(), Mode::Shorts, "out.mp4");
        let result = Run::new(Some(sender)).execute(&request, &RenderOptions::new());

        assert!(matches!(result, Err(SlideReelError::EmptyImageSet)));
        let states: Vec<_> = receiver
            .try_iter()
            .filter_map(|event| match event {
                RenderEvent::State(state) => Some(state),
                RenderEvent::Progress(_) => None,
            })
            .collect();
        assert_eq!(states, vec![PipelineState::Validating, PipelineState::Failed]);
    }
}
