//! Progress and cancellation integration tests.
//!
//! Render tests are skipped if FFmpeg lacks an H.264 or AAC encoder.

mod common;

use std::sync::{Arc, Mutex};

use slidereel::{
    CancellationToken, Mode, Pipeline, PipelineState, ProgressCallback, ProgressInfo,
    RenderEvent, RenderOptions, RenderRequest, SlideReelError, Stage, VideoEncoderOptions,
};

fn fast_options() -> RenderOptions {
    RenderOptions::new().with_encoder_options(VideoEncoderOptions::default().preset("ultrafast"))
}

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressInfo>>);

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.0.lock().unwrap().push(info.clone());
    }
}

/// Cancels its token once `after` images have been written.
struct CancelAfter {
    token: CancellationToken,
    after: u64,
}

impl ProgressCallback for CancelAfter {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.stage == Stage::Encoding && info.completed >= self.after {
            self.token.cancel();
        }
    }
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_default_not_cancelled() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    assert!(!CancellationToken::default().is_cancelled());
}

#[test]
fn cancellation_token_clone_shares_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());
}

// ── Progress reporting ─────────────────────────────────────────────

#[test]
fn progress_is_reported_once_per_image() {
    if !slidereel::encoders_available() {
        eprintln!("Skipping: FFmpeg encoders not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let images = common::write_images(dir.path(), 4, 32, 32);
    let request = RenderRequest::new(images, Mode::regular(0.5), dir.path().join("p.mp4"));

    let recorder = Arc::new(Recorder::default());
    let options = fast_options().with_progress(recorder.clone());
    Pipeline::run(&request, &options).unwrap();

    let seen = recorder.0.lock().unwrap();
    let encoding: Vec<_> = seen.iter().filter(|i| i.stage == Stage::Encoding).collect();
    assert_eq!(encoding.len(), 4);
    for (index, info) in encoding.iter().enumerate() {
        assert_eq!(info.completed, index as u64 + 1);
        assert_eq!(info.total, 4);
    }
    assert_eq!(encoding[3].percentage, 100.0);
    assert!(seen.iter().all(|i| i.stage != Stage::Muxing));
}

#[test]
fn progress_positions_are_image_boundaries() {
    if !slidereel::encoders_available() {
        eprintln!("Skipping: FFmpeg encoders not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let images = common::write_images(dir.path(), 3, 16, 16);
    let request = RenderRequest::new(images, Mode::regular(1.0), dir.path().join("b.mp4"));

    let recorder = Arc::new(Recorder::default());
    Pipeline::run(&request, &fast_options().with_progress(recorder.clone())).unwrap();

    let positions: Vec<_> = recorder
        .0
        .lock()
        .unwrap()
        .iter()
        .filter_map(|info| info.position)
        .map(|position| position.as_secs())
        .collect();
    assert_eq!(positions, [1, 2, 3]);
}

// ── Cancellation ───────────────────────────────────────────────────

#[test]
fn cancel_after_second_image_leaves_no_output() {
    if !slidereel::encoders_available() {
        eprintln!("Skipping: FFmpeg encoders not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let images = common::write_images(dir.path(), 5, 32, 32);
    let output = dir.path().join("cancelled.mp4");
    let request = RenderRequest::new(images, Mode::regular(1.0), &output);

    let token = CancellationToken::new();
    let progress = Arc::new(CancelAfter {
        token: token.clone(),
        after: 2,
    });
    let options = fast_options()
        .with_progress(progress)
        .with_cancellation(token);

    let err = Pipeline::run(&request, &options).unwrap_err();
    assert!(matches!(err, SlideReelError::Cancelled));
    assert!(!output.exists());
    assert!(common::leftover_temporaries(dir.path()).is_empty());
}

#[test]
fn cancelled_before_start_writes_nothing() {
    if !slidereel::encoders_available() {
        eprintln!("Skipping: FFmpeg encoders not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let images = common::write_images(dir.path(), 2, 16, 16);
    let output = dir.path().join("never.mp4");
    let request = RenderRequest::new(images, Mode::Shorts, &output);

    let token = CancellationToken::new();
    token.cancel();
    let err = Pipeline::run(&request, &fast_options().with_cancellation(token)).unwrap_err();
    assert!(err.is_cancelled());
    assert!(!output.exists());
    assert!(common::leftover_temporaries(dir.path()).is_empty());
}

#[test]
fn handle_cancel_stops_worker() {
    if !slidereel::encoders_available() {
        eprintln!("Skipping: FFmpeg encoders not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let images = common::write_images(dir.path(), 30, 64, 64);
    let output = dir.path().join("stopped.mp4");
    let request = RenderRequest::new(images, Mode::regular(2.0), &output);

    let handle = Pipeline::spawn(request, fast_options()).unwrap();
    let mut states = Vec::new();
    for event in handle.events() {
        match event {
            RenderEvent::Progress(info) if info.completed == 1 => handle.cancel(),
            RenderEvent::State(state) => states.push(state),
            RenderEvent::Progress(_) => {}
        }
    }

    let err = handle.wait().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(states.last(), Some(&PipelineState::Failed));
    assert!(!output.exists());
}
