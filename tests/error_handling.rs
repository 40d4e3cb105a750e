//! Error classification and fail-fast validation tests.
//!
//! None of these reach the encoder, so they run without FFmpeg codecs.

mod common;

use std::path::PathBuf;

use slidereel::{
    ErrorKind, Mode, Pipeline, RenderOptions, RenderRequest, SlideReelError, validate,
};

fn missing_images(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("/nonexistent/slidereel/{i}.png")))
        .collect()
}

// ── Error kinds ────────────────────────────────────────────────────

#[test]
fn error_kinds_display_in_kebab_case() {
    assert_eq!(ErrorKind::InvalidDuration.to_string(), "invalid-duration");
    assert_eq!(ErrorKind::UnwritableOutputPath.to_string(), "unwritable-output-path");
    assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
}

#[test]
fn io_errors_convert_and_classify_as_encoding() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
    let err: SlideReelError = io.into();
    assert_eq!(err.kind(), ErrorKind::EncodingError);
    assert!(err.to_string().contains("disk on fire"));
}

#[test]
fn cancelled_is_distinguishable() {
    assert!(SlideReelError::Cancelled.is_cancelled());
    assert!(!SlideReelError::EmptyImageSet.is_cancelled());
    assert_eq!(SlideReelError::Cancelled.kind(), ErrorKind::Cancelled);
}

// ── Validation order ───────────────────────────────────────────────

#[test]
fn empty_request_is_rejected_first() {
    let request = RenderRequest::new(Vec::new(), Mode::regular(-1.0), "/nonexistent/out.mp4");
    let err = validate(&request, 30).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyImageSet);
}

#[test]
fn invalid_duration_is_reported_before_output_and_images() {
    let request = RenderRequest::new(missing_images(2), Mode::regular(0.0), "/nonexistent/out.mp4");
    let err = validate(&request, 30).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDuration);
}

#[test]
fn unwritable_output_is_reported_before_any_image_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("missing_dir").join("out.mp4");
    let request = RenderRequest::new(missing_images(3), Mode::Shorts, &output);

    let err = Pipeline::run(&request, &RenderOptions::new()).unwrap_err();
    match err {
        SlideReelError::UnwritableOutputPath { path, .. } => assert_eq!(path, output),
        other => panic!("expected UnwritableOutputPath, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn output_that_is_a_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let request = RenderRequest::new(missing_images(1), Mode::Shorts, dir.path());
    let err = validate(&request, 30).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnwritableOutputPath);
}

#[test]
fn first_unreadable_image_is_named() {
    let dir = tempfile::tempdir().unwrap();
    let good = common::write_image(&dir.path().join("good.png"), 4, 4, [1, 2, 3]);
    let bad = dir.path().join("bad.tiff");
    std::fs::write(&bad, b"II*\0").unwrap();

    let request = RenderRequest::new(vec![good, bad.clone()], Mode::Shorts, dir.path().join("o.mp4"));
    match validate(&request, 30).unwrap_err() {
        SlideReelError::UnreadableImage { path, .. } => assert_eq!(path, bad),
        other => panic!("expected UnreadableImage, got {other:?}"),
    }
}

#[test]
fn missing_audio_is_reported_after_images() {
    let dir = tempfile::tempdir().unwrap();
    let image = common::write_image(&dir.path().join("a.png"), 4, 4, [1, 2, 3]);
    let request = RenderRequest::new(vec![image], Mode::Shorts, dir.path().join("o.mp4"))
        .with_audio(dir.path().join("missing.mp3"));

    let err = validate(&request, 30).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreadableAudio);
}

#[test]
fn valid_request_produces_plan_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let images = common::write_images(dir.path(), 4, 6, 6);
    let output = dir.path().join("plan.mp4");
    let request = RenderRequest::new(images, Mode::regular(1.5), &output);

    let plan = validate(&request, 30).unwrap();
    assert_eq!(plan.images.len(), 4);
    assert_eq!(plan.timeline.total_frames(), 180);
    assert!(plan.audio.is_none());
    assert_eq!(plan.output, output);
    assert_eq!(plan.output_dir, dir.path());

    assert!(!output.exists());
    assert!(common::leftover_temporaries(dir.path()).is_empty());
}

#[test]
fn failed_validation_leaves_existing_output_alone() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("keep.mp4");
    std::fs::write(&output, b"previous render").unwrap();

    let request = RenderRequest::new(missing_images(2), Mode::Shorts, &output);
    assert!(Pipeline::run(&request, &RenderOptions::new()).is_err());
    assert_eq!(std::fs::read(&output).unwrap(), b"previous render");
}
