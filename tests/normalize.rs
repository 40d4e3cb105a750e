//! Frame normalizer integration tests.
//!
//! Fixture images are generated into a temporary directory per test.

mod common;

use slidereel::{
    Canvas, CanvasPolicy, ErrorKind, FitPolicy, FrameNormalizer, ImageFormat, ImageSet,
    ImageSource, Mode, SlideReelError,
};

use common::{close_to, write_image};

const RED: [u8; 3] = [220, 40, 40];
const GREEN: [u8; 3] = [40, 200, 60];
const BLUE: [u8; 3] = [0, 0, 255];

// ── Image sets ─────────────────────────────────────────────────────

#[test]
fn image_set_keeps_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let b = write_image(&dir.path().join("b.png"), 4, 4, RED);
    let a = write_image(&dir.path().join("a.png"), 4, 4, GREEN);

    let set = ImageSet::new([&b, &a]).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.sources()[0].path(), b.as_path());
    assert_eq!(set.sources()[1].path(), a.as_path());
}

#[test]
fn empty_image_set_is_rejected() {
    let err = ImageSet::new(Vec::<std::path::PathBuf>::new()).unwrap_err();
    assert!(matches!(err, SlideReelError::EmptyImageSet));
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anim.gif");
    std::fs::write(&path, b"GIF89a").unwrap();

    let err = ImageSource::new(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreadableImage);
    assert!(err.to_string().contains("anim.gif"));
}

#[test]
fn missing_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = ImageSource::new(dir.path().join("missing.jpg")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreadableImage);
}

#[test]
fn formats_detected_from_extension() {
    assert_eq!(ImageFormat::from_path("a.PNG"), Some(ImageFormat::Png));
    assert_eq!(ImageFormat::from_path("b.jpeg"), Some(ImageFormat::Jpeg));
    assert_eq!(ImageFormat::from_path("c.JPG"), Some(ImageFormat::Jpeg));
    assert_eq!(ImageFormat::from_path("d.bmp"), Some(ImageFormat::Bmp));
    assert_eq!(ImageFormat::from_path("e.webp"), None);
}

#[test]
fn directory_listing_is_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    write_image(&dir.path().join("b.png"), 4, 4, RED);
    write_image(&dir.path().join("a.jpg"), 4, 4, GREEN);
    write_image(&dir.path().join("c.bmp"), 4, 4, BLUE);
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let set = ImageSet::from_directory(dir.path()).unwrap();
    let names: Vec<_> = set
        .sources()
        .iter()
        .map(|source| source.path().file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.jpg", "b.png", "c.bmp"]);
    assert_eq!(set.sources()[0].format(), ImageFormat::Jpeg);
}

#[test]
fn directory_without_images_is_empty_set() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "# nothing").unwrap();
    let err = ImageSet::from_directory(dir.path()).unwrap_err();
    assert!(matches!(err, SlideReelError::EmptyImageSet));
}

// ── Canvas ─────────────────────────────────────────────────────────

#[test]
fn canvas_from_first_image_is_even() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_image(&dir.path().join("1.png"), 101, 57, RED);
    let second = write_image(&dir.path().join("2.png"), 300, 300, GREEN);
    let set = ImageSet::new([first, second]).unwrap();

    let canvas = Canvas::derive(CanvasPolicy::FirstImage, set.sources(), Mode::Shorts).unwrap();
    assert_eq!(canvas, Canvas { width: 100, height: 56 });
}

#[test]
fn canvas_from_largest_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let wide = write_image(&dir.path().join("wide.png"), 40, 30, RED);
    let tall = write_image(&dir.path().join("tall.png"), 20, 60, GREEN);
    let set = ImageSet::new([wide, tall]).unwrap();

    let canvas =
        Canvas::derive(CanvasPolicy::LargestImage, set.sources(), Mode::regular(1.0)).unwrap();
    assert_eq!(canvas, Canvas { width: 40, height: 60 });
}

#[test]
fn canvas_presets_follow_mode() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(&dir.path().join("x.png"), 8, 8, RED);
    let set = ImageSet::new([image]).unwrap();

    let shorts = Canvas::derive(CanvasPolicy::ModePreset, set.sources(), Mode::Shorts).unwrap();
    assert_eq!(shorts.to_string(), "1080x1920");
    let regular =
        Canvas::derive(CanvasPolicy::ModePreset, set.sources(), Mode::regular(2.0)).unwrap();
    assert_eq!(regular.to_string(), "1920x1080");

    let fixed = Canvas::derive(
        CanvasPolicy::Fixed {
            width: 33,
            height: 33,
        },
        set.sources(),
        Mode::Shorts,
    )
    .unwrap();
    assert_eq!(fixed, Canvas::new(32, 32));
}

// ── Fit policies ───────────────────────────────────────────────────

#[test]
fn letterbox_pads_with_background() {
    let dir = tempfile::tempdir().unwrap();
    let source = ImageSource::new(write_image(&dir.path().join("w.png"), 100, 50, RED)).unwrap();

    let frame = FrameNormalizer::new(Canvas::new(100, 100), FitPolicy::Letterbox)
        .with_background(BLUE)
        .normalize(&source)
        .unwrap();

    assert_eq!(frame.image.dimensions(), (100, 100));
    assert_eq!(frame.image.get_pixel(50, 5).0, BLUE);
    assert_eq!(frame.image.get_pixel(50, 95).0, BLUE);
    assert_eq!(frame.image.get_pixel(50, 50).0, RED);
    assert_eq!(frame.source, source.path());
}

#[test]
fn blurred_background_fills_bars_with_image() {
    let dir = tempfile::tempdir().unwrap();
    let source = ImageSource::new(write_image(&dir.path().join("t.png"), 50, 100, GREEN)).unwrap();

    let frame = FrameNormalizer::new(Canvas::new(100, 100), FitPolicy::BlurredBackground)
        .normalize(&source)
        .unwrap();

    assert!(close_to(frame.image.get_pixel(2, 50), GREEN, 3));
    assert!(close_to(frame.image.get_pixel(50, 50), GREEN, 0));
}

#[test]
fn stretch_ignores_aspect_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let source = ImageSource::new(write_image(&dir.path().join("s.png"), 50, 100, RED)).unwrap();

    let frame = FrameNormalizer::new(Canvas::new(120, 60), FitPolicy::Stretch)
        .normalize(&source)
        .unwrap();

    assert_eq!(frame.image.dimensions(), (120, 60));
    for (x, y) in [(0, 0), (119, 0), (60, 30), (0, 59), (119, 59)] {
        assert!(close_to(frame.image.get_pixel(x, y), RED, 2), "({x}, {y})");
    }
}

#[test]
fn every_policy_produces_canvas_sized_frames() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = [(10, 10), (64, 16), (16, 64), (31, 17)];
    let paths: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, &(w, h))| write_image(&dir.path().join(format!("{i}.bmp")), w, h, RED))
        .collect();
    let set = ImageSet::new(paths).unwrap();
    let canvas = Canvas::new(48, 36);

    for fit in [FitPolicy::Letterbox, FitPolicy::BlurredBackground, FitPolicy::Stretch] {
        let normalizer = FrameNormalizer::new(canvas, fit);
        for frame in normalizer.stream(set.sources()) {
            assert_eq!(frame.unwrap().image.dimensions(), (48, 36), "{fit:?}");
        }
    }
}

#[test]
fn jpeg_inputs_are_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let source = ImageSource::new(write_image(&dir.path().join("p.jpg"), 40, 20, GREEN)).unwrap();
    let frame = FrameNormalizer::new(Canvas::new(40, 20), FitPolicy::Letterbox)
        .normalize(&source)
        .unwrap();
    assert!(close_to(frame.image.get_pixel(20, 10), GREEN, 12));
}

// ── Streaming ──────────────────────────────────────────────────────

#[test]
fn stream_is_ordered_and_exact_size() {
    let dir = tempfile::tempdir().unwrap();
    let paths = common::write_images(dir.path(), 3, 8, 8);
    let set = ImageSet::new(paths.clone()).unwrap();
    let normalizer = FrameNormalizer::new(Canvas::new(8, 8), FitPolicy::Letterbox);

    let stream = normalizer.stream(set.sources());
    assert_eq!(stream.len(), 3);
    let sources: Vec<_> = stream.map(|frame| frame.unwrap().source).collect();
    assert_eq!(sources, paths);
}

#[test]
fn corrupt_image_fails_on_decode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not a png").unwrap();

    // Existence and extension pass; content is only checked when decoded.
    let source = ImageSource::new(&path).unwrap();
    let err = FrameNormalizer::new(Canvas::new(8, 8), FitPolicy::Letterbox)
        .normalize(&source)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreadableImage);
    assert_eq!(source.dimensions().unwrap_err().kind(), ErrorKind::UnreadableImage);
}
