//! Frame normalization.
//!
//! Turns image files of arbitrary size and orientation into RGB24 frames of
//! one fixed [`Canvas`] size, ready for the encoder's pixel-format scaler.
//!
//! The canvas is decided once per run from image headers alone (see
//! [`Canvas::derive`]); frames are produced lazily, one image at a time, by a
//! [`FrameStream`], so at most one decoded image is held in memory.
//!
//! # Example
//!
//! ```no_run
//! use slidereel::{Canvas, CanvasPolicy, FitPolicy, FrameNormalizer, ImageSet, Mode};
//!
//! let images = ImageSet::from_directory("photos")?;
//! let canvas = Canvas::derive(CanvasPolicy::FirstImage, images.sources(), Mode::Shorts)?;
//! let normalizer = FrameNormalizer::new(canvas, FitPolicy::Letterbox);
//!
//! for frame in normalizer.stream(images.sources()) {
//!     let frame = frame?;
//!     assert_eq!(frame.image.dimensions(), (canvas.width, canvas.height));
//! }
//! # Ok::<(), slidereel::SlideReelError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};

use crate::configuration::{CanvasPolicy, FitPolicy, LANDSCAPE_CANVAS, Mode, PORTRAIT_CANVAS};
use crate::error::SlideReelError;

/// Downscale factor applied before blurring a background fill.
const BLUR_DOWNSCALE: u32 = 8;

/// Gaussian sigma of the background blur, in downscaled pixels.
const BLUR_SIGMA: f32 = 6.0;

/// Still-image formats accepted as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Portable Network Graphics (`.png`).
    Png,
    /// JPEG (`.jpg`, `.jpeg`).
    Jpeg,
    /// Windows bitmap (`.bmp`).
    Bmp,
}

impl ImageFormat {
    /// Detect the format from a file extension, case-insensitively.
    ///
    /// Returns `None` for anything outside the supported set.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    fn as_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ImageFormat::Png => f.write_str("PNG"),
            ImageFormat::Jpeg => f.write_str("JPEG"),
            ImageFormat::Bmp => f.write_str("BMP"),
        }
    }
}

/// One input image: its path and detected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    path: PathBuf,
    format: ImageFormat,
}

impl ImageSource {
    /// Check a path's extension and existence.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::UnreadableImage`] if the extension is not a
    /// supported format or the file does not exist.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self, SlideReelError> {
        let path = path.into();
        let format = ImageFormat::from_path(&path).ok_or_else(|| {
            SlideReelError::unreadable_image(&path, "unsupported image format (expected PNG, JPEG or BMP)")
        })?;
        if !path.is_file() {
            return Err(SlideReelError::unreadable_image(&path, "file does not exist"));
        }
        Ok(Self { path, format })
    }

    /// The image's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The image's format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Read `(width, height)` from the file header without decoding pixels.
    pub fn dimensions(&self) -> Result<(u32, u32), SlideReelError> {
        let (width, height) = image::image_dimensions(&self.path)
            .map_err(|e| SlideReelError::unreadable_image(&self.path, e))?;
        if width == 0 || height == 0 {
            return Err(SlideReelError::unreadable_image(&self.path, "image has zero size"));
        }
        Ok((width, height))
    }

    /// Fully decode the image and apply its EXIF orientation.
    fn decode(&self) -> Result<DynamicImage, SlideReelError> {
        let unreadable = |e: image::ImageError| SlideReelError::unreadable_image(&self.path, e);

        let mut reader = ImageReader::open(&self.path)
            .map_err(|e| SlideReelError::unreadable_image(&self.path, e))?;
        reader.set_format(self.format.as_image_format());

        let mut decoder = reader.into_decoder().map_err(unreadable)?;
        let orientation = decoder.orientation().map_err(unreadable)?;
        let mut image = DynamicImage::from_decoder(decoder).map_err(unreadable)?;
        image.apply_orientation(orientation);

        if image.width() == 0 || image.height() == 0 {
            return Err(SlideReelError::unreadable_image(&self.path, "image has zero size"));
        }
        Ok(image)
    }
}

/// An ordered, non-empty list of input images.
///
/// Insertion order is display order.
#[derive(Debug, Clone)]
pub struct ImageSet {
    sources: Vec<ImageSource>,
}

impl ImageSet {
    /// Build a set from paths, checking each one's format and existence.
    ///
    /// # Errors
    ///
    /// - [`SlideReelError::EmptyImageSet`] if `paths` is empty.
    /// - [`SlideReelError::UnreadableImage`] for the first path that fails
    ///   [`ImageSource::new`].
    pub fn new<I, P>(paths: I) -> Result<Self, SlideReelError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources = paths
            .into_iter()
            .map(ImageSource::new)
            .collect::<Result<Vec<_>, _>>()?;
        if sources.is_empty() {
            return Err(SlideReelError::EmptyImageSet);
        }
        Ok(Self { sources })
    }

    /// Collect every supported image directly inside `dir`, sorted by file name.
    ///
    /// Files with other extensions are skipped; subdirectories are not visited.
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self, SlideReelError> {
        let dir = dir.as_ref();
        let entries =
            std::fs::read_dir(dir).map_err(|e| SlideReelError::unreadable_image(dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| SlideReelError::unreadable_image(dir, e))?.path();
            if path.is_file() && ImageFormat::from_path(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        log::debug!("Found {} images in {}", paths.len(), dir.display());
        Self::new(paths)
    }

    /// The images, in display order.
    pub fn sources(&self) -> &[ImageSource] {
        &self.sources
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Always `false`; an `ImageSet` cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Output frame size, fixed for a whole run.
///
/// Both dimensions are even and at least 2, as YUV 4:2:0 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Round `width × height` down to even values, clamped to at least 2×2.
    pub fn new(width: u32, height: u32) -> Self {
        let even = |v: u32| (v / 2 * 2).max(2);
        Self {
            width: even(width),
            height: even(height),
        }
    }

    /// Decide the canvas for `images` under `policy`.
    ///
    /// Only image headers are read. Header dimensions do not account for
    /// EXIF rotation; rotated images are fitted onto the canvas like any
    /// other mismatched aspect ratio.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::UnreadableImage`] if a header that is needed cannot
    /// be read, or [`SlideReelError::EmptyImageSet`] if `images` is empty.
    pub fn derive(
        policy: CanvasPolicy,
        images: &[ImageSource],
        mode: Mode,
    ) -> Result<Self, SlideReelError> {
        let first = images.first().ok_or(SlideReelError::EmptyImageSet)?;

        let canvas = match policy {
            CanvasPolicy::FirstImage => {
                let (width, height) = first.dimensions()?;
                Self::new(width, height)
            }
            CanvasPolicy::LargestImage => {
                let (mut width, mut height) = (0, 0);
                for source in images {
                    let (w, h) = source.dimensions()?;
                    width = width.max(w);
                    height = height.max(h);
                }
                Self::new(width, height)
            }
            CanvasPolicy::Fixed { width, height } => Self::new(width, height),
            CanvasPolicy::ModePreset => {
                let (width, height) = if mode.is_shorts() {
                    PORTRAIT_CANVAS
                } else {
                    LANDSCAPE_CANVAS
                };
                Self::new(width, height)
            }
        };

        log::debug!("Canvas {canvas} ({policy:?})");
        Ok(canvas)
    }
}

impl Display for Canvas {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One image fitted to the canvas.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    /// The image file this frame came from.
    pub source: PathBuf,
    /// Canvas-sized RGB24 pixels.
    pub image: RgbImage,
}

/// Decodes images and fits them onto a fixed canvas.
#[derive(Debug, Clone)]
pub struct FrameNormalizer {
    canvas: Canvas,
    fit: FitPolicy,
    background: Rgb<u8>,
}

impl FrameNormalizer {
    /// Create a normalizer with a black letterbox colour.
    pub fn new(canvas: Canvas, fit: FitPolicy) -> Self {
        Self {
            canvas,
            fit,
            background: Rgb([0, 0, 0]),
        }
    }

    /// Set the colour used to pad [`FitPolicy::Letterbox`] frames.
    #[must_use]
    pub fn with_background(mut self, rgb: [u8; 3]) -> Self {
        self.background = Rgb(rgb);
        self
    }

    /// The canvas every frame is fitted to.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Decode one image and fit it to the canvas.
    ///
    /// # Errors
    ///
    /// [`SlideReelError::UnreadableImage`] if the file cannot be opened or
    /// decoded, or decodes to a zero-sized image.
    pub fn normalize(&self, source: &ImageSource) -> Result<NormalizedFrame, SlideReelError> {
        let decoded = source.decode()?;
        log::debug!(
            "Decoded {} ({}x{} {})",
            source.path().display(),
            decoded.width(),
            decoded.height(),
            source.format(),
        );

        let image = self.fit(decoded.to_rgb8());
        Ok(NormalizedFrame {
            source: source.path().to_path_buf(),
            image,
        })
    }

    /// Lazily normalize `sources` in order.
    pub fn stream<'a>(&'a self, sources: &'a [ImageSource]) -> FrameStream<'a> {
        FrameStream {
            normalizer: self,
            sources: sources.iter(),
        }
    }

    fn fit(&self, image: RgbImage) -> RgbImage {
        let Canvas { width, height } = self.canvas;
        if image.dimensions() == (width, height) {
            return image;
        }

        match self.fit {
            FitPolicy::Stretch => imageops::resize(&image, width, height, FilterType::Lanczos3),
            FitPolicy::Letterbox => {
                let mut canvas = RgbImage::from_pixel(width, height, self.background);
                self.overlay_centered(&mut canvas, &image);
                canvas
            }
            FitPolicy::BlurredBackground => {
                let mut canvas = blurred_fill(&image, width, height);
                self.overlay_centered(&mut canvas, &image);
                canvas
            }
        }
    }

    fn overlay_centered(&self, canvas: &mut RgbImage, image: &RgbImage) {
        let (fit_width, fit_height) =
            fit_within(image.dimensions(), (canvas.width(), canvas.height()));
        let resized = if image.dimensions() == (fit_width, fit_height) {
            image.clone()
        } else {
            imageops::resize(image, fit_width, fit_height, FilterType::Lanczos3)
        };
        let x = (canvas.width() - fit_width) / 2;
        let y = (canvas.height() - fit_height) / 2;
        imageops::overlay(canvas, &resized, x as i64, y as i64);
    }
}

/// Largest size with the aspect ratio of `image` that fits inside `bounds`.
fn fit_within(image: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (iw, ih) = (image.0 as f64, image.1 as f64);
    let (bw, bh) = (bounds.0 as f64, bounds.1 as f64);
    let scale = (bw / iw).min(bh / ih);
    let width = ((iw * scale).round() as u32).clamp(1, bounds.0);
    let height = ((ih * scale).round() as u32).clamp(1, bounds.1);
    (width, height)
}

/// Stretch `image` over the canvas and blur it.
fn blurred_fill(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let small_width = (width / BLUR_DOWNSCALE).max(1);
    let small_height = (height / BLUR_DOWNSCALE).max(1);
    let small = imageops::resize(image, small_width, small_height, FilterType::Triangle);
    let blurred = imageops::blur(&small, BLUR_SIGMA);
    imageops::resize(&blurred, width, height, FilterType::Triangle)
}

/// Lazy, finite, single-pass iterator of normalized frames.
///
/// Yields one item per source image, in order. Each item is decoded only
/// when requested.
pub struct FrameStream<'a> {
    normalizer: &'a FrameNormalizer,
    sources: std::slice::Iter<'a, ImageSource>,
}

impl Iterator for FrameStream<'_> {
    type Item = Result<NormalizedFrame, SlideReelError>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.sources.next()?;
        Some(self.normalizer.normalize(source))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sources.size_hint()
    }
}

impl ExactSizeIterator for FrameStream<'_> {}
