//! Fixture builders shared by the integration tests.
//!
//! Images are synthesized with the `image` crate and audio is written as
//! 16-bit PCM WAV by hand, so no binary fixtures are checked in.

#![allow(dead_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

/// Distinct, saturated colours that survive YUV 4:2:0 round trips.
pub const PALETTE: [[u8; 3]; 6] = [
    [220, 40, 40],
    [40, 200, 60],
    [40, 60, 220],
    [230, 210, 40],
    [200, 40, 200],
    [40, 200, 200],
];

/// Write a solid-colour image; the format follows the extension.
pub fn write_image(path: &Path, width: u32, height: u32, color: [u8; 3]) -> PathBuf {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(path)
        .expect("write fixture image");
    path.to_path_buf()
}

/// Write `count` solid PNGs named `img_000.png`, `img_001.png`, ... into `dir`,
/// cycling through [`PALETTE`].
pub fn write_images(dir: &Path, count: usize, width: u32, height: u32) -> Vec<PathBuf> {
    (0..count)
        .map(|index| {
            let path = dir.join(format!("img_{index:03}.png"));
            write_image(&path, width, height, PALETTE[index % PALETTE.len()])
        })
        .collect()
}

/// Write a mono 16-bit PCM WAV holding a 440 Hz tone.
pub fn write_wav(path: &Path, sample_rate: u32, seconds: f64) -> PathBuf {
    let samples = (sample_rate as f64 * seconds).round() as u32;
    let data_len = samples * 2;

    let mut out = BufWriter::new(File::create(path).expect("create wav"));
    out.write_all(b"RIFF").unwrap();
    out.write_all(&(36 + data_len).to_le_bytes()).unwrap();
    out.write_all(b"WAVE").unwrap();

    out.write_all(b"fmt ").unwrap();
    out.write_all(&16u32.to_le_bytes()).unwrap();
    out.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    out.write_all(&1u16.to_le_bytes()).unwrap(); // mono
    out.write_all(&sample_rate.to_le_bytes()).unwrap();
    out.write_all(&(sample_rate * 2).to_le_bytes()).unwrap();
    out.write_all(&2u16.to_le_bytes()).unwrap();
    out.write_all(&16u16.to_le_bytes()).unwrap();

    out.write_all(b"data").unwrap();
    out.write_all(&data_len.to_le_bytes()).unwrap();
    for n in 0..samples {
        let t = n as f64 / sample_rate as f64;
        let value = ((t * 440.0 * std::f64::consts::TAU).sin() * 8_000.0) as i16;
        out.write_all(&value.to_le_bytes()).unwrap();
    }
    out.flush().unwrap();
    path.to_path_buf()
}

/// Files in `dir` left behind by a render, i.e. hidden temporaries.
pub fn leftover_temporaries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(".slidereel-"))
        })
        .collect()
}

/// Largest per-channel difference between two same-sized images.
pub fn max_channel_diff(a: &RgbImage, b: &RgbImage) -> u8 {
    assert_eq!(a.dimensions(), b.dimensions());
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

/// Whether `pixel` is within `tolerance` of `expected` on every channel.
pub fn close_to(pixel: &Rgb<u8>, expected: [u8; 3], tolerance: u8) -> bool {
    pixel.0
        .iter()
        .zip(expected)
        .all(|(actual, wanted)| actual.abs_diff(wanted) <= tolerance)
}
