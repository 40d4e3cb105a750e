use std::env;
use std::path::PathBuf;

fn main() {
    for var in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere except
    // Windows, where the install location has to be spelled out.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=slidereel needs FFmpeg with libx264 and the AAC encoder. Set FFMPEG_DIR (or VCPKG_ROOT) before building on Windows."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(vcpkg_root).join("installed").join(triplet);

    if candidate.join("include").join("libavcodec").exists() {
        println!(
            "cargo:warning=Found FFmpeg headers under {}; export FFMPEG_DIR={} to make discovery explicit.",
            candidate.display(),
            candidate.display(),
        );
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} has no FFmpeg headers (try `vcpkg install ffmpeg[x264]`).",
            candidate.display(),
        );
    }
}
