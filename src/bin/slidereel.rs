use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use slidereel::{
    ArtifactProbe, CanvasPolicy, FfmpegLogLevel, FitPolicy, ImageSet, Mode, Pipeline,
    PipelineState, RenderEvent, RenderOptions, RenderRequest, Stage, VideoEncoderOptions,
};

const CLI_AFTER_HELP: &str = "Examples:\n  slidereel render a.jpg b.jpg c.jpg --out slideshow.mp4 --seconds 2\n  slidereel render --dir photos --mode shorts --audio song.mp3 --out short.mp4\n  slidereel probe short.mp4 --json\n  slidereel completions zsh > _slidereel";

#[derive(Debug, Parser)]
#[command(
    name = "slidereel",
    version,
    about = "Turn a set of still images into an MP4 slideshow",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render images into a video.
    #[command(
        about = "Render a slideshow",
        after_help = "Examples:\n  slidereel render 1.png 2.png --out out.mp4 --seconds 3 --fit blur\n  slidereel render --dir photos --mode shorts --canvas preset --out short.mp4"
    )]
    Render {
        /// Image files in display order (png, jpg, jpeg, bmp).
        images: Vec<PathBuf>,
        /// Output MP4 path.
        #[arg(long)]
        out: PathBuf,
        /// Also take every supported image in this directory, sorted by name.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Background audio (mp3, wav, aac, m4a, flac, ogg).
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Timing mode: shorts | regular.
        #[arg(long, default_value = "regular")]
        mode: String,
        /// Seconds per image in regular mode.
        #[arg(long, default_value_t = 3.0)]
        seconds: f64,
        /// Canvas size: first | largest | preset | WIDTHxHEIGHT.
        #[arg(long, default_value = "first")]
        canvas: String,
        /// Fit policy: letterbox | blur | stretch.
        #[arg(long, default_value = "letterbox")]
        fit: String,
        /// Letterbox colour as RRGGBB hex.
        #[arg(long)]
        background: Option<String>,
        /// Output frame rate.
        #[arg(long)]
        fps: Option<u32>,
        /// Constant Rate Factor (0-51, lower is better).
        #[arg(long)]
        crf: Option<u32>,
        /// Encoder speed preset (ultrafast ... veryslow).
        #[arg(long)]
        preset: Option<String>,
    },

    /// Inspect a rendered video.
    #[command(
        about = "Print information about a rendered video",
        visible_alias = "info",
        after_help = "Examples:\n  slidereel probe out.mp4\n  slidereel probe out.mp4 --json"
    )]
    Probe {
        /// Video file to inspect.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_mode(value: &str, seconds: f64) -> Option<Mode> {
    match value.to_ascii_lowercase().as_str() {
        "shorts" | "short" => Some(Mode::Shorts),
        "regular" => Some(Mode::regular(seconds)),
        _ => None,
    }
}

fn parse_canvas(value: &str) -> Option<CanvasPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "first" => Some(CanvasPolicy::FirstImage),
        "largest" => Some(CanvasPolicy::LargestImage),
        "preset" => Some(CanvasPolicy::ModePreset),
        other => {
            let (width, height) = other.split_once('x')?;
            let width = width.trim().parse::<u32>().ok().filter(|w| *w > 0)?;
            let height = height.trim().parse::<u32>().ok().filter(|h| *h > 0)?;
            Some(CanvasPolicy::Fixed { width, height })
        }
    }
}

fn parse_fit(value: &str) -> Option<FitPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "letterbox" | "pad" => Some(FitPolicy::Letterbox),
        "blur" | "blurred" => Some(FitPolicy::BlurredBackground),
        "stretch" => Some(FitPolicy::Stretch),
        _ => None,
    }
}

fn parse_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = level
            .parse::<FfmpegLogLevel>()
            .map_err(|_| format!("unsupported --log-level: {level}"))?;
        slidereel::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs_f64();
    let minutes = (total / 60.0).floor() as u64;
    let seconds = total - (minutes as f64 * 60.0);
    format!("{minutes}:{seconds:06.3}")
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Render {
            images,
            out,
            dir,
            audio,
            mode,
            seconds,
            canvas,
            fit,
            background,
            fps,
            crf,
            preset,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;

            let mode = parse_mode(&mode, seconds).ok_or(format!("unsupported --mode: {mode}"))?;
            let canvas =
                parse_canvas(&canvas).ok_or(format!("unsupported --canvas: {canvas}"))?;
            let fit = parse_fit(&fit).ok_or(format!("unsupported --fit: {fit}"))?;

            let mut paths = Vec::new();
            if let Some(dir) = &dir {
                let set = ImageSet::from_directory(dir)?;
                paths.extend(set.sources().iter().map(|source| source.path().to_path_buf()));
            }
            paths.extend(images);

            let mut encoder = VideoEncoderOptions::default();
            if let Some(crf) = crf {
                encoder = encoder.crf(crf);
            }
            if let Some(preset) = preset {
                encoder = encoder.preset(preset);
            }
            let mut options = RenderOptions::new()
                .with_encoder_options(encoder)
                .with_canvas_policy(canvas)
                .with_fit_policy(fit);
            if let Some(fps) = fps {
                options = options.with_frame_rate(fps);
            }
            if let Some(background) = &background {
                let rgb = parse_color(background)
                    .ok_or(format!("unsupported --background: {background}"))?;
                options = options.with_background(rgb);
            }

            let mut request = RenderRequest::new(paths, mode, &out);
            if let Some(audio) = audio {
                request = request.with_audio(audio);
            }

            if cli.global.verbose {
                eprintln!(
                    "rendering {} image(s), {mode}, to {}",
                    request.images.len(),
                    out.display()
                );
            }

            let progress_bar = ProgressBar::new(request.images.len() as u64);
            let style = ProgressStyle::with_template(
                "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
            )?;
            progress_bar.set_style(style.progress_chars("##-"));

            let handle = Pipeline::spawn(request, options)?;
            for event in handle.events() {
                match event {
                    RenderEvent::State(state) => {
                        progress_bar.set_message(state.to_string());
                        if cli.global.verbose {
                            progress_bar.println(format!("{} {state}", "stage".cyan().bold()));
                        }
                    }
                    RenderEvent::Progress(info) if info.stage == Stage::Encoding => {
                        progress_bar.set_length(info.total);
                        progress_bar.set_position(info.completed);
                    }
                    RenderEvent::Progress(_) => {}
                }
            }

            let result = handle.wait();
            match &result {
                Ok(_) => progress_bar.finish_with_message(PipelineState::Done.to_string()),
                Err(_) => progress_bar.abandon_with_message(PipelineState::Failed.to_string()),
            }
            let output = result?;

            if output.images_dropped > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!(
                        "{} image(s) past the Shorts limit were left out",
                        output.images_dropped
                    )
                    .yellow()
                );
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Rendered {} image(s) to {} ({}, {}{})",
                    output.images_rendered,
                    output.path.display(),
                    format_duration(output.duration),
                    output.canvas,
                    if output.has_audio { ", with audio" } else { "" },
                )
                .green()
            );
        }
        Commands::Probe { input, json } => {
            let info = ArtifactProbe::probe(&input)?;
            if json {
                let payload = json!({
                    "path": info.path.display().to_string(),
                    "format": info.format,
                    "duration_seconds": info.container_duration.as_secs_f64(),
                    "video": {
                        "width": info.width,
                        "height": info.height,
                        "fps": info.frame_rate,
                        "frames": info.video_packets,
                        "duration_seconds": info.video_duration.as_secs_f64(),
                        "codec": info.video_codec,
                    },
                    "audio": info.audio.as_ref().map(|audio| json!({
                        "sample_rate": audio.sample_rate,
                        "channels": audio.channels,
                        "codec": audio.codec,
                        "duration_seconds": audio.duration.as_secs_f64(),
                    })),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", info.format);
                println!("Duration: {}", format_duration(info.container_duration));
                println!(
                    "Video: {}x{} @ {:.2} fps, {} frames [{}]",
                    info.width, info.height, info.frame_rate, info.video_packets, info.video_codec,
                );
                match &info.audio {
                    Some(audio) => println!(
                        "Audio: {} Hz, {} ch, {} [{}]",
                        audio.sample_rate,
                        audio.channels,
                        format_duration(audio.duration),
                        audio.codec,
                    ),
                    None => println!("Audio: none"),
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "slidereel", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{format_duration, parse_canvas, parse_color, parse_fit, parse_mode};
    use slidereel::{CanvasPolicy, FitPolicy, Mode};

    #[test]
    fn parse_mode_aliases() {
        assert_eq!(parse_mode("shorts", 5.0), Some(Mode::Shorts));
        assert_eq!(parse_mode("Short", 5.0), Some(Mode::Shorts));
        assert_eq!(parse_mode("regular", 2.5), Some(Mode::regular(2.5)));
        assert!(parse_mode("long", 1.0).is_none());
    }

    #[test]
    fn parse_canvas_forms() {
        assert_eq!(parse_canvas("first"), Some(CanvasPolicy::FirstImage));
        assert_eq!(parse_canvas("LARGEST"), Some(CanvasPolicy::LargestImage));
        assert_eq!(parse_canvas("preset"), Some(CanvasPolicy::ModePreset));
        assert_eq!(
            parse_canvas("1280x720"),
            Some(CanvasPolicy::Fixed {
                width: 1280,
                height: 720
            })
        );
        assert!(parse_canvas("0x720").is_none());
        assert!(parse_canvas("wide").is_none());
    }

    #[test]
    fn parse_fit_aliases() {
        assert_eq!(parse_fit("letterbox"), Some(FitPolicy::Letterbox));
        assert_eq!(parse_fit("blur"), Some(FitPolicy::BlurredBackground));
        assert_eq!(parse_fit("stretch"), Some(FitPolicy::Stretch));
        assert!(parse_fit("crop").is_none());
    }

    #[test]
    fn parse_color_hex() {
        assert_eq!(parse_color("#ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_color("000000"), Some([0, 0, 0]));
        assert!(parse_color("fff").is_none());
        assert!(parse_color("gg0000").is_none());
    }

    #[test]
    fn format_duration_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1:00.000");
        assert_eq!(format_duration(Duration::from_millis(6_500)), "0:06.500");
    }
}
