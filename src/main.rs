use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use headline_compositor::{
    composition::{CompositionEngine, RenderRequest},
    config::{AspectRatio, Config},
    media::{scan_directory, Asset, MediaRef},
    render::{check_ffmpeg_available, CancelHandle},
};

#[derive(Parser)]
#[command(
    name = "headline-compositor",
    version,
    about = "Turn narration plus images and clips into one synchronized video",
    long_about = "Headline-Compositor lays images and video clips out across a narration track, fits them into a 16:9 or 9:16 canvas, and renders a single MP4 locked to the audio."
)]
#[command(group(ArgGroup::new("visuals").required(true).args(["asset", "assets_dir"])))]
struct Cli {
    /// Narration audio file (WAV, MP3, FLAC, OGG, M4A)
    #[arg(short, long)]
    audio: PathBuf,

    /// Image or video clip, in playback order (repeatable)
    #[arg(long = "asset", value_name = "FILE")]
    asset: Vec<PathBuf>,

    /// Directory of numbered assets (01_title.png, 02_clip.mp4, ...)
    #[arg(short = 'd', long)]
    assets_dir: Option<PathBuf>,

    /// Output aspect ratio (16:9 or 9:16)
    #[arg(long)]
    aspect: Option<AspectRatio>,

    /// Seconds each still image stays on screen
    #[arg(long)]
    image_duration: Option<f64>,

    /// Output frame rate (24 or more)
    #[arg(long)]
    fps: Option<u32>,

    /// Output video file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Headline-Compositor v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    if !check_ffmpeg_available(&config.encoder.ffmpeg_path) {
        bail!("{} not found. Please install FFmpeg.", config.encoder.ffmpeg_path);
    }

    let assets = collect_assets(&cli)?;
    if assets.is_empty() {
        bail!("No usable images or video clips were given");
    }

    let output = cli.output.clone().unwrap_or_else(default_output_path);
    info!("Audio: {:?}", cli.audio);
    info!("Assets: {}", assets.len());
    info!("Output: {:?}", output);

    let request = RenderRequest::new(assets, MediaRef::path(cli.audio.clone()))
        .with_aspect(config.output.aspect)
        .with_image_duration(config.timeline.default_image_duration);

    // Ctrl-C cancels the pass
    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling render...");
            on_signal.cancel();
        }
    });

    let engine = CompositionEngine::new(config);
    let mut next_report = 0.1;
    let result = engine
        .render_with_progress(request, &cancel, |report| {
            if report.progress() >= next_report {
                info!("   {:>3.0}% ({:.1}s / {:.1}s)",
                      report.progress() * 100.0, report.elapsed, report.total_duration);
                next_report += 0.1;
            }
        })
        .await;

    let video = match result {
        Ok(video) => video,
        Err(e) => {
            error!("{}", e.user_message());
            return Err(e.into());
        }
    };

    video
        .write_atomic(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!("Render complete! Output saved to: {:?}", output);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    // Command line overrides
    if let Some(aspect) = cli.aspect {
        config.output.aspect = aspect;
    }
    if let Some(fps) = cli.fps {
        config.output.fps = fps;
    }
    if let Some(seconds) = cli.image_duration {
        config.timeline.default_image_duration = seconds;
    }

    config.validate()?;
    Ok(config)
}

fn collect_assets(cli: &Cli) -> Result<Vec<Asset>> {
    let mut assets = Vec::new();

    if let Some(dir) = &cli.assets_dir {
        assets.extend(scan_directory(dir)?);
    }

    for path in &cli.asset {
        let asset = Asset::from_path(path)
            .with_context(|| format!("unsupported asset type: {}", path.display()))?;
        assets.push(asset);
    }

    Ok(assets)
}

fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "headline_{}.mp4",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}
