#[cfg(feature = "opencv")]
mod video;

use anyhow::Context;
use blob_tracking::{
    BlobPipeline, ConfigHandle, DirectorySource, EffectConfig, FrameLoop, FrameSource, Recorder,
    RecorderOptions, SurfaceBus, load_font,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "visual_tester")]
#[command(about = "Runs the blob tracking effect over a video and records the result")]
struct Args {
    /// Directory of frames (sorted by name), or a video file with the `opencv` feature
    input: PathBuf,

    /// Where recordings are written
    #[arg(long, default_value = "recordings")]
    output_dir: PathBuf,

    /// Effect configuration (JSON, camelCase keys). Missing keys use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// TrueType/OpenType font for blob labels
    #[arg(long)]
    font: Option<PathBuf>,

    #[arg(long, default_value_t = 60.0)]
    refresh_hz: f64,

    #[arg(long, default_value_t = 60)]
    capture_fps: u32,

    /// Skip the GIF/MJPEG recording
    #[arg(long)]
    no_record: bool,

    /// Replay the input until interrupted
    #[arg(long)]
    repeat: bool,

    /// Also write an MP4 through OpenCV
    #[cfg(feature = "opencv")]
    #[arg(long)]
    mp4: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
    let args = Args::parse();

    // --- 2. Effect Configuration ---
    let config = match &args.config {
        Some(path) => EffectConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EffectConfig::default(),
    };
    let config = ConfigHandle::new(config);

    // --- 3. Pipeline Initialization ---
    let pipeline = match &args.font {
        Some(path) => BlobPipeline::with_font(
            load_font(path).with_context(|| format!("loading font {}", path.display()))?,
        ),
        None => {
            if config.snapshot().show_numbers {
                warn!("No --font given; blob labels will not be drawn");
            }
            BlobPipeline::new()
        }
    };

    // --- 4. Frame Source ---
    let source = open_source(&args)?;

    // --- 5. Consumers ---
    let bus = SurfaceBus::default();
    let recorder = if args.no_record {
        None
    } else {
        Some(Recorder::start(
            &bus,
            RecorderOptions {
                output_dir: args.output_dir.clone(),
                capture_fps: args.capture_fps,
                ..RecorderOptions::default()
            },
        )?)
    };
    #[cfg(feature = "opencv")]
    let mp4 = match &args.mp4 {
        Some(path) => Some(video::spawn_mp4_writer(&bus, path.clone(), f64::from(args.capture_fps))),
        None => None,
    };

    // --- 6. Main Processing Loop ---
    let handle = FrameLoop::new(pipeline, source, config.subscribe())
        .with_bus(bus.clone())
        .with_refresh_hz(args.refresh_hz)
        .spawn();
    tokio::select! {
        _ = handle.stopped() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping");
            handle.cancel();
        }
    }
    let outcome = handle.join().await?;
    drop(bus);

    // --- 7. Output ---
    if let Some(recorder) = recorder {
        let summary = recorder.stop().await?;
        println!(
            "Recorded {} frames ({} bytes) to {}",
            summary.frames,
            summary.bytes,
            summary.path.display()
        );
    }
    #[cfg(feature = "opencv")]
    if let Some(writer) = mp4 {
        let written = writer.await??;
        println!("Wrote {written} frames to MP4");
    }

    println!(
        "Processing complete: {} frames, {} idle ticks",
        outcome.stats.frames_processed, outcome.stats.idle_ticks
    );
    Ok(())
}

fn open_source(args: &Args) -> anyhow::Result<Box<dyn FrameSource>> {
    if args.input.is_dir() {
        let source = DirectorySource::open(&args.input)?;
        info!(frames = source.paths().len(), "Reading frames from directory");
        let source: Box<dyn FrameSource> = if args.repeat {
            Box::new(source.looping())
        } else {
            Box::new(source)
        };
        return Ok(source);
    }

    #[cfg(feature = "opencv")]
    {
        let source = video::VideoFileSource::open(&args.input, args.repeat)?;
        return Ok(Box::new(source));
    }

    #[cfg(not(feature = "opencv"))]
    anyhow::bail!(
        "{} is not a directory; video files need the `opencv` feature",
        args.input.display()
    )
}
