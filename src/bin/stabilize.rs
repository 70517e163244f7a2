//! stabilize - two-pass offline video stabilizer
//!
//! Pass 1 estimates inter-frame motion, the camera trajectory is smoothed with a
//! moving average, and pass 2 re-reads the input and writes each frame warped
//! by its corrective transform.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use video_stabilizer::config::{StabilizerConfig, StabilizerOverrides};
use video_stabilizer::ingest::{open_source, FrameSource};
use video_stabilizer::pipeline::Stabilizer;
use video_stabilizer::sink::open_avi;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "stabilize", about = "Stabilize a shaky video (two-pass, offline)")]
struct Args {
    /// Input video: a local file or a stub:// synthetic clip
    input: Option<String>,

    /// Output AVI path [default: stabilized_output.avi]
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Output codec fourcc (MJPG or "DIB ") [default: MJPG]
    #[arg(long, value_name = "FOURCC")]
    codec: Option<String>,

    /// Smoothing radius in frames [default: 30]
    #[arg(long, value_name = "N")]
    radius: Option<usize>,

    /// Maximum corners detected per frame [default: 200]
    #[arg(long, value_name = "N")]
    max_corners: Option<usize>,

    /// Corner quality threshold relative to the strongest corner [default: 0.01]
    #[arg(long, value_name = "F")]
    quality_level: Option<f64>,

    /// Minimum distance between corners in pixels [default: 30]
    #[arg(long, value_name = "F")]
    min_distance: Option<f64>,

    /// Robust transform fitter (ransac|lmeds) [default: ransac]
    #[arg(long, value_name = "NAME")]
    fitter: Option<String>,

    /// Also write the stabilization plan (all transform sequences) as JSON
    #[arg(long, value_name = "PATH")]
    plan_json: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn overrides(&self) -> StabilizerOverrides {
        StabilizerOverrides {
            output: self.output.clone(),
            codec: self.codec.clone(),
            smoothing_radius: self.radius,
            max_corners: self.max_corners,
            quality_level: self.quality_level,
            min_distance: self.min_distance,
            fitter: self.fitter.clone(),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let Some(input) = args.input.as_deref() else {
        println!("{}", Args::command().render_usage());
        return ExitCode::SUCCESS;
    };
    match run(input, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(255)
        }
    }
}

fn run(input: &str, args: &Args) -> Result<()> {
    let config = StabilizerConfig::load_with(&args.overrides())?;
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut source =
        open_source(input).with_context(|| format!("cannot open video file {}", input))?;
    let info = source.info();
    println!(
        "Video Info: {}x{} @{} FPS, {} frames",
        info.width,
        info.height,
        info.fps,
        info.frame_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    let stabilizer = Stabilizer::from_config(&config);
    let motion = {
        let mut bar = ui.frames("Estimating motion", info.frame_count);
        stabilizer.estimate_motion(&mut source, |_, n| bar.set_position(n as u64))?
    };
    println!("Frame transforms computed: {}", motion.relative.len());

    let plan = stabilizer.plan(&motion)?;
    if let Some(path) = &args.plan_json {
        std::fs::write(path, plan.to_json()?)
            .with_context(|| format!("failed to write plan {}", path.display()))?;
        log::info!("stabilization plan written to {}", path.display());
    }

    let fps = motion.info.effective_fps();
    let mut sink = open_avi(
        &config.output,
        config.codec,
        fps,
        motion.info.width,
        motion.info.height,
    )?;
    let written = {
        let mut bar = ui.frames("Writing stabilized video", Some(plan.len() as u64));
        stabilizer.render(&mut source, &plan, &mut sink, |_, n| {
            bar.set_position(n as u64)
        })?
    };
    log::info!(
        "{} frames read, {} pairs, {} identity fallbacks, {} frames written",
        motion.frames_read,
        plan.len(),
        motion.fallbacks,
        written
    );
    println!("Stabilization complete. Output: {}", config.output.display());
    Ok(())
}
