//! before_after - side-by-side comparison of an original and a stabilized video
//!
//! The output canvas is `2W + 10` pixels wide: original on the left, stabilized
//! on the right. Without a usable stabilized video the original is shown on
//! both sides.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use video_stabilizer::compare::Compositor;
use video_stabilizer::config::CompareConfig;
use video_stabilizer::ingest::open_source;
use video_stabilizer::sink::open_avi;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "before_after",
    about = "Compose an original and a stabilized video side by side"
)]
struct Args {
    /// Original video (left half)
    original: Option<String>,

    /// Stabilized video (right half); the original is repeated when absent
    stabilized: Option<String>,

    /// Output AVI path [default: before_after_output.avi]
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Output codec fourcc (MJPG or "DIB ") [default: MJPG]
    #[arg(long, value_name = "FOURCC")]
    codec: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let Some(original) = args.original.as_deref() else {
        println!("{}", Args::command().render_usage());
        return ExitCode::SUCCESS;
    };
    match run(original, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(255)
        }
    }
}

fn run(original: &str, args: &Args) -> Result<()> {
    let config = CompareConfig::load_with(args.output.clone(), args.codec.as_deref())?;
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let primary = open_source(original)
        .with_context(|| format!("cannot open original video: {}", original))?;
    let secondary = match args.stabilized.as_deref() {
        Some(path) => match open_source(path) {
            Ok(source) => Some(source),
            Err(err) => {
                eprintln!(
                    "Warning: cannot open stabilized video: {} ({:#}); showing the original twice",
                    path, err
                );
                None
            }
        },
        None => None,
    };

    let mut compositor = Compositor::new(primary, secondary);
    let info = compositor.output_info();
    let mut sink = open_avi(&config.output, config.codec, info.fps, info.width, info.height)
        .with_context(|| format!("cannot open video writer for {}", config.output.display()))?;

    {
        let mut bar = ui.frames("Composing", info.frame_count);
        compositor.run(&mut sink, |n| bar.set_position(n as u64))?;
    }
    println!("Done. Output saved to: {}", config.output.display());
    Ok(())
}
