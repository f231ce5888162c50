//! Posedepth Application
//!
//! Attaches depth to a 2D pose estimator's keypoints while leaving the color
//! sensor free for the estimator:
//! - Captures calibration and one color frame, then releases the color sensor
//! - Rebuilds a vertex map from live depth every tick
//! - Writes `*_keypointsD.json` next to each keypoint file it fuses

mod app;
mod constants;
mod errors;

use clap::Parser;
use posedepth_core::EngineConfig;
use posedepth_core::fusion::{ParseRetryPolicy, RetryExhausted, WatcherConfig};
use std::path::PathBuf;

/// Posedepth - 3D keypoints from live depth and a frozen color frame
///
/// Depth comes from the built-in synthetic rig, a rendered wall with a block in
/// front of it. No hardware backend is compiled in, so fused positions describe
/// that scene rather than the room in front of a camera.
#[derive(Parser, Debug)]
#[command(name = "posedepth")]
#[command(author, version, about)]
struct Args {
    /// Directory the pose estimator writes keypoint files into
    output_dir: Vec<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = constants::DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Keep only the newest N fused frames on disk
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    keep_frames: Option<u64>,

    /// Parse attempts per keypoint file before giving up on it (0 = never)
    #[arg(long, default_value_t = 90)]
    max_parse_attempts: u32,

    /// Exit instead of skipping a keypoint file that never parses
    #[arg(long)]
    abort_on_corrupt: bool,

    /// Settling framesets discarded before the baseline is captured
    #[arg(long, default_value_t = 30)]
    settle_frames: u32,

    /// Run the synthetic rig as fast as possible instead of at its frame rate
    #[arg(long)]
    unpaced: bool,

    /// Exit immediately on error instead of waiting for enter
    #[arg(long)]
    no_pause: bool,
}

fn main() {
    let args = Args::parse();
    app::LoggingConfig::default()
        .with_level(args.log_level.clone())
        .init();

    let retry = ParseRetryPolicy {
        max_attempts: args.max_parse_attempts,
        on_exhausted: if args.abort_on_corrupt {
            RetryExhausted::Abort
        } else {
            RetryExhausted::Skip
        },
    };
    let config = app::PipelineConfig::new(app::resolve_output_dir(&args.output_dir))
        .with_engine(EngineConfig::default().with_settle_frames(args.settle_frames))
        .with_watcher(
            WatcherConfig::default()
                .with_retry(retry)
                .with_keep_frames(args.keep_frames),
        )
        .with_max_ticks(args.max_ticks);

    if let Err(e) = app::run(config, !args.unpaced) {
        tracing::error!("{}", e);
        eprintln!("Application error: {}", e);
        if !args.no_pause {
            app::press_to_close();
        }
        std::process::exit(1);
    }
}
