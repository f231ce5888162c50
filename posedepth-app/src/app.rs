//! Pipeline setup and the main tick loop.

use crate::constants::{DEFAULT_LOG_LEVEL, DEFAULT_OUTPUT_DIR};
use crate::errors::AppError;
use posedepth_capture::{RigProfile, SyntheticRig, SyntheticScene};
use posedepth_core::fusion::{FuseOutcome, KeypointWatcher, WatcherConfig};
use posedepth_core::ingest::{DepthStream, SensorRig};
use posedepth_core::reconstruction::{EngineConfig, ReconstructionEngine, TickOutcome};
use posedepth_data::{DirectoryStore, ReadinessFlag, parse_frame_index};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Logging configuration.
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Install the global subscriber. `RUST_LOG` wins over the configured level.
    pub fn init(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.level)),
            )
            .with_target(false)
            .init();
    }
}

/// Pick the output directory from the positional arguments.
///
/// No argument keeps the default. More than one is a mistake, so the default is
/// kept and a warning logged rather than guessing which was meant.
pub fn resolve_output_dir(args: &[PathBuf]) -> PathBuf {
    let dir = match args {
        [] => {
            info!("No output directory given");
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        }
        [dir] => dir.clone(),
        _ => {
            warn!(
                "Expected one output directory, got {}; using the default",
                args.len()
            );
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        }
    };
    info!("Keypoint output directory: {}", dir.display());
    dir
}

/// Block until the operator presses enter, so a console window stays readable.
pub fn press_to_close() {
    println!("\nPress enter to close this window...");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

/// Everything a run needs besides the sensor.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub engine: EngineConfig,
    pub watcher: WatcherConfig,
    /// Stop after this many ticks; run until interrupted when `None`.
    pub max_ticks: Option<u64>,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            engine: EngineConfig::default(),
            watcher: WatcherConfig::default(),
            max_ticks: None,
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub stale_ticks: u64,
    pub fused: u64,
    pub skipped: u64,
}

/// Calibrate, hand the color sensor over, then reconstruct and fuse every tick.
pub struct Pipeline {
    config: PipelineConfig,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked once per tick; setting it ends the run cleanly.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run until stopped, out of ticks, or a fatal error.
    pub fn run<R: SensorRig>(&self, rig: R) -> Result<RunSummary, AppError> {
        let dir = &self.config.output_dir;
        let mut ready = ReadinessFlag::reset(dir)?;

        warn_on_leftovers(dir, self.config.watcher.start_index);
        let store = DirectoryStore::new(dir);

        info!("Capturing baseline...");
        let mut engine = ReconstructionEngine::from_rig(rig, self.config.engine)?;
        ready.mark_ready()?;

        let mut watcher = KeypointWatcher::with_config(store, self.config.watcher);
        info!("Starting frame injection loop");

        let result = self.tick_loop(&mut engine, &mut watcher);
        engine.stop();

        let summary = result?;
        info!(
            ticks = summary.ticks,
            fused = summary.fused,
            skipped = summary.skipped,
            "Pipeline finished"
        );
        Ok(summary)
    }

    fn tick_loop<S: DepthStream>(
        &self,
        engine: &mut ReconstructionEngine<S>,
        watcher: &mut KeypointWatcher<DirectoryStore>,
    ) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary::default();

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                break;
            }
            if self.config.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            if engine.tick()? == TickOutcome::Stale {
                summary.stale_ticks += 1;
            }
            summary.ticks += 1;

            match watcher.poll_and_fuse(engine.vertex_map())? {
                FuseOutcome::Fused { .. } => summary.fused += 1,
                FuseOutcome::Skipped { .. } => summary.skipped += 1,
                FuseOutcome::NotYetProduced | FuseOutcome::Deferred { .. } => {}
            }
        }

        Ok(summary)
    }
}

/// Keypoint files from an earlier run, at or after the first index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Leftovers {
    raw: usize,
    processed: usize,
}

fn scan_leftovers(dir: &Path, first: u64) -> io::Result<Leftovers> {
    let mut found = Leftovers::default();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(frame) = name.to_str().and_then(parse_frame_index) else {
            continue;
        };
        if frame.index < first {
            continue;
        }
        if frame.processed {
            found.processed += 1;
        } else {
            found.raw += 1;
        }
    }
    Ok(found)
}

fn warn_on_leftovers(dir: &Path, first: u64) {
    let found = match scan_leftovers(dir, first) {
        Ok(found) => found,
        Err(e) => {
            warn!("Could not scan {} for earlier keypoint files: {}", dir.display(), e);
            return;
        }
    };
    if found.raw > 0 {
        warn!(
            "{} keypoint files from an earlier run are still in {}; they will be fused again",
            found.raw,
            dir.display()
        );
    }
    if found.processed > 0 {
        warn!(
            "{} fused files from an earlier run are still in {}; each is kept unless its frame recurs",
            found.processed,
            dir.display()
        );
    }
}

/// Entry point used by the binary: synthetic rig, Ctrl-C handling, full run.
pub fn run(config: PipelineConfig, realtime: bool) -> Result<RunSummary, AppError> {
    let pipeline = Pipeline::new(config);
    let stop = pipeline.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })?;

    let rig = SyntheticRig::new(RigProfile::default(), SyntheticScene::default())
        .with_realtime(realtime);
    warn!("Depth source: synthetic rig (rendered scene, no hardware backend)");
    pipeline.run(rig)
}
