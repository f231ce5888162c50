//! Synthetic fusion example
//!
//! Runs the reconstruction engine against the synthetic rig and fuses a few
//! hand-written keypoint files, printing the 3D position of each nose keypoint.
//!
//! Usage:
//!   cargo run --example synthetic_fusion -- [output_dir]

use posedepth::capture::{RigProfile, SyntheticRig, SyntheticScene};
use posedepth::fusion::{FuseOutcome, KeypointWatcher};
use posedepth::reconstruction::{EngineConfig, ReconstructionEngine};
use posedepth::data::{DirectoryStore, ReadinessFlag, raw_file_name};
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let scratch = tempfile::tempdir()?;
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| scratch.path().to_path_buf());
    std::fs::create_dir_all(&dir)?;
    info!("Writing keypoint files to {}", dir.display());

    // A nose sweeping left to right across the block in front of the wall.
    let noses = [(400.0, 300.0), (640.3, 359.6), (880.0, 420.0), (0.0, 0.0)];
    for (index, (x, y)) in noses.iter().enumerate() {
        let mut pose = vec![0.0; 75];
        pose[..3].copy_from_slice(&[*x, *y, 0.9]);
        let doc = serde_json::json!({ "version": 1.3, "people": [{ "pose_keypoints_2d": pose }] });
        std::fs::write(dir.join(raw_file_name(index as u64)), doc.to_string())?;
    }

    let mut ready = ReadinessFlag::reset(&dir)?;
    let rig = SyntheticRig::new(RigProfile::default(), SyntheticScene::default());
    let mut engine =
        ReconstructionEngine::from_rig(rig, EngineConfig::default().with_settle_frames(5))?;
    ready.mark_ready()?;

    let mut watcher = KeypointWatcher::new(DirectoryStore::new(&dir));
    for _ in 0..noses.len() {
        engine.tick()?;
        let outcome = watcher.poll_and_fuse(engine.vertex_map())?;
        if let FuseOutcome::Fused { index, path, .. } = outcome {
            let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            let nose: Vec<f64> = doc["people"][0]["pose_keypoints_3d"]
                .as_array()
                .map(|values| values.iter().take(4).filter_map(|v| v.as_f64()).collect())
                .unwrap_or_default();
            if let [x, y, z, c] = nose[..] {
                info!(
                    "Frame {}: nose at ({:.3}, {:.3}, {:.3}) m, confidence {}",
                    index, x, y, z, c
                );
            }
        }
    }

    engine.stop();
    info!("Synthetic fusion example completed successfully!");
    Ok(())
}
