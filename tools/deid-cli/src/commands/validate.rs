//! Pre-flight check a set of videos.

use std::path::PathBuf;

use deid_common::cancel::CancelToken;
use deid_common::config::AppConfig;
use deid_model::{PatientCase, ProgressEvent};
use deid_pipeline::Orchestrator;

pub fn run(config: AppConfig, files: Vec<PathBuf>) -> anyhow::Result<()> {
    println!("Validating {} file(s)", files.len());

    let orchestrator = Orchestrator::new(config, CancelToken::new())?;
    let progress = |event: ProgressEvent| {
        tracing::debug!(current = event.current, total = event.total, "{}", event.message);
    };
    let case = PatientCase::new("validate", files);

    match orchestrator.preflight(std::slice::from_ref(&case), &progress) {
        Ok(assets) => {
            for asset in assets.iter().flatten() {
                println!(
                    "  {}: {} @ {:.2} fps, {:.1}s, {} frames{}",
                    asset.display_name(),
                    asset.resolution,
                    asset.fps,
                    asset.duration_secs,
                    asset.frame_count,
                    if asset.has_audio { ", audio" } else { "" }
                );
            }
            println!("\nAll files are valid and share one resolution.");
            Ok(())
        }
        Err(e) => {
            println!("\nValidation failed:");
            println!("  {}", e.report());
            Err(e.into())
        }
    }
}
