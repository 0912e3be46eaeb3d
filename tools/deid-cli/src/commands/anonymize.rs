//! Strip metadata and rename a directory of videos.

use std::path::PathBuf;

use deid_common::cancel::CancelToken;
use deid_common::config::{AppConfig, NamingScheme};
use deid_media::FfmpegRunner;
use deid_model::ProgressEvent;
use deid_pipeline::Anonymizer;

pub fn run(
    config: AppConfig,
    dir: PathBuf,
    out: PathBuf,
    sequential: Option<String>,
    log: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Anonymizing videos under: {}", dir.display());

    let naming = match sequential {
        Some(prefix) => NamingScheme::Sequential { prefix },
        None => config.processing.naming.clone(),
    };
    let log_path = log.unwrap_or_else(|| config.paths.translation_log_path());

    let runner = FfmpegRunner::new(&config.tools, CancelToken::new());
    if !runner.ffmpeg_available() {
        anyhow::bail!("ffmpeg not found at {}", runner.ffmpeg().display());
    }

    let anonymizer = Anonymizer::new(runner, naming, &log_path);
    let progress = |event: ProgressEvent| {
        println!("  [{}/{}] {}", event.current, event.total, event.message);
    };
    let report = anonymizer.anonymize_dir(&dir, &out, &progress)?;

    println!();
    println!("  Output: {}", out.display());
    println!("  Translation log: {}", log_path.display());
    println!(
        "  {} anonymized, {} failed",
        report.succeeded(),
        report.failed()
    );
    for record in report.records.iter().filter(|r| r.is_failed()) {
        println!("  - failed: {}", record.original);
    }
    Ok(())
}
