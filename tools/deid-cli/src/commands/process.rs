//! Run patient cases through the de-identification pipeline.

use std::io::Write;
use std::path::PathBuf;

use deid_common::config::{AppConfig, ProcessingMode};
use deid_model::{PatientCase, ProgressEvent};
use deid_pipeline::anonymizer::collect_videos;
use deid_pipeline::orchestrator::discover_cases;
use deid_pipeline::{spawn_worker, WorkerMessage};

/// Command-line overrides for one `process` invocation.
pub struct ProcessOptions {
    pub cases: Vec<String>,
    pub root: Option<PathBuf>,
    pub mode: Option<String>,
    pub fps: Option<f64>,
    pub height: Option<u32>,
    pub buffer_size: Option<usize>,
    pub working_dir: Option<PathBuf>,
    pub shared_dir: Option<PathBuf>,
    pub purge: bool,
}

pub async fn run(mut config: AppConfig, options: ProcessOptions) -> anyhow::Result<()> {
    apply_overrides(&mut config, &options)?;
    config.processing.validate()?;

    let cases = gather_cases(&options)?;
    if cases.is_empty() {
        anyhow::bail!("No cases given. Use --case ID=DIR or --root DIR");
    }

    println!(
        "Processing {} case(s) in {} mode",
        cases.len(),
        config.processing.mode.as_str()
    );
    for case in &cases {
        println!("  {}: {} video(s)", case.id, case.videos.len());
    }
    println!("  Shared dir: {}", config.paths.shared_dir.display());

    let (handle, mut rx) = spawn_worker(config, cases);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;
    let mut outcome = None;

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(WorkerMessage::Progress(event)) => print_progress(&event),
                Some(WorkerMessage::CaseCompleted(report)) => {
                    println!(
                        "\nCase {} done in {:.1}s ({:.2}x realtime): {} anonymized, {} failed",
                        report.case_id,
                        report.elapsed_secs,
                        report.speed(),
                        report.anonymized.succeeded(),
                        report.anonymized.failed(),
                    );
                }
                Some(other) => outcome = Some(other),
                None => break,
            },
            _ = &mut ctrl_c, if !stopping => {
                stopping = true;
                println!("\nStopping...");
                handle.cancel();
            }
        }
    }
    handle.join().await?;

    match outcome {
        Some(WorkerMessage::Finished) => {
            println!("\nAll cases processed.");
            Ok(())
        }
        Some(WorkerMessage::Terminated) => {
            println!("\nProcessing terminated.");
            Ok(())
        }
        Some(WorkerMessage::Error(message)) => Err(anyhow::anyhow!("Processing failed: {message}")),
        _ => Err(anyhow::anyhow!("Worker ended without a result")),
    }
}

fn apply_overrides(config: &mut AppConfig, options: &ProcessOptions) -> anyhow::Result<()> {
    if let Some(mode) = &options.mode {
        config.processing.mode = mode.parse::<ProcessingMode>()?;
    }
    if let Some(fps) = options.fps {
        config.processing.target_fps = fps;
    }
    if let Some(height) = options.height {
        config.processing.target_height = height;
    }
    if let Some(buffer_size) = options.buffer_size {
        config.processing.buffer_size = buffer_size;
    }
    if let Some(dir) = &options.working_dir {
        config.paths.working_dir = dir.clone();
    }
    if let Some(dir) = &options.shared_dir {
        config.paths.shared_dir = dir.clone();
    }
    if options.purge {
        config.processing.purge_after = true;
    }
    Ok(())
}

fn gather_cases(options: &ProcessOptions) -> anyhow::Result<Vec<PatientCase>> {
    let mut cases = Vec::new();
    for spec in &options.cases {
        let (id, dir) = spec
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid case '{spec}', expected ID=DIR"))?;
        if id.is_empty() {
            anyhow::bail!("Invalid case '{spec}': empty id");
        }
        let videos = collect_videos(&PathBuf::from(dir))?;
        cases.push(PatientCase::new(id, videos));
    }
    if let Some(root) = &options.root {
        cases.extend(discover_cases(root)?);
    }
    Ok(cases)
}

fn print_progress(event: &ProgressEvent) {
    if event.is_preparatory() {
        println!("  [{:?}] {}", event.phase, event.message);
        return;
    }
    print!(
        "\r  [{:?}] {:>5.1}% ({}/{}) {}    ",
        event.phase,
        event.fraction() * 100.0,
        event.current,
        event.total,
        event.message,
    );
    std::io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ProcessOptions {
        ProcessOptions {
            cases: Vec::new(),
            root: None,
            mode: None,
            fps: None,
            height: None,
            buffer_size: None,
            working_dir: None,
            shared_dir: None,
            purge: false,
        }
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = AppConfig::default();
        let opts = ProcessOptions {
            mode: Some("advanced".to_string()),
            fps: Some(10.0),
            height: Some(360),
            purge: true,
            ..options()
        };
        apply_overrides(&mut config, &opts).unwrap();
        assert_eq!(config.processing.mode, ProcessingMode::Advanced);
        assert_eq!(config.processing.target_fps, 10.0);
        assert_eq!(config.processing.target_height, 360);
        assert!(config.processing.purge_after);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let mut config = AppConfig::default();
        let opts = ProcessOptions {
            mode: Some("turbo".to_string()),
            ..options()
        };
        assert!(apply_overrides(&mut config, &opts).is_err());
    }

    #[test]
    fn test_case_spec_requires_separator() {
        let opts = ProcessOptions {
            cases: vec!["case1".to_string()],
            ..options()
        };
        assert!(gather_cases(&opts).is_err());
    }

    #[test]
    fn test_case_spec_collects_videos() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let opts = ProcessOptions {
            cases: vec![format!("p01={}", dir.path().display())],
            ..options()
        };
        let cases = gather_cases(&opts).unwrap();

        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "p01");
        assert_eq!(cases[0].videos.len(), 1);
    }
}
