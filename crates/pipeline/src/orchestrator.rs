//! Batch orchestration: pre-flight checks, then one case at a time.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use deid_classifier::SensitivityClassifier;
use deid_common::cancel::CancelToken;
use deid_common::config::{path_within, AppConfig, ProcessingMode};
use deid_common::error::{DeidError, DeidResult};
use deid_common::logging::PERSIST_TARGET;
use deid_media::commands::validate_args;
use deid_media::{probe_video, CutMergeEngine, FfmpegRunner};
use deid_model::{file_display_name, PatientCase, ProgressEvent, ProgressPhase, Resolution, VideoAsset};
use serde::Serialize;
use tracing::{info, warn};

use crate::anonymizer::{collect_videos, AnonymizeReport, Anonymizer};
use crate::fast::FastPipeline;
use crate::progress::ProgressSink;
use crate::streaming::{FfmpegStreamingBackend, StreamingTransformer};

/// Result of one processed case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case_id: String,
    /// Merged output in the case working directory. Removed when the working
    /// directory is purged.
    pub output: PathBuf,
    pub anonymized: AnonymizeReport,
    pub elapsed_secs: f64,
    /// Total duration of the case's source videos.
    pub media_secs: f64,
}

impl CaseReport {
    /// Seconds of source video processed per wall-clock second.
    pub fn speed(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.media_secs / self.elapsed_secs
    }
}

/// Runs cases through the configured pipeline and anonymizes the results.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: AppConfig,
    runner: FfmpegRunner,
}

impl Orchestrator {
    pub fn new(config: AppConfig, cancel: CancelToken) -> DeidResult<Self> {
        config.validate()?;
        let runner = FfmpegRunner::new(&config.tools, cancel);
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.runner.cancel_token()
    }

    /// Validate every input of every case before anything is processed.
    ///
    /// Returns the probed assets per case, in input order.
    pub fn preflight(
        &self,
        cases: &[PatientCase],
        progress: &dyn ProgressSink,
    ) -> DeidResult<Vec<Vec<VideoAsset>>> {
        let total_files: u64 = cases.iter().map(|c| c.videos.len() as u64).sum();
        let mut checked = 0u64;
        let mut all_assets = Vec::with_capacity(cases.len());

        for (case_idx, case) in cases.iter().enumerate() {
            self.cancel_token().check()?;
            if case.videos.is_empty() {
                return Err(DeidError::input_validation(format!(
                    "case {} has no videos",
                    case.id
                )));
            }
            progress.report(ProgressEvent::new(
                ProgressPhase::Arranging,
                case_idx as u64 + 1,
                cases.len() as u64,
                format!("Case {}: {} video(s)", case.id, case.videos.len()),
            ));

            let mut probed = Vec::with_capacity(case.videos.len());
            for path in &case.videos {
                if path_within(path, &self.config.paths.working_dir) {
                    return Err(DeidError::input_validation(format!(
                        "{}: inputs must not be inside the working directory {}",
                        file_display_name(path),
                        self.config.paths.working_dir.display()
                    )));
                }
                if let Err(e) = std::fs::File::open(path) {
                    return Err(DeidError::input_validation(format!(
                        "{}: cannot be read: {e}",
                        file_display_name(path)
                    )));
                }
                probed.push(probe_video(&self.runner, path));
            }

            let resolutions: Vec<(PathBuf, Option<Resolution>)> = case
                .videos
                .iter()
                .zip(&probed)
                .map(|(path, result)| (path.clone(), result.as_ref().ok().map(|a| a.resolution)))
                .collect();
            check_resolutions(&resolutions)?;

            let mut assets = Vec::with_capacity(probed.len());
            for (path, result) in case.videos.iter().zip(probed) {
                let asset = result.map_err(|e| validation_error(path, e))?;
                self.runner
                    .run_ffmpeg(&validate_args(path), "validation decode")
                    .map_err(|e| validation_error(path, e))?;

                checked += 1;
                progress.report(ProgressEvent::new(
                    ProgressPhase::Validating,
                    checked,
                    total_files,
                    format!("Validated {}", file_display_name(path)),
                ));
                assets.push(asset);
            }
            all_assets.push(assets);
        }

        info!(cases = cases.len(), files = total_files, "Pre-flight checks passed");
        Ok(all_assets)
    }

    /// Validate, then process every case in order.
    ///
    /// `on_case` is called after each completed case. The first failing case
    /// stops the batch.
    pub fn run<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        cases: &[PatientCase],
        progress: &dyn ProgressSink,
        mut on_case: impl FnMut(&CaseReport),
    ) -> DeidResult<Vec<CaseReport>> {
        let assets = self.preflight(cases, progress)?;

        let mut reports = Vec::with_capacity(cases.len());
        for (case, videos) in cases.iter().zip(&assets) {
            self.cancel_token().check()?;
            let report = self.run_case(classifier, case, videos, progress)?;
            on_case(&report);
            reports.push(report);
        }

        progress.report(ProgressEvent::new(
            ProgressPhase::Completed,
            reports.len() as u64,
            cases.len() as u64,
            "All cases processed",
        ));
        Ok(reports)
    }

    /// Process one pre-validated case.
    pub fn run_case<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        case: &PatientCase,
        videos: &[VideoAsset],
        progress: &dyn ProgressSink,
    ) -> DeidResult<CaseReport> {
        let started = Instant::now();
        let processing = &self.config.processing;
        let case_dir = self.config.paths.working_dir.join(&case.id);
        std::fs::create_dir_all(&case_dir)?;

        let ext = output_extension(processing.output_extension.as_deref(), videos);
        let output = case_dir.join(format!("{}.{ext}", case.id));
        info!(
            case = %case.id,
            mode = processing.mode.as_str(),
            videos = videos.len(),
            output = %output.display(),
            "Processing case"
        );

        match processing.mode {
            ProcessingMode::Normal => {
                let engine = CutMergeEngine::new(self.runner.clone(), processing.timescale);
                FastPipeline::new(engine, processing, self.config.model.input_size)
                    .run_case(classifier, &case.id, videos, &output, progress)?;
            }
            ProcessingMode::Advanced => {
                let backend = FfmpegStreamingBackend::new(self.runner.clone());
                StreamingTransformer::new(backend, processing, self.cancel_token().clone())
                    .transform_case(classifier, videos, &output, progress)?;
            }
        }

        self.cancel_token().check()?;
        let anonymizer = Anonymizer::new(
            self.runner.clone(),
            processing.naming.clone(),
            self.config.paths.translation_log_path(),
        );
        let anonymized = anonymizer.anonymize_files(
            vec![output.clone()],
            &self.config.paths.shared_dir,
            progress,
        )?;

        if processing.purge_after {
            if let Err(e) = std::fs::remove_dir_all(&case_dir) {
                warn!(dir = %case_dir.display(), error = %e, "Failed to purge case working directory");
            }
        }

        let report = CaseReport {
            case_id: case.id.clone(),
            output,
            anonymized,
            elapsed_secs: started.elapsed().as_secs_f64(),
            media_secs: videos.iter().map(|v| v.duration_secs).sum(),
        };
        info!(
            target: PERSIST_TARGET,
            case = %report.case_id,
            secs = report.elapsed_secs,
            "total time spent"
        );
        info!(
            target: PERSIST_TARGET,
            case = %report.case_id,
            speed = report.speed(),
            media_secs = report.media_secs,
            "processing speed"
        );
        Ok(report)
    }
}

/// Error unless every probed file shares one resolution. Files that could not
/// be probed are listed without one and do not count as a distinct size.
pub fn check_resolutions(files: &[(PathBuf, Option<Resolution>)]) -> DeidResult<()> {
    let distinct: BTreeSet<(u32, u32)> = files
        .iter()
        .filter_map(|(_, res)| res.map(|r| (r.width, r.height)))
        .collect();
    if distinct.len() <= 1 {
        return Ok(());
    }
    Err(DeidError::ResolutionMismatch {
        files: files
            .iter()
            .map(|(path, res)| (path.clone(), res.map(|r| (r.width, r.height))))
            .collect(),
    })
}

/// Extension of a case output: the configured one, else the first video's.
pub fn output_extension(configured: Option<&str>, videos: &[VideoAsset]) -> String {
    configured
        .map(|e| e.trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .or_else(|| {
            videos
                .first()
                .and_then(|v| v.path.extension())
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
        })
        .unwrap_or_else(|| "mp4".to_string())
}

/// Every subdirectory of `root` holding videos is one case named after it.
pub fn discover_cases(root: &Path) -> DeidResult<Vec<PatientCase>> {
    if !root.is_dir() {
        return Err(DeidError::FileNotFound {
            path: root.to_path_buf(),
        });
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut cases = Vec::new();
    for dir in dirs {
        let videos = collect_videos(&dir)?;
        if videos.is_empty() {
            continue;
        }
        cases.push(PatientCase::new(file_display_name(&dir), videos));
    }
    Ok(cases)
}

/// Pre-flight failure naming the file, with any tool diagnostics.
fn validation_error(path: &Path, err: DeidError) -> DeidError {
    match err {
        e @ (DeidError::Cancelled | DeidError::ToolUnavailable { .. }) => e,
        other => DeidError::input_validation(format!(
            "{}: {}",
            file_display_name(path),
            other.report()
        )),
    }
}
