//! Metadata stripping, renaming and the translation log.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use deid_common::config::{path_within, NamingScheme};
use deid_common::error::{DeidError, DeidResult};
use deid_media::commands::strip_metadata_args;
use deid_media::FfmpegRunner;
use deid_model::{ProgressEvent, ProgressPhase, TranslationRecord};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::progress::ProgressSink;

/// Extensions treated as video files, compared case-insensitively.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "m4v", "mpg", "mpeg", "wmv"];

const LOG_HEADER: &str = "original,anonymized";

/// Outcome of one anonymization batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnonymizeReport {
    /// One record per processed file, in processing order.
    pub records: Vec<TranslationRecord>,
    /// Files written to the destination.
    pub outputs: Vec<PathBuf>,
}

impl AnonymizeReport {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| !r.is_failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.is_failed()).count()
    }
}

/// Append-only CSV mapping original to anonymized names.
///
/// Each record opens, appends and closes the file. Writers of the same path
/// within the process are serialized.
#[derive(Debug, Clone)]
pub struct TranslationLog {
    path: PathBuf,
}

fn log_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(map.entry(path.to_path_buf()).or_default())
}

impl TranslationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, writing the header first if the log is new.
    pub fn append(&self, record: &TranslationRecord) -> DeidResult<()> {
        let lock = log_lock(&self.path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let is_new = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if is_new {
            writeln!(file, "{LOG_HEADER}")?;
        }
        writeln!(
            file,
            "{},{}",
            csv_field(&record.original),
            csv_field(&record.anonymized)
        )?;
        Ok(())
    }

    /// Read every record back, skipping the header.
    pub fn read_records(&self) -> DeidResult<Vec<TranslationRecord>> {
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let fields = parse_csv_line(line);
                match fields.as_slice() {
                    [original, anonymized] => Ok(TranslationRecord::new(original, anonymized)),
                    _ => Err(DeidError::processing(format!(
                        "malformed translation log line: {line}"
                    ))),
                }
            })
            .collect()
    }
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

/// Strips metadata from video files and gives them untraceable names.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    runner: FfmpegRunner,
    naming: NamingScheme,
    log: TranslationLog,
}

impl Anonymizer {
    pub fn new(runner: FfmpegRunner, naming: NamingScheme, log_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            naming,
            log: TranslationLog::new(log_path),
        }
    }

    pub fn log(&self) -> &TranslationLog {
        &self.log
    }

    /// Anonymize every video under `source_dir` into `dest_dir`.
    pub fn anonymize_dir(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> DeidResult<AnonymizeReport> {
        let files = collect_videos(source_dir)?;
        info!(source = %source_dir.display(), files = files.len(), "Collected videos");
        self.anonymize_files(files, dest_dir, progress)
    }

    /// Anonymize `files` into `dest_dir`.
    ///
    /// Names already present in `dest_dir` are never reused. A file whose
    /// metadata cannot be stripped is logged as failed and the batch
    /// continues. Cancellation stops the batch.
    pub fn anonymize_files(
        &self,
        mut files: Vec<PathBuf>,
        dest_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> DeidResult<AnonymizeReport> {
        if path_within(self.log.path(), dest_dir) {
            return Err(DeidError::config(format!(
                "translation log {} must not be inside the destination {}",
                self.log.path().display(),
                dest_dir.display()
            )));
        }
        files.shuffle(&mut rand::rng());
        std::fs::create_dir_all(dest_dir)?;

        let existing = existing_stems(dest_dir)?;
        let names = assign_names(&self.naming, files.len(), |stem| existing.contains(stem));
        info!(
            dest = %dest_dir.display(),
            files = files.len(),
            "Anonymizing videos"
        );

        let total = files.len() as u64;
        let mut report = AnonymizeReport::default();
        for (i, (file, new_stem)) in files.iter().zip(names).enumerate() {
            self.runner.cancel_token().check()?;
            let original = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let record = match self.strip_one(file, dest_dir, &new_stem) {
                Ok(output) => {
                    report.outputs.push(output);
                    TranslationRecord::new(&original, &new_stem)
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(file = %file.display(), error = %e.report(), "Metadata strip failed");
                    TranslationRecord::failed(&original)
                }
            };
            self.log.append(&record)?;
            report.records.push(record);

            progress.report(ProgressEvent::new(
                ProgressPhase::Anonymizing,
                i as u64 + 1,
                total,
                format!("Anonymized {}", deid_model::file_display_name(file)),
            ));
        }

        if report.failed() > 0 {
            warn!(failed = report.failed(), succeeded = report.succeeded(), "Anonymization finished with failures");
        } else {
            info!(succeeded = report.succeeded(), "Anonymization finished");
        }
        Ok(report)
    }

    fn strip_one(&self, input: &Path, dest_dir: &Path, new_stem: &str) -> DeidResult<PathBuf> {
        let output = match input.extension() {
            Some(ext) => dest_dir.join(format!("{new_stem}.{}", ext.to_string_lossy())),
            None => dest_dir.join(new_stem),
        };
        match self
            .runner
            .run_ffmpeg(&strip_metadata_args(input, &output), "metadata strip")
        {
            Ok(_) => Ok(output),
            Err(e) => {
                if output.exists() {
                    if let Err(remove_err) = std::fs::remove_file(&output) {
                        warn!(path = %output.display(), error = %remove_err, "Failed to remove partial output");
                    }
                }
                Err(e)
            }
        }
    }
}

/// Whether `path` has one of [`VIDEO_EXTENSIONS`].
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Every video file below `dir`, recursively, in sorted order.
pub fn collect_videos(dir: &Path) -> DeidResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DeidError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_video_file(path))
        .collect();
    found.sort();
    Ok(found)
}

/// File stems present directly in `dir`.
fn existing_stems(dir: &Path) -> DeidResult<HashSet<String>> {
    let mut stems = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        if let Some(stem) = entry?.path().file_stem() {
            stems.insert(stem.to_string_lossy().into_owned());
        }
    }
    Ok(stems)
}

/// `count` distinct names under `scheme`. `taken` reports names already in
/// use at the destination: random names that collide are regenerated and
/// sequential numbering skips them.
pub fn assign_names(
    scheme: &NamingScheme,
    count: usize,
    taken: impl Fn(&str) -> bool,
) -> Vec<String> {
    match scheme {
        NamingScheme::Uuid => {
            let mut used = HashSet::with_capacity(count);
            (0..count)
                .map(|_| loop {
                    let candidate = uuid::Uuid::new_v4().simple().to_string()[..7].to_string();
                    if !used.contains(&candidate) && !taken(&candidate) {
                        used.insert(candidate.clone());
                        break candidate;
                    }
                })
                .collect()
        }
        NamingScheme::Sequential { prefix } => {
            let width = sequence_width(count);
            (0..)
                .map(|i: usize| format!("{prefix}{i:0width$}"))
                .filter(|name| !taken(name))
                .take(count)
                .collect()
        }
    }
}

/// Digits needed for `count` sequential names: `floor(log10(count)) + 1`.
pub fn sequence_width(count: usize) -> usize {
    if count == 0 {
        return 1;
    }
    count.ilog10() as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_width() {
        assert_eq!(sequence_width(1), 1);
        assert_eq!(sequence_width(9), 1);
        assert_eq!(sequence_width(10), 2);
        assert_eq!(sequence_width(100), 3);
    }

    #[test]
    fn test_sequential_names_are_padded() {
        let names = assign_names(
            &NamingScheme::Sequential {
                prefix: "video".to_string(),
            },
            12,
            |_| false,
        );
        assert_eq!(names.first().unwrap(), "video00");
        assert_eq!(names.last().unwrap(), "video11");
    }

    #[test]
    fn test_sequential_names_skip_taken() {
        let taken: HashSet<&str> = ["video0", "video1", "video3"].into_iter().collect();
        let names = assign_names(
            &NamingScheme::Sequential {
                prefix: "video".to_string(),
            },
            3,
            |name| taken.contains(name),
        );
        assert_eq!(names, vec!["video2", "video4", "video5"]);
    }

    #[test]
    fn test_uuid_names_are_unique_hex() {
        let names = assign_names(&NamingScheme::Uuid, 50, |_| false);
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 50);
        assert!(names
            .iter()
            .all(|n| n.len() == 7 && n.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn test_collect_videos_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.MP4"), b"").unwrap();
        std::fs::write(dir.path().join("nested/b.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = collect_videos(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_video_file(f)));
        assert!(matches!(
            collect_videos(&dir.path().join("missing")),
            Err(DeidError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_log_inside_destination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("shared");
        let anonymizer = Anonymizer::new(
            FfmpegRunner::new(
                &deid_common::config::ToolsConfig::default(),
                deid_common::cancel::CancelToken::new(),
            ),
            NamingScheme::Uuid,
            dest.join("translation_log.csv"),
        );
        let err = anonymizer
            .anonymize_files(Vec::new(), &dest, &crate::progress::no_progress)
            .unwrap_err();
        assert!(matches!(err, DeidError::Config { .. }));
        assert!(!dest.join("translation_log.csv").exists());
    }

    #[test]
    fn test_log_writes_header_once_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let log = TranslationLog::new(dir.path().join("logs/translation_log.csv"));
        log.append(&TranslationRecord::new("patient, one", "a1b2c3d")).unwrap();
        log.append(&TranslationRecord::failed("say \"hi\"")).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            content,
            "original,anonymized\n\"patient, one\",a1b2c3d\n\"say \"\"hi\"\"\",FAILED\n"
        );

        let records = log.read_records().unwrap();
        assert_eq!(records[0].original, "patient, one");
        assert!(records[1].is_failed());
        assert_eq!(records[1].original, "say \"hi\"");
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = TranslationLog::new(&path);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        log.append(&TranslationRecord::new(format!("t{t}-{i}"), "x"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(LOG_HEADER).count(), 1);
        assert_eq!(TranslationLog::new(&path).read_records().unwrap().len(), 80);
    }
}
