//! Keyframe-aware clip extraction, black clips and lossless concatenation.

use std::path::{Path, PathBuf};

use deid_common::error::{DeidError, DeidResult};
use deid_model::Resolution;
use deid_processing_core::{ClipPlan, CutStrategy};

use crate::commands::{
    black_clip_args, concat_args, concat_list, reencode_cut_args, stream_copy_cut_args,
};
use crate::runner::FfmpegRunner;

/// An intermediate file removed on drop unless persisted.
#[derive(Debug)]
pub struct ClipHandle {
    path: PathBuf,
    keep: bool,
}

impl ClipHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file and return its path.
    pub fn persist(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ClipHandle {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove intermediate clip");
        }
    }
}

/// Cuts, generates and joins clips with one track timescale.
#[derive(Debug, Clone)]
pub struct CutMergeEngine {
    runner: FfmpegRunner,
    timescale: u32,
}

impl CutMergeEngine {
    pub fn new(runner: FfmpegRunner, timescale: u32) -> Self {
        Self { runner, timescale }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// Produce `output` for one planned clip. Black clips take `resolution`.
    pub fn render(
        &self,
        input: &Path,
        output: &Path,
        plan: &ClipPlan,
        resolution: Resolution,
    ) -> DeidResult<()> {
        match *plan {
            ClipPlan::Blackout { duration } => self.black_clip(output, duration, resolution),
            ClipPlan::Cut {
                start,
                end,
                strategy,
            } => self.cut(input, output, start, end, strategy),
        }
    }

    /// Extract `[start, end)` from `input` using `strategy`.
    pub fn cut(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        end: f64,
        strategy: CutStrategy,
    ) -> DeidResult<()> {
        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            start,
            end,
            ?strategy,
            "Cutting clip"
        );

        match strategy {
            CutStrategy::StreamCopy => self.run_to(
                output,
                &stream_copy_cut_args(input, output, start, end, self.timescale),
                "stream copy cut",
            ),
            CutStrategy::Reencode => self.run_to(
                output,
                &reencode_cut_args(input, output, start, end, self.timescale),
                "re-encode cut",
            ),
            CutStrategy::Split { keyframe } => {
                let left = ClipHandle::new(sibling_with_suffix(output, "left"));
                let right = ClipHandle::new(sibling_with_suffix(output, "right"));

                self.run_to(
                    left.path(),
                    &reencode_cut_args(input, left.path(), start, keyframe, self.timescale),
                    "re-encode cut",
                )?;
                self.run_to(
                    right.path(),
                    &stream_copy_cut_args(input, right.path(), keyframe, end, self.timescale),
                    "stream copy cut",
                )?;
                self.merge(&[left.path().to_path_buf(), right.path().to_path_buf()], output)
            }
        }
    }

    /// Solid black clip of `duration` seconds.
    pub fn black_clip(&self, output: &Path, duration: f64, resolution: Resolution) -> DeidResult<()> {
        if duration <= 0.0 {
            return Err(DeidError::processing(format!(
                "black clip {} has non-positive duration {duration}",
                output.display()
            )));
        }
        self.run_to(
            output,
            &black_clip_args(output, duration, resolution, self.timescale),
            "black clip",
        )
    }

    /// Concatenate `clips` in order into `output` without re-encoding.
    pub fn merge(&self, clips: &[PathBuf], output: &Path) -> DeidResult<()> {
        if clips.is_empty() {
            return Err(DeidError::processing(format!(
                "nothing to merge into {}",
                output.display()
            )));
        }

        let list = ClipHandle::new(sibling_with_suffix(output, "concat").with_extension("txt"));
        std::fs::write(list.path(), concat_list(clips))?;
        tracing::debug!(output = %output.display(), clips = clips.len(), "Merging clips");
        self.run_to(output, &concat_args(list.path(), output), "concat")
    }

    /// Run ffmpeg and remove `output` if it fails.
    fn run_to(&self, output: &Path, args: &[String], context: &str) -> DeidResult<()> {
        match self.runner.run_ffmpeg(args, context) {
            Ok(_) => Ok(()),
            Err(e) => {
                drop(ClipHandle::new(output));
                Err(e)
            }
        }
    }
}

/// `dir/name.ext` becomes `dir/name.<suffix>.ext`.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{suffix}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deid_common::cancel::CancelToken;
    use deid_common::config::ToolsConfig;

    #[test]
    fn test_sibling_with_suffix() {
        assert_eq!(
            sibling_with_suffix(Path::new("/tmp/case.p0001.mp4"), "left"),
            PathBuf::from("/tmp/case.p0001.left.mp4")
        );
        assert_eq!(
            sibling_with_suffix(Path::new("out"), "concat"),
            PathBuf::from("out.concat")
        );
    }

    #[test]
    fn test_clip_handle_removes_unless_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"x").unwrap();

        drop(ClipHandle::new(&a));
        assert!(!a.exists());

        let kept = ClipHandle::new(&b).persist();
        assert_eq!(kept, b);
        assert!(b.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_cut_leaves_no_partial_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.mp4");
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho partial > '{}'\necho 'Invalid data' >&2\nexit 1\n", out.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tools = ToolsConfig {
            ffmpeg: script,
            ffprobe: PathBuf::from("ffprobe"),
        };
        let engine = CutMergeEngine::new(FfmpegRunner::new(&tools, CancelToken::new()), 10_000);
        let err = engine
            .cut(Path::new("in.mp4"), &out, 0.0, 2.0, CutStrategy::Reencode)
            .unwrap_err();
        assert!(matches!(err, DeidError::Media { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_merge_requires_clips() {
        let tools = ToolsConfig::default();
        let engine = CutMergeEngine::new(FfmpegRunner::new(&tools, CancelToken::new()), 10_000);
        assert!(engine.merge(&[], Path::new("out.mp4")).is_err());
    }
}
