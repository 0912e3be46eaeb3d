//! Normal-mode pipeline: sampled classification, then segment cuts.
//!
//! Each video is sampled at a low rate and small size, classified, and the
//! smoothed labels are turned into clear and sensitive segments. Clear
//! segments are cut from the source with keyframe-aware stream copy,
//! sensitive ones are replaced with black clips, and every clip of the case
//! is merged losslessly into one output.

use std::path::{Path, PathBuf};

use deid_classifier::{check_label_count, SensitivityClassifier};
use deid_common::config::ProcessingConfig;
use deid_common::error::{DeidError, DeidResult};
use deid_media::probe::list_keyframes;
use deid_media::{CutMergeEngine, DecodeOptions, FrameReader, FrameSource};
use deid_model::{Frame, Label, ProgressEvent, ProgressPhase, Segment, VideoAsset};
use deid_processing_core::segmenter::{dropped_runs, to_time_segments, whole_video_clear};
use deid_processing_core::{find_segments, plan_clips, ClipPlan};
use tracing::{debug, info, warn};

use crate::progress::ProgressSink;

/// Segments of one analyzed video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSegments {
    pub asset: VideoAsset,
    pub segments: Vec<Segment>,
}

impl VideoSegments {
    pub fn sensitive_secs(&self) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.is_sensitive())
            .map(Segment::duration)
            .sum()
    }
}

/// Normal-mode pipeline for one case at a time.
pub struct FastPipeline<'a> {
    engine: CutMergeEngine,
    config: &'a ProcessingConfig,
    /// Side of the square frames fed to the classifier.
    input_size: u32,
}

impl<'a> FastPipeline<'a> {
    pub fn new(engine: CutMergeEngine, config: &'a ProcessingConfig, input_size: u32) -> Self {
        Self {
            engine,
            config,
            input_size,
        }
    }

    /// Analyze, cut and merge `videos` into `output`.
    ///
    /// Intermediate clips live in a `tmp_<timestamp>` directory next to
    /// `output` that is removed when this returns.
    pub fn run_case<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        case_id: &str,
        videos: &[VideoAsset],
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> DeidResult<Vec<VideoSegments>> {
        if videos.is_empty() {
            return Err(DeidError::input_validation(format!("case {case_id} has no videos")));
        }
        let cancel = self.engine.runner().cancel_token();

        let mut analyzed = Vec::with_capacity(videos.len());
        for (i, video) in videos.iter().enumerate() {
            cancel.check()?;
            let segments = self.analyze(classifier, video)?;
            progress.report(ProgressEvent::new(
                ProgressPhase::Analyzing,
                i as u64 + 1,
                videos.len() as u64,
                format!("Analyzed {}", video.display_name()),
            ));
            analyzed.push(VideoSegments {
                asset: video.clone(),
                segments,
            });
        }

        let work_parent = output.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::Builder::new()
            .prefix(&format!("tmp_{}_", chrono::Local::now().format("%Y%m%d%H%M%S")))
            .tempdir_in(work_parent)?;
        debug!(dir = %tmp.path().display(), "Created clip directory");

        let total: u64 = analyzed.iter().map(|v| v.segments.len() as u64).sum();
        let mut done = 0u64;
        let mut clips = Vec::new();
        for (video_idx, video) in analyzed.iter().enumerate() {
            cancel.check()?;
            let keyframes = list_keyframes(self.engine.runner(), &video.asset.path)?;
            let plans = plan_clips(&video.segments, &keyframes);

            let clip_dir = tmp.path().join(format!("video{video_idx:03}"));
            std::fs::create_dir_all(&clip_dir)?;
            let ext = clip_extension(&video.asset.path);

            for (idx, plan) in plans.iter().enumerate() {
                cancel.check()?;
                let clip = clip_dir.join(clip_name(case_id, idx, &ext));
                self.engine
                    .render(&video.asset.path, &clip, plan, video.asset.resolution)?;
                clips.push(clip);

                done += 1;
                progress.report(ProgressEvent::new(
                    ProgressPhase::Cutting,
                    done,
                    total,
                    describe_clip(&video.asset, plan),
                ));
            }
        }

        cancel.check()?;
        progress.report(ProgressEvent::new(
            ProgressPhase::Merging,
            0,
            1,
            format!("Merging {} clips", clips.len()),
        ));
        self.engine.merge(&clips, output)?;
        progress.report(ProgressEvent::new(
            ProgressPhase::Merging,
            1,
            1,
            format!("Merged {}", output.display()),
        ));

        info!(
            case = case_id,
            output = %output.display(),
            clips = clips.len(),
            sensitive_secs = analyzed.iter().map(VideoSegments::sensitive_secs).sum::<f64>(),
            "Case merged"
        );
        Ok(analyzed)
    }

    /// Sample, classify and segment one video.
    pub fn analyze<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        video: &VideoAsset,
    ) -> DeidResult<Vec<Segment>> {
        let options = DecodeOptions::sampled(self.config.sample_fps, self.input_size);
        let mut reader = FrameReader::open(
            self.engine.runner(),
            &video.path,
            video.resolution,
            options,
        )?;
        let result = analyze_frames(
            classifier,
            &mut reader,
            self.config.buffer_size,
            self.config.sample_fps,
            video,
        );
        reader.close();
        result
    }
}

/// Classify every frame of `source` and turn the labels into time segments.
///
/// Frames are classified as each batch of `buffer_size` fills, so at most one
/// batch is held in memory. A sequence too short to segment yields one clear
/// segment over the whole video.
pub fn analyze_frames<C: SensitivityClassifier + ?Sized>(
    classifier: &mut C,
    source: &mut dyn FrameSource,
    buffer_size: usize,
    sample_fps: f64,
    video: &VideoAsset,
) -> DeidResult<Vec<Segment>> {
    if buffer_size == 0 {
        return Err(DeidError::classification("buffer size must be at least 1"));
    }
    classifier.reset_state();

    let mut labels: Vec<Label> = Vec::new();
    let mut batch: Vec<Frame> = Vec::with_capacity(buffer_size);
    while let Some(frame) = source.next_frame()? {
        batch.push(frame);
        if batch.len() == buffer_size {
            classify_batch(classifier, &batch, &mut labels)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        classify_batch(classifier, &batch, &mut labels)?;
    }
    Ok(segments_from_labels(&labels, sample_fps, video))
}

fn classify_batch<C: SensitivityClassifier + ?Sized>(
    classifier: &mut C,
    batch: &[Frame],
    labels: &mut Vec<Label>,
) -> DeidResult<()> {
    let batch_labels = classifier.classify(batch)?;
    check_label_count(batch.len(), batch_labels.len())?;
    labels.extend(batch_labels);
    Ok(())
}

/// Time segments for the labels of frames sampled at `sample_fps`.
pub fn segments_from_labels(labels: &[Label], sample_fps: f64, video: &VideoAsset) -> Vec<Segment> {
    let spans = match find_segments(labels) {
        Ok(spans) => spans,
        Err(e) => {
            debug!(video = %video.display_name(), error = %e, "Treating video as clear");
            return whole_video_clear(video.duration_secs);
        }
    };

    let dropped = dropped_runs(labels, &spans);
    let unredacted = dropped
        .iter()
        .filter(|run| run.label == Label::Sensitive)
        .map(|run| run.len())
        .sum::<usize>();
    if unredacted > 0 {
        warn!(
            video = %video.display_name(),
            frames = unredacted,
            "Sensitive samples fall inside clear segments"
        );
    }

    let segments = to_time_segments(&spans, sample_fps, video.duration_secs);
    debug!(
        video = %video.display_name(),
        samples = labels.len(),
        segments = segments.len(),
        "Segmented video"
    );
    segments
}

fn clip_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string())
}

fn describe_clip(asset: &VideoAsset, plan: &ClipPlan) -> String {
    match plan {
        ClipPlan::Blackout { duration } => {
            format!("{}: blacked out {duration:.1}s", asset.display_name())
        }
        ClipPlan::Cut { start, end, .. } => {
            format!("{}: cut {start:.1}s-{end:.1}s", asset.display_name())
        }
    }
}

/// File name of the `idx`-th clip cut from one video of a case.
pub fn clip_name(case_id: &str, idx: usize, ext: &str) -> PathBuf {
    PathBuf::from(format!("{case_id}.p{idx:04}.{ext}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;
    use deid_model::Resolution;

    struct ScriptedClassifier {
        labels: Vec<Label>,
        cursor: usize,
        resets: usize,
        batch_sizes: Vec<usize>,
    }

    impl SensitivityClassifier for ScriptedClassifier {
        fn reset_state(&mut self) {
            self.resets += 1;
            self.cursor = 0;
        }

        fn classify(&mut self, frames: &[Frame]) -> DeidResult<Vec<Label>> {
            self.batch_sizes.push(frames.len());
            let out = self.labels[self.cursor..self.cursor + frames.len()].to_vec();
            self.cursor += frames.len();
            Ok(out)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct CountingSource {
        remaining: u64,
        next: u64,
        reads: Arc<AtomicU64>,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> DeidResult<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.reads.fetch_add(1, Ordering::Relaxed);
            let frame = Frame::filled(64, 64, self.next, [0, 0, 0]);
            self.next += 1;
            Ok(Some(frame))
        }

        fn close(&mut self) {}
    }

    fn asset(duration: f64) -> VideoAsset {
        VideoAsset {
            path: PathBuf::from("/in/case.mp4"),
            resolution: Resolution::new(640, 480),
            fps: 25.0,
            frame_count: (duration * 25.0) as u64,
            duration_secs: duration,
            has_audio: true,
        }
    }

    #[test]
    fn test_analyze_frames_chunks_and_segments() {
        let labels = Label::parse_sequence("001001100").unwrap();
        let mut classifier = ScriptedClassifier {
            labels,
            cursor: 0,
            resets: 0,
            batch_sizes: Vec::new(),
        };
        let mut source = CountingSource {
            remaining: 9,
            next: 0,
            reads: Arc::default(),
        };

        let segments = analyze_frames(&mut classifier, &mut source, 4, 1.0, &asset(8.5)).unwrap();

        assert_eq!(classifier.resets, 1);
        assert_eq!(classifier.batch_sizes, vec![4, 4, 1]);
        assert_eq!(
            segments,
            vec![
                Segment::new(Label::Clear, 0.0, 2.0),
                Segment::new(Label::Sensitive, 2.0, 3.0),
                Segment::new(Label::Clear, 3.0, 5.0),
                Segment::new(Label::Sensitive, 5.0, 6.0),
                Segment::new(Label::Clear, 6.0, 8.5),
            ]
        );
    }

    /// Records how many frames the source had produced at each batch.
    struct ReadTrackingClassifier {
        reads: Arc<AtomicU64>,
        reads_at_batch: Vec<u64>,
    }

    impl SensitivityClassifier for ReadTrackingClassifier {
        fn reset_state(&mut self) {}

        fn classify(&mut self, frames: &[Frame]) -> DeidResult<Vec<Label>> {
            self.reads_at_batch.push(self.reads.load(Ordering::Relaxed));
            Ok(vec![Label::Clear; frames.len()])
        }

        fn name(&self) -> &str {
            "read-tracking"
        }
    }

    #[test]
    fn test_batches_classified_as_they_fill() {
        let reads = Arc::new(AtomicU64::new(0));
        let mut classifier = ReadTrackingClassifier {
            reads: Arc::clone(&reads),
            reads_at_batch: Vec::new(),
        };
        let mut source = CountingSource {
            remaining: 9,
            next: 0,
            reads,
        };

        analyze_frames(&mut classifier, &mut source, 4, 1.0, &asset(9.0)).unwrap();

        assert_eq!(classifier.reads_at_batch, vec![4, 8, 9]);
    }

    #[test]
    fn test_zero_buffer_size_is_rejected() {
        let mut classifier = ReadTrackingClassifier {
            reads: Arc::default(),
            reads_at_batch: Vec::new(),
        };
        let mut source = CountingSource {
            remaining: 3,
            next: 0,
            reads: Arc::default(),
        };

        let err = analyze_frames(&mut classifier, &mut source, 0, 1.0, &asset(3.0)).unwrap_err();
        assert!(matches!(err, DeidError::Classification { .. }));
        assert!(classifier.reads_at_batch.is_empty());
    }

    #[test]
    fn test_single_sample_means_whole_video_clear() {
        let segments = segments_from_labels(&[Label::Sensitive], 1.0, &asset(0.8));
        assert_eq!(segments, vec![Segment::new(Label::Clear, 0.0, 0.8)]);
    }

    #[test]
    fn test_sensitive_secs() {
        let video = VideoSegments {
            asset: asset(10.0),
            segments: vec![
                Segment::new(Label::Clear, 0.0, 4.0),
                Segment::new(Label::Sensitive, 4.0, 6.5),
                Segment::new(Label::Clear, 6.5, 10.0),
            ],
        };
        assert!((video.sensitive_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_clip_name_and_extension() {
        assert_eq!(clip_name("case7", 3, "mp4"), PathBuf::from("case7.p0003.mp4"));
        assert_eq!(clip_extension(Path::new("/a/b.MOV")), "mov");
        assert_eq!(clip_extension(Path::new("/a/b")), "mp4");
    }
}
