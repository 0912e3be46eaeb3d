//! Single-pass classify, mask, resample and encode.
//!
//! Every video of a case is decoded into a bounded buffer. A full buffer is
//! classified as one batch, its sensitive frames are masked, the survivors of
//! the frame-rate reduction are written to one encoder shared by the whole
//! case. The partial buffer left at the end of a video is flushed without
//! resampling.

use std::path::Path;

use deid_classifier::SensitivityClassifier;
use deid_common::cancel::CancelToken;
use deid_common::config::{MaskFill, ProcessingConfig};
use deid_common::error::{DeidError, DeidResult};
use deid_media::{
    DecodeOptions, EncoderSettings, FfmpegRunner, FrameReader, FrameSink, FrameSource, FrameWriter,
};
use deid_model::{Frame, ProgressEvent, ProgressPhase, VideoAsset};
use deid_processing_core::{apply_mask, FrameRateResampler};
use tracing::{debug, info};

use crate::progress::ProgressSink;

/// Opens frame sources and sinks for the transformer.
pub trait StreamingBackend {
    fn open_source(&self, asset: &VideoAsset) -> DeidResult<Box<dyn FrameSource>>;

    fn create_sink(
        &self,
        output: &Path,
        settings: &EncoderSettings,
    ) -> DeidResult<Box<dyn FrameSink>>;
}

/// Decodes and encodes through ffmpeg pipes.
#[derive(Debug, Clone)]
pub struct FfmpegStreamingBackend {
    runner: FfmpegRunner,
}

impl FfmpegStreamingBackend {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

impl StreamingBackend for FfmpegStreamingBackend {
    fn open_source(&self, asset: &VideoAsset) -> DeidResult<Box<dyn FrameSource>> {
        let reader = FrameReader::open(
            &self.runner,
            &asset.path,
            asset.resolution,
            DecodeOptions::native(),
        )?;
        Ok(Box::new(reader))
    }

    fn create_sink(
        &self,
        output: &Path,
        settings: &EncoderSettings,
    ) -> DeidResult<Box<dyn FrameSink>> {
        Ok(Box::new(FrameWriter::create(&self.runner, output, settings)?))
    }
}

/// Frame counts of one transformed case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_masked: u64,
}

/// Advanced-mode pipeline for one case at a time.
pub struct StreamingTransformer<'a, B: StreamingBackend> {
    backend: B,
    config: &'a ProcessingConfig,
    cancel: CancelToken,
}

/// Counters for the progress of one case.
struct CaseProgress<'p> {
    sink: &'p dyn ProgressSink,
    done: u64,
    total: u64,
}

impl CaseProgress<'_> {
    fn step(&mut self, message: String) {
        self.done += 1;
        self.sink.report(ProgressEvent::new(
            ProgressPhase::Encoding,
            self.done,
            self.total,
            message,
        ));
    }
}

impl<'a, B: StreamingBackend> StreamingTransformer<'a, B> {
    pub fn new(backend: B, config: &'a ProcessingConfig, cancel: CancelToken) -> Self {
        Self {
            backend,
            config,
            cancel,
        }
    }

    /// Transform `videos` in order into the single file `output`.
    ///
    /// On any error, including cancellation, the encoder is aborted and the
    /// partial output removed before returning.
    pub fn transform_case<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        videos: &[VideoAsset],
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> DeidResult<TransformStats> {
        let first = videos
            .first()
            .ok_or_else(|| DeidError::input_validation("case has no videos"))?;
        if self.config.buffer_size == 0 {
            return Err(DeidError::config("buffer_size must be at least 1"));
        }
        self.cancel.check()?;

        let settings = EncoderSettings::for_source(self.config, first.resolution, first.fps);
        let total = videos
            .iter()
            .map(|v| v.batch_count(self.config.buffer_size))
            .sum::<u64>();

        info!(
            output = %output.display(),
            videos = videos.len(),
            input = %settings.input,
            encoded = %settings.output_resolution(),
            fps = settings.output_fps,
            "Starting streaming transform"
        );

        let mut sink = self.backend.create_sink(output, &settings)?;
        let mut case_progress = CaseProgress {
            sink: progress,
            done: 0,
            total,
        };
        let mut stats = TransformStats::default();

        for video in videos {
            if let Err(e) = self.transform_video(
                classifier,
                video,
                sink.as_mut(),
                &mut stats,
                &mut case_progress,
            ) {
                sink.abort();
                if e.is_cancelled() {
                    info!(output = %output.display(), "Streaming transform stopped");
                }
                return Err(e);
            }
        }

        sink.finish()?;
        info!(
            output = %output.display(),
            read = stats.frames_read,
            written = stats.frames_written,
            masked = stats.frames_masked,
            "Streaming transform finished"
        );
        Ok(stats)
    }

    fn transform_video<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        video: &VideoAsset,
        sink: &mut dyn FrameSink,
        stats: &mut TransformStats,
        progress: &mut CaseProgress<'_>,
    ) -> DeidResult<()> {
        self.cancel.check()?;
        classifier.reset_state();

        let mut source = self.backend.open_source(video)?;
        let result = self.stream_frames(classifier, video, source.as_mut(), sink, stats, progress);
        source.close();
        result?;

        progress.step(format!("Finished {}", video.display_name()));
        Ok(())
    }

    fn stream_frames<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        video: &VideoAsset,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        stats: &mut TransformStats,
        progress: &mut CaseProgress<'_>,
    ) -> DeidResult<()> {
        let buffer_size = self.config.buffer_size;
        let policy = self.config.mask_policy;
        let resampler = FrameRateResampler::new(video.fps, self.config.target_fps);
        let name = video.display_name();
        debug!(
            video = %name,
            interval = ?resampler.interval(),
            "Streaming video"
        );

        let mut buffer: Vec<Frame> = Vec::with_capacity(buffer_size);
        let mut batch = 0u64;
        loop {
            self.cancel.check()?;
            let Some(frame) = source.next_frame()? else {
                break;
            };
            stats.frames_read += 1;
            buffer.push(frame);

            if buffer.len() == buffer_size {
                batch += 1;
                self.flush(
                    classifier,
                    &mut buffer,
                    policy.batch_fill,
                    Some(&resampler),
                    sink,
                    stats,
                )?;
                progress.step(format!("{name}: batch {batch}"));
            }
        }

        if !buffer.is_empty() {
            self.flush(classifier, &mut buffer, policy.tail_fill, None, sink, stats)?;
        }
        Ok(())
    }

    /// Classify, mask and write the buffered frames, then clear the buffer.
    fn flush<C: SensitivityClassifier + ?Sized>(
        &self,
        classifier: &mut C,
        buffer: &mut Vec<Frame>,
        fill: MaskFill,
        resampler: Option<&FrameRateResampler>,
        sink: &mut dyn FrameSink,
        stats: &mut TransformStats,
    ) -> DeidResult<()> {
        let labels = classifier.classify(buffer)?;
        deid_classifier::check_label_count(buffer.len(), labels.len())?;
        stats.frames_masked += apply_mask(buffer, &labels, fill) as u64;

        for frame in buffer.drain(..) {
            if resampler.map_or(true, |r| r.keep(frame.index)) {
                self.cancel.check()?;
                sink.write_frame(&frame)?;
                stats.frames_written += 1;
            }
        }
        Ok(())
    }
}
