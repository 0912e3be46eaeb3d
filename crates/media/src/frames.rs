//! Raw RGB24 frame pipes into and out of ffmpeg.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, ChildStdout};

use deid_common::cancel::CancelToken;
use deid_common::error::{DeidError, DeidResult};
use deid_model::{Frame, Resolution};

use crate::commands::decode_args;
use crate::encode::EncoderSettings;
use crate::runner::{FfmpegRunner, SpawnedProcess};

/// A sequential producer of decoded frames.
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> DeidResult<Option<Frame>>;

    /// Stop producing and release the underlying decoder.
    fn close(&mut self);
}

/// A sequential consumer of frames that produces one output file.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> DeidResult<()>;

    /// Flush and finalize the output.
    fn finish(&mut self) -> DeidResult<()>;

    /// Abandon the output and remove anything partially written.
    fn abort(&mut self);
}

/// Decoder options for [`FrameReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeOptions {
    /// Resample to this rate before output.
    pub sample_fps: Option<f64>,
    /// Scale every frame to this size.
    pub scale: Option<Resolution>,
}

impl DecodeOptions {
    /// Full rate, native size.
    pub fn native() -> Self {
        Self::default()
    }

    /// Low-rate, fixed-size sampling used for segment estimation.
    pub fn sampled(fps: f64, size: u32) -> Self {
        Self {
            sample_fps: Some(fps),
            scale: Some(Resolution::new(size, size)),
        }
    }
}

/// Reads fixed-size RGB24 frames from an ffmpeg decode pipe.
pub struct FrameReader {
    process: Option<SpawnedProcess>,
    stdout: Option<BufReader<ChildStdout>>,
    resolution: Resolution,
    next_index: u64,
    cancel: CancelToken,
    path: PathBuf,
}

impl FrameReader {
    /// Start decoding `path`. `source` is the probed stream size, used when
    /// no scale is requested.
    pub fn open(
        runner: &FfmpegRunner,
        path: &Path,
        source: Resolution,
        options: DecodeOptions,
    ) -> DeidResult<Self> {
        let resolution = options.scale.unwrap_or(source);
        if resolution.rgb24_len() == 0 {
            return Err(DeidError::processing(format!(
                "cannot decode {} at {resolution}",
                path.display()
            )));
        }

        let args = decode_args(path, options.sample_fps, options.scale);
        let mut process = runner.spawn_ffmpeg(&args, false, true)?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| DeidError::media("Failed to capture decoder stdout"))?;

        tracing::debug!(path = %path.display(), %resolution, ?options, "Decoder started");

        Ok(Self {
            process: Some(process),
            stdout: Some(BufReader::new(stdout)),
            resolution,
            next_index: 0,
            cancel: runner.cancel_token().clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Frames returned so far.
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    /// Wait for the decoder after end of stream and surface its failure.
    fn finish_process(&mut self) -> DeidResult<()> {
        self.stdout = None;
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        let (status, stderr) = process.wait()?;
        if status.success() {
            return Ok(());
        }
        if self.cancel.is_stopped() {
            return Err(DeidError::Cancelled);
        }
        Err(DeidError::media_with_stderr(
            format!("decoding {} failed ({status})", self.path.display()),
            &stderr,
        ))
    }
}

impl FrameSource for FrameReader {
    fn next_frame(&mut self) -> DeidResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_len = self.resolution.rgb24_len();
        let mut data = vec![0u8; frame_len];
        let mut filled = 0usize;
        while filled < frame_len {
            match stdout.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(DeidError::media(format!(
                        "Failed reading frames from {}: {e}",
                        self.path.display()
                    )))
                }
            }
        }

        if filled < frame_len {
            if filled > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    bytes = filled,
                    expected = frame_len,
                    "Discarding truncated trailing frame"
                );
            }
            self.finish_process()?;
            return Ok(None);
        }

        let frame = Frame::new(
            self.resolution.width,
            self.resolution.height,
            self.next_index,
            data,
        );
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pipes RGB24 frames into an ffmpeg encoder writing one output file.
pub struct FrameWriter {
    process: Option<SpawnedProcess>,
    stdin: Option<BufWriter<ChildStdin>>,
    input: Resolution,
    output: PathBuf,
    frames_written: u64,
    finished: bool,
    cancel: CancelToken,
}

impl FrameWriter {
    pub fn create(
        runner: &FfmpegRunner,
        output: &Path,
        settings: &EncoderSettings,
    ) -> DeidResult<Self> {
        let args = settings.args(output);
        let mut process = runner.spawn_ffmpeg(&args, true, false)?;
        let stdin = process
            .take_stdin()
            .ok_or_else(|| DeidError::media("Failed to capture encoder stdin"))?;

        tracing::debug!(
            output = %output.display(),
            input = %settings.input,
            encoded = %settings.output_resolution(),
            profile = ?settings.profile,
            "Encoder started"
        );

        Ok(Self {
            process: Some(process),
            stdin: Some(BufWriter::new(stdin)),
            input: settings.input,
            output: output.to_path_buf(),
            frames_written: 0,
            finished: false,
            cancel: runner.cancel_token().clone(),
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl FrameSink for FrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> DeidResult<()> {
        if frame.resolution() != self.input || !frame.is_well_formed() {
            return Err(DeidError::processing(format!(
                "frame {} is {} but the encoder expects {}",
                frame.index,
                frame.resolution(),
                self.input
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DeidError::processing("encoder input already closed"))?;
        stdin.write_all(&frame.data).map_err(|e| {
            DeidError::media(format!(
                "Failed writing frame to encoder for {}: {e}",
                self.output.display()
            ))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> DeidResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .flush()
                .map_err(|e| DeidError::media(format!("Failed flushing encoder input: {e}")))?;
        }
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        let (status, stderr) = process.wait()?;
        if !status.success() {
            remove_partial(&self.output);
            if self.cancel.is_stopped() {
                return Err(DeidError::Cancelled);
            }
            return Err(DeidError::media_with_stderr(
                format!("encoding {} failed ({status})", self.output.display()),
                &stderr,
            ));
        }
        self.finished = true;
        tracing::debug!(
            output = %self.output.display(),
            frames = self.frames_written,
            "Encoder finished"
        );
        Ok(())
    }

    fn abort(&mut self) {
        self.stdin = None;
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
        if !self.finished {
            remove_partial(&self.output);
        }
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
