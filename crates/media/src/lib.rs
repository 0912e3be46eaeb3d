//! Deid Media
//!
//! Drives ffmpeg and ffprobe as external processes:
//! - **Runner:** spawn, stderr draining, cancellation registration
//! - **Probe:** stream properties and keyframe timestamps
//! - **Commands:** argument builders for every transcoder invocation
//! - **Cut/merge:** keyframe-aware clip extraction, black clips, lossless concat
//! - **Frames:** raw RGB24 decode and encode pipes

pub mod commands;
pub mod cut_merge;
pub mod encode;
pub mod frames;
pub mod probe;
pub mod runner;

pub use cut_merge::{ClipHandle, CutMergeEngine};
pub use encode::EncoderSettings;
pub use frames::{DecodeOptions, FrameReader, FrameSink, FrameSource, FrameWriter};
pub use probe::{list_keyframes, probe_video};
pub use runner::FfmpegRunner;
