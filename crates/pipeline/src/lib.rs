//! Deid Pipeline
//!
//! Runs patient cases end to end:
//! - **Streaming:** single-pass classify, mask, resample and encode (advanced mode)
//! - **Fast:** sampled classification, segment cuts and lossless merge (normal mode)
//! - **Anonymizer:** metadata stripping, renaming and the translation log
//! - **Orchestrator:** pre-flight validation and per-case sequencing
//! - **Worker:** background execution reporting over a channel

pub mod anonymizer;
pub mod fast;
pub mod orchestrator;
pub mod progress;
pub mod streaming;
pub mod worker;

pub use anonymizer::{AnonymizeReport, Anonymizer, TranslationLog};
pub use fast::FastPipeline;
pub use orchestrator::{CaseReport, Orchestrator};
pub use progress::{no_progress, ProgressSink};
pub use streaming::{FfmpegStreamingBackend, StreamingBackend, StreamingTransformer, TransformStats};
pub use worker::{spawn_worker, spawn_worker_with, WorkerHandle, WorkerMessage};
