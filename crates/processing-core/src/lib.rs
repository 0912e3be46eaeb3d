//! Deid Processing Core
//!
//! Turns per-frame sensitivity labels into editing decisions:
//! - **Segmenter:** smoothing and run-length segmentation of label sequences
//! - **Cut planning:** keyframe-aware choice between stream copy and re-encode
//! - **Resampling:** frame-rate reduction by index selection
//! - **Masking:** replacing sensitive frames with a solid fill
//!
//! This crate is pure computation with no I/O and no subprocesses.
//! All inputs are data; all outputs are data.

pub mod cut_plan;
pub mod mask;
pub mod resample;
pub mod segmenter;

pub use cut_plan::{plan_clips, select_cut, ClipPlan, CutStrategy};
pub use mask::apply_mask;
pub use resample::FrameRateResampler;
pub use segmenter::{find_segments, NoSegments};
