//! Deid Sensitivity Classification
//!
//! Labels decoded frames as clear or sensitive:
//! - **Classifier trait:** stateful sequence classification with explicit reset
//! - **Preprocessing:** resize and normalization to the model input
//! - **Chunking:** fixed-size batches with a short final batch
//! - **ONNX backend:** recurrent model run through ONNX Runtime (`onnx` feature)

pub mod classifier;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;

pub use classifier::*;
#[cfg(feature = "onnx")]
pub use onnx::OnnxSequenceClassifier;
