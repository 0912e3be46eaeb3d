//! Recurrent sensitivity model on ONNX Runtime.
//!
//! The exported graph takes a batch of preprocessed frames together with the
//! recurrent state and returns per-frame probabilities and the updated
//! state:
//!
//! | name    | shape              | direction |
//! |---------|--------------------|-----------|
//! | `frames`| `[N, S, S, 3]` f32 | input     |
//! | `h_in`  | `[1, state]` f32   | input     |
//! | `c_in`  | `[1, state]` f32   | input     |
//! | `probs` | `[1, N, 1]` f32    | output    |
//! | `h_out` | `[1, state]` f32   | output    |
//! | `c_out` | `[1, state]` f32   | output    |

use std::path::Path;

use deid_common::config::ModelConfig;
use deid_common::error::{DeidError, DeidResult};
use deid_model::{Frame, Label};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::classifier::{check_label_count, SensitivityClassifier};
use crate::preprocess::preprocess_batch;

/// Stateful sequence classifier backed by an ONNX Runtime session.
pub struct OnnxSequenceClassifier {
    session: Session,
    input_size: u32,
    threshold: f32,
    state_size: usize,
    hidden: Vec<f32>,
    cell: Vec<f32>,
}

impl OnnxSequenceClassifier {
    pub fn from_config(config: &ModelConfig) -> DeidResult<Self> {
        Self::load(
            &config.weights,
            config.input_size,
            config.threshold,
            config.state_size,
        )
    }

    pub fn load(
        model_path: &Path,
        input_size: u32,
        threshold: f32,
        state_size: usize,
    ) -> DeidResult<Self> {
        if !model_path.exists() {
            return Err(DeidError::FileNotFound {
                path: model_path.to_path_buf(),
            });
        }
        if input_size == 0 || state_size == 0 {
            return Err(DeidError::config(
                "model input_size and state_size must be positive",
            ));
        }

        let session = create_session(model_path)?;
        info!(
            path = %model_path.display(),
            input_size,
            state_size,
            "Loaded sensitivity model"
        );

        Ok(Self {
            session,
            input_size,
            threshold,
            state_size,
            hidden: vec![0.0; state_size],
            cell: vec![0.0; state_size],
        })
    }

    fn state_value(&self, data: &[f32]) -> DeidResult<Value> {
        Tensor::from_array((vec![1usize, self.state_size], data.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DeidError::classification(format!("Failed to create state tensor: {e}")))
    }
}

impl SensitivityClassifier for OnnxSequenceClassifier {
    fn reset_state(&mut self) {
        self.hidden.iter_mut().for_each(|v| *v = 0.0);
        self.cell.iter_mut().for_each(|v| *v = 0.0);
    }

    fn classify(&mut self, frames: &[Frame]) -> DeidResult<Vec<Label>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let size = self.input_size as usize;
        let data = preprocess_batch(frames, self.input_size)?;
        let frames_value: Value = Tensor::from_array((
            vec![frames.len(), size, size, 3],
            data.into_boxed_slice(),
        ))
        .map(Value::from)
        .map_err(|e| DeidError::classification(format!("Failed to create frame tensor: {e}")))?;
        let h_in = self.state_value(&self.hidden)?;
        let c_in = self.state_value(&self.cell)?;

        let (probs, h_out, c_out) = {
            let outputs = self
                .session
                .run(ort::inputs![
                    "frames" => frames_value,
                    "h_in" => h_in,
                    "c_in" => c_in
                ])
                .map_err(|e| DeidError::classification(format!("ONNX inference failed: {e}")))?;

            let extract = |name: &str| -> DeidResult<Vec<f32>> {
                let output = outputs
                    .get(name)
                    .ok_or_else(|| DeidError::classification(format!("Missing {name} tensor")))?;
                let (_, values) = output.try_extract_tensor::<f32>().map_err(|e| {
                    DeidError::classification(format!("Failed to extract {name}: {e}"))
                })?;
                Ok(values.to_vec())
            };

            (extract("probs")?, extract("h_out")?, extract("c_out")?)
        };

        check_label_count(frames.len(), probs.len())?;
        if h_out.len() != self.state_size || c_out.len() != self.state_size {
            return Err(DeidError::classification(format!(
                "state size mismatch: model returned {} / {}, configured {}",
                h_out.len(),
                c_out.len(),
                self.state_size
            )));
        }
        self.hidden = h_out;
        self.cell = c_out;

        let labels: Vec<Label> = probs
            .iter()
            .map(|p| Label::from_probability(*p, self.threshold))
            .collect();
        debug!(
            frames = frames.len(),
            sensitive = labels.iter().filter(|l| l.is_sensitive()).count(),
            "Classified batch"
        );
        Ok(labels)
    }

    fn name(&self) -> &str {
        "onnx-sequence"
    }
}

/// Create an ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> DeidResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| DeidError::classification(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| {
            DeidError::classification(format!("Failed to set optimization level: {e}"))
        })?;

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for sensitivity model");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| DeidError::classification(format!("Failed to load ONNX model: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_file_not_found() {
        let err = OnnxSequenceClassifier::load(Path::new("/nonexistent/model.onnx"), 64, 0.5, 640)
            .err()
            .unwrap();
        assert!(matches!(err, DeidError::FileNotFound { .. }));
    }

    #[test]
    fn test_zero_state_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not a model").unwrap();
        let err = OnnxSequenceClassifier::load(&path, 64, 0.5, 0).err().unwrap();
        assert!(matches!(err, DeidError::Config { .. }));
    }
}
