//! Sensitivity classifier contract.

use deid_common::config::ModelConfig;
use deid_common::error::{DeidError, DeidResult};
use deid_model::{Frame, Label};

/// A stateful per-frame classifier.
///
/// The model carries sequence memory across [`classify`](Self::classify)
/// calls: consecutive batches of one video must be fed in order, and
/// [`reset_state`](Self::reset_state) must be called before a new video.
pub trait SensitivityClassifier: Send {
    /// Forget all sequence memory.
    fn reset_state(&mut self);

    /// Label every frame of `frames`, in order. The result has the same
    /// length as the input.
    fn classify(&mut self, frames: &[Frame]) -> DeidResult<Vec<Label>>;

    /// Backend name.
    fn name(&self) -> &str;
}

impl<C: SensitivityClassifier + ?Sized> SensitivityClassifier for Box<C> {
    fn reset_state(&mut self) {
        (**self).reset_state();
    }

    fn classify(&mut self, frames: &[Frame]) -> DeidResult<Vec<Label>> {
        (**self).classify(frames)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Classify `frames` in consecutive chunks of `buffer_size`; the final
/// partial chunk is classified as a short batch.
pub fn classify_in_chunks<C: SensitivityClassifier + ?Sized>(
    classifier: &mut C,
    frames: &[Frame],
    buffer_size: usize,
) -> DeidResult<Vec<Label>> {
    if buffer_size == 0 {
        return Err(DeidError::classification("buffer size must be at least 1"));
    }

    let mut labels = Vec::with_capacity(frames.len());
    for chunk in frames.chunks(buffer_size) {
        let chunk_labels = classifier.classify(chunk)?;
        check_label_count(chunk.len(), chunk_labels.len())?;
        labels.extend(chunk_labels);
    }
    Ok(labels)
}

/// Error unless a backend returned one label per frame.
pub fn check_label_count(frames: usize, labels: usize) -> DeidResult<()> {
    if frames != labels {
        return Err(DeidError::classification(format!(
            "classifier returned {labels} labels for {frames} frames"
        )));
    }
    Ok(())
}

/// Build the configured classifier backend.
pub fn load_classifier(config: &ModelConfig) -> DeidResult<Box<dyn SensitivityClassifier>> {
    #[cfg(feature = "onnx")]
    {
        let classifier = crate::onnx::OnnxSequenceClassifier::from_config(config)?;
        Ok(Box::new(classifier))
    }
    #[cfg(not(feature = "onnx"))]
    {
        Err(DeidError::config(format!(
            "no classifier backend compiled in; cannot load {}",
            config.weights.display()
        )))
    }
}
