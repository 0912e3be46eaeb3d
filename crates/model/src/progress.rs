//! Progress reporting for long-running operations.

use serde::{Deserialize, Serialize};

/// Stage of the pipeline an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Collecting the inputs of each case.
    Arranging,
    /// Pre-flight checks of every input.
    Validating,
    /// Sampling and classifying frames.
    Analyzing,
    /// Cutting or blacking out segments.
    Cutting,
    /// Concatenating clips into the case output.
    Merging,
    /// Streaming classify-mask-encode pass.
    Encoding,
    /// Metadata stripping and renaming.
    Anonymizing,
    Completed,
}

impl ProgressPhase {
    /// Whether the phase precedes actual processing. Consumers typically
    /// show these on a separate indicator.
    pub fn is_preparatory(&self) -> bool {
        matches!(self, Self::Arranging | Self::Validating)
    }
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current: u64,
    pub total: u64,
    pub message: String,
    pub phase: ProgressPhase,
}

impl ProgressEvent {
    pub fn new(phase: ProgressPhase, current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            phase,
        }
    }

    pub fn is_preparatory(&self) -> bool {
        self.phase.is_preparatory()
    }

    /// Completion ratio in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_clamps() {
        let event = ProgressEvent::new(ProgressPhase::Cutting, 5, 4, "Segment 5/4");
        assert_eq!(event.fraction(), 1.0);
        assert_eq!(ProgressEvent::new(ProgressPhase::Cutting, 1, 0, "").fraction(), 0.0);
    }

    #[test]
    fn test_preparatory_phases() {
        assert!(ProgressPhase::Arranging.is_preparatory());
        assert!(ProgressPhase::Validating.is_preparatory());
        assert!(!ProgressPhase::Encoding.is_preparatory());
    }

    #[test]
    fn test_serializes_snake_case_phase() {
        let event = ProgressEvent::new(ProgressPhase::Anonymizing, 1, 2, "x");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"anonymizing\""));
    }
}
