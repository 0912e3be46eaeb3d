//! Patient cases and the original-to-anonymized name mapping.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sentinel written in place of a new name when anonymization failed.
pub const FAILED_SENTINEL: &str = "FAILED";

/// One patient's ordered list of source videos. The videos are merged into
/// a single output named after `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCase {
    pub id: String,
    pub videos: Vec<PathBuf>,
}

impl PatientCase {
    pub fn new(id: impl Into<String>, videos: Vec<PathBuf>) -> Self {
        Self {
            id: id.into(),
            videos,
        }
    }
}

/// One row of the translation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    /// Original file stem.
    pub original: String,

    /// New file stem, or [`FAILED_SENTINEL`].
    pub anonymized: String,
}

impl TranslationRecord {
    pub fn new(original: impl Into<String>, anonymized: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            anonymized: anonymized.into(),
        }
    }

    pub fn failed(original: impl Into<String>) -> Self {
        Self::new(original, FAILED_SENTINEL)
    }

    pub fn is_failed(&self) -> bool {
        self.anonymized == FAILED_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_record() {
        let record = TranslationRecord::failed("patient_042");
        assert!(record.is_failed());
        assert_eq!(record.anonymized, "FAILED");
        assert!(!TranslationRecord::new("a", "1b2c3d4").is_failed());
    }
}
