//! Error types shared across deid crates.

use std::path::PathBuf;

/// Top-level error type for de-identification operations.
#[derive(Debug, thiserror::Error)]
pub enum DeidError {
    /// An input file failed pre-flight validation (unreadable, corrupt).
    #[error("Input validation failed: {message}")]
    InputValidation { message: String },

    /// The videos of one case do not share a single resolution.
    #[error("Resolution mismatch: {}", format_resolutions(.files))]
    ResolutionMismatch {
        files: Vec<(PathBuf, Option<(u32, u32)>)>,
    },

    #[error("Classification error: {message}")]
    Classification { message: String },

    /// An external transcoder invocation failed.
    #[error("Media error: {message}")]
    Media {
        message: String,
        stderr_excerpt: Option<String>,
    },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("External tool not available: {tool}")]
    ToolUnavailable { tool: String },

    /// Processing was stopped on request. Not a failure.
    #[error("Processing terminated by request")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DeidError.
pub type DeidResult<T> = Result<T, DeidError>;

impl DeidError {
    pub fn input_validation(msg: impl Into<String>) -> Self {
        Self::InputValidation {
            message: msg.into(),
        }
    }

    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification {
            message: msg.into(),
        }
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
            stderr_excerpt: None,
        }
    }

    /// Media failure carrying the first lines of the tool's stderr.
    pub fn media_with_stderr(msg: impl Into<String>, stderr: &str) -> Self {
        let excerpt = stderr_excerpt(stderr, 5);
        Self::Media {
            message: msg.into(),
            stderr_excerpt: (!excerpt.is_empty()).then_some(excerpt),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Human-readable message including any diagnostic excerpt, suitable
    /// for the single error channel shown to the operator.
    pub fn report(&self) -> String {
        match self {
            Self::Media {
                stderr_excerpt: Some(excerpt),
                ..
            } => format!("{self}\n\n{excerpt}"),
            _ => self.to_string(),
        }
    }
}

/// First `max_lines` non-empty lines of a tool's stderr.
pub fn stderr_excerpt(stderr: &str, max_lines: usize) -> String {
    stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_resolutions(files: &[(PathBuf, Option<(u32, u32)>)]) -> String {
    files
        .iter()
        .map(|(path, res)| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match res {
                Some((w, h)) => format!("{name}: {w}x{h}"),
                None => format!("{name}: unreadable"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_mismatch_names_every_file() {
        let err = DeidError::ResolutionMismatch {
            files: vec![
                (PathBuf::from("/in/a.mp4"), Some((1920, 1080))),
                (PathBuf::from("/in/b.mp4"), Some((1280, 720))),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("a.mp4: 1920x1080"));
        assert!(msg.contains("b.mp4: 1280x720"));
    }

    #[test]
    fn test_stderr_excerpt_keeps_first_lines() {
        let stderr = "line1\n\nline2\nline3\nline4\nline5\nline6\n";
        assert_eq!(stderr_excerpt(stderr, 5), "line1\nline2\nline3\nline4\nline5");
    }

    #[test]
    fn test_report_includes_excerpt() {
        let err = DeidError::media_with_stderr("concat failed", "moov atom not found\n");
        assert!(err.report().contains("moov atom not found"));
        assert!(!DeidError::Cancelled.report().is_empty());
    }
}
