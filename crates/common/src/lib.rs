//! Deid Common Utilities
//!
//! Shared infrastructure for all deid crates:
//! - Error types and result aliases
//! - Cancellation token shared between submitter and worker
//! - Tracing/logging initialization
//! - Configuration loading

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;

pub use cancel::*;
pub use config::*;
pub use error::*;
