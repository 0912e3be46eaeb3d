//! Deid Data Model
//!
//! Defines the core data contracts shared by the de-identification crates:
//! - **Assets:** probed source video properties
//! - **Frames:** decoded RGB24 images and their sensitivity labels
//! - **Segments:** labelled spans in frame indices or seconds, plus keyframe sets
//! - **Cases:** a patient's ordered video list and the translation log records
//! - **Progress:** events reported by long-running operations

pub mod asset;
pub mod case;
pub mod frame;
pub mod progress;
pub mod segment;

pub use asset::*;
pub use case::*;
pub use frame::*;
pub use progress::*;
pub use segment::*;
