//! Labelled spans and keyframe sets.
//!
//! A [`FrameSpan`] is half-open in sampled-frame indices; a [`Segment`] is
//! the same span in seconds of the source video.

use crate::frame::Label;
use serde::{Deserialize, Serialize};

/// Tolerance used when matching timestamps against keyframes.
pub const TIME_EPSILON: f64 = 1e-6;

/// A run of equally labelled frames, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpan {
    pub label: Label,
    pub start: usize,
    pub end: usize,
}

impl FrameSpan {
    pub fn new(label: Label, start: usize, end: usize) -> Self {
        Self { label, start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A labelled time range of a source video, `[start_secs, end_secs)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub label: Label,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl Segment {
    pub fn new(label: Label, start_secs: f64, end_secs: f64) -> Self {
        Self {
            label,
            start_secs,
            end_secs,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    pub fn is_sensitive(&self) -> bool {
        self.label.is_sensitive()
    }
}

/// Strictly increasing seekable timestamps of a video stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeSet {
    times: Vec<f64>,
}

impl KeyframeSet {
    /// Build from arbitrary timestamps; sorts, drops non-finite values and
    /// duplicates.
    pub fn new(mut times: Vec<f64>) -> Self {
        times.retain(|t| t.is_finite());
        times.sort_by(|a, b| a.total_cmp(b));
        times.dedup_by(|a, b| (*a - *b).abs() <= TIME_EPSILON);
        Self { times }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Whether `t` is a keyframe time.
    pub fn contains(&self, t: f64) -> bool {
        self.times.iter().any(|k| (k - t).abs() <= TIME_EPSILON)
    }

    /// First keyframe strictly after `t`.
    pub fn next_after(&self, t: f64) -> Option<f64> {
        self.times.iter().copied().find(|k| *k > t + TIME_EPSILON)
    }

    pub fn last(&self) -> Option<f64> {
        self.times.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframe_set_normalizes_input() {
        let set = KeyframeSet::new(vec![4.0, 0.0, f64::NAN, 2.0, 2.0]);
        assert_eq!(set.times(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_keyframe_queries() {
        let set = KeyframeSet::new(vec![0.0, 2.0, 4.0]);
        assert!(set.contains(2.0));
        assert!(set.contains(2.000_000_1));
        assert!(!set.contains(3.0));
        assert_eq!(set.next_after(2.0), Some(4.0));
        assert_eq!(set.next_after(2.5), Some(4.0));
        assert_eq!(set.next_after(4.0), None);
        assert_eq!(set.last(), Some(4.0));
        assert_eq!(KeyframeSet::empty().last(), None);
    }

    #[test]
    fn test_segment_duration() {
        let seg = Segment::new(Label::Sensitive, 3.0, 7.5);
        assert_eq!(seg.duration(), 4.5);
        assert!(seg.is_sensitive());
        assert_eq!(FrameSpan::new(Label::Clear, 2, 5).len(), 3);
    }

    proptest::proptest! {
        #[test]
        fn prop_keyframe_set_strictly_increasing(times in proptest::collection::vec(0.0f64..1000.0, 0..50)) {
            let set = KeyframeSet::new(times);
            for pair in set.times().windows(2) {
                proptest::prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
