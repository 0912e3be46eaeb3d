//! Keyframe-aware cut planning.
//!
//! Stream copy is only exact when a cut starts on a keyframe. Otherwise the
//! head of the segment up to the next keyframe is re-encoded and the rest is
//! copied, then both pieces are concatenated losslessly.

use deid_model::{KeyframeSet, Segment, TIME_EPSILON};
use serde::{Deserialize, Serialize};

/// How one clear segment `[t1, t2)` is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CutStrategy {
    /// `t1` is a keyframe: copy packets without decoding.
    StreamCopy,
    /// Decode and re-encode the whole segment.
    Reencode,
    /// Re-encode `t1..keyframe`, copy `keyframe..t2`, concatenate.
    Split { keyframe: f64 },
}

/// Choose the cut strategy for a segment starting at `t1` and ending at `t2`.
///
/// Pure function of its inputs.
pub fn select_cut(t1: f64, t2: f64, keyframes: &KeyframeSet) -> CutStrategy {
    let Some(last) = keyframes.last() else {
        return CutStrategy::Reencode;
    };

    if keyframes.contains(t1) {
        return CutStrategy::StreamCopy;
    }
    if t1 > last {
        return CutStrategy::Reencode;
    }

    match keyframes.next_after(t1) {
        Some(keyframe) if keyframe < t2 - TIME_EPSILON => CutStrategy::Split { keyframe },
        _ => CutStrategy::Reencode,
    }
}

/// One clip of the merged output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipPlan {
    /// Solid black clip standing in for a sensitive segment.
    Blackout { duration: f64 },
    /// Extract `[start, end)` from the source.
    Cut {
        start: f64,
        end: f64,
        strategy: CutStrategy,
    },
}

impl ClipPlan {
    pub fn duration(&self) -> f64 {
        match self {
            Self::Blackout { duration } => *duration,
            Self::Cut { start, end, .. } => (end - start).max(0.0),
        }
    }
}

/// Plan one clip per segment, in order.
pub fn plan_clips(segments: &[Segment], keyframes: &KeyframeSet) -> Vec<ClipPlan> {
    segments
        .iter()
        .map(|segment| {
            if segment.is_sensitive() {
                ClipPlan::Blackout {
                    duration: segment.duration(),
                }
            } else {
                ClipPlan::Cut {
                    start: segment.start_secs,
                    end: segment.end_secs,
                    strategy: select_cut(segment.start_secs, segment.end_secs, keyframes),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deid_model::Label;

    fn keyframes() -> KeyframeSet {
        KeyframeSet::new(vec![0.0, 2.0, 4.0])
    }

    #[test]
    fn test_cut_on_keyframe_is_stream_copy() {
        assert_eq!(select_cut(2.0, 3.0, &keyframes()), CutStrategy::StreamCopy);
        assert_eq!(select_cut(0.0, 10.0, &keyframes()), CutStrategy::StreamCopy);
    }

    #[test]
    fn test_cut_between_keyframes_is_split() {
        assert_eq!(
            select_cut(1.0, 3.0, &keyframes()),
            CutStrategy::Split { keyframe: 2.0 }
        );
        assert_eq!(
            select_cut(2.5, 6.0, &keyframes()),
            CutStrategy::Split { keyframe: 4.0 }
        );
    }

    #[test]
    fn test_cut_after_last_keyframe_reencodes() {
        assert_eq!(select_cut(5.0, 6.0, &keyframes()), CutStrategy::Reencode);
    }

    #[test]
    fn test_no_keyframes_reencodes() {
        assert_eq!(select_cut(1.0, 3.0, &KeyframeSet::empty()), CutStrategy::Reencode);
    }

    #[test]
    fn test_split_past_segment_end_degenerates_to_reencode() {
        assert_eq!(select_cut(2.5, 4.0, &keyframes()), CutStrategy::Reencode);
        assert_eq!(select_cut(2.5, 3.5, &keyframes()), CutStrategy::Reencode);
    }

    #[test]
    fn test_select_cut_is_pure() {
        let set = keyframes();
        let first = select_cut(1.0, 3.0, &set);
        for _ in 0..10 {
            assert_eq!(select_cut(1.0, 3.0, &set), first);
        }
    }

    #[test]
    fn test_plan_clips_blacks_out_sensitive_segments() {
        let segments = vec![
            Segment::new(Label::Clear, 0.0, 2.0),
            Segment::new(Label::Sensitive, 2.0, 5.0),
            Segment::new(Label::Clear, 5.0, 8.0),
        ];
        let plan = plan_clips(&segments, &keyframes());
        assert_eq!(
            plan,
            vec![
                ClipPlan::Cut {
                    start: 0.0,
                    end: 2.0,
                    strategy: CutStrategy::StreamCopy
                },
                ClipPlan::Blackout { duration: 3.0 },
                ClipPlan::Cut {
                    start: 5.0,
                    end: 8.0,
                    strategy: CutStrategy::Reencode
                },
            ]
        );
        let total: f64 = plan.iter().map(ClipPlan::duration).sum();
        assert_eq!(total, 8.0);
    }
}
