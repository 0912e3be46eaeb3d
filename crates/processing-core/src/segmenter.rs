//! Sensitivity label smoothing and run-length segmentation.
//!
//! A label sequence comes from frames sampled at a fixed rate. Smoothing
//! removes one-frame clear gaps inside sensitive stretches, then the
//! sequence is split into contiguous `(label, start, end)` spans that cover
//! `[0, n)` exactly.
//!
//! Boundary placement is asymmetric: where a sensitive run is followed by a
//! clear one, the boundary lands one index early and the last sensitive
//! frame is labelled clear. A run whose computed end equals its start is not
//! emitted and its frames are absorbed by the next span. [`dropped_runs`]
//! lists every frame affected this way.

use deid_model::{FrameSpan, Label, Segment};

/// The sequence was too short to segment. Callers treat the whole video as
/// clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no segments: label sequence has {len} element(s)")]
pub struct NoSegments {
    pub len: usize,
}

/// Reclassify isolated clear frames as sensitive.
///
/// The two boundary positions are fixed first; the interior pass then runs
/// left to right over already-updated values. Sequences shorter than two
/// are left untouched.
pub fn delete_isolated_non_sensitive(labels: &mut [Label]) {
    let n = labels.len();
    if n < 2 {
        return;
    }

    if labels[0] == Label::Clear && labels[1] == Label::Sensitive {
        labels[0] = Label::Sensitive;
    }
    if labels[n - 1] == Label::Clear && labels[n - 2] == Label::Sensitive {
        labels[n - 1] = Label::Sensitive;
    }

    for j in 1..n - 1 {
        if labels[j] == Label::Clear
            && labels[j - 1] == Label::Sensitive
            && labels[j + 1] == Label::Sensitive
        {
            labels[j] = Label::Sensitive;
        }
    }
}

/// Smooth `labels` and split them into labelled spans.
pub fn find_segments(labels: &[Label]) -> Result<Vec<FrameSpan>, NoSegments> {
    if labels.len() < 2 {
        return Err(NoSegments { len: labels.len() });
    }

    let mut smoothed = labels.to_vec();
    delete_isolated_non_sensitive(&mut smoothed);
    Ok(segment_smoothed(&smoothed))
}

/// Run-length segmentation of an already smoothed sequence.
///
/// `-1` terminates the scan and, like a sensitive value, closes the open
/// run at the current index.
fn segment_smoothed(labels: &[Label]) -> Vec<FrameSpan> {
    const SENTINEL: i8 = -1;

    let values = labels
        .iter()
        .map(|l| l.as_bit() as i8)
        .chain(std::iter::once(SENTINEL));

    let mut spans = Vec::new();
    let mut run_start = 0usize;
    let mut current = labels[0].as_bit() as i8;

    for (j, v) in values.enumerate() {
        if v == current {
            continue;
        }
        let run_end = if v != 0 { j } else { j - 1 };
        if run_end != run_start {
            spans.push(FrameSpan::new(Label::from(current == 1), run_start, run_end));
            run_start = run_end;
            current = v;
        }
    }

    spans
}

/// Frames whose smoothed label disagrees with the span that covers them.
///
/// Returned as maximal runs carrying the frame's own label, so a
/// `Sensitive` entry marks frames that will not be redacted.
pub fn dropped_runs(labels: &[Label], spans: &[FrameSpan]) -> Vec<FrameSpan> {
    let mut smoothed = labels.to_vec();
    delete_isolated_non_sensitive(&mut smoothed);

    let mut dropped: Vec<FrameSpan> = Vec::new();
    for span in spans {
        for idx in span.start..span.end.min(smoothed.len()) {
            let actual = smoothed[idx];
            if actual == span.label {
                continue;
            }
            match dropped.last_mut() {
                Some(last) if last.end == idx && last.label == actual => last.end = idx + 1,
                _ => dropped.push(FrameSpan::new(actual, idx, idx + 1)),
            }
        }
    }
    dropped
}

/// Convert spans of frames sampled at `sample_fps` into time segments.
///
/// The last segment is clamped to `duration_secs` when it is known
/// (positive); segments left empty by clamping are removed.
pub fn to_time_segments(spans: &[FrameSpan], sample_fps: f64, duration_secs: f64) -> Vec<Segment> {
    if sample_fps <= 0.0 {
        return Vec::new();
    }

    spans
        .iter()
        .filter_map(|span| {
            let mut start = span.start as f64 / sample_fps;
            let mut end = span.end as f64 / sample_fps;
            if duration_secs > 0.0 {
                start = start.min(duration_secs);
                end = end.min(duration_secs);
            }
            (end > start).then(|| Segment::new(span.label, start, end))
        })
        .collect()
}

/// Segments for a video with no usable labels: one clear span.
pub fn whole_video_clear(duration_secs: f64) -> Vec<Segment> {
    if duration_secs > 0.0 {
        vec![Segment::new(Label::Clear, 0.0, duration_secs)]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(bits: &[u8]) -> Vec<Label> {
        bits.iter().map(|b| Label::from(*b == 1)).collect()
    }

    fn triples(spans: &[FrameSpan]) -> Vec<(u8, usize, usize)> {
        spans
            .iter()
            .map(|s| (s.label.as_bit(), s.start, s.end))
            .collect()
    }

    #[test]
    fn test_smoothing_fills_interior_gap() {
        let mut seq = labels(&[1, 0, 1, 1, 0, 0, 1]);
        delete_isolated_non_sensitive(&mut seq);
        assert_eq!(seq, labels(&[1, 1, 1, 1, 0, 0, 1]));
    }

    #[test]
    fn test_smoothing_boundaries() {
        let mut seq = labels(&[0, 1, 0, 0, 1, 0]);
        delete_isolated_non_sensitive(&mut seq);
        assert_eq!(seq, labels(&[1, 1, 0, 0, 1, 1]));
    }

    #[test]
    fn test_smoothing_alternating_pattern() {
        let mut seq = labels(&[0, 1, 0, 1, 0]);
        delete_isolated_non_sensitive(&mut seq);
        assert_eq!(seq, labels(&[1, 1, 1, 1, 1]));
    }

    #[test]
    fn test_scenario_isolated_flips() {
        let spans = find_segments(&labels(&[0, 0, 1, 0, 0, 1, 1, 0, 0])).unwrap();
        assert_eq!(
            triples(&spans),
            vec![(0, 0, 2), (1, 2, 3), (0, 3, 5), (1, 5, 6), (0, 6, 9)]
        );
    }

    #[test]
    fn test_scenario_single_gap_merges() {
        let spans = find_segments(&labels(&[1, 0, 1])).unwrap();
        assert_eq!(triples(&spans), vec![(1, 0, 3)]);
    }

    #[test]
    fn test_uniform_sequence_is_one_span() {
        assert_eq!(triples(&find_segments(&labels(&[0, 0, 0])).unwrap()), vec![(0, 0, 3)]);
        assert_eq!(triples(&find_segments(&labels(&[1, 1])).unwrap()), vec![(1, 0, 2)]);
    }

    #[test]
    fn test_degenerate_inputs_yield_no_segments() {
        assert_eq!(find_segments(&[]), Err(NoSegments { len: 0 }));
        assert_eq!(
            find_segments(&[Label::Sensitive]),
            Err(NoSegments { len: 1 })
        );
    }

    #[test]
    fn test_dropped_runs_reports_relabelled_frames() {
        let seq = labels(&[0, 0, 1, 0, 0, 1, 1, 0, 0]);
        let spans = find_segments(&seq).unwrap();
        assert_eq!(triples(&dropped_runs(&seq, &spans)), vec![(1, 6, 7)]);
    }

    #[test]
    fn test_dropped_runs_empty_for_rising_edge() {
        let seq = labels(&[0, 0, 0, 1, 1, 1]);
        let spans = find_segments(&seq).unwrap();
        assert_eq!(triples(&spans), vec![(0, 0, 3), (1, 3, 6)]);
        assert!(dropped_runs(&seq, &spans).is_empty());
    }

    #[test]
    fn test_falling_edge_loses_last_sensitive_frame() {
        let seq = labels(&[1, 1, 0, 0, 0]);
        let spans = find_segments(&seq).unwrap();
        assert_eq!(triples(&spans), vec![(1, 0, 1), (0, 1, 5)]);
        assert_eq!(triples(&dropped_runs(&seq, &spans)), vec![(1, 1, 2)]);
    }

    #[test]
    fn test_to_time_segments_scales_and_clamps() {
        let spans = vec![
            FrameSpan::new(Label::Clear, 0, 4),
            FrameSpan::new(Label::Sensitive, 4, 10),
        ];
        let segments = to_time_segments(&spans, 2.0, 4.5);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], Segment::new(Label::Clear, 0.0, 2.0));
        assert_eq!(segments[1], Segment::new(Label::Sensitive, 2.0, 4.5));
    }

    #[test]
    fn test_to_time_segments_drops_spans_past_duration() {
        let spans = vec![
            FrameSpan::new(Label::Clear, 0, 3),
            FrameSpan::new(Label::Sensitive, 3, 5),
        ];
        let segments = to_time_segments(&spans, 1.0, 3.0);
        assert_eq!(segments, vec![Segment::new(Label::Clear, 0.0, 3.0)]);
    }

    #[test]
    fn test_whole_video_clear() {
        assert_eq!(
            whole_video_clear(12.0),
            vec![Segment::new(Label::Clear, 0.0, 12.0)]
        );
        assert!(whole_video_clear(0.0).is_empty());
    }
}
