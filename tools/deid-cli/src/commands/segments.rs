//! Segment a label sequence given on the command line.

use deid_model::{FrameSpan, Label, Segment};
use deid_processing_core::segmenter::{dropped_runs, find_segments, to_time_segments};
use serde::Serialize;

#[derive(Serialize)]
struct SegmentsOutput {
    spans: Vec<FrameSpan>,
    dropped: Vec<FrameSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    segments: Option<Vec<Segment>>,
}

pub fn run(labels: &str, sample_fps: Option<f64>, duration: f64, json: bool) -> anyhow::Result<()> {
    let labels = Label::parse_sequence(labels.trim())?;

    let spans = match find_segments(&labels) {
        Ok(spans) => spans,
        Err(e) => {
            println!("{e}; the whole video is treated as clear.");
            return Ok(());
        }
    };
    let dropped = dropped_runs(&labels, &spans);
    let segments = sample_fps.map(|fps| to_time_segments(&spans, fps, duration));

    if json {
        let output = SegmentsOutput {
            spans,
            dropped,
            segments,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{:<10} {:>6} {:>6}", "label", "start", "end");
    for span in &spans {
        println!("{:<10} {:>6} {:>6}", label_name(span.label), span.start, span.end);
    }

    if let Some(segments) = segments {
        println!();
        println!("{:<10} {:>9} {:>9}", "label", "start(s)", "end(s)");
        for segment in &segments {
            println!(
                "{:<10} {:>9.3} {:>9.3}",
                label_name(segment.label),
                segment.start_secs,
                segment.end_secs
            );
        }
    }

    if !dropped.is_empty() {
        println!();
        println!("Frames covered by a span of the other label:");
        for run in &dropped {
            println!("  {} frames {}..{}", label_name(run.label), run.start, run.end);
        }
    }
    Ok(())
}

fn label_name(label: Label) -> &'static str {
    if label.is_sensitive() {
        "sensitive"
    } else {
        "clear"
    }
}
