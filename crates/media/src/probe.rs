//! Stream properties and keyframe timestamps via ffprobe.

use std::path::Path;

use deid_common::error::{DeidError, DeidResult};
use deid_model::{KeyframeSet, Resolution, VideoAsset};
use serde::Deserialize;

use crate::commands::{keyframe_probe_args, probe_args};
use crate::runner::FfmpegRunner;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe `path` into a [`VideoAsset`].
pub fn probe_video(runner: &FfmpegRunner, path: &Path) -> DeidResult<VideoAsset> {
    if !path.exists() {
        return Err(DeidError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = runner.run_ffprobe(&probe_args(path), "ffprobe")?;
    let asset = parse_probe_json(path, &output.stdout)?;
    tracing::debug!(
        path = %path.display(),
        resolution = %asset.resolution,
        fps = asset.fps,
        frames = asset.frame_count,
        duration = asset.duration_secs,
        "Probed video"
    );
    Ok(asset)
}

/// Build a [`VideoAsset`] from ffprobe's `-print_format json` output.
pub fn parse_probe_json(path: &Path, json: &str) -> DeidResult<VideoAsset> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            DeidError::input_validation(format!(
                "{}: no video stream found",
                deid_model::file_display_name(path)
            ))
        })?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(DeidError::input_validation(format!(
            "{}: video stream has no dimensions",
            deid_model::file_display_name(path)
        )));
    }

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration_secs * fps).round() as u64);

    Ok(VideoAsset {
        path: path.to_path_buf(),
        resolution: Resolution::new(width, height),
        fps,
        frame_count,
        duration_secs,
        has_audio,
    })
}

/// Resolution of the first video stream, `None` when probing fails.
pub fn probe_resolution(runner: &FfmpegRunner, path: &Path) -> Option<Resolution> {
    probe_video(runner, path).ok().map(|asset| asset.resolution)
}

/// Parse a frame rate string ("30/1", "30000/1001" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.trim().parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Presentation times of the keyframes of the first video stream.
///
/// Output that cannot be parsed yields an empty set, which sends every cut
/// down the re-encode path.
pub fn list_keyframes(runner: &FfmpegRunner, path: &Path) -> DeidResult<KeyframeSet> {
    let output = runner.run_ffprobe(&keyframe_probe_args(path), "keyframe listing")?;
    let keyframes = parse_keyframes(&output.stdout);
    if keyframes.is_empty() {
        tracing::warn!(path = %path.display(), "No keyframes found, cuts will be re-encoded");
    } else {
        tracing::debug!(path = %path.display(), count = keyframes.len(), "Listed keyframes");
    }
    Ok(keyframes)
}

/// Parse `pts_time,flags` lines, keeping packets flagged `K`.
pub fn parse_keyframes(csv: &str) -> KeyframeSet {
    let times = csv
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().splitn(2, ',');
            let pts = fields.next()?.trim();
            let flags = fields.next()?.trim();
            if !flags.contains('K') {
                return None;
            }
            pts.parse::<f64>().ok()
        })
        .collect();
    KeyframeSet::new(times)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "width": 1920, "height": 1080,
             "r_frame_rate": "25/1", "avg_frame_rate": "25/1", "nb_frames": "250"},
            {"codec_type": "audio"}
        ],
        "format": {"duration": "10.000000"}
    }"#;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_json() {
        let asset = parse_probe_json(Path::new("/v/a.mp4"), SAMPLE).unwrap();
        assert_eq!(asset.resolution, Resolution::new(1920, 1080));
        assert_eq!(asset.frame_count, 250);
        assert!((asset.fps - 25.0).abs() < 1e-9);
        assert!((asset.duration_secs - 10.0).abs() < 1e-9);
        assert!(asset.has_audio);
    }

    #[test]
    fn test_frame_count_estimated_from_duration() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 64, "height": 64,
                         "avg_frame_rate": "0/0", "r_frame_rate": "30/1"}],
            "format": {"duration": "2.0"}
        }"#;
        let asset = parse_probe_json(Path::new("b.mkv"), json).unwrap();
        assert_eq!(asset.frame_count, 60);
        assert!(!asset.has_audio);
    }

    #[test]
    fn test_audio_only_is_rejected() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let err = parse_probe_json(Path::new("c.mp4"), json).unwrap_err();
        assert!(matches!(err, DeidError::InputValidation { .. }));
    }

    #[test]
    fn test_parse_keyframes_filters_flags() {
        let csv = "0.000000,K_\n0.040000,__\n2.000000,K_\nN/A,K_\n4.000000,K\n";
        let set = parse_keyframes(csv);
        assert_eq!(set.times(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_parse_keyframes_garbage_is_empty() {
        assert!(parse_keyframes("not csv at all").is_empty());
    }
}
