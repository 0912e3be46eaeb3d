//! Argument builders for every transcoder invocation.
//!
//! Builders return plain argument vectors; execution lives in
//! [`crate::runner`]. Timestamps are rendered with `f64` `Display`, so whole
//! seconds print without a fractional part.

use std::path::{Path, PathBuf};

use deid_model::Resolution;

fn s(value: impl Into<String>) -> String {
    value.into()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Render seconds for the command line.
pub fn format_secs(secs: f64) -> String {
    format!("{}", secs.max(0.0))
}

fn base_args() -> Vec<String> {
    vec![s("-hide_banner"), s("-nostdin"), s("-y")]
}

/// Stream-copy cut starting on a keyframe.
pub fn stream_copy_cut_args(
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    timescale: u32,
) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        s("-ss"),
        format_secs(start),
        s("-i"),
        path_arg(input),
        s("-c"),
        s("copy"),
        s("-t"),
        format_secs(end - start),
        s("-video_track_timescale"),
        timescale.to_string(),
        path_arg(output),
    ]);
    args
}

/// Frame-accurate cut that re-encodes the video stream.
pub fn reencode_cut_args(
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    timescale: u32,
) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        s("-ss"),
        format_secs(start),
        s("-i"),
        path_arg(input),
        s("-c:v"),
        s("libx264"),
        s("-profile:v"),
        s("main"),
        s("-t"),
        format_secs(end - start),
        s("-video_track_timescale"),
        timescale.to_string(),
        path_arg(output),
    ]);
    args
}

/// Solid black clip of `duration` seconds.
pub fn black_clip_args(
    output: &Path,
    duration: f64,
    resolution: Resolution,
    timescale: u32,
) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        s("-t"),
        format_secs(duration),
        s("-f"),
        s("lavfi"),
        s("-i"),
        format!("color=c=black:s={}x{}", resolution.width, resolution.height),
        s("-c:v"),
        s("libx264"),
        s("-profile:v"),
        s("main"),
        s("-video_track_timescale"),
        timescale.to_string(),
        s("-tune"),
        s("stillimage"),
        s("-pix_fmt"),
        s("yuv420p"),
        path_arg(output),
    ]);
    args
}

/// Concat demuxer list body: one `file '<path>'` line per clip.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            // A quote inside a quoted entry is written as '\''.
            let escaped = clip.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Lossless concatenation of the clips listed in `list_file`.
pub fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        s("-f"),
        s("concat"),
        s("-safe"),
        s("0"),
        s("-i"),
        path_arg(list_file),
        s("-c"),
        s("copy"),
        path_arg(output),
    ]);
    args
}

/// Stream copy that drops container, stream, chapter and disposition
/// metadata. Audio is kept when present.
pub fn strip_metadata_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        s("-i"),
        path_arg(input),
        s("-map"),
        s("0:v"),
        s("-map"),
        s("0:a?"),
        s("-c"),
        s("copy"),
        s("-map_metadata"),
        s("-1"),
        s("-map_metadata:s:v"),
        s("-1"),
        s("-map_metadata:s:a"),
        s("-1"),
        s("-map_chapters"),
        s("-1"),
        s("-disposition"),
        s("0"),
        path_arg(output),
    ]);
    args
}

/// Full decode with output discarded; fails on corrupt input.
pub fn validate_args(input: &Path) -> Vec<String> {
    vec![
        s("-hide_banner"),
        s("-nostdin"),
        s("-v"),
        s("error"),
        s("-i"),
        path_arg(input),
        s("-f"),
        s("null"),
        s("-"),
    ]
}

/// Decode to raw RGB24 frames on stdout, optionally resampled and scaled.
pub fn decode_args(input: &Path, sample_fps: Option<f64>, scale: Option<Resolution>) -> Vec<String> {
    let mut args = vec![
        s("-hide_banner"),
        s("-nostdin"),
        s("-v"),
        s("error"),
        s("-i"),
        path_arg(input),
        s("-map"),
        s("0:v:0"),
    ];

    let mut filters = Vec::new();
    if let Some(fps) = sample_fps {
        filters.push(format!("fps={fps}"));
    }
    if let Some(res) = scale {
        filters.push(format!("scale={}:{}", res.width, res.height));
    }
    if !filters.is_empty() {
        args.push(s("-vf"));
        args.push(filters.join(","));
    }

    args.extend([
        s("-f"),
        s("rawvideo"),
        s("-pix_fmt"),
        s("rgb24"),
        s("-"),
    ]);
    args
}

/// ffprobe stream and container properties as JSON.
pub fn probe_args(input: &Path) -> Vec<String> {
    vec![
        s("-v"),
        s("error"),
        s("-print_format"),
        s("json"),
        s("-show_format"),
        s("-show_streams"),
        path_arg(input),
    ]
}

/// ffprobe packet timestamps and flags of the first video stream.
pub fn keyframe_probe_args(input: &Path) -> Vec<String> {
    vec![
        s("-loglevel"),
        s("error"),
        s("-select_streams"),
        s("v:0"),
        s("-show_entries"),
        s("packet=pts_time,flags"),
        s("-of"),
        s("csv=print_section=0"),
        path_arg(input),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_stream_copy_seeks_before_input() {
        let args = stream_copy_cut_args(Path::new("in.mp4"), Path::new("out.mp4"), 2.0, 5.5, 10_000);
        assert!(pos(&args, "-ss") < pos(&args, "-i"));
        assert_eq!(args[pos(&args, "-ss") + 1], "2");
        assert_eq!(args[pos(&args, "-t") + 1], "3.5");
        assert_eq!(args[pos(&args, "-video_track_timescale") + 1], "10000");
        assert_eq!(args[pos(&args, "-c") + 1], "copy");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_reencode_uses_libx264_main() {
        let args = reencode_cut_args(Path::new("in.mp4"), Path::new("out.mp4"), 1.0, 2.0, 10_000);
        assert_eq!(args[pos(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[pos(&args, "-profile:v") + 1], "main");
    }

    #[test]
    fn test_black_clip_source() {
        let args = black_clip_args(Path::new("b.mp4"), 4.0, Resolution::new(1920, 1080), 10_000);
        assert!(args.contains(&"color=c=black:s=1920x1080".to_string()));
        assert_eq!(args[pos(&args, "-tune") + 1], "stillimage");
        assert_eq!(args[pos(&args, "-pix_fmt") + 1], "yuv420p");
        assert_eq!(args[pos(&args, "-t") + 1], "4");
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let body = concat_list(&[PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/o'b.mp4")]);
        assert_eq!(body, "file '/tmp/a.mp4'\nfile '/tmp/o'\\''b.mp4'\n");
    }

    #[test]
    fn test_strip_metadata_keeps_optional_audio() {
        let args = strip_metadata_args(Path::new("in.mp4"), Path::new("out.mp4"));
        assert!(args.contains(&"0:a?".to_string()));
        assert_eq!(args[pos(&args, "-map_chapters") + 1], "-1");
        assert_eq!(args[pos(&args, "-disposition") + 1], "0");
    }

    #[test]
    fn test_decode_args_filters() {
        let args = decode_args(Path::new("in.mp4"), Some(1.0), Some(Resolution::new(64, 64)));
        assert_eq!(args[pos(&args, "-vf") + 1], "fps=1,scale=64:64");
        assert_eq!(args.last().unwrap(), "-");

        let plain = decode_args(Path::new("in.mp4"), None, None);
        assert!(!plain.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_validate_discards_output() {
        let args = validate_args(Path::new("in.mp4"));
        assert_eq!(args[pos(&args, "-f") + 1], "null");
        assert_eq!(args.last().unwrap(), "-");
        assert_eq!(args[pos(&args, "-v") + 1], "error");
    }
}
