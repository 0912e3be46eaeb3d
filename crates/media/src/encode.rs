//! Encoder arguments for raw RGB24 frames piped on stdin.

use std::path::Path;

use deid_common::config::{EncodeProfile, ProcessingConfig};
use deid_model::Resolution;

/// How the streaming transformer encodes its output.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub profile: EncodeProfile,
    /// Frame rate declared for the piped input.
    pub output_fps: f64,
    /// Software encoder quality.
    pub crf: u32,
    /// Hardware encoder bitrate in kbit/s.
    pub bitrate_kbps: u64,
    /// Size of the piped frames.
    pub input: Resolution,
    /// Encoder-side downscale target, `None` to keep the input size.
    pub output: Option<Resolution>,
}

impl EncoderSettings {
    /// Settings for a source of `input` size decoded at `source_fps`.
    ///
    /// The bitrate is derived from the source properties. The output is
    /// scaled to `target_height` only when that shrinks the frame.
    pub fn for_source(config: &ProcessingConfig, input: Resolution, source_fps: f64) -> Self {
        let output = (config.target_height > 0 && config.target_height < input.height)
            .then(|| input.scaled_to_height(config.target_height));

        Self {
            profile: config.encode_profile,
            output_fps: config.target_fps,
            crf: config.crf,
            bitrate_kbps: bitrate_kbps(input, source_fps, config.bits_per_pixel),
            input,
            output,
        }
    }

    /// Resolution of the encoded stream.
    pub fn output_resolution(&self) -> Resolution {
        self.output.unwrap_or(self.input)
    }

    /// Full ffmpeg argument list writing to `output`.
    pub fn args(&self, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-y",
            "-v",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        args.push(self.input.to_string());
        args.push("-framerate".into());
        args.push(format!("{}", self.output_fps));
        args.push("-i".into());
        args.push("-".into());

        if let Some(res) = self.output {
            args.push("-vf".into());
            args.push(format!("scale={}:{}:flags=area", res.width, res.height));
        }

        match self.profile {
            EncodeProfile::Hardware => {
                args.extend(
                    ["-c:v", "h264_videotoolbox", "-b:v"]
                        .iter()
                        .map(|a| a.to_string()),
                );
                args.push(format!("{}k", self.bitrate_kbps));
                args.extend(
                    ["-profile:v", "high", "-tune", "zerolatency"]
                        .iter()
                        .map(|a| a.to_string()),
                );
            }
            EncodeProfile::Software => {
                args.extend(
                    ["-c:v", "libx264", "-preset", "ultrafast", "-crf"]
                        .iter()
                        .map(|a| a.to_string()),
                );
                args.push(self.crf.to_string());
                args.extend(["-tune", "zerolatency"].iter().map(|a| a.to_string()));
            }
        }

        args.push("-pix_fmt".into());
        args.push("yuv420p".into());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

/// Target bitrate in kbit/s: `width * height * fps * bits_per_pixel / 1000`.
pub fn bitrate_kbps(resolution: Resolution, fps: f64, bits_per_pixel: f64) -> u64 {
    let bits = resolution.pixel_count() as f64 * fps * bits_per_pixel;
    if !bits.is_finite() || bits <= 0.0 {
        return 0;
    }
    (bits / 1000.0).round() as u64
}
