//! Probed properties of a source video.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one RGB24 frame of this size.
    pub fn rgb24_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Size with the given height and the aspect ratio preserved. The width
    /// is rounded and bumped to the next even number, as yuv420p requires.
    pub fn scaled_to_height(&self, height: u32) -> Self {
        if self.height == 0 {
            return Self::new(self.width, height);
        }
        let mut width = (f64::from(self.width) * f64::from(height) / f64::from(self.height))
            .round() as u32;
        if width % 2 != 0 {
            width += 1;
        }
        Self::new(width, height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A probed source video. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    pub path: PathBuf,
    pub resolution: Resolution,

    /// Average frame rate of the first video stream.
    pub fps: f64,

    /// Number of frames, from the container or estimated from duration.
    pub frame_count: u64,

    pub duration_secs: f64,

    pub has_audio: bool,
}

impl VideoAsset {
    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// File name for messages, falling back to the full path.
    pub fn display_name(&self) -> String {
        file_display_name(&self.path)
    }

    /// Number of `buffer_size` batches needed to cover every frame.
    pub fn batch_count(&self, buffer_size: usize) -> u64 {
        if buffer_size == 0 {
            return 0;
        }
        self.frame_count.div_ceil(buffer_size as u64)
    }
}

/// Last path component as a string, or the whole path when there is none.
pub fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_to_height_forces_even_width() {
        // 1000 * 720 / 1080 = 666.67 -> 667 -> 668
        let res = Resolution::new(1000, 1080).scaled_to_height(720);
        assert_eq!(res, Resolution::new(668, 720));

        let hd = Resolution::new(1920, 1080).scaled_to_height(720);
        assert_eq!(hd, Resolution::new(1280, 720));
    }

    #[test]
    fn test_batch_count_rounds_up() {
        let asset = VideoAsset {
            path: PathBuf::from("/videos/a.mp4"),
            resolution: Resolution::new(64, 64),
            fps: 25.0,
            frame_count: 130,
            duration_secs: 5.2,
            has_audio: false,
        };
        assert_eq!(asset.batch_count(64), 3);
        assert_eq!(asset.batch_count(130), 1);
        assert_eq!(asset.display_name(), "a.mp4");
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::new(1280, 720).to_string(), "1280x720");
        assert_eq!(Resolution::new(2, 2).rgb24_len(), 12);
    }
}
