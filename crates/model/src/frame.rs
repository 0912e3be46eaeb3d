//! Decoded frames and per-frame sensitivity labels.

use crate::asset::Resolution;
use serde::{Deserialize, Serialize};

/// Binary sensitivity label of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Ordinary content, kept as-is.
    #[default]
    Clear,
    /// Must be redacted.
    Sensitive,
}

/// A label value outside `{0, 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid label value {0}, expected 0 or 1")]
pub struct InvalidLabel(pub i64);

impl Label {
    pub fn is_sensitive(self) -> bool {
        matches!(self, Self::Sensitive)
    }

    pub fn as_bit(self) -> u8 {
        match self {
            Self::Clear => 0,
            Self::Sensitive => 1,
        }
    }

    /// Label from a probability, sensitive at or above `threshold`.
    pub fn from_probability(p: f32, threshold: f32) -> Self {
        if p >= threshold {
            Self::Sensitive
        } else {
            Self::Clear
        }
    }

    /// Parse a `0`/`1` string, ignoring whitespace and commas.
    pub fn parse_sequence(s: &str) -> Result<Vec<Label>, InvalidLabel> {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(|c| match c {
                '0' => Ok(Label::Clear),
                '1' => Ok(Label::Sensitive),
                other => Err(InvalidLabel(i64::from(u32::from(other)))),
            })
            .collect()
    }
}

impl TryFrom<i64> for Label {
    type Error = InvalidLabel;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Clear),
            1 => Ok(Self::Sensitive),
            other => Err(InvalidLabel(other)),
        }
    }
}

impl From<bool> for Label {
    fn from(sensitive: bool) -> Self {
        if sensitive {
            Self::Sensitive
        } else {
            Self::Clear
        }
    }
}

/// Classifier output for one frame. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrediction {
    pub frame_index: u64,
    pub label: Label,
}

/// One decoded RGB24 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,

    /// Position of the frame in its decoded stream.
    pub index: u64,

    /// Packed `R, G, B` bytes, row-major, no padding.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, index: u64, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            index,
            data,
        }
    }

    /// A solid-color frame.
    pub fn filled(width: u32, height: u32, index: u64, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(Resolution::new(width, height).rgb24_len())
            .collect();
        Self::new(width, height, index, data)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn expected_len(&self) -> usize {
        self.resolution().rgb24_len()
    }

    /// Non-zero dimensions and a buffer of exactly `w * h * 3` bytes.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }

    /// Per-channel mean over all pixels, truncated toward zero.
    pub fn mean_color(&self) -> [u8; 3] {
        let pixels = (self.data.len() / 3) as u64;
        if pixels == 0 {
            return [0, 0, 0];
        }
        let mut sums = [0u64; 3];
        for px in self.data.chunks_exact(3) {
            sums[0] += u64::from(px[0]);
            sums[1] += u64::from(px[1]);
            sums[2] += u64::from(px[2]);
        }
        [
            (sums[0] / pixels) as u8,
            (sums[1] / pixels) as u8,
            (sums[2] / pixels) as u8,
        ]
    }

    /// Overwrite every pixel with `rgb`.
    pub fn fill(&mut self, rgb: [u8; 3]) {
        for px in self.data.chunks_exact_mut(3) {
            px.copy_from_slice(&rgb);
        }
    }
}
