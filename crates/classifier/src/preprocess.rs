//! Frame preprocessing for the sensitivity model.
//!
//! Frames are resized to a square input with bilinear filtering and scaled
//! to `[-1, 1]` (`x / 127.5 - 1`), laid out NHWC.

use deid_common::error::{DeidError, DeidResult};
use deid_model::Frame;
use image::imageops::FilterType;
use image::RgbImage;

/// Reject frames the model cannot consume.
pub fn validate_frame(frame: &Frame) -> DeidResult<()> {
    if frame.width == 0 || frame.height == 0 {
        return Err(DeidError::classification(format!(
            "frame {} has zero dimensions ({}x{})",
            frame.index, frame.width, frame.height
        )));
    }
    if frame.data.len() != frame.expected_len() {
        return Err(DeidError::classification(format!(
            "frame {} has {} bytes, expected {} for {}x{} rgb24",
            frame.index,
            frame.data.len(),
            frame.expected_len(),
            frame.width,
            frame.height
        )));
    }
    Ok(())
}

/// Resize one frame to `size x size`.
pub fn resize_frame(frame: &Frame, size: u32) -> DeidResult<RgbImage> {
    validate_frame(frame)?;
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| DeidError::classification(format!("frame {} buffer too small", frame.index)))?;
    if frame.width == size && frame.height == size {
        return Ok(image);
    }
    Ok(image::imageops::resize(&image, size, size, FilterType::Triangle))
}

#[inline]
fn normalize(value: u8) -> f32 {
    f32::from(value) / 127.5 - 1.0
}

/// Resize and normalize a batch into one `[N, size, size, 3]` buffer.
pub fn preprocess_batch(frames: &[Frame], size: u32) -> DeidResult<Vec<f32>> {
    let per_frame = size as usize * size as usize * 3;
    let mut data = Vec::with_capacity(frames.len() * per_frame);
    for frame in frames {
        let resized = resize_frame(frame, size)?;
        data.extend(resized.as_raw().iter().copied().map(normalize));
    }
    Ok(data)
}
