//! Replacing sensitive frames with a solid fill.

use deid_common::MaskFill;
use deid_model::{Frame, Label};

/// Fill every frame labelled sensitive. Returns how many were masked.
///
/// `frames` and `labels` pair up by position; surplus entries on either side
/// are ignored.
pub fn apply_mask(frames: &mut [Frame], labels: &[Label], fill: MaskFill) -> usize {
    let mut masked = 0;
    for (frame, label) in frames.iter_mut().zip(labels) {
        if label.is_sensitive() {
            mask_frame(frame, fill);
            masked += 1;
        }
    }
    masked
}

/// Fill one frame in place.
pub fn mask_frame(frame: &mut Frame, fill: MaskFill) {
    let rgb = match fill {
        MaskFill::Blackout => [0, 0, 0],
        MaskFill::MeanColor => frame.mean_color(),
    };
    frame.fill(rgb);
}
