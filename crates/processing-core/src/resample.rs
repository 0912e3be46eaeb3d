//! Frame-rate reduction by index selection.

/// Decides which decoded frames survive a frame-rate reduction.
///
/// With a source rate above the target, frame `i` is kept when
/// `i % (source / target) < 1`. Sources at or below the target keep every
/// frame; the rate is never raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateResampler {
    interval: Option<f64>,
}

impl FrameRateResampler {
    pub fn new(source_fps: f64, target_fps: f64) -> Self {
        let interval = (source_fps > 0.0 && target_fps > 0.0 && source_fps > target_fps)
            .then(|| source_fps / target_fps);
        Self { interval }
    }

    /// Resampler that keeps every frame.
    pub fn passthrough() -> Self {
        Self { interval: None }
    }

    pub fn interval(&self) -> Option<f64> {
        self.interval
    }

    pub fn is_passthrough(&self) -> bool {
        self.interval.is_none()
    }

    /// Whether the frame at `frame_index` (counted over all decoded frames of
    /// the video) is written.
    pub fn keep(&self, frame_index: u64) -> bool {
        match self.interval {
            Some(interval) => (frame_index as f64) % interval < 1.0,
            None => true,
        }
    }

    /// Number of frames kept out of the first `frame_count`.
    pub fn kept_count(&self, frame_count: u64) -> u64 {
        match self.interval {
            Some(_) => (0..frame_count).filter(|i| self.keep(*i)).count() as u64,
            None => frame_count,
        }
    }
}
