use std::num::NonZeroU32;

/// Whether frame number `count` is due for analysis.
pub fn should_analyze(count: u64, interval: NonZeroU32) -> bool {
    count % u64::from(interval.get()) == 0
}

/// Monotonic per-session frame counter.
///
/// Starts at 0 and is incremented once per received frame before the
/// sampling decision, so the first analyzed frame is frame `interval`.
#[derive(Debug, Clone)]
pub struct FrameCounter {
    count: u64,
    interval: NonZeroU32,
}

impl FrameCounter {
    pub fn new(interval: NonZeroU32) -> Self {
        Self { count: 0, interval }
    }

    /// Count one frame and return whether it should be analyzed.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        should_analyze(self.count, self.interval)
    }

    /// Number of frames counted so far (the index of the latest frame).
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn interval(&self) -> NonZeroU32 {
        self.interval
    }
}
