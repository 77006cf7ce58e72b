//! Adaptive speed tracking
//!
//! Two short moving averages, one over recent dot durations and one over
//! recent dash durations, place the dot/dash boundary halfway between them.
//! Four samples is enough history to ride out jitter while still following
//! a sender who speeds up or slows down mid-transmission.

/// Samples held by one moving-average window.
pub const TRACKER_WINDOW: usize = 4;

/// Fixed-size moving average over recent mark durations.
#[derive(Debug, Clone)]
pub struct AverageTracker {
    samples: [u32; TRACKER_WINDOW],
    cursor: usize,
    sum: u64,
}

impl AverageTracker {
    /// Start with the window pre-seeded to `initial`, so the average is
    /// sane before any real samples arrive.
    pub fn seeded(initial: u32) -> Self {
        Self {
            samples: [initial; TRACKER_WINDOW],
            cursor: 0,
            sum: u64::from(initial) * TRACKER_WINDOW as u64,
        }
    }

    /// Replace the oldest sample with a new one.
    pub fn add(&mut self, sample_us: u32) {
        self.sum -= u64::from(self.samples[self.cursor]);
        self.sum += u64::from(sample_us);
        self.samples[self.cursor] = sample_us;
        self.cursor = (self.cursor + 1) % TRACKER_WINDOW;
    }

    /// Current average duration in microseconds.
    pub fn average(&self) -> u32 {
        (self.sum / TRACKER_WINDOW as u64) as u32
    }

    /// Re-seed the whole window, discarding history.
    pub fn reseed(&mut self, value: u32) {
        *self = Self::seeded(value);
    }
}

/// Dot/dash boundary derived from the two averages: the midpoint between
/// the typical dot and the typical dash.
pub fn speed_threshold_us(dot_average: u32, dash_average: u32) -> u32 {
    dot_average + (dash_average.saturating_sub(dot_average)) / 2
}
