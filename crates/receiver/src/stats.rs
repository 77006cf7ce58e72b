//! Receive timing statistics
//!
//! A bounded ring of recent timing errors, one entry per classified mark or
//! space, recorded as the signed difference between the observed duration
//! and the ideal one. The per-category report is the RMS of those deltas,
//! a measure of the sender's keying jitter.

/// Entries kept before the oldest are overwritten. A tunable constant in
/// its own right, unrelated to the representation buffer size.
pub const STATISTICS_CAPACITY: usize = 256;

/// What kind of interval a statistic describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticCategory {
    Dot,
    Dash,
    InterMarkSpace,
    InterCharacterSpace,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    category: StatisticCategory,
    delta_us: i32,
}

/// Ring buffer of timing deltas with per-category RMS reporting.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    entries: Vec<Entry>,
    cursor: usize,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation: how far `duration` landed from `ideal`.
    pub fn record(&mut self, category: StatisticCategory, duration_us: u32, ideal_us: u32) {
        let delta_us = duration_us as i64 - ideal_us as i64;
        let entry = Entry {
            category,
            delta_us: delta_us.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        };
        if self.entries.len() < STATISTICS_CAPACITY {
            self.entries.push(entry);
        } else {
            self.entries[self.cursor] = entry;
        }
        self.cursor = (self.cursor + 1) % STATISTICS_CAPACITY;
    }

    /// RMS deviation from ideal for one category, in microseconds. Zero
    /// when no samples exist.
    pub fn deviation(&self, category: StatisticCategory) -> f64 {
        let squares: Vec<f64> = self
            .entries
            .iter()
            .filter(|e| e.category == category)
            .map(|e| f64::from(e.delta_us) * f64::from(e.delta_us))
            .collect();
        if squares.is_empty() {
            return 0.0;
        }
        (squares.iter().sum::<f64>() / squares.len() as f64).sqrt()
    }

    /// Number of recorded entries (across all categories).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard all recorded statistics.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
