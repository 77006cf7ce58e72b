//! Tone segment model
//!
//! A tone is one timed segment handed to the tone queue: either sound at a
//! given frequency or silence (frequency zero). Slope shaping is carried as
//! a parameter only; waveform synthesis is the sink's business.

use serde::{Deserialize, Serialize};

/// Slope (rise/fall) shape applied to a tone's edges for click suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlopeShape {
    /// No shaping; hard keying edges.
    Rectangular,
    /// Linear ramp.
    Linear,
    /// Raised-cosine ramp.
    RaisedCosine,
    /// Quarter-sine ramp.
    Sine,
}

impl Default for SlopeShape {
    fn default() -> Self {
        SlopeShape::RaisedCosine
    }
}

/// The role a tone plays in the queue.
///
/// Markers make the queue's contents legible after the fact: character
/// removal scans the tail for a contiguous run of tones tagged with the
/// same character id, and refuses to guess across raw enqueues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneMarker {
    /// A dot or dash belonging to the character with this enqueue id.
    Mark { character: u64 },
    /// A space; tagged with a character id when enqueued as part of one.
    Space { character: Option<u64> },
    /// A tone that sounds until the next dequeue (straight-key keying).
    Forever,
    /// Raw caller-supplied tone with no character bookkeeping.
    Raw,
}

/// One timed tone segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    /// Frequency in Hz; zero means silence for the duration.
    pub frequency_hz: u32,
    /// Duration in microseconds. Ignored when `forever` is set.
    pub duration_us: u32,
    /// Edge shaping to apply.
    pub slope: SlopeShape,
    /// Sound indefinitely until the next dequeue, flush, or stop.
    pub forever: bool,
    /// Queue bookkeeping tag.
    pub marker: ToneMarker,
}

impl Tone {
    /// A sounding tone of fixed duration.
    pub fn sound(frequency_hz: u32, duration_us: u32, slope: SlopeShape) -> Self {
        Self {
            frequency_hz,
            duration_us,
            slope,
            forever: false,
            marker: ToneMarker::Raw,
        }
    }

    /// A silent segment of fixed duration.
    pub fn silence(duration_us: u32) -> Self {
        Self {
            frequency_hz: 0,
            duration_us,
            slope: SlopeShape::Rectangular,
            forever: false,
            marker: ToneMarker::Raw,
        }
    }

    /// A tone that sounds until explicitly replaced.
    pub fn forever(frequency_hz: u32, slope: SlopeShape) -> Self {
        Self {
            frequency_hz,
            duration_us: 0,
            slope,
            forever: true,
            marker: ToneMarker::Forever,
        }
    }

    /// Same tone with a different marker.
    pub fn with_marker(mut self, marker: ToneMarker) -> Self {
        self.marker = marker;
        self
    }

    /// True for silence segments.
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.frequency_hz == 0
    }
}
