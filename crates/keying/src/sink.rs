//! Abstract audio sink
//!
//! The generator drives one of these from its background task. Real device
//! backends live outside this crate; here are a no-op sink for timing-only
//! use and a capturing sink for tests and tools.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::tone::Tone;

/// Where realized tones go.
///
/// `play_tone` is synchronous: it returns once the tone has been realized
/// (for a hardware sink, once the samples are written; for a synthetic
/// sink, immediately). `play_forever` returns at once and the sink keeps
/// sounding until the next call.
pub trait Sink: Send {
    /// Prepare the sink for the given sample rate.
    fn configure(&mut self, sample_rate: u32) -> Result<()>;

    /// Begin producing audio.
    fn start(&mut self) -> Result<()>;

    /// Stop producing audio.
    fn stop(&mut self) -> Result<()>;

    /// Realize one finite tone (or silence, when `tone.is_silent()`), with
    /// the given slope duration for edge shaping.
    fn play_tone(&mut self, tone: &Tone, slope_duration_us: u32) -> Result<()>;

    /// Sound continuously at `frequency_hz` until the next call.
    fn play_forever(&mut self, frequency_hz: u32) -> Result<()>;

    /// Cut to silence immediately, interrupting any forever tone.
    fn silence_now(&mut self) -> Result<()>;
}

/// Sink that discards everything. Useful when only the timing engine is of
/// interest; optionally sleeps for each tone so wall-clock pacing matches
/// the queue's notion of time.
#[derive(Debug, Default)]
pub struct NullSink {
    /// Sleep for each finite tone's duration. Off by default so tests run
    /// at full speed.
    pub realtime: bool,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn realtime() -> Self {
        Self { realtime: true }
    }
}

impl Sink for NullSink {
    fn configure(&mut self, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn play_tone(&mut self, tone: &Tone, _slope_duration_us: u32) -> Result<()> {
        if self.realtime {
            std::thread::sleep(std::time::Duration::from_micros(u64::from(tone.duration_us)));
        }
        Ok(())
    }

    fn play_forever(&mut self, _frequency_hz: u32) -> Result<()> {
        Ok(())
    }

    fn silence_now(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Configured { sample_rate: u32 },
    Started,
    Stopped,
    Tone { frequency_hz: u32, duration_us: u32 },
    Forever { frequency_hz: u32 },
    Silenced,
}

/// Sink that records every call for later inspection. The event log is
/// shared, so a test can keep a handle while the generator owns the sink.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the shared event log.
    pub fn events(&self) -> Arc<Mutex<Vec<SinkEvent>>> {
        self.events.clone()
    }

    /// Snapshot of the events recorded so far.
    pub fn snapshot(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Sink for CaptureSink {
    fn configure(&mut self, sample_rate: u32) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Configured { sample_rate });
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Stopped);
        Ok(())
    }

    fn play_tone(&mut self, tone: &Tone, _slope_duration_us: u32) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Tone {
            frequency_hz: tone.frequency_hz,
            duration_us: tone.duration_us,
        });
        Ok(())
    }

    fn play_forever(&mut self, frequency_hz: u32) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Forever { frequency_hz });
        Ok(())
    }

    fn silence_now(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Silenced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::SlopeShape;

    #[test]
    fn capture_sink_records_in_order() {
        let mut sink = CaptureSink::new();
        sink.start().unwrap();
        sink.play_tone(&Tone::sound(700, 60_000, SlopeShape::Rectangular), 5_000)
            .unwrap();
        sink.silence_now().unwrap();

        assert_eq!(
            sink.snapshot(),
            vec![
                SinkEvent::Started,
                SinkEvent::Tone {
                    frequency_hz: 700,
                    duration_us: 60_000
                },
                SinkEvent::Silenced,
            ]
        );
    }
}
