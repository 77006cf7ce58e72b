//! Tone generator
//!
//! Owns the tone queue and the audio sink, provides the whole enqueue
//! surface (raw tones, marks, representations, characters, strings), and
//! runs the single background thread that drains the queue into the sink.
//!
//! All timing flows from one number, the unit (dot) duration at the current
//! speed. Any change to speed, gap, or weighting marks the derived set out
//! of sync and recomputes it immediately; nothing ever reads stale values.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use morsekit_core::{charset, timing, CoreError};

use crate::error::{KeyingError, Result};
use crate::queue::{LowWatermark, ToneQueue, DEFAULT_CAPACITY};
use crate::sink::Sink;
use crate::tone::{SlopeShape, Tone, ToneMarker};

/// Slope (rise/fall) duration applied to sounding tones.
pub const SLOPE_DURATION_US: u32 = 5_000;

/// Sample rate the sink is configured with unless overridden.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// How long `stop()` waits for the background thread before abandoning it.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A dot or a dash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    Dot,
    Dash,
}

impl Mark {
    /// The opposite mark, for iambic alternation.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Mark::Dot => Mark::Dash,
            Mark::Dash => Mark::Dot,
        }
    }

    /// The representation symbol for this mark.
    pub fn symbol(self) -> char {
        match self {
            Mark::Dot => charset::DOT,
            Mark::Dash => charset::DASH,
        }
    }

    /// Parse a representation symbol.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            charset::DOT => Some(Mark::Dot),
            charset::DASH => Some(Mark::Dash),
            _ => None,
        }
    }
}

/// Notified by the background thread after each dequeued tone has been
/// realized, exactly once per tone, in dequeue order. The iambic keyer
/// clocks itself off this. Implementations must not block.
pub trait ToneEndListener: Send + Sync {
    fn on_tone_end(&self);
}

/// Generator settings, all caller-facing units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Sending speed, words per minute.
    pub speed_wpm: u32,
    /// Tone frequency, Hz.
    pub frequency_hz: u32,
    /// Volume, percent.
    pub volume_percent: u32,
    /// Extra inter-character spacing, dot units (Farnsworth-style).
    pub gap_units: u32,
    /// Dot/dash duty-cycle skew, percent; 50 is neutral.
    pub weighting_percent: u32,
    /// Edge shaping for sounding tones.
    pub slope: SlopeShape,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            speed_wpm: 12,
            frequency_hz: 800,
            volume_percent: 70,
            gap_units: 0,
            weighting_percent: 50,
            slope: SlopeShape::RaisedCosine,
        }
    }
}

impl GeneratorSettings {
    fn validate(&self) -> Result<()> {
        timing::validate_speed(self.speed_wpm)?;
        timing::validate_frequency(self.frequency_hz)?;
        timing::validate_volume(self.volume_percent)?;
        timing::validate_gap(self.gap_units)?;
        timing::validate_weighting(self.weighting_percent)?;
        Ok(())
    }
}

/// Derived timing set, microseconds. Recomputed whenever speed, gap, or
/// weighting changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneratorTiming {
    /// One dot unit, unweighted.
    pub unit_us: u32,
    /// Dot mark duration (weighted).
    pub dot_us: u32,
    /// Dash mark duration (weighted).
    pub dash_us: u32,
    /// Inter-mark space (weighted inversely to the marks).
    pub inter_mark_space_us: u32,
    /// Full inter-character space.
    pub inter_character_space_us: u32,
    /// Full inter-word space.
    pub inter_word_space_us: u32,
    /// Gap-derived extra delay folded into the inter-character space.
    pub additional_space_us: u32,
    /// Gap-derived extra delay folded into the inter-word space.
    pub adjustment_space_us: u32,
}

impl GeneratorTiming {
    /// Compute the full derived set from the settings.
    ///
    /// Weighting shifts duration between marks and the following spaces
    /// while preserving each mark+space pair's total, so overall character
    /// timing is unchanged. Idempotent: same settings, same result.
    fn compute(settings: &GeneratorSettings) -> Self {
        let unit = i64::from(timing::unit_duration_us(settings.speed_wpm));
        // Neutral weighting (50%) gives zero delta; the 20..=80 bound keeps
        // |delta| <= 0.6 unit, so nothing can reach zero or go negative.
        let delta = (2 * i64::from(settings.weighting_percent) - 100) * unit / 100;
        let additional = i64::from(settings.gap_units) * unit;
        let adjustment = 7 * additional / 3;

        let dot = unit + delta;
        let dash = 3 * unit + delta;
        let ims = unit - delta;
        let ics = 3 * unit - delta + additional;
        let iws = 7 * unit - delta + additional + adjustment;

        Self {
            unit_us: unit as u32,
            dot_us: dot as u32,
            dash_us: dash as u32,
            inter_mark_space_us: ims as u32,
            inter_character_space_us: ics as u32,
            inter_word_space_us: iws as u32,
            additional_space_us: additional as u32,
            adjustment_space_us: adjustment as u32,
        }
    }

    /// Space appended after a character's trailing inter-mark space to
    /// reach a full inter-character space.
    #[inline]
    fn character_space_extension_us(&self) -> u32 {
        self.inter_character_space_us - self.inter_mark_space_us
    }

    /// Space appended after a full inter-character space to reach a full
    /// inter-word space.
    #[inline]
    fn word_space_extension_us(&self) -> u32 {
        self.inter_word_space_us - self.inter_character_space_us
    }
}

struct EngineState {
    settings: GeneratorSettings,
    derived: GeneratorTiming,
    parameters_in_sync: bool,
    /// Monotonic id handed to each enqueued character.
    next_character_id: u64,
    /// Tail character eligible for removal: (id, tone count).
    last_character: Option<(u64, usize)>,
}

impl EngineState {
    fn timing(&mut self) -> GeneratorTiming {
        if !self.parameters_in_sync {
            self.derived = GeneratorTiming::compute(&self.settings);
            self.parameters_in_sync = true;
        }
        self.derived
    }
}

struct Shared {
    queue: ToneQueue,
    sink: Mutex<Box<dyn Sink>>,
    listeners: Mutex<Vec<Weak<dyn ToneEndListener>>>,
    stop: AtomicBool,
    slope_duration_us: AtomicU32,
    sample_rate: AtomicU32,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn notify_tone_end(&self) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|listener| match listener.upgrade() {
            Some(listener) => {
                listener.on_tone_end();
                true
            }
            None => false,
        });
    }

    fn record_failure(&self, msg: String) {
        tracing::warn!(%msg, "sink failure, generator unusable");
        *self.failure.lock().unwrap() = Some(msg);
    }
}

/// The sending engine: tone queue, sink, background drain thread, and the
/// enqueue surface. All methods take `&self`; a `Generator` can be shared
/// behind an `Arc` between caller threads.
pub struct Generator {
    shared: Arc<Shared>,
    state: Mutex<EngineState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Generator {
    /// Create a generator with default settings and queue capacity.
    pub fn new(sink: Box<dyn Sink>) -> Result<Self> {
        Self::with_settings(sink, GeneratorSettings::default())
    }

    /// Create a generator with explicit settings.
    pub fn with_settings(sink: Box<dyn Sink>, settings: GeneratorSettings) -> Result<Self> {
        Self::with_capacity(sink, settings, DEFAULT_CAPACITY)
    }

    /// Create a generator with explicit settings and queue capacity.
    pub fn with_capacity(
        sink: Box<dyn Sink>,
        settings: GeneratorSettings,
        capacity: usize,
    ) -> Result<Self> {
        settings.validate()?;
        let derived = GeneratorTiming::compute(&settings);
        Ok(Self {
            shared: Arc::new(Shared {
                queue: ToneQueue::new(capacity),
                sink: Mutex::new(sink),
                listeners: Mutex::new(Vec::new()),
                stop: AtomicBool::new(false),
                slope_duration_us: AtomicU32::new(SLOPE_DURATION_US),
                sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE),
                failure: Mutex::new(None),
            }),
            state: Mutex::new(EngineState {
                settings,
                derived,
                parameters_in_sync: true,
                next_character_id: 0,
                last_character: None,
            }),
            thread: Mutex::new(None),
        })
    }

    // --- parameters ---

    /// Current settings snapshot.
    pub fn settings(&self) -> GeneratorSettings {
        self.state.lock().unwrap().settings
    }

    /// Current derived timing, resynchronized if needed.
    pub fn timing(&self) -> GeneratorTiming {
        self.state.lock().unwrap().timing()
    }

    pub fn set_speed(&self, wpm: u32) -> Result<()> {
        timing::validate_speed(wpm)?;
        let mut state = self.state.lock().unwrap();
        if state.settings.speed_wpm != wpm {
            state.settings.speed_wpm = wpm;
            self.resync(&mut state);
        }
        Ok(())
    }

    pub fn set_frequency(&self, hz: u32) -> Result<()> {
        timing::validate_frequency(hz)?;
        self.state.lock().unwrap().settings.frequency_hz = hz;
        Ok(())
    }

    pub fn set_volume(&self, percent: u32) -> Result<()> {
        timing::validate_volume(percent)?;
        self.state.lock().unwrap().settings.volume_percent = percent;
        Ok(())
    }

    pub fn set_gap(&self, units: u32) -> Result<()> {
        timing::validate_gap(units)?;
        let mut state = self.state.lock().unwrap();
        if state.settings.gap_units != units {
            state.settings.gap_units = units;
            self.resync(&mut state);
        }
        Ok(())
    }

    /// Sample rate passed to the sink's `configure` on the next `start`.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::SeqCst)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(CoreError::ValueOutOfRange {
                parameter: "sample_rate",
                value: 0,
                min: 1,
                max: i64::from(u32::MAX),
            }
            .into());
        }
        self.shared.sample_rate.store(sample_rate, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_weighting(&self, percent: u32) -> Result<()> {
        timing::validate_weighting(percent)?;
        let mut state = self.state.lock().unwrap();
        if state.settings.weighting_percent != percent {
            state.settings.weighting_percent = percent;
            self.resync(&mut state);
        }
        Ok(())
    }

    fn resync(&self, state: &mut EngineState) {
        state.parameters_in_sync = false;
        let derived = state.timing();
        tracing::debug!(?derived, "generator timing resynchronized");
    }

    // --- lifecycle ---

    /// Launch the background drain thread. Idempotent while running.
    pub fn start(&self) -> Result<()> {
        self.check_failure()?;
        let mut thread = self.thread.lock().unwrap();
        if thread.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        {
            let mut sink = self.shared.sink.lock().unwrap();
            sink.configure(self.shared.sample_rate.load(Ordering::SeqCst))
                .map_err(|e| KeyingError::SinkFailed { msg: e.to_string() })?;
            sink.start()
                .map_err(|e| KeyingError::SinkFailed { msg: e.to_string() })?;
        }
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("morsekit-generator".into())
            .spawn(move || drain_loop(shared))
            .expect("spawning the generator thread");
        *thread = Some(handle);
        tracing::debug!("generator started");
        Ok(())
    }

    /// Silence the sink, signal the background thread, and join it with a
    /// bounded wait. Idempotent.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.queue.wake_all();
        if let Err(e) = self.shared.sink.lock().unwrap().silence_now() {
            tracing::warn!(error = %e, "sink refused to silence on stop");
        }
        let mut thread = self.thread.lock().unwrap();
        if let Some(handle) = thread.take() {
            let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // Defect tolerance: a stuck sink call. Abandon the thread
                // rather than hang the caller.
                tracing::warn!("generator thread did not stop in time, abandoning");
            }
        }
        let _ = self.shared.sink.lock().unwrap().stop();
        tracing::debug!("generator stopped");
    }

    /// True while the background thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn check_failure(&self) -> Result<()> {
        if let Some(msg) = self.shared.failure.lock().unwrap().clone() {
            return Err(KeyingError::SinkFailed { msg });
        }
        Ok(())
    }

    // --- enqueue surface ---

    /// Enqueue one raw tone. Clears character-removal bookkeeping.
    pub fn enqueue_tone(&self, tone: Tone) -> Result<()> {
        self.check_failure()?;
        self.state.lock().unwrap().last_character = None;
        self.shared.queue.enqueue(tone)
    }

    /// Begin an open-ended tone (straight key down).
    pub fn enqueue_forever_tone(&self) -> Result<()> {
        let (frequency, slope) = {
            let state = self.state.lock().unwrap();
            (state.settings.frequency_hz, state.settings.slope)
        };
        self.enqueue_tone(Tone::forever(frequency, slope))
    }

    /// End an open-ended tone (straight key up). Enqueued as open-ended
    /// silence so a queued down/up pair plays back in order.
    pub fn enqueue_forever_silence(&self) -> Result<()> {
        self.enqueue_tone(Tone {
            frequency_hz: 0,
            duration_us: 0,
            slope: SlopeShape::Rectangular,
            forever: true,
            marker: ToneMarker::Forever,
        })
    }

    /// Enqueue one dot or dash.
    ///
    /// Unless `is_first_mark` is set, a standard inter-mark space is
    /// enqueued ahead of the mark to separate it from whatever came before.
    /// Both tones go in atomically: a full queue leaves nothing behind.
    pub fn enqueue_mark(&self, mark: Mark, is_first_mark: bool) -> Result<()> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        state.last_character = None;
        self.enqueue_mark_locked(&mut state, mark, is_first_mark, None)
    }

    fn enqueue_mark_locked(
        &self,
        state: &mut EngineState,
        mark: Mark,
        is_first_mark: bool,
        character: Option<u64>,
    ) -> Result<()> {
        let derived = state.timing();
        let duration = match mark {
            Mark::Dot => derived.dot_us,
            Mark::Dash => derived.dash_us,
        };
        let mark_tone = Tone::sound(state.settings.frequency_hz, duration, state.settings.slope)
            .with_marker(match character {
                Some(id) => ToneMarker::Mark { character: id },
                None => ToneMarker::Raw,
            });
        if is_first_mark {
            self.shared.queue.enqueue(mark_tone)
        } else {
            let space = Tone::silence(derived.inter_mark_space_us)
                .with_marker(ToneMarker::Space { character });
            self.shared.queue.enqueue_batch(&[space, mark_tone])
        }
    }

    /// Enqueue a single standard inter-mark space. The iambic keyer uses
    /// this to clock its own element gaps.
    pub fn enqueue_inter_mark_space(&self) -> Result<()> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        let derived = state.timing();
        state.last_character = None;
        self.shared.queue.enqueue(
            Tone::silence(derived.inter_mark_space_us)
                .with_marker(ToneMarker::Space { character: None }),
        )
    }

    /// Enqueue a whole dot/dash representation.
    ///
    /// The representation is validated before anything is enqueued. A
    /// trailing inter-mark space always follows the last mark; with
    /// `add_inter_character_space` it is extended to a full
    /// inter-character space.
    pub fn enqueue_representation(
        &self,
        representation: &str,
        add_inter_character_space: bool,
    ) -> Result<()> {
        self.check_failure()?;
        if !charset::is_valid_representation(representation) {
            return Err(CoreError::InvalidRepresentation {
                representation: representation.to_string(),
            }
            .into());
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_character_id;
        state.next_character_id += 1;

        let mut enqueued = 0usize;
        for (i, symbol) in representation.chars().enumerate() {
            // Validation above guarantees every symbol is a dot or a dash.
            let mark = if symbol == charset::DOT {
                Mark::Dot
            } else {
                Mark::Dash
            };
            self.enqueue_mark_locked(&mut state, mark, i == 0, Some(id))?;
            enqueued += if i == 0 { 1 } else { 2 };
        }
        let derived = state.timing();
        let marker = ToneMarker::Space {
            character: Some(id),
        };
        self.shared
            .queue
            .enqueue(Tone::silence(derived.inter_mark_space_us).with_marker(marker))?;
        enqueued += 1;
        if add_inter_character_space {
            self.shared
                .queue
                .enqueue(Tone::silence(derived.character_space_extension_us()).with_marker(marker))?;
            enqueued += 1;
        }
        state.last_character = Some((id, enqueued));
        Ok(())
    }

    /// Enqueue one character via the character table.
    pub fn enqueue_character(&self, character: char, add_inter_character_space: bool) -> Result<()> {
        let representation = charset::to_representation(character)
            .ok_or(CoreError::UnknownCharacter { character })?;
        self.enqueue_representation(representation, add_inter_character_space)
    }

    /// Enqueue a string; a literal space becomes an inter-word space.
    ///
    /// On an invalid embedded character the error is returned but earlier
    /// characters stay enqueued; partial progress is observable.
    pub fn enqueue_string(&self, text: &str) -> Result<()> {
        for character in text.chars() {
            if character == ' ' {
                self.enqueue_word_space()?;
            } else {
                self.enqueue_character(character, true)?;
            }
        }
        Ok(())
    }

    /// Extend the preceding inter-character space to a full inter-word
    /// space.
    pub fn enqueue_word_space(&self) -> Result<()> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        let derived = state.timing();
        state.last_character = None;
        self.shared.queue.enqueue(
            Tone::silence(derived.word_space_extension_us())
                .with_marker(ToneMarker::Space { character: None }),
        )
    }

    /// Best-effort removal of the most recently enqueued whole character,
    /// provided none of its tones have been dequeued and nothing was
    /// enqueued after it.
    pub fn remove_last_character(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some((id, count)) = state.last_character else {
            return Err(KeyingError::NotRemovable);
        };
        if !self.shared.queue.truncate_character(id, count) {
            return Err(KeyingError::NotRemovable);
        }
        state.last_character = None;
        Ok(())
    }

    // --- queue delegation ---

    /// Block until the queue holds at most `level` tones.
    pub fn wait_for_queue_level(&self, level: usize) {
        self.shared.queue.wait_for_level(level);
    }

    /// Block until the background thread finishes the tone it is on.
    pub fn wait_for_end_of_current_tone(&self) {
        self.shared.queue.wait_for_end_of_current_tone();
    }

    /// Discard all pending tones and force the sink silent.
    pub fn flush_queue(&self) {
        self.shared.queue.flush();
        if let Err(e) = self.shared.sink.lock().unwrap().silence_now() {
            tracing::warn!(error = %e, "sink refused to silence on flush");
        }
    }

    /// Register the queue's low-watermark listener.
    pub fn register_low_watermark(
        &self,
        listener: Box<dyn LowWatermark>,
        level: usize,
    ) -> Result<()> {
        self.shared.queue.register_low_watermark(listener, level)
    }

    /// Disable the low-watermark mechanism.
    pub fn clear_low_watermark(&self) {
        self.shared.queue.clear_low_watermark();
    }

    pub fn queue_length(&self) -> usize {
        self.shared.queue.length()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn is_queue_full(&self) -> bool {
        self.shared.queue.is_full()
    }

    /// Register a listener clocked once per completed tone. Held weakly so
    /// a keyer that owns this generator does not leak through a cycle.
    pub fn register_tone_end_listener(&self, listener: Weak<dyn ToneEndListener>) {
        self.shared.listeners.lock().unwrap().push(listener);
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain_loop(shared: Arc<Shared>) {
    loop {
        let Some(tone) = shared
            .queue
            .dequeue_blocking(|| shared.stop.load(Ordering::SeqCst))
        else {
            break;
        };

        let result = {
            let mut sink = shared.sink.lock().unwrap();
            if tone.forever {
                if tone.is_silent() {
                    sink.silence_now()
                } else {
                    sink.play_forever(tone.frequency_hz)
                }
            } else {
                let slope = if tone.is_silent() {
                    0
                } else {
                    shared.slope_duration_us.load(Ordering::Relaxed)
                };
                sink.play_tone(&tone, slope)
            }
        };

        if let Err(e) = result {
            shared.record_failure(e.to_string());
            break;
        }

        // Exactly once per completed tone, in dequeue order.
        shared.notify_tone_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CaptureSink, NullSink, SinkEvent};

    fn generator_at(wpm: u32) -> Generator {
        let settings = GeneratorSettings {
            speed_wpm: wpm,
            frequency_hz: 700,
            ..Default::default()
        };
        Generator::with_settings(Box::new(NullSink::new()), settings).unwrap()
    }

    #[test]
    fn mark_symbol_round_trip() {
        for mark in [Mark::Dot, Mark::Dash] {
            assert_eq!(Mark::from_symbol(mark.symbol()), Some(mark));
            assert_eq!(mark.opposite().opposite(), mark);
        }
        assert_eq!(Mark::from_symbol('x'), None);
    }

    #[test]
    fn derived_timing_at_neutral_weighting() {
        let timing = generator_at(20).timing();
        assert_eq!(timing.unit_us, 60_000);
        assert_eq!(timing.dot_us, 60_000);
        assert_eq!(timing.dash_us, 180_000);
        assert_eq!(timing.dash_us, 3 * timing.dot_us);
        assert_eq!(timing.inter_mark_space_us, 60_000);
        assert_eq!(timing.inter_character_space_us, 180_000);
        assert_eq!(timing.inter_word_space_us, 420_000);
    }

    #[test]
    fn weighting_preserves_pair_totals() {
        let generator = generator_at(20);
        let neutral = generator.timing();
        generator.set_weighting(70).unwrap();
        let heavy = generator.timing();

        assert!(heavy.dot_us > neutral.dot_us);
        assert!(heavy.inter_mark_space_us < neutral.inter_mark_space_us);
        // Mark + following space totals are invariant under weighting.
        assert_eq!(
            heavy.dot_us + heavy.inter_mark_space_us,
            neutral.dot_us + neutral.inter_mark_space_us
        );
        assert_eq!(
            heavy.dash_us + heavy.inter_mark_space_us,
            neutral.dash_us + neutral.inter_mark_space_us
        );
    }

    #[test]
    fn dot_duration_monotonic_in_speed() {
        let generator = generator_at(4);
        let mut prev = u32::MAX;
        for wpm in timing::SPEED_MIN..=timing::SPEED_MAX {
            generator.set_speed(wpm).unwrap();
            let dot = generator.timing().dot_us;
            assert!(dot < prev);
            prev = dot;
        }
    }

    #[test]
    fn resynchronization_is_idempotent() {
        let generator = generator_at(20);
        let before = generator.timing();
        generator.set_speed(20).unwrap();
        assert_eq!(generator.timing(), before);
        assert_eq!(generator.timing(), generator.timing());
    }

    #[test]
    fn out_of_range_setters_fail_without_side_effect() {
        let generator = generator_at(20);
        let before = generator.timing();
        assert!(generator.set_speed(3).is_err());
        assert!(generator.set_weighting(10).is_err());
        assert!(generator.set_gap(1_000).is_err());
        assert_eq!(generator.timing(), before);
        assert_eq!(generator.settings().speed_wpm, 20);
    }

    #[test]
    fn character_enqueue_shape() {
        let generator = generator_at(20);
        // 'A' = ".-": dot, space, dash, trailing ims, ics extension
        generator.enqueue_character('a', true).unwrap();
        assert_eq!(generator.queue_length(), 5);
    }

    #[test]
    fn invalid_representation_enqueues_nothing() {
        let generator = generator_at(20);
        assert!(matches!(
            generator.enqueue_representation(".-x", true),
            Err(KeyingError::Core(CoreError::InvalidRepresentation { .. }))
        ));
        assert_eq!(generator.queue_length(), 0);
    }

    #[test]
    fn string_enqueue_preserves_partial_progress() {
        let generator = generator_at(20);
        let result = generator.enqueue_string("AB#C");
        assert!(matches!(
            result,
            Err(KeyingError::Core(CoreError::UnknownCharacter { character: '#' }))
        ));
        // A (5 tones) and B (9 tones) stay enqueued.
        assert_eq!(generator.queue_length(), 14);
    }

    #[test]
    fn remove_last_character_truncates_exactly() {
        let generator = generator_at(20);
        generator.enqueue_string("AB").unwrap();
        assert_eq!(generator.queue_length(), 14);
        generator.remove_last_character().unwrap();
        assert_eq!(generator.queue_length(), 5);
        // Only one level of undo is tracked.
        assert!(matches!(
            generator.remove_last_character(),
            Err(KeyingError::NotRemovable)
        ));
    }

    #[test]
    fn remove_last_character_refuses_after_raw_marks() {
        let generator = generator_at(20);
        generator.enqueue_character('e', true).unwrap();
        generator.enqueue_mark(Mark::Dot, false).unwrap();
        assert!(matches!(
            generator.remove_last_character(),
            Err(KeyingError::NotRemovable)
        ));
    }

    #[test]
    fn drain_realizes_tones_in_order() {
        let sink = CaptureSink::new();
        let events = sink.events();
        let settings = GeneratorSettings {
            speed_wpm: 20,
            frequency_hz: 700,
            ..Default::default()
        };
        let generator = Generator::with_settings(Box::new(sink), settings).unwrap();

        generator.enqueue_character('a', true).unwrap();
        generator.start().unwrap();
        generator.wait_for_queue_level(0);
        // stop() joins the drain thread, so the event log is complete.
        generator.stop();

        let tones: Vec<(u32, u32)> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Tone {
                    frequency_hz,
                    duration_us,
                } => Some((*frequency_hz, *duration_us)),
                _ => None,
            })
            .collect();
        // dot, ims, dash, trailing ims, ics extension
        assert_eq!(
            tones,
            vec![
                (700, 60_000),
                (0, 60_000),
                (700, 180_000),
                (0, 60_000),
                (0, 120_000),
            ]
        );
    }

    #[test]
    fn sink_is_configured_before_starting() {
        let sink = CaptureSink::new();
        let events = sink.events();
        let generator =
            Generator::with_settings(Box::new(sink), GeneratorSettings::default()).unwrap();
        generator.set_sample_rate(44_100).unwrap();
        assert!(generator.set_sample_rate(0).is_err());

        generator.start().unwrap();
        generator.stop();

        let log = events.lock().unwrap();
        assert_eq!(log[0], SinkEvent::Configured { sample_rate: 44_100 });
        assert_eq!(log[1], SinkEvent::Started);
    }

    #[test]
    fn start_is_idempotent_and_stop_is_too() {
        let generator = generator_at(20);
        generator.start().unwrap();
        generator.start().unwrap();
        assert!(generator.is_running());
        generator.stop();
        generator.stop();
        assert!(!generator.is_running());
    }

    #[test]
    fn flush_queue_forces_silence() {
        let sink = CaptureSink::new();
        let events = sink.events();
        let generator =
            Generator::with_settings(Box::new(sink), GeneratorSettings::default()).unwrap();
        generator.enqueue_string("PARIS").unwrap();
        assert!(generator.queue_length() > 0);
        generator.flush_queue();
        assert_eq!(generator.queue_length(), 0);
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| *e == SinkEvent::Silenced));
    }
}
