//! Receive state machine
//!
//! The receiver consumes mark begin/end timestamps from a key or detector,
//! classifies the resulting mark and space durations into dots, dashes and
//! character/word boundaries, and hands completed characters back through a
//! polling interface. It never blocks: polling too early returns
//! [`ReceiveError::WouldBlock`] and the caller tries again later.
//!
//! Classification runs in one of two modes. In fixed-speed mode every
//! duration is matched against tolerance bands around the ideals for the
//! configured speed. In adaptive mode the dot/dash boundary is re-derived
//! after every mark from two short moving averages, so the receiver follows
//! a sender whose speed drifts.
//!
//! The receiver is deliberately single-writer: all methods take `&mut self`
//! and the caller serializes access.

use morsekit_core::charset::{self, DASH, DOT, MAX_REPRESENTATION_LEN};
use morsekit_core::timing::{
    self, timestamp_delta_us, unit_duration_us, SPEED_MAX, SPEED_MIN,
};
use serde::{Deserialize, Serialize};

use crate::error::{ReceiveError, Result};
use crate::stats::{StatisticCategory, Statistics};
use crate::tracking::{speed_threshold_us, AverageTracker};

/// Symbols the representation buffer can hold. One slot above the longest
/// real representation, so overflow always means garbage input.
pub const REPRESENTATION_CAPACITY: usize = MAX_REPRESENTATION_LEN + 1;

/// Configuration for a [`Receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSettings {
    /// Expected sending speed in WPM. An output, not an input, while
    /// adaptive mode is on.
    pub speed_wpm: u32,
    /// Half-width of the fixed-mode classification bands, as a percentage
    /// of each ideal duration.
    pub tolerance_percent: u32,
    /// Extra inter-character spacing the sender is configured with, in dot
    /// units. Widens the end-of-character window so Farnsworth-style
    /// spacing is not misread as end-of-word.
    pub gap_units: u32,
    /// Marks at or below this duration are discarded as noise. Zero
    /// disables the filter.
    pub noise_spike_threshold_us: u32,
    /// Track the sender's speed from observed mark durations.
    pub adaptive: bool,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            speed_wpm: 12,
            tolerance_percent: 50,
            gap_units: 0,
            noise_spike_threshold_us: 0,
            adaptive: false,
        }
    }
}

impl ReceiverSettings {
    fn validate(&self) -> Result<()> {
        timing::validate_speed(self.speed_wpm)?;
        timing::validate_tolerance(self.tolerance_percent)?;
        timing::validate_gap(self.gap_units)?;
        Ok(())
    }
}

/// Externally visible receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Mark,
    InterMarkSpace,
    EndOfCharacter,
    EndOfCharacterError,
    EndOfWord,
    EndOfWordError,
}

/// Internal state; the error flavor of the two gap states is carried
/// separately so transitions never have to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Mark,
    InterMarkSpace,
    EndOfCharGap,
    EndOfWordGap,
}

/// A successfully polled dot/dash sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledRepresentation {
    pub representation: String,
    pub is_end_of_word: bool,
    pub is_error: bool,
}

/// A successfully polled decoded character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolledCharacter {
    pub character: char,
    pub is_end_of_word: bool,
    pub is_error: bool,
}

/// Classification bands derived from the current settings (fixed mode) or
/// from the tracked averages (adaptive mode). All durations in
/// microseconds.
#[derive(Debug, Clone, Copy)]
struct ReceiveTiming {
    dot_ideal_us: u32,
    dash_ideal_us: u32,
    ims_ideal_us: u32,
    ics_ideal_us: u32,
    dot_min_us: u32,
    dot_max_us: u32,
    dash_min_us: u32,
    dash_max_us: u32,
    ims_max_us: u32,
    ics_min_us: u32,
    ics_max_us: u32,
    adaptive_threshold_us: u32,
}

impl ReceiveTiming {
    fn fixed(settings: &ReceiverSettings) -> Self {
        let unit = unit_duration_us(settings.speed_wpm);
        let tolerance = settings.tolerance_percent;
        let band = |ideal: u32| -> (u32, u32) {
            let half = (u64::from(ideal) * u64::from(tolerance) / 100) as u32;
            (ideal.saturating_sub(half), ideal + half)
        };

        let dot_ideal = unit;
        let dash_ideal = 3 * unit;
        let ims_ideal = unit;
        let ics_ideal = 3 * unit;

        let (dot_min, mut dot_max) = band(dot_ideal);
        let (mut dash_min, dash_max) = band(dash_ideal);
        let mut ims_max = band(ims_ideal).1;
        let (mut ics_min, mut ics_max) = band(ics_ideal);

        // At high tolerance the dot and dash bands (and likewise the space
        // bands) would overlap, making classification ambiguous. Pin both
        // edges to the natural boundary of two units.
        let boundary = 2 * unit;
        if dot_max > dash_min {
            dot_max = boundary;
            dash_min = boundary;
        }
        if ims_max > ics_min {
            ims_max = boundary;
            ics_min = boundary;
        }

        // Requested extra inter-character spacing must still read as an
        // inter-character gap, not as end-of-word.
        let additional = settings.gap_units * unit;
        let adjustment = 7 * additional / 3;
        ics_max += additional + adjustment;

        Self {
            dot_ideal_us: dot_ideal,
            dash_ideal_us: dash_ideal,
            ims_ideal_us: ims_ideal,
            ics_ideal_us: ics_ideal,
            dot_min_us: dot_min,
            dot_max_us: dot_max,
            dash_min_us: dash_min,
            dash_max_us: dash_max,
            ims_max_us: ims_max,
            ics_min_us: ics_min,
            ics_max_us: ics_max,
            adaptive_threshold_us: boundary,
        }
    }

    /// Ranges for adaptive mode. The dot band is bounded only by the
    /// tracked threshold and the dash band is open above it, so a mark
    /// always classifies as one or the other.
    fn adaptive(threshold_us: u32) -> Self {
        let dot_ideal = threshold_us / 2;
        Self {
            dot_ideal_us: dot_ideal,
            dash_ideal_us: 3 * dot_ideal,
            ims_ideal_us: dot_ideal,
            ics_ideal_us: 3 * dot_ideal,
            dot_min_us: 0,
            dot_max_us: threshold_us,
            dash_min_us: threshold_us,
            dash_max_us: u32::MAX,
            ims_max_us: threshold_us,
            ics_min_us: threshold_us,
            ics_max_us: 5 * dot_ideal,
            adaptive_threshold_us: threshold_us,
        }
    }
}

/// Morse receive state machine with fixed and adaptive classification.
#[derive(Debug)]
pub struct Receiver {
    settings: ReceiverSettings,
    timing: ReceiveTiming,
    parameters_in_sync: bool,
    dot_tracker: AverageTracker,
    dash_tracker: AverageTracker,
    statistics: Statistics,
    state: State,
    error: bool,
    representation: String,
    mark_begin_us: u64,
    mark_end_us: u64,
    pending_inter_word_space: bool,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::from_validated(ReceiverSettings::default())
    }
}

impl Receiver {
    /// Create a receiver, validating every setting up front so bad
    /// parameters are rejected before they can skew classification.
    pub fn new(settings: ReceiverSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::from_validated(settings))
    }

    fn from_validated(settings: ReceiverSettings) -> Self {
        let unit = unit_duration_us(settings.speed_wpm);
        let mut receiver = Self {
            settings,
            timing: ReceiveTiming::fixed(&settings),
            parameters_in_sync: false,
            dot_tracker: AverageTracker::seeded(unit),
            dash_tracker: AverageTracker::seeded(3 * unit),
            statistics: Statistics::new(),
            state: State::Idle,
            error: false,
            representation: String::with_capacity(REPRESENTATION_CAPACITY),
            mark_begin_us: 0,
            mark_end_us: 0,
            pending_inter_word_space: false,
        };
        receiver.resync();
        receiver
    }

    // ---- parameters ----

    pub fn speed(&self) -> u32 {
        self.settings.speed_wpm
    }

    /// Set the expected sending speed. Fails while adaptive mode is on,
    /// where speed is derived from the signal instead.
    pub fn set_speed(&mut self, wpm: u32) -> Result<()> {
        if self.settings.adaptive {
            return Err(ReceiveError::NotPermitted {
                reason: "speed is tracked, not set, while adaptive mode is enabled",
            });
        }
        timing::validate_speed(wpm)?;
        if wpm != self.settings.speed_wpm {
            self.settings.speed_wpm = wpm;
            self.parameters_in_sync = false;
            self.resync();
        }
        Ok(())
    }

    pub fn tolerance(&self) -> u32 {
        self.settings.tolerance_percent
    }

    pub fn set_tolerance(&mut self, percent: u32) -> Result<()> {
        timing::validate_tolerance(percent)?;
        if percent != self.settings.tolerance_percent {
            self.settings.tolerance_percent = percent;
            self.parameters_in_sync = false;
            self.resync();
        }
        Ok(())
    }

    pub fn gap(&self) -> u32 {
        self.settings.gap_units
    }

    pub fn set_gap(&mut self, units: u32) -> Result<()> {
        timing::validate_gap(units)?;
        if units != self.settings.gap_units {
            self.settings.gap_units = units;
            self.parameters_in_sync = false;
            self.resync();
        }
        Ok(())
    }

    pub fn noise_spike_threshold(&self) -> u32 {
        self.settings.noise_spike_threshold_us
    }

    pub fn set_noise_spike_threshold(&mut self, threshold_us: u32) {
        self.settings.noise_spike_threshold_us = threshold_us;
    }

    pub fn is_adaptive(&self) -> bool {
        self.settings.adaptive
    }

    /// Enable or disable adaptive speed tracking. Enabling reseeds both
    /// trackers from the current speed's ideals so the first marks are
    /// judged against something sensible; disabling keeps whatever speed
    /// was tracked last.
    pub fn set_adaptive(&mut self, adaptive: bool) {
        if adaptive == self.settings.adaptive {
            return;
        }
        self.settings.adaptive = adaptive;
        if adaptive {
            let unit = unit_duration_us(self.settings.speed_wpm);
            self.dot_tracker.reseed(unit);
            self.dash_tracker.reseed(3 * unit);
        }
        self.parameters_in_sync = false;
        self.resync();
    }

    /// Current dot/dash boundary in microseconds.
    pub fn adaptive_speed_threshold(&self) -> u32 {
        self.timing.adaptive_threshold_us
    }

    /// RMS deviation from ideal for one duration category.
    pub fn deviation(&self, category: StatisticCategory) -> f64 {
        self.statistics.deviation(category)
    }

    pub fn state(&self) -> ReceiverState {
        match (self.state, self.error) {
            (State::Idle, _) => ReceiverState::Idle,
            (State::Mark, _) => ReceiverState::Mark,
            (State::InterMarkSpace, _) => ReceiverState::InterMarkSpace,
            (State::EndOfCharGap, false) => ReceiverState::EndOfCharacter,
            (State::EndOfCharGap, true) => ReceiverState::EndOfCharacterError,
            (State::EndOfWordGap, false) => ReceiverState::EndOfWord,
            (State::EndOfWordGap, true) => ReceiverState::EndOfWordError,
        }
    }

    /// The dot/dash symbols accumulated so far for the current character.
    pub fn representation(&self) -> &str {
        &self.representation
    }

    // ---- state machine ----

    /// Record the start of a mark (key down, carrier detected).
    ///
    /// Valid from idle or from an inter-mark space. A pending inter-word
    /// space from the last polled character is resolved here: the new mark
    /// proves the gap was only inter-character, so the receiver resets and
    /// starts the next character from idle.
    pub fn mark_begin(&mut self, timestamp_us: u64) -> Result<()> {
        if self.pending_inter_word_space {
            self.reset_state();
        }
        match self.state {
            State::Idle => {}
            State::InterMarkSpace => {
                let space = timestamp_delta_us(self.mark_end_us, timestamp_us)?;
                let timing = self.timing();
                // A gap past the inter-mark range never got polled; it is
                // not an inter-mark space, so keep it out of the jitter
                // statistics.
                if space <= timing.ims_max_us {
                    self.statistics.record(
                        StatisticCategory::InterMarkSpace,
                        space,
                        timing.ims_ideal_us,
                    );
                }
            }
            _ => {
                return Err(ReceiveError::BadState {
                    operation: "mark_begin",
                })
            }
        }
        self.mark_begin_us = timestamp_us;
        self.state = State::Mark;
        Ok(())
    }

    /// Record the end of a mark and classify its duration.
    ///
    /// Returns [`ReceiveError::NoiseSpike`] for marks at or below the
    /// configured noise threshold; the receiver is then exactly as it was
    /// before the matching `mark_begin`. Returns
    /// [`ReceiveError::UnrecognizedDuration`] when the duration fits
    /// neither the dot nor the dash band (fixed mode only); the character
    /// accumulated so far is kept and flagged so the eventual poll reports
    /// it with `is_error`.
    pub fn mark_end(&mut self, timestamp_us: u64) -> Result<()> {
        if self.state != State::Mark {
            return Err(ReceiveError::BadState {
                operation: "mark_end",
            });
        }
        let duration = timestamp_delta_us(self.mark_begin_us, timestamp_us)?;

        let threshold = self.settings.noise_spike_threshold_us;
        if threshold > 0 && duration <= threshold {
            // Unwind: pretend mark_begin never happened. mark_end_us was
            // never touched, so a later space still measures from the
            // previous real mark.
            self.state = if self.representation.is_empty() {
                State::Idle
            } else {
                State::InterMarkSpace
            };
            tracing::trace!(duration_us = duration, "mark rejected as noise spike");
            return Err(ReceiveError::NoiseSpike);
        }

        let timing = self.timing();
        let symbol = if duration >= timing.dot_min_us && duration <= timing.dot_max_us {
            self.statistics
                .record(StatisticCategory::Dot, duration, timing.dot_ideal_us);
            DOT
        } else if duration >= timing.dash_min_us && duration <= timing.dash_max_us {
            self.statistics
                .record(StatisticCategory::Dash, duration, timing.dash_ideal_us);
            DASH
        } else {
            // Cannot happen in adaptive mode, where the dash band is open
            // above the threshold.
            self.state = State::EndOfCharGap;
            self.error = true;
            self.mark_end_us = timestamp_us;
            return Err(ReceiveError::UnrecognizedDuration {
                duration_us: duration,
            });
        };

        if self.settings.adaptive {
            match symbol {
                DOT => self.dot_tracker.add(duration),
                _ => self.dash_tracker.add(duration),
            }
            self.parameters_in_sync = false;
            self.resync();
        }

        self.mark_end_us = timestamp_us;
        self.append_symbol(symbol)
    }

    /// Append an externally classified symbol, for callers that decode the
    /// key line themselves. Valid from idle or an inter-mark space.
    pub fn add_mark(&mut self, timestamp_us: u64, symbol: char) -> Result<()> {
        if self.state != State::Idle && self.state != State::InterMarkSpace {
            return Err(ReceiveError::BadState {
                operation: "add_mark",
            });
        }
        if symbol != DOT && symbol != DASH {
            return Err(morsekit_core::CoreError::InvalidRepresentation {
                representation: symbol.to_string(),
            }
            .into());
        }
        self.mark_end_us = timestamp_us;
        self.append_symbol(symbol)
    }

    fn append_symbol(&mut self, symbol: char) -> Result<()> {
        self.representation.push(symbol);
        if self.representation.len() >= REPRESENTATION_CAPACITY {
            self.state = State::EndOfCharGap;
            self.error = true;
            return Err(ReceiveError::BufferFull);
        }
        self.state = State::InterMarkSpace;
        Ok(())
    }

    /// Poll for a completed dot/dash sequence.
    ///
    /// From an inter-mark space, measures the silence since the last mark:
    /// not yet an inter-character gap means [`ReceiveError::WouldBlock`],
    /// an inter-character gap settles the character, anything longer
    /// settles it as end-of-word. A settled character re-polls
    /// idempotently without re-measuring.
    pub fn poll_representation(&mut self, timestamp_us: u64) -> Result<PolledRepresentation> {
        match self.state {
            State::Idle | State::Mark => {
                return Err(ReceiveError::BadState {
                    operation: "poll_representation",
                })
            }
            State::InterMarkSpace => {
                let space = timestamp_delta_us(self.mark_end_us, timestamp_us)?;
                let timing = self.timing();
                if space < timing.ics_min_us {
                    return Err(ReceiveError::WouldBlock);
                }
                if space <= timing.ics_max_us {
                    self.statistics.record(
                        StatisticCategory::InterCharacterSpace,
                        space,
                        timing.ics_ideal_us,
                    );
                    self.state = State::EndOfCharGap;
                } else {
                    self.state = State::EndOfWordGap;
                }
            }
            State::EndOfCharGap | State::EndOfWordGap => {}
        }
        Ok(PolledRepresentation {
            representation: self.representation.clone(),
            is_end_of_word: self.state == State::EndOfWordGap,
            is_error: self.error,
        })
    }

    /// Poll for a completed, decoded character.
    ///
    /// On success the receiver remembers whether the gap might still grow
    /// into an inter-word space; the next `mark_begin` resolves that
    /// bookkeeping automatically.
    pub fn poll_character(&mut self, timestamp_us: u64) -> Result<PolledCharacter> {
        let polled = self.poll_representation(timestamp_us)?;
        let character = charset::to_character(&polled.representation).ok_or_else(|| {
            ReceiveError::UnknownRepresentation {
                representation: polled.representation.clone(),
            }
        })?;
        self.pending_inter_word_space = !polled.is_end_of_word;
        Ok(PolledCharacter {
            character,
            is_end_of_word: polled.is_end_of_word,
            is_error: polled.is_error,
        })
    }

    /// Clear the buffer and return to idle. Learned adaptive parameters
    /// and statistics survive.
    pub fn reset_state(&mut self) {
        self.representation.clear();
        self.state = State::Idle;
        self.error = false;
        self.pending_inter_word_space = false;
    }

    /// Discard collected timing statistics.
    pub fn reset_statistics(&mut self) {
        self.statistics.reset();
    }

    // ---- derived timing ----

    fn timing(&mut self) -> ReceiveTiming {
        if !self.parameters_in_sync {
            self.resync();
        }
        self.timing
    }

    fn resync(&mut self) {
        if self.settings.adaptive {
            let threshold =
                speed_threshold_us(self.dot_tracker.average(), self.dash_tracker.average());
            let notional = if threshold == 0 {
                SPEED_MAX
            } else {
                2 * timing::DOT_CALIBRATION_US / threshold
            };
            let clamped = notional.clamp(SPEED_MIN, SPEED_MAX);
            if clamped != notional {
                // The tracked speed left the valid range. Fall back to the
                // clamped speed's ideals, reseed the trackers with them,
                // and rebuild the adaptive ranges from that fresh state.
                self.settings.speed_wpm = clamped;
                let unit = unit_duration_us(clamped);
                self.dot_tracker.reseed(unit);
                self.dash_tracker.reseed(3 * unit);
                self.timing = ReceiveTiming::adaptive(2 * unit);
            } else {
                self.settings.speed_wpm = clamped;
                self.timing = ReceiveTiming::adaptive(threshold);
            }
            tracing::trace!(
                threshold_us = self.timing.adaptive_threshold_us,
                speed_wpm = self.settings.speed_wpm,
                "adaptive timing resynchronized"
            );
        } else {
            self.timing = ReceiveTiming::fixed(&self.settings);
        }
        self.parameters_in_sync = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_receiver(speed_wpm: u32, tolerance_percent: u32) -> Receiver {
        Receiver::new(ReceiverSettings {
            speed_wpm,
            tolerance_percent,
            ..ReceiverSettings::default()
        })
        .unwrap()
    }

    /// Construction validates every setting; a zero speed in particular
    /// must come back as an error, not divide the calibration constant.
    #[test]
    fn new_rejects_out_of_range_settings() {
        for speed_wpm in [0, 3, 61, 200] {
            let result = Receiver::new(ReceiverSettings {
                speed_wpm,
                ..ReceiverSettings::default()
            });
            assert!(matches!(result.unwrap_err(), ReceiveError::Core(_)));
        }
        assert!(Receiver::new(ReceiverSettings {
            tolerance_percent: 91,
            ..ReceiverSettings::default()
        })
        .is_err());
        assert!(Receiver::new(ReceiverSettings {
            gap_units: 61,
            ..ReceiverSettings::default()
        })
        .is_err());
        assert_eq!(Receiver::new(ReceiverSettings::default()).unwrap().speed(), 12);
    }

    /// At 20 WPM, dot + space + dash followed by a long gap decodes as 'A'
    /// with end-of-word set; polling before enough silence has elapsed
    /// reports WouldBlock.
    #[test]
    fn decodes_letter_a_end_to_end() {
        let mut rx = fixed_receiver(20, 50);

        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap(); // dot
        rx.mark_begin(120_000).unwrap(); // 60 ms inter-mark space
        rx.mark_end(300_000).unwrap(); // dash
        assert_eq!(rx.state(), ReceiverState::InterMarkSpace);

        // 50 ms of silence: not yet an inter-character gap (ics_min is
        // 90 ms at 50% tolerance).
        assert_eq!(
            rx.poll_character(350_000).unwrap_err(),
            ReceiveError::WouldBlock
        );

        // 300 ms of silence exceeds ics_max (270 ms): end of word.
        let polled = rx.poll_character(600_000).unwrap();
        assert_eq!(polled.character, 'A');
        assert!(polled.is_end_of_word);
        assert!(!polled.is_error);
        assert_eq!(rx.state(), ReceiverState::EndOfWord);
    }

    #[test]
    fn character_gap_settles_without_end_of_word() {
        let mut rx = fixed_receiver(20, 50);

        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap();
        // 180 ms of silence is inside [90 ms, 270 ms]: inter-character.
        let polled = rx.poll_character(240_000).unwrap();
        assert_eq!(polled.character, 'E');
        assert!(!polled.is_end_of_word);

        // Re-poll is idempotent.
        let again = rx.poll_representation(241_000).unwrap();
        assert_eq!(again.representation, ".");
        assert!(!again.is_end_of_word);
    }

    #[test]
    fn pending_inter_word_space_resolved_by_next_mark() {
        let mut rx = fixed_receiver(20, 50);

        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap();
        let polled = rx.poll_character(240_000).unwrap();
        assert!(!polled.is_end_of_word);

        // A new mark proves the gap was only inter-character; the receiver
        // resets itself and accepts the mark.
        rx.mark_begin(260_000).unwrap();
        rx.mark_end(440_000).unwrap(); // dash
        let polled = rx.poll_character(640_000).unwrap();
        assert_eq!(polled.character, 'T');
    }

    /// A sub-threshold mark is rejected and the receiver is exactly as it
    /// was before the mark began, including the old mark-end timestamp.
    #[test]
    fn noise_spike_is_rejected_and_state_restored() {
        let mut rx = fixed_receiver(20, 50);
        rx.set_noise_spike_threshold(5_000);

        // From idle with an empty buffer.
        rx.mark_begin(0).unwrap();
        assert_eq!(rx.mark_end(2_000).unwrap_err(), ReceiveError::NoiseSpike);
        assert_eq!(rx.state(), ReceiverState::Idle);
        assert!(rx.representation().is_empty());

        // From an inter-mark space with one dot buffered.
        rx.mark_begin(10_000).unwrap();
        rx.mark_end(70_000).unwrap();
        rx.mark_begin(100_000).unwrap();
        assert_eq!(rx.mark_end(102_000).unwrap_err(), ReceiveError::NoiseSpike);
        assert_eq!(rx.state(), ReceiverState::InterMarkSpace);
        assert_eq!(rx.representation(), ".");

        // The space is still measured from the real mark's end at 70 ms,
        // so a poll at 250 ms sees a 180 ms inter-character gap.
        let polled = rx.poll_character(250_000).unwrap();
        assert_eq!(polled.character, 'E');
    }

    /// A mark that fits neither band is a hard error on its own terms; the
    /// mark's duration is never compared against space thresholds to pick
    /// a gap type.
    #[test]
    fn unclassifiable_mark_is_a_plain_hard_error() {
        let mut rx = fixed_receiver(20, 20);

        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap();
        rx.mark_begin(120_000).unwrap();
        // 100 ms fits neither [48, 72] ms nor [144, 216] ms.
        assert_eq!(
            rx.mark_end(220_000).unwrap_err(),
            ReceiveError::UnrecognizedDuration {
                duration_us: 100_000
            }
        );
        assert_eq!(rx.state(), ReceiverState::EndOfCharacterError);

        // The accumulated dot is still delivered, flagged as an error.
        let polled = rx.poll_representation(400_000).unwrap();
        assert_eq!(polled.representation, ".");
        assert!(polled.is_error);
        assert!(!polled.is_end_of_word);
    }

    #[test]
    fn buffer_full_flags_the_character() {
        let mut rx = fixed_receiver(20, 50);

        let mut t = 0u64;
        for i in 0..REPRESENTATION_CAPACITY {
            rx.mark_begin(t).unwrap();
            let result = rx.mark_end(t + 60_000);
            if i + 1 < REPRESENTATION_CAPACITY {
                result.unwrap();
            } else {
                assert_eq!(result.unwrap_err(), ReceiveError::BufferFull);
            }
            t += 120_000;
        }
        assert_eq!(rx.state(), ReceiverState::EndOfCharacterError);

        // Eight dots decode to nothing.
        let polled = rx.poll_representation(t).unwrap();
        assert!(polled.is_error);
        assert_eq!(
            rx.poll_character(t).unwrap_err(),
            ReceiveError::UnknownRepresentation {
                representation: "........".into()
            }
        );
    }

    #[test]
    fn sequencing_errors_are_bad_state() {
        let mut rx = fixed_receiver(20, 50);

        assert!(matches!(
            rx.mark_end(100).unwrap_err(),
            ReceiveError::BadState { .. }
        ));
        assert!(matches!(
            rx.poll_representation(100).unwrap_err(),
            ReceiveError::BadState { .. }
        ));

        rx.mark_begin(0).unwrap();
        assert!(matches!(
            rx.mark_begin(1_000).unwrap_err(),
            ReceiveError::BadState { .. }
        ));
        assert!(matches!(
            rx.add_mark(1_000, DOT).unwrap_err(),
            ReceiveError::BadState { .. }
        ));
        // Polling mid-mark is also a sequencing error.
        assert!(matches!(
            rx.poll_representation(1_000).unwrap_err(),
            ReceiveError::BadState { .. }
        ));
    }

    #[test]
    fn backwards_timestamps_are_rejected() {
        let mut rx = fixed_receiver(20, 50);
        rx.mark_begin(100_000).unwrap();
        assert!(matches!(
            rx.mark_end(40_000).unwrap_err(),
            ReceiveError::Core(_)
        ));
    }

    #[test]
    fn add_mark_accepts_preclassified_symbols() {
        let mut rx = fixed_receiver(20, 50);

        rx.add_mark(60_000, DOT).unwrap();
        rx.add_mark(300_000, DASH).unwrap();
        let polled = rx.poll_character(500_000).unwrap();
        assert_eq!(polled.character, 'A');

        rx.reset_state();
        assert!(matches!(
            rx.add_mark(600_000, 'x').unwrap_err(),
            ReceiveError::Core(_)
        ));
    }

    #[test]
    fn reset_state_keeps_learned_parameters() {
        let mut rx = fixed_receiver(20, 50);
        rx.set_adaptive(true);
        // Four dashes at 25 WPM shift the dash tracker.
        let mut t = 0u64;
        for _ in 0..4 {
            rx.mark_begin(t).unwrap();
            rx.mark_end(t + 144_000).unwrap();
            rx.reset_state();
            t += 400_000;
        }
        let threshold = rx.adaptive_speed_threshold();
        rx.reset_state();
        assert_eq!(rx.adaptive_speed_threshold(), threshold);
        assert_eq!(rx.state(), ReceiverState::Idle);
    }

    /// Feeding 25 WPM timing to an adaptive receiver seeded at 20 WPM
    /// converges the threshold to 25 WPM's boundary within a few
    /// characters.
    #[test]
    fn adaptive_tracking_converges() {
        let mut rx = fixed_receiver(20, 50);
        rx.set_adaptive(true);

        // 25 WPM: dot 48 ms, dash 144 ms, boundary 96 ms.
        let mut t = 0u64;
        for _ in 0..10 {
            rx.mark_begin(t).unwrap();
            rx.mark_end(t + 48_000).unwrap();
            rx.mark_begin(t + 96_000).unwrap();
            rx.mark_end(t + 240_000).unwrap();
            rx.reset_state();
            t += 600_000;
        }

        let threshold = rx.adaptive_speed_threshold() as f64;
        assert!(
            (threshold - 96_000.0).abs() / 96_000.0 < 0.05,
            "threshold {} did not converge near 96000",
            threshold
        );
        assert_eq!(rx.speed(), 25);
    }

    /// When the tracked speed leaves the valid range, the receiver clamps
    /// it and rebuilds its trackers from the clamped speed's ideals.
    #[test]
    fn adaptive_speed_clamps_to_valid_range() {
        let mut rx = fixed_receiver(60, 50);
        rx.set_adaptive(true);

        // Absurdly fast keying: 5 ms dots, pushing the notional speed
        // past 60 WPM after every mark.
        let mut t = 0u64;
        for _ in 0..6 {
            rx.mark_begin(t).unwrap();
            rx.mark_end(t + 5_000).unwrap();
            rx.reset_state();
            t += 100_000;
        }

        assert_eq!(rx.speed(), 60);
        // Trackers reseeded from 60 WPM ideals: boundary 40 ms.
        assert_eq!(rx.adaptive_speed_threshold(), 40_000);
    }

    #[test]
    fn set_speed_fails_while_adaptive() {
        let mut rx = fixed_receiver(20, 50);
        rx.set_adaptive(true);
        assert!(matches!(
            rx.set_speed(30).unwrap_err(),
            ReceiveError::NotPermitted { .. }
        ));
        rx.set_adaptive(false);
        rx.set_speed(30).unwrap();
        assert_eq!(rx.speed(), 30);
    }

    #[test]
    fn parameter_validation() {
        let mut rx = fixed_receiver(20, 50);
        assert!(rx.set_speed(3).is_err());
        assert!(rx.set_speed(61).is_err());
        assert_eq!(rx.speed(), 20);
        assert!(rx.set_tolerance(91).is_err());
        assert_eq!(rx.tolerance(), 50);
        assert!(rx.set_gap(61).is_err());
    }

    #[test]
    fn high_tolerance_bands_do_not_overlap() {
        // 90% tolerance would push dot_max past dash_min without the
        // boundary clamp; a 2.5 unit mark must still classify as a dash.
        let mut rx = fixed_receiver(20, 90);
        rx.mark_begin(0).unwrap();
        rx.mark_end(150_000).unwrap();
        assert_eq!(rx.representation(), "-");
    }

    #[test]
    fn statistics_track_timing_jitter() {
        let mut rx = fixed_receiver(20, 50);

        // Perfectly timed dot then a dot 6 ms long of ideal.
        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap();
        rx.mark_begin(120_000).unwrap();
        rx.mark_end(186_000).unwrap();
        let dot_dev = rx.deviation(StatisticCategory::Dot);
        assert!(dot_dev > 0.0);
        assert!((dot_dev - (36_000_000.0f64 / 2.0).sqrt()).abs() < 1.0);

        rx.reset_statistics();
        assert_eq!(rx.deviation(StatisticCategory::Dot), 0.0);
    }

    /// An unpolled gap longer than the inter-mark range stays out of the
    /// inter-mark jitter statistics.
    #[test]
    fn overlong_gap_is_not_an_inter_mark_statistic() {
        let mut rx = fixed_receiver(20, 50);

        // ims_max is 90 ms at 50% tolerance; a 200 ms gap is no inter-mark
        // space even though the caller never polled it.
        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap();
        rx.mark_begin(260_000).unwrap();
        rx.mark_end(320_000).unwrap();
        assert_eq!(rx.deviation(StatisticCategory::InterMarkSpace), 0.0);

        // A 66 ms gap is inside the range and does get recorded.
        rx.mark_begin(386_000).unwrap();
        rx.mark_end(446_000).unwrap();
        assert!(rx.deviation(StatisticCategory::InterMarkSpace) > 0.0);
    }

    #[test]
    fn extra_gap_widens_character_window() {
        let mut rx = fixed_receiver(20, 50);
        rx.set_gap(2).unwrap();

        rx.mark_begin(0).unwrap();
        rx.mark_end(60_000).unwrap();
        // 400 ms would be end-of-word at gap 0 (ics_max 270 ms) but the
        // widened window (270 + 120 + 280 ms) keeps it inter-character.
        let polled = rx.poll_character(460_000).unwrap();
        assert_eq!(polled.character, 'E');
        assert!(!polled.is_end_of_word);
    }
}
