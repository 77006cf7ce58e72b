//! Morse timing primitives
//!
//! Everything in the engine is derived from one number: the duration of a
//! single dot at a given speed. The calibration follows the "PARIS"
//! standard, where one word is 50 dot units, so a dot lasts
//! `1_200_000 / wpm` microseconds.

use crate::{CoreError, Result};

/// Microseconds of one dot unit at 1 WPM ("PARIS" calibration).
pub const DOT_CALIBRATION_US: u32 = 1_200_000;

/// Valid sending/receiving speed range, words per minute.
pub const SPEED_MIN: u32 = 4;
pub const SPEED_MAX: u32 = 60;

/// Valid tone frequency range, Hz. Zero means silence.
pub const FREQUENCY_MIN: u32 = 0;
pub const FREQUENCY_MAX: u32 = 4_000;

/// Valid volume range, percent.
pub const VOLUME_MIN: u32 = 0;
pub const VOLUME_MAX: u32 = 100;

/// Valid extra inter-character gap range, dot units.
pub const GAP_MIN: u32 = 0;
pub const GAP_MAX: u32 = 60;

/// Valid dot/dash weighting range, percent. 50 is neutral.
pub const WEIGHTING_MIN: u32 = 20;
pub const WEIGHTING_MAX: u32 = 80;

/// Valid receive tolerance range, percent of the ideal duration.
pub const TOLERANCE_MIN: u32 = 0;
pub const TOLERANCE_MAX: u32 = 90;

/// Duration of one dot unit in microseconds at the given speed.
///
/// Strictly decreasing in `speed_wpm`; the caller is expected to have
/// validated the speed first.
#[inline]
pub fn unit_duration_us(speed_wpm: u32) -> u32 {
    DOT_CALIBRATION_US / speed_wpm
}

/// Nominal speed in WPM for a given dot duration, unclamped.
#[inline]
pub fn speed_for_unit_duration(unit_us: u32) -> u32 {
    if unit_us == 0 {
        return SPEED_MAX;
    }
    DOT_CALIBRATION_US / unit_us
}

fn check_range(parameter: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(CoreError::ValueOutOfRange {
            parameter,
            value: value as i64,
            min: min as i64,
            max: max as i64,
        });
    }
    Ok(())
}

pub fn validate_speed(wpm: u32) -> Result<()> {
    check_range("speed", wpm, SPEED_MIN, SPEED_MAX)
}

pub fn validate_frequency(hz: u32) -> Result<()> {
    check_range("frequency", hz, FREQUENCY_MIN, FREQUENCY_MAX)
}

pub fn validate_volume(percent: u32) -> Result<()> {
    check_range("volume", percent, VOLUME_MIN, VOLUME_MAX)
}

pub fn validate_gap(units: u32) -> Result<()> {
    check_range("gap", units, GAP_MIN, GAP_MAX)
}

pub fn validate_weighting(percent: u32) -> Result<()> {
    check_range("weighting", percent, WEIGHTING_MIN, WEIGHTING_MAX)
}

pub fn validate_tolerance(percent: u32) -> Result<()> {
    check_range("tolerance", percent, TOLERANCE_MIN, TOLERANCE_MAX)
}

/// Difference between two event timestamps in microseconds.
///
/// Timestamps are expected to be monotonically non-decreasing; a backwards
/// pair is a caller sequencing error, not something to silently clamp.
#[inline]
pub fn timestamp_delta_us(earlier_us: u64, later_us: u64) -> Result<u32> {
    if later_us < earlier_us {
        return Err(CoreError::NonMonotonicTimestamps {
            earlier_us,
            later_us,
        });
    }
    Ok((later_us - earlier_us) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn speed_round_trips_through_unit_duration(seed: u32) -> bool {
        let wpm = SPEED_MIN + seed % (SPEED_MAX - SPEED_MIN + 1);
        speed_for_unit_duration(unit_duration_us(wpm)) == wpm
    }

    #[test]
    fn paris_calibration() {
        // 20 WPM = 60 ms dots, 25 WPM = 48 ms dots
        assert_eq!(unit_duration_us(20), 60_000);
        assert_eq!(unit_duration_us(25), 48_000);
        assert_eq!(unit_duration_us(4), 300_000);
        assert_eq!(unit_duration_us(60), 20_000);
    }

    #[test]
    fn unit_duration_strictly_decreasing() {
        let mut prev = u32::MAX;
        for wpm in SPEED_MIN..=SPEED_MAX {
            let unit = unit_duration_us(wpm);
            assert!(unit < prev, "unit not decreasing at {} WPM", wpm);
            prev = unit;
        }
    }

    #[test]
    fn range_validation() {
        assert!(validate_speed(4).is_ok());
        assert!(validate_speed(60).is_ok());
        assert!(validate_speed(3).is_err());
        assert!(validate_speed(61).is_err());
        assert!(validate_weighting(19).is_err());
        assert!(validate_weighting(50).is_ok());
        assert!(validate_tolerance(91).is_err());
    }

    #[test]
    fn timestamp_delta_checks_order() {
        assert_eq!(timestamp_delta_us(100, 160).unwrap(), 60);
        assert_eq!(timestamp_delta_us(100, 100).unwrap(), 0);
        assert!(timestamp_delta_us(160, 100).is_err());
    }
}
