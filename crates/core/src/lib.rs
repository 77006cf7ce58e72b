//! MorseKit Core - timing primitives and the character table
//!
//! This crate provides the shared timing model (WPM ↔ microsecond
//! conversions, parameter bounds) and the character ↔ representation table
//! used by both the sending and receiving engines.

pub mod charset;
pub mod error;
pub mod timing;

pub use error::{CoreError, Result};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        charset::{is_valid_character, is_valid_representation, to_character, to_representation},
        error::{CoreError, Result},
        timing::{unit_duration_us, SPEED_MAX, SPEED_MIN},
    };
}
