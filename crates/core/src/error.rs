//! Error types for MorseKit Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("{parameter} out of range: {value} (valid {min}..={max})")]
    ValueOutOfRange {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid representation: {representation:?}")]
    InvalidRepresentation { representation: String },

    #[error("Unknown character: {character:?}")]
    UnknownCharacter { character: char },

    #[error("Unknown representation: {representation:?}")]
    UnknownRepresentation { representation: String },

    #[error("Timestamps not monotonic: {earlier_us} followed by {later_us}")]
    NonMonotonicTimestamps { earlier_us: u64, later_us: u64 },
}

/// Result type for MorseKit Core operations
pub type Result<T> = std::result::Result<T, CoreError>;
