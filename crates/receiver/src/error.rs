//! Error types for MorseKit Receiver

use thiserror::Error;

/// Receive error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReceiveError {
    #[error("{operation} not valid in the current receiver state")]
    BadState { operation: &'static str },

    #[error("Mark rejected as a noise spike")]
    NoiseSpike,

    #[error("Not enough silence yet to settle the character")]
    WouldBlock,

    #[error("Mark duration {duration_us} us matches neither dot nor dash")]
    UnrecognizedDuration { duration_us: u32 },

    #[error("Representation buffer full")]
    BufferFull,

    #[error("No character assigned to representation {representation:?}")]
    UnknownRepresentation { representation: String },

    #[error("Not permitted: {reason}")]
    NotPermitted { reason: &'static str },

    #[error("Core error: {0}")]
    Core(#[from] morsekit_core::CoreError),
}

impl ReceiveError {
    /// True for the try-again conditions a polling loop should retry
    /// rather than surface: too-early polls and rejected noise spikes.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReceiveError::WouldBlock | ReceiveError::NoiseSpike)
    }
}

/// Result type for MorseKit Receiver operations
pub type Result<T> = std::result::Result<T, ReceiveError>;
