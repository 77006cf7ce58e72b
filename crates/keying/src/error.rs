//! Error types for MorseKit Keying

use thiserror::Error;

/// Keying error types
#[derive(Error, Debug)]
pub enum KeyingError {
    #[error("Tone queue is full")]
    QueueFull,

    #[error("Watermark level {level} out of range (capacity {capacity})")]
    InvalidWatermarkLevel { level: usize, capacity: usize },

    #[error("Queue tail is not an unambiguous whole character")]
    NotRemovable,

    #[error("Waiting for the keyer would deadlock: a paddle is still closed")]
    WouldDeadlock,

    #[error("Generator is not running")]
    NotRunning,

    #[error("Audio sink failed: {msg}")]
    SinkFailed { msg: String },

    #[error("Core error: {0}")]
    Core(#[from] morsekit_core::CoreError),
}

/// Result type for MorseKit Keying operations
pub type Result<T> = std::result::Result<T, KeyingError>;
