//! MorseKit Receiver - the decoding side of the engine
//!
//! This crate turns key-up/key-down timestamps into text: a state machine
//! classifies mark and space durations against either fixed tolerance bands
//! or an adaptively tracked speed threshold, accumulates dot/dash symbols,
//! and yields decoded characters through a non-blocking polling interface.

pub mod error;
pub mod receiver;
pub mod stats;
pub mod tracking;

pub use error::{ReceiveError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        error::{ReceiveError, Result},
        receiver::{
            PolledCharacter, PolledRepresentation, Receiver, ReceiverSettings, ReceiverState,
        },
        stats::{StatisticCategory, Statistics},
        tracking::AverageTracker,
    };
}
