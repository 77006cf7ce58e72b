//! MorseKit Keying - the sending side of the engine
//!
//! This crate provides the bounded tone queue, the generator that drains it
//! into an abstract audio sink from a background thread, the iambic keyer
//! state machine, and the straight/paddle key models that drive it all.

pub mod error;
pub mod generator;
pub mod key;
pub mod keyer;
pub mod queue;
pub mod sink;
pub mod tone;

pub use error::{KeyingError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        error::{KeyingError, Result},
        generator::{Generator, GeneratorSettings, Mark, ToneEndListener},
        key::{KeyEventListener, PaddleKey, StraightKey},
        keyer::{GraphState, IambicKeyer},
        queue::{LowWatermark, ToneQueue},
        sink::{CaptureSink, NullSink, Sink, SinkEvent},
        tone::{SlopeShape, Tone, ToneMarker},
    };
}
