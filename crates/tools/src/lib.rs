//! MorseKit Tools library

pub mod rx;
pub mod tx;

pub use rx::{read_wav, text_of, DecodedCharacter, Decoder, RxConfig};
pub use tx::{Transmitter, TxConfig, WavSink};
