//! MorseKit TX - render Morse text into a WAV file

use anyhow::Result;
use clap::Parser;
use morsekit_tools::{Transmitter, TxConfig};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().init();

    let config = TxConfig::parse();
    let output = config.output.clone();

    let transmitter = Transmitter::new(config)?;
    let sent = transmitter.transmit()?;

    println!("Sent {:?} to {:?}", sent, output);
    Ok(())
}
