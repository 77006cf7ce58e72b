//! MorseKit RX - decode Morse audio from a WAV file

use anyhow::Result;
use clap::Parser;
use morsekit_tools::{read_wav, text_of, Decoder, RxConfig};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().init();

    let config = RxConfig::parse();

    let (samples, sample_rate) = read_wav(&config.input)?;
    if config.verbose {
        println!("Read {} samples at {} Hz", samples.len(), sample_rate);
    }

    let mut decoder = Decoder::new(&config)?;
    let decoded = decoder.decode(&samples, sample_rate)?;

    if config.json {
        for character in &decoded {
            println!("{}", serde_json::to_string(character)?);
        }
    } else {
        println!("{}", text_of(&decoded));
    }

    if config.adaptive && config.verbose {
        println!("Tracked speed: {} WPM", decoder.speed());
    }

    if let Some(path) = &config.output {
        std::fs::write(path, text_of(&decoded))?;
    }

    Ok(())
}
