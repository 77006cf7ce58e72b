//! Transmitter configuration and implementation

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use morsekit_keying::error::{KeyingError, Result as KeyingResult};
use morsekit_keying::prelude::*;

/// Transmitter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "tx")]
#[command(about = "MorseKit transmitter tool")]
pub struct TxConfig {
    /// Output file path (WAV audio)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Input text to transmit
    #[arg(short, long)]
    pub text: Option<String>,

    /// Input file path (text file)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Sending speed in words per minute
    #[arg(short, long, default_value = "20")]
    pub speed: u32,

    /// Tone frequency in Hz
    #[arg(long, default_value = "700")]
    pub frequency: u32,

    /// Volume in percent
    #[arg(long, default_value = "70")]
    pub volume: u32,

    /// Extra inter-character spacing in dot units
    #[arg(long, default_value = "0")]
    pub gap: u32,

    /// Dot/dash weighting in percent (50 is neutral)
    #[arg(long, default_value = "50")]
    pub weighting: u32,

    /// Sample rate in Hz
    #[arg(long, default_value = "48000")]
    pub sample_rate: u32,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output.wav"),
            text: None,
            file: None,
            speed: 20,
            frequency: 700,
            volume: 70,
            gap: 0,
            weighting: 50,
            sample_rate: 48000,
            verbose: false,
        }
    }
}

/// Sink that renders tones into a 16-bit mono WAV file.
///
/// Keeps the sine phase across tones so back-to-back marks are
/// click-free, and shapes each mark's rise and fall with the tone's
/// slope.
pub struct WavSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
    sample_rate: u32,
    amplitude: f64,
    phase: f64,
}

impl WavSink {
    pub fn new(path: &Path, volume_percent: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: None,
            sample_rate: 48000,
            amplitude: f64::from(volume_percent.min(100)) / 100.0,
            phase: 0.0,
        }
    }

    fn writer(&mut self) -> KeyingResult<&mut hound::WavWriter<std::io::BufWriter<std::fs::File>>> {
        self.writer.as_mut().ok_or(KeyingError::NotRunning)
    }

    fn sink_err(e: impl std::fmt::Display) -> KeyingError {
        KeyingError::SinkFailed { msg: e.to_string() }
    }

    fn envelope(shape: SlopeShape, progress: f64) -> f64 {
        match shape {
            SlopeShape::Rectangular => 1.0,
            SlopeShape::Linear => progress,
            SlopeShape::RaisedCosine => 0.5 * (1.0 - (PI * progress).cos()),
            SlopeShape::Sine => (PI / 2.0 * progress).sin(),
        }
    }
}

impl Sink for WavSink {
    fn configure(&mut self, sample_rate: u32) -> KeyingResult<()> {
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn start(&mut self) -> KeyingResult<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec).map_err(Self::sink_err)?;
        self.writer = Some(writer);
        self.phase = 0.0;
        Ok(())
    }

    fn stop(&mut self) -> KeyingResult<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(Self::sink_err)?;
        }
        Ok(())
    }

    fn play_tone(&mut self, tone: &Tone, slope_duration_us: u32) -> KeyingResult<()> {
        let sample_rate = self.sample_rate;
        let amplitude = self.amplitude;
        let num_samples =
            (u64::from(tone.duration_us) * u64::from(sample_rate) / 1_000_000) as usize;

        if tone.is_silent() {
            let writer = self.writer()?;
            for _ in 0..num_samples {
                writer.write_sample(0i16).map_err(Self::sink_err)?;
            }
            return Ok(());
        }

        let slope_samples =
            (u64::from(slope_duration_us) * u64::from(sample_rate) / 1_000_000) as usize;
        let slope_samples = slope_samples.min(num_samples / 2);
        let omega = 2.0 * PI * f64::from(tone.frequency_hz) / f64::from(sample_rate);
        let shape = tone.slope;

        let mut phase = self.phase;
        let writer = self.writer()?;
        for i in 0..num_samples {
            let mut gain = 1.0;
            if slope_samples > 0 {
                if i < slope_samples {
                    gain = Self::envelope(shape, i as f64 / slope_samples as f64);
                } else if i >= num_samples - slope_samples {
                    let progress = (num_samples - 1 - i) as f64 / slope_samples as f64;
                    gain = Self::envelope(shape, progress);
                }
            }
            let value = amplitude * gain * phase.sin();
            let sample = (value * 32767.0).clamp(-32767.0, 32767.0) as i16;
            writer.write_sample(sample).map_err(Self::sink_err)?;
            phase += omega;
            if phase >= 2.0 * PI {
                phase -= 2.0 * PI;
            }
        }
        self.phase = phase;
        Ok(())
    }

    fn play_forever(&mut self, _frequency_hz: u32) -> KeyingResult<()> {
        // A file has no notion of "until further notice"; straight-key
        // output needs a live audio backend.
        tracing::warn!("forever tones cannot be rendered to a WAV file, ignoring");
        Ok(())
    }

    fn silence_now(&mut self) -> KeyingResult<()> {
        Ok(())
    }
}

/// MorseKit transmitter: renders text to a WAV file through a generator.
pub struct Transmitter {
    config: TxConfig,
}

impl Transmitter {
    /// Create a new transmitter with the given configuration
    pub fn new(config: TxConfig) -> Result<Self> {
        if config.text.is_none() && config.file.is_none() {
            anyhow::bail!("Either text or file must be specified");
        }
        Ok(Self { config })
    }

    /// Render the configured message and return the decoded text that was
    /// sent.
    pub fn transmit(&self) -> Result<String> {
        let text = if let Some(text) = &self.config.text {
            text.clone()
        } else if let Some(file) = &self.config.file {
            std::fs::read_to_string(file)?
        } else {
            anyhow::bail!("No text or file specified");
        };

        // Drop anything the character table cannot express rather than
        // failing the whole transmission.
        let sendable: String = text
            .chars()
            .filter(|c| {
                let known = morsekit_core::charset::is_valid_character(*c);
                if !known {
                    tracing::warn!(character = %c, "skipping unsendable character");
                }
                known
            })
            .collect();

        if self.config.verbose {
            println!("Transmitting: {}", sendable);
        }

        let settings = GeneratorSettings {
            speed_wpm: self.config.speed,
            frequency_hz: self.config.frequency,
            volume_percent: self.config.volume,
            gap_units: self.config.gap,
            weighting_percent: self.config.weighting,
            ..GeneratorSettings::default()
        };

        let sink = WavSink::new(&self.config.output, self.config.volume);
        let generator = Generator::with_settings(Box::new(sink), settings)?;
        generator.set_sample_rate(self.config.sample_rate)?;

        generator.enqueue_string(&sendable)?;
        let tones = generator.queue_length();
        generator.start()?;
        generator.wait_for_queue_level(0);
        // stop() joins the drain thread and finalizes the WAV header.
        generator.stop();

        if self.config.verbose {
            println!("Rendered {} tones to {:?}", tones, self.config.output);
        }
        Ok(sendable)
    }
}
