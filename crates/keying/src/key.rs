//! Physical key models
//!
//! A straight key turns its own open/closed value directly into generator
//! tones; a paddle key feeds the iambic keyer engine. Both report key-value
//! transitions to an optional listener so external layers (a receiver, an
//! indicator LED) can observe keying independently of the audio path.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::generator::Generator;
use crate::keyer::IambicKeyer;

/// Notified on every key-value transition with the new value.
///
/// Fired synchronously from whichever thread caused the transition (a
/// caller for straight keys, the generator's background thread for keyer
/// elements); implementations must not block.
pub trait KeyEventListener: Send {
    fn on_key_value(&self, closed: bool);
}

/// A straight key: open/closed drives the generator directly with
/// open-ended tones, since the duration of a press is unknown in advance.
pub struct StraightKey {
    generator: Arc<Generator>,
    state: Mutex<StraightKeyState>,
}

struct StraightKeyState {
    closed: bool,
    listener: Option<Box<dyn KeyEventListener>>,
}

impl StraightKey {
    pub fn new(generator: Arc<Generator>) -> Self {
        Self {
            generator,
            state: Mutex::new(StraightKeyState {
                closed: false,
                listener: None,
            }),
        }
    }

    /// Register the key-value listener, replacing any previous one.
    pub fn set_listener(&self, listener: Box<dyn KeyEventListener>) {
        self.state.lock().unwrap().listener = Some(listener);
    }

    /// Current key value.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Record a new key value. A no-op when the value is unchanged;
    /// otherwise keys the generator and notifies the listener.
    pub fn set_value(&self, closed: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed == closed {
            return Ok(());
        }
        if closed {
            self.generator.enqueue_forever_tone()?;
        } else {
            self.generator.enqueue_forever_silence()?;
        }
        state.closed = closed;
        if let Some(listener) = state.listener.as_ref() {
            listener.on_key_value(closed);
        }
        Ok(())
    }
}

/// A dual-paddle key driving the iambic keyer engine.
pub struct PaddleKey {
    keyer: Arc<IambicKeyer>,
    paddles: Mutex<(bool, bool)>,
}

impl PaddleKey {
    /// Create a paddle key for `generator`, with the given Curtis mode.
    pub fn new(generator: Arc<Generator>, curtis_mode_b: bool) -> Self {
        Self {
            keyer: IambicKeyer::new(generator, curtis_mode_b),
            paddles: Mutex::new((false, false)),
        }
    }

    /// The keyer engine this key drives.
    pub fn keyer(&self) -> &Arc<IambicKeyer> {
        &self.keyer
    }

    /// Current (dot, dash) paddle values.
    pub fn paddles(&self) -> (bool, bool) {
        *self.paddles.lock().unwrap()
    }

    /// Record new paddle values and forward them to the keyer.
    pub fn notify_paddle_event(&self, dot_closed: bool, dash_closed: bool) -> Result<()> {
        *self.paddles.lock().unwrap() = (dot_closed, dash_closed);
        self.keyer.notify_paddle_event(dot_closed, dash_closed)
    }
}
