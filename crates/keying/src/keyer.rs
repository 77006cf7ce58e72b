//! Iambic keyer engine
//!
//! A state machine over nine graph states: idle, in-dot, in-dash,
//! after-dot, after-dash, the last four each in a Curtis mode A and mode B
//! variant. Paddle events arrive from the caller; clock ticks arrive from
//! the generator's background thread, once per completed tone, so keying
//! and audio stay phase-locked.
//!
//! All state sits behind one mutex and every transition happens under it,
//! which makes re-entrant clocking structurally impossible.

use std::sync::{Arc, Condvar, Mutex, Weak};

use crate::error::{KeyingError, Result};
use crate::generator::{Generator, Mark, ToneEndListener};
use crate::key::KeyEventListener;

/// The keyer's position in its state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Idle,
    InDotA,
    InDotB,
    InDashA,
    InDashB,
    AfterDotA,
    AfterDotB,
    AfterDashA,
    AfterDashB,
}

impl GraphState {
    /// True in the in-dot/in-dash states, where the key is closed.
    #[inline]
    pub fn is_sending(self) -> bool {
        matches!(
            self,
            GraphState::InDotA | GraphState::InDotB | GraphState::InDashA | GraphState::InDashB
        )
    }

    /// True in the after-dot/after-dash states, where the inter-element
    /// space is playing.
    #[inline]
    pub fn is_after(self) -> bool {
        matches!(
            self,
            GraphState::AfterDotA
                | GraphState::AfterDotB
                | GraphState::AfterDashA
                | GraphState::AfterDashB
        )
    }
}

#[derive(Debug)]
struct KeyerState {
    graph_state: GraphState,
    /// What the key is doing right now, distinct from the paddle values.
    key_value_closed: bool,
    dot_paddle: bool,
    dash_paddle: bool,
    /// Set when a paddle closes; cleared only once its element has been
    /// sent and the paddle has been seen open again.
    dot_latch: bool,
    dash_latch: bool,
    curtis_mode_b: bool,
    /// One-shot latch set when both paddles are closed in mode B.
    curtis_b_latch: bool,
}

impl KeyerState {
    fn new(curtis_mode_b: bool) -> Self {
        Self {
            graph_state: GraphState::Idle,
            key_value_closed: false,
            dot_paddle: false,
            dash_paddle: false,
            dot_latch: false,
            dash_latch: false,
            curtis_mode_b,
            curtis_b_latch: false,
        }
    }
}

/// The iambic keyer engine. Constructed with [`IambicKeyer::new`], which
/// registers it with its generator for tone-end clocking.
pub struct IambicKeyer {
    generator: Arc<Generator>,
    state: Mutex<KeyerState>,
    changed: Condvar,
    key_listener: Mutex<Option<Box<dyn KeyEventListener>>>,
}

impl IambicKeyer {
    /// Create a keyer driving `generator`, clocked by its tone
    /// completions.
    pub fn new(generator: Arc<Generator>, curtis_mode_b: bool) -> Arc<Self> {
        let keyer = Arc::new(Self {
            generator,
            state: Mutex::new(KeyerState::new(curtis_mode_b)),
            changed: Condvar::new(),
            key_listener: Mutex::new(None),
        });
        let weak: Weak<IambicKeyer> = Arc::downgrade(&keyer);
        let weak: Weak<dyn ToneEndListener> = weak;
        keyer.generator.register_tone_end_listener(weak);
        keyer
    }

    /// Current graph state snapshot.
    pub fn graph_state(&self) -> GraphState {
        self.state.lock().unwrap().graph_state
    }

    /// True while the state machine is anywhere but idle.
    pub fn is_busy(&self) -> bool {
        self.graph_state() != GraphState::Idle
    }

    /// Register a listener for key-value transitions (closed at each
    /// element start, open at each element end). Fired synchronously from
    /// the clocking thread with keyer state locked; it must not block or
    /// call back into this keyer.
    pub fn set_key_listener(&self, listener: Box<dyn KeyEventListener>) {
        *self.key_listener.lock().unwrap() = Some(listener);
    }

    fn set_key_value(&self, state: &mut KeyerState, closed: bool) {
        if state.key_value_closed == closed {
            return;
        }
        state.key_value_closed = closed;
        if let Some(listener) = self.key_listener.lock().unwrap().as_ref() {
            listener.on_key_value(closed);
        }
    }

    /// Curtis mode B on/off.
    pub fn set_curtis_mode_b(&self, enabled: bool) {
        self.state.lock().unwrap().curtis_mode_b = enabled;
    }

    pub fn curtis_mode_b(&self) -> bool {
        self.state.lock().unwrap().curtis_mode_b
    }

    /// Record new paddle values and, from idle, kick the state machine into
    /// motion.
    ///
    /// A paddle closing sets its latch. Both paddles closed in mode B set
    /// the one-shot Curtis latch. If the machine is already running, that
    /// is all: the next clock tick picks the latches up.
    pub fn notify_paddle_event(&self, dot_closed: bool, dash_closed: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if dot_closed && !state.dot_paddle {
            state.dot_latch = true;
        }
        if dash_closed && !state.dash_paddle {
            state.dash_latch = true;
        }
        state.dot_paddle = dot_closed;
        state.dash_paddle = dash_closed;

        if dot_closed && dash_closed && state.curtis_mode_b {
            state.curtis_b_latch = true;
        }

        if state.graph_state == GraphState::Idle && (dot_closed || dash_closed) {
            // Initial nudge: pretend the previous element was the opposite
            // of the paddle that closed, then run one tick to leave idle.
            state.graph_state = if dot_closed {
                GraphState::AfterDashA
            } else {
                GraphState::AfterDotA
            };
            self.tick(&mut state)?;
        }
        self.changed.notify_all();
        Ok(())
    }

    /// Block until exactly one element boundary has passed: first until the
    /// machine reaches an after-state or idle, then until it leaves it.
    pub fn wait_for_end_of_current_element(&self) {
        let mut state = self.state.lock().unwrap();
        while !(state.graph_state.is_after() || state.graph_state == GraphState::Idle) {
            state = self.changed.wait(state).unwrap();
        }
        if state.graph_state == GraphState::Idle {
            return;
        }
        while state.graph_state.is_after() {
            state = self.changed.wait(state).unwrap();
        }
    }

    /// Block until the keyer is idle.
    ///
    /// Fails fast with [`KeyingError::WouldDeadlock`] if a paddle is still
    /// closed, since idle is unreachable while it stays down.
    pub fn wait_for_keyer(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.dot_paddle || state.dash_paddle {
            return Err(KeyingError::WouldDeadlock);
        }
        while state.graph_state != GraphState::Idle {
            state = self.changed.wait(state).unwrap();
        }
        Ok(())
    }

    /// Force idle: clear paddle values and all latches, leave the mode
    /// setting untouched, and silence the generator immediately.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock().unwrap();
            let mode = state.curtis_mode_b;
            *state = KeyerState::new(mode);
        }
        self.changed.notify_all();
        self.generator.flush_queue();
        tracing::debug!("iambic keyer reset");
    }

    /// One clock-tick transition; called with the state lock held, once per
    /// completed tone.
    fn tick(&self, state: &mut KeyerState) -> Result<()> {
        use GraphState::*;

        debug_assert!(
            !state.graph_state.is_sending() || state.key_value_closed,
            "key must be closed while sending an element"
        );
        debug_assert!(
            !state.graph_state.is_after() || !state.key_value_closed,
            "key must be open during an inter-element space"
        );

        match state.graph_state {
            Idle => {}

            // A mark just finished: open the key and clock out the
            // inter-element space.
            InDotA | InDotB => {
                self.set_key_value(state, false);
                self.generator.enqueue_inter_mark_space()?;
                state.graph_state = if state.graph_state == InDotB {
                    AfterDotB
                } else {
                    AfterDotA
                };
            }
            InDashA | InDashB => {
                self.set_key_value(state, false);
                self.generator.enqueue_inter_mark_space()?;
                state.graph_state = if state.graph_state == InDashB {
                    AfterDashB
                } else {
                    AfterDashA
                };
            }

            // The space after a dot just finished. A latch is cleared only
            // here, when its element is done and the paddle is seen open.
            AfterDotA | AfterDotB => {
                if !state.dot_paddle {
                    state.dot_latch = false;
                }
                if state.graph_state == AfterDotB {
                    // Mode B one-shot: unconditionally send the opposite
                    // element once.
                    self.start_element(state, Mark::Dash, false)?;
                } else if state.dash_latch {
                    let as_b = std::mem::take(&mut state.curtis_b_latch);
                    self.start_element(state, Mark::Dash, as_b)?;
                } else if state.dot_latch {
                    self.start_element(state, Mark::Dot, false)?;
                } else {
                    state.graph_state = Idle;
                }
            }
            AfterDashA | AfterDashB => {
                if !state.dash_paddle {
                    state.dash_latch = false;
                }
                if state.graph_state == AfterDashB {
                    self.start_element(state, Mark::Dot, false)?;
                } else if state.dot_latch {
                    let as_b = std::mem::take(&mut state.curtis_b_latch);
                    self.start_element(state, Mark::Dot, as_b)?;
                } else if state.dash_latch {
                    self.start_element(state, Mark::Dash, false)?;
                } else {
                    state.graph_state = Idle;
                }
            }
        }
        Ok(())
    }

    fn start_element(&self, state: &mut KeyerState, mark: Mark, b_variant: bool) -> Result<()> {
        self.generator.enqueue_mark(mark, true)?;
        self.set_key_value(state, true);
        state.graph_state = match (mark, b_variant) {
            (Mark::Dot, false) => GraphState::InDotA,
            (Mark::Dot, true) => GraphState::InDotB,
            (Mark::Dash, false) => GraphState::InDashA,
            (Mark::Dash, true) => GraphState::InDashB,
        };
        tracing::trace!(?mark, b_variant, "keyer element started");
        Ok(())
    }
}

impl ToneEndListener for IambicKeyer {
    fn on_tone_end(&self) {
        let mut state = self.state.lock().unwrap();
        if let Err(e) = self.tick(&mut state) {
            // A full queue mid-element leaves nothing sensible to clock;
            // drop to idle rather than wedge the graph.
            tracing::warn!(error = %e, "keyer tick failed, resetting to idle");
            let mode = state.curtis_mode_b;
            *state = KeyerState::new(mode);
        }
        drop(state);
        self.changed.notify_all();
    }
}
