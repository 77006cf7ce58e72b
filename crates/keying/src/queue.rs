//! Bounded tone queue
//!
//! A fixed-capacity FIFO of tone segments shared between the enqueueing
//! callers and the generator's single background consumer. Enqueue never
//! blocks (full means fail, callers decide what to do); the wait primitives
//! are the only suspension points. Head/tail state lives under one mutex
//! with a condvar for level changes, which is all the synchronization the
//! engine needs.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::{KeyingError, Result};
use crate::tone::{Tone, ToneMarker};

/// Default queue capacity in tones. Generous enough to hold several seconds
/// of text at slow speeds.
pub const DEFAULT_CAPACITY: usize = 3_000;

/// Listener invoked when a dequeue drops the queue length to or below the
/// registered level.
///
/// Fired synchronously from the generator's background task, after the
/// queue lock has been released. Implementations must not block; enqueueing
/// more tones from inside the listener is the intended use.
pub trait LowWatermark: Send {
    fn on_low_watermark(&self, length: usize);
}

struct Watermark {
    listener: Box<dyn LowWatermark>,
    level: usize,
}

struct Inner {
    tones: VecDeque<Tone>,
    /// Total dequeues since creation; lets waiters detect "a tone just
    /// finished" independent of occupancy.
    dequeue_events: u64,
}

/// Fixed-capacity concurrent tone queue.
pub struct ToneQueue {
    inner: Mutex<Inner>,
    level_changed: Condvar,
    // Separate lock so the listener can call back into queue introspection
    // without deadlocking on `inner`.
    watermark: Mutex<Option<Watermark>>,
    capacity: usize,
}

impl ToneQueue {
    /// Create a queue holding at most `capacity` tones.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tones: VecDeque::with_capacity(capacity),
                dequeue_events: 0,
            }),
            level_changed: Condvar::new(),
            watermark: Mutex::new(None),
            capacity,
        }
    }

    /// Queue capacity in tones.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued tones.
    pub fn length(&self) -> usize {
        self.inner.lock().unwrap().tones.len()
    }

    /// True when no further tone can be enqueued.
    pub fn is_full(&self) -> bool {
        self.length() == self.capacity
    }

    /// Append a tone at the tail.
    ///
    /// Fails immediately with [`KeyingError::QueueFull`] when the queue is
    /// full; never blocks.
    pub fn enqueue(&self, tone: Tone) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tones.len() == self.capacity {
            return Err(KeyingError::QueueFull);
        }
        inner.tones.push_back(tone);
        drop(inner);
        self.level_changed.notify_all();
        Ok(())
    }

    /// Append several tones at the tail as one atomic step: either all fit
    /// or the queue is left untouched.
    pub fn enqueue_batch(&self, tones: &[Tone]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tones.len() + tones.len() > self.capacity {
            return Err(KeyingError::QueueFull);
        }
        inner.tones.extend(tones.iter().copied());
        drop(inner);
        self.level_changed.notify_all();
        Ok(())
    }

    /// Remove and return the head tone, or `None` when empty.
    ///
    /// Fires the low-watermark listener when this dequeue drops the length
    /// from above the registered level to at or below it.
    pub fn dequeue(&self) -> Option<Tone> {
        let mut inner = self.inner.lock().unwrap();
        let tone = inner.tones.pop_front()?;
        inner.dequeue_events += 1;
        let length = inner.tones.len();
        drop(inner);
        self.level_changed.notify_all();
        self.fire_watermark(length);
        Some(tone)
    }

    /// Remove and return the head tone, blocking until one is available or
    /// `should_stop` returns true (checked on every wakeup).
    pub(crate) fn dequeue_blocking(&self, should_stop: impl Fn() -> bool) -> Option<Tone> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if should_stop() {
                return None;
            }
            if let Some(tone) = inner.tones.pop_front() {
                inner.dequeue_events += 1;
                let length = inner.tones.len();
                drop(inner);
                self.level_changed.notify_all();
                self.fire_watermark(length);
                return Some(tone);
            }
            inner = self.level_changed.wait(inner).unwrap();
        }
    }

    /// Block until the queue length is at or below `target`. Returns
    /// immediately if already satisfied.
    pub fn wait_for_level(&self, target: usize) {
        let mut inner = self.inner.lock().unwrap();
        while inner.tones.len() > target {
            inner = self.level_changed.wait(inner).unwrap();
        }
    }

    /// Block until at least one dequeue has happened since this call began.
    ///
    /// This detects "a tone just finished", which is distinct from any
    /// particular occupancy level; the iambic keyer's clocking depends on
    /// the difference.
    pub fn wait_for_end_of_current_tone(&self) {
        let mut inner = self.inner.lock().unwrap();
        let seen = inner.dequeue_events;
        while inner.dequeue_events == seen {
            inner = self.level_changed.wait(inner).unwrap();
        }
    }

    /// Discard all pending tones without playing them.
    ///
    /// The caller (the generator) is responsible for forcing the sink to
    /// silence afterwards.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        let discarded = inner.tones.len();
        inner.tones.clear();
        drop(inner);
        if discarded > 0 {
            tracing::debug!(discarded, "tone queue flushed");
        }
        self.level_changed.notify_all();
    }

    /// Wake every waiter so it can re-check its condition. Used by the
    /// generator's stop path.
    pub(crate) fn wake_all(&self) {
        self.level_changed.notify_all();
    }

    /// Register the low-watermark listener. `level` must lie in
    /// `[0, capacity)`.
    pub fn register_low_watermark(
        &self,
        listener: Box<dyn LowWatermark>,
        level: usize,
    ) -> Result<()> {
        if level >= self.capacity {
            return Err(KeyingError::InvalidWatermarkLevel {
                level,
                capacity: self.capacity,
            });
        }
        *self.watermark.lock().unwrap() = Some(Watermark { listener, level });
        Ok(())
    }

    /// Disable the low-watermark mechanism.
    pub fn clear_low_watermark(&self) {
        *self.watermark.lock().unwrap() = None;
    }

    /// Remove the tail run of tones tagged with character id `character`,
    /// but only if that run is exactly `expected` tones long. The check and
    /// the removal happen under one lock so a racing dequeue cannot split
    /// them.
    pub(crate) fn truncate_character(&self, character: u64, expected: usize) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .tones
            .iter()
            .rev()
            .take_while(|tone| marker_belongs_to(tone.marker, character))
            .count();
        if run != expected {
            return false;
        }
        let keep = inner.tones.len() - run;
        inner.tones.truncate(keep);
        drop(inner);
        self.level_changed.notify_all();
        true
    }

    fn fire_watermark(&self, length: usize) {
        let guard = self.watermark.lock().unwrap();
        if let Some(watermark) = guard.as_ref() {
            // Fire only when this dequeue crossed the level from above.
            if length <= watermark.level && length + 1 > watermark.level {
                watermark.listener.on_low_watermark(length);
            }
        }
    }
}

fn marker_belongs_to(marker: ToneMarker, character: u64) -> bool {
    match marker {
        ToneMarker::Mark { character: id } => id == character,
        ToneMarker::Space { character: id } => id == Some(character),
        ToneMarker::Forever | ToneMarker::Raw => false,
    }
}
