//! Sequence integrity monitor
//!
//! Every frame carries an 8-bit counter that wraps modulo 256. The monitor
//! remembers the previous counter and reports a [`LossEvent`] whenever the
//! next one is not `previous + 1`. It is a pure detector: it keeps no loss
//! counts and never interrupts the stream.

use crate::types::{CounterPosition, Frame, LossEvent};

/// Detects gaps in a frame stream's wrapping counter
#[derive(Debug, Clone, Default)]
pub struct SequenceMonitor {
    /// Where the counter is read from in each frame
    position: CounterPosition,
    /// Counter of the last frame observed, absent until the first frame
    previous: Option<u8>,
}

impl SequenceMonitor {
    /// Create a monitor reading the counter at `position`
    pub fn new(position: CounterPosition) -> Self {
        Self {
            position,
            previous: None,
        }
    }

    /// Last counter observed, if any
    pub fn previous(&self) -> Option<u8> {
        self.previous
    }

    /// Forget the previous counter so the next frame starts a fresh stream
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Check a raw counter value against the expected successor
    pub fn observe(&mut self, actual: u8) -> Option<LossEvent> {
        let event = self.previous.and_then(|previous| {
            let expected = previous.wrapping_add(1);
            (actual != expected).then_some(LossEvent {
                previous,
                expected,
                actual,
            })
        });
        self.previous = Some(actual);
        event
    }

    /// Check a frame's counter
    ///
    /// A frame without a readable counter cannot be chained to its
    /// neighbours, so the monitor restarts from the next readable one.
    pub fn check(&mut self, frame: &Frame) -> Option<LossEvent> {
        match frame.counter(self.position) {
            Some(counter) => self.observe(counter),
            None => {
                tracing::debug!(
                    fields = frame.len(),
                    "Frame has no readable counter, restarting sequence check"
                );
                self.previous = None;
                None
            }
        }
    }
}
