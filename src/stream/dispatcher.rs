//! Live frame dispatcher
//!
//! Forwards each incoming frame to the rendering surface first and to the
//! sequence monitor second, so a loss diagnostic never delays display. The two
//! forwardings are independent: without a surface, loss detection still runs.

use crate::stream::integrity::SequenceMonitor;
use crate::types::{CounterPosition, Frame, LossEvent};
use crossbeam_channel::{Sender, TrySendError};

/// Rendering collaborator: accepts one frame at a time, fire-and-forget
#[cfg_attr(test, mockall::automock)]
pub trait RenderSurface {
    /// Push a frame to the display
    fn update(&mut self, frame: &Frame);
}

impl<R: RenderSurface + ?Sized> RenderSurface for Box<R> {
    fn update(&mut self, frame: &Frame) {
        (**self).update(frame);
    }
}

/// Routes frames to the rendering surface and the integrity monitor
pub struct LiveFrameDispatcher<R> {
    surface: Option<R>,
    monitor: SequenceMonitor,
    /// Optional listener for loss events (never blocks the stream)
    loss_tx: Option<Sender<LossEvent>>,
}

impl<R: RenderSurface> LiveFrameDispatcher<R> {
    /// Create a dispatcher reading counters at `position`
    pub fn new(surface: Option<R>, position: CounterPosition) -> Self {
        Self {
            surface,
            monitor: SequenceMonitor::new(position),
            loss_tx: None,
        }
    }

    /// Also publish loss events on a channel
    pub fn with_loss_sender(mut self, sender: Sender<LossEvent>) -> Self {
        self.loss_tx = Some(sender);
        self
    }

    pub fn surface(&self) -> Option<&R> {
        self.surface.as_ref()
    }

    pub fn monitor(&self) -> &SequenceMonitor {
        &self.monitor
    }

    /// Start a new stream (e.g. after reconnecting the device)
    pub fn reset(&mut self) {
        self.monitor.reset();
    }

    /// Handle one incoming frame
    ///
    /// Returns the loss event detected for this frame, if any.
    pub fn dispatch(&mut self, frame: &Frame) -> Option<LossEvent> {
        if let Some(surface) = self.surface.as_mut() {
            surface.update(frame);
        }

        let event = self.monitor.check(frame)?;
        tracing::warn!(
            previous = event.previous,
            expected = event.expected,
            actual = event.actual,
            "Data loss detected"
        );

        let disconnected = match self.loss_tx.as_ref().map(|tx| tx.try_send(event)) {
            Some(Err(TrySendError::Full(_))) => {
                tracing::debug!("Loss event listener is full, dropping event");
                false
            }
            Some(Err(TrySendError::Disconnected(_))) => true,
            _ => false,
        };
        if disconnected {
            self.loss_tx = None;
        }

        Some(event)
    }
}
