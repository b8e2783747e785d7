use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// Event bus for the control core
///
/// Many producers, one consumer. Publishing never blocks: the channel is
/// unbounded, so a slow dispatcher cannot stall a hardware thread.
use super::events::Event;

/// Outcome of a bounded wait on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// The next event in arrival order
    Event(Event),

    /// The wait elapsed without an event. The wait may also end early on a
    /// clock change, so callers re-check their own deadline.
    Timeout,

    /// Every publisher has been dropped
    Closed,
}

/// Create a bus, returning the cloneable publishing side and the single
/// receiving side.
pub fn channel() -> (EventPublisher, EventReceiver) {
    let (tx, rx) = unbounded();
    (EventPublisher { sender: tx }, EventReceiver { receiver: rx })
}

/// Publishing half of the bus, handed to every producer
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: Sender<Event>,
}

impl EventPublisher {
    /// Publish an event (non-blocking)
    pub fn publish(&self, event: Event) {
        tracing::trace!("publish: {}", event.description());
        // The receiver only goes away during teardown; late events are moot.
        let _ = self.sender.send(event);
    }
}

/// Receiving half of the bus, owned by the dispatcher
#[derive(Debug)]
pub struct EventReceiver {
    receiver: Receiver<Event>,
}

impl EventReceiver {
    /// Block for at most `timeout` waiting for the next event
    pub fn receive(&self, timeout: Duration) -> Received {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Received::Event(event),
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    /// Discard everything queued so far, returning how many events were dropped
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }

    /// Get number of queued events
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
