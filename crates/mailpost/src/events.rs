//! Transport event side channel.
//!
//! Each failed message stream publishes exactly one event. Delivery to a
//! subscriber is bounded by [`EVENT_CAPACITY`]: a receiver that falls further
//! behind gets `RecvError::Lagged(n)`, which means `n` notifications were
//! dropped for it. The send result always carries the error regardless.

use tokio::sync::broadcast;

use crate::error::Error;

/// Events a subscriber can hold unread before older ones are dropped for it.
pub const EVENT_CAPACITY: usize = 1024;

/// Events published by a transport.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TransportEvent {
    /// A message source failed during a send. The error is the same one the
    /// send returned and shares its cause.
    StreamError(Error),
}

pub(crate) fn channel() -> broadcast::Sender<TransportEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

pub(crate) fn publish(sender: &broadcast::Sender<TransportEvent>, event: TransportEvent) {
    if sender.send(event).is_err() {
        tracing::trace!("no event subscribers");
    }
}
