//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes domain events to subscribers. It is **not** storage:
//! events that must survive are written as documents by the event repository.
//!
//! Delivery is at-least-once from the subscriber's point of view and the
//! publisher never waits on subscriber work, so handlers must be idempotent.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to the bus. Each subscription receives a copy of every
/// message published after it was created (broadcast semantics).
///
/// Subscriptions are meant for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` hands a message over and returns; it must not wait for
/// subscribers to finish. A failed publish is reported to the caller, which
/// decides whether it matters (the change tracker only logs it).
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
