//! Notifications carried from interrupt handlers to consumer threads.
//!
//! An [`Event`] is a small value copied across the queue boundary; nothing
//! is shared between producer and consumer. The [`EventQueue`] is bounded
//! and lock-based, with a non-blocking producer path for interrupt context
//! and blocking paths for threads.

use crate::collections::RingBuffer;
use crate::sync::SpinLock;

/// What a notification describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A byte arrived on a serial interface.
    ByteReceived,
}

/// Immutable notification value: a kind plus a one-byte payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    byte: u8,
}

impl Event {
    pub const fn new(kind: EventKind, byte: u8) -> Self {
        Self { kind, byte }
    }

    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    pub const fn byte(&self) -> u8 {
        self.byte
    }
}

/// Destination for events produced in interrupt context.
///
/// Implementations must be shareable across threads and interrupt handlers;
/// the one required method must never block.
pub trait EventSink: Sync {
    /// Attempts to enqueue without blocking. Returns `false` when the
    /// queue's lock is contended or the queue is full, leaving the event
    /// un-enqueued; drop handling stays with the caller.
    fn try_push(&self, event: Event) -> bool;
}

/// Bounded multi-producer, single-consumer FIFO queue of [`Event`]s.
///
/// Capacity is fixed at construction through the `N` parameter. Events are
/// delivered in lock-acquisition order across all producers combined.
///
/// Producer rules: threads may use the blocking [`EventQueue::push`];
/// interrupt handlers must use [`EventSink::try_push`] and treat `false`
/// as backpressure, never retrying inside the handler.
pub struct EventQueue<const N: usize = 16> {
    queue: SpinLock<RingBuffer<Event, N>>,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: SpinLock::new(RingBuffer::new()),
        }
    }

    /// Enqueues `event`, spinning until the queue has space.
    ///
    /// Thread context only; a full queue suspends the caller until the
    /// consumer drains an element.
    pub fn push(&self, event: Event) {
        loop {
            {
                let mut queue = self.queue.lock();
                if queue.push_back(event).is_ok() {
                    return;
                }
            }
            core::hint::spin_loop();
        }
    }

    /// Removes and returns the oldest event, spinning until one arrives.
    ///
    /// Thread context only.
    pub fn pop(&self) -> Event {
        loop {
            {
                let mut queue = self.queue.lock();
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            core::hint::spin_loop();
        }
    }

    /// Removes and returns the oldest event if one is present.
    pub fn try_pop(&self) -> Option<Event> {
        self.queue.lock().pop_front()
    }

    /// Snapshot of the number of queued events.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> EventSink for EventQueue<N> {
    fn try_push(&self, event: Event) -> bool {
        match self.queue.try_lock() {
            Some(mut queue) => queue.push_back(event).is_ok(),
            None => false,
        }
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
