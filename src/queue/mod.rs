//! Bounded byte queues shared between interrupt and foreground code
//!
//! Each queue has exactly one producer and one consumer. On a port the
//! foreground produces into TX and the interrupt handler consumes it; RX is
//! the mirror image. The queue relies on that discipline instead of a lock.
//!
//! # Design
//! - Fixed capacity chosen at compile time (`ByteQueue<C>`)
//! - Role handles (`Producer`, `Consumer`) carry the operations
//! - Blocking is selected with an explicit [`WaitPolicy`]

mod ring;
mod wait;

pub use ring::{ByteQueue, Consumer, Producer};
pub use wait::{Clock, WaitPolicy};

/// Error type for queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// No free slot and the wait policy gave up.
    Full,
    /// Nothing pending and the wait policy gave up.
    Empty,
}

impl core::fmt::Display for QueueError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "queue full"),
            Self::Empty => write!(f, "queue empty"),
        }
    }
}
