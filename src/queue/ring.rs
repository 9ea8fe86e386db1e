//! Single-producer/single-consumer byte ring
//!
//! # Index Scheme
//! `head` (consumer) and `tail` (producer) run over `[0, 2C)`. The slot
//! used is `index % C`. Keeping the indices on a doubled range lets both
//! sides tell a full ring from an empty one without a shared counter:
//!
//! ```text
//! empty:  head == tail
//! full:   (tail - head) mod 2C == C
//! ```
//!
//! Each index has exactly one writer, so plain atomic loads and stores are
//! enough. The ring itself needs no read-modify-write instructions; the
//! port layer above it does (see the crate docs).

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::wait::{Clock, WaitPolicy, Waiter};
use super::QueueError;

/// Fixed-capacity FIFO of bytes.
///
/// Meant to live in a `static` for the life of the program. Access goes
/// through a [`Producer`] and a [`Consumer`]; at most one of each may be
/// active at any time.
pub struct ByteQueue<const C: usize> {
    slots: UnsafeCell<[u8; C]>,
    /// Next slot to read. Written only by the consumer.
    head: AtomicUsize,
    /// Next slot to write. Written only by the producer.
    tail: AtomicUsize,
}

// SAFETY: slot contents are only touched by the single producer (before it
// publishes `tail`) and the single consumer (before it publishes `head`).
// The Release/Acquire pairs on the indices order those accesses.
unsafe impl<const C: usize> Sync for ByteQueue<C> {}

impl<const C: usize> ByteQueue<C> {
    const VALID_CAPACITY: () = assert!(C > 0 && C <= usize::MAX / 2, "invalid queue capacity");

    /// Create an empty queue.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        Self {
            slots: UnsafeCell::new([0; C]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Number of bytes the queue can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }

    /// Number of bytes currently pending.
    ///
    /// From a third context this is only a snapshot.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        Self::occupancy(head, tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == C
    }

    /// Split into the two role handles.
    ///
    /// The exclusive borrow guarantees no other handle exists.
    pub fn split(&mut self) -> (Producer<'_, C>, Consumer<'_, C>) {
        let queue: &Self = self;
        (Producer::new(queue), Consumer::new(queue))
    }

    /// Obtain the producer handle of a shared queue.
    ///
    /// # Safety
    /// No other `Producer` for this queue may be used while the returned
    /// handle is alive.
    #[inline]
    pub unsafe fn producer(&self) -> Producer<'_, C> {
        Producer::new(self)
    }

    /// Obtain the consumer handle of a shared queue.
    ///
    /// # Safety
    /// No other `Consumer` for this queue may be used while the returned
    /// handle is alive.
    #[inline]
    pub unsafe fn consumer(&self) -> Consumer<'_, C> {
        Consumer::new(self)
    }

    #[inline]
    const fn advance(index: usize) -> usize {
        let next = index + 1;
        if next == 2 * C {
            0
        } else {
            next
        }
    }

    #[inline]
    const fn occupancy(head: usize, tail: usize) -> usize {
        if tail >= head {
            tail - head
        } else {
            tail + 2 * C - head
        }
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut u8 {
        // SAFETY: index % C is always inside the backing array
        unsafe { self.slots.get().cast::<u8>().add(index % C) }
    }
}

impl<const C: usize> Default for ByteQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> core::fmt::Debug for ByteQueue<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ByteQueue")
            .field("capacity", &C)
            .field("len", &self.len())
            .finish()
    }
}

/// Write side of a [`ByteQueue`].
///
/// Not `Sync`: the handle may move to another context but never be shared.
pub struct Producer<'q, const C: usize> {
    queue: &'q ByteQueue<C>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'q, const C: usize> Producer<'q, C> {
    fn new(queue: &'q ByteQueue<C>) -> Self {
        Self {
            queue,
            _not_sync: PhantomData,
        }
    }

    /// Append one byte if a slot is free.
    pub fn try_enqueue(&self, byte: u8) -> Result<(), QueueError> {
        let queue = self.queue;
        let tail = queue.tail.load(Ordering::Relaxed);
        let head = queue.head.load(Ordering::Acquire);

        if ByteQueue::<C>::occupancy(head, tail) == C {
            return Err(QueueError::Full);
        }

        // SAFETY: the slot at `tail` is outside the consumer's visible range
        // until the store below publishes it.
        unsafe { queue.slot(tail).write(byte) };
        queue.tail.store(ByteQueue::<C>::advance(tail), Ordering::Release);
        Ok(())
    }

    /// Append one byte, waiting for space as the policy allows.
    ///
    /// Must not be called with a blocking policy from interrupt context.
    pub fn enqueue(&self, byte: u8, policy: WaitPolicy, clock: &dyn Clock) -> Result<(), QueueError> {
        let mut waiter = Waiter::new(policy, clock);
        loop {
            match self.try_enqueue(byte) {
                Err(QueueError::Full) if waiter.wait() => continue,
                result => return result,
            }
        }
    }

    /// Free slots as seen by the producer.
    ///
    /// Only the consumer can change this concurrently, and only upwards.
    #[inline]
    pub fn free(&self) -> usize {
        C - self.queue.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }
}

/// Read side of a [`ByteQueue`].
pub struct Consumer<'q, const C: usize> {
    queue: &'q ByteQueue<C>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'q, const C: usize> Consumer<'q, C> {
    fn new(queue: &'q ByteQueue<C>) -> Self {
        Self {
            queue,
            _not_sync: PhantomData,
        }
    }

    /// Remove the oldest byte if one is pending.
    pub fn try_dequeue(&self) -> Result<u8, QueueError> {
        let queue = self.queue;
        let head = queue.head.load(Ordering::Relaxed);
        let tail = queue.tail.load(Ordering::Acquire);

        if head == tail {
            return Err(QueueError::Empty);
        }

        // SAFETY: the producer published this slot with its Release store
        // and will not reuse it until `head` moves past it.
        let byte = unsafe { queue.slot(head).read() };
        queue.head.store(ByteQueue::<C>::advance(head), Ordering::Release);
        Ok(byte)
    }

    /// Remove the oldest byte, waiting for data as the policy allows.
    ///
    /// Must not be called with a blocking policy from interrupt context.
    pub fn dequeue(&self, policy: WaitPolicy, clock: &dyn Clock) -> Result<u8, QueueError> {
        let mut waiter = Waiter::new(policy, clock);
        loop {
            match self.try_dequeue() {
                Err(QueueError::Empty) if waiter.wait() => continue,
                result => return result,
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }
}
