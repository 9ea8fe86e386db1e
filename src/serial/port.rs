//! Serial port state and the queue handoff protocol
//!
//! # Roles
//! ```text
//!   foreground                        interrupt handler
//!   ----------                        -----------------
//!   write ──► TX queue ──────────────► write_byte (one per IRQ)
//!   read  ◄── RX queue ◄────────────── read_byte  (one per IRQ)
//! ```
//! The foreground is the only TX producer and the only RX consumer; the
//! handler is the only TX consumer and the only RX producer. Foreground
//! writers are serialised against each other by a spinlock, as are
//! foreground readers. The handler never takes a lock and never waits.
//!
//! # Transmit Arming
//! The transmit interrupt is armed after every byte queued and disarmed by
//! the handler when it finds the queue empty. A full TX queue therefore
//! always has the interrupt armed, so a blocked writer always makes
//! progress.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use super::error::SerialError;
use crate::drivers::hal::SerialHardware;
use crate::queue::{ByteQueue, Clock, Producer, QueueError, WaitPolicy};

/// Logical port identifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(transparent)]
pub struct PortId(u8);

impl PortId {
    /// First USART.
    pub const USART1: Self = Self(1);

    /// Second USART.
    pub const USART2: Self = Self(2);

    #[inline]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for PortId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "usart{}", self.0)
    }
}

bitflags! {
    /// Snapshot of a port's state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortStatus: u8 {
        const INITIALIZED = 1 << 0;
        const AUTOCRLF = 1 << 1;
        /// Latched until `clear_rx_overflow`.
        const RX_OVERFLOW = 1 << 2;
        const TX_PENDING = 1 << 3;
        const RX_PENDING = 1 << 4;
    }
}

/// One serial channel: hardware, queues and flags.
///
/// Intended to live inside a `static` registry. `C` is the capacity of
/// each of the two queues.
pub struct Port<const C: usize> {
    id: PortId,
    hw: &'static dyn SerialHardware,
    initialized: AtomicBool,
    autocrlf: AtomicBool,
    rx_overflow: AtomicBool,
    /// Set once the foreground has logged the current overflow.
    overflow_reported: AtomicBool,
    /// Bytes discarded by the handler. Only the handler writes this.
    rx_dropped: AtomicUsize,
    tx: ByteQueue<C>,
    rx: ByteQueue<C>,
    tx_side: Mutex<()>,
    rx_side: Mutex<()>,
}

impl<const C: usize> Port<C> {
    /// Create an uninitialized port bound to `hw`.
    pub const fn new(id: PortId, hw: &'static dyn SerialHardware) -> Self {
        Self {
            id,
            hw,
            initialized: AtomicBool::new(false),
            autocrlf: AtomicBool::new(false),
            rx_overflow: AtomicBool::new(false),
            overflow_reported: AtomicBool::new(false),
            rx_dropped: AtomicUsize::new(0),
            tx: ByteQueue::new(),
            rx: ByteQueue::new(),
            tx_side: Mutex::new(()),
            rx_side: Mutex::new(()),
        }
    }

    #[inline]
    pub const fn id(&self) -> PortId {
        self.id
    }

    /// Bind this port to a clock for the foreground operations.
    #[inline]
    pub fn handle<'a>(&'a self, clock: &'a dyn Clock) -> PortHandle<'a, C> {
        PortHandle { port: self, clock }
    }

    /// Interrupt entry for this port.
    ///
    /// Moves at most one byte in each direction and returns. Never blocks,
    /// never logs, never fails: an empty TX queue disarms the transmit
    /// interrupt and a full RX queue drops the byte and latches the
    /// overflow flag.
    ///
    /// # Safety
    /// Must not run concurrently with itself for the same port. Calling it
    /// only from the port's interrupt vector satisfies this.
    pub unsafe fn service_interrupt(&self) {
        if self.hw.tx_ready() {
            // SAFETY: the caller guarantees a single handler context, which
            // is the only TX consumer
            let tx = unsafe { self.tx.consumer() };
            match tx.try_dequeue() {
                Ok(byte) => self.hw.write_byte(byte),
                Err(_) => {
                    self.hw.disable_tx_interrupt();
                    // A writer on another core may have queued and armed
                    // between the dequeue and the disable.
                    if !tx.is_empty() {
                        self.hw.enable_tx_interrupt();
                    }
                }
            }
        }

        if self.hw.rx_has_data() {
            // Read unconditionally: the hardware clears the condition on read
            let byte = self.hw.read_byte();
            // SAFETY: the caller guarantees a single handler context, which
            // is the only RX producer
            let rx = unsafe { self.rx.producer() };
            if rx.try_enqueue(byte).is_err() {
                self.rx_dropped.fetch_add(1, Ordering::Relaxed);
                self.rx_overflow.store(true, Ordering::Release);
            }
        }
    }
}

impl<const C: usize> core::fmt::Debug for Port<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("autocrlf", &self.autocrlf.load(Ordering::Relaxed))
            .field("rx_overflow", &self.rx_overflow.load(Ordering::Relaxed))
            .field("tx", &self.tx)
            .field("rx", &self.rx)
            .finish()
    }
}

/// Foreground view of a port.
///
/// Returned by registry lookups. Cheap to copy.
#[derive(Clone, Copy)]
pub struct PortHandle<'a, const C: usize> {
    port: &'a Port<C>,
    clock: &'a dyn Clock,
}

impl<'a, const C: usize> PortHandle<'a, C> {
    #[inline]
    pub fn id(&self) -> PortId {
        self.port.id
    }

    #[inline]
    pub fn port(&self) -> &'a Port<C> {
        self.port
    }

    /// Configure the hardware, enable receive interrupts and mark the port
    /// ready.
    ///
    /// Calling it again reprograms the baud rate; the port stays
    /// initialized. Output still queued is re-armed, since `configure`
    /// may reset the interrupt mask.
    pub fn init(&self, baud: u32) {
        let port = self.port;
        port.hw.configure(baud);
        port.hw.enable_rx_interrupt();
        if !port.tx.is_empty() {
            port.hw.enable_tx_interrupt();
        }
        let was_initialized = port.initialized.load(Ordering::Acquire);
        port.initialized.store(true, Ordering::Release);

        if was_initialized {
            log::info!("{}: reconfigured at {} baud", port.id, baud);
        } else {
            log::info!("{}: initialized at {} baud", port.id, baud);
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.port.initialized.load(Ordering::Acquire)
    }

    /// Insert `\r` before every outgoing `\n` from now on.
    ///
    /// Bytes already queued are not affected.
    pub fn set_autocrlf(&self, enabled: bool) {
        self.port.autocrlf.store(enabled, Ordering::Relaxed);
        log::debug!("{}: autocrlf {}", self.port.id, if enabled { "on" } else { "off" });
    }

    #[inline]
    pub fn autocrlf(&self) -> bool {
        self.port.autocrlf.load(Ordering::Relaxed)
    }

    /// Queue `bytes` for transmission, waiting for space as needed.
    ///
    /// Returns the number of input bytes consumed, which does not count
    /// injected carriage returns.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, SerialError> {
        self.write_with(bytes, WaitPolicy::WaitForever)
    }

    /// Queue as much of `bytes` as fits right now.
    ///
    /// Returns the number of input bytes consumed. Fails with
    /// [`SerialError::Io`] only if not even the first byte fits. A
    /// `\r\n` pair produced by autocrlf is never split.
    pub fn try_write(&self, bytes: &[u8]) -> Result<usize, SerialError> {
        self.write_with(bytes, WaitPolicy::NoWait)
    }

    /// Queue a single byte. See [`write`](Self::write).
    pub fn putchar(&self, byte: u8) -> Result<usize, SerialError> {
        self.write(core::slice::from_ref(&byte))
    }

    fn write_with(&self, bytes: &[u8], policy: WaitPolicy) -> Result<usize, SerialError> {
        self.ensure_initialized()?;

        let _writer = self.port.tx_side.lock();
        // SAFETY: `tx_side` serialises foreground producers and the handler
        // only consumes from TX
        let tx = unsafe { self.port.tx.producer() };

        let mut written = 0;
        for &byte in bytes {
            if let Err(err) = self.queue_byte(&tx, byte, policy) {
                if written == 0 {
                    log::error!("{}: cannot queue output: {}", self.port.id, err);
                    return Err(err.into());
                }
                break;
            }
            written += 1;
        }
        Ok(written)
    }

    fn queue_byte(&self, tx: &Producer<'_, C>, byte: u8, policy: WaitPolicy) -> Result<(), QueueError> {
        let hw = self.port.hw;

        if byte == b'\n' && self.autocrlf() {
            if !policy.may_block() && tx.free() < 2 {
                return Err(QueueError::Full);
            }
            tx.enqueue(b'\r', policy, self.clock)?;
            hw.enable_tx_interrupt();
        }

        tx.enqueue(byte, policy, self.clock)?;
        hw.enable_tx_interrupt();
        Ok(())
    }

    /// Read up to `buf.len()` bytes, applying `policy` to each byte.
    ///
    /// Stops at the first byte that does not arrive in time and returns
    /// the count so far. A short count is not an error.
    pub fn read(&self, buf: &mut [u8], policy: WaitPolicy) -> Result<usize, SerialError> {
        self.ensure_initialized()?;

        let _reader = self.port.rx_side.lock();
        // SAFETY: `rx_side` serialises foreground consumers and the handler
        // only produces into RX
        let rx = unsafe { self.port.rx.consumer() };
        self.report_overflow();

        let mut count = 0;
        for slot in buf.iter_mut() {
            match rx.dequeue(policy, self.clock) {
                Ok(byte) => *slot = byte,
                Err(_) => break,
            }
            count += 1;
        }
        Ok(count)
    }

    /// Read a single byte, or `None` if none arrived in time.
    ///
    /// `None` is the zero-count result of a one-byte `read`.
    pub fn getchar(&self, policy: WaitPolicy) -> Result<Option<u8>, SerialError> {
        let mut byte = 0u8;
        let count = self.read(core::slice::from_mut(&mut byte), policy)?;
        Ok((count == 1).then_some(byte))
    }

    /// Whether a received byte has been dropped since the last clear.
    #[inline]
    pub fn rx_overflow(&self) -> bool {
        self.port.rx_overflow.load(Ordering::Acquire)
    }

    /// Reset the overflow latch, returning its previous value.
    pub fn clear_rx_overflow(&self) -> bool {
        let was_set = self.port.rx_overflow.swap(false, Ordering::AcqRel);
        self.port.overflow_reported.store(false, Ordering::Relaxed);
        if was_set {
            log::debug!("{}: overflow cleared", self.port.id);
        }
        was_set
    }

    /// Total received bytes discarded because the RX queue was full.
    #[inline]
    pub fn rx_dropped(&self) -> usize {
        self.port.rx_dropped.load(Ordering::Relaxed)
    }

    /// Bytes queued but not yet handed to the hardware.
    #[inline]
    pub fn tx_pending(&self) -> usize {
        self.port.tx.len()
    }

    /// Bytes received but not yet read.
    #[inline]
    pub fn rx_pending(&self) -> usize {
        self.port.rx.len()
    }

    pub fn status(&self) -> PortStatus {
        let mut status = PortStatus::empty();
        status.set(PortStatus::INITIALIZED, self.is_initialized());
        status.set(PortStatus::AUTOCRLF, self.autocrlf());
        status.set(PortStatus::RX_OVERFLOW, self.rx_overflow());
        status.set(PortStatus::TX_PENDING, self.tx_pending() > 0);
        status.set(PortStatus::RX_PENDING, self.rx_pending() > 0);
        status
    }

    #[inline]
    fn ensure_initialized(&self) -> Result<(), SerialError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(SerialError::NotConnected)
        }
    }

    fn report_overflow(&self) {
        let port = self.port;
        if port.rx_overflow.load(Ordering::Acquire) && !port.overflow_reported.load(Ordering::Relaxed) {
            port.overflow_reported.store(true, Ordering::Relaxed);
            log::warn!(
                "{}: receive queue overflowed, {} byte(s) dropped",
                port.id,
                self.rx_dropped()
            );
        }
    }
}

impl<const C: usize> core::fmt::Debug for PortHandle<'_, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PortHandle").field(&self.port.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pump, FakeUart, CLOCK};
    use std::sync::OnceLock;
    use std::thread;
    use std::time::Duration;

    fn port<const C: usize>() -> (&'static Port<C>, &'static FakeUart) {
        let hw = FakeUart::leak();
        let port = Box::leak(Box::new(Port::<C>::new(PortId::USART1, hw)));
        (port, hw)
    }

    #[test]
    fn test_uninitialized_port_rejects_io() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        let mut buf = [0u8; 4];

        assert_eq!(handle.write(b"x"), Err(SerialError::NotConnected));
        assert_eq!(handle.putchar(b'x'), Err(SerialError::NotConnected));
        assert_eq!(handle.read(&mut buf, WaitPolicy::NoWait), Err(SerialError::NotConnected));
        assert_eq!(handle.getchar(WaitPolicy::NoWait), Err(SerialError::NotConnected));
        assert_eq!(handle.tx_pending(), 0);
        assert!(!hw.tx_armed());
    }

    #[test]
    fn test_init_configures_hardware() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        assert!(handle.is_initialized());
        assert_eq!(hw.baud(), 9_600);
        assert!(hw.rx_armed());
        assert!(!hw.tx_armed());

        handle.init(115_200);
        assert!(handle.is_initialized());
        assert_eq!(hw.baud(), 115_200);
        assert_eq!(hw.configure_calls(), 2);
    }

    #[test]
    fn test_reinit_rearms_pending_tx() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);
        handle.write(b"hello").unwrap();

        handle.init(19_200);
        assert!(hw.tx_armed());
        assert_eq!(handle.tx_pending(), 5);

        pump(port, hw);
        assert_eq!(hw.transmitted(), b"hello");
        assert!(!hw.tx_armed());
    }

    /// Fake that queues one byte behind the handler's back the first time
    /// the transmit interrupt is disabled, as a writer on another core
    /// could.
    struct RacingUart {
        inner: FakeUart,
        port: OnceLock<&'static Port<4>>,
        raced: AtomicBool,
    }

    impl SerialHardware for RacingUart {
        fn configure(&self, baud: u32) {
            self.inner.configure(baud)
        }

        fn enable_rx_interrupt(&self) {
            self.inner.enable_rx_interrupt()
        }

        fn enable_tx_interrupt(&self) {
            self.inner.enable_tx_interrupt()
        }

        fn disable_tx_interrupt(&self) {
            self.inner.disable_tx_interrupt();
            if !self.raced.swap(true, Ordering::SeqCst) {
                if let Some(port) = self.port.get() {
                    // The foreground is idle, so this is the only producer
                    unsafe { port.tx.producer() }.try_enqueue(b'!').unwrap();
                }
            }
        }

        fn read_byte(&self) -> u8 {
            self.inner.read_byte()
        }

        fn write_byte(&self, byte: u8) {
            self.inner.write_byte(byte)
        }

        fn tx_ready(&self) -> bool {
            self.inner.tx_ready()
        }

        fn rx_has_data(&self) -> bool {
            self.inner.rx_has_data()
        }
    }

    #[test]
    fn test_handler_rearms_when_byte_lands_during_disarm() {
        let hw: &'static RacingUart = Box::leak(Box::new(RacingUart {
            inner: FakeUart::new(),
            port: OnceLock::new(),
            raced: AtomicBool::new(false),
        }));
        let port: &'static Port<4> = Box::leak(Box::new(Port::new(PortId::USART1, hw)));
        let _ = hw.port.set(port);

        let handle = port.handle(&CLOCK);
        handle.init(9_600);
        handle.write(b"a").unwrap();

        unsafe { port.service_interrupt() };
        assert_eq!(hw.inner.transmitted(), b"a");

        // Queue found empty, disarmed, byte slips in, handler re-arms
        unsafe { port.service_interrupt() };
        assert!(hw.inner.tx_armed());
        assert_eq!(handle.tx_pending(), 1);

        pump(port, &hw.inner);
        assert_eq!(hw.inner.transmitted(), b"a!");
        assert!(!hw.inner.tx_armed());
    }

    #[test]
    fn test_write_arms_and_handler_drains() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        assert_eq!(handle.write(b"hi"), Ok(2));
        assert!(hw.tx_armed());
        assert_eq!(handle.tx_pending(), 2);

        pump(port, hw);
        assert_eq!(hw.transmitted(), b"hi");
        assert!(!hw.tx_armed());
        assert_eq!(handle.tx_pending(), 0);
    }

    #[test]
    fn test_autocrlf_counts_input_bytes() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);
        handle.set_autocrlf(true);

        assert_eq!(handle.write(b"AB\n"), Ok(3));
        pump(port, hw);
        assert_eq!(hw.transmitted(), b"AB\r\n");
    }

    #[test]
    fn test_autocrlf_toggle_leaves_queued_bytes() {
        let (port, hw) = port::<16>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        handle.set_autocrlf(true);
        handle.write(b"a\n").unwrap();
        handle.set_autocrlf(false);
        handle.write(b"b\n").unwrap();

        pump(port, hw);
        assert_eq!(hw.transmitted(), b"a\r\nb\n");
    }

    #[test]
    fn test_try_write_short_count_and_full() {
        let (port, hw) = port::<4>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        assert_eq!(handle.try_write(b"abcdef"), Ok(4));
        assert_eq!(handle.try_write(b"g"), Err(SerialError::Io));

        pump(port, hw);
        assert_eq!(hw.transmitted(), b"abcd");
    }

    #[test]
    fn test_try_write_never_splits_crlf() {
        let (port, hw) = port::<4>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);
        handle.set_autocrlf(true);

        assert_eq!(handle.try_write(b"abc\n"), Ok(3));
        assert_eq!(handle.tx_pending(), 3);

        pump(port, hw);
        assert_eq!(hw.transmitted(), b"abc");
    }

    #[test]
    fn test_blocking_write_waits_for_handler() {
        let (port, hw) = port::<4>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);
        handle.write(b"0123").unwrap();

        thread::scope(|s| {
            let writer = s.spawn(|| port.handle(&CLOCK).write(b"45"));
            thread::sleep(Duration::from_millis(20));
            assert!(!writer.is_finished());

            // Act as the interrupt context until the writer is done
            while !writer.is_finished() {
                unsafe { port.service_interrupt() };
                thread::yield_now();
            }
            assert_eq!(writer.join().unwrap(), Ok(2));
        });

        pump(port, hw);
        assert_eq!(hw.transmitted(), b"012345");
    }

    #[test]
    fn test_read_returns_what_arrived() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        let mut buf = [0u8; 5];
        assert_eq!(handle.read(&mut buf, WaitPolicy::NoWait), Ok(0));

        hw.inject(b"abc");
        pump(port, hw);
        let timeout = WaitPolicy::WaitUpTo(Duration::from_millis(10));
        assert_eq!(handle.read(&mut buf, timeout), Ok(3));
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_read_short_count_on_timeout() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        thread::scope(|s| {
            s.spawn(|| {
                for &byte in b"xyz" {
                    thread::sleep(Duration::from_millis(5));
                    hw.inject(&[byte]);
                    pump(port, hw);
                }
            });

            let mut buf = [0u8; 5];
            let timeout = WaitPolicy::WaitUpTo(Duration::from_millis(200));
            assert_eq!(handle.read(&mut buf, timeout), Ok(3));
            assert_eq!(&buf[..3], b"xyz");
        });
    }

    #[test]
    fn test_getchar() {
        let (port, hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        // Nothing pending: a zero-count read, and None from getchar
        let mut one = [0u8; 1];
        assert_eq!(handle.read(&mut one, WaitPolicy::NoWait), Ok(0));
        assert_eq!(handle.getchar(WaitPolicy::NoWait), Ok(None));
        hw.inject(b"z");
        pump(port, hw);
        assert_eq!(handle.getchar(WaitPolicy::NoWait), Ok(Some(b'z')));
    }

    #[test]
    fn test_overflow_latches_and_keeps_fifo() {
        let (port, hw) = port::<4>();
        let handle = port.handle(&CLOCK);
        handle.init(9_600);

        hw.inject(b"abcdef");
        pump(port, hw);

        assert!(handle.rx_overflow());
        assert_eq!(handle.rx_dropped(), 2);
        assert!(handle.status().contains(PortStatus::RX_OVERFLOW | PortStatus::RX_PENDING));

        let mut buf = [0u8; 8];
        assert_eq!(handle.read(&mut buf, WaitPolicy::NoWait), Ok(4));
        assert_eq!(&buf[..4], b"abcd");

        // Sticky until cleared
        assert!(handle.rx_overflow());
        assert!(handle.clear_rx_overflow());
        assert!(!handle.rx_overflow());
        assert!(!handle.clear_rx_overflow());
        assert_eq!(handle.rx_dropped(), 2);
    }

    #[test]
    fn test_status_flags() {
        let (port, _hw) = port::<8>();
        let handle = port.handle(&CLOCK);
        assert_eq!(handle.status(), PortStatus::empty());

        handle.init(9_600);
        handle.set_autocrlf(true);
        handle.putchar(b'x').unwrap();
        assert_eq!(
            handle.status(),
            PortStatus::INITIALIZED | PortStatus::AUTOCRLF | PortStatus::TX_PENDING
        );
    }

    #[test]
    fn test_port_id_display() {
        assert_eq!(std::format!("{}", PortId::USART2), "usart2");
        assert_eq!(PortId::new(1), PortId::USART1);
        assert_eq!(PortId::USART1.raw(), 1);
    }
}
