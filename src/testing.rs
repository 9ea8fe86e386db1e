//! Host-side doubles for the hardware and clock collaborators
//!
//! Unit tests stand in for the interrupt context by calling
//! `service_interrupt` directly or from a helper thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::drivers::hal::SerialHardware;
use crate::queue::Clock;
use crate::serial::Port;

/// Wall clock measured from first use.
pub(crate) struct StdClock;

impl Clock for StdClock {
    fn now(&self) -> Duration {
        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        ORIGIN.get_or_init(Instant::now).elapsed()
    }
}

pub(crate) static CLOCK: StdClock = StdClock;

/// UART whose transmitter is always idle and whose receiver is fed from
/// a test-controlled line.
pub(crate) struct FakeUart {
    baud: AtomicU32,
    configure_calls: AtomicUsize,
    rx_irq: AtomicBool,
    tx_irq: AtomicBool,
    /// Bytes the hardware has sent
    wire: Mutex<Vec<u8>>,
    /// Bytes waiting to be received
    line: Mutex<VecDeque<u8>>,
}

impl FakeUart {
    pub(crate) const fn new() -> Self {
        Self {
            baud: AtomicU32::new(0),
            configure_calls: AtomicUsize::new(0),
            rx_irq: AtomicBool::new(false),
            tx_irq: AtomicBool::new(false),
            wire: Mutex::new(Vec::new()),
            line: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn leak() -> &'static Self {
        Box::leak(Box::new(Self::new()))
    }

    /// Queue bytes on the receive line.
    pub(crate) fn inject(&self, bytes: &[u8]) {
        self.line.lock().unwrap().extend(bytes.iter().copied());
    }

    pub(crate) fn pending_input(&self) -> usize {
        self.line.lock().unwrap().len()
    }

    pub(crate) fn transmitted(&self) -> Vec<u8> {
        self.wire.lock().unwrap().clone()
    }

    pub(crate) fn tx_armed(&self) -> bool {
        self.tx_irq.load(Ordering::SeqCst)
    }

    pub(crate) fn rx_armed(&self) -> bool {
        self.rx_irq.load(Ordering::SeqCst)
    }

    pub(crate) fn baud(&self) -> u32 {
        self.baud.load(Ordering::SeqCst)
    }

    pub(crate) fn configure_calls(&self) -> usize {
        self.configure_calls.load(Ordering::SeqCst)
    }
}

impl SerialHardware for FakeUart {
    fn configure(&self, baud: u32) {
        self.baud.store(baud, Ordering::SeqCst);
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        // Reprogramming masks every interrupt source, like the PL011
        self.rx_irq.store(false, Ordering::SeqCst);
        self.tx_irq.store(false, Ordering::SeqCst);
    }

    fn enable_rx_interrupt(&self) {
        self.rx_irq.store(true, Ordering::SeqCst);
    }

    fn enable_tx_interrupt(&self) {
        self.tx_irq.store(true, Ordering::SeqCst);
    }

    fn disable_tx_interrupt(&self) {
        self.tx_irq.store(false, Ordering::SeqCst);
    }

    fn read_byte(&self) -> u8 {
        self.line.lock().unwrap().pop_front().unwrap_or(0)
    }

    fn write_byte(&self, byte: u8) {
        self.wire.lock().unwrap().push(byte);
    }

    fn tx_ready(&self) -> bool {
        self.tx_armed()
    }

    fn rx_has_data(&self) -> bool {
        self.rx_armed() && self.pending_input() > 0
    }
}

/// Run the handler until the fake raises no more interrupts.
pub(crate) fn pump<const C: usize>(port: &Port<C>, hw: &FakeUart) {
    while hw.tx_ready() || hw.rx_has_data() {
        // SAFETY: tests drive each port's handler from one thread at a time
        unsafe { port.service_interrupt() };
    }
}
