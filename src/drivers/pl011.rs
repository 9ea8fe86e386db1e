//! PL011 UART Backend
//!
//! Implements [`SerialHardware`] for the ARM PrimeCell PL011, the UART
//! found on the QEMU virt machine and many Cortex-A/R boards.
//!
//! # Memory Map (QEMU virt)
//! - Base address: 0x0900_0000
//! - Register size: 0x1000 bytes
//!
//! # Operating Mode
//! - 8 data bits, no parity, 1 stop bit
//! - FIFOs disabled, so every interrupt moves exactly one byte
//! - Transmit readiness is reported as a level: armed in IMSC and the
//!   holding register not full
//!
//! # Safety Considerations
//! - All register access is volatile and goes through `read`/`write`
//! - The base address is trusted once `Pl011::new` has been called

use bitflags::bitflags;

use super::hal::SerialHardware;
use crate::config::{PL011_CLOCK_HZ, QEMU_VIRT_PL011_BASE};

/// PL011 Register offsets
mod regs {
    /// Data Register - read/write data
    pub const DR: usize = 0x00;
    /// Flag Register - status flags
    pub const FR: usize = 0x18;
    /// Integer baud rate divisor
    pub const IBRD: usize = 0x24;
    /// Fractional baud rate divisor
    pub const FBRD: usize = 0x28;
    /// Line control
    pub const LCRH: usize = 0x2C;
    /// Control
    pub const CR: usize = 0x30;
    /// Interrupt mask set/clear
    pub const IMSC: usize = 0x38;
    /// Interrupt clear
    pub const ICR: usize = 0x44;
}

bitflags! {
    /// Flag Register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// UART busy transmitting
        const BUSY = 1 << 3;
        /// Receive holding register empty
        const RXFE = 1 << 4;
        /// Transmit holding register full
        const TXFF = 1 << 5;
    }

    /// Interrupt bits, shared by IMSC, RIS, MIS and ICR
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u32 {
        const RX = 1 << 4;
        const TX = 1 << 5;
        const ALL = 0x7FF;
    }

    /// Line control bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineControl: u32 {
        /// FIFO enable
        const FEN = 1 << 4;
        /// 8-bit words
        const WLEN_8 = 0b11 << 5;
    }

    /// Control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        const UARTEN = 1 << 0;
        const TXE = 1 << 8;
        const RXE = 1 << 9;
    }
}

/// PL011 UART instance
#[derive(Debug)]
pub struct Pl011 {
    base: usize,
    clock_hz: u32,
}

impl Pl011 {
    /// Describe a PL011 at `base` fed by a `clock_hz` reference clock.
    ///
    /// # Safety
    /// `base` must point at a mapped PL011 register block, and no other
    /// driver may program the same block.
    pub const unsafe fn new(base: usize, clock_hz: u32) -> Self {
        Self { base, clock_hz }
    }

    /// The UART at the fixed QEMU virt machine address.
    ///
    /// # Safety
    /// Only valid when actually running on the QEMU virt machine.
    pub const unsafe fn qemu_virt() -> Self {
        // SAFETY: forwarded to the caller
        unsafe { Self::new(QEMU_VIRT_PL011_BASE, PL011_CLOCK_HZ) }
    }

    /// Integer and fractional divisors for `baud`.
    ///
    /// A baud rate of zero is treated as one rather than dividing by zero.
    pub const fn divisors(clock_hz: u32, baud: u32) -> (u32, u32) {
        let baud = if baud == 0 { 1 } else { baud as u64 };
        // clock / (16 * baud) in 1/64 units, rounded to nearest
        let div64 = (4 * clock_hz as u64 + baud / 2) / baud;
        let ibrd = (div64 >> 6) as u32 & 0xFFFF;
        let fbrd = (div64 & 0x3F) as u32;
        (ibrd, fbrd)
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: base was validated by the caller of `new`; offset is one
        // of the register constants above
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: same as `read`
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.read(regs::FR))
    }

    fn mask(&self) -> Interrupts {
        Interrupts::from_bits_truncate(self.read(regs::IMSC))
    }

    fn set_mask(&self, mask: Interrupts) {
        self.write(regs::IMSC, mask.bits());
    }
}

impl SerialHardware for Pl011 {
    fn configure(&self, baud: u32) {
        // Disable while reprogramming
        self.write(regs::CR, 0);
        while self.flags().contains(Flags::BUSY) {
            core::hint::spin_loop();
        }

        self.set_mask(Interrupts::empty());
        self.write(regs::ICR, Interrupts::ALL.bits());

        let (ibrd, fbrd) = Self::divisors(self.clock_hz, baud);
        self.write(regs::IBRD, ibrd);
        self.write(regs::FBRD, fbrd);
        // LCRH write latches the divisors
        self.write(regs::LCRH, LineControl::WLEN_8.bits());

        self.write(regs::CR, (Control::UARTEN | Control::TXE | Control::RXE).bits());
    }

    fn enable_rx_interrupt(&self) {
        self.set_mask(self.mask() | Interrupts::RX);
    }

    fn enable_tx_interrupt(&self) {
        self.set_mask(self.mask() | Interrupts::TX);
    }

    fn disable_tx_interrupt(&self) {
        self.set_mask(self.mask() - Interrupts::TX);
    }

    fn read_byte(&self) -> u8 {
        (self.read(regs::DR) & 0xFF) as u8
    }

    fn write_byte(&self, byte: u8) {
        self.write(regs::DR, byte as u32);
    }

    fn tx_ready(&self) -> bool {
        self.mask().contains(Interrupts::TX) && !self.flags().contains(Flags::TXFF)
    }

    fn rx_has_data(&self) -> bool {
        !self.flags().contains(Flags::RXFE)
    }
}
