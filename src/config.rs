//! Build-time configuration
//!
//! Everything here is a compile-time constant. Firmware that needs other
//! values instantiates the generic types directly.

/// Capacity of each per-port TX and RX queue in bytes.
pub const UART_BUFFER_SIZE: usize = 64;

/// Reference clock feeding the PL011 on the QEMU virt machine.
pub const PL011_CLOCK_HZ: u32 = 24_000_000;

/// QEMU virt machine PL011 UART base address
pub const QEMU_VIRT_PL011_BASE: usize = 0x0900_0000;

/// Baud rate used when firmware has no better idea.
pub const DEFAULT_BAUD: u32 = 115_200;
