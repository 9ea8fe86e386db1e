//! bufuart - Interrupt-Driven Buffered UART Driver
//!
//! Decouples byte-level UART traffic from interrupt timing with a pair of
//! fixed-capacity queues per port.
//!
//! # Layers
//! - `queue`: lock-free single-producer/single-consumer byte ring
//! - `drivers`: the hardware collaborator trait and a PL011 backend
//! - `serial`: port registry, foreground driver API and interrupt entry
//!
//! # Concurrency Model
//! - One foreground context and one interrupt context per port
//! - The interrupt handler never blocks and never takes a lock
//! - Foreground reads and writes may block, according to a `WaitPolicy`
//!
//! # Target Requirements
//! The queues use only atomic loads and stores. The port layer also uses
//! atomic read-modify-write (`fetch_add`, `swap`) and `spin::Mutex`, so
//! the target must provide compare-and-swap.
//!
//! # Usage
//! ```ignore
//! static UART1: Pl011 = unsafe { Pl011::qemu_virt() };
//! static SERIAL: SerialPorts<1, UART_BUFFER_SIZE> =
//!     SerialPorts::new(&SYSTICK, [Port::new(PortId::USART1, &UART1)]);
//! serial_irq_handler!(UART0_IRQHandler => SERIAL, PortId::USART1);
//!
//! SERIAL.init(PortId::USART1, DEFAULT_BAUD)?;
//! SERIAL.set_autocrlf(PortId::USART1, true)?;
//! uprintln!(SERIAL, PortId::USART1, "hello");
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod drivers;
pub mod queue;
pub mod serial;

#[cfg(test)]
mod testing;

pub use drivers::SerialHardware;
pub use queue::{ByteQueue, Clock, QueueError, WaitPolicy};
pub use serial::{Port, PortHandle, PortId, PortStatus, PortWriter, SerialError, SerialPorts};
