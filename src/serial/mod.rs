//! Buffered serial ports
//!
//! Provides the driver API on top of the queues:
//! - `init`, `set_autocrlf`
//! - `write`, `try_write`, `putchar`
//! - `read`, `getchar`
//! - the per-port interrupt entry
//!
//! # Error Model
//! - Unknown port ids fail with `NoDevice`
//! - I/O before `init` fails with `NotConnected`
//! - Receive overflow is a latched flag, not an error

mod error;
mod fmt;
mod port;
mod registry;

pub use error::SerialError;
pub use fmt::PortWriter;
pub use port::{Port, PortHandle, PortId, PortStatus};
pub use registry::SerialPorts;
