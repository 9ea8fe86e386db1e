//! Hardware backends for the serial core
//!
//! All drivers follow these principles:
//! - Minimal unsafe code, well-documented
//! - Register access through `&self` so interrupt and foreground code can
//!   share one instance without a lock
//! - No panics on invalid input

pub mod hal;
pub mod pl011;

pub use hal::SerialHardware;
pub use pl011::Pl011;
