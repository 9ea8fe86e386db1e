//! Caller-facing serial errors

use crate::queue::QueueError;

/// Error type for driver operations.
///
/// Discriminants are the negated errno values callers of a C-style driver
/// would expect.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// The port identifier does not name a port in the registry.
    NoDevice = -19,
    /// The port exists but `init` has not been called.
    NotConnected = -107,
    /// A queue operation failed under a non-blocking policy.
    Io = -5,
}

impl SerialError {
    /// Negative errno equivalent.
    #[inline]
    pub const fn errno(self) -> i32 {
        self as i32
    }
}

impl core::fmt::Display for SerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no such serial port"),
            Self::NotConnected => write!(f, "serial port not initialized"),
            Self::Io => write!(f, "serial queue unavailable"),
        }
    }
}

impl From<QueueError> for SerialError {
    fn from(_: QueueError) -> Self {
        Self::Io
    }
}
