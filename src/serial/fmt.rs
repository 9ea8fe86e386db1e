//! Formatted output over a serial port

use core::fmt;

use super::port::PortHandle;

/// `core::fmt::Write` adapter for a port.
///
/// Output goes through the blocking `write` path, so autocrlf applies.
pub struct PortWriter<'a, const C: usize> {
    port: PortHandle<'a, C>,
}

impl<'a, const C: usize> PortHandle<'a, C> {
    /// Formatting adapter for this port.
    pub fn writer(&self) -> PortWriter<'a, C> {
        PortWriter { port: *self }
    }
}

impl<const C: usize> fmt::Write for PortWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.port.write(s.as_bytes()).map(|_| ()).map_err(|_| fmt::Error)
    }
}

/// Print to a registry port
///
/// Does nothing if the port is not registered. Errors are discarded.
#[macro_export]
macro_rules! uprint {
    ($ports:expr, $id:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        if let Some(port) = $ports.lookup($id) {
            let _ = write!(port.writer(), $($arg)*);
        }
    }};
}

/// Println to a registry port
#[macro_export]
macro_rules! uprintln {
    ($ports:expr, $id:expr) => {
        $crate::uprint!($ports, $id, "\n")
    };
    ($ports:expr, $id:expr, $($arg:tt)*) => {{
        $crate::uprint!($ports, $id, $($arg)*);
        $crate::uprint!($ports, $id, "\n");
    }};
}
