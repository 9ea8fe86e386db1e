//! Port registry
//!
//! A fixed table of the ports compiled into the firmware. Ports that are
//! not wired up are simply not listed. Every operation is addressed by
//! [`PortId`] and fails with [`SerialError::NoDevice`] for ids the table
//! does not contain.
//!
//! # Example
//! ```ignore
//! static UART1: Pl011 = unsafe { Pl011::qemu_virt() };
//! static SERIAL: SerialPorts<1, UART_BUFFER_SIZE> =
//!     SerialPorts::new(&TICKS, [Port::new(PortId::USART1, &UART1)]);
//!
//! serial_irq_handler!(UART0_IRQHandler => SERIAL, PortId::USART1);
//! ```

use super::error::SerialError;
use super::port::{Port, PortHandle, PortId, PortStatus};
use crate::queue::{Clock, WaitPolicy};

/// Registry of `N` ports, each with `C`-byte queues.
pub struct SerialPorts<const N: usize, const C: usize> {
    clock: &'static dyn Clock,
    ports: [Port<C>; N],
}

impl<const N: usize, const C: usize> SerialPorts<N, C> {
    /// Build the registry.
    ///
    /// Duplicate ids are rejected; in a `static` that is a build error.
    pub const fn new(clock: &'static dyn Clock, ports: [Port<C>; N]) -> Self {
        let mut i = 0;
        while i < N {
            let mut j = i + 1;
            while j < N {
                assert!(
                    ports[i].id().raw() != ports[j].id().raw(),
                    "duplicate serial port id"
                );
                j += 1;
            }
            i += 1;
        }
        Self { clock, ports }
    }

    /// Resolve an id to its port.
    pub fn lookup(&self, id: PortId) -> Option<PortHandle<'_, C>> {
        self.ports
            .iter()
            .find(|port| port.id() == id)
            .map(|port| port.handle(self.clock))
    }

    /// Ids of all registered ports, in table order.
    pub fn ids(&self) -> impl Iterator<Item = PortId> + '_ {
        self.ports.iter().map(Port::id)
    }

    #[inline]
    fn port(&self, id: PortId) -> Result<PortHandle<'_, C>, SerialError> {
        self.lookup(id).ok_or(SerialError::NoDevice)
    }

    pub fn init(&self, id: PortId, baud: u32) -> Result<(), SerialError> {
        self.port(id)?.init(baud);
        Ok(())
    }

    pub fn set_autocrlf(&self, id: PortId, enabled: bool) -> Result<(), SerialError> {
        self.port(id)?.set_autocrlf(enabled);
        Ok(())
    }

    pub fn write(&self, id: PortId, bytes: &[u8]) -> Result<usize, SerialError> {
        self.port(id)?.write(bytes)
    }

    pub fn try_write(&self, id: PortId, bytes: &[u8]) -> Result<usize, SerialError> {
        self.port(id)?.try_write(bytes)
    }

    pub fn putchar(&self, id: PortId, byte: u8) -> Result<usize, SerialError> {
        self.port(id)?.putchar(byte)
    }

    pub fn read(&self, id: PortId, buf: &mut [u8], policy: WaitPolicy) -> Result<usize, SerialError> {
        self.port(id)?.read(buf, policy)
    }

    pub fn getchar(&self, id: PortId, policy: WaitPolicy) -> Result<Option<u8>, SerialError> {
        self.port(id)?.getchar(policy)
    }

    pub fn rx_overflow(&self, id: PortId) -> Result<bool, SerialError> {
        Ok(self.port(id)?.rx_overflow())
    }

    pub fn clear_rx_overflow(&self, id: PortId) -> Result<bool, SerialError> {
        Ok(self.port(id)?.clear_rx_overflow())
    }

    pub fn status(&self, id: PortId) -> Result<PortStatus, SerialError> {
        Ok(self.port(id)?.status())
    }

    /// Interrupt entry for port `id`. Unknown ids are ignored.
    ///
    /// # Safety
    /// See [`Port::service_interrupt`].
    pub unsafe fn service_interrupt(&self, id: PortId) {
        if let Some(port) = self.ports.iter().find(|port| port.id() == id) {
            // SAFETY: forwarded to the caller
            unsafe { port.service_interrupt() };
        }
    }
}

impl<const N: usize, const C: usize> core::fmt::Debug for SerialPorts<N, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.ports.iter()).finish()
    }
}

/// Define an interrupt vector entry that services one registry port.
///
/// ```ignore
/// serial_irq_handler!(USART1_IRQHandler => SERIAL, PortId::USART1);
/// ```
#[macro_export]
macro_rules! serial_irq_handler {
    ($handler:ident => $ports:expr, $id:expr) => {
        #[no_mangle]
        pub extern "C" fn $handler() {
            // SAFETY: only the interrupt vector table calls this handler
            unsafe { $ports.service_interrupt($id) }
        }
    };
}
