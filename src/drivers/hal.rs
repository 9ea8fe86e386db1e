//! Hardware collaborator interface
//!
//! The serial core never touches registers itself. Everything it needs
//! from a UART is listed here.

/// One UART instance as seen by the buffered driver.
///
/// Methods are called from both the foreground and the interrupt handler,
/// so implementations must be callable through a shared reference.
/// `enable_tx_interrupt` runs in the foreground while
/// `disable_tx_interrupt` runs in the handler; an implementation whose
/// mask register needs a read-modify-write must tolerate that overlap.
pub trait SerialHardware: Sync {
    /// Program baud rate and frame format, and enable the peripheral.
    fn configure(&self, baud: u32);

    /// Let the hardware signal "byte available for read".
    fn enable_rx_interrupt(&self);

    /// Let the hardware signal "ready to accept a byte for write".
    ///
    /// Must be idempotent.
    fn enable_tx_interrupt(&self);

    /// Stop signalling transmit readiness.
    fn disable_tx_interrupt(&self);

    /// Read the received byte. Clears the receive condition.
    fn read_byte(&self) -> u8;

    /// Hand one byte to the transmitter.
    fn write_byte(&self, byte: u8);

    /// True when the transmit interrupt is armed and the transmitter can
    /// take a byte.
    fn tx_ready(&self) -> bool;

    /// True when a received byte is waiting.
    fn rx_has_data(&self) -> bool;
}
