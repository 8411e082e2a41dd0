//! Serial Port (UART) Hardware Abstraction Layer.
//!
//! This module defines platform-independent types for asynchronous serial
//! communication. Transfers are started from thread context and complete
//! through interrupts; the completion callbacks carry nothing but the
//! peripheral's [`SerialDevice::Handle`], which is why the transport keeps
//! a handle-to-instance registry.

/// Serial port configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate in bits per second.
    pub baud_rate: u32,
    /// Number of data bits per frame.
    pub data_bits: DataBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Number of stop bits.
    pub stop_bits: StopBits,
}

impl SerialConfig {
    /// Create a standard 8N1 configuration at the specified baud rate.
    ///
    /// 8N1 means: 8 data bits, no parity, 1 stop bit.
    pub const fn new_8n1(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl Default for SerialConfig {
    /// Default configuration: 115200 baud, 8N1.
    fn default() -> Self {
        Self::new_8n1(115200)
    }
}

/// Number of data bits per frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
    Nine,
}

/// Parity mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit.
    One,
    /// Two stop bits.
    Two,
}

/// Serial device errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SerialError {
    /// Framing error (invalid stop bit).
    Framing,
    /// Parity error (parity check failed).
    Parity,
    /// Noise detected on the line.
    Noise,
    /// Overrun error (data received faster than it could be read).
    Overrun,
    /// A transfer of this kind is already in flight.
    Busy,
    /// The frame exceeds what the device can latch in one transfer.
    FrameTooLong,
    /// Invalid configuration parameter.
    InvalidConfig,
}

/// Asynchronous serial device trait.
///
/// Implementations are internally synchronized: every method takes `&self`
/// so a device can be shared between the transport (thread context) and
/// the interrupt glue that services it. Completion is reported out-of-band:
/// the platform's interrupt layer observes *receive filled* and *transmit
/// drained* conditions and forwards them, handle attached, to the
/// transport's callback entry points.
pub trait SerialDevice {
    /// Identifies this peripheral in completion callbacks. The hardware
    /// interrupt carries no context pointer, so the handle is the only
    /// key available for finding the owning transport.
    type Handle: Copy + PartialEq + core::fmt::Debug;

    /// The handle completion callbacks will carry for this device.
    fn handle(&self) -> Self::Handle;

    /// Configure the device.
    ///
    /// This must be called before starting transfers.
    fn configure(&self, config: SerialConfig) -> Result<(), SerialError>;

    /// Latch `data` and begin an asynchronous transmission.
    ///
    /// The device copies `data` before returning; the caller may reuse the
    /// buffer immediately. At most one transmission may be in flight.
    fn start_send(&self, data: &[u8]) -> Result<(), SerialError>;

    /// Abort any transmission in progress.
    fn stop_send(&self);

    /// Arm reception of exactly `len` bytes. Completion is signaled
    /// through the receive-filled condition.
    fn start_receive(&self, len: usize) -> Result<(), SerialError>;

    /// Abort any reception in progress.
    fn stop_receive(&self);

    /// Copy the bytes captured by the last completed reception into `buf`,
    /// returning how many were written.
    fn read_received(&self, buf: &mut [u8]) -> usize;
}
