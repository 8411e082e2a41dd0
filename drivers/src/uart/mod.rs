//! Byte transport over an asynchronous serial device.
//!
//! A [`Uart`] owns the send/receive state for one hardware interface and
//! bridges two worlds: thread-context producers calling [`Uart::send`],
//! and the interrupt callbacks the hardware fires when a transfer
//! completes. The hardware identifies itself in those callbacks only by an
//! opaque handle, so the free entry points [`rx_done`] and [`tx_empty`]
//! recover the owning instance through a [`UartRegistry`].
//!
//! # Transmit flow control
//!
//! At most one transmission is in flight per interface, tracked by the
//! ready flag:
//!
//! - ready + `send` -> bytes are copied to the transmit scratch buffer and
//!   handed to the hardware immediately; the flag clears
//! - busy + `send` -> bytes are appended to the bounded software queue
//! - transmit-drained interrupt, queue non-empty -> the next chunk (at
//!   most [`MAX_MSG_LEN`] bytes) starts; still busy
//! - transmit-drained interrupt, queue empty -> the flag sets; idle
//!
//! Queued bytes therefore leave in FIFO order, split into chunks no larger
//! than the scratch buffer.
//!
//! # Receive path
//!
//! Reception is re-armed for a single byte after every completion. Each
//! received byte becomes an [`Event`] pushed without blocking into the
//! consumer's queue; when the queue cannot take it, the byte is dropped,
//! a drop counter advances, and the fault indicator toggles. Dropping is
//! deliberate backpressure: the handler never retries and never blocks.

pub mod registry;

pub use registry::{MAX_INTERFACES, UartRegistry};

use core::fmt::{self, Write};

use common::collections::RingBuffer;
use common::event::{Event, EventKind, EventSink};
use common::sync::{IrqControl, IrqSpinLock};

use crate::hal::fault::FaultIndicator;
use crate::hal::serial::{SerialConfig, SerialDevice, SerialError};

/// Max length of messages in bytes. Anything longer must be broken down
/// into multiple messages by the caller.
pub const MAX_MSG_LEN: usize = 100;

/// Capacity of the software transmit queue.
const TX_QUEUE_LEN: usize = MAX_MSG_LEN * 2;

/// Receive scratch size; reception is armed one byte at a time.
const RX_SCRATCH_LEN: usize = 8;

/// Transport errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The message is not shorter than [`MAX_MSG_LEN`]; split it and retry.
    MessageTooLong,
    /// The software transmit queue lacks room for the whole message;
    /// nothing was enqueued.
    QueueFull,
    /// The registry already tracks [`MAX_INTERFACES`] transports.
    TooManyInterfaces,
    /// Another transport is registered under this handle.
    HandleInUse,
    /// The hardware refused an operation.
    Serial(SerialError),
}

struct Inner {
    tx_ready: bool,
    tx_queue: RingBuffer<u8, TX_QUEUE_LEN>,
    tx_buf: [u8; MAX_MSG_LEN],
    rx_buf: [u8; RX_SCRATCH_LEN],
    rx_dropped: u32,
}

/// Byte transport instance owning one serial interface.
///
/// Construct once at startup, then call [`Uart::start`] to register with
/// the interrupt dispatch registry, configure the hardware, and begin
/// receiving. Instances are never torn down; the transport runs for the
/// lifetime of the firmware.
pub struct Uart<'a, D: SerialDevice, I: IrqControl> {
    device: &'a D,
    events: &'a dyn EventSink,
    fault: Option<&'a dyn FaultIndicator>,
    inner: IrqSpinLock<Inner, I>,
}

impl<'a, D: SerialDevice, I: IrqControl> Uart<'a, D, I> {
    /// Creates a transport over `device` delivering receive events to
    /// `events`.
    pub const fn new(device: &'a D, events: &'a dyn EventSink) -> Self {
        Self {
            device,
            events,
            fault: None,
            inner: IrqSpinLock::new(Inner {
                tx_ready: true,
                tx_queue: RingBuffer::new(),
                tx_buf: [0; MAX_MSG_LEN],
                rx_buf: [0; RX_SCRATCH_LEN],
                rx_dropped: 0,
            }),
        }
    }

    /// Like [`Uart::new`], with a diagnostic output toggled whenever a
    /// received byte has to be dropped.
    pub const fn with_fault_indicator(
        device: &'a D,
        events: &'a dyn EventSink,
        fault: &'a dyn FaultIndicator,
    ) -> Self {
        let mut uart = Self::new(device, events);
        uart.fault = Some(fault);
        uart
    }

    /// Registers this transport, configures the hardware, and arms the
    /// first one-byte reception.
    ///
    /// The caller enables the interface's interrupt line only after this
    /// returns; the registry relies on registration happening strictly
    /// before the first callback can fire.
    pub fn start(
        &'a self,
        registry: &UartRegistry<'a, D, I>,
        config: SerialConfig,
    ) -> Result<(), Error> {
        self.device.configure(config).map_err(Error::Serial)?;
        registry.register(self.device.handle(), self)?;

        self.device.stop_receive();
        self.device.start_receive(1).map_err(Error::Serial)?;

        log::debug!("serial transport started on {:?}", self.device.handle());
        Ok(())
    }

    /// Queues `data` for asynchronous transmission.
    ///
    /// If the interface is idle the bytes go straight to the hardware;
    /// otherwise they are appended to the software queue and leave with
    /// the next transmit-drained interrupt. `data` is copied before the
    /// call returns and can be forgotten by the caller.
    ///
    /// All-or-nothing: on any error no byte of `data` is transmitted or
    /// queued.
    pub fn send(&self, data: &[u8]) -> Result<(), Error> {
        if data.len() >= MAX_MSG_LEN {
            return Err(Error::MessageTooLong);
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        if inner.tx_ready {
            inner.tx_ready = false;
            inner.tx_buf[..data.len()].copy_from_slice(data);
            self.device.stop_send();
            if let Err(err) = self.device.start_send(&inner.tx_buf[..data.len()]) {
                inner.tx_ready = true;
                return Err(Error::Serial(err));
            }
        } else {
            let free = inner.tx_queue.capacity() - inner.tx_queue.len();
            if free < data.len() {
                return Err(Error::QueueFull);
            }
            for &byte in data {
                // cannot fail: headroom was checked above
                let _ = inner.tx_queue.push_back(byte);
            }
        }
        Ok(())
    }

    /// Sends a single byte.
    pub fn send_byte(&self, byte: u8) -> Result<(), Error> {
        self.send(&[byte])
    }

    /// Sends the bytes of `text`.
    pub fn send_str(&self, text: &str) -> Result<(), Error> {
        self.send(text.as_bytes())
    }

    /// Sends the decimal rendering of `value`.
    pub fn send_int(&self, value: i32) -> Result<(), Error> {
        let mut text = FmtBuf::<16>::new();
        write!(text, "{}", value).map_err(|_| Error::MessageTooLong)?;
        self.send(text.as_bytes())
    }

    /// Sends `value` as its truncated integer part followed by a fixed
    /// placeholder for the fraction (`"3.X"`).
    ///
    /// Precision is discarded on purpose; callers that need fractional
    /// digits must format upstream.
    pub fn send_float(&self, value: f32) -> Result<(), Error> {
        let mut text = FmtBuf::<16>::new();
        write!(text, "{}.X", value as i32).map_err(|_| Error::MessageTooLong)?;
        self.send(text.as_bytes())
    }

    /// Whether no transmission is currently in flight.
    pub fn tx_ready(&self) -> bool {
        self.inner.lock().tx_ready
    }

    /// Bytes waiting in the software transmit queue.
    pub fn tx_pending(&self) -> usize {
        self.inner.lock().tx_queue.len()
    }

    /// Received bytes dropped because the event queue was unavailable.
    pub fn rx_dropped(&self) -> u32 {
        self.inner.lock().rx_dropped
    }

    /// Body of the receive-complete callback.
    fn handle_rx_done(&self) {
        let mut inner = self.inner.lock();
        let count = self.device.read_received(&mut inner.rx_buf);
        if count > 0 {
            let event = Event::new(EventKind::ByteReceived, inner.rx_buf[0]);
            if !self.events.try_push(event) {
                // Consumer not ready: drop the byte and make the loss
                // visible on the board.
                inner.rx_dropped = inner.rx_dropped.wrapping_add(1);
                if let Some(fault) = self.fault {
                    fault.toggle();
                }
            }
        }

        // Reception always restarts; a drop must not stall the interface.
        self.device.stop_receive();
        if self.device.start_receive(1).is_err() {
            log::error!("receive restart failed on {:?}", self.device.handle());
        }
    }

    /// Body of the transmit-drained callback.
    fn handle_tx_empty(&self) {
        let mut inner = self.inner.lock();
        if inner.tx_queue.is_empty() {
            inner.tx_ready = true;
            return;
        }

        // Drain the next chunk, clamped to the scratch buffer.
        let mut count = 0;
        while count < MAX_MSG_LEN {
            match inner.tx_queue.pop_front() {
                Some(byte) => {
                    inner.tx_buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }

        self.device.stop_send();
        if self.device.start_send(&inner.tx_buf[..count]).is_err() {
            // The chunk is lost; recover to idle so later sends still work.
            inner.tx_ready = true;
            log::error!("transmit restart failed on {:?}", self.device.handle());
        }
    }
}

/// Receive-complete interrupt entry point.
///
/// Looks up the transport owning `handle` and relays the captured byte to
/// its event sink. Runs in interrupt context: never blocks, never panics.
/// An unregistered handle means a callback fired for an interface nobody
/// started; it is reported and otherwise ignored.
pub fn rx_done<'a, D: SerialDevice, I: IrqControl>(
    registry: &UartRegistry<'a, D, I>,
    handle: D::Handle,
) {
    match registry.lookup(handle) {
        Some(uart) => uart.handle_rx_done(),
        None => log::error!("receive callback for unregistered interface {:?}", handle),
    }
}

/// Transmit-drained interrupt entry point.
///
/// Looks up the transport owning `handle` and either starts the next
/// queued chunk or marks the interface idle. Same context rules as
/// [`rx_done`].
pub fn tx_empty<'a, D: SerialDevice, I: IrqControl>(
    registry: &UartRegistry<'a, D, I>,
    handle: D::Handle,
) {
    match registry.lookup(handle) {
        Some(uart) => uart.handle_tx_empty(),
        None => log::error!("transmit callback for unregistered interface {:?}", handle),
    }
}

/// Stack-allocated `fmt::Write` sink for the numeric send helpers.
struct FmtBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> FmtBuf<N> {
    const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<const N: usize> fmt::Write for FmtBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > N {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, MAX_MSG_LEN, Uart, UartRegistry, rx_done, tx_empty};
    use crate::hal::fault::FaultIndicator;
    use crate::hal::serial::{SerialConfig, SerialDevice, SerialError};
    use common::event::{Event, EventKind, EventQueue, EventSink};
    use common::sync::{IrqControl, SpinLock};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoIrq;

    impl IrqControl for NoIrq {
        type State = ();

        fn disable() {}
        fn restore(_: ()) {}
    }

    #[derive(Default)]
    struct MockState {
        frames: Vec<Vec<u8>>,
        sending: bool,
        rx_bytes: Vec<u8>,
        receive_starts: usize,
        receive_stops: usize,
    }

    /// Scripted serial device: records every frame handed to it and plays
    /// back bytes staged with `stage_rx`.
    struct MockDevice {
        handle: u8,
        state: SpinLock<MockState>,
    }

    impl MockDevice {
        fn new(handle: u8) -> Self {
            Self {
                handle,
                state: SpinLock::new(MockState::default()),
            }
        }

        fn stage_rx(&self, bytes: &[u8]) {
            self.state.lock().rx_bytes = bytes.to_vec();
        }

        fn frames(&self) -> Vec<Vec<u8>> {
            self.state.lock().frames.clone()
        }

        fn receive_starts(&self) -> usize {
            self.state.lock().receive_starts
        }

        fn receive_stops(&self) -> usize {
            self.state.lock().receive_stops
        }
    }

    impl SerialDevice for MockDevice {
        type Handle = u8;

        fn handle(&self) -> u8 {
            self.handle
        }

        fn configure(&self, _config: SerialConfig) -> Result<(), SerialError> {
            Ok(())
        }

        fn start_send(&self, data: &[u8]) -> Result<(), SerialError> {
            let mut state = self.state.lock();
            if state.sending {
                return Err(SerialError::Busy);
            }
            state.sending = true;
            state.frames.push(data.to_vec());
            Ok(())
        }

        fn stop_send(&self) {
            self.state.lock().sending = false;
        }

        fn start_receive(&self, _len: usize) -> Result<(), SerialError> {
            self.state.lock().receive_starts += 1;
            Ok(())
        }

        fn stop_receive(&self) {
            self.state.lock().receive_stops += 1;
        }

        fn read_received(&self, buf: &mut [u8]) -> usize {
            let state = self.state.lock();
            let count = state.rx_bytes.len().min(buf.len());
            buf[..count].copy_from_slice(&state.rx_bytes[..count]);
            count
        }
    }

    #[derive(Default)]
    struct TestIndicator {
        toggles: AtomicU32,
    }

    impl FaultIndicator for TestIndicator {
        fn toggle(&self) {
            self.toggles.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start_uart<'a>(
        device: &'a MockDevice,
        uart: &'a Uart<'a, MockDevice, NoIrq>,
        registry: &UartRegistry<'a, MockDevice, NoIrq>,
    ) {
        uart.start(registry, SerialConfig::default()).unwrap();
        assert_eq!(device.receive_starts(), 1);
    }

    #[test]
    fn idle_send_transmits_immediately() {
        let device = MockDevice::new(3);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        assert!(uart.tx_ready());
        uart.send(b"AB").unwrap();

        assert!(!uart.tx_ready());
        assert_eq!(device.frames(), vec![b"AB".to_vec()]);
        assert_eq!(uart.tx_pending(), 0);

        // Nothing queued: the drain interrupt returns the interface to idle.
        tx_empty(&registry, 3);
        assert!(uart.tx_ready());
        assert_eq!(device.frames().len(), 1);
    }

    #[test]
    fn busy_send_queues_in_fifo_order() {
        let device = MockDevice::new(3);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        uart.send(b"AB").unwrap();
        uart.send(b"C").unwrap();
        uart.send(b"D").unwrap();
        assert_eq!(uart.tx_pending(), 2);

        tx_empty(&registry, 3);
        assert_eq!(device.frames(), vec![b"AB".to_vec(), b"CD".to_vec()]);
        assert_eq!(uart.tx_pending(), 0);
        assert!(!uart.tx_ready());

        tx_empty(&registry, 3);
        assert!(uart.tx_ready());
    }

    #[test]
    fn queued_bytes_drain_in_bounded_chunks() {
        let device = MockDevice::new(7);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        let first: Vec<u8> = (0..75).collect();
        let second: Vec<u8> = (100..175).collect();
        uart.send(b"!").unwrap();
        uart.send(&first).unwrap();
        uart.send(&second).unwrap();
        assert_eq!(uart.tx_pending(), 150);

        tx_empty(&registry, 7);
        tx_empty(&registry, 7);
        let frames = device.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].len(), MAX_MSG_LEN);
        assert_eq!(frames[2].len(), 50);

        // Chunk boundaries never reorder bytes.
        let drained: Vec<u8> = frames[1..].concat();
        let queued: Vec<u8> = first.iter().chain(second.iter()).copied().collect();
        assert_eq!(drained, queued);

        tx_empty(&registry, 7);
        assert!(uart.tx_ready());
    }

    #[test]
    fn oversized_message_is_rejected_untransmitted() {
        let device = MockDevice::new(1);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        let message = [b'x'; MAX_MSG_LEN];
        assert_eq!(uart.send(&message), Err(Error::MessageTooLong));
        assert!(uart.tx_ready());
        assert!(device.frames().is_empty());

        // One byte below the limit is accepted.
        uart.send(&message[..MAX_MSG_LEN - 1]).unwrap();
        assert_eq!(device.frames().len(), 1);
    }

    #[test]
    fn full_queue_rejects_whole_message() {
        let device = MockDevice::new(1);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        uart.send(b"!").unwrap();
        let chunk: Vec<u8> = (0..99).collect();
        uart.send(&chunk).unwrap();
        uart.send(&chunk).unwrap();
        assert_eq!(uart.tx_pending(), 198);

        // Three bytes do not fit in the remaining two slots; nothing of
        // the message may be enqueued.
        assert_eq!(uart.send(b"abc"), Err(Error::QueueFull));
        assert_eq!(uart.tx_pending(), 198);

        uart.send(b"ab").unwrap();
        assert_eq!(uart.tx_pending(), 200);
        assert_eq!(uart.send_byte(b'z'), Err(Error::QueueFull));
    }

    #[test]
    fn rx_done_delivers_event_and_restarts_receive() {
        let device = MockDevice::new(9);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        device.stage_rx(b"Z");
        rx_done(&registry, 9);

        let event = events.pop();
        assert_eq!(event.kind(), EventKind::ByteReceived);
        assert_eq!(event.byte(), b'Z');
        assert_eq!(device.receive_stops(), 2);
        assert_eq!(device.receive_starts(), 2);
        assert_eq!(uart.rx_dropped(), 0);
    }

    #[test]
    fn rx_overflow_drops_byte_toggles_fault_and_keeps_receiving() {
        let device = MockDevice::new(9);
        let events: EventQueue<1> = EventQueue::new();
        let fault = TestIndicator::default();
        let uart: Uart<'_, _, NoIrq> = Uart::with_fault_indicator(&device, &events, &fault);
        let registry = UartRegistry::new();
        uart.start(&registry, SerialConfig::default()).unwrap();

        assert!(events.try_push(Event::new(EventKind::ByteReceived, b'0')));

        device.stage_rx(b"1");
        rx_done(&registry, 9);

        // The new byte is gone, the original event survives, and the
        // interface keeps making receive progress.
        assert_eq!(uart.rx_dropped(), 1);
        assert_eq!(fault.toggles.load(Ordering::SeqCst), 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events.pop().byte(), b'0');
        assert_eq!(device.receive_starts(), 2);
    }

    #[test]
    fn callbacks_for_unregistered_handles_are_ignored() {
        let registry: UartRegistry<'_, MockDevice, NoIrq> = UartRegistry::new();

        // Must not panic; there is nothing on the other side of the
        // handle.
        rx_done(&registry, 42);
        tx_empty(&registry, 42);
    }

    #[test]
    fn registry_maps_each_handle_to_its_own_instance() {
        let device_a = MockDevice::new(1);
        let device_b = MockDevice::new(2);
        let events: EventQueue<8> = EventQueue::new();
        let uart_a: Uart<'_, _, NoIrq> = Uart::new(&device_a, &events);
        let uart_b = Uart::new(&device_b, &events);
        let registry = UartRegistry::new();

        uart_a.start(&registry, SerialConfig::default()).unwrap();
        uart_b.start(&registry, SerialConfig::default()).unwrap();

        assert!(std::ptr::eq(registry.lookup(1).unwrap(), &uart_a));
        assert!(std::ptr::eq(registry.lookup(2).unwrap(), &uart_b));
        assert!(registry.lookup(3).is_none());
    }

    #[test]
    fn registry_rejects_duplicate_handles() {
        let device_a = MockDevice::new(5);
        let device_b = MockDevice::new(5);
        let events: EventQueue<8> = EventQueue::new();
        let uart_a: Uart<'_, _, NoIrq> = Uart::new(&device_a, &events);
        let uart_b = Uart::new(&device_b, &events);
        let registry = UartRegistry::new();

        registry.register(5, &uart_a).unwrap();
        assert_eq!(registry.register(5, &uart_b), Err(Error::HandleInUse));
        assert!(std::ptr::eq(registry.lookup(5).unwrap(), &uart_a));
    }

    #[test]
    fn registry_rejects_more_than_capacity() {
        let devices: Vec<MockDevice> = (0..5).map(MockDevice::new).collect();
        let events: EventQueue<8> = EventQueue::new();
        let uarts: Vec<Uart<'_, MockDevice, NoIrq>> =
            devices.iter().map(|d| Uart::new(d, &events)).collect();
        let registry = UartRegistry::new();

        for (i, uart) in uarts.iter().take(4).enumerate() {
            registry.register(i as u8, uart).unwrap();
        }
        assert_eq!(
            registry.register(4, &uarts[4]),
            Err(Error::TooManyInterfaces)
        );
    }

    #[test]
    fn numeric_sends_format_through_fixed_buffers() {
        let device = MockDevice::new(1);
        let events: EventQueue<8> = EventQueue::new();
        let uart = Uart::new(&device, &events);
        let registry = UartRegistry::new();
        start_uart(&device, &uart, &registry);

        uart.send_int(-42).unwrap();
        tx_empty(&registry, 1);
        uart.send_float(3.9).unwrap();
        tx_empty(&registry, 1);
        uart.send_float(-2.5).unwrap();
        tx_empty(&registry, 1);
        uart.send_str("ok").unwrap();

        let frames = device.frames();
        assert_eq!(frames[0], b"-42".to_vec());
        assert_eq!(frames[1], b"3.X".to_vec());
        assert_eq!(frames[2], b"-2.X".to_vec());
        assert_eq!(frames[3], b"ok".to_vec());
    }
}
