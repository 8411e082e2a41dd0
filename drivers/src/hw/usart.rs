//! STM32-style USART driver.
//!
//! Implements [`SerialDevice`] on top of the memory-mapped USART block
//! found on STM32F4-class parts. Transfers are interrupt-driven: the
//! transmit path latches a frame and feeds the data register one byte per
//! transmit-empty interrupt; the receive path captures bytes on
//! receive-not-empty interrupts until the armed count is reached.
//!
//! The raw interrupt vector calls [`Usart::service`], which advances the
//! in-flight transfers and reports which transport-level conditions
//! (receive filled, transmit drained) completed. The platform glue forwards
//! those conditions, handle attached, to the transport callbacks.

use bitflags::bitflags;
use common::sync::{IrqControl, IrqSpinLock};
use core::ptr::{read_volatile, write_volatile};

use crate::hal::serial::{DataBits, Parity, SerialConfig, SerialDevice, SerialError, StopBits};

/// APB1 bus clock feeding USART2/USART3.
pub const APB1_CLOCK_HZ: u32 = 45_000_000;

pub const USART2_BASE: usize = 0x4000_4400;
pub const USART3_BASE: usize = 0x4000_4800;

/// Bytes the transmit latch can hold; bounds a single `start_send`.
pub const TX_LATCH_LEN: usize = 128;
/// Bytes the receive capture can hold; bounds a single `start_receive`.
pub const RX_CAPTURE_LEN: usize = 8;

// Register offsets
const SR_OFFSET: usize = 0x00;
const DR_OFFSET: usize = 0x04;
const BRR_OFFSET: usize = 0x08;
const CR1_OFFSET: usize = 0x0C;
const CR2_OFFSET: usize = 0x10;

// Control Register 2 (CR2) stop-bit field
const CR2_STOP_MASK: u32 = 0b11 << 12;
const CR2_STOP_2: u32 = 0b10 << 12;

bitflags! {
    /// Status register (SR) bits.
    #[derive(Debug, Copy, Clone)]
    pub struct Sr: u32 {
        const PE   = 1 << 0;
        const FE   = 1 << 1;
        const NF   = 1 << 2;
        const ORE  = 1 << 3;
        const IDLE = 1 << 4;
        const RXNE = 1 << 5;
        const TC   = 1 << 6;
        const TXE  = 1 << 7;
    }

    /// Control register 1 (CR1) bits.
    #[derive(Debug, Copy, Clone)]
    pub struct Cr1: u32 {
        const RE     = 1 << 2;
        const TE     = 1 << 3;
        const RXNEIE = 1 << 5;
        const TXEIE  = 1 << 7;
        const PS     = 1 << 9;
        const PCE    = 1 << 10;
        const M      = 1 << 12;
        const UE     = 1 << 13;
    }
}

/// Logical USART interface identifier.
///
/// Doubles as the opaque handle interrupt completions carry; the transport
/// registry maps it back to the owning instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UsartId {
    Usart2,
    Usart3,
}

impl UsartId {
    /// NVIC interrupt line for this interface.
    pub const fn irq_number(self) -> u32 {
        match self {
            UsartId::Usart2 => 38,
            UsartId::Usart3 => 39,
        }
    }
}

/// Transfer conditions completed by a [`Usart::service`] call.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ServiceEvents {
    /// The armed receive count was reached.
    pub rx_filled: bool,
    /// The latched transmit frame was fully handed to the hardware.
    pub tx_drained: bool,
}

struct TransferState {
    tx: [u8; TX_LATCH_LEN],
    tx_len: usize,
    tx_pos: usize,
    tx_active: bool,
    rx: [u8; RX_CAPTURE_LEN],
    rx_expected: usize,
    rx_count: usize,
    rx_active: bool,
}

impl TransferState {
    const fn new() -> Self {
        Self {
            tx: [0; TX_LATCH_LEN],
            tx_len: 0,
            tx_pos: 0,
            tx_active: false,
            rx: [0; RX_CAPTURE_LEN],
            rx_expected: 0,
            rx_count: 0,
            rx_active: false,
        }
    }
}

/// Memory-mapped USART peripheral.
///
/// All methods take `&self`; the in-flight transfer state lives behind an
/// interrupt-masking spinlock so the driver can be shared between thread
/// context and the interrupt vector that services it.
pub struct Usart<I: IrqControl> {
    base: usize,
    id: UsartId,
    state: IrqSpinLock<TransferState, I>,
}

impl<I: IrqControl> Usart<I> {
    /// Create a new USART instance.
    ///
    /// # Safety
    ///
    /// - `base` must point to a valid USART peripheral
    /// - Only one instance may exist per peripheral
    /// - Memory must be properly mapped as device memory
    pub const unsafe fn new(base: usize, id: UsartId) -> Self {
        Self {
            base,
            id,
            state: IrqSpinLock::new(TransferState::new()),
        }
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn set_cr1(&self, bits: Cr1) {
        self.write_reg(CR1_OFFSET, self.read_reg(CR1_OFFSET) | bits.bits());
    }

    fn clear_cr1(&self, bits: Cr1) {
        self.write_reg(CR1_OFFSET, self.read_reg(CR1_OFFSET) & !bits.bits());
    }

    /// Advance in-flight transfers. Called from the interrupt vector; the
    /// returned conditions are forwarded to the transport callbacks.
    pub fn service(&self) -> ServiceEvents {
        let mut events = ServiceEvents::default();
        let mut state = self.state.lock();
        let sr = Sr::from_bits_truncate(self.read_reg(SR_OFFSET));

        if state.rx_active && sr.contains(Sr::RXNE) {
            // Reading DR clears RXNE (and a pending overrun).
            let byte = (self.read_reg(DR_OFFSET) & 0xFF) as u8;
            let count = state.rx_count;
            if count < RX_CAPTURE_LEN {
                state.rx[count] = byte;
                state.rx_count = count + 1;
            }
            if state.rx_count == state.rx_expected {
                state.rx_active = false;
                self.clear_cr1(Cr1::RXNEIE);
                events.rx_filled = true;
            }
        }

        if state.tx_active && sr.contains(Sr::TXE) {
            let pos = state.tx_pos;
            self.write_reg(DR_OFFSET, state.tx[pos] as u32);
            state.tx_pos = pos + 1;
            if state.tx_pos == state.tx_len {
                state.tx_active = false;
                self.clear_cr1(Cr1::TXEIE);
                events.tx_drained = true;
            }
        }

        events
    }

    /// Write bytes by polling, bypassing the interrupt machinery.
    ///
    /// Intended for log and panic output. Output interleaves byte-wise with
    /// any interrupt-driven transmission in flight.
    pub fn debug_write(&self, bytes: &[u8]) {
        let _guard = self.state.lock();
        for &byte in bytes {
            while !Sr::from_bits_truncate(self.read_reg(SR_OFFSET)).contains(Sr::TXE) {
                core::hint::spin_loop();
            }
            self.write_reg(DR_OFFSET, byte as u32);
        }
    }
}

/// Calculate the BRR divisor for 16x oversampling.
fn compute_brr(clock_hz: u32, baud_rate: u32) -> Result<u32, SerialError> {
    if baud_rate == 0 {
        return Err(SerialError::InvalidConfig);
    }

    // BRR encodes the divider as a 12.4 fixed-point value; at 16x
    // oversampling that equals clock / baud, rounded.
    let divisor = (clock_hz + baud_rate / 2) / baud_rate;

    if divisor < 16 || divisor > 0xFFFF {
        return Err(SerialError::InvalidConfig);
    }

    Ok(divisor)
}

impl<I: IrqControl> SerialDevice for Usart<I> {
    type Handle = UsartId;

    fn handle(&self) -> UsartId {
        self.id
    }

    fn configure(&self, config: SerialConfig) -> Result<(), SerialError> {
        let brr = compute_brr(APB1_CLOCK_HZ, config.baud_rate)?;

        let mut cr1 = Cr1::UE | Cr1::TE | Cr1::RE;
        match (config.data_bits, config.parity) {
            (DataBits::Eight, Parity::None) => {}
            (DataBits::Eight, parity) => {
                // The parity bit rides in the ninth frame position.
                cr1 |= Cr1::M | Cr1::PCE;
                if parity == Parity::Odd {
                    cr1 |= Cr1::PS;
                }
            }
            (DataBits::Nine, Parity::None) => cr1 |= Cr1::M,
            _ => return Err(SerialError::InvalidConfig),
        }

        let mut state = self.state.lock();
        *state = TransferState::new();

        // Disable while reprogramming, then bring the interface up.
        self.write_reg(CR1_OFFSET, 0);
        self.write_reg(BRR_OFFSET, brr);

        let mut cr2 = self.read_reg(CR2_OFFSET) & !CR2_STOP_MASK;
        if config.stop_bits == StopBits::Two {
            cr2 |= CR2_STOP_2;
        }
        self.write_reg(CR2_OFFSET, cr2);
        self.write_reg(CR1_OFFSET, cr1.bits());

        Ok(())
    }

    fn start_send(&self, data: &[u8]) -> Result<(), SerialError> {
        if data.len() > TX_LATCH_LEN {
            return Err(SerialError::FrameTooLong);
        }

        let mut state = self.state.lock();
        if state.tx_active {
            return Err(SerialError::Busy);
        }

        state.tx[..data.len()].copy_from_slice(data);
        state.tx_len = data.len();
        state.tx_pos = 0;
        state.tx_active = !data.is_empty();
        if state.tx_active {
            self.set_cr1(Cr1::TXEIE);
        }
        Ok(())
    }

    fn stop_send(&self) {
        let mut state = self.state.lock();
        state.tx_active = false;
        self.clear_cr1(Cr1::TXEIE);
    }

    fn start_receive(&self, len: usize) -> Result<(), SerialError> {
        if len == 0 || len > RX_CAPTURE_LEN {
            return Err(SerialError::InvalidConfig);
        }

        let mut state = self.state.lock();
        if state.rx_active {
            return Err(SerialError::Busy);
        }

        state.rx_expected = len;
        state.rx_count = 0;
        state.rx_active = true;
        self.set_cr1(Cr1::RXNEIE);
        Ok(())
    }

    fn stop_receive(&self) {
        let mut state = self.state.lock();
        state.rx_active = false;
        self.clear_cr1(Cr1::RXNEIE);
    }

    fn read_received(&self, buf: &mut [u8]) -> usize {
        let state = self.state.lock();
        let count = state.rx_count.min(buf.len());
        buf[..count].copy_from_slice(&state.rx[..count]);
        count
    }
}
