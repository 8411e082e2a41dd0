//! Loopback firmware exercising the serial transport.
//!
//! Brings up USART3 behind a [`Uart`] transport, then cooperatively drains
//! the event queue and echoes every received byte back out. Board support
//! (clock tree, pin multiplexing, vector table) runs before
//! `firmware_main` and is not handled here.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

mod board;
mod irq;
mod klog;

use common::arch::CurrentIrq;
use common::event::{EventKind, EventQueue};
use drivers::hal::serial::SerialConfig;
use drivers::hw::usart::{USART3_BASE, Usart, UsartId};
use drivers::uart::{Uart, UartRegistry};
use spin::Once;

/// Events produced by the receive interrupt path, drained by the main loop.
static EVENTS: EventQueue<32> = EventQueue::new();

// SAFETY: one instance per peripheral; board support maps the block.
static USART3: Usart<CurrentIrq> = unsafe { Usart::new(USART3_BASE, UsartId::Usart3) };

// SAFETY: the pin is dedicated to this indicator.
static FAULT_LED: board::LedPin = unsafe { board::LedPin::new(board::GPIOB_BASE, 7) };

static TRANSPORT: Uart<'static, Usart<CurrentIrq>, CurrentIrq> =
    Uart::with_fault_indicator(&USART3, &EVENTS, &FAULT_LED);

static REGISTRY: UartRegistry<'static, Usart<CurrentIrq>, CurrentIrq> = UartRegistry::new();

static INIT: Once = Once::new();

/// One-time bring-up. Safe to call again; later calls do nothing.
fn init() {
    INIT.call_once(|| {
        klog::init();
        FAULT_LED.set_output_mode();

        if let Err(err) = TRANSPORT.start(&REGISTRY, SerialConfig::default()) {
            log::error!("transport bring-up failed: {:?}", err);
            return;
        }

        // The transport is registered; callbacks may fire from here on.
        irq::unmask(UsartId::Usart3.irq_number());
        log::info!("serial loopback ready");
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn firmware_main() -> ! {
    init();

    let _ = TRANSPORT.send_str("READY ");

    loop {
        // Always deplete the queue before sleeping so events are consumed
        // faster than the wire can produce them.
        while let Some(event) = EVENTS.try_pop() {
            match event.kind() {
                EventKind::ByteReceived => {
                    if TRANSPORT.send_byte(event.byte()).is_err() {
                        log::warn!("echo byte dropped, transmit queue full");
                    }
                }
            }
        }

        irq::wait_for_interrupt();
    }
}

// Required panic handler
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

// Host builds only type-check the firmware; there is nothing to run.
#[cfg(not(target_os = "none"))]
fn main() {}
