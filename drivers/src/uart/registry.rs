//! Handle-to-transport association table.
//!
//! Hardware completion callbacks identify a peripheral only by its opaque
//! handle; they carry no context pointer. This table lets the free
//! interrupt entry points recover the owning [`Uart`] instance from that
//! handle alone.
//!
//! Registration happens from thread context while the corresponding
//! interrupt line is still masked. Once a slot is published it is never
//! mutated again, so steady-state lookups are plain reads and take no lock
//! in interrupt context.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use common::sync::{IrqControl, SpinLock};

use super::{Error, Uart};
use crate::hal::serial::SerialDevice;

/// Most transport instances one registry can track.
pub const MAX_INTERFACES: usize = 4;

type Entry<'a, D: SerialDevice, I: IrqControl> = Option<(D::Handle, &'a Uart<'a, D, I>)>;

/// Fixed-capacity, write-once lookup table from peripheral handle to the
/// transport instance that owns it.
///
/// The registry only looks instances up; it never owns them. It is an
/// ordinary constructible value so tests can build independent registries
/// rather than sharing process-wide state.
pub struct UartRegistry<'a, D: SerialDevice, I: IrqControl> {
    slots: [UnsafeCell<Entry<'a, D, I>>; MAX_INTERFACES],
    registered: AtomicUsize,
    write_lock: SpinLock<()>,
}

// SAFETY: slots below `registered` are published with release ordering and
// never written again; concurrent readers only ever observe completed
// entries.
unsafe impl<'a, D: SerialDevice, I: IrqControl> Sync for UartRegistry<'a, D, I>
where
    D::Handle: Sync,
    Uart<'a, D, I>: Sync,
{
}

impl<'a, D: SerialDevice, I: IrqControl> UartRegistry<'a, D, I> {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            slots: [const { UnsafeCell::new(None) }; MAX_INTERFACES],
            registered: AtomicUsize::new(0),
            write_lock: SpinLock::new(()),
        }
    }

    /// Associates `handle` with `uart`.
    ///
    /// Thread context only, and strictly before the interrupt line for
    /// `handle` is enabled; that discipline is what makes lock-free
    /// [`UartRegistry::lookup`] sound. A handle can be registered at most
    /// once.
    pub fn register(&self, handle: D::Handle, uart: &'a Uart<'a, D, I>) -> Result<(), Error> {
        let _guard = self.write_lock.lock();

        let count = self.registered.load(Ordering::Acquire);
        for slot in &self.slots[..count] {
            // SAFETY: published slots are never mutated again
            if let Some((existing, _)) = unsafe { &*slot.get() } {
                if *existing == handle {
                    return Err(Error::HandleInUse);
                }
            }
        }
        if count == MAX_INTERFACES {
            return Err(Error::TooManyInterfaces);
        }

        // SAFETY: `write_lock` serializes writers, and slot `count` is not
        // visible to readers until the store below publishes it
        unsafe { *self.slots[count].get() = Some((handle, uart)) };
        self.registered.store(count + 1, Ordering::Release);
        Ok(())
    }

    /// Returns the transport registered under `handle`, if any.
    ///
    /// Safe to call from interrupt context: a bounded scan over published
    /// slots, no locking.
    pub fn lookup(&self, handle: D::Handle) -> Option<&'a Uart<'a, D, I>> {
        let count = self.registered.load(Ordering::Acquire);
        for slot in &self.slots[..count] {
            // SAFETY: published slots are never mutated again
            if let Some((registered, uart)) = unsafe { &*slot.get() } {
                if *registered == handle {
                    return Some(*uart);
                }
            }
        }
        None
    }
}

impl<'a, D: SerialDevice, I: IrqControl> Default for UartRegistry<'a, D, I> {
    fn default() -> Self {
        Self::new()
    }
}
