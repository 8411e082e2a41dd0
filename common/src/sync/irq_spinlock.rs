use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

use super::irq::IrqControl;

/// Spinlock that masks interrupts for the duration of the critical section.
///
/// Acquisition disables interrupts through `I`, then spins for the lock;
/// dropping the guard releases the lock and restores the saved interrupt
/// state.
///
/// On a single-core target this is the lock of choice for state shared
/// between threads and interrupt handlers: a thread inside the critical
/// section has interrupts masked, so a handler can never observe the lock
/// held and never spins in interrupt context.
///
/// Not fair. Not reentrant.
pub struct IrqSpinLock<T, I: IrqControl> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
    _irq: PhantomData<I>, // Prevent unused type parameter warning
}

// SAFETY: exclusive access is enforced by the lock bit; the interrupt mask
// only extends that exclusion to handlers on the local core
unsafe impl<T: Send, I: IrqControl> Send for IrqSpinLock<T, I> {}
unsafe impl<T: Send, I: IrqControl> Sync for IrqSpinLock<T, I> {}

impl<T, I: IrqControl> IrqSpinLock<T, I> {
    /// Creates a new lock wrapping the provided data.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
            _irq: PhantomData,
        }
    }

    /// Acquires the lock with interrupts disabled.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T, I> {
        let irq_state = I::disable();

        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        IrqSpinLockGuard {
            lock: self,
            irq_state,
        }
    }
}

/// Guard returned by [`IrqSpinLock::lock`].
///
/// Releases the lock and restores the interrupt state on drop.
pub struct IrqSpinLockGuard<'a, T, I: IrqControl> {
    lock: &'a IrqSpinLock<T, I>,
    irq_state: I::State,
}

impl<T, I: IrqControl> core::ops::Deref for IrqSpinLockGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: The lock is held, so we have exclusive access
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, I: IrqControl> core::ops::DerefMut for IrqSpinLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: The lock is held, so we have exclusive access
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, I: IrqControl> Drop for IrqSpinLockGuard<'_, T, I> {
    fn drop(&mut self) {
        // Release before unmasking so a handler taking over the core sees
        // the lock free
        self.lock.locked.store(false, Ordering::Release);
        I::restore(self.irq_state);
    }
}

#[cfg(test)]
mod tests {
    use super::IrqSpinLock;
    use crate::sync::irq::IrqControl;

    struct NoIrq;

    impl IrqControl for NoIrq {
        type State = ();

        fn disable() {}
        fn restore(_: ()) {}
    }

    #[test]
    fn lock_and_mutate() {
        let lock: IrqSpinLock<u32, NoIrq> = IrqSpinLock::new(0);
        {
            let mut guard = lock.lock();
            *guard = 42;
        }
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn sequential_critical_sections() {
        let lock: IrqSpinLock<Vec<u8>, NoIrq> = IrqSpinLock::new(Vec::new());
        for byte in 0..4 {
            lock.lock().push(byte);
        }
        assert_eq!(*lock.lock(), vec![0, 1, 2, 3]);
    }
}
