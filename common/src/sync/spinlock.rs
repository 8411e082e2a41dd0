use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// A busy-waiting mutual exclusion lock for `no_std` environments.
///
/// `SpinLock` grants exclusive access to the wrapped data by spinning until
/// the lock becomes available. Threads may use [`SpinLock::lock`] freely.
/// Interrupt handlers must never spin on a lock a preempted thread might be
/// holding; they use [`SpinLock::try_lock`] and treat a failed acquisition
/// as backpressure.
///
/// # Type Parameters
///
/// * `T` - The type of data protected by the spinlock.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: SpinLock can be shared between threads if T can be sent between threads
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new `SpinLock` wrapping the provided data.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, spinning until it is available.
    ///
    /// Returns a `SpinLockGuard` which provides mutable access to the
    /// underlying data. The lock is released when the guard is dropped.
    ///
    /// Thread context only. An interrupt handler spinning here can deadlock
    /// against the thread it preempted; see [`SpinLock::try_lock`].
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while !self.try_acquire() {
            core::hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// Returns `None` immediately if the lock is held by anyone else. This
    /// is the only acquisition path legal from interrupt context.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self.try_acquire() {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

/// A guard that provides access to the data protected by a `SpinLock`.
///
/// Returned by `SpinLock::lock` and `SpinLock::try_lock`. Releases the lock
/// when dropped.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> core::ops::Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: The lock is held, so we have exclusive access
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> core::ops::DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: The lock is held, so we have exclusive access
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    /// Releases the lock when the guard goes out of scope.
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
