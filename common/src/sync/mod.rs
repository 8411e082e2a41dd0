pub mod irq;
pub mod irq_spinlock;
pub mod spinlock;

pub use irq::IrqControl;
pub use irq_spinlock::IrqSpinLock;
pub use spinlock::SpinLock;
