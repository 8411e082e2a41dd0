use core::fmt::Debug;

/// Architecture-specific interrupt masking interface.
///
/// Implemented per target architecture under [`crate::arch`]. Tests supply
/// their own no-op implementation since host builds have no interrupt lines
/// to mask.
pub trait IrqControl {
    /// Saved interrupt state
    type State: Copy + Debug;

    /// Disable interrupts and return the previous state.
    fn disable() -> Self::State;

    /// Restore interrupts to a previous state.
    fn restore(state: Self::State);
}
