use crate::sync::irq::IrqControl;

const PRIMASK_DISABLED: u32 = 1;

pub struct CortexMIrq;

/// Interrupt control for ARM Cortex-M cores.
///
/// Masks interrupts through PRIMASK, the core-wide exception disable bit.
///
/// # State Management
/// The `State` type is `bool`, recording whether interrupts were enabled
/// before the critical section began.
///
/// # Assembly Details
///
/// - `mrs {0}, PRIMASK`: Read the current mask bit
/// - `cpsid i`: Change Processor State - disable interrupts
/// - `cpsie i`: Change Processor State - enable interrupts
impl IrqControl for CortexMIrq {
    type State = bool;

    #[inline(always)]
    fn disable() -> bool {
        let primask: u32;
        unsafe {
            // Save current PRIMASK and disable interrupts
            core::arch::asm!(
                "mrs {0}, PRIMASK",
                "cpsid i",
                out(reg) primask,
                options(nomem, nostack)
            );
        }
        primask & PRIMASK_DISABLED == 0 // Return true if interrupts were previously enabled
    }

    #[inline(always)]
    fn restore(prev_enabled: bool) {
        if prev_enabled {
            unsafe {
                core::arch::asm!("cpsie i", options(nomem, nostack));
            }
        }
    }
}
