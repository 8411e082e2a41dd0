use crate::sync::irq::IrqControl;

/// Stand-in interrupt control for host builds.
///
/// Development builds and unit tests run where there are no interrupt
/// lines to mask; both operations are no-ops.
pub struct NoopIrq;

impl IrqControl for NoopIrq {
    type State = ();

    #[inline(always)]
    fn disable() {}

    #[inline(always)]
    fn restore(_: ()) {}
}
