//! Architecture-specific implementations of [`crate::sync::IrqControl`].
//!
//! [`CurrentIrq`] aliases the implementation matching the build target so
//! callers never name a concrete architecture.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        mod arm;
        pub use arm::CortexMIrq;
        pub use arm::CortexMIrq as CurrentIrq;
    } else {
        mod noop;
        pub use noop::NoopIrq;
        pub use noop::NoopIrq as CurrentIrq;
    }
}
