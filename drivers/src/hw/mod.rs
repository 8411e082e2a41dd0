//! Register-level peripheral drivers.

pub mod usart;
