//! Hardware Abstraction Layer (HAL) - Platform-Independent Traits
//!
//! This module defines generic traits for interacting with hardware
//! peripherals. These traits are implemented by register-level drivers,
//! allowing the transport core to be written (and tested) without
//! reference to any concrete peripheral.
//!
//! # Design Principles
//!
//! - **Zero-cost abstractions**: Traits compile to direct hardware access
//! - **Type safety**: Use associated types to catch errors at compile time
//! - **No platform leakage**: Traits must not reference platform-specific types
//!
//! # Available Interfaces
//!
//! - [`serial`]: Asynchronous serial (UART) communication
//! - [`fault`]: Discrete diagnostic outputs

pub mod fault;
pub mod serial;
