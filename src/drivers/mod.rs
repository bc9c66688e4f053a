//! Hardware driver implementations.
//!
//! One module per target. The loopback stub is always available and needs
//! no hardware; vendor drivers are feature-gated so the crate stays
//! host-buildable by default.

pub mod loopback;

#[cfg(feature = "nrf52840")]
pub mod nrf;
