//! No-hardware stub target.
//!
//! The "bus" is a wire from controller-out straight back to controller-in:
//! every exchange reads back exactly what was written, and queued transfers
//! complete immediately at drain time. Useful for bring-up on boards without
//! the peripheral populated, and for examples.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::config::{BusPins, DeviceConfig, QUEUE_DEPTH};
use crate::descriptor::QueuedTransfer;
use crate::traits::{SpiFactory, SpiInterface};

/// Driver errors for the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopbackError {
    /// `submit` outside a claimed batch.
    NotClaimed,
    /// More submissions in flight than the stub tracks.
    QueueOverflow,
}

/// Factory for [`LoopbackBus`]; a slot needs no resources.
pub struct LoopbackFactory;

impl SpiFactory for LoopbackFactory {
    type Resources = ();
    type Bus = LoopbackBus;
    type Error = LoopbackError;

    fn bus_init(
        _resources: (),
        pins: &BusPins,
    ) -> Result<LoopbackBus, (LoopbackError, ())> {
        Ok(LoopbackBus { pins: *pins, claimed: false, pending: 0 })
    }

    fn bus_deinit(_bus: LoopbackBus) {}
}

/// The stub bus.
pub struct LoopbackBus {
    pins: BusPins,
    claimed: bool,
    pending: usize,
}

impl LoopbackBus {
    /// The pin set this bus was brought up with.
    pub fn pins(&self) -> BusPins {
        self.pins
    }
}

/// Per-device state of the stub.
pub struct LoopbackDevice {
    config: DeviceConfig,
}

impl LoopbackDevice {
    /// The device's current configuration.
    pub fn config(&self) -> DeviceConfig {
        self.config
    }
}

impl SpiInterface for LoopbackBus {
    type Device = LoopbackDevice;
    type Error = LoopbackError;

    fn attach(
        &mut self,
        config: DeviceConfig,
    ) -> Result<LoopbackDevice, LoopbackError> {
        Ok(LoopbackDevice { config })
    }

    fn detach(&mut self, _device: LoopbackDevice) {}

    fn reconfigure(
        &mut self,
        device: &mut LoopbackDevice,
        config: DeviceConfig,
    ) -> Result<(), LoopbackError> {
        device.config = config;
        Ok(())
    }

    async fn transfer(
        &mut self,
        _device: &mut LoopbackDevice,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), LoopbackError> {
        let n = tx.len().min(rx.len());
        rx[..n].copy_from_slice(&tx[..n]);
        Ok(())
    }

    fn claim(&mut self) -> Result<(), LoopbackError> {
        self.claimed = true;
        Ok(())
    }

    fn unclaim(&mut self) {
        self.claimed = false;
    }

    fn submit(
        &mut self,
        _device: &mut LoopbackDevice,
        _record: &QueuedTransfer<'_>,
    ) -> Result<(), LoopbackError> {
        if !self.claimed {
            return Err(LoopbackError::NotClaimed);
        }
        if self.pending >= QUEUE_DEPTH {
            return Err(LoopbackError::QueueOverflow);
        }
        self.pending += 1;
        Ok(())
    }

    async fn collect(
        &mut self,
        _device: &mut LoopbackDevice,
        record: &mut QueuedTransfer<'_>,
    ) -> Result<(), LoopbackError> {
        self.pending = self.pending.saturating_sub(1);
        // Data phases overlap on the loop: the read phase sees the write
        // data, padded with zeros past its end.
        let (tx, rx) = record.split_tx_rx();
        if let Some(rx) = rx {
            let n = tx.len().min(rx.len());
            rx[..n].copy_from_slice(&tx[..n]);
            for b in rx[n..].iter_mut() {
                *b = 0;
            }
        }
        Ok(())
    }

    fn cancel_all(&mut self, _device: &mut LoopbackDevice) {
        self.pending = 0;
    }
}

/// A stand-in chip-select pin for hardware-free use of the stub.
pub struct SoftCs {
    high: bool,
}

impl SoftCs {
    pub fn new() -> Self {
        Self { high: true }
    }

    /// Current pin level.
    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl Default for SoftCs {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for SoftCs {
    type Error = Infallible;
}

impl OutputPin for SoftCs {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        Ok(())
    }
}
