//! nRF52840 target: SPIM3 through `embassy-nrf`.
//!
//! The nRF SPIM block has no hardware transfer queue; submissions are
//! counted and executed at drain time, which preserves the engine's
//! submission-order contract. Chip-select never touches this module — the
//! engine drives it in software.
//!
//! The module is written for the high-speed SPIM3 instance on the pins the
//! reference board routes it to; other instances follow the same shape.

use embassy_embedded_hal::SetConfig;
use embassy_nrf::{bind_interrupts, peripherals, spim, Peri};

use crate::config::{BusPins, DeviceConfig, Mode, QUEUE_DEPTH};
use crate::descriptor::QueuedTransfer;
use crate::traits::{SpiFactory, SpiInterface};

bind_interrupts!(struct Irqs {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

/// Peripheral set parked in one bus slot.
pub struct SpimResources {
    pub spim: Peri<'static, peripherals::SPI3>,
    pub sclk: Peri<'static, peripherals::P0_15>,
    pub mosi: Peri<'static, peripherals::P0_14>,
    pub miso: Peri<'static, peripherals::P0_16>,
}

/// Driver errors for the SPIM target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpimError {
    /// DMA transfer failed.
    Transfer,
    /// The requested mode/clock could not be applied.
    Reconfigure,
    /// More submissions in flight than the driver tracks.
    QueueOverflow,
}

/// Factory for [`SpimBus`].
pub struct SpimFactory;

impl SpiFactory for SpimFactory {
    type Resources = SpimResources;
    type Bus = SpimBus;
    type Error = SpimError;

    fn bus_init(
        resources: SpimResources,
        _pins: &BusPins,
    ) -> Result<SpimBus, (SpimError, SpimResources)> {
        // `BusPins` is identity only; routing is fixed by the resources.
        let config = spim::Config::default();
        let spim = spim::Spim::new(
            resources.spim,
            Irqs,
            resources.sclk,
            resources.miso,
            resources.mosi,
            config,
        );
        Ok(SpimBus { spim, pending: 0, applied: None })
    }

    fn bus_deinit(bus: SpimBus) -> SpimResources {
        drop(bus);
        // SAFETY: the Spim built from these peripherals was dropped above
        // and nothing else holds them, so reconstructing the tokens is
        // sound.
        unsafe {
            SpimResources {
                spim: peripherals::SPI3::steal(),
                sclk: peripherals::P0_15::steal(),
                mosi: peripherals::P0_14::steal(),
                miso: peripherals::P0_16::steal(),
            }
        }
    }
}

/// The SPIM3 bus.
pub struct SpimBus {
    spim: spim::Spim<'static>,
    pending: usize,
    /// Config currently programmed into the block, to skip redundant
    /// reprogramming when consecutive transfers belong to one device.
    applied: Option<DeviceConfig>,
}

/// Per-device state: the mode/clock this device wants on the wire.
pub struct SpimDevice {
    config: DeviceConfig,
}

fn native_config(config: &DeviceConfig) -> spim::Config {
    let mut cfg = spim::Config::default();
    cfg.mode = match config.mode {
        Mode::Mode0 => spim::MODE_0,
        Mode::Mode1 => spim::MODE_1,
        Mode::Mode2 => spim::MODE_2,
        Mode::Mode3 => spim::MODE_3,
    };
    cfg.frequency = match config.clock_hz {
        0..=249_999 => spim::Frequency::K125,
        250_000..=499_999 => spim::Frequency::K250,
        500_000..=999_999 => spim::Frequency::K500,
        1_000_000..=1_999_999 => spim::Frequency::M1,
        2_000_000..=3_999_999 => spim::Frequency::M2,
        4_000_000..=7_999_999 => spim::Frequency::M4,
        8_000_000..=15_999_999 => spim::Frequency::M8,
        16_000_000..=31_999_999 => spim::Frequency::M16,
        _ => spim::Frequency::M32,
    };
    cfg
}

impl SpimBus {
    fn apply(&mut self, device: &SpimDevice) -> Result<(), SpimError> {
        if self.applied != Some(device.config) {
            self.spim
                .set_config(&native_config(&device.config))
                .map_err(|_| SpimError::Reconfigure)?;
            self.applied = Some(device.config);
        }
        Ok(())
    }
}

impl SpiInterface for SpimBus {
    type Device = SpimDevice;
    type Error = SpimError;

    fn attach(
        &mut self,
        config: DeviceConfig,
    ) -> Result<SpimDevice, SpimError> {
        Ok(SpimDevice { config })
    }

    fn detach(&mut self, _device: SpimDevice) {}

    fn reconfigure(
        &mut self,
        device: &mut SpimDevice,
        config: DeviceConfig,
    ) -> Result<(), SpimError> {
        device.config = config;
        // Force reprogramming before the next transfer.
        self.applied = None;
        Ok(())
    }

    async fn transfer(
        &mut self,
        device: &mut SpimDevice,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), SpimError> {
        self.apply(device)?;
        self.spim
            .transfer(rx, tx)
            .await
            .map_err(|_| SpimError::Transfer)
    }

    fn claim(&mut self) -> Result<(), SpimError> {
        // The engine's bus lock is the ownership mechanism; the SPIM block
        // itself has nothing further to take.
        Ok(())
    }

    fn unclaim(&mut self) {}

    fn submit(
        &mut self,
        device: &mut SpimDevice,
        _record: &QueuedTransfer<'_>,
    ) -> Result<(), SpimError> {
        self.apply(device)?;
        if self.pending >= QUEUE_DEPTH {
            return Err(SpimError::QueueOverflow);
        }
        self.pending += 1;
        Ok(())
    }

    async fn collect(
        &mut self,
        device: &mut SpimDevice,
        record: &mut QueuedTransfer<'_>,
    ) -> Result<(), SpimError> {
        self.apply(device)?;
        self.pending = self.pending.saturating_sub(1);

        // Header: command then address, MSB-first.
        let mut header = [0u8; 10];
        let (cmd, cmd_n) = record.command_bytes();
        let (addr, addr_n) = record.address_bytes();
        header[..cmd_n].copy_from_slice(&cmd[..cmd_n]);
        header[cmd_n..cmd_n + addr_n].copy_from_slice(&addr[..addr_n]);
        let header_n = cmd_n + addr_n;
        if header_n > 0 {
            self.spim
                .write(&header[..header_n])
                .await
                .map_err(|_| SpimError::Transfer)?;
        }

        // Dummy phase: filler bytes clocked out in chunks.
        let mut dummy = record.dummy_len();
        while dummy > 0 {
            let chunk = [0u8; 16];
            let n = dummy.min(chunk.len());
            self.spim
                .write(&chunk[..n])
                .await
                .map_err(|_| SpimError::Transfer)?;
            dummy -= n;
        }

        // Data phase.
        let (tx, rx) = record.split_tx_rx();
        match (tx.is_empty(), rx) {
            (false, Some(rx)) if tx.len() == rx.len() => self
                .spim
                .transfer(rx, tx)
                .await
                .map_err(|_| SpimError::Transfer),
            (false, Some(rx)) => {
                self.spim
                    .write(tx)
                    .await
                    .map_err(|_| SpimError::Transfer)?;
                self.spim.read(rx).await.map_err(|_| SpimError::Transfer)
            }
            (false, None) => {
                self.spim.write(tx).await.map_err(|_| SpimError::Transfer)
            }
            (true, Some(rx)) => {
                self.spim.read(rx).await.map_err(|_| SpimError::Transfer)
            }
            (true, None) => Ok(()),
        }
    }

    fn cancel_all(&mut self, _device: &mut SpimDevice) {
        self.pending = 0;
    }
}
