use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::MutexGuard;
use embedded_hal::digital::OutputPin;
use heapless::Deque;

use crate::batch::Batch;
use crate::config::{DeviceConfig, Mode};
use crate::error::SpiError;
use crate::manager::{Slot, SpiManager};
use crate::traits::{NativeDevice, SpiFactory, SpiInterface};

/// A logical device on a shared bus.
///
/// Created by [`SpiManager::device`] and released with [`free`](Self::free).
/// The handle owns the device's chip-select pin and its native driver
/// handle; the bus itself stays with the manager and is shared with every
/// other device on the same wires.
pub struct DeviceHandle<
    'm,
    M: RawMutex,
    F: SpiFactory,
    CS: OutputPin,
    const BUSES: usize,
    const DEVICES: usize,
> {
    pub(crate) mgr: &'m SpiManager<M, F, BUSES, DEVICES>,
    pub(crate) bus: usize,
    pub(crate) slot_index: usize,
    pub(crate) native: NativeDevice<F>,
    pub(crate) cs: CS,
    pub(crate) config: DeviceConfig,
}

impl<'m, M, F, CS, const BUSES: usize, const DEVICES: usize>
    DeviceHandle<'m, M, F, CS, BUSES, DEVICES>
where
    M: RawMutex,
    F: SpiFactory,
    CS: OutputPin,
{
    /// Index of the bus this device lives on.
    pub fn bus_id(&self) -> usize {
        self.bus
    }

    /// The device's current mode and clock.
    pub fn config(&self) -> DeviceConfig {
        self.config
    }

    /// Native per-device driver handle.
    pub fn native(&self) -> &NativeDevice<F> {
        &self.native
    }

    /// Mutable access to the native per-device driver handle, for
    /// vendor-specific interop.
    pub fn native_mut(&mut self) -> &mut NativeDevice<F> {
        &mut self.native
    }

    /// Swap the native handle, returning the previous one.
    pub fn replace_native(
        &mut self,
        native: NativeDevice<F>,
    ) -> NativeDevice<F> {
        core::mem::replace(&mut self.native, native)
    }

    /// Release the device, returning its chip-select pin idle-high.
    ///
    /// Detaches the native handle and drops the bus reference; the last
    /// device on a bus tears the bus down and parks its resources.
    pub async fn free(self) -> CS {
        let Self { mgr, bus, slot_index, native, mut cs, .. } = self;
        let mut slot = mgr.slots[bus].lock().await;
        if let Slot::Active(hw) = &mut *slot {
            hw.detach(native);
        }
        let _ = cs.set_high();
        mgr.release_ref(bus, &mut slot, slot_index).await;
        cs
    }

    /// Apply a new mode and clock to the device.
    ///
    /// Modes with an idle-high clock (CPOL=1) are primed with one dummy
    /// exchange right after reconfiguration so the clock line settles at
    /// its new idle level before any chip-select asserts.
    pub async fn set_mode(
        &mut self,
        mode: Mode,
        clock_hz: u32,
    ) -> Result<(), SpiError<F::Error>> {
        let config = DeviceConfig { mode, clock_hz };
        let mut slot = self.mgr.slots[self.bus].lock().await;
        let hw = active(&mut slot)?;
        hw.reconfigure(&mut self.native, config)
            .map_err(SpiError::Execution)?;
        self.config = config;
        if mode.cpol() {
            let mut rx = [0u8; 1];
            if let Err(e) = hw.transfer(&mut self.native, &[0], &mut rx).await
            {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "priming transfer failed: {:?}",
                    defmt::Debug2Format(&e)
                );
                return Err(SpiError::Execution(e));
            }
        }
        Ok(())
    }

    /// One full-duplex byte exchange bracketed by this device's chip-select.
    ///
    /// Self-contained: takes the bus for the duration of the exchange, so it
    /// serializes behind any open batch.
    pub async fn transfer_byte(
        &mut self,
        byte: u8,
    ) -> Result<u8, SpiError<F::Error>> {
        let mut slot = self.mgr.slots[self.bus].lock().await;
        let hw = active(&mut slot)?;
        self.cs.set_low().map_err(|_| SpiError::ChipSelect)?;
        let mut rx = [0u8; 1];
        let res = hw.transfer(&mut self.native, &[byte], &mut rx).await;
        let cs_res = self.cs.set_high();
        match res {
            Ok(()) => {
                cs_res.map_err(|_| SpiError::ChipSelect)?;
                Ok(rx[0])
            }
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "transfer failed: {:?}",
                    defmt::Debug2Format(&e)
                );
                Err(SpiError::Execution(e))
            }
        }
    }

    /// One full-duplex byte exchange with no chip-select handling.
    pub async fn transfer_byte_raw(
        &mut self,
        byte: u8,
    ) -> Result<u8, SpiError<F::Error>> {
        let mut rx = [0u8; 1];
        self.transfer_raw(&[byte], &mut rx).await?;
        Ok(rx[0])
    }

    /// Blocking full-duplex buffer exchange with no chip-select handling.
    ///
    /// `tx` and `rx` must have equal length. The caller asserts and
    /// deasserts chip-select itself, directly or through a batch.
    pub async fn transfer_raw(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), SpiError<F::Error>> {
        if tx.len() != rx.len() {
            return Err(SpiError::InvalidParam);
        }
        let mut slot = self.mgr.slots[self.bus].lock().await;
        let hw = active(&mut slot)?;
        if let Err(e) = hw.transfer(&mut self.native, tx, rx).await {
            #[cfg(feature = "defmt")]
            defmt::warn!("transfer failed: {:?}", defmt::Debug2Format(&e));
            return Err(SpiError::Execution(e));
        }
        Ok(())
    }

    /// Open a batch, waiting on the bus lock without limit.
    ///
    /// Once the lock is held the bus hardware is claimed exclusively and
    /// this device's chip-select is asserted. The batch must be drained with
    /// [`Batch::finish`]; dropping it instead discards whatever is queued.
    pub async fn begin<'d, 'b>(
        &'d mut self,
    ) -> Result<Batch<'d, 'm, 'b, M, F, CS, BUSES, DEVICES>, SpiError<F::Error>>
    {
        let slot = self.mgr.slots[self.bus].lock().await;
        self.arm(slot)
    }

    /// Open a batch unless `cancel` completes first.
    ///
    /// `cancel` is any future — typically a timer such as
    /// `embassy_time::Timer::after(..)`. If it wins the race the lock is not
    /// taken and [`SpiError::TimedOut`] is returned.
    pub async fn begin_until<'d, 'b, T>(
        &'d mut self,
        cancel: T,
    ) -> Result<Batch<'d, 'm, 'b, M, F, CS, BUSES, DEVICES>, SpiError<F::Error>>
    where
        T: Future<Output = ()>,
    {
        let lock = self.mgr.slots[self.bus].lock();
        match select(lock, cancel).await {
            Either::First(slot) => self.arm(slot),
            Either::Second(()) => Err(SpiError::TimedOut),
        }
    }

    /// Claim the hardware and assert chip-select on an already-locked bus.
    fn arm<'d, 'b>(
        &'d mut self,
        mut slot: MutexGuard<'m, M, Slot<F>>,
    ) -> Result<Batch<'d, 'm, 'b, M, F, CS, BUSES, DEVICES>, SpiError<F::Error>>
    {
        let hw = active(&mut slot)?;
        if let Err(_e) = hw.claim() {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "bus claim refused: {:?}",
                defmt::Debug2Format(&_e)
            );
            return Err(SpiError::BusBusy);
        }
        if self.cs.set_low().is_err() {
            hw.unclaim();
            return Err(SpiError::ChipSelect);
        }
        Ok(Batch {
            dev: self,
            slot,
            records: Deque::new(),
            done: false,
        })
    }
}

/// The bus behind a held slot guard; devices exist only on active buses.
pub(crate) fn active<F: SpiFactory>(
    slot: &mut Slot<F>,
) -> Result<&mut F::Bus, SpiError<F::Error>> {
    match slot {
        Slot::Active(hw) => Ok(hw),
        _ => Err(SpiError::Poisoned),
    }
}
