use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::MutexGuard;
use embedded_hal::digital::OutputPin;
use heapless::Deque;

use crate::config::QUEUE_DEPTH;
use crate::descriptor::{QueuedTransfer, RecordError, TransferDescriptor};
use crate::device::DeviceHandle;
use crate::error::SpiError;
use crate::manager::Slot;
use crate::traits::{SpiFactory, SpiInterface};

/// Exclusive, ordered, queued access to one bus.
///
/// Opened with [`DeviceHandle::begin`]; while it exists the bus lock is held,
/// the hardware is claimed and this device's chip-select is asserted, so no
/// other device can touch the wires. Transfers queued with
/// [`push`](Self::push) run asynchronously; [`finish`](Self::finish) drains
/// their completions in exact submission order and releases the bus.
///
/// Dropping a batch without finishing it abandons the exchange: queued
/// transfers are discarded, chip-select deasserts and the bus is released.
/// Read buffers are then simply left unfilled.
pub struct Batch<
    'd,
    'm,
    'b,
    M: RawMutex,
    F: SpiFactory,
    CS: OutputPin,
    const BUSES: usize,
    const DEVICES: usize,
> {
    pub(crate) dev: &'d mut DeviceHandle<'m, M, F, CS, BUSES, DEVICES>,
    pub(crate) slot: MutexGuard<'m, M, Slot<F>>,
    pub(crate) records: Deque<QueuedTransfer<'b>, QUEUE_DEPTH>,
    pub(crate) done: bool,
}

impl<'b, M, F, CS, const BUSES: usize, const DEVICES: usize>
    Batch<'_, '_, 'b, M, F, CS, BUSES, DEVICES>
where
    M: RawMutex,
    F: SpiFactory,
    CS: OutputPin,
{
    /// Transfers queued and not yet drained.
    pub fn depth(&self) -> usize {
        self.records.len()
    }

    /// Queue one transfer.
    ///
    /// The descriptor becomes an owned record, submitted to the hardware
    /// queue without blocking. A driver rejection releases the record and
    /// returns [`SpiError::Execution`] with the batch still open; the caller
    /// may keep queueing or proceed to [`finish`](Self::finish).
    pub fn push(
        &mut self,
        desc: TransferDescriptor<'b>,
    ) -> Result<(), SpiError<F::Error>> {
        desc.validate().map_err(map_record_err)?;
        if self.records.is_full() {
            return Err(SpiError::QueueFull);
        }
        let record = desc.into_record().map_err(map_record_err)?;
        let hw = match &mut *self.slot {
            Slot::Active(hw) => hw,
            _ => return Err(SpiError::Poisoned),
        };
        match hw.submit(&mut self.dev.native, &record) {
            Ok(()) => {
                // Checked not-full above; a refusal here would leak nothing,
                // the record is simply dropped.
                self.records
                    .push_back(record)
                    .map_err(|_| SpiError::QueueFull)?;
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "transfer submission rejected: {:?}",
                    defmt::Debug2Format(&e)
                );
                Err(SpiError::Execution(e))
            }
        }
    }

    /// Drain the batch and release the bus.
    ///
    /// Completions are awaited in exact submission order, each filling its
    /// record's read buffer. A failed completion is remembered but draining
    /// continues for every remaining record, so nothing leaks; the first
    /// failure is what gets returned. Afterwards the hardware claim is
    /// dropped, chip-select deasserts and the bus lock is released.
    pub async fn finish(mut self) -> Result<(), SpiError<F::Error>> {
        let mut first_err = None;
        while let Some(mut record) = self.records.pop_front() {
            let hw = match &mut *self.slot {
                Slot::Active(hw) => hw,
                _ => {
                    first_err.get_or_insert(SpiError::Poisoned);
                    break;
                }
            };
            if let Err(e) =
                hw.collect(&mut self.dev.native, &mut record).await
            {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "transfer completion failed: {:?}",
                    defmt::Debug2Format(&e)
                );
                first_err.get_or_insert(SpiError::Execution(e));
            }
        }
        if let Slot::Active(hw) = &mut *self.slot {
            hw.unclaim();
        }
        let cs_ok = self.dev.cs.set_high().is_ok();
        self.done = true;
        match first_err {
            Some(e) => Err(e),
            None if !cs_ok => Err(SpiError::ChipSelect),
            None => Ok(()),
        }
    }
}

impl<M, F, CS, const BUSES: usize, const DEVICES: usize> Drop
    for Batch<'_, '_, '_, M, F, CS, BUSES, DEVICES>
where
    M: RawMutex,
    F: SpiFactory,
    CS: OutputPin,
{
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // Abandoned mid-batch: discard pending transfers and give the bus
        // back in a clean state. The guard releases the lock when it drops.
        if let Slot::Active(hw) = &mut *self.slot {
            hw.cancel_all(&mut self.dev.native);
            hw.unclaim();
        }
        while self.records.pop_front().is_some() {}
        let _ = self.dev.cs.set_high();
    }
}

fn map_record_err<E: core::fmt::Debug>(e: RecordError) -> SpiError<E> {
    match e {
        RecordError::InlineOverflow => SpiError::InsufficientMemory,
        RecordError::Degenerate | RecordError::WidthOutOfRange => {
            SpiError::InvalidParam
        }
    }
}
