use core::mem;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::digital::OutputPin;
use portable_atomic::{AtomicUsize, Ordering};

use crate::config::{BusPins, DeviceConfig};
use crate::device::DeviceHandle;
use crate::error::SpiError;
use crate::traits::{SpiFactory, SpiInterface};

/// Lifecycle of one bus slot.
pub(crate) enum Slot<F: SpiFactory> {
    /// Bus is down; resources are parked here.
    Idle(F::Resources),
    /// Bus is up.
    Active(F::Bus),
    /// An init or teardown transition was interrupted.
    Poisoned,
}

/// Registry bookkeeping shared by all buses of a manager.
struct Registry<const BUSES: usize, const DEVICES: usize> {
    /// Pin set of each active bus; `None` while the slot is down.
    pins: [Option<BusPins>; BUSES],
    /// Device-table occupancy; the value is the owning bus index.
    devices: [Option<usize>; DEVICES],
}

impl<const BUSES: usize, const DEVICES: usize> Registry<BUSES, DEVICES> {
    const fn new() -> Self {
        Self { pins: [None; BUSES], devices: [None; DEVICES] }
    }
}

/// Bounded arena of shared SPI buses.
///
/// Holds `BUSES` bus slots and a table of up to `DEVICES` logical devices.
/// A bus comes up when the first device referencing it is created and goes
/// down when the last one is freed. Each slot's native bus sits behind its
/// own mutex — that mutex is the arbitration lock batches hold.
///
/// The manager itself is usually placed in a `static` (for instance via
/// `static_cell`) so device handles can live in long-running tasks.
pub struct SpiManager<
    M: RawMutex,
    F: SpiFactory,
    const BUSES: usize,
    const DEVICES: usize,
> {
    pub(crate) slots: [Mutex<M, Slot<F>>; BUSES],
    users: [AtomicUsize; BUSES],
    registry: Mutex<M, Registry<BUSES, DEVICES>>,
}

impl<M, F, const BUSES: usize, const DEVICES: usize>
    SpiManager<M, F, BUSES, DEVICES>
where
    M: RawMutex,
    F: SpiFactory,
{
    /// Create a manager with one resource bundle parked per bus slot.
    pub fn new(resources: [F::Resources; BUSES]) -> Self {
        Self {
            slots: resources.map(|r| Mutex::new(Slot::Idle(r))),
            users: core::array::from_fn(|_| AtomicUsize::new(0)),
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Number of devices currently attached to `bus`.
    pub fn user_count(&self, bus: usize) -> usize {
        self.users.get(bus).map_or(0, |u| u.load(Ordering::Acquire))
    }

    /// Whether `bus` is currently up.
    pub fn is_active(&self, bus: usize) -> bool {
        self.user_count(bus) > 0
    }

    /// Create a logical device on `bus`.
    ///
    /// Brings the bus up on first use; a later device must present the same
    /// `pins` or is refused with [`SpiError::PinMismatch`]. The chip-select
    /// pin is driven to its idle-high level and managed in software from
    /// then on — bus hardware never sees it.
    pub async fn device<CS: OutputPin>(
        &self,
        bus: usize,
        pins: BusPins,
        mut cs: CS,
        config: DeviceConfig,
    ) -> Result<DeviceHandle<'_, M, F, CS, BUSES, DEVICES>, SpiError<F::Error>>
    {
        if bus >= BUSES {
            return Err(SpiError::BusUnavailable);
        }

        // Registry phase: take (or validate) the bus reference and reserve a
        // device slot. Short critical section, no hardware calls.
        let slot_index = {
            let mut reg = self.registry.lock().await;
            match reg.pins[bus] {
                Some(existing) if existing != pins => {
                    return Err(SpiError::PinMismatch)
                }
                Some(_) => {
                    self.users[bus].fetch_add(1, Ordering::AcqRel);
                }
                None => {
                    reg.pins[bus] = Some(pins);
                    self.users[bus].store(1, Ordering::Release);
                }
            }
            match reg.devices.iter().position(Option::is_none) {
                Some(i) => {
                    reg.devices[i] = Some(bus);
                    i
                }
                None => {
                    // Give the bus reference back. The slot hardware was not
                    // touched yet, so dropping the last reference only clears
                    // the registry entry.
                    let left =
                        self.users[bus].fetch_sub(1, Ordering::AcqRel) - 1;
                    if left == 0 {
                        reg.pins[bus] = None;
                    }
                    return Err(SpiError::DeviceUnavailable);
                }
            }
        };

        // Hardware phase: bring the bus up if this reference was the first,
        // then attach the device. The registry mutex is not held here, so
        // waiting out an open batch does not stall unrelated buses.
        let mut slot = self.slots[bus].lock().await;

        if matches!(&*slot, Slot::Idle(_)) {
            let resources = match mem::replace(&mut *slot, Slot::Poisoned) {
                Slot::Idle(r) => r,
                _ => unreachable!(),
            };
            match F::bus_init(resources, &pins) {
                Ok(hw) => *slot = Slot::Active(hw),
                Err((e, resources)) => {
                    // Park the resources again so a later attempt can retry.
                    *slot = Slot::Idle(resources);
                    self.release_ref(bus, &mut slot, slot_index).await;
                    return Err(SpiError::Execution(e));
                }
            }
        }

        let hw = match &mut *slot {
            Slot::Active(hw) => hw,
            Slot::Idle(_) => unreachable!(),
            Slot::Poisoned => {
                self.release_ref(bus, &mut slot, slot_index).await;
                return Err(SpiError::Poisoned);
            }
        };

        let _ = cs.set_high();
        match hw.attach(config) {
            Ok(native) => Ok(DeviceHandle {
                mgr: self,
                bus,
                slot_index,
                native,
                cs,
                config,
            }),
            Err(e) => {
                self.release_ref(bus, &mut slot, slot_index).await;
                Err(SpiError::Execution(e))
            }
        }
    }

    /// Drop one bus reference and free a device slot, tearing the bus down
    /// when the reference was the last.
    ///
    /// Callers hold the bus slot mutex; the registry mutex is taken inside.
    /// That ordering (bus lock, then registry lock) is the one every path in
    /// the crate uses.
    pub(crate) async fn release_ref(
        &self,
        bus: usize,
        slot: &mut Slot<F>,
        slot_index: usize,
    ) {
        let mut reg = self.registry.lock().await;
        reg.devices[slot_index] = None;
        let left = self.users[bus].fetch_sub(1, Ordering::AcqRel) - 1;
        if left == 0 {
            reg.pins[bus] = None;
            if matches!(slot, Slot::Active(_)) {
                let hw = match mem::replace(slot, Slot::Poisoned) {
                    Slot::Active(hw) => hw,
                    _ => unreachable!(),
                };
                *slot = Slot::Idle(F::bus_deinit(hw));
            }
        }
    }
}
