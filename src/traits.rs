use crate::config::{BusPins, DeviceConfig};
use crate::descriptor::QueuedTransfer;

/// The native per-device handle of a factory's bus type.
pub type NativeDevice<F> =
    <<F as SpiFactory>::Bus as SpiInterface>::Device;

/// Brings physical buses up and down.
///
/// Implementors define how a native bus is created from per-slot resources
/// and how those resources are recovered when the bus is torn down. On a
/// failed init the resources are returned alongside the error so a later
/// attempt can retry.
pub trait SpiFactory {
    /// Resources needed to create one bus (peripheral handles, pins).
    type Resources;
    /// The native bus produced from those resources.
    type Bus: SpiInterface<Error = Self::Error>;
    /// Driver error type.
    type Error: core::fmt::Debug;

    /// Create a native bus on the given pin set.
    fn bus_init(
        resources: Self::Resources,
        pins: &BusPins,
    ) -> Result<Self::Bus, (Self::Error, Self::Resources)>;

    /// Tear the bus down and recover its resources.
    fn bus_deinit(bus: Self::Bus) -> Self::Resources;
}

/// Operations a native bus must provide.
///
/// The engine guarantees call discipline: `submit`/`collect` only run between
/// `claim` and `unclaim`, `collect` is called at most once per `submit` and
/// in submission order, and `tx`/`rx` passed to `transfer` have equal length.
#[allow(async_fn_in_trait)]
pub trait SpiInterface {
    /// Native per-device handle.
    type Device;
    /// Driver error type.
    type Error: core::fmt::Debug;

    /// Attach a logical device with its own mode and clock.
    fn attach(
        &mut self,
        config: DeviceConfig,
    ) -> Result<Self::Device, Self::Error>;

    /// Detach a logical device.
    fn detach(&mut self, device: Self::Device);

    /// Apply a new mode/clock to an attached device.
    fn reconfigure(
        &mut self,
        device: &mut Self::Device,
        config: DeviceConfig,
    ) -> Result<(), Self::Error>;

    /// One blocking full-duplex exchange. No chip-select handling.
    async fn transfer(
        &mut self,
        device: &mut Self::Device,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Take exclusive hardware ownership of the bus for a batch.
    fn claim(&mut self) -> Result<(), Self::Error>;

    /// Give exclusive hardware ownership back.
    fn unclaim(&mut self);

    /// Non-blocking enqueue of one transfer. A rejection must leave the
    /// hardware queue untouched.
    fn submit(
        &mut self,
        device: &mut Self::Device,
        record: &QueuedTransfer<'_>,
    ) -> Result<(), Self::Error>;

    /// Wait for the oldest submitted transfer to complete, filling the
    /// record's read buffer.
    async fn collect(
        &mut self,
        device: &mut Self::Device,
        record: &mut QueuedTransfer<'_>,
    ) -> Result<(), Self::Error>;

    /// Discard every submitted-but-uncollected transfer.
    fn cancel_all(&mut self, device: &mut Self::Device);
}
