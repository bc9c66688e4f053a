/// Maximum number of transfers one batch may hold before it must drain.
pub const QUEUE_DEPTH: usize = 50;

/// Capacity of the inline write buffer carried by a queued transfer record.
pub const INLINE_DATA_LEN: usize = 4;

/// Logical pin assignment of one physical bus.
///
/// The numbers identify pins for exact re-init matching; routing them to
/// hardware is the driver's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusPins {
    /// Serial clock.
    pub sclk: u8,
    /// Controller-out data line.
    pub mosi: u8,
    /// Controller-in data line.
    pub miso: u8,
}

/// SPI mode (clock polarity and phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl Mode {
    /// Clock idles high in this mode.
    pub fn cpol(self) -> bool {
        matches!(self, Mode::Mode2 | Mode::Mode3)
    }

    /// Data is sampled on the trailing clock edge in this mode.
    pub fn cpha(self) -> bool {
        matches!(self, Mode::Mode1 | Mode::Mode3)
    }
}

/// Per-device transfer parameters.
///
/// Each logical device carries its own mode and clock; the driver applies
/// them before that device's transfers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    pub mode: Mode,
    pub clock_hz: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { mode: Mode::Mode0, clock_hz: 1_000_000 }
    }
}
