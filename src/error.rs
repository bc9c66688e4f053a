use core::fmt;

/// Errors reported by the arbitration and transaction engine.
///
/// `E` is the native error type of the hardware driver behind the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiError<E: fmt::Debug> {
    /// Bad arguments: degenerate transfer descriptor, out-of-range bit
    /// widths, or mismatched buffer lengths.
    InvalidParam,
    /// The bus index is out of range for the manager's bus table.
    BusUnavailable,
    /// The device table is exhausted.
    DeviceUnavailable,
    /// The bus is already up with a different pin set.
    PinMismatch,
    /// The batch already holds the maximum number of queued transfers.
    QueueFull,
    /// The transfer record could not hold the requested inline write data.
    InsufficientMemory,
    /// Exclusive hardware ownership was refused after the bus lock was
    /// already held.
    BusBusy,
    /// The chip-select pin could not be driven.
    ChipSelect,
    /// A cancellation future completed before the bus lock was acquired.
    TimedOut,
    /// A bus slot was left mid-transition by an interrupted init/teardown.
    Poisoned,
    /// The hardware driver rejected a submission or reported a failed
    /// transfer.
    Execution(E),
}

impl<E: fmt::Debug> fmt::Display for SpiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpiError::InvalidParam => write!(f, "invalid parameter"),
            SpiError::BusUnavailable => write!(f, "bus table exhausted"),
            SpiError::DeviceUnavailable => write!(f, "device table exhausted"),
            SpiError::PinMismatch => {
                write!(f, "bus already configured with different pins")
            }
            SpiError::QueueFull => write!(f, "transfer queue full"),
            SpiError::InsufficientMemory => {
                write!(f, "inline data exceeds record capacity")
            }
            SpiError::BusBusy => write!(f, "hardware bus ownership refused"),
            SpiError::ChipSelect => write!(f, "chip-select pin error"),
            SpiError::TimedOut => write!(f, "bus acquisition cancelled"),
            SpiError::Poisoned => write!(f, "bus slot in unrecoverable state"),
            SpiError::Execution(e) => write!(f, "driver error: {:?}", e),
        }
    }
}
