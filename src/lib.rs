#![no_std]
//! Shared-bus SPI arbitration with a batched asynchronous transaction engine.
//!
//! Several logical devices, each identified by its own chip-select pin, share
//! one physical set of clock/data wires. The [`SpiManager`] tracks a bounded
//! arena of buses, lazily bringing a bus up when its first device is created
//! and tearing it down when the last one is freed. A per-bus mutex serializes
//! exclusive multi-transfer exchanges: a [`Batch`] gives one device ordered,
//! queued access to its bus and guarantees every queued transfer is drained,
//! in submission order, before the bus is handed to anyone else.
//!
//! Hardware access goes through the [`SpiFactory`]/[`SpiInterface`] traits,
//! one implementation per target. The crate ships a no-hardware loopback
//! stub; vendor implementations are feature-gated.
//!
//! ```
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use spi_arbiter::drivers::loopback::{LoopbackFactory, SoftCs};
//! use spi_arbiter::{BusPins, DeviceConfig, SpiManager, TransferDescriptor};
//!
//! futures::executor::block_on(async {
//!     let mgr: SpiManager<NoopRawMutex, LoopbackFactory, 1, 2> =
//!         SpiManager::new([()]);
//!     let pins = BusPins { sclk: 3, mosi: 4, miso: 5 };
//!     let mut dev = mgr
//!         .device(0, pins, SoftCs::new(), DeviceConfig::default())
//!         .await
//!         .unwrap();
//!
//!     let mut id = [0u8; 3];
//!     let mut batch = dev.begin().await.unwrap();
//!     batch
//!         .push(TransferDescriptor::new().command(0x9F, 8).read(&mut id))
//!         .unwrap();
//!     batch.finish().await.unwrap();
//!
//!     dev.free().await;
//! });
//! ```

mod batch;
mod config;
mod descriptor;
mod device;
mod error;
mod manager;
mod traits;

pub mod drivers;

pub use batch::Batch;
pub use config::{BusPins, DeviceConfig, Mode, INLINE_DATA_LEN, QUEUE_DEPTH};
pub use descriptor::{QueuedTransfer, TransferDescriptor};
pub use device::DeviceHandle;
pub use error::SpiError;
pub use manager::SpiManager;
pub use traits::{NativeDevice, SpiFactory, SpiInterface};
