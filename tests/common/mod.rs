#![allow(dead_code)]
//! Scripted mock hardware shared by the integration tests.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::digital::{ErrorType, OutputPin};
use spi_arbiter::{
    BusPins, DeviceConfig, QueuedTransfer, SpiFactory, SpiInterface,
    SpiManager,
};

pub const PINS: BusPins = BusPins { sclk: 11, mosi: 12, miso: 13 };
pub const OTHER_PINS: BusPins = BusPins { sclk: 21, mosi: 22, miso: 23 };

pub type Mgr = SpiManager<NoopRawMutex, MockFactory, 2, 4>;

/// Everything the mock did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Init(BusPins),
    Deinit,
    Attach,
    Detach,
    Reconfigure(DeviceConfig),
    /// Polling exchange; payload is the tx bytes.
    Transfer(Vec<u8>),
    Claim,
    Unclaim,
    /// Queued submission rendered to wire order:
    /// command, address, dummy filler, write data.
    Submit(Vec<u8>),
    Collect,
    Cancel,
}

/// Shared handle into the mock: scripted responses, failure injection and
/// the event log. Failure flags are one-shot, resetting when they fire.
#[derive(Default)]
pub struct MockLink {
    events: Mutex<Vec<Event>>,
    read_script: Mutex<VecDeque<Vec<u8>>>,
    pub fail_init: AtomicBool,
    pub fail_claim: AtomicBool,
    pub fail_submit: AtomicBool,
    pub fail_transfer: AtomicBool,
    fail_collect_at: Mutex<Option<usize>>,
    collects: AtomicUsize,
}

impl MockLink {
    pub fn log(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| f(e)).count()
    }

    /// Queue a read payload; each completed read phase consumes one.
    pub fn push_read(&self, data: &[u8]) {
        self.read_script.lock().unwrap().push_back(data.to_vec());
    }

    /// Make the n-th collect (0-based, counted across the link) fail.
    pub fn fail_collect_at(&self, n: usize) {
        *self.fail_collect_at.lock().unwrap() = Some(n);
    }
}

pub fn new_link() -> Arc<MockLink> {
    Arc::new(MockLink::default())
}

pub fn manager(link: &Arc<MockLink>) -> Mgr {
    Mgr::new([
        MockResources { link: link.clone() },
        MockResources { link: link.clone() },
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub &'static str);

pub struct MockResources {
    pub link: Arc<MockLink>,
}

pub struct MockFactory;

impl SpiFactory for MockFactory {
    type Resources = MockResources;
    type Bus = MockBus;
    type Error = MockError;

    fn bus_init(
        resources: MockResources,
        pins: &BusPins,
    ) -> Result<MockBus, (MockError, MockResources)> {
        if resources.link.fail_init.swap(false, Ordering::SeqCst) {
            return Err((MockError("init"), resources));
        }
        resources.link.log(Event::Init(*pins));
        Ok(MockBus {
            link: resources.link,
            claimed: false,
            pending: VecDeque::new(),
        })
    }

    fn bus_deinit(bus: MockBus) -> MockResources {
        bus.link.log(Event::Deinit);
        MockResources { link: bus.link.clone() }
    }
}

pub struct MockBus {
    link: Arc<MockLink>,
    claimed: bool,
    /// Read-phase length of each in-flight submission, oldest first.
    pending: VecDeque<usize>,
}

pub struct MockDevice {
    pub config: DeviceConfig,
}

impl SpiInterface for MockBus {
    type Device = MockDevice;
    type Error = MockError;

    fn attach(
        &mut self,
        config: DeviceConfig,
    ) -> Result<MockDevice, MockError> {
        self.link.log(Event::Attach);
        Ok(MockDevice { config })
    }

    fn detach(&mut self, _device: MockDevice) {
        self.link.log(Event::Detach);
    }

    fn reconfigure(
        &mut self,
        device: &mut MockDevice,
        config: DeviceConfig,
    ) -> Result<(), MockError> {
        device.config = config;
        self.link.log(Event::Reconfigure(config));
        Ok(())
    }

    async fn transfer(
        &mut self,
        _device: &mut MockDevice,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), MockError> {
        if self.link.fail_transfer.swap(false, Ordering::SeqCst) {
            return Err(MockError("transfer"));
        }
        self.link.log(Event::Transfer(tx.to_vec()));
        if !rx.is_empty() {
            let data = self.read_data().unwrap_or_default();
            let n = rx.len().min(data.len());
            rx[..n].copy_from_slice(&data[..n]);
            for b in rx[n..].iter_mut() {
                *b = 0;
            }
        }
        Ok(())
    }

    fn claim(&mut self) -> Result<(), MockError> {
        if self.link.fail_claim.swap(false, Ordering::SeqCst) {
            return Err(MockError("claim"));
        }
        self.claimed = true;
        self.link.log(Event::Claim);
        Ok(())
    }

    fn unclaim(&mut self) {
        self.claimed = false;
        self.link.log(Event::Unclaim);
    }

    fn submit(
        &mut self,
        _device: &mut MockDevice,
        record: &QueuedTransfer<'_>,
    ) -> Result<(), MockError> {
        if !self.claimed {
            return Err(MockError("submit outside claim"));
        }
        if self.link.fail_submit.swap(false, Ordering::SeqCst) {
            return Err(MockError("submit"));
        }
        let mut wire = Vec::new();
        let (cmd, cmd_n) = record.command_bytes();
        wire.extend_from_slice(&cmd[..cmd_n]);
        let (addr, addr_n) = record.address_bytes();
        wire.extend_from_slice(&addr[..addr_n]);
        wire.extend(std::iter::repeat(0u8).take(record.dummy_len()));
        wire.extend_from_slice(record.tx_data());
        self.link.log(Event::Submit(wire));
        self.pending.push_back(record.rx_len());
        Ok(())
    }

    async fn collect(
        &mut self,
        _device: &mut MockDevice,
        record: &mut QueuedTransfer<'_>,
    ) -> Result<(), MockError> {
        let idx = self.link.collects.fetch_add(1, Ordering::SeqCst);
        self.pending.pop_front();
        self.link.log(Event::Collect);
        let fail = {
            let mut at = self.link.fail_collect_at.lock().unwrap();
            if *at == Some(idx) {
                *at = None;
                true
            } else {
                false
            }
        };
        if fail {
            return Err(MockError("collect"));
        }
        if let Some(rx) = record.rx_mut() {
            let data = self.read_data().unwrap_or_default();
            let n = rx.len().min(data.len());
            rx[..n].copy_from_slice(&data[..n]);
            for b in rx[n..].iter_mut() {
                *b = 0;
            }
        }
        Ok(())
    }

    fn cancel_all(&mut self, _device: &mut MockDevice) {
        self.pending.clear();
        self.link.log(Event::Cancel);
    }
}

impl MockBus {
    fn read_data(&self) -> Option<Vec<u8>> {
        self.link.read_script.lock().unwrap().pop_front()
    }
}

/// Observable chip-select pin.
#[derive(Default)]
pub struct PinState {
    pub high: AtomicBool,
    pub lows: AtomicUsize,
}

pub struct MockPin {
    state: Arc<PinState>,
}

pub fn pin() -> (MockPin, Arc<PinState>) {
    let state = Arc::new(PinState {
        high: AtomicBool::new(false),
        lows: AtomicUsize::new(0),
    });
    (MockPin { state: state.clone() }, state)
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.state.high.store(false, Ordering::SeqCst);
        self.state.lows.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.state.high.store(true, Ordering::SeqCst);
        Ok(())
    }
}
