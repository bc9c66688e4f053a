mod common;

use std::sync::atomic::Ordering;

use common::{manager, new_link, pin, Event, PINS};
use spi_arbiter::{DeviceConfig, Mode, SpiError};

#[futures_test::test]
async fn byte_exchange_brackets_chip_select() {
    let link = new_link();
    let mgr = manager(&link);
    let (cs, state) = pin();
    let mut dev = mgr
        .device(0, PINS, cs, DeviceConfig::default())
        .await
        .unwrap();

    link.push_read(&[0x5A]);
    let got = dev.transfer_byte(0xA5).await.unwrap();

    assert_eq!(got, 0x5A);
    assert_eq!(link.count(|e| *e == Event::Transfer(vec![0xA5])), 1);
    // Asserted exactly once and parked high again.
    assert_eq!(state.lows.load(Ordering::SeqCst), 1);
    assert!(state.high.load(Ordering::SeqCst));
}

#[futures_test::test]
async fn raw_exchange_leaves_chip_select_alone() {
    let link = new_link();
    let mgr = manager(&link);
    let (cs, state) = pin();
    let mut dev = mgr
        .device(0, PINS, cs, DeviceConfig::default())
        .await
        .unwrap();

    link.push_read(&[0x11, 0x22]);
    let mut rx = [0u8; 2];
    dev.transfer_raw(&[1, 2], &mut rx).await.unwrap();

    assert_eq!(rx, [0x11, 0x22]);
    assert_eq!(state.lows.load(Ordering::SeqCst), 0);

    link.push_read(&[0x33]);
    assert_eq!(dev.transfer_byte_raw(0).await.unwrap(), 0x33);
    assert_eq!(state.lows.load(Ordering::SeqCst), 0);
}

#[futures_test::test]
async fn mismatched_buffer_lengths_are_refused() {
    let link = new_link();
    let mgr = manager(&link);
    let mut dev = mgr
        .device(0, PINS, pin().0, DeviceConfig::default())
        .await
        .unwrap();

    let mut rx = [0u8; 3];
    let err = dev.transfer_raw(&[0; 2], &mut rx).await.err().unwrap();
    assert_eq!(err, SpiError::InvalidParam);
    assert_eq!(link.count(|e| matches!(e, Event::Transfer(_))), 0);
}

#[futures_test::test]
async fn failed_exchange_surfaces_and_releases_chip_select() {
    let link = new_link();
    let mgr = manager(&link);
    let (cs, state) = pin();
    let mut dev = mgr
        .device(0, PINS, cs, DeviceConfig::default())
        .await
        .unwrap();

    link.fail_transfer.store(true, Ordering::SeqCst);
    let err = dev.transfer_byte(0xFF).await.err().unwrap();

    assert!(matches!(err, SpiError::Execution(_)));
    assert!(state.high.load(Ordering::SeqCst));
}

#[futures_test::test]
async fn idle_high_clock_modes_get_primed() {
    let link = new_link();
    let mgr = manager(&link);
    let mut dev = mgr
        .device(0, PINS, pin().0, DeviceConfig::default())
        .await
        .unwrap();

    dev.set_mode(Mode::Mode3, 2_000_000).await.unwrap();
    let expected = DeviceConfig { mode: Mode::Mode3, clock_hz: 2_000_000 };
    assert_eq!(dev.config(), expected);
    assert_eq!(link.count(|e| *e == Event::Reconfigure(expected)), 1);
    // One dummy exchange right after the switch.
    assert_eq!(link.count(|e| matches!(e, Event::Transfer(_))), 1);

    dev.set_mode(Mode::Mode1, 2_000_000).await.unwrap();
    // Idle-low clock needs no priming.
    assert_eq!(link.count(|e| matches!(e, Event::Transfer(_))), 1);
}
