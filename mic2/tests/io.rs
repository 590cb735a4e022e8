#![cfg(feature = "io")]

mod common;

use mic2::{DeviceError, Error, Subsystem};
use std::sync::Arc;
use std::thread;

fn is_not_open<T>(result: mic2::Result<T>) -> bool {
    matches!(
        result,
        Err(Error::Device(DeviceError::NotOpen(Subsystem::BitIo)))
    )
}

#[test]
fn open_and_close() {
    let (_, device) = common::device(true);

    assert!(!device.io_is_open());
    device.io_open().unwrap();
    assert!(device.io_is_open());
    assert!(matches!(
        device.io_open(),
        Err(Error::Device(DeviceError::DeviceBusy(Subsystem::BitIo)))
    ));

    device.io_close().unwrap();
    assert!(!device.io_is_open());
    device.io_close().unwrap();

    device.io_open().unwrap();
    assert!(device.io_is_open());
}

#[test]
fn closed_interface_rejects_io() {
    let (_, device) = common::device(true);
    assert!(is_not_open(device.io_set_bitmode_raw(0x51)));
    assert!(is_not_open(device.io_read_pins_raw()));
    assert!(is_not_open(device.io_buzzer_enable(true)));
    assert!(is_not_open(device.io_gpsled_is_enabled()));
    assert!(is_not_open(device.io_button_is_pressed()));
}

#[test]
fn raw_bitmode_reads_back() {
    let (_, device) = common::device(true);
    device.io_open().unwrap();

    device.io_set_bitmode_raw(0x51).unwrap();
    assert_eq!(device.io_read_pins_raw().unwrap(), 0x01);

    device.io_set_bitmode_raw(0x50).unwrap();
    assert_eq!(device.io_read_pins_raw().unwrap(), 0x00);

    // Values without their enable bit aren't driven
    device.io_set_bitmode_raw(0x05).unwrap();
    assert_eq!(device.io_read_pins_raw().unwrap(), 0x00);

    device.io_set_bitmode_raw(0x55).unwrap();
    assert_eq!(device.io_read_pins_raw().unwrap(), 0x05);
}

#[test]
fn buzzer_and_led() {
    let (transport, device) = common::device(true);
    device.io_open().unwrap();

    device.io_buzzer_enable(true).unwrap();
    assert!(device.io_buzzer_is_enabled().unwrap());
    assert!(!device.io_gpsled_is_enabled().unwrap());
    assert_eq!(transport.register(), 0x11);

    device.io_gpsled_enable(true).unwrap();
    assert!(device.io_gpsled_is_enabled().unwrap());
    assert!(device.io_buzzer_is_enabled().unwrap());

    device.io_buzzer_enable(false).unwrap();
    assert!(!device.io_buzzer_is_enabled().unwrap());
    assert!(device.io_gpsled_is_enabled().unwrap());
    assert_eq!(transport.register(), 0x54);
}

#[test]
fn button() {
    let (transport, device) = common::device(true);
    device.io_open().unwrap();

    assert!(!device.io_button_is_pressed().unwrap());
    transport.set_button(true);
    assert!(device.io_button_is_pressed().unwrap());
    assert_eq!(device.io_read_pins_raw().unwrap() & 0x02, 0x02);
    transport.set_button(false);
    assert!(!device.io_button_is_pressed().unwrap());
}

#[test]
fn concurrent_pins_are_not_lost() {
    for _ in 0..50 {
        let (transport, device) = common::device(true);
        let device = Arc::new(device);
        device.io_open().unwrap();

        let buzzer = {
            let device = device.clone();
            thread::spawn(move || device.io_buzzer_enable(true))
        };
        let led = {
            let device = device.clone();
            thread::spawn(move || device.io_gpsled_enable(true))
        };
        buzzer.join().unwrap().unwrap();
        led.join().unwrap().unwrap();

        assert_eq!(transport.register(), 0x55);
        assert_eq!(device.io_read_pins_raw().unwrap(), 0x05);
    }
}
