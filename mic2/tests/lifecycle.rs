#![cfg(all(feature = "io", feature = "gps", feature = "audio"))]

mod common;

use mic2_usb::transport::Interface;

#[test]
fn drop_closes_everything() {
    let (transport, device) = common::device(true);

    device.io_open().unwrap();
    device.io_buzzer_enable(true).unwrap();
    device.gps_open().unwrap();
    device.audio_start(44100).unwrap();

    drop(device);

    for interface in [Interface::BitIo, Interface::Gps, Interface::Audio] {
        assert_eq!(transport.claims(interface), 1, "{interface} claims");
        assert_eq!(transport.releases(interface), 1, "{interface} releases");
    }
    // The bit-bang pins are handed back on close
    assert_eq!(transport.register(), 0x00);
}

#[test]
fn subsystems_run_side_by_side() {
    let (transport, device) = common::device(true);

    device.io_open().unwrap();
    device.gps_open().unwrap();
    device.audio_start(8000).unwrap();

    device.io_gpsled_enable(true).unwrap();
    assert!(device.io_gpsled_is_enabled().unwrap());
    assert!(device.gps_info().is_ok());

    device.audio_stop().unwrap();
    device.gps_close().unwrap();
    device.io_close().unwrap();

    assert!(!device.io_is_open());
    assert!(!device.gps_is_open());
    assert_eq!(transport.releases(Interface::Gps), 1);
}
