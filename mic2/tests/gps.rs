#![cfg(feature = "gps")]

mod common;

use mic2::{DeviceError, Error, GpsNavigationStatus, Hemisphere, Subsystem};
use std::thread;
use std::time::{Duration, Instant};

fn sentence(body: &str) -> String {
    let checksum = body.bytes().fold(0, |checksum, byte| checksum ^ byte);
    format!("${}*{:02X}\r\n", body, checksum)
}

const POSITION: &str = "PUBX,00,081350.00,4717.113210,N,00833.915187,E,546.589,G3,2.1,2.0,0.007,77.52,0.007,,0.92,1.19,0.77,9,0,0";
const SATELLITES: &str = "PUBX,03,06,2,U,137,37,24,000,8,U,053,52,28,064,9,U,202,12,21,000,14,-,,,22,000,27,-,049,16,,000,81,-,,,08,000";

fn wait_for_lock(device: &mic2::Device) {
    let start = Instant::now();
    while !device.gps_has_lock().unwrap() {
        assert!(start.elapsed() < Duration::from_secs(5), "No GPS lock");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn closed_gps_rejects_queries() {
    let (_, device) = common::device(true);
    assert!(matches!(
        device.gps_info(),
        Err(Error::Device(DeviceError::NotOpen(Subsystem::Gps)))
    ));
    assert!(matches!(
        device.gps_has_lock(),
        Err(Error::Device(DeviceError::NotOpen(Subsystem::Gps)))
    ));
    device.gps_close().unwrap();
}

#[test]
fn open_and_close() {
    let (_, device) = common::device(true);
    device.gps_open().unwrap();
    assert!(device.gps_is_open());
    assert!(matches!(
        device.gps_open(),
        Err(Error::Device(DeviceError::DeviceBusy(Subsystem::Gps)))
    ));
    device.gps_close().unwrap();
    assert!(!device.gps_is_open());
    device.gps_close().unwrap();
}

#[test]
fn info_before_lock() {
    let (transport, device) = common::device(true);
    device.gps_open().unwrap();

    transport.push_gps(sentence("PUBX,00,025554.00,0000.00000,N,00000.00000,E,0.000,NF,5311696,3755936,0.000,0.00,0.000,,99.99,99.99,99.99,0,0,0").as_bytes());
    for _ in 0..10 {
        let info = device.gps_info().unwrap();
        assert!(info.satellites().is_empty());
        assert_eq!(info.satellites_used(), 0);
        assert!(!device.gps_has_lock().unwrap());
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(
        device.gps_info().unwrap().nav_stat,
        Some(GpsNavigationStatus::NoFix)
    );
}

#[test]
fn locked_fix() {
    let (transport, device) = common::device(true);
    device.gps_open().unwrap();

    transport.push_gps(sentence(SATELLITES).as_bytes());
    transport.push_gps(sentence(POSITION).as_bytes());
    wait_for_lock(&device);

    // The position may land before the satellite report
    let start = Instant::now();
    let info = loop {
        let info = device.gps_info().unwrap();
        if !info.satellites().is_empty() {
            break info;
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(info.satellites().len(), 6);
    assert_eq!(info.satellites_used(), 3);
    assert_eq!(info.altitude, Some(546.589));

    let (latitude, hemisphere) = info.latitude_dms().unwrap();
    assert_eq!(hemisphere, Hemisphere::North);
    assert_eq!((latitude.degrees, latitude.minutes), (47, 17));
    assert!((latitude.seconds - 6.7926).abs() < 1e-9);

    let (longitude, hemisphere) = info.longitude_dms().unwrap();
    assert_eq!(hemisphere, Hemisphere::East);
    assert_eq!((longitude.degrees, longitude.minutes), (8, 33));

    let absent = &info.satellites()[3];
    assert!(absent.azimuth().is_err());
    assert_eq!(absent.snr(), Ok(22));
}

#[test]
fn malformed_sentences_keep_last_fix() {
    let (transport, device) = common::device(true);
    device.gps_open().unwrap();

    transport.push_gps(sentence(POSITION).as_bytes());
    wait_for_lock(&device);

    // Corrupt checksum, then a sentence cut off by the next one
    let mut corrupt = sentence(&POSITION.replace("546.589", "999.999"));
    corrupt.replace_range(corrupt.len() - 4..corrupt.len() - 2, "00");
    transport.push_gps(corrupt.as_bytes());
    transport.push_gps(b"$PUBX,00,0813");
    transport.push_gps(sentence("PUBX,03,01,2,U,137,37,24,000").as_bytes());

    let start = Instant::now();
    while device.gps_info().unwrap().satellites().is_empty() {
        assert!(start.elapsed() < Duration::from_secs(5));
        thread::sleep(Duration::from_millis(5));
    }

    let info = device.gps_info().unwrap();
    assert!(device.gps_has_lock().unwrap());
    assert_eq!(info.altitude, Some(546.589));
    assert_eq!(info.satellites().len(), 1);
}

#[test]
fn losing_lock() {
    let (transport, device) = common::device(true);
    device.gps_open().unwrap();

    transport.push_gps(sentence(POSITION).as_bytes());
    wait_for_lock(&device);

    transport.push_gps(sentence(&POSITION.replace(",G3,", ",NF,")).as_bytes());
    let start = Instant::now();
    while device.gps_has_lock().unwrap() {
        assert!(start.elapsed() < Duration::from_secs(5), "Lock was never lost");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(device.gps_info().unwrap().latitude.is_some());
}
