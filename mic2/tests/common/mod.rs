use mic2::settings::Settings;
use mic2::Device;
use mic2_usb::mock::MockTransport;
use simplelog::{Config, LevelFilter, TestLogger};
use std::sync::Arc;

pub const SERIAL: &str = "MC0042";

/// A single MIC2 on a simulated bus, with the transport kept for inspection.
pub fn device(has_gps: bool) -> (Arc<MockTransport>, Device) {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());

    let transport = Arc::new(MockTransport::mic2(SERIAL, has_gps));
    let mut devices =
        mic2::find_with(transport.clone(), &Settings::default()).expect("discovery failed");
    assert_eq!(devices.len(), 1);
    (transport, devices.remove(0))
}
