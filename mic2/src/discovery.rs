use crate::device::Device;
use crate::error::Result;
use crate::settings::Settings;
use log::{debug, info};
use mic2_usb::transport::{Transport, UsbDeviceInfo};
use mic2_usb::{
    UsbTransport, PID_FTDI_FT232R, PID_PCM2912A, PID_UBLOX, SERIAL_PREFIX, VID_FTDI,
    VID_TI_AUDIO, VID_UBLOX,
};
use std::sync::Arc;

/// Finds every MIC2 currently attached, using the default settings.
pub fn find() -> Result<Vec<Device>> {
    let settings = Settings::default();
    let transport = Arc::new(UsbTransport::new(settings.usb_timeout()));
    find_with(transport, &settings)
}

/// Finds every MIC2 visible to `transport`. An empty list isn't an error.
pub fn find_with(transport: Arc<dyn Transport>, settings: &Settings) -> Result<Vec<Device>> {
    let candidates = transport.enumerate(VID_FTDI, PID_FTDI_FT232R)?;
    if candidates.is_empty() {
        return Ok(vec![]);
    }
    let everything = transport.enumerate_all()?;

    let mut found_devices = Vec::new();
    for io_device in candidates {
        let Some(serial_number) = io_device.serial_number.clone() else {
            debug!("Skipping FTDI device without a serial: {}", io_device.identity());
            continue;
        };
        if !is_mic2_serial(&serial_number) {
            debug!("Skipping FTDI device with serial {}", serial_number);
            continue;
        }

        let gps_device = sibling(&everything, &io_device, VID_UBLOX, &PID_UBLOX);
        let audio_device = sibling(&everything, &io_device, VID_TI_AUDIO, &[PID_PCM2912A]);

        info!("Found neoVI MIC2 {} at {}", serial_number, io_device.identity());
        found_devices.push(Device::new(
            transport.clone(),
            settings,
            serial_number,
            io_device,
            gps_device,
            audio_device,
        ));
    }
    Ok(found_devices)
}

fn is_mic2_serial(serial: &str) -> bool {
    serial
        .strip_prefix(SERIAL_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn sibling(
    devices: &[UsbDeviceInfo],
    io_device: &UsbDeviceInfo,
    vendor_id: u16,
    product_ids: &[u16],
) -> Option<UsbDeviceInfo> {
    devices
        .iter()
        .find(|device| {
            device.vendor_id == vendor_id
                && product_ids.contains(&device.product_id)
                && device.is_sibling_of(io_device)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_numbers() {
        assert!(is_mic2_serial("MC0001"));
        assert!(is_mic2_serial("MCA12B"));
        assert!(!is_mic2_serial("MC"));
        assert!(!is_mic2_serial("FT12345"));
        assert!(!is_mic2_serial("MC-001"));
    }
}
