use crate::error::Result;
use crate::settings::Settings;
use log::debug;
#[cfg(any(feature = "io", feature = "gps", feature = "audio"))]
use log::warn;
#[cfg(feature = "audio")]
use mic2_audio::{AudioCapture, AudioFormat, CaptureState};
use mic2_types::UsbIdentity;
#[cfg(feature = "gps")]
use mic2_types::GPSInfo;
#[cfg(feature = "io")]
use mic2_usb::bitio::BitIoController;
#[cfg(feature = "gps")]
use mic2_usb::gps::GpsEngine;
use mic2_usb::transport::{Transport, UsbDeviceInfo};
use std::fmt::{Debug, Display, Formatter};
#[cfg(feature = "audio")]
use std::path::Path;
use std::sync::Arc;

/// A single MIC2, with its Digital I/O, GPS and Audio.
///
/// Each subsystem guards its own state, so different threads may drive different subsystems at
/// the same time. Dropping the device closes anything still open.
///
/// The subsystems are behind the `io`, `gps` and `audio` features, all enabled by default.
pub struct Device {
    serial_number: String,
    io_device: UsbDeviceInfo,
    gps_device: Option<UsbDeviceInfo>,
    audio_device: Option<UsbDeviceInfo>,

    #[cfg(feature = "io")]
    io: BitIoController,
    #[cfg(feature = "gps")]
    gps: GpsEngine,
    #[cfg(feature = "audio")]
    audio: AudioCapture,
}

impl Device {
    #[cfg_attr(
        not(all(feature = "io", feature = "gps", feature = "audio")),
        allow(unused_variables)
    )]
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        settings: &Settings,
        serial_number: String,
        io_device: UsbDeviceInfo,
        gps_device: Option<UsbDeviceInfo>,
        audio_device: Option<UsbDeviceInfo>,
    ) -> Self {
        debug!(
            "Building MIC2 {} (GPS: {}, Audio: {})",
            serial_number,
            gps_device.is_some(),
            audio_device.is_some()
        );

        Self {
            #[cfg(feature = "io")]
            io: BitIoController::new(transport.clone(), io_device.clone()),
            #[cfg(feature = "gps")]
            gps: GpsEngine::new(transport.clone(), gps_device.clone(), settings.gps_options()),
            #[cfg(feature = "audio")]
            audio: AudioCapture::new(transport, audio_device.clone(), settings.capture_options()),
            serial_number,
            io_device,
            gps_device,
            audio_device,
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn has_gps(&self) -> bool {
        self.gps_device.is_some()
    }

    /// Where the Digital I/O function sits on the bus.
    pub fn usb_identity(&self) -> UsbIdentity {
        self.io_device.identity()
    }

    pub fn gps_usb_identity(&self) -> Option<UsbIdentity> {
        self.gps_device.as_ref().map(|device| device.identity())
    }

    pub fn audio_usb_identity(&self) -> Option<UsbIdentity> {
        self.audio_device.as_ref().map(|device| device.identity())
    }

    #[cfg(feature = "io")]
    pub fn io(&self) -> &BitIoController {
        &self.io
    }

    #[cfg(feature = "gps")]
    pub fn gps(&self) -> &GpsEngine {
        &self.gps
    }

    #[cfg(feature = "audio")]
    pub fn audio(&self) -> &AudioCapture {
        &self.audio
    }
}

#[cfg(feature = "io")]
impl Device {
    pub fn io_open(&self) -> Result<()> {
        Ok(self.io.open()?)
    }

    pub fn io_close(&self) -> Result<()> {
        Ok(self.io.close()?)
    }

    pub fn io_is_open(&self) -> bool {
        self.io.is_open()
    }

    pub fn io_set_bitmode_raw(&self, mask: u8) -> Result<()> {
        Ok(self.io.set_bitmode_raw(mask)?)
    }

    pub fn io_read_pins_raw(&self) -> Result<u8> {
        Ok(self.io.read_pins_raw()?)
    }

    pub fn io_buzzer_enable(&self, enabled: bool) -> Result<()> {
        Ok(self.io.buzzer_enable(enabled)?)
    }

    pub fn io_buzzer_is_enabled(&self) -> Result<bool> {
        Ok(self.io.buzzer_is_enabled()?)
    }

    pub fn io_gpsled_enable(&self, enabled: bool) -> Result<()> {
        Ok(self.io.gps_led_enable(enabled)?)
    }

    pub fn io_gpsled_is_enabled(&self) -> Result<bool> {
        Ok(self.io.gps_led_is_enabled()?)
    }

    pub fn io_button_is_pressed(&self) -> Result<bool> {
        Ok(self.io.button_is_pressed()?)
    }
}

#[cfg(feature = "gps")]
impl Device {
    pub fn gps_open(&self) -> Result<()> {
        Ok(self.gps.open()?)
    }

    pub fn gps_close(&self) -> Result<()> {
        Ok(self.gps.close()?)
    }

    pub fn gps_is_open(&self) -> bool {
        self.gps.is_open()
    }

    pub fn gps_has_lock(&self) -> Result<bool> {
        Ok(self.gps.has_lock()?)
    }

    pub fn gps_info(&self) -> Result<GPSInfo> {
        Ok(self.gps.info()?)
    }
}

#[cfg(feature = "audio")]
impl Device {
    pub fn audio_start(&self, sample_rate: u32) -> Result<()> {
        Ok(self.audio.start(sample_rate)?)
    }

    pub fn audio_stop(&self) -> Result<()> {
        Ok(self.audio.stop()?)
    }

    pub fn audio_save(&self, path: impl AsRef<Path>) -> Result<AudioFormat> {
        Ok(self.audio.save(path.as_ref())?)
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "neoVI MIC2 {}", self.serial_number)
    }
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Device");
        debug
            .field("serial_number", &self.serial_number)
            .field("usb_identity", &self.usb_identity())
            .field("has_gps", &self.has_gps());
        #[cfg(feature = "io")]
        debug.field("io_open", &self.io.is_open());
        #[cfg(feature = "gps")]
        debug.field("gps_open", &self.gps.is_open());
        #[cfg(feature = "audio")]
        debug.field("audio", &self.audio.state());
        debug.finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        #[cfg(feature = "audio")]
        if self.audio.state() == CaptureState::Capturing {
            if let Err(error) = self.audio.stop() {
                warn!("{}: audio capture failed while stopping: {}", self, error);
            }
        }
        #[cfg(feature = "gps")]
        if let Err(error) = self.gps.close() {
            warn!("{}: unable to close GPS: {}", self, error);
        }
        #[cfg(feature = "io")]
        if let Err(error) = self.io.close() {
            warn!("{}: unable to close Digital I/O: {}", self, error);
        }
        debug!("{} released", self);
    }
}
