//! Driver for the neoVI MIC2, a USB accessory combining a buzzer, a GPS status LED and a button
//! (over an FTDI bit-bang interface), an optional u-blox GPS receiver, and a microphone.
//!
//! ```no_run
//! let devices = mic2::find()?;
//! for device in &devices {
//!     println!("{} has GPS: {}", device, device.has_gps());
//! }
//! # Ok::<(), mic2::Error>(())
//! ```
//!
//! Each subsystem has a cargo feature, `io`, `gps` and `audio`, all on by default. Turning one
//! off removes the matching `Device` methods.
mod device;
mod discovery;
mod error;
pub mod settings;

pub use device::Device;
pub use discovery::{find, find_with};
pub use error::{Error, Result};

#[cfg(feature = "audio")]
pub use mic2_audio::{AudioFormat, CaptureError, CaptureState, SUPPORTED_SAMPLE_RATES};
pub use mic2_types::{
    FieldUnavailable, GPSInfo, GPSSatInfo, GpsNavigationStatus, Hemisphere, Satellite,
    UsbIdentity, GPSDMS,
};
pub use mic2_usb::error::{DeviceError, Subsystem, TransportError};
