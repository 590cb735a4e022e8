pub use rusb;
pub mod bitio;
pub mod error;
pub mod gps;
pub mod nmea;
pub mod transport;
pub mod ubx;

mod device;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use device::UsbTransport;

// The MIC2 is a small hub with three functions hanging off of it.
pub const VID_FTDI: u16 = 0x0403;
pub const PID_FTDI_FT232R: u16 = 0x6001;

pub const VID_UBLOX: u16 = 0x1546;
pub const PID_UBLOX: [u16; 2] = [0x01a7, 0x01a8];

pub const VID_TI_AUDIO: u16 = 0x08bb;
pub const PID_PCM2912A: u16 = 0x2912;

/// Serial numbers of MIC2 units all start with this, the rest is alphanumeric.
pub const SERIAL_PREFIX: &str = "MC";
