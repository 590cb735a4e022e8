use crate::transport::Interface;
use strum::Display;

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Subsystem {
    #[strum(to_string = "Digital I/O")]
    BitIo,
    #[strum(to_string = "GPS")]
    Gps,
    #[strum(to_string = "Audio")]
    Audio,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Device has been disconnected")]
    Disconnected,

    #[error("No {0} interface is available on this device")]
    InterfaceNotFound(Interface),

    #[error("The {0} interface has no usable endpoints")]
    UnsupportedEndpoint(Interface),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Expected {expected} bytes from the device, received {received}")]
    ShortRead { expected: usize, received: usize },

    #[error("Unable to start worker thread: {0}")]
    Thread(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("{0} is not open")]
    NotOpen(Subsystem),

    #[error("{0} is already open")]
    DeviceBusy(Subsystem),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
