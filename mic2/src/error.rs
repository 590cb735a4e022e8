#[cfg(feature = "audio")]
use mic2_audio::CaptureError;
use mic2_usb::error::{DeviceError, TransportError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[cfg(feature = "audio")]
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;
