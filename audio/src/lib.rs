use mic2_usb::error::TransportError;

pub mod capture;
pub mod encoder;

pub use capture::{AudioCapture, CaptureOptions, CaptureState, SUPPORTED_SAMPLE_RATES};
pub use encoder::AudioFormat;

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Audio is already being captured")]
    AlreadyCapturing,

    #[error("Audio is not being captured")]
    NotCapturing,

    #[error("No captured audio is waiting to be saved")]
    NoBufferedAudio,

    #[error("Sample rate of {0}Hz is not supported")]
    UnsupportedRate(u32),

    #[error("Unable to write audio: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to encode audio: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
