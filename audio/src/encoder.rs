use crate::CaptureError;
use flacenc::component::BitRepr;
use flacenc::error::Verify;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info};
use std::fs;
use std::path::Path;
use strum::Display;

const BITS_PER_SAMPLE: u16 = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum AudioFormat {
    #[strum(to_string = "FLAC")]
    Flac,
    #[strum(to_string = "WAV")]
    Wav,
}

impl AudioFormat {
    /// WAV for a `.wav` extension, FLAC for anything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("wav") => AudioFormat::Wav,
            _ => AudioFormat::Flac,
        }
    }
}

/// Writes interleaved 16bit samples to `path`, replacing anything already there.
pub fn encode(
    path: &Path,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> Result<AudioFormat, CaptureError> {
    let format = AudioFormat::from_path(path);

    // A trailing partial frame can't be represented by either container
    let frame = usize::from(channels.max(1));
    let samples = &samples[..samples.len() - samples.len() % frame];
    debug!(
        "Encoding {} samples at {}Hz as {}",
        samples.len(),
        sample_rate,
        format
    );

    match format {
        AudioFormat::Flac => write_flac(path, samples, channels, sample_rate)?,
        AudioFormat::Wav => write_wav(path, samples, channels, sample_rate)?,
    }

    info!("Saved audio to {}", path.display());
    Ok(format)
}

fn write_flac(
    path: &Path,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> Result<(), CaptureError> {
    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|(_, error)| CaptureError::Encode(format!("{:?}", error)))?;

    let samples: Vec<i32> = samples.iter().map(|sample| i32::from(*sample)).collect();
    let source = flacenc::source::MemSource::from_samples(
        &samples,
        usize::from(channels),
        usize::from(BITS_PER_SAMPLE),
        sample_rate as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|error| CaptureError::Encode(format!("{:?}", error)))?;

    let mut sink = flacenc::bitsink::ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|_| CaptureError::Encode("Unable to serialise FLAC stream".to_string()))?;

    fs::write(path, sink.as_slice())?;
    Ok(())
}

fn write_wav(
    path: &Path,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> Result<(), CaptureError> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(map_hound)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(map_hound)?;
    }
    writer.finalize().map_err(map_hound)?;
    Ok(())
}

fn map_hound(error: hound::Error) -> CaptureError {
    match error {
        hound::Error::IoError(error) => CaptureError::Io(error),
        error => CaptureError::Encode(error.to_string()),
    }
}
