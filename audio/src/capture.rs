use crate::encoder::{self, AudioFormat};
use crate::CaptureError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use mic2_usb::error::TransportError;
use mic2_usb::transport::{Interface, Transport, TransportStream, UsbDeviceInfo};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strum::Display;

/// Rates the PCM2912A codec can be clocked at.
pub const SUPPORTED_SAMPLE_RATES: [u32; 7] = [8000, 11025, 16000, 22050, 32000, 44100, 48000];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum CaptureState {
    Idle,
    Capturing,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub channels: u16,
    /// Bytes requested from the codec per read.
    pub read_chunk: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            channels: 1,
            read_chunk: 4096,
        }
    }
}

type CaptureResult = (Vec<i16>, Result<(), TransportError>);

struct Recording {
    stop: Arc<AtomicBool>,
    captured: Arc<AtomicUsize>,
    handle: JoinHandle<CaptureResult>,
}

enum Session {
    Idle,
    Capturing {
        sample_rate: u32,
        recording: Recording,
    },
    Stopped {
        sample_rate: u32,
        samples: Vec<i16>,
    },
}

pub struct AudioCapture {
    transport: Arc<dyn Transport>,
    device: Option<UsbDeviceInfo>,
    options: CaptureOptions,
    session: Mutex<Session>,
}

impl Debug for AudioCapture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapture")
            .field("device", &self.device.as_ref().map(|device| device.identity()))
            .field("state", &self.state())
            .field("sample_rate", &self.sample_rate())
            .finish()
    }
}

impl AudioCapture {
    /// `device` is the codec serving the microphone, if the unit has one.
    pub fn new(
        transport: Arc<dyn Transport>,
        device: Option<UsbDeviceInfo>,
        options: CaptureOptions,
    ) -> Self {
        Self {
            transport,
            device,
            options,
            session: Mutex::new(Session::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self, sample_rate: u32) -> Result<(), CaptureError> {
        let mut session = self.lock();
        if !matches!(*session, Session::Idle) {
            return Err(CaptureError::AlreadyCapturing);
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(CaptureError::UnsupportedRate(sample_rate));
        }

        let device = self
            .device
            .as_ref()
            .ok_or(TransportError::InterfaceNotFound(Interface::Audio))?;
        let mut stream = self.transport.claim(device, Interface::Audio)?;

        let mut frequency = [0; 3];
        LittleEndian::write_u24(&mut frequency, sample_rate);
        if let Err(error) = stream.write(&frequency) {
            let _ = stream.release();
            return Err(error.into());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let captured = Arc::new(AtomicUsize::new(0));
        let handle = {
            let stop = stop.clone();
            let captured = captured.clone();
            let read_chunk = self.options.read_chunk;
            thread::Builder::new()
                .name("mic2-audio-capture".to_string())
                .spawn(move || capture_loop(stream, stop, captured, read_chunk))
                .map_err(|error| TransportError::Thread(error.to_string()))?
        };

        info!("Capturing audio at {}Hz", sample_rate);
        *session = Session::Capturing {
            sample_rate,
            recording: Recording {
                stop,
                captured,
                handle,
            },
        };
        Ok(())
    }

    /// Ends the capture, holding on to what was recorded until it's saved or discarded.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut session = self.lock();
        if !matches!(*session, Session::Capturing { .. }) {
            return Err(CaptureError::NotCapturing);
        }

        let Session::Capturing {
            sample_rate,
            recording,
        } = std::mem::replace(&mut *session, Session::Idle)
        else {
            return Err(CaptureError::NotCapturing);
        };

        recording.stop.store(true, Ordering::Relaxed);
        let (mut samples, result) = recording
            .handle
            .join()
            .map_err(|_| TransportError::Thread("Audio capture panicked".to_string()))?;

        // Only whole frames are kept
        let channels = usize::from(self.options.channels.max(1));
        samples.truncate(samples.len() - samples.len() % channels);

        info!("Stopped audio capture with {} samples", samples.len());
        *session = Session::Stopped {
            sample_rate,
            samples,
        };
        Ok(result?)
    }

    /// Encodes the stopped capture to `path`, the format is picked by its extension.
    pub fn save(&self, path: &Path) -> Result<AudioFormat, CaptureError> {
        let mut session = self.lock();
        let Session::Stopped {
            sample_rate,
            samples,
        } = &*session
        else {
            return Err(CaptureError::NoBufferedAudio);
        };

        let format = encoder::encode(path, samples, self.options.channels, *sample_rate)?;
        *session = Session::Idle;
        Ok(format)
    }

    /// Drops a stopped capture without saving it.
    pub fn discard(&self) -> Result<(), CaptureError> {
        let mut session = self.lock();
        if !matches!(*session, Session::Stopped { .. }) {
            return Err(CaptureError::NoBufferedAudio);
        }
        debug!("Discarding captured audio");
        *session = Session::Idle;
        Ok(())
    }

    pub fn state(&self) -> CaptureState {
        match *self.lock() {
            Session::Idle => CaptureState::Idle,
            Session::Capturing { .. } => CaptureState::Capturing,
            Session::Stopped { .. } => CaptureState::Stopped,
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match *self.lock() {
            Session::Idle => None,
            Session::Capturing { sample_rate, .. } | Session::Stopped { sample_rate, .. } => {
                Some(sample_rate)
            }
        }
    }

    /// Samples captured so far, across all channels.
    pub fn buffered_samples(&self) -> usize {
        match &*self.lock() {
            Session::Idle => 0,
            Session::Capturing { recording, .. } => recording.captured.load(Ordering::Relaxed),
            Session::Stopped { samples, .. } => samples.len(),
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.state() == CaptureState::Capturing {
            if let Err(error) = self.stop() {
                warn!("Audio capture failed while stopping: {}", error);
            }
        }
    }
}

fn capture_loop(
    mut stream: Box<dyn TransportStream>,
    stop: Arc<AtomicBool>,
    captured: Arc<AtomicUsize>,
    read_chunk: usize,
) -> CaptureResult {
    let mut samples = Vec::new();
    let mut buffer = vec![0; read_chunk.max(2)];
    // A read can end part way through a sample
    let mut carry: Option<u8> = None;

    let result = loop {
        if stop.load(Ordering::Relaxed) {
            break Ok(());
        }

        let length = match stream.read(&mut buffer) {
            Ok(length) => length,
            Err(error) => {
                warn!("Audio read failed: {}", error);
                break Err(error);
            }
        };
        if length == 0 {
            thread::sleep(Duration::from_millis(1));
            continue;
        }

        let mut data = &buffer[..length];
        if let Some(low) = carry.take() {
            samples.push(i16::from_le_bytes([low, data[0]]));
            data = &data[1..];
        }

        let pairs = data.chunks_exact(2);
        if let [low] = pairs.remainder() {
            carry = Some(*low);
        }
        samples.extend(pairs.map(LittleEndian::read_i16));
        captured.store(samples.len(), Ordering::Relaxed);
    };

    if let Err(error) = stream.release() {
        warn!("Unable to release audio interface: {}", error);
    }
    (samples, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mic2_usb::mock::MockTransport;
    use simplelog::{Config, LevelFilter, TestLogger};
    use std::time::Instant;

    fn capture() -> (Arc<MockTransport>, AudioCapture) {
        let _ = TestLogger::init(LevelFilter::Debug, Config::default());
        let transport = Arc::new(MockTransport::mic2("MC0001", false));
        let device = Some(transport.audio_device());
        let capture = AudioCapture::new(transport.clone(), device, CaptureOptions::default());
        (transport, capture)
    }

    fn wait_for_samples(capture: &AudioCapture, count: usize) {
        let start = Instant::now();
        while capture.buffered_samples() < count {
            assert!(start.elapsed() < Duration::from_secs(5), "No audio arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn state_machine() {
        let (transport, capture) = capture();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(matches!(capture.stop(), Err(CaptureError::NotCapturing)));
        assert!(matches!(capture.discard(), Err(CaptureError::NoBufferedAudio)));

        capture.start(16000).unwrap();
        assert_eq!(capture.state(), CaptureState::Capturing);
        assert_eq!(capture.sample_rate(), Some(16000));
        assert_eq!(transport.audio_rate(), Some(16000));
        assert!(matches!(capture.start(16000), Err(CaptureError::AlreadyCapturing)));

        wait_for_samples(&capture, 16);
        capture.stop().unwrap();
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert!(capture.buffered_samples() >= 16);
        assert_eq!(transport.releases(Interface::Audio), 1);
        assert!(matches!(capture.start(16000), Err(CaptureError::AlreadyCapturing)));

        capture.discard().unwrap();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.buffered_samples(), 0);
        assert_eq!(capture.sample_rate(), None);
    }

    #[test]
    fn unsupported_rates_fail_fast() {
        let (transport, capture) = capture();
        for rate in [0, 44000, 96000] {
            assert!(matches!(
                capture.start(rate),
                Err(CaptureError::UnsupportedRate(r)) if r == rate
            ));
        }
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(transport.claims(Interface::Audio), 0);
    }

    #[test]
    fn missing_codec() {
        let transport = Arc::new(MockTransport::mic2("MC0001", false));
        let capture = AudioCapture::new(transport, None, CaptureOptions::default());
        assert!(matches!(
            capture.start(44100),
            Err(CaptureError::Transport(TransportError::InterfaceNotFound(
                Interface::Audio
            )))
        ));
    }

    #[test]
    fn save_returns_to_idle() {
        let (_, capture) = capture();
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("capture.wav");

        capture.start(8000).unwrap();
        wait_for_samples(&capture, 80);
        capture.stop().unwrap();
        let count = capture.buffered_samples();

        assert_eq!(capture.save(&path).unwrap(), AudioFormat::Wav);
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(matches!(capture.save(&path), Err(CaptureError::NoBufferedAudio)));

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len() as usize, count);
    }

    #[test]
    fn stereo_keeps_whole_frames() {
        let _ = TestLogger::init(LevelFilter::Debug, Config::default());
        let transport = Arc::new(MockTransport::mic2("MC0001", false));
        let options = CaptureOptions {
            channels: 2,
            ..CaptureOptions::default()
        };
        let capture = AudioCapture::new(transport.clone(), Some(transport.audio_device()), options);
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("stereo.wav");

        for _ in 0..5 {
            capture.start(11025).unwrap();
            wait_for_samples(&capture, 11);
            capture.stop().unwrap();
            let count = capture.buffered_samples();
            assert_eq!(count % 2, 0);

            capture.save(&path).unwrap();
            let reader = hound::WavReader::open(&path).unwrap();
            assert_eq!(reader.spec().channels, 2);
            assert_eq!(reader.len() as usize, count);
        }
    }

    #[test]
    fn failed_save_keeps_the_buffer() {
        let (_, capture) = capture();
        let directory = tempfile::tempdir().unwrap();

        capture.start(8000).unwrap();
        wait_for_samples(&capture, 8);
        capture.stop().unwrap();

        let path = directory.path().join("missing").join("capture.flac");
        assert!(matches!(capture.save(&path), Err(CaptureError::Io(_))));
        assert_eq!(capture.state(), CaptureState::Stopped);
    }

    #[test]
    fn transport_failure_is_surfaced_by_stop() {
        let (transport, capture) = capture();
        capture.start(48000).unwrap();
        wait_for_samples(&capture, 48);
        transport.fail_reads(Interface::Audio, TransportError::Disconnected);

        // Let the capture thread hit the failure
        thread::sleep(Duration::from_millis(50));
        assert!(matches!(
            capture.stop(),
            Err(CaptureError::Transport(TransportError::Disconnected))
        ));
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert!(capture.buffered_samples() >= 48);
    }

    #[test]
    fn drop_stops_the_capture() {
        let (transport, capture) = capture();
        capture.start(22050).unwrap();
        drop(capture);
        assert_eq!(transport.releases(Interface::Audio), 1);
    }
}
