use crate::error::{DeviceError, Subsystem, TransportError};
use crate::nmea;
use crate::transport::{Interface, Transport, TransportStream, UsbDeviceInfo};
use crate::ubx::UbxPacket;
use log::{debug, info, warn};
use mic2_types::GPSInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

mod framer;

pub use framer::{Frame, GpsFramer};

// Standard NMEA sentences (class 0xF0) we don't need, and the PUBX sentences (class 0xF1) we do.
const NMEA_STANDARD: u8 = 0xf0;
const NMEA_STANDARD_IDS: [u8; 19] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0d, 0x0e, 0x0f, 0x40,
    0x41, 0x42, 0x43, 0x44,
];
const NMEA_PUBX: u8 = 0xf1;
const PUBX_IDS: [u8; 3] = [0x00, 0x03, 0x04];

#[derive(Debug, Clone)]
pub struct GpsOptions {
    /// Bytes requested from the receiver per read.
    pub read_chunk: usize,
    /// How long the reader rests after a read returns nothing.
    pub idle_backoff: Duration,
}

impl Default for GpsOptions {
    fn default() -> Self {
        Self {
            read_chunk: 1024,
            idle_backoff: Duration::from_millis(10),
        }
    }
}

struct GpsSession {
    stop: Arc<AtomicBool>,
    reader: JoinHandle<Result<(), TransportError>>,
}

pub struct GpsEngine {
    transport: Arc<dyn Transport>,
    device: Option<UsbDeviceInfo>,
    options: GpsOptions,
    session: Mutex<Option<GpsSession>>,
    info: Arc<RwLock<GPSInfo>>,
}

impl GpsEngine {
    /// `device` is None when the unit has no receiver fitted.
    pub fn new(
        transport: Arc<dyn Transport>,
        device: Option<UsbDeviceInfo>,
        options: GpsOptions,
    ) -> Self {
        Self {
            transport,
            device,
            options,
            session: Mutex::new(None),
            info: Arc::new(RwLock::new(GPSInfo::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<GpsSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self) -> Result<(), DeviceError> {
        let mut session = self.lock();
        if session.is_some() {
            return Err(DeviceError::DeviceBusy(Subsystem::Gps));
        }

        let device = self
            .device
            .as_ref()
            .ok_or(TransportError::InterfaceNotFound(Interface::Gps))?;
        let mut stream = self.transport.claim(device, Interface::Gps)?;

        if let Err(error) = configure(stream.as_mut()) {
            let _ = stream.release();
            return Err(error.into());
        }

        *self.info.write().unwrap_or_else(PoisonError::into_inner) = GPSInfo::default();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let stop = stop.clone();
            let info = self.info.clone();
            let options = self.options.clone();
            thread::Builder::new()
                .name("mic2-gps-reader".to_string())
                .spawn(move || read_loop(stream, stop, info, options))
                .map_err(|error| TransportError::Thread(error.to_string()))?
        };

        info!("Opened GPS on {}", device.identity());
        *session = Some(GpsSession { stop, reader });
        Ok(())
    }

    pub fn close(&self) -> Result<(), DeviceError> {
        let mut session = self.lock();
        Self::stop_session(&mut session)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    pub fn has_lock(&self) -> Result<bool, DeviceError> {
        Ok(self.info()?.has_fix())
    }

    /// A snapshot of the receiver's most recent reports.
    pub fn info(&self) -> Result<GPSInfo, DeviceError> {
        let mut session = self.lock();
        let finished = match session.as_ref() {
            None => return Err(DeviceError::NotOpen(Subsystem::Gps)),
            Some(running) => running.reader.is_finished(),
        };

        // The reader only ever stops early on a transport failure
        if finished {
            warn!("GPS reader has stopped, closing");
            Self::stop_session(&mut session)?;
            return Err(DeviceError::NotOpen(Subsystem::Gps));
        }

        Ok(self
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn stop_session(session: &mut Option<GpsSession>) -> Result<(), DeviceError> {
        let Some(running) = session.take() else {
            return Ok(());
        };

        running.stop.store(true, Ordering::Relaxed);
        let result = running
            .reader
            .join()
            .map_err(|_| TransportError::Thread("GPS reader panicked".to_string()))?;
        info!("Closed GPS");
        Ok(result?)
    }
}

impl Drop for GpsEngine {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!("Unable to cleanly close GPS: {}", error);
        }
    }
}

// Quiet the receiver down to just the PUBX sentences.
fn configure(stream: &mut dyn TransportStream) -> Result<(), TransportError> {
    debug!("Resetting GPS receiver");
    stream.write(&UbxPacket::cfg_rst_controlled().to_bytes())?;

    for id in NMEA_STANDARD_IDS {
        stream.write(&UbxPacket::cfg_msg(NMEA_STANDARD, id, 0).to_bytes())?;
    }
    for id in PUBX_IDS {
        stream.write(&UbxPacket::cfg_msg(NMEA_PUBX, id, 1).to_bytes())?;
    }
    Ok(())
}

fn read_loop(
    mut stream: Box<dyn TransportStream>,
    stop: Arc<AtomicBool>,
    info: Arc<RwLock<GPSInfo>>,
    options: GpsOptions,
) -> Result<(), TransportError> {
    let mut framer = GpsFramer::new();
    let mut buffer = vec![0; options.read_chunk];

    let result = loop {
        if stop.load(Ordering::Relaxed) {
            break Ok(());
        }

        let length = match stream.read(&mut buffer) {
            Ok(length) => length,
            Err(error) => {
                warn!("GPS read failed: {}", error);
                break Err(error);
            }
        };
        if length == 0 {
            thread::sleep(options.idle_backoff);
            continue;
        }

        framer.push(&buffer[..length]);
        while let Some(frame) = framer.next_frame() {
            match frame {
                Frame::Nmea(line) => match nmea::decode(&line) {
                    Ok(sentence) => {
                        let mut info = info.write().unwrap_or_else(PoisonError::into_inner);
                        nmea::apply(sentence, &mut info);
                    }
                    Err(error) => debug!("Dropping GPS sentence: {}", error),
                },
                Frame::Ubx(packet) => match packet.acknowledged() {
                    Some((true, class, id)) => debug!("Receiver ACK {:#04x}:{:#04x}", class, id),
                    Some((false, class, id)) => warn!("Receiver NAK {:#04x}:{:#04x}", class, id),
                    None => debug!("Ignoring UBX frame {:?}", packet),
                },
            }
        }
    };

    let released = stream.release();
    result.and(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::nmea::frame;
    use crate::ubx::{UbxClass, UbxError};
    use simplelog::{Config, LevelFilter, TestLogger};
    use std::time::Instant;

    fn engine(has_gps: bool) -> (Arc<MockTransport>, GpsEngine) {
        let _ = TestLogger::init(LevelFilter::Debug, Config::default());
        let transport = Arc::new(MockTransport::mic2("MC0001", has_gps));
        let device = transport.gps_device();
        let engine = GpsEngine::new(transport.clone(), device, GpsOptions::default());
        (transport, engine)
    }

    fn wait_for(engine: &GpsEngine, check: impl Fn(&GPSInfo) -> bool) -> GPSInfo {
        let start = Instant::now();
        loop {
            let info = engine.info().unwrap();
            if check(&info) {
                return info;
            }
            assert!(start.elapsed() < Duration::from_secs(5), "Timed out waiting for GPS");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn closed_engine_rejects_queries() {
        let (_, engine) = engine(true);
        assert_eq!(engine.info(), Err(DeviceError::NotOpen(Subsystem::Gps)));
        assert_eq!(engine.has_lock(), Err(DeviceError::NotOpen(Subsystem::Gps)));
        assert!(engine.close().is_ok());
    }

    #[test]
    fn missing_receiver() {
        let (_, engine) = engine(false);
        assert_eq!(
            engine.open(),
            Err(DeviceError::Transport(TransportError::InterfaceNotFound(
                Interface::Gps
            )))
        );
        assert!(!engine.is_open());
    }

    #[test]
    fn open_configures_receiver() {
        let (transport, engine) = engine(true);
        engine.open().unwrap();
        assert_eq!(engine.open(), Err(DeviceError::DeviceBusy(Subsystem::Gps)));

        let mut written = transport.gps_written();
        let mut packets = Vec::new();
        loop {
            match UbxPacket::from_bytes(&written) {
                Ok((packet, length)) => {
                    packets.push(packet);
                    written.drain(..length);
                }
                Err(UbxError::Incomplete) if written.is_empty() => break,
                Err(error) => panic!("Unexpected data written to GPS: {error}"),
            }
        }

        assert_eq!(packets[0], UbxPacket::cfg_rst_controlled());
        assert_eq!(packets.len(), 1 + NMEA_STANDARD_IDS.len() + PUBX_IDS.len());
        assert!(packets[1..].iter().all(|packet| packet.class == UbxClass::Cfg));
        assert_eq!(packets.last(), Some(&UbxPacket::cfg_msg(0xf1, 0x04, 1)));

        engine.close().unwrap();
        assert!(!engine.is_open());
        assert_eq!(transport.releases(Interface::Gps), 1);
    }

    #[test]
    fn reader_applies_sentences() {
        let (transport, engine) = engine(true);
        engine.open().unwrap();
        assert!(engine.info().unwrap().satellites().is_empty());
        assert!(!engine.has_lock().unwrap());

        let position = "PUBX,00,081350.00,4717.113210,N,00833.915187,E,546.589,G3,2.1,2.0,0.007,77.52,0.007,,0.92,1.19,0.77,9,0,0";
        let satellites = "PUBX,03,02,2,U,137,37,24,000,14,-,,,22,000";
        let sentences = format!("{}{}", frame(position), frame(satellites));
        let (first, second) = sentences.as_bytes().split_at(40);
        transport.push_gps(first);
        transport.push_gps(second);

        let info = wait_for(&engine, |info| info.satellites().len() == 2);
        assert_eq!(info.satellites_used(), 1);
        assert!(engine.has_lock().unwrap());
    }

    #[test]
    fn reader_failure_closes_engine() {
        let (transport, engine) = engine(true);
        engine.open().unwrap();
        transport.fail_reads(Interface::Gps, TransportError::Disconnected);

        let start = Instant::now();
        let error = loop {
            match engine.info() {
                Ok(_) => {
                    assert!(start.elapsed() < Duration::from_secs(5));
                    thread::sleep(Duration::from_millis(5));
                }
                Err(error) => break error,
            }
        };
        assert_eq!(error, DeviceError::Transport(TransportError::Disconnected));
        assert!(!engine.is_open());
    }
}
