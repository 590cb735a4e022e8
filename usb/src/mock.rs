//! An in-memory stand-in for the bus, simulating the MIC2's three USB functions.
//!
//! Every simulated unit shares the one pin register, GPS byte stream and audio source.
use crate::bitio::{BitIoFrame, Pin, MODE_RESET};
use crate::error::TransportError;
use crate::transport::{Interface, Transport, TransportStream, UsbDeviceInfo};
use crate::{
    PID_FTDI_FT232R, PID_PCM2912A, PID_UBLOX, VID_FTDI, VID_TI_AUDIO, VID_UBLOX,
};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

const VID_MICROCHIP: u16 = 0x0424;
const PID_USB2514_HUB: u16 = 0x2514;
const BUS: u8 = 1;

#[derive(Default)]
struct MockState {
    mask: u8,
    button: bool,
    bitio_frames: Vec<BitIoFrame>,
    pins: VecDeque<u8>,
    gps_rx: VecDeque<u8>,
    gps_written: Vec<u8>,
    audio_rate: Option<u32>,
    audio_phase: u32,
    claims: HashMap<Interface, usize>,
    releases: HashMap<Interface, usize>,
    failures: HashMap<Interface, TransportError>,
}

impl MockState {
    // Only pins switched to outputs drive their value, CBUS1 is wired to the button.
    fn pin_levels(&self) -> u8 {
        let outputs = self.mask & 0x0f & (self.mask >> 4);
        if self.button {
            outputs | Pin::Button.value_bit()
        } else {
            outputs
        }
    }

    fn claimed(&self, interface: Interface) -> bool {
        self.claims.get(&interface).copied().unwrap_or(0)
            > self.releases.get(&interface).copied().unwrap_or(0)
    }
}

#[derive(Default)]
pub struct MockTransport {
    devices: Vec<UsbDeviceInfo>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus holding a single MIC2.
    pub fn mic2(serial: &str, has_gps: bool) -> Self {
        Self::new().with_mic2(serial, has_gps)
    }

    /// Adds a MIC2 behind its own hub.
    pub fn with_mic2(mut self, serial: &str, has_gps: bool) -> Self {
        let port = self
            .devices
            .iter()
            .filter(|device| device.matches(VID_MICROCHIP, PID_USB2514_HUB))
            .count() as u8
            + 1;
        let address = self.devices.len() as u8 + 2;
        let device = |vendor_id, product_id, offset: u8, path: &[u8]| UsbDeviceInfo {
            vendor_id,
            product_id,
            bus_number: BUS,
            address: address + offset,
            port_path: path.to_vec(),
            serial_number: None,
        };

        self.devices
            .push(device(VID_MICROCHIP, PID_USB2514_HUB, 0, &[port]));
        self.devices.push(UsbDeviceInfo {
            serial_number: Some(serial.to_string()),
            ..device(VID_FTDI, PID_FTDI_FT232R, 1, &[port, 1])
        });
        if has_gps {
            self.devices
                .push(device(VID_UBLOX, PID_UBLOX[1], 2, &[port, 2]));
        }
        self.devices
            .push(device(VID_TI_AUDIO, PID_PCM2912A, 3, &[port, 3]));
        self
    }

    /// Adds an unrelated device to the bus.
    pub fn with_device(mut self, device: UsbDeviceInfo) -> Self {
        self.devices.push(device);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn first(&self, vendor_id: u16, product_ids: &[u16]) -> Option<UsbDeviceInfo> {
        self.devices
            .iter()
            .find(|device| {
                device.vendor_id == vendor_id && product_ids.contains(&device.product_id)
            })
            .cloned()
    }

    pub fn bitio_device(&self) -> UsbDeviceInfo {
        self.first(VID_FTDI, &[PID_FTDI_FT232R]).unwrap_or_default()
    }

    pub fn gps_device(&self) -> Option<UsbDeviceInfo> {
        self.first(VID_UBLOX, &PID_UBLOX)
    }

    pub fn audio_device(&self) -> UsbDeviceInfo {
        self.first(VID_TI_AUDIO, &[PID_PCM2912A]).unwrap_or_default()
    }

    pub fn set_button(&self, pressed: bool) {
        self.lock().button = pressed;
    }

    pub fn bitio_frames(&self) -> Vec<BitIoFrame> {
        self.lock().bitio_frames.clone()
    }

    /// The mask the simulated register currently holds.
    pub fn register(&self) -> u8 {
        self.lock().mask
    }

    /// Queues bytes for the GPS receiver to send.
    pub fn push_gps(&self, data: &[u8]) {
        self.lock().gps_rx.extend(data);
    }

    pub fn gps_written(&self) -> Vec<u8> {
        self.lock().gps_written.clone()
    }

    /// The sampling frequency last set on the codec.
    pub fn audio_rate(&self) -> Option<u32> {
        self.lock().audio_rate
    }

    /// Every read on `interface` fails with `error` from now on.
    pub fn fail_reads(&self, interface: Interface, error: TransportError) {
        self.lock().failures.insert(interface, error);
    }

    pub fn claims(&self, interface: Interface) -> usize {
        self.lock().claims.get(&interface).copied().unwrap_or(0)
    }

    pub fn releases(&self, interface: Interface) -> usize {
        self.lock().releases.get(&interface).copied().unwrap_or(0)
    }
}

impl Transport for MockTransport {
    fn enumerate_all(&self) -> Result<Vec<UsbDeviceInfo>, TransportError> {
        Ok(self.devices.clone())
    }

    fn claim(
        &self,
        device: &UsbDeviceInfo,
        interface: Interface,
    ) -> Result<Box<dyn TransportStream>, TransportError> {
        let present = self
            .devices
            .iter()
            .find(|known| known.bus_number == device.bus_number && known.address == device.address)
            .ok_or(TransportError::Disconnected)?;

        let serves = match interface {
            Interface::BitIo => present.matches(VID_FTDI, PID_FTDI_FT232R),
            Interface::Gps => {
                present.vendor_id == VID_UBLOX && PID_UBLOX.contains(&present.product_id)
            }
            Interface::Audio => present.matches(VID_TI_AUDIO, PID_PCM2912A),
        };
        if !serves {
            return Err(TransportError::InterfaceNotFound(interface));
        }

        let mut state = self.lock();
        if state.claimed(interface) {
            return Err(TransportError::Usb(rusb::Error::Busy));
        }
        *state.claims.entry(interface).or_default() += 1;

        Ok(Box::new(MockStream {
            interface,
            state: self.state.clone(),
            released: false,
        }))
    }
}

struct MockStream {
    interface: Interface,
    state: Arc<Mutex<MockState>>,
    released: bool,
}

impl MockStream {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // One millisecond of a triangle wave per read, paced like the real codec.
    fn read_audio(&self, buffer: &mut [u8]) -> usize {
        let samples = {
            let mut state = self.lock();
            let rate = state.audio_rate.unwrap_or(0) as usize;
            let samples = (rate / 1000).min(buffer.len() / 2);
            for sample in 0..samples {
                let phase = (state.audio_phase % 200) as i16;
                let value = if phase < 100 { phase } else { 200 - phase };
                LittleEndian::write_i16(&mut buffer[sample * 2..], (value - 50) * 400);
                state.audio_phase = state.audio_phase.wrapping_add(1);
            }
            samples
        };

        thread::sleep(Duration::from_millis(1));
        samples * 2
    }
}

impl TransportStream for MockStream {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        if self.released {
            return Err(TransportError::Disconnected);
        }
        if let Some(error) = self.lock().failures.get(&self.interface) {
            return Err(error.clone());
        }

        Ok(match self.interface {
            Interface::BitIo => {
                let mut state = self.lock();
                let length = buffer.len().min(state.pins.len());
                for (slot, byte) in buffer.iter_mut().zip(state.pins.drain(..length)) {
                    *slot = byte;
                }
                length
            }
            Interface::Gps => {
                let mut state = self.lock();
                let length = buffer.len().min(state.gps_rx.len());
                for (slot, byte) in buffer.iter_mut().zip(state.gps_rx.drain(..length)) {
                    *slot = byte;
                }
                length
            }
            Interface::Audio => self.read_audio(buffer),
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.released {
            return Err(TransportError::Disconnected);
        }

        let mut state = self.lock();
        match self.interface {
            Interface::BitIo => {
                let frame = BitIoFrame::decode(data)?;
                match frame {
                    BitIoFrame::SetBitmode { mode, .. } if mode == MODE_RESET => state.mask = 0,
                    BitIoFrame::SetBitmode { mask, .. } => state.mask = mask,
                    BitIoFrame::ReadPins => {
                        let levels = state.pin_levels();
                        state.pins.push_back(levels);
                    }
                }
                state.bitio_frames.push(frame);
            }
            Interface::Gps => state.gps_written.extend_from_slice(data),
            Interface::Audio => {
                if data.len() != 3 {
                    return Err(TransportError::MalformedFrame(format!(
                        "Sampling frequency must be 3 bytes, received {}",
                        data.len()
                    )));
                }
                state.audio_rate = Some(LittleEndian::read_u24(data));
            }
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        *self.lock().releases.entry(self.interface).or_default() += 1;
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
