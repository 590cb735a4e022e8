use crate::error::{DeviceError, Subsystem, TransportError};
use crate::transport::{Interface, Transport, TransportStream, UsbDeviceInfo};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// CBUS bit-bang, pins driven from the high nibble enable mask
pub const MODE_CBUS: u8 = 0x20;
/// Hands the CBUS pins back to their EEPROM configured function
pub const MODE_RESET: u8 = 0x00;

const COMMAND_SET_BITMODE: u8 = 0x0b;
const COMMAND_READ_PINS: u8 = 0x0c;

/// A single request on the bit-bang stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BitIoFrame {
    SetBitmode { mask: u8, mode: u8 },
    /// Followed by a one byte read of the current pin levels.
    ReadPins,
}

impl BitIoFrame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            BitIoFrame::SetBitmode { mask, mode } => vec![COMMAND_SET_BITMODE, *mask, *mode],
            BitIoFrame::ReadPins => vec![COMMAND_READ_PINS],
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        match data {
            [COMMAND_SET_BITMODE, mask, mode] => Ok(BitIoFrame::SetBitmode {
                mask: *mask,
                mode: *mode,
            }),
            [COMMAND_READ_PINS] => Ok(BitIoFrame::ReadPins),
            _ => Err(TransportError::MalformedFrame(format!(
                "Unknown bit-bang frame {:02x?}",
                data
            ))),
        }
    }
}

/// The CBUS pins wired up on the MIC2. The low nibble of the mask carries pin values, the high
/// nibble switches the matching pin to an output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pin {
    Buzzer,
    Button,
    GpsLed,
}

impl Pin {
    pub fn value_bit(&self) -> u8 {
        match self {
            Pin::Buzzer => 0x01,
            Pin::Button => 0x02,
            Pin::GpsLed => 0x04,
        }
    }

    pub fn enable_bit(&self) -> u8 {
        self.value_bit() << 4
    }
}

struct BitIoState {
    stream: Option<Box<dyn TransportStream>>,
    mask: u8,
}

pub struct BitIoController {
    transport: Arc<dyn Transport>,
    device: UsbDeviceInfo,
    state: Mutex<BitIoState>,
}

impl BitIoController {
    pub fn new(transport: Arc<dyn Transport>, device: UsbDeviceInfo) -> Self {
        Self {
            transport,
            device,
            state: Mutex::new(BitIoState {
                stream: None,
                mask: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BitIoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if state.stream.is_some() {
            return Err(DeviceError::DeviceBusy(Subsystem::BitIo));
        }

        let stream = self.transport.claim(&self.device, Interface::BitIo)?;
        info!("Opened Bit-Bang interface on {}", self.device.identity());

        state.stream = Some(stream);
        state.mask = 0;
        Ok(())
    }

    pub fn close(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let Some(mut stream) = state.stream.take() else {
            return Ok(());
        };
        state.mask = 0;

        let reset = BitIoFrame::SetBitmode {
            mask: 0,
            mode: MODE_RESET,
        };
        let written = stream.write(&reset.encode());
        let released = stream.release();
        info!("Closed Bit-Bang interface on {}", self.device.identity());

        written?;
        released?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().stream.is_some()
    }

    /// The last mask written to the device.
    pub fn current_mask(&self) -> Result<u8, DeviceError> {
        let state = self.lock();
        if state.stream.is_none() {
            return Err(DeviceError::NotOpen(Subsystem::BitIo));
        }
        Ok(state.mask)
    }

    pub fn set_bitmode_raw(&self, mask: u8) -> Result<(), DeviceError> {
        let mut state = self.lock();
        Self::write_mask(&mut state, mask)
    }

    pub fn read_pins_raw(&self) -> Result<u8, DeviceError> {
        let mut state = self.lock();
        Self::read_pins(&mut state)
    }

    pub fn buzzer_enable(&self, enabled: bool) -> Result<(), DeviceError> {
        self.set_pin(Pin::Buzzer, enabled)
    }

    pub fn buzzer_is_enabled(&self) -> Result<bool, DeviceError> {
        self.pin_is_set(Pin::Buzzer)
    }

    pub fn gps_led_enable(&self, enabled: bool) -> Result<(), DeviceError> {
        self.set_pin(Pin::GpsLed, enabled)
    }

    pub fn gps_led_is_enabled(&self) -> Result<bool, DeviceError> {
        self.pin_is_set(Pin::GpsLed)
    }

    pub fn button_is_pressed(&self) -> Result<bool, DeviceError> {
        self.pin_is_set(Pin::Button)
    }

    // The register is shared between every pin, the read-modify-write has to stay under one lock.
    fn set_pin(&self, pin: Pin, enabled: bool) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let value = if enabled { pin.value_bit() } else { 0 };
        let mask = (state.mask & !(pin.enable_bit() | pin.value_bit())) | pin.enable_bit() | value;
        Self::write_mask(&mut state, mask)
    }

    fn pin_is_set(&self, pin: Pin) -> Result<bool, DeviceError> {
        let mut state = self.lock();
        Ok(Self::read_pins(&mut state)? & pin.value_bit() != 0)
    }

    fn write_mask(state: &mut BitIoState, mask: u8) -> Result<(), DeviceError> {
        let stream = state
            .stream
            .as_mut()
            .ok_or(DeviceError::NotOpen(Subsystem::BitIo))?;

        debug!("Setting CBUS Bitmode: {:#04x}", mask);
        let frame = BitIoFrame::SetBitmode {
            mask,
            mode: MODE_CBUS,
        };
        stream.write(&frame.encode())?;
        state.mask = mask;
        Ok(())
    }

    fn read_pins(state: &mut BitIoState) -> Result<u8, DeviceError> {
        let stream = state
            .stream
            .as_mut()
            .ok_or(DeviceError::NotOpen(Subsystem::BitIo))?;

        stream.write(&BitIoFrame::ReadPins.encode())?;
        let mut pins = [0_u8; 1];
        let received = stream.read(&mut pins)?;
        if received != 1 {
            return Err(TransportError::ShortRead {
                expected: 1,
                received,
            }
            .into());
        }
        debug!("Read CBUS Pins: {:#04x}", pins[0]);
        Ok(pins[0])
    }
}

impl Drop for BitIoController {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!("Unable to cleanly close Bit-Bang interface: {}", error);
        }
    }
}
