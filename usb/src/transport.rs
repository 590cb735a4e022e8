// The transport is the only place the drivers touch the bus. Everything above this (Digital I/O,
// GPS, Audio) speaks to a claimed stream of bytes, and doesn't care whether that's libusb or a
// mock sitting in memory.
use crate::error::TransportError;
use mic2_types::UsbIdentity;
use strum::Display;

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum Interface {
    #[strum(to_string = "Bit-Bang")]
    BitIo,
    #[strum(to_string = "GPS")]
    Gps,
    #[strum(to_string = "Audio")]
    Audio,
}

impl Interface {
    /// The USB interface number serving this function on its device.
    pub fn number(&self) -> u8 {
        match self {
            // FT232R only has the one
            Interface::BitIo => 0,
            // CDC Data on the u-blox receiver
            Interface::Gps => 1,
            // Audio Streaming on the PCM2912A
            Interface::Audio => 1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
    /// Hub ports walked from the root hub to reach this device.
    pub port_path: Vec<u8>,
    pub serial_number: Option<String>,
}

impl UsbDeviceInfo {
    pub fn identity(&self) -> UsbIdentity {
        UsbIdentity {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            bus_address: self.address,
            bus_number: self.bus_number,
        }
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }

    /// True when both devices hang off the same hub port.
    pub fn is_sibling_of(&self, other: &UsbDeviceInfo) -> bool {
        if self.bus_number != other.bus_number
            || self.port_path.is_empty()
            || self.port_path.len() != other.port_path.len()
        {
            return false;
        }
        let hub = self.port_path.len() - 1;
        self.port_path[..hub] == other.port_path[..hub]
    }
}

pub trait Transport: Send + Sync {
    /// A snapshot of every device currently on the bus.
    fn enumerate_all(&self) -> Result<Vec<UsbDeviceInfo>, TransportError>;

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<UsbDeviceInfo>, TransportError> {
        Ok(self
            .enumerate_all()?
            .into_iter()
            .filter(|device| device.matches(vendor_id, product_id))
            .collect())
    }

    fn claim(
        &self,
        device: &UsbDeviceInfo,
        interface: Interface,
    ) -> Result<Box<dyn TransportStream>, TransportError>;
}

pub trait TransportStream: Send {
    /// Reads whatever is available, returning 0 if nothing arrived before the transport's
    /// timeout expired.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
    fn release(&mut self) -> Result<(), TransportError>;
}
