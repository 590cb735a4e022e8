use crate::bitio::BitIoFrame;
use crate::error::TransportError;
use crate::transport::{Interface, Transport, TransportStream, UsbDeviceInfo};
use log::{debug, info, warn};
use rusb::{
    Device, DeviceHandle, Direction, GlobalContext, Recipient, RequestType, TransferType,
};
use std::collections::VecDeque;
use std::time::Duration;

// FTDI SIO requests, index 1 addresses port A on the FT232R
const SIO_SET_BITMODE_REQUEST: u8 = 0x0b;
const SIO_READ_PINS_REQUEST: u8 = 0x0c;
const SIO_PORT_A: u16 = 1;

// USB Audio Class, SET_CUR on an endpoint's SAMPLING_FREQ_CONTROL
const UAC_SET_CUR: u8 = 0x01;
const UAC_SAMPLING_FREQ_CONTROL: u16 = 0x0100;

fn map_error(error: rusb::Error) -> TransportError {
    match error {
        rusb::Error::NoDevice => TransportError::Disconnected,
        error => TransportError::Usb(error),
    }
}

/// The libusb backed transport, talking to devices through the global context.
pub struct UsbTransport {
    timeout: Duration,
}

impl UsbTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn find_device(&self, device: &UsbDeviceInfo) -> Result<Device<GlobalContext>, TransportError> {
        for usb_device in rusb::devices().map_err(map_error)?.iter() {
            if usb_device.bus_number() == device.bus_number
                && usb_device.address() == device.address
            {
                return Ok(usb_device);
            }
        }
        Err(TransportError::Disconnected)
    }

    fn read_serial(&self, device: &Device<GlobalContext>) -> Option<String> {
        let descriptor = device.device_descriptor().ok()?;
        descriptor.serial_number_string_index()?;

        match device.open() {
            Ok(handle) => handle.read_serial_number_string_ascii(&descriptor).ok(),
            Err(error) => {
                debug!("Unable to open {:?} to read serial: {}", device, error);
                None
            }
        }
    }
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Transport for UsbTransport {
    fn enumerate_all(&self) -> Result<Vec<UsbDeviceInfo>, TransportError> {
        let mut found_devices = Vec::new();

        for device in rusb::devices().map_err(map_error)?.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                found_devices.push(UsbDeviceInfo {
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                    bus_number: device.bus_number(),
                    address: device.address(),
                    port_path: device.port_numbers().unwrap_or_default(),
                    serial_number: None,
                });
            }
        }
        Ok(found_devices)
    }

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<UsbDeviceInfo>, TransportError> {
        let mut found_devices = Vec::new();

        for device in rusb::devices().map_err(map_error)?.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                    continue;
                }

                // Only the devices we're after are opened for their serial
                found_devices.push(UsbDeviceInfo {
                    vendor_id,
                    product_id,
                    bus_number: device.bus_number(),
                    address: device.address(),
                    port_path: device.port_numbers().unwrap_or_default(),
                    serial_number: self.read_serial(&device),
                });
            }
        }
        Ok(found_devices)
    }

    fn claim(
        &self,
        device: &UsbDeviceInfo,
        interface: Interface,
    ) -> Result<Box<dyn TransportStream>, TransportError> {
        let usb_device = self.find_device(device)?;
        let mut handle = usb_device.open().map_err(map_error)?;
        let number = interface.number();

        // Not supported everywhere (MacOS), where it isn't there's no kernel driver to detach.
        if let Err(error) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Unable to auto-detach kernel driver: {}", error);
        }
        handle.claim_interface(number).map_err(map_error)?;
        info!("Claimed {} interface {} on {:?}", interface, number, usb_device);

        if interface == Interface::BitIo {
            return Ok(Box::new(BitBangStream {
                handle,
                number,
                timeout: self.timeout,
                pending: VecDeque::new(),
            }));
        }

        let endpoints = match find_endpoints(&usb_device, number) {
            Ok(Some(endpoints)) => endpoints,
            result => {
                let _ = handle.release_interface(number);
                return match result {
                    Err(error) => Err(map_error(error)),
                    _ => Err(TransportError::UnsupportedEndpoint(interface)),
                };
            }
        };

        if endpoints.setting != 0 {
            if let Err(error) = handle.set_alternate_setting(number, endpoints.setting) {
                let _ = handle.release_interface(number);
                return Err(map_error(error));
            }
        }

        Ok(Box::new(EndpointStream {
            handle,
            interface,
            number,
            endpoints,
            timeout: self.timeout,
        }))
    }
}

#[derive(Debug)]
struct Endpoints {
    setting: u8,
    transfer_type: TransferType,
    read: u8,
    write: Option<u8>,
}

// Picks the first alternate setting with a bulk or interrupt IN endpoint. Isochronous only
// interfaces aren't usable through synchronous transfers.
fn find_endpoints(
    device: &Device<GlobalContext>,
    number: u8,
) -> Result<Option<Endpoints>, rusb::Error> {
    let config = device.active_config_descriptor()?;
    for interface in config.interfaces() {
        if interface.number() != number {
            continue;
        }

        for descriptor in interface.descriptors() {
            let mut read = None;
            let mut write = None;
            for endpoint in descriptor.endpoint_descriptors() {
                let transfer_type = endpoint.transfer_type();
                if !matches!(transfer_type, TransferType::Bulk | TransferType::Interrupt) {
                    continue;
                }

                match endpoint.direction() {
                    Direction::In if read.is_none() => read = Some((endpoint.address(), transfer_type)),
                    Direction::Out if write.is_none() => write = Some(endpoint.address()),
                    _ => {}
                }
            }

            if let Some((read, transfer_type)) = read {
                return Ok(Some(Endpoints {
                    setting: descriptor.setting_number(),
                    transfer_type,
                    read,
                    write,
                }));
            }
        }
    }
    Ok(None)
}

struct BitBangStream {
    handle: DeviceHandle<GlobalContext>,
    number: u8,
    timeout: Duration,
    pending: VecDeque<u8>,
}

impl TransportStream for BitBangStream {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let mut count = 0;
        while count < buffer.len() {
            match self.pending.pop_front() {
                Some(byte) => buffer[count] = byte,
                None => break,
            }
            count += 1;
        }
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match BitIoFrame::decode(data)? {
            BitIoFrame::SetBitmode { mask, mode } => {
                self.handle
                    .write_control(
                        rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device),
                        SIO_SET_BITMODE_REQUEST,
                        u16::from(mask) | (u16::from(mode) << 8),
                        SIO_PORT_A,
                        &[],
                        self.timeout,
                    )
                    .map_err(map_error)?;
            }
            BitIoFrame::ReadPins => {
                let mut buf = [0_u8; 1];
                let length = self
                    .handle
                    .read_control(
                        rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device),
                        SIO_READ_PINS_REQUEST,
                        0,
                        SIO_PORT_A,
                        &mut buf,
                        self.timeout,
                    )
                    .map_err(map_error)?;
                self.pending.extend(&buf[..length]);
            }
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        self.handle.release_interface(self.number).map_err(map_error)
    }
}

struct EndpointStream {
    handle: DeviceHandle<GlobalContext>,
    interface: Interface,
    number: u8,
    endpoints: Endpoints,
    timeout: Duration,
}

impl TransportStream for EndpointStream {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let result = match self.endpoints.transfer_type {
            TransferType::Interrupt => {
                self.handle
                    .read_interrupt(self.endpoints.read, buffer, self.timeout)
            }
            _ => self.handle.read_bulk(self.endpoints.read, buffer, self.timeout),
        };

        match result {
            Ok(length) => Ok(length),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(error) => Err(map_error(error)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        // The audio function only ever receives its sampling frequency
        if self.interface == Interface::Audio {
            self.handle
                .write_control(
                    rusb::request_type(Direction::Out, RequestType::Class, Recipient::Endpoint),
                    UAC_SET_CUR,
                    UAC_SAMPLING_FREQ_CONTROL,
                    u16::from(self.endpoints.read),
                    data,
                    self.timeout,
                )
                .map_err(map_error)?;
            return Ok(());
        }

        let Some(endpoint) = self.endpoints.write else {
            return Err(TransportError::UnsupportedEndpoint(self.interface));
        };

        let mut written = 0;
        while written < data.len() {
            let length = match self.endpoints.transfer_type {
                TransferType::Interrupt => {
                    self.handle
                        .write_interrupt(endpoint, &data[written..], self.timeout)
                }
                _ => self.handle.write_bulk(endpoint, &data[written..], self.timeout),
            }
            .map_err(map_error)?;

            if length == 0 {
                warn!("{} endpoint accepted no data, giving up", self.interface);
                return Err(TransportError::Usb(rusb::Error::Io));
            }
            written += length;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        self.handle.release_interface(self.number).map_err(map_error)
    }
}
