// Only the libusb backend is carried, the MIC2's functions all use generic drivers.
mod libusb;

pub use libusb::device::UsbTransport;
