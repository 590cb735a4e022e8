#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;

mod gps;

pub use gps::{
    GPSDMS, GPSInfo, GPSSatInfo, GpsNavigationStatus, Hemisphere, Satellite, SECONDS_PRECISION,
};

/// Raised when an optional satellite signal field was not part of the receiver's report.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{field} is not available")]
pub struct FieldUnavailable {
    pub field: &'static str,
}

// Where a device lives on the bus, and what it claims to be.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UsbIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_address: u8,
    pub bus_number: u8,
}

impl std::fmt::Display for UsbIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (Bus {:03} Address {:03})",
            self.vendor_id, self.product_id, self.bus_number, self.bus_address
        )
    }
}

impl std::fmt::Debug for UsbIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VID: {:#06x} PID: {:#06x} Bus: {:#x} Addr: {:#x}",
            self.vendor_id, self.product_id, self.bus_number, self.bus_address
        )
    }
}
