use crate::FieldUnavailable;
use chrono::NaiveDateTime;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use strum::{Display, EnumIter, EnumString};

/// Decimal places kept on the seconds component of a [GPSDMS].
///
/// The receiver reports positions as `ddmm.mmmmm`, so a resolution of 1e-5 minutes, which is
/// 6e-4 seconds. Four places keeps everything the receiver gave us.
pub const SECONDS_PRECISION: u32 = 4;

/// A coordinate component split into Degrees, Minutes and Seconds.
///
/// This carries no sign, the direction lives in the accompanying [Hemisphere].
#[derive(Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GPSDMS {
    pub degrees: u16,
    pub minutes: u8,
    pub seconds: f64,
}

fn round_to(value: f64, places: u32) -> f64 {
    let multiplier = 10_f64.powi(places as i32);
    (value * multiplier).round() / multiplier
}

impl GPSDMS {
    pub fn new(degrees: u16, minutes: u8, seconds: f64) -> Self {
        Self {
            degrees,
            minutes,
            seconds,
        }
    }

    /// Converts decimal degrees, rounding seconds to [SECONDS_PRECISION] places.
    pub fn from_decimal(decimal_degrees: f64) -> Self {
        Self::from_decimal_with_precision(decimal_degrees, SECONDS_PRECISION)
    }

    pub fn from_decimal_with_precision(decimal_degrees: f64, places: u32) -> Self {
        let value = decimal_degrees.abs();
        let mut degrees = value.trunc();
        let total_minutes = (value - degrees) * 60.0;
        let mut minutes = total_minutes.trunc();
        let mut seconds = round_to((total_minutes - minutes) * 60.0, places);

        // Rounding can push us onto the next minute (or degree)
        if seconds >= 60.0 {
            seconds -= 60.0;
            minutes += 1.0;
        }
        if minutes >= 60.0 {
            minutes -= 60.0;
            degrees += 1.0;
        }

        Self {
            degrees: degrees as u16,
            minutes: minutes as u8,
            seconds,
        }
    }

    /// Unsigned decimal degrees.
    pub fn to_decimal(&self) -> f64 {
        f64::from(self.degrees) + f64::from(self.minutes) / 60.0 + self.seconds / 3600.0
    }
}

impl std::fmt::Display for GPSDMS {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}° {}' {}\"", self.degrees, self.minutes, self.seconds)
    }
}

impl std::fmt::Debug for GPSDMS {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}° {}' {}\"", self.degrees, self.minutes, self.seconds)
    }
}

#[derive(Copy, Clone, Debug, Display, EnumString, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Hemisphere {
    #[strum(serialize = "N")]
    North,
    #[strum(serialize = "S")]
    South,
    #[strum(serialize = "E")]
    East,
    #[strum(serialize = "W")]
    West,
}

impl Hemisphere {
    pub fn of_latitude(latitude: f64) -> Self {
        if latitude.is_sign_negative() {
            Hemisphere::South
        } else {
            Hemisphere::North
        }
    }

    pub fn of_longitude(longitude: f64) -> Self {
        if longitude.is_sign_negative() {
            Hemisphere::West
        } else {
            Hemisphere::East
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }
}

/// Navigation status as reported by the receiver's position sentence.
#[derive(Copy, Clone, Debug, Display, EnumString, EnumIter, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GpsNavigationStatus {
    #[strum(serialize = "NF")]
    NoFix,
    #[strum(serialize = "DR")]
    DeadReckoningOnly,
    #[strum(serialize = "G2")]
    StandAlone2D,
    #[strum(serialize = "G3")]
    StandAlone3D,
    #[strum(serialize = "D2")]
    Differential2D,
    #[strum(serialize = "D3")]
    Differential3D,
    #[strum(serialize = "RK")]
    CombinedGpsDeadReckoning,
    #[strum(serialize = "TT")]
    TimeOnly,
}

impl GpsNavigationStatus {
    pub fn has_fix(&self) -> bool {
        *self != GpsNavigationStatus::NoFix
    }
}

/// A single satellite from the receiver's status report.
///
/// Azimuth, elevation and SNR are only present while the receiver is tracking the satellite,
/// reading one that wasn't reported is an error rather than a zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Satellite {
    prn: u16,
    used: bool,
    azimuth: Option<u16>,
    elevation: Option<u16>,
    snr: Option<u8>,
    lock_time: u8,
}

pub type GPSSatInfo = Satellite;

impl Satellite {
    pub fn new(
        prn: u16,
        used: bool,
        azimuth: Option<u16>,
        elevation: Option<u16>,
        snr: Option<u8>,
        lock_time: u8,
    ) -> Self {
        Self {
            prn,
            used,
            azimuth,
            elevation,
            snr,
            lock_time,
        }
    }

    pub fn prn(&self) -> u16 {
        self.prn
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Carrier lock time in seconds, saturating at 64.
    pub fn lock_time(&self) -> u8 {
        self.lock_time
    }

    pub fn azimuth(&self) -> Result<u16, FieldUnavailable> {
        self.azimuth.ok_or(FieldUnavailable { field: "azimuth" })
    }

    pub fn elevation(&self) -> Result<u16, FieldUnavailable> {
        self.elevation
            .ok_or(FieldUnavailable { field: "elevation" })
    }

    pub fn snr(&self) -> Result<u8, FieldUnavailable> {
        self.snr.ok_or(FieldUnavailable { field: "snr" })
    }
}

impl std::fmt::Display for Satellite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "prn: {}, used: {}, azimuth: {:?}, elevation: {:?}, snr: {:?}, lock_time: {}",
            self.prn, self.used, self.azimuth, self.elevation, self.snr, self.lock_time
        )
    }
}

/// The receiver's current best estimate of position, velocity and time.
///
/// Every field is optional, a field only becomes `Some` once the receiver has reported it, and
/// keeps its last good value if a later report for it was unreadable.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GPSInfo {
    /// UTC
    pub current_time: Option<NaiveDateTime>,
    /// Signed decimal degrees, negative is South
    pub latitude: Option<f64>,
    /// Signed decimal degrees, negative is West
    pub longitude: Option<f64>,
    /// Altitude above the user datum ellipsoid (m)
    pub altitude: Option<f64>,
    pub nav_stat: Option<GpsNavigationStatus>,
    /// Horizontal accuracy estimate (m)
    pub h_acc: Option<f64>,
    /// Vertical accuracy estimate (m)
    pub v_acc: Option<f64>,
    /// Speed over ground (km/h)
    pub sog_kmh: Option<f64>,
    /// Course over ground (degrees)
    pub cog: Option<f64>,
    /// Vertical velocity, positive is downward (m/s)
    pub vvel: Option<f64>,
    /// Age of the most recent DGPS corrections (s)
    pub age_c: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub tdop: Option<f64>,
    /// In receiver report order
    pub satellites: Vec<Satellite>,
    /// Receiver clock bias (ns)
    pub clock_bias: Option<f64>,
    /// Receiver clock drift (ns/s)
    pub clock_drift: Option<f64>,
    /// Quantization error of the timepulse pin (ns)
    pub timepulse_granularity: Option<f64>,
}

impl GPSInfo {
    pub fn satellites(&self) -> &[Satellite] {
        &self.satellites
    }

    pub fn satellites_used(&self) -> usize {
        self.satellites.iter().filter(|s| s.is_used()).count()
    }

    pub fn has_fix(&self) -> bool {
        self.nav_stat.is_some_and(|status| status.has_fix())
    }

    pub fn latitude_dms(&self) -> Option<(GPSDMS, Hemisphere)> {
        self.latitude
            .map(|value| (GPSDMS::from_decimal(value), Hemisphere::of_latitude(value)))
    }

    pub fn longitude_dms(&self) -> Option<(GPSDMS, Hemisphere)> {
        self.longitude
            .map(|value| (GPSDMS::from_decimal(value), Hemisphere::of_longitude(value)))
    }
}
