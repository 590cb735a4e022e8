use crate::nmea::NmeaError;
use chrono::{NaiveDate, NaiveTime};
use log::debug;
use mic2_types::{GpsNavigationStatus, Hemisphere, Satellite};
use std::str::FromStr;

const POSITION_FIELDS: usize = 21;
const TIME_FIELDS: usize = 10;
const SATELLITE_HEADER: usize = 3;
const SATELLITE_FIELDS: usize = 6;

// Optional fields are allowed to be empty, anything unreadable is treated the same way.
fn optional<T: FromStr>(field: &'static str, value: &str) -> Option<T> {
    if value.is_empty() {
        return None;
    }
    let parsed = value.parse().ok();
    if parsed.is_none() {
        debug!("Ignoring invalid {}: {:?}", field, value);
    }
    parsed
}

fn required<T: FromStr>(field: &'static str, value: &str) -> Result<T, NmeaError> {
    value.parse().map_err(|_| NmeaError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H%M%S%.f").ok()
}

// ddmm.mmmmm (or dddmm.mmmmm) with its hemisphere, as signed decimal degrees
fn coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    let raw: f64 = optional("coordinate", value)?;
    let hemisphere: Hemisphere = optional("hemisphere", hemisphere)?;

    let degrees = (raw / 100.0).trunc();
    let decimal = degrees + (raw - degrees * 100.0) / 60.0;
    Some(if hemisphere.is_negative() {
        -decimal
    } else {
        decimal
    })
}

/// `$PUBX,00`: position, velocity and accuracy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pubx00 {
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub nav_stat: Option<GpsNavigationStatus>,
    pub h_acc: Option<f64>,
    pub v_acc: Option<f64>,
    pub sog_kmh: Option<f64>,
    pub cog: Option<f64>,
    pub vvel: Option<f64>,
    pub age_c: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub tdop: Option<f64>,
    pub num_svs: Option<u8>,
}

impl Pubx00 {
    pub(crate) fn from_fields(fields: &[&str]) -> Result<Self, NmeaError> {
        if fields.len() != POSITION_FIELDS {
            return Err(NmeaError::FieldCount {
                sentence: "PUBX,00",
                count: fields.len(),
            });
        }

        Ok(Self {
            time: time(fields[2]),
            latitude: coordinate(fields[3], fields[4]),
            longitude: coordinate(fields[5], fields[6]),
            altitude: optional("altRef", fields[7]),
            nav_stat: optional("navStat", fields[8]),
            h_acc: optional("hAcc", fields[9]),
            v_acc: optional("vAcc", fields[10]),
            sog_kmh: optional("SOG", fields[11]),
            cog: optional("COG", fields[12]),
            vvel: optional("vVel", fields[13]),
            age_c: optional("diffAge", fields[14]),
            hdop: optional("HDOP", fields[15]),
            vdop: optional("VDOP", fields[16]),
            tdop: optional("TDOP", fields[17]),
            num_svs: optional("numSvs", fields[18]),
        })
    }
}

/// `$PUBX,03`: every satellite the receiver knows about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pubx03 {
    pub satellites: Vec<Satellite>,
}

impl Pubx03 {
    pub(crate) fn from_fields(fields: &[&str]) -> Result<Self, NmeaError> {
        let count_error = || NmeaError::FieldCount {
            sentence: "PUBX,03",
            count: fields.len(),
        };

        let count: usize = fields
            .get(2)
            .ok_or_else(count_error)
            .and_then(|count| required("GT", count))?;
        let expected = count
            .checked_mul(SATELLITE_FIELDS)
            .and_then(|length| length.checked_add(SATELLITE_HEADER));
        if expected != Some(fields.len()) {
            return Err(count_error());
        }

        let satellites = fields[SATELLITE_HEADER..]
            .chunks_exact(SATELLITE_FIELDS)
            .map(|satellite| -> Result<Satellite, NmeaError> {
                Ok(Satellite::new(
                    required("prn", satellite[0])?,
                    satellite[1] == "U",
                    optional("azimuth", satellite[2]),
                    optional("elevation", satellite[3]),
                    optional("cno", satellite[4]),
                    required("lck", satellite[5])?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { satellites })
    }
}

/// `$PUBX,04`: UTC time and receiver clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pubx04 {
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub utc_tow: Option<f64>,
    pub utc_week: Option<u16>,
    pub leap_seconds: Option<u8>,
    /// Leap seconds are the firmware default, not yet received from the satellites
    pub leap_seconds_default: bool,
    pub clock_bias: Option<f64>,
    pub clock_drift: Option<f64>,
    pub timepulse_granularity: Option<f64>,
}

impl Pubx04 {
    pub(crate) fn from_fields(fields: &[&str]) -> Result<Self, NmeaError> {
        // Some firmware leaves a trailing empty field
        if fields.len() < TIME_FIELDS {
            return Err(NmeaError::FieldCount {
                sentence: "PUBX,04",
                count: fields.len(),
            });
        }

        let leap = fields[6];
        let leap_seconds_default = leap.ends_with('D');

        Ok(Self {
            time: time(fields[2]),
            date: NaiveDate::parse_from_str(fields[3], "%d%m%y").ok(),
            utc_tow: optional("utcTow", fields[4]),
            utc_week: optional("utcWk", fields[5]),
            leap_seconds: optional("leapSec", leap.trim_end_matches('D')),
            leap_seconds_default,
            clock_bias: optional("clkBias", fields[7]),
            clock_drift: optional("clkDrift", fields[8]),
            timepulse_granularity: optional("tpGran", fields[9]),
        })
    }
}
