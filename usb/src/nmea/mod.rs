//! NMEA 0183 sentence handling, limited to the u-blox proprietary `PUBX` sentences the receiver
//! is configured to emit.
use chrono::Utc;
use log::debug;
use mic2_types::GPSInfo;

mod pubx;

pub use pubx::{Pubx00, Pubx03, Pubx04};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NmeaError {
    #[error("Not a complete sentence: {0:?}")]
    Unframed(String),

    #[error("Checksum mismatch, expected {expected:02X}, received {received:02X}")]
    Checksum { expected: u8, received: u8 },

    #[error("Unsupported sentence: {0}")]
    Unsupported(String),

    #[error("{sentence} has an unexpected field count of {count}")]
    FieldCount { sentence: &'static str, count: usize },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Position(Pubx00),
    Satellites(Pubx03),
    Time(Pubx04),
}

/// XOR of every byte between the `$` and the `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |checksum, byte| checksum ^ byte)
}

/// Decodes a single sentence, with or without its trailing CRLF.
pub fn decode(line: &str) -> Result<Sentence, NmeaError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let unframed = || NmeaError::Unframed(line.to_string());

    let (body, received) = line
        .strip_prefix('$')
        .and_then(|rest| rest.rsplit_once('*'))
        .ok_or_else(unframed)?;
    if received.len() != 2 {
        return Err(unframed());
    }
    let received = u8::from_str_radix(received, 16).map_err(|_| unframed())?;

    let expected = checksum(body);
    if expected != received {
        return Err(NmeaError::Checksum { expected, received });
    }

    let fields: Vec<&str> = body.split(',').collect();
    match (fields[0], fields.get(1).copied()) {
        ("PUBX", Some("00")) => Ok(Sentence::Position(Pubx00::from_fields(&fields)?)),
        ("PUBX", Some("03")) => Ok(Sentence::Satellites(Pubx03::from_fields(&fields)?)),
        ("PUBX", Some("04")) => Ok(Sentence::Time(Pubx04::from_fields(&fields)?)),
        _ => Err(NmeaError::Unsupported(body.to_string())),
    }
}

// Fields the sentence left empty (or that didn't parse) keep their previous value.
fn merge<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Folds a decoded sentence into the current fix.
pub fn apply(sentence: Sentence, info: &mut GPSInfo) {
    match sentence {
        Sentence::Position(position) => {
            if let Some(time) = position.time {
                let date = info
                    .current_time
                    .map(|current| current.date())
                    .unwrap_or_else(|| Utc::now().date_naive());
                info.current_time = Some(date.and_time(time));
            }
            merge(&mut info.latitude, position.latitude);
            merge(&mut info.longitude, position.longitude);
            merge(&mut info.altitude, position.altitude);
            merge(&mut info.nav_stat, position.nav_stat);
            merge(&mut info.h_acc, position.h_acc);
            merge(&mut info.v_acc, position.v_acc);
            merge(&mut info.sog_kmh, position.sog_kmh);
            merge(&mut info.cog, position.cog);
            merge(&mut info.vvel, position.vvel);
            merge(&mut info.age_c, position.age_c);
            merge(&mut info.hdop, position.hdop);
            merge(&mut info.vdop, position.vdop);
            merge(&mut info.tdop, position.tdop);
        }
        Sentence::Satellites(status) => {
            debug!("Receiver reports {} satellites", status.satellites.len());
            info.satellites = status.satellites;
        }
        Sentence::Time(time) => {
            if let (Some(date), Some(time)) = (time.date, time.time) {
                info.current_time = Some(date.and_time(time));
            }
            merge(&mut info.clock_bias, time.clock_bias);
            merge(&mut info.clock_drift, time.clock_drift);
            merge(&mut info.timepulse_granularity, time.timepulse_granularity);
        }
    }
}

#[cfg(test)]
pub(crate) fn frame(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, checksum(body))
}
