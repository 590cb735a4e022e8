use crate::ubx::{UbxError, UbxPacket, SYNC};
use log::debug;

/// Anything beyond this without a complete frame is garbage.
const MAX_BUFFERED: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Nmea(String),
    Ubx(UbxPacket),
}

/// Splits the receiver's byte stream into sentences and UBX frames, regardless of where the
/// transport's reads happened to break it.
#[derive(Debug, Default)]
pub struct GpsFramer {
    buffer: Vec<u8>,
}

impl GpsFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            debug!("GPS buffer overflowed, dropping {} bytes", excess);
            self.buffer.drain(..excess);
        }
    }

    /// The next complete frame, or None if more data is needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            // Skip to whatever looks like the start of a frame
            let start = self
                .buffer
                .iter()
                .position(|byte| *byte == b'$' || *byte == SYNC[0])?;
            if start > 0 {
                debug!("Discarding {} bytes of partial GPS data", start);
                self.buffer.drain(..start);
            }

            if self.buffer[0] == b'$' {
                let end = self.buffer.windows(2).position(|pair| pair == b"\r\n")?;
                let line: Vec<u8> = self.buffer.drain(..end + 2).collect();

                // A sentence restarting before the end means the earlier one was cut short
                let restart = line[1..].iter().rposition(|byte| *byte == b'$');
                let line = match restart {
                    Some(index) => &line[index + 1..],
                    None => &line[..],
                };

                match std::str::from_utf8(line) {
                    Ok(sentence) => return Some(Frame::Nmea(sentence.to_string())),
                    Err(_) => {
                        debug!("Discarding sentence that isn't valid UTF-8");
                        continue;
                    }
                }
            }

            match UbxPacket::from_bytes(&self.buffer) {
                Ok((packet, length)) => {
                    self.buffer.drain(..length);
                    return Some(Frame::Ubx(packet));
                }
                Err(UbxError::Incomplete) if self.buffer.len() < 2 || self.buffer[1] == SYNC[1] => {
                    return None;
                }
                Err(error) => {
                    debug!("Discarding UBX data: {}", error);
                    self.buffer.drain(..1);
                }
            }
        }
    }
}
