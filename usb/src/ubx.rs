// u-blox binary protocol, used to configure which sentences the receiver emits
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

pub const SYNC: [u8; 2] = [0xb5, 0x62];

/// Sync, class, id and length.
const HEADER_LENGTH: usize = 6;
const CHECKSUM_LENGTH: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UbxClass {
    Nav = 0x01,
    Rxm = 0x02,
    Inf = 0x04,
    Ack = 0x05,
    Cfg = 0x06,
    Mon = 0x0a,
    Aid = 0x0b,
    Tim = 0x0d,
    Esf = 0x10,
}

impl TryFrom<u8> for UbxClass {
    type Error = UbxError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => UbxClass::Nav,
            0x02 => UbxClass::Rxm,
            0x04 => UbxClass::Inf,
            0x05 => UbxClass::Ack,
            0x06 => UbxClass::Cfg,
            0x0a => UbxClass::Mon,
            0x0b => UbxClass::Aid,
            0x0d => UbxClass::Tim,
            0x10 => UbxClass::Esf,
            _ => return Err(UbxError::UnknownClass(value)),
        })
    }
}

const CFG_MSG: u8 = 0x01;
const CFG_RST: u8 = 0x04;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UbxError {
    #[error("Frame is incomplete")]
    Incomplete,

    #[error("Frame does not start with the UBX sync bytes")]
    BadSync,

    #[error("Unknown UBX class {0:#04x}")]
    UnknownClass(u8),

    #[error("Checksum mismatch, expected {expected:02x?}, received {received:02x?}")]
    Checksum { expected: [u8; 2], received: [u8; 2] },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxPacket {
    pub class: UbxClass,
    pub id: u8,
    pub payload: Vec<u8>,
}

impl UbxPacket {
    pub fn new(class: UbxClass, id: u8, payload: Vec<u8>) -> Self {
        Self { class, id, payload }
    }

    /// Sets the output rate of a message on the current port, 0 disables it.
    pub fn cfg_msg(msg_class: u8, msg_id: u8, rate: u8) -> Self {
        Self::new(UbxClass::Cfg, CFG_MSG, vec![msg_class, msg_id, rate])
    }

    /// Hot start with a controlled software reset (GPS only).
    pub fn cfg_rst_controlled() -> Self {
        // navBbrMask (u16), resetMode, reserved
        Self::new(UbxClass::Cfg, CFG_RST, vec![0x00, 0x00, 0x01, 0x00])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LENGTH + self.payload.len() + CHECKSUM_LENGTH);
        bytes.extend_from_slice(&SYNC);
        bytes.push(self.class as u8);
        bytes.push(self.id);

        let mut length = [0; 2];
        LittleEndian::write_u16(&mut length, self.payload.len() as u16);
        bytes.extend_from_slice(&length);
        bytes.extend_from_slice(&self.payload);

        let checksum = checksum(&bytes[SYNC.len()..]);
        bytes.extend_from_slice(&checksum);
        bytes
    }

    /// Parses a frame from the start of `data`, returning it with the number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), UbxError> {
        if data.len() < HEADER_LENGTH {
            return Err(UbxError::Incomplete);
        }
        if data[..2] != SYNC {
            return Err(UbxError::BadSync);
        }

        let length = LittleEndian::read_u16(&data[4..6]) as usize;
        let total = HEADER_LENGTH + length + CHECKSUM_LENGTH;
        if data.len() < total {
            return Err(UbxError::Incomplete);
        }

        let expected = checksum(&data[SYNC.len()..HEADER_LENGTH + length]);
        let received = [data[total - 2], data[total - 1]];
        if expected != received {
            return Err(UbxError::Checksum { expected, received });
        }

        let class = UbxClass::try_from(data[2])?;
        let packet = Self::new(class, data[3], data[HEADER_LENGTH..HEADER_LENGTH + length].to_vec());
        debug!("Parsed UBX frame: {:?}", packet);
        Ok((packet, total))
    }

    /// For a frame of class `Ack`, the class and id being acknowledged.
    pub fn acknowledged(&self) -> Option<(bool, u8, u8)> {
        if self.class != UbxClass::Ack || self.payload.len() < 2 {
            return None;
        }
        Some((self.id == 0x01, self.payload[0], self.payload[1]))
    }
}

/// 8-bit Fletcher checksum over class, id, length and payload.
pub fn checksum(data: &[u8]) -> [u8; 2] {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for byte in data {
        ck_a = ck_a.wrapping_add(*byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    [ck_a, ck_b]
}
