//! Message-family discrimination, done once before any branching on content.

use crate::constants::{
    RTCM_CRC_SIZE, RTCM_HEADER_SIZE, RTCM_LENGTH_MASK, RTCM_SYNC_CHAR, UBX_CHECKSUM_LEN,
    UBX_CLASS_OFFSET, UBX_HEADER_LEN, UBX_LENGTH_OFFSET, UBX_MSG_ID_OFFSET, UBX_SYNC_CHAR_1,
    UBX_SYNC_CHAR_2,
};

/// Family of the message starting at the head of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UBX navigation family (0xB5 0x62 preamble).
    Navigation,
    /// RTCM 3 correction family (0xD3 lead byte).
    Correction,
    Unknown(u8),
}

impl FrameKind {
    pub fn from_lead_byte(byte: u8) -> Self {
        match byte {
            UBX_SYNC_CHAR_1 => Self::Navigation,
            RTCM_SYNC_CHAR => Self::Correction,
            other => Self::Unknown(other),
        }
    }

    /// Whether `byte` may start a frame of a known family.
    pub fn is_sync(byte: u8) -> bool {
        !matches!(Self::from_lead_byte(byte), Self::Unknown(_))
    }
}

/// Parsed header of the frame at the head of a byte window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    Navigation {
        class: u8,
        id: u8,
        payload_len: usize,
    },
    Correction {
        payload_len: usize,
    },
}

/// Why a header could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Not enough bytes to hold the header itself.
    Short { needed: usize },
    /// Lead byte (or second preamble byte) is not a known discriminator.
    Unknown(u8),
}

impl FrameHeader {
    /// Reads the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        let Some(&lead) = bytes.first() else {
            return Err(HeaderError::Short { needed: 1 });
        };
        match FrameKind::from_lead_byte(lead) {
            FrameKind::Navigation => {
                if bytes.len() < UBX_HEADER_LEN {
                    return Err(HeaderError::Short {
                        needed: UBX_HEADER_LEN,
                    });
                }
                if bytes[1] != UBX_SYNC_CHAR_2 {
                    return Err(HeaderError::Unknown(lead));
                }
                let payload_len = u16::from_le_bytes([
                    bytes[UBX_LENGTH_OFFSET],
                    bytes[UBX_LENGTH_OFFSET + 1],
                ]);
                Ok(Self::Navigation {
                    class: bytes[UBX_CLASS_OFFSET],
                    id: bytes[UBX_MSG_ID_OFFSET],
                    payload_len: payload_len.into(),
                })
            },
            FrameKind::Correction => {
                if bytes.len() < RTCM_HEADER_SIZE {
                    return Err(HeaderError::Short {
                        needed: RTCM_HEADER_SIZE,
                    });
                }
                // next 2 bytes contain 6 bits reserved + 10 bits length, big endian
                let payload_len = u16::from_be_bytes([bytes[1], bytes[2]]) & RTCM_LENGTH_MASK;
                Ok(Self::Correction {
                    payload_len: payload_len.into(),
                })
            },
            FrameKind::Unknown(byte) => Err(HeaderError::Unknown(byte)),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Navigation { .. } => FrameKind::Navigation,
            Self::Correction { .. } => FrameKind::Correction,
        }
    }

    /// Size of the whole frame on the wire, header and trailer included.
    pub fn total_len(&self) -> usize {
        match *self {
            Self::Navigation { payload_len, .. } => UBX_HEADER_LEN + payload_len + UBX_CHECKSUM_LEN,
            Self::Correction { payload_len } => RTCM_HEADER_SIZE + payload_len + RTCM_CRC_SIZE,
        }
    }
}
