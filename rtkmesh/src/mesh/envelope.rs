use crate::{
    constants::{FW_DIGEST_LEN, MESH_HEADER_LEN, MESH_MAX_PAYLOAD_LEN, OTA_HEADER_LEN},
    error::EnvelopeError,
    ota::OtaPacket,
};

/// Packet type carried in the first two bytes of every mesh envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum PacketType {
    /// Periodic node heartbeat, see [NetworkData]
    NetworkData = 0,
    /// RTCM corrections relayed from the base station
    RtkData = 1,
    RobotData = 2,
    PtpData = 3,
    MasterClockData = 4,
    Echo = 5,
    FirmwareQuery = 6,
    FirmwareReport = 7,
    Ota = 8,
}

impl PacketType {
    /// Smallest payload accepted for this type.
    pub const fn min_payload_len(self) -> usize {
        match self {
            Self::Echo => 4,
            Self::FirmwareReport => FW_DIGEST_LEN,
            Self::Ota => OTA_HEADER_LEN,
            Self::NetworkData => NetworkData::LEN,
            // Header and CRC of an empty RTCM frame
            Self::RtkData => 6,
            Self::RobotData | Self::PtpData | Self::MasterClockData | Self::FirmwareQuery => 0,
        }
    }
}

impl TryFrom<u16> for PacketType {
    type Error = EnvelopeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::NetworkData,
            1 => Self::RtkData,
            2 => Self::RobotData,
            3 => Self::PtpData,
            4 => Self::MasterClockData,
            5 => Self::Echo,
            6 => Self::FirmwareQuery,
            7 => Self::FirmwareReport,
            8 => Self::Ota,
            other => return Err(EnvelopeError::UnknownType(other)),
        })
    }
}

/// A parsed mesh packet: `type:u16-LE, length:u16-LE, payload[length]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshEnvelope<'a> {
    pub packet_type: PacketType,
    pub payload: &'a [u8],
}

impl<'a> MeshEnvelope<'a> {
    /// Parses the envelope at the start of `bytes`. Bytes past the declared
    /// length are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < MESH_HEADER_LEN {
            return Err(EnvelopeError::Truncated {
                expect: MESH_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let packet_type = PacketType::try_from(u16::from_le_bytes([bytes[0], bytes[1]]))?;
        let declared = usize::from(u16::from_le_bytes([bytes[2], bytes[3]]));
        let available = bytes.len() - MESH_HEADER_LEN;
        if declared > available {
            return Err(EnvelopeError::LengthMismatch {
                declared,
                available,
            });
        }
        Ok(Self {
            packet_type,
            payload: &bytes[MESH_HEADER_LEN..MESH_HEADER_LEN + declared],
        })
    }

    /// Writes an envelope into `out`, returning the number of bytes used.
    pub fn encode(
        packet_type: PacketType,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EnvelopeError> {
        let body = Self::header_into(packet_type, payload.len(), out)?;
        body.copy_from_slice(payload);
        Ok(MESH_HEADER_LEN + payload.len())
    }

    /// Wraps an OTA packet in an envelope of type [PacketType::Ota].
    pub fn encode_ota(packet: &OtaPacket<'_>, out: &mut [u8]) -> Result<usize, EnvelopeError> {
        let len = packet.encoded_len();
        packet.write_exact(Self::header_into(PacketType::Ota, len, out)?);
        Ok(MESH_HEADER_LEN + len)
    }

    /// Writes the header for a `len` byte payload and returns the slice the
    /// payload must be written to.
    pub(crate) fn header_into(
        packet_type: PacketType,
        len: usize,
        out: &mut [u8],
    ) -> Result<&mut [u8], EnvelopeError> {
        if len > MESH_MAX_PAYLOAD_LEN {
            return Err(EnvelopeError::PayloadTooLarge {
                len,
                max: MESH_MAX_PAYLOAD_LEN,
            });
        }
        let required = MESH_HEADER_LEN + len;
        if out.len() < required {
            return Err(EnvelopeError::ScratchTooSmall {
                required,
                available: out.len(),
            });
        }
        out[0..2].copy_from_slice(&(packet_type as u16).to_le_bytes());
        // Bounded by MESH_MAX_PAYLOAD_LEN above
        out[2..4].copy_from_slice(&(len as u16).to_le_bytes());
        Ok(&mut out[MESH_HEADER_LEN..required])
    }

    pub fn encoded_len(&self) -> usize {
        MESH_HEADER_LEN + self.payload.len()
    }
}

/// Heartbeat payload of [PacketType::NetworkData].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkData {
    pub send_count: u32,
    pub battery_mv: u16,
}

impl NetworkData {
    pub const LEN: usize = 6;

    /// Reads the first [NetworkData::LEN] bytes of `payload`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let bytes: &[u8; Self::LEN] = payload.get(..Self::LEN)?.try_into().ok()?;
        Some(Self {
            send_count: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            battery_mv: u16::from_le_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0; Self::LEN];
        out[..4].copy_from_slice(&self.send_count.to_le_bytes());
        out[4..].copy_from_slice(&self.battery_mv.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_echo() {
        let bytes = [0x05, 0x00, 0x04, 0x00, 0x2a, 0x00, 0x00, 0x00, 0xee];
        let env = MeshEnvelope::parse(&bytes).unwrap();
        assert_eq!(env.packet_type, PacketType::Echo);
        assert_eq!(env.payload, &[0x2a, 0, 0, 0]);
        assert_eq!(env.encoded_len(), 8);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            MeshEnvelope::parse(&[0x05, 0x00, 0x04]),
            Err(EnvelopeError::Truncated { expect: 4, got: 3 })
        );
        assert_eq!(
            MeshEnvelope::parse(&[0x09, 0x00, 0x00, 0x00]),
            Err(EnvelopeError::UnknownType(9))
        );
        assert_eq!(
            MeshEnvelope::parse(&[0x05, 0x00, 0x04, 0x00, 0x01]),
            Err(EnvelopeError::LengthMismatch {
                declared: 4,
                available: 1
            })
        );
    }

    #[test]
    fn encode_then_parse() {
        let mut out = [0u8; 16];
        let len = MeshEnvelope::encode(PacketType::FirmwareQuery, &[], &mut out).unwrap();
        assert_eq!(&out[..len], &[0x06, 0x00, 0x00, 0x00]);

        let len = MeshEnvelope::encode(PacketType::Echo, &7u32.to_le_bytes(), &mut out).unwrap();
        let env = MeshEnvelope::parse(&out[..len]).unwrap();
        assert_eq!(env.packet_type, PacketType::Echo);
        assert_eq!(env.payload, &[7, 0, 0, 0]);
    }

    #[test]
    fn encode_limits() {
        let mut out = [0u8; 6];
        assert_eq!(
            MeshEnvelope::encode(PacketType::Echo, &[0; 4], &mut out),
            Err(EnvelopeError::ScratchTooSmall {
                required: 8,
                available: 6
            })
        );
        let big = [0u8; MESH_MAX_PAYLOAD_LEN + 1];
        let mut out = [0u8; MESH_MAX_PAYLOAD_LEN + 8];
        assert!(matches!(
            MeshEnvelope::encode(PacketType::RtkData, &big, &mut out),
            Err(EnvelopeError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn ota_envelope() {
        let mut out = [0u8; 32];
        let len = MeshEnvelope::encode_ota(&OtaPacket::ack(2048), &mut out).unwrap();
        assert_eq!(len, 16);
        let env = MeshEnvelope::parse(&out[..len]).unwrap();
        assert_eq!(env.packet_type, PacketType::Ota);
        assert_eq!(OtaPacket::parse(env.payload), Ok(OtaPacket::ack(2048)));
    }

    #[test]
    fn network_data_layout() {
        let data = NetworkData {
            send_count: 0x0102_0304,
            battery_mv: 3700,
        };
        let bytes = data.to_bytes();
        assert_eq!(&bytes[..4], &[4, 3, 2, 1]);
        assert_eq!(NetworkData::parse(&bytes), Some(data));
        assert_eq!(NetworkData::parse(&bytes[..5]), None);
    }

    #[test]
    fn minimum_lengths() {
        assert_eq!(PacketType::Echo.min_payload_len(), 4);
        assert_eq!(PacketType::FirmwareReport.min_payload_len(), 32);
        assert_eq!(PacketType::Ota.min_payload_len(), 12);
        assert_eq!(PacketType::FirmwareQuery.min_payload_len(), 0);
    }
}
