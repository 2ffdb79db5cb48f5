//! UBX navigation records consumed by the stream decoder.

mod nav_pvt;
mod nav_svin;

pub use nav_pvt::{NavPositionFix, NavPvtFlags, NavPvtValidFlags};
pub use nav_svin::SurveyInStatus;

use crate::{
    constants::{UBX_HEADER_LEN, UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2},
    parser::{checksum::ubx_checksum, ubx_frame_len},
};

/// GNSS fix type reported by NAV-PVT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GnssFixType {
    NoFix,
    DeadReckoningOnly,
    Fix2D,
    Fix3D,
    GPSPlusDeadReckoning,
    TimeOnlyFix,
    Reserved(u8),
}

impl From<u8> for GnssFixType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::NoFix,
            1 => Self::DeadReckoningOnly,
            2 => Self::Fix2D,
            3 => Self::Fix3D,
            4 => Self::GPSPlusDeadReckoning,
            5 => Self::TimeOnlyFix,
            other => Self::Reserved(other),
        }
    }
}

/// Writes a complete UBX frame (sync, header, payload, checksum) into `out`.
///
/// Returns the frame length, or `None` if `out` is too small or the payload
/// does not fit the 16-bit length field.
pub fn ubx_frame(class: u8, id: u8, payload: &[u8], out: &mut [u8]) -> Option<usize> {
    let frame_len = ubx_frame_len(payload.len());
    let length = u16::try_from(payload.len()).ok()?;
    if out.len() < frame_len {
        return None;
    }
    out[0] = UBX_SYNC_CHAR_1;
    out[1] = UBX_SYNC_CHAR_2;
    out[2] = class;
    out[3] = id;
    out[4..6].copy_from_slice(&length.to_le_bytes());
    out[UBX_HEADER_LEN..UBX_HEADER_LEN + payload.len()].copy_from_slice(payload);
    let (ck_a, ck_b) = ubx_checksum(&out[2..UBX_HEADER_LEN + payload.len()]);
    out[frame_len - 2] = ck_a;
    out[frame_len - 1] = ck_b;
    Some(frame_len)
}

/// Little-endian field reader over a payload whose length was already checked.
pub(crate) struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub(crate) fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub(crate) fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }

    pub(crate) fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub(crate) fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    pub(crate) fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    pub(crate) fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    pub(crate) fn bytes<const N: usize>(&mut self) -> [u8; N] {
        self.take()
    }
}

/// Little-endian counterpart of [FieldReader].
pub(crate) struct FieldWriter<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn put(&mut self, field: &[u8]) -> &mut Self {
        self.bytes[self.pos..self.pos + field.len()].copy_from_slice(field);
        self.pos += field.len();
        self
    }
}
