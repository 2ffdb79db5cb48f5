use crc::{Crc, CRC_24_LTE_A};

use crate::{
    constants::{UBX_CHECKSUM_LEN, UBX_CLASS_OFFSET, UBX_HEADER_LEN},
    DecodeError,
};

/// CRC-24Q as used by RTCM 3 frames (poly 0x864CFB, no reflection).
const CRC24Q: Crc<u32> = Crc::<u32>::new(&CRC_24_LTE_A);

/// Running 8-bit Fletcher sums used by UBX framing.
///
/// Covers class, id, length and payload; the sync chars are never fed in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UbxChecksumCalc {
    sum: u8,
    sum_of_sums: u8,
}

impl UbxChecksumCalc {
    pub(crate) const fn new() -> Self {
        Self {
            sum: 0,
            sum_of_sums: 0,
        }
    }

    pub(crate) const fn feed(mut self, bytes: &[u8]) -> Self {
        let mut idx = 0;
        while idx < bytes.len() {
            self.sum = self.sum.wrapping_add(bytes[idx]);
            self.sum_of_sums = self.sum_of_sums.wrapping_add(self.sum);
            idx += 1;
        }
        self
    }

    /// `(CK_A, CK_B)` as they appear on the wire.
    pub(crate) const fn finish(self) -> (u8, u8) {
        (self.sum, self.sum_of_sums)
    }

    pub(crate) const fn matches(self, trailer: [u8; 2]) -> bool {
        self.sum == trailer[0] && self.sum_of_sums == trailer[1]
    }
}

/// Checks the trailer of a complete UBX frame, sync chars included.
///
/// `frame` must hold at least [ubx_frame_len]`(payload_len)` bytes.
pub(crate) fn verify_ubx_frame(frame: &[u8], payload_len: usize) -> Result<(), DecodeError> {
    let trailer_at = UBX_HEADER_LEN + payload_len;
    let calc = UbxChecksumCalc::new().feed(&frame[UBX_CLASS_OFFSET..trailer_at]);
    let trailer = [frame[trailer_at], frame[trailer_at + 1]];
    if calc.matches(trailer) {
        return Ok(());
    }
    let (ck_a, ck_b) = calc.finish();
    Err(DecodeError::ChecksumMismatch {
        expect: u16::from_le_bytes(trailer),
        got: u16::from_le_bytes([ck_a, ck_b]),
    })
}

/// UBX checksum over `bytes` (class through end of payload).
pub fn ubx_checksum(bytes: &[u8]) -> (u8, u8) {
    UbxChecksumCalc::new().feed(bytes).finish()
}

/// Total on-wire size of a UBX frame carrying `payload_len` bytes.
pub const fn ubx_frame_len(payload_len: usize) -> usize {
    UBX_HEADER_LEN + payload_len + UBX_CHECKSUM_LEN
}

/// CRC-24Q over an RTCM header and payload.
pub fn rtcm_crc24q(bytes: &[u8]) -> u32 {
    CRC24Q.checksum(bytes)
}
