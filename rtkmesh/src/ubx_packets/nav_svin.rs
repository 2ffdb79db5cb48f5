use super::{FieldReader, FieldWriter};
use crate::{constants::NAV_SVIN_PAYLOAD_LEN, error::DecodeError};

/// Survey-in status (UBX-NAV-SVIN)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurveyInStatus {
    /// Message version (0x00 for this version)
    pub version: u8,
    pub reserved1: [u8; 3],
    /// GPS time of week of the navigation epoch \[ms\]
    pub itow: u32,
    /// Passed survey-in observation time
    /// Units: s
    pub dur: u32,
    /// Current survey-in mean position ECEF X coordinate \[cm\]
    pub mean_x: i32,
    /// Current survey-in mean position ECEF Y coordinate \[cm\]
    pub mean_y: i32,
    /// Current survey-in mean position ECEF Z coordinate \[cm\]
    pub mean_z: i32,
    /// High-precision part of the mean X, range -99..+99 \[0.1 mm\]
    pub mean_x_hp: i8,
    pub mean_y_hp: i8,
    pub mean_z_hp: i8,
    pub reserved2: u8,
    /// Current survey-in mean position accuracy \[0.1 mm\]
    pub mean_acc: u32,
    /// Number of position observations used during survey-in
    pub obs: u32,
    /// Survey-in position validity flag, 1 = valid, otherwise 0
    pub valid: u8,
    /// Survey-in in progress flag, 1 = in-progress, otherwise 0
    pub active: u8,
    pub reserved3: [u8; 2],
}

impl SurveyInStatus {
    pub const PAYLOAD_LEN: usize = NAV_SVIN_PAYLOAD_LEN;

    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(DecodeError::InvalidPacketLen {
                packet: "NavSvin",
                expect: Self::PAYLOAD_LEN,
                got: payload.len(),
            });
        }
        let mut r = FieldReader::new(payload);
        Ok(Self {
            version: r.u8(),
            reserved1: r.bytes(),
            itow: r.u32(),
            dur: r.u32(),
            mean_x: r.i32(),
            mean_y: r.i32(),
            mean_z: r.i32(),
            mean_x_hp: r.i8(),
            mean_y_hp: r.i8(),
            mean_z_hp: r.i8(),
            reserved2: r.u8(),
            mean_acc: r.u32(),
            obs: r.u32(),
            valid: r.u8(),
            active: r.u8(),
            reserved3: r.bytes(),
        })
    }

    pub fn write_payload(&self, out: &mut [u8; NAV_SVIN_PAYLOAD_LEN]) {
        FieldWriter::new(out)
            .put(&[self.version])
            .put(&self.reserved1)
            .put(&self.itow.to_le_bytes())
            .put(&self.dur.to_le_bytes())
            .put(&self.mean_x.to_le_bytes())
            .put(&self.mean_y.to_le_bytes())
            .put(&self.mean_z.to_le_bytes())
            .put(&self.mean_x_hp.to_le_bytes())
            .put(&self.mean_y_hp.to_le_bytes())
            .put(&self.mean_z_hp.to_le_bytes())
            .put(&[self.reserved2])
            .put(&self.mean_acc.to_le_bytes())
            .put(&self.obs.to_le_bytes())
            .put(&[self.valid, self.active])
            .put(&self.reserved3);
    }

    pub fn is_valid(&self) -> bool {
        self.valid == 1
    }

    pub fn is_active(&self) -> bool {
        self.active == 1
    }

    /// Mean position accuracy in \[m\]
    pub fn mean_accuracy_m(&self) -> f64 {
        f64::from(self.mean_acc) * 1e-4
    }

    /// Mean ECEF position in \[m\], standard and high-precision parts combined.
    pub fn mean_ecef_m(&self) -> [f64; 3] {
        let combine = |cm: i32, hp: i8| f64::from(cm) * 1e-2 + f64::from(hp) * 1e-4;
        [
            combine(self.mean_x, self.mean_x_hp),
            combine(self.mean_y, self.mean_y_hp),
            combine(self.mean_z, self.mean_z_hp),
        ]
    }
}
