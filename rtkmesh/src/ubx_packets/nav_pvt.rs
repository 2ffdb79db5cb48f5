use bitflags::bitflags;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use super::{FieldReader, FieldWriter, GnssFixType};
use crate::{
    constants::NAV_PVT_PAYLOAD_LEN,
    error::{DateTimeError, DecodeError},
};

bitflags! {
    /// Validity flags of [NavPositionFix]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NavPvtValidFlags: u8 {
        /// 1 = valid UTC Date
        const VALID_DATE = 0x01;
        /// 1 = valid UTC time of day
        const VALID_TIME = 0x02;
        /// 1 = UTC time of day has been fully resolved (no seconds uncertainty).
        const FULLY_RESOLVED = 0x04;
        /// 1 = valid magnetic declination
        const VALID_MAG = 0x08;
    }
}

impl NavPvtValidFlags {
    /// Bits that must all be set before a fix may drive the shared time base.
    pub const TIME_RESOLVED: Self = Self::VALID_DATE
        .union(Self::VALID_TIME)
        .union(Self::FULLY_RESOLVED);
}

bitflags! {
    /// Fix status flags of [NavPositionFix]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NavPvtFlags: u8 {
        /// 1 = Position and velocity valid and within DOP and accuracy masks
        const GPS_FIX_OK = 1;
        /// 1 = Differential corrections were applied
        const DIFF_SOLN = 2;
        const HEAD_VEH_VALID = 0x20;
        /// 1 = Carrier phase range solution with floating ambiguities
        const CARR_SOLN_FLOAT = 0x40;
        /// 1 = Carrier phase range solution with fixed ambiguities
        const CARR_SOLN_FIXED = 0x80;
    }
}

/// Navigation Position Velocity Time Solution (UBX-NAV-PVT)
///
/// Raw receiver units are kept in the fields; the scaled accessors convert
/// to degrees, meters and meters per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NavPositionFix {
    /// GPS time of week of the navigation epoch \[ms\]
    pub itow: u32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    /// Raw validity bits, see [NavPvtValidFlags]
    pub valid: u8,
    /// Time accuracy estimate \[ns\]
    pub time_accuracy: u32,
    /// Fraction of second, range -1e9 .. 1e9 \[ns\]
    pub nanosec: i32,
    pub fix_type: u8,
    pub flags: u8,
    pub flags2: u8,
    pub num_satellites: u8,
    /// Longitude \[1e-7 deg\]
    pub lon: i32,
    /// Latitude \[1e-7 deg\]
    pub lat: i32,
    /// Height above ellipsoid \[mm\]
    pub height: i32,
    /// Height above mean sea level \[mm\]
    pub height_msl: i32,
    pub h_acc: u32,
    pub v_acc: u32,
    pub vel_north: i32,
    pub vel_east: i32,
    pub vel_down: i32,
    pub g_speed: i32,
    /// Heading of motion \[1e-5 deg\]
    pub head_motion: i32,
    pub s_acc: u32,
    pub head_acc: u32,
    /// Position DOP \[0.01\]
    pub pdop: u16,
    pub flags3: u16,
    pub reserved1: [u8; 4],
    pub head_vehicle: i32,
    pub magnetic_declination: i16,
    pub magnetic_declination_accuracy: u16,
}

impl NavPositionFix {
    pub const PAYLOAD_LEN: usize = NAV_PVT_PAYLOAD_LEN;

    /// Parses a NAV-PVT payload. The length must match exactly.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(DecodeError::InvalidPacketLen {
                packet: "NavPvt",
                expect: Self::PAYLOAD_LEN,
                got: payload.len(),
            });
        }
        let mut r = FieldReader::new(payload);
        Ok(Self {
            itow: r.u32(),
            year: r.u16(),
            month: r.u8(),
            day: r.u8(),
            hour: r.u8(),
            min: r.u8(),
            sec: r.u8(),
            valid: r.u8(),
            time_accuracy: r.u32(),
            nanosec: r.i32(),
            fix_type: r.u8(),
            flags: r.u8(),
            flags2: r.u8(),
            num_satellites: r.u8(),
            lon: r.i32(),
            lat: r.i32(),
            height: r.i32(),
            height_msl: r.i32(),
            h_acc: r.u32(),
            v_acc: r.u32(),
            vel_north: r.i32(),
            vel_east: r.i32(),
            vel_down: r.i32(),
            g_speed: r.i32(),
            head_motion: r.i32(),
            s_acc: r.u32(),
            head_acc: r.u32(),
            pdop: r.u16(),
            flags3: r.u16(),
            reserved1: r.bytes(),
            head_vehicle: r.i32(),
            magnetic_declination: r.i16(),
            magnetic_declination_accuracy: r.u16(),
        })
    }

    /// Serializes the record back into the receiver layout.
    pub fn write_payload(&self, out: &mut [u8; NAV_PVT_PAYLOAD_LEN]) {
        FieldWriter::new(out)
            .put(&self.itow.to_le_bytes())
            .put(&self.year.to_le_bytes())
            .put(&[
                self.month,
                self.day,
                self.hour,
                self.min,
                self.sec,
                self.valid,
            ])
            .put(&self.time_accuracy.to_le_bytes())
            .put(&self.nanosec.to_le_bytes())
            .put(&[self.fix_type, self.flags, self.flags2, self.num_satellites])
            .put(&self.lon.to_le_bytes())
            .put(&self.lat.to_le_bytes())
            .put(&self.height.to_le_bytes())
            .put(&self.height_msl.to_le_bytes())
            .put(&self.h_acc.to_le_bytes())
            .put(&self.v_acc.to_le_bytes())
            .put(&self.vel_north.to_le_bytes())
            .put(&self.vel_east.to_le_bytes())
            .put(&self.vel_down.to_le_bytes())
            .put(&self.g_speed.to_le_bytes())
            .put(&self.head_motion.to_le_bytes())
            .put(&self.s_acc.to_le_bytes())
            .put(&self.head_acc.to_le_bytes())
            .put(&self.pdop.to_le_bytes())
            .put(&self.flags3.to_le_bytes())
            .put(&self.reserved1)
            .put(&self.head_vehicle.to_le_bytes())
            .put(&self.magnetic_declination.to_le_bytes())
            .put(&self.magnetic_declination_accuracy.to_le_bytes());
    }

    pub fn validity(&self) -> NavPvtValidFlags {
        NavPvtValidFlags::from_bits_retain(self.valid)
    }

    /// Date valid, time valid and fully resolved.
    pub fn is_time_resolved(&self) -> bool {
        self.validity().contains(NavPvtValidFlags::TIME_RESOLVED)
    }

    pub fn fix_type(&self) -> GnssFixType {
        self.fix_type.into()
    }

    pub fn fix_flags(&self) -> NavPvtFlags {
        NavPvtFlags::from_bits_retain(self.flags)
    }

    /// Longitude in \[deg\]
    pub fn longitude(&self) -> f64 {
        f64::from(self.lon) * 1e-7
    }

    /// Latitude in \[deg\]
    pub fn latitude(&self) -> f64 {
        f64::from(self.lat) * 1e-7
    }

    /// Height above reference ellipsoid in \[m\]
    pub fn height_above_ellipsoid(&self) -> f64 {
        f64::from(self.height) * 1e-3
    }

    /// Height above mean sea level in \[m\]
    pub fn height_msl(&self) -> f64 {
        f64::from(self.height_msl) * 1e-3
    }

    pub fn horizontal_accuracy(&self) -> f64 {
        f64::from(self.h_acc) * 1e-3
    }

    pub fn vertical_accuracy(&self) -> f64 {
        f64::from(self.v_acc) * 1e-3
    }

    /// Ground speed \[m/s\]
    pub fn ground_speed_2d(&self) -> f64 {
        f64::from(self.g_speed) * 1e-3
    }

    /// Heading of motion \[deg\]
    pub fn heading_motion(&self) -> f64 {
        f64::from(self.head_motion) * 1e-5
    }

    pub fn pdop(&self) -> f64 {
        f64::from(self.pdop) * 1e-2
    }
}

impl TryFrom<&NavPositionFix> for DateTime<Utc> {
    type Error = DateTimeError;

    fn try_from(sol: &NavPositionFix) -> Result<Self, Self::Error> {
        let date = NaiveDate::from_ymd_opt(
            i32::from(sol.year),
            u32::from(sol.month),
            u32::from(sol.day),
        )
        .ok_or(DateTimeError::InvalidDate)?;
        let time = NaiveTime::from_hms_opt(
            u32::from(sol.hour),
            u32::from(sol.min),
            u32::from(sol.sec),
        )
        .ok_or(DateTimeError::InvalidTime)?;
        const NANOS_LIM: u32 = 1_000_000_000;
        if sol.nanosec.unsigned_abs() >= NANOS_LIM {
            return Err(DateTimeError::InvalidNanoseconds);
        }

        let dt = NaiveDateTime::new(date, time)
            .checked_add_signed(TimeDelta::nanoseconds(i64::from(sol.nanosec)))
            .ok_or(DateTimeError::InvalidDate)?;

        Ok(DateTime::from_naive_utc_and_offset(dt, Utc))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    fn sample() -> NavPositionFix {
        NavPositionFix {
            itow: 100_000,
            year: 2024,
            month: 3,
            day: 14,
            hour: 15,
            min: 9,
            sec: 26,
            valid: 0x07,
            time_accuracy: 1500,
            nanosec: 500_000,
            fix_type: 3,
            flags: 0x81,
            num_satellites: 17,
            lon: 1_396_917_000,
            lat: 356_895_000,
            height: 40_123,
            height_msl: 3_456,
            pdop: 123,
            magnetic_declination: -512,
            ..Default::default()
        }
    }

    #[test]
    fn payload_layout_offsets() {
        let mut buf = [0u8; NAV_PVT_PAYLOAD_LEN];
        sample().write_payload(&mut buf);
        assert_eq!(&buf[0..4], &100_000u32.to_le_bytes());
        assert_eq!(buf[11], 0x07);
        assert_eq!(&buf[12..16], &1500u32.to_le_bytes());
        assert_eq!(&buf[16..20], &500_000i32.to_le_bytes());
        assert_eq!(buf[20], 3);
        assert_eq!(buf[23], 17);
        assert_eq!(&buf[28..32], &356_895_000i32.to_le_bytes());
        assert_eq!(&buf[76..78], &123u16.to_le_bytes());
        assert_eq!(&buf[88..90], &(-512i16).to_le_bytes());
    }

    #[test]
    fn parse_written_payload() {
        let mut buf = [0u8; NAV_PVT_PAYLOAD_LEN];
        sample().write_payload(&mut buf);
        let fix = NavPositionFix::from_payload(&buf).unwrap();
        assert_eq!(fix, sample());
        assert_eq!(fix.fix_type(), GnssFixType::Fix3D);
        assert!(fix.fix_flags().contains(NavPvtFlags::CARR_SOLN_FIXED));
        assert!((fix.latitude() - 35.6895).abs() < 1e-9);
        assert!((fix.height_msl() - 3.456).abs() < 1e-9);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            NavPositionFix::from_payload(&[0; 91]),
            Err(DecodeError::InvalidPacketLen {
                packet: "NavPvt",
                expect: 92,
                got: 91
            })
        );
    }

    #[test]
    fn time_resolved_needs_all_three_bits() {
        let mut fix = sample();
        assert!(fix.is_time_resolved());
        fix.valid = 0x03;
        assert!(!fix.is_time_resolved());
        fix.valid = 0x0f;
        assert!(fix.is_time_resolved());
    }

    #[test]
    fn utc_date_time() {
        let dt = DateTime::<Utc>::try_from(&sample()).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.second(), 26);
        assert_eq!(dt.nanosecond(), 500_000);

        let mut fix = sample();
        fix.nanosec = -200_000_000;
        let dt = DateTime::<Utc>::try_from(&fix).unwrap();
        assert_eq!(dt.second(), 25);
        assert_eq!(dt.nanosecond(), 800_000_000);
    }

    #[test]
    fn utc_date_time_errors() {
        let mut fix = sample();
        fix.month = 13;
        assert_eq!(
            DateTime::<Utc>::try_from(&fix),
            Err(DateTimeError::InvalidDate)
        );
        let mut fix = sample();
        fix.hour = 24;
        assert_eq!(
            DateTime::<Utc>::try_from(&fix),
            Err(DateTimeError::InvalidTime)
        );
        let mut fix = sample();
        fix.nanosec = 1_000_000_000;
        assert_eq!(
            DateTime::<Utc>::try_from(&fix),
            Err(DateTimeError::InvalidNanoseconds)
        );
    }
}
