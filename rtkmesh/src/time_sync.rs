//! Local clock to GNSS time of week mapping, refreshed from NAV-PVT fixes.

use log::{info, warn};

use crate::{
    constants::GNSS_WEEK_US,
    error::TimeSyncError,
    interfaces::MonotonicClock,
    shared::SharedTime,
    ubx_packets::NavPositionFix,
};

/// Snapshot pairing a GNSS time of week with the local clock reading taken
/// when the fix was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedTimeRecord {
    /// GPS time of week \[us\]
    pub gnss_time_of_week_us: u64,
    /// Monotonic local time at acceptance \[us\]
    pub local_time_at_update_us: u64,
    /// Time accuracy estimate \[us\]
    pub time_accuracy_us: u32,
}

impl SharedTimeRecord {
    /// Builds the record for `fix` as seen at local time `local_now_us`.
    ///
    /// Sub-millisecond nanoseconds are rounded to the nearest microsecond,
    /// halves away from zero.
    pub fn from_fix(fix: &NavPositionFix, local_now_us: u64) -> Self {
        let tow_us = i64::from(fix.itow) * 1000 + round_div_1000(i64::from(fix.nanosec));
        let week_us = GNSS_WEEK_US as i64;
        Self {
            gnss_time_of_week_us: tow_us.rem_euclid(week_us) as u64,
            local_time_at_update_us: local_now_us,
            time_accuracy_us: ((u64::from(fix.time_accuracy) + 500) / 1000) as u32,
        }
    }

    /// Time since the record was taken. Zero if `local_now_us` is earlier.
    pub fn age_us(&self, local_now_us: u64) -> u64 {
        local_now_us.saturating_sub(self.local_time_at_update_us)
    }

    /// GNSS time of week at `local_now_us`, extrapolated with the local clock
    /// and wrapped at the week boundary.
    pub fn gnss_time_at(&self, local_now_us: u64) -> u64 {
        (self.gnss_time_of_week_us + self.age_us(local_now_us) % GNSS_WEEK_US) % GNSS_WEEK_US
    }
}

fn round_div_1000(value: i64) -> i64 {
    if value >= 0 {
        (value + 500) / 1000
    } else {
        (value - 500) / 1000
    }
}

/// Publishes time records into a [SharedTime] cell.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeSynchronizer;

impl TimeSynchronizer {
    /// Accepts `fix` as the time reference if its date, time and
    /// full-resolution bits are all set. The shared record is left untouched
    /// otherwise.
    pub fn synchronize<C: MonotonicClock>(
        fix: &NavPositionFix,
        clock: &C,
        shared: &SharedTime,
    ) -> Result<SharedTimeRecord, TimeSyncError> {
        if !fix.is_time_resolved() {
            warn!("NAV-PVT time not valid: 0x{:02x}", fix.valid);
            return Err(TimeSyncError::NotResolved { valid: fix.valid });
        }
        let record = SharedTimeRecord::from_fix(fix, clock.now_us());
        shared.set(Some(record));
        info!(
            "NAV-PVT iTOW: {} us, tAcc: {} us, updated_us: {}",
            record.gnss_time_of_week_us, record.time_accuracy_us, record.local_time_at_update_us
        );
        Ok(record)
    }
}
