//! Lock-guarded state shared between the serial ingestion task and readers.
//!
//! Every cell here is safe to place in a `static`. Critical sections cover a
//! single copy in or out; callers must not log or do I/O inside `with_lock`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::{
    time_sync::SharedTimeRecord,
    ubx_packets::{NavPositionFix, SurveyInStatus},
};

/// A value behind a critical-section mutex with scoped access.
pub struct SharedCell<T> {
    storage: Mutex<CriticalSectionRawMutex, RefCell<T>>,
}

impl<T> SharedCell<T> {
    pub const fn new(init: T) -> Self {
        Self {
            storage: Mutex::new(RefCell::new(init)),
        }
    }

    /// Runs `f` with exclusive access to the value. The lock is released when
    /// `f` returns, on every path.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.storage.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Replaces the stored value.
    pub fn set(&self, value: T) {
        self.with_lock(|slot| *slot = value);
    }
}

impl<T: Copy> SharedCell<T> {
    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.with_lock(|slot| *slot)
    }
}

impl<T: Default> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Latest navigation records, each `None` until first decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NavRecords {
    pub fix: Option<NavPositionFix>,
    pub survey_in: Option<SurveyInStatus>,
}

/// Navigation records behind one lock.
///
/// The two records are written independently. Use [NavState::snapshot] when
/// both must come from the same instant.
#[derive(Default)]
pub struct NavState {
    records: SharedCell<NavRecords>,
}

impl NavState {
    pub const fn new() -> Self {
        Self {
            records: SharedCell::new(NavRecords {
                fix: None,
                survey_in: None,
            }),
        }
    }

    /// Both records, read under a single lock acquisition.
    pub fn snapshot(&self) -> NavRecords {
        self.records.get()
    }

    pub fn position_fix(&self) -> Option<NavPositionFix> {
        self.records.with_lock(|r| r.fix)
    }

    pub fn survey_in(&self) -> Option<SurveyInStatus> {
        self.records.with_lock(|r| r.survey_in)
    }

    pub(crate) fn store_fix(&self, fix: NavPositionFix) {
        self.records.with_lock(|r| r.fix = Some(fix));
    }

    pub(crate) fn store_survey_in(&self, svin: SurveyInStatus) {
        self.records.with_lock(|r| r.survey_in = Some(svin));
    }
}

/// Mapping from local monotonic time to GNSS time of week.
pub type SharedTime = SharedCell<Option<SharedTimeRecord>>;
