//! Process-wide time source.
//!
//! # Responsibility
//! - Provide the single notion of "now" shared by issuance, verification and
//!   scheduling.
//! - Derive calendar dates and midnight boundaries from that one source.
//!
//! # Invariants
//! - "Today" is always derived from the server clock, never from client input.
//! - All components of one process hold the same `Arc<dyn Clock>`.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime};
use std::sync::{Arc, Mutex, PoisonError};

/// Calendar date a token or attendance record is scoped to.
pub type IssueDate = NaiveDate;

/// Injectable wall-clock abstraction.
pub trait Clock: Send + Sync {
    /// Current instant, carrying the local UTC offset used for calendar math.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Current local calendar date.
    fn today(&self) -> IssueDate {
        self.now().date_naive()
    }

    /// First instant of the day after `now`.
    ///
    /// The default keeps `now`'s offset; zone-aware clocks override it so the
    /// instant tracks offset changes (DST) happening at or before midnight.
    fn next_boundary(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        next_midnight(now)
    }
}

/// Clock backed by the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn next_boundary(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let local = now.with_timezone(&Local);
        local
            .date_naive()
            .succ_opt()
            .map(|tomorrow| tomorrow.and_time(NaiveTime::MIN))
            .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
            .map(|midnight| midnight.fixed_offset())
            // Zones that skip midnight itself fall back to the fixed offset.
            .unwrap_or_else(|| next_midnight(now))
    }
}

/// Manually driven clock for deterministic day-boundary tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Convenience constructor returning a shareable handle.
    pub fn shared(start: DateTime<FixedOffset>) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    pub fn set(&self, instant: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the first instant of the calendar day following `now`, in the
/// same UTC offset as `now`.
pub fn next_midnight(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
    let midnight = tomorrow.and_time(NaiveTime::MIN);
    // Offsets are fixed, so local-to-instant mapping is never ambiguous.
    midnight
        .and_local_timezone(*now.offset())
        .single()
        .unwrap_or(now)
}

/// Returns how long `now` lies past the most recent midnight.
pub fn elapsed_since_midnight(now: DateTime<FixedOffset>) -> Duration {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    now.naive_local() - midnight
}
