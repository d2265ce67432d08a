//! Attendance state is never stored. It is recomputed from the timestamps of the employee's latest
//! records every time it is asked for, so it stays correct after the process was suspended or the
//! records were changed from another device.

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::{
    api::entities::TimeClockRecord,
    utils::time::{local_date, whole_seconds},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    Idle,
    Working,
    OnBreak,
    Finished,
}

impl AttendanceState {
    pub fn is_active(&self) -> bool {
        matches!(self, AttendanceState::Working | AttendanceState::OnBreak)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            AttendanceState::Idle => "idle",
            AttendanceState::Working => "working",
            AttendanceState::OnBreak => "on break",
            AttendanceState::Finished => "finished",
        }
    }
}

impl Display for AttendanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Seconds of finished breaks accumulated for one record while the session watched it. Records
/// only keep the last `break_start`/`break_end` pair, so earlier breaks would be lost without it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakLedger {
    record_id: Option<String>,
    completed_seconds: i64,
}

impl BreakLedger {
    pub fn for_record(record_id: &str) -> Self {
        Self {
            record_id: Some(record_id.to_string()),
            completed_seconds: 0,
        }
    }

    /// Adds the break that the record just closed.
    pub fn close_break(&mut self, record: &TimeClockRecord) {
        if self.record_id.as_deref() != Some(record.id.as_str()) {
            *self = Self::for_record(&record.id);
        }
        self.completed_seconds += record.closed_break_seconds();
    }

    /// Total finished break seconds for `record`.
    pub fn completed_for(&self, record: &TimeClockRecord) -> i64 {
        let stored = record.closed_break_seconds();
        if self.record_id.as_deref() == Some(record.id.as_str()) {
            stored.max(self.completed_seconds)
        } else {
            stored
        }
    }
}

/// What a time clock screen shows at one moment.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: AttendanceState,
    /// The record the numbers were computed from. For [AttendanceState::Idle] this is a record that
    /// was completed today but started on an earlier day, if there is one.
    pub record: Option<TimeClockRecord>,
    pub worked_seconds: i64,
    /// Finished breaks plus the running one.
    pub break_seconds: i64,
    /// Length of the running break.
    pub current_break_seconds: Option<i64>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            state: AttendanceState::Idle,
            record: None,
            worked_seconds: 0,
            break_seconds: 0,
            current_break_seconds: None,
        }
    }
}

/// Picks the record that determines the state: the latest open one, or otherwise the latest one.
pub fn current_record(records: &[TimeClockRecord]) -> Option<&TimeClockRecord> {
    records
        .iter()
        .filter(|v| v.is_open())
        .max_by_key(|v| v.clock_in)
        .or_else(|| records.iter().max_by_key(|v| v.clock_in))
}

pub fn derive_snapshot<Tz: TimeZone>(
    records: &[TimeClockRecord],
    ledger: &BreakLedger,
    now: DateTime<Utc>,
    tz: &Tz,
) -> SessionSnapshot {
    let Some(record) = current_record(records) else {
        return SessionSnapshot::idle();
    };
    let completed_break = ledger.completed_for(record);

    match (record.clock_out, record.break_start) {
        (None, Some(break_start)) if record.break_in_progress() => {
            // Work time stays frozen at the moment the break started.
            let current_break = whole_seconds(break_start, now).max(0);
            SessionSnapshot {
                state: AttendanceState::OnBreak,
                record: Some(record.clone()),
                worked_seconds: (whole_seconds(record.clock_in, break_start) - completed_break)
                    .max(0),
                break_seconds: completed_break + current_break,
                current_break_seconds: Some(current_break),
            }
        }
        (None, _) => SessionSnapshot {
            state: AttendanceState::Working,
            record: Some(record.clone()),
            worked_seconds: (whole_seconds(record.clock_in, now) - completed_break).max(0),
            break_seconds: completed_break,
            current_break_seconds: None,
        },
        (Some(clock_out), _) => {
            let today = local_date(now, tz);
            let state = if local_date(record.clock_in, tz) == today {
                AttendanceState::Finished
            } else if local_date(clock_out, tz) == today {
                AttendanceState::Idle
            } else {
                return SessionSnapshot::idle();
            };
            SessionSnapshot {
                state,
                record: Some(record.clone()),
                worked_seconds: (whole_seconds(record.clock_in, clock_out) - completed_break)
                    .max(0),
                break_seconds: completed_break,
                current_break_seconds: None,
            }
        }
    }
}
