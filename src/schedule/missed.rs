use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use futures::{stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::{
    api::{
        entities::{Shift, ShiftQuery, ShiftStatus, ShiftUpdate, TimeClockRecord},
        TimekeepingApi,
    },
    error::Result,
    utils::clock::Clock,
};

pub const DEFAULT_GRACE_PERIOD_MINUTES: i64 = 15;
pub const DEFAULT_CREATION_EXEMPTION_HOURS: i64 = 24;

const PARALLEL_LOOKUPS: usize = 4;

/// When a scheduled shift without a clock in counts as missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedShiftPolicy {
    /// How long after its start a shift may still be clocked into.
    pub grace_period: Duration,
    /// Shifts created less than this long ago are never flagged.
    pub creation_exemption: Duration,
}

impl Default for MissedShiftPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::minutes(DEFAULT_GRACE_PERIOD_MINUTES),
            creation_exemption: Duration::hours(DEFAULT_CREATION_EXEMPTION_HOURS),
        }
    }
}

impl MissedShiftPolicy {
    /// Time based part of the check. A shift that was published after it had already started is
    /// never overdue, and neither is a freshly created one.
    pub fn is_overdue(&self, shift: &Shift, now: DateTime<Utc>) -> bool {
        shift.status == ShiftStatus::Scheduled
            && !shift.is_missed
            && now > shift.start_time + self.grace_period
            && shift.created_at <= shift.start_time
            && now - shift.created_at >= self.creation_exemption
    }

    pub fn should_flag(
        &self,
        shift: &Shift,
        records: &[TimeClockRecord],
        now: DateTime<Utc>,
    ) -> bool {
        self.is_overdue(shift, now) && !has_clock_in(shift, records)
    }
}

/// Whether the employee clocked in against this shift.
pub fn has_clock_in(shift: &Shift, records: &[TimeClockRecord]) -> bool {
    records.iter().any(|v| {
        v.employee_id == shift.employee_id && v.shift_id.as_deref() == Some(shift.id.as_str())
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Shifts that were marked missed in this run.
    pub flagged: Vec<String>,
    /// Overdue shifts that turned out to have a clock in.
    pub attended: Vec<String>,
    /// Shifts whose lookup or update failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Flags overdue scheduled shifts as missed. Only `scheduled` shifts that are not yet missed are
/// looked at, so running it again is a no-op for shifts it already flagged.
pub struct MissedShiftSweep {
    api: Arc<dyn TimekeepingApi>,
    policy: MissedShiftPolicy,
    clock: Arc<dyn Clock>,
}

impl MissedShiftSweep {
    pub fn new(
        api: Arc<dyn TimekeepingApi>,
        policy: MissedShiftPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { api, policy, clock }
    }

    /// Runs one sweep over the shifts selected by `scope`. Failing to list shifts aborts the sweep;
    /// failures for single shifts are logged and collected in the report.
    #[instrument(skip(self))]
    pub async fn run(&self, scope: ShiftQuery) -> Result<SweepReport> {
        let now = self.clock.time();
        let shifts = self
            .api
            .list_shifts(ShiftQuery {
                status: Some(ShiftStatus::Scheduled),
                is_missed: Some(false),
                ..scope
            })
            .await?;

        let overdue = shifts
            .into_iter()
            .filter(|v| self.policy.is_overdue(v, now))
            .collect::<Vec<_>>();
        debug!("{} overdue shifts", overdue.len());

        let records = self.records_by_employee(&overdue).await;

        let mut report = SweepReport::default();
        for shift in overdue {
            let records = match records.get(&shift.employee_id) {
                Some(Ok(records)) => records.as_slice(),
                Some(Err(e)) => {
                    warn!("Skipping shift {}: time clock lookup failed {e}", shift.id);
                    report.failed.push((shift.id, e.clone()));
                    continue;
                }
                None => &[],
            };
            if !self.policy.should_flag(&shift, records, now) {
                report.attended.push(shift.id);
                continue;
            }

            match self.api.update_shift(&shift.id, ShiftUpdate::mark_missed(now)).await {
                Ok(_) => {
                    info!("Flagged shift {} of {} as missed", shift.id, shift.employee_id);
                    report.flagged.push(shift.id);
                }
                Err(e) => {
                    warn!("Failed to flag shift {}: {e}", shift.id);
                    report.failed.push((shift.id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Fetches time clock records once per employee.
    async fn records_by_employee(
        &self,
        shifts: &[Shift],
    ) -> HashMap<String, std::result::Result<Vec<TimeClockRecord>, String>> {
        let mut employees = shifts.iter().map(|v| v.employee_id.clone()).collect::<Vec<_>>();
        employees.sort();
        employees.dedup();

        stream::iter(employees)
            .map(|employee| async move {
                let records = self
                    .api
                    .list_time_clocks(&employee)
                    .await
                    .map_err(|e| e.to_string());
                (employee, records)
            })
            .buffered(PARALLEL_LOOKUPS)
            .collect()
            .await
    }
}
