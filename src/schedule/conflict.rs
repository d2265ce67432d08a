use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, instrument, warn};

use crate::{
    api::{
        entities::{Shift, ShiftDraft, ShiftQuery, ShiftUpdate},
        TimekeepingApi,
    },
    error::{Result, TimekeepingError},
    utils::time::local_date,
};

/// The parts of a shift that matter for double booking. Built from stored shifts and from shifts
/// that are about to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftSpan<'a> {
    pub id: Option<&'a str>,
    pub employee_id: &'a str,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl<'a> From<&'a Shift> for ShiftSpan<'a> {
    fn from(shift: &'a Shift) -> Self {
        Self {
            id: Some(&shift.id),
            employee_id: &shift.employee_id,
            start_time: shift.start_time,
            end_time: shift.end_time,
        }
    }
}

impl<'a> From<&'a ShiftDraft> for ShiftSpan<'a> {
    fn from(draft: &'a ShiftDraft) -> Self {
        Self {
            id: None,
            employee_id: &draft.employee_id,
            start_time: draft.start_time,
            end_time: draft.end_time,
        }
    }
}

/// Two shifts conflict when they belong to the same employee, start on the same local date and
/// their `[start, end)` intervals overlap.
pub fn spans_conflict<Tz: TimeZone>(a: ShiftSpan<'_>, b: ShiftSpan<'_>, tz: &Tz) -> bool {
    a.employee_id == b.employee_id
        && local_date(a.start_time, tz) == local_date(b.start_time, tz)
        && a.start_time < b.end_time
        && b.start_time < a.end_time
}

/// First shift in `roster` that conflicts with `candidate`. The candidate's own id is skipped so a
/// shift being moved doesn't collide with its old position.
pub fn find_conflict<'a, Tz: TimeZone>(
    roster: &'a [Shift],
    candidate: ShiftSpan<'_>,
    tz: &Tz,
) -> Option<&'a Shift> {
    roster
        .iter()
        .filter(|v| candidate.id != Some(v.id.as_str()))
        .find(|v| spans_conflict(ShiftSpan::from(*v), candidate, tz))
}

pub fn ensure_no_conflict<Tz: TimeZone>(
    roster: &[Shift],
    candidate: ShiftSpan<'_>,
    tz: &Tz,
) -> Result<()> {
    match find_conflict(roster, candidate, tz) {
        Some(existing) => Err(TimekeepingError::ShiftConflict {
            existing: existing.id.clone(),
        }),
        None => Ok(()),
    }
}

/// Every conflicting pair in a roster, in roster order.
pub fn conflicting_pairs<'a, Tz: TimeZone>(
    roster: &'a [Shift],
    tz: &Tz,
) -> Vec<(&'a Shift, &'a Shift)> {
    let mut pairs = vec![];
    for (index, a) in roster.iter().enumerate() {
        for b in &roster[index + 1..] {
            if a.id != b.id && spans_conflict(a.into(), b.into(), tz) {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

/// Writes shifts to the backend after checking a freshly fetched roster for double booking. The
/// backend stays the final judge: a concurrent edit can still make the write fail.
pub struct ShiftPlanner<Tz: TimeZone> {
    api: Arc<dyn TimekeepingApi>,
    tz: Tz,
}

impl<Tz: TimeZone> ShiftPlanner<Tz> {
    pub fn new(api: Arc<dyn TimekeepingApi>, tz: Tz) -> Self {
        Self { api, tz }
    }

    async fn roster_for(&self, span: ShiftSpan<'_>) -> Result<Vec<Shift>> {
        if span.start_time >= span.end_time {
            return Err(TimekeepingError::InvalidState(format!(
                "Shift must end after it starts ({} - {})",
                span.start_time, span.end_time
            )));
        }
        let date = local_date(span.start_time, &self.tz);
        self.api
            .list_shifts(ShiftQuery {
                employee: Some(span.employee_id.to_string()),
                start_date: Some(date),
                end_date: Some(date),
                ..Default::default()
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn create_shift(&self, draft: ShiftDraft) -> Result<Shift> {
        let roster = self.roster_for((&draft).into()).await?;
        ensure_no_conflict(&roster, (&draft).into(), &self.tz).inspect_err(|e| warn!("{e}"))?;
        let shift = self.api.create_shift(draft).await?;
        info!("Created shift {}", shift.id);
        Ok(shift)
    }

    #[instrument(skip(self, shift), fields(shift = %shift.id))]
    pub async fn move_shift(
        &self,
        shift: &Shift,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Shift> {
        let span = ShiftSpan {
            start_time,
            end_time,
            ..shift.into()
        };
        let roster = self.roster_for(span).await?;
        ensure_no_conflict(&roster, span, &self.tz).inspect_err(|e| warn!("{e}"))?;
        let moved = self
            .api
            .update_shift(&shift.id, ShiftUpdate::reschedule(start_time, end_time))
            .await?;
        info!("Moved shift to {} - {}", moved.start_time, moved.end_time);
        Ok(moved)
    }
}
