use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    api::entities::{Shift, ShiftDraft, ShiftStatus},
    error::{Result, TimekeepingError},
    utils::time::{local_date, local_instant},
};

/// A named hour range on the schedule grid. `end_hour < start_hour` marks an overnight slot
/// such as 22-6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    pub name: String,
    #[serde(alias = "start_hour")]
    pub start_hour: u32,
    #[serde(alias = "end_hour")]
    pub end_hour: u32,
}

impl Slot {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start_hour: u32,
        end_hour: u32,
    ) -> Result<Self> {
        let slot = Self {
            id: id.into(),
            name: name.into(),
            start_hour,
            end_hour,
        };
        slot.validate()?;
        Ok(slot)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(TimekeepingError::InvalidSlot(format!(
                "{}: hours must be within 0-23, got {}-{}",
                self.name, self.start_hour, self.end_hour
            )));
        }
        if self.start_hour == self.end_hour {
            return Err(TimekeepingError::InvalidSlot(format!(
                "{}: start and end hour are both {}",
                self.name, self.start_hour
            )));
        }
        Ok(())
    }

    pub fn is_overnight(&self) -> bool {
        self.end_hour < self.start_hour
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.is_overnight() {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            self.start_hour <= hour && hour < self.end_hour
        }
    }

    /// Absolute start and end of the slot when used on `day`. Overnight slots end on the next day.
    pub fn interval_on<Tz: TimeZone>(
        &self,
        day: NaiveDate,
        tz: &Tz,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let end_day = if self.is_overnight() {
            day + Duration::days(1)
        } else {
            day
        };
        let start = self.at_hour(day, self.start_hour, tz)?;
        let end = self.at_hour(end_day, self.end_hour, tz)?;
        Ok((start, end))
    }

    fn at_hour<Tz: TimeZone>(&self, day: NaiveDate, hour: u32, tz: &Tz) -> Result<DateTime<Utc>> {
        NaiveTime::from_hms_opt(hour, 0, 0)
            .and_then(|time| local_instant(day, time, tz))
            .ok_or_else(|| {
                TimekeepingError::InvalidSlot(format!(
                    "{}: {hour}:00 doesn't exist on {day}",
                    self.name
                ))
            })
    }

    /// Builds a scheduled shift for an employee covering this slot on `day`.
    pub fn draft_for<Tz: TimeZone>(
        &self,
        employee_id: &str,
        company_id: &str,
        department_id: Option<&str>,
        day: NaiveDate,
        tz: &Tz,
    ) -> Result<ShiftDraft> {
        let (start_time, end_time) = self.interval_on(day, tz)?;
        Ok(ShiftDraft {
            employee_id: employee_id.to_string(),
            company_id: company_id.to_string(),
            department_id: department_id.map(str::to_string),
            start_time,
            end_time,
            status: ShiftStatus::Scheduled,
        })
    }
}

/// Parses and validates a JSON array of slots.
pub fn parse_slots(json: &str) -> Result<Vec<Slot>> {
    let slots = serde_json::from_str::<Vec<Slot>>(json)
        .map_err(|e| TimekeepingError::InvalidSlot(e.to_string()))?;
    for slot in &slots {
        slot.validate()?;
    }
    Ok(slots)
}

fn slot_index(slots: &[Slot], hour: u32) -> Option<usize> {
    slots.iter().position(|v| v.contains_hour(hour))
}

/// First slot containing `hour`. Slot definitions are expected not to overlap.
pub fn slot_for_hour(slots: &[Slot], hour: u32) -> Option<&Slot> {
    slot_index(slots, hour).map(|index| &slots[index])
}

/// Slot of a shift, by the local hour the shift starts at.
pub fn assign_slot<'a, Tz: TimeZone>(
    slots: &'a [Slot],
    shift: &Shift,
    tz: &Tz,
) -> Option<&'a Slot> {
    slot_for_hour(slots, shift.start_time.with_timezone(tz).hour())
}

#[derive(Debug, PartialEq)]
pub struct SlotRow<'a> {
    pub slot: &'a Slot,
    pub shifts: Vec<&'a Shift>,
}

/// Shifts starting on one day, laid out in slot order.
#[derive(Debug, PartialEq)]
pub struct SlotGrid<'a> {
    pub date: NaiveDate,
    pub rows: Vec<SlotRow<'a>>,
    /// Shifts whose start hour isn't covered by any slot.
    pub unassigned: Vec<&'a Shift>,
}

impl<'a> SlotGrid<'a> {
    pub fn build<Tz: TimeZone>(
        slots: &'a [Slot],
        shifts: &'a [Shift],
        date: NaiveDate,
        tz: &Tz,
    ) -> Self {
        let mut rows = slots
            .iter()
            .map(|slot| SlotRow {
                slot,
                shifts: vec![],
            })
            .collect::<Vec<_>>();
        let mut unassigned = vec![];

        let mut day_shifts = shifts
            .iter()
            .filter(|v| local_date(v.start_time, tz) == date)
            .collect::<Vec<_>>();
        day_shifts.sort_by_key(|v| v.start_time);

        for shift in day_shifts {
            match slot_index(slots, shift.start_time.with_timezone(tz).hour()) {
                Some(index) => rows[index].shifts.push(shift),
                None => unassigned.push(shift),
            }
        }

        Self {
            date,
            rows,
            unassigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

    use super::{assign_slot, parse_slots, slot_for_hour, Slot, SlotGrid};
    use crate::api::entities::{Shift, ShiftStatus};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_DATE.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()))
    }

    fn day_slots() -> Vec<Slot> {
        vec![
            Slot::new("m", "Morning", 6, 14).unwrap(),
            Slot::new("a", "Afternoon", 14, 22).unwrap(),
            Slot::new("n", "Night", 22, 6).unwrap(),
        ]
    }

    fn shift(id: &str, start: DateTime<Utc>) -> Shift {
        Shift {
            id: id.into(),
            employee_id: "e1".into(),
            company_id: "c1".into(),
            department_id: None,
            start_time: start,
            end_time: start + Duration::hours(4),
            status: ShiftStatus::Scheduled,
            is_missed: false,
            missed_at: None,
            created_at: start - Duration::days(3),
        }
    }

    #[test]
    fn overnight_slot_wraps_midnight() {
        let night = Slot::new("n", "Night", 22, 6).unwrap();
        assert!(night.contains_hour(23));
        assert!(night.contains_hour(2));
        assert!(night.contains_hour(22));
        assert!(!night.contains_hour(6));
        assert!(!night.contains_hour(10));
    }

    #[test]
    fn every_hour_has_exactly_one_slot() {
        let slots = day_slots();
        for hour in 0..24 {
            let matching = slots.iter().filter(|v| v.contains_hour(hour)).count();
            assert_eq!(matching, 1, "hour {hour}");
            assert!(slot_for_hour(&slots, hour).is_some());
        }
    }

    #[test]
    fn invalid_slots_are_rejected() {
        assert!(Slot::new("x", "Empty", 8, 8).is_err());
        assert!(Slot::new("x", "Too late", 20, 24).is_err());
        assert!(
            parse_slots(r#"[{"id": "x", "name": "Bad", "startHour": 3, "endHour": 3}]"#).is_err()
        );
    }

    #[test]
    fn parses_both_key_styles() {
        let slots = parse_slots(
            r#"[
                {"id": "m", "name": "Morning", "startHour": 6, "endHour": 14},
                {"id": "n", "name": "Night", "start_hour": 22, "end_hour": 6}
            ]"#,
        )
        .unwrap();
        assert_eq!(slots[1], Slot::new("n", "Night", 22, 6).unwrap());
    }

    #[test]
    fn overnight_shift_ends_next_day() {
        let night = Slot::new("n", "Night", 22, 6).unwrap();
        let draft = night.draft_for("e1", "c1", None, TEST_DATE, &Utc).unwrap();
        assert_eq!(draft.start_time, at(22));
        assert_eq!(draft.end_time, at(6) + Duration::days(1));
        assert!(draft.start_time < draft.end_time);

        let morning = Slot::new("m", "Morning", 6, 14).unwrap();
        let (start, end) = morning.interval_on(TEST_DATE, &Utc).unwrap();
        assert_eq!((start, end), (at(6), at(14)));
    }

    #[test]
    fn assignment_uses_local_hour() {
        let slots = day_slots();
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 12:00 UTC is 14:00 in UTC+2
        assert_eq!(assign_slot(&slots, &shift("s", at(12)), &tz).unwrap().id, "a");
        assert_eq!(assign_slot(&slots, &shift("s", at(12)), &Utc).unwrap().id, "m");
    }

    #[test]
    fn grid_places_shifts_by_start_hour() {
        let slots = vec![
            Slot::new("m", "Morning", 6, 14).unwrap(),
            Slot::new("n", "Night", 22, 6).unwrap(),
        ];
        let shifts = vec![
            shift("late", at(23)),
            shift("early", at(2)),
            shift("day", at(10)),
            shift("evening", at(17)),
            shift("tomorrow", at(8) + Duration::days(1)),
        ];
        let grid = SlotGrid::build(&slots, &shifts, TEST_DATE, &Utc);

        let ids = |row: usize| {
            grid.rows[row]
                .shifts
                .iter()
                .map(|v| v.id.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(0), vec!["day"]);
        assert_eq!(ids(1), vec!["early", "late"]);
        assert_eq!(
            grid.unassigned.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
            vec!["evening"]
        );
    }
}
