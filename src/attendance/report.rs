use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::{instrument, trace};

use crate::{
    api::entities::TimeClockRecord,
    error::{Result, TimekeepingError},
    utils::time::{day_window, local_date, week_start, whole_seconds},
};

/// Worked and break seconds of a single record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordTotals {
    pub worked_seconds: i64,
    pub break_seconds: i64,
}

/// All records of one calendar date merged together.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    /// Earliest clock in of the day.
    pub clock_in: DateTime<Utc>,
    /// Latest observed clock out.
    pub clock_out: Option<DateTime<Utc>>,
    /// At least one record of the day is still running.
    pub open: bool,
    pub records: usize,
    pub worked_seconds: i64,
    pub break_seconds: i64,
}

impl DayBucket {
    fn new(date: NaiveDate, record: &TimeClockRecord) -> Self {
        Self {
            date,
            clock_in: record.clock_in,
            clock_out: None,
            open: false,
            records: 0,
            worked_seconds: 0,
            break_seconds: 0,
        }
    }

    fn add(&mut self, record: &TimeClockRecord, totals: RecordTotals) {
        self.clock_in = self.clock_in.min(record.clock_in);
        self.clock_out = match (self.clock_out, record.clock_out) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.open |= record.is_open();
        self.records += 1;
        self.worked_seconds = self.worked_seconds.saturating_add(totals.worked_seconds);
        self.break_seconds = self.break_seconds.saturating_add(totals.break_seconds);
    }
}

/// Totals for a report window. Created for one report and thrown away afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub worked_seconds: i64,
    pub break_seconds: i64,
    /// One entry per date that has records, in date order.
    pub days: Vec<DayBucket>,
}

/// Worked and break seconds of one record. Open records and running breaks count up to `now`.
pub fn record_totals(record: &TimeClockRecord, now: DateTime<Utc>) -> RecordTotals {
    let break_seconds = match (record.break_start, record.break_end) {
        (Some(start), Some(end)) if end >= start => whole_seconds(start, end),
        // A break left running on a closed record can't outlast the record.
        (Some(start), _) => whole_seconds(start, record.clock_out.unwrap_or(now)).max(0),
        (None, _) => 0,
    };
    let worked_seconds = match record.authoritative_hours() {
        // Backend rounding and rate rules take precedence over local math.
        Some(hours) => (hours * 3600.).round() as i64,
        None => {
            (whole_seconds(record.clock_in, record.clock_out.unwrap_or(now)) - break_seconds)
                .max(0)
        }
    };
    RecordTotals {
        worked_seconds,
        break_seconds,
    }
}

/// Turns time clock records into daily and weekly totals. Open records keep accruing up to `now`.
pub struct AttendanceReportAggregator<Tz: TimeZone> {
    tz: Tz,
}

impl<Tz: TimeZone> AttendanceReportAggregator<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Totals for every record whose clock in falls on `date`.
    #[instrument(skip(self, records))]
    pub fn daily(
        &self,
        records: &[TimeClockRecord],
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AttendanceSummary> {
        self.summarize(records, date, date, now)
    }

    /// Totals for the Monday to Sunday week containing `date`.
    #[instrument(skip(self, records))]
    pub fn weekly(
        &self,
        records: &[TimeClockRecord],
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AttendanceSummary> {
        let monday = week_start(date);
        self.summarize(records, monday, monday + Duration::days(6), now)
    }

    fn summarize(
        &self,
        records: &[TimeClockRecord],
        from: NaiveDate,
        to: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AttendanceSummary> {
        let (start, _) = day_window(from, &self.tz).ok_or_else(|| bad_day(from))?;
        let (_, end) = day_window(to, &self.tz).ok_or_else(|| bad_day(to))?;

        let mut buckets = BTreeMap::<NaiveDate, DayBucket>::new();
        for record in records
            .iter()
            .filter(|v| v.clock_in >= start && v.clock_in < end)
        {
            let totals = record_totals(record, now);
            let date = local_date(record.clock_in, &self.tz);
            trace!("Record {} on {date}: {totals:?}", record.id);
            buckets
                .entry(date)
                .or_insert_with(|| DayBucket::new(date, record))
                .add(record, totals);
        }

        let days = buckets.into_values().collect::<Vec<_>>();
        Ok(AttendanceSummary {
            from,
            to,
            worked_seconds: days
                .iter()
                .fold(0, |acc, v| acc.saturating_add(v.worked_seconds)),
            break_seconds: days
                .iter()
                .fold(0, |acc, v| acc.saturating_add(v.break_seconds)),
            days,
        })
    }
}

fn bad_day(date: NaiveDate) -> TimekeepingError {
    TimekeepingError::InvalidState(format!("{date} has no representable start"))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

    use super::{record_totals, AttendanceReportAggregator, RecordTotals};
    use crate::api::entities::TimeClockRecord;

    // Friday
    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &TEST_DATE.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap()),
        )
    }

    fn record(
        id: &str,
        clock_in: DateTime<Utc>,
        clock_out: Option<DateTime<Utc>>,
    ) -> TimeClockRecord {
        TimeClockRecord {
            id: id.into(),
            employee_id: "e1".into(),
            shift_id: None,
            clock_in,
            clock_out,
            break_start: None,
            break_end: None,
            total_hours: None,
        }
    }

    fn with_lunch(mut record: TimeClockRecord) -> TimeClockRecord {
        record.break_start = Some(at(12, 0));
        record.break_end = Some(at(12, 30));
        record
    }

    type Aggregator = AttendanceReportAggregator<Utc>;

    #[test]
    fn closed_record_with_break() {
        let r = with_lunch(record("a", at(8, 0), Some(at(16, 0))));
        assert_eq!(
            record_totals(&r, at(20, 0)),
            RecordTotals {
                worked_seconds: 27000,
                break_seconds: 1800
            }
        );
    }

    #[test]
    fn open_record_accrues_until_now() {
        let r = with_lunch(record("a", at(8, 0), None));
        assert_eq!(record_totals(&r, at(14, 0)).worked_seconds, 19800);

        let running = record("b", at(8, 0), None);
        assert_eq!(record_totals(&running, at(9, 0)).worked_seconds, 3600);
    }

    #[test]
    fn running_break_counts_until_now() {
        let mut r = record("a", at(8, 0), None);
        r.break_start = Some(at(12, 0));
        let totals = record_totals(&r, at(12, 20));
        assert_eq!(totals.break_seconds, 1200);
        assert_eq!(totals.worked_seconds, 4 * 3600);
    }

    #[test]
    fn absurd_backend_hours_fall_back_to_timestamps() {
        let mut records = vec![
            with_lunch(record("a", at(8, 0), Some(at(16, 0)))),
            record("b", at(17, 0), Some(at(18, 0))),
            record("c", at(19, 0), None),
        ];
        records[0].total_hours = Some(1e300);
        records[1].total_hours = Some(f64::INFINITY);
        records[2].total_hours = Some(f64::NAN);

        let summary = Aggregator::new(Utc)
            .daily(&records, TEST_DATE, at(20, 0))
            .unwrap();
        assert_eq!(summary.worked_seconds, 27000 + 3600 + 3600);
        assert_eq!(summary.break_seconds, 1800);
    }

    #[test]
    fn backend_hours_win() {
        let mut r = with_lunch(record("a", at(8, 0), Some(at(16, 0))));
        r.total_hours = Some(7.25);
        assert_eq!(record_totals(&r, at(20, 0)).worked_seconds, 26100);

        r.total_hours = Some(0.);
        assert_eq!(record_totals(&r, at(20, 0)).worked_seconds, 27000);
    }

    #[test]
    fn closed_records_never_exceed_their_span() {
        let mut span_minutes = 1;
        while span_minutes < 16 * 60 {
            let clock_out = at(6, 0) + Duration::minutes(span_minutes);
            let mut r = record("a", at(6, 0), Some(clock_out));
            r.break_start = Some(at(6, 0) + Duration::minutes(span_minutes / 3));
            r.break_end = Some(at(6, 0) + Duration::minutes(span_minutes / 2));
            let totals = record_totals(&r, at(23, 0));
            assert_eq!(
                totals.worked_seconds + totals.break_seconds,
                span_minutes * 60,
                "{span_minutes}"
            );
            span_minutes += 37;
        }
    }

    #[test]
    fn daily_only_counts_that_day() {
        let records = vec![
            with_lunch(record("a", at(8, 0), Some(at(16, 0)))),
            record("b", at(17, 0), Some(at(18, 0))),
            record("c", at(8, 0) - Duration::days(1), Some(at(16, 0) - Duration::days(1))),
        ];
        let summary = Aggregator::new(Utc)
            .daily(&records, TEST_DATE, at(23, 0))
            .unwrap();
        assert_eq!(summary.worked_seconds, 27000 + 3600);
        assert_eq!(summary.break_seconds, 1800);
        assert_eq!(summary.days.len(), 1);
        assert_eq!(summary.days[0].records, 2);
        assert_eq!(summary.days[0].clock_out, Some(at(18, 0)));
    }

    #[test]
    fn daily_uses_local_calendar_day() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        // 22:00 UTC on the 4th is 01:00 on the 5th in UTC+3
        let records = vec![record("a", at(22, 0) - Duration::days(1), Some(at(2, 0)))];
        let summary = AttendanceReportAggregator::new(tz)
            .daily(&records, TEST_DATE, at(23, 0))
            .unwrap();
        assert_eq!(summary.worked_seconds, 4 * 3600);
    }

    #[test]
    fn weekly_buckets_by_date() {
        let monday = TEST_DATE - Duration::days(4);
        let sunday = TEST_DATE + Duration::days(2);
        let on = |date: NaiveDate, hour: u32| {
            Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()))
        };
        let records = vec![
            record("mon", on(monday, 8), Some(on(monday, 12))),
            record("fri-1", at(8, 0), Some(at(12, 0))),
            record("fri-2", at(13, 0), None),
            record("sun", on(sunday, 10), Some(on(sunday, 11))),
            record(
                "next-mon",
                on(sunday + Duration::days(1), 8),
                Some(on(sunday + Duration::days(1), 9)),
            ),
        ];
        let summary = Aggregator::new(Utc)
            .weekly(&records, TEST_DATE, at(15, 0))
            .unwrap();

        assert_eq!(summary.from, monday);
        assert_eq!(summary.to, sunday);
        assert_eq!(
            summary.days.iter().map(|v| v.date).collect::<Vec<_>>(),
            vec![monday, TEST_DATE, sunday]
        );
        let friday = &summary.days[1];
        assert_eq!(friday.records, 2);
        assert_eq!(friday.clock_in, at(8, 0));
        assert_eq!(friday.clock_out, Some(at(12, 0)));
        assert!(friday.open);
        assert_eq!(friday.worked_seconds, 4 * 3600 + 2 * 3600);
        assert_eq!(summary.worked_seconds, 4 * 3600 + 6 * 3600 + 3600);
    }
}
