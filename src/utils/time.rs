use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Calendar date of an instant as seen in `tz`.
pub fn local_date<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Resolves a wall clock time on `date` in `tz` into an absolute instant. Ambiguous times pick the
/// earlier instant; times inside a DST gap are moved forward by an hour.
pub fn local_instant<Tz: TimeZone>(
    date: NaiveDate,
    time: NaiveTime,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::new(date, time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|v| v.with_timezone(&Utc))
}

/// Returns `[start, end)` of the calendar day in `tz`. End is the start of the next day, which
/// covers everything up to 23:59:59.999.
pub fn day_window<Tz: TimeZone>(
    date: NaiveDate,
    tz: &Tz,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_instant(date, NaiveTime::MIN, tz)?;
    let end = local_instant(date.succ_opt()?, NaiveTime::MIN, tz)?;
    Some((start, end))
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Whole seconds between two instants, rounded towards negative infinity.
pub fn whole_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(1000)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

    use super::{day_window, local_date, week_start, whole_seconds};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();

    #[test]
    fn week_starts_on_monday() {
        // 2024-04-05 is a Friday
        assert_eq!(week_start(TEST_DATE), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        let monday = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_eq!(week_start(monday), monday);
        let sunday = NaiveDate::from_ymd_opt(2024, 4, 7).unwrap();
        assert_eq!(week_start(sunday), monday);
    }

    #[test]
    fn day_window_respects_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let (start, end) = day_window(TEST_DATE, &tz).unwrap();
        assert_eq!(
            start,
            Utc.from_utc_datetime(
                &TEST_DATE
                    .pred_opt()
                    .unwrap()
                    .and_time(NaiveTime::from_hms_opt(22, 0, 0).unwrap())
            )
        );
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(local_date(start, &tz), TEST_DATE);
        assert_eq!(local_date(end - Duration::milliseconds(1), &tz), TEST_DATE);
    }

    #[test]
    fn whole_seconds_floors() {
        let start = Utc.from_utc_datetime(&TEST_DATE.and_time(NaiveTime::MIN));
        assert_eq!(whole_seconds(start, start + Duration::milliseconds(1999)), 1);
        assert_eq!(whole_seconds(start, start - Duration::milliseconds(1)), -1);
    }
}
