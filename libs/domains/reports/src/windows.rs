//! Historical windows for the report cadences, evaluated in the configured
//! region.
//!
//! Each window starts at local midnight and ends at the last millisecond
//! before the following local midnight, converted back to UTC. Days across a
//! DST change are 23 or 25 hours long.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use domain_analytics::DateRange;

fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    // Zones that move their clocks at midnight skip it; the day then starts
    // at the end of the gap
    (0..=2)
        .find_map(|hours| tz.from_local_datetime(&(midnight + Duration::hours(hours))).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

fn local_days(first: NaiveDate, last: NaiveDate, tz: Tz) -> DateRange {
    let start = local_midnight(first, tz);
    let end = local_midnight(last + Duration::days(1), tz) - Duration::milliseconds(1);
    DateRange { start, end }
}

fn local_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// The previous local day
pub fn daily_window(now: DateTime<Utc>, tz: Tz) -> DateRange {
    let yesterday = local_today(now, tz) - Duration::days(1);
    local_days(yesterday, yesterday, tz)
}

/// The 7 local days ending yesterday
pub fn weekly_window(now: DateTime<Utc>, tz: Tz) -> DateRange {
    let yesterday = local_today(now, tz) - Duration::days(1);
    local_days(yesterday - Duration::days(6), yesterday, tz)
}

/// The previous calendar month
pub fn monthly_window(now: DateTime<Utc>, tz: Tz) -> DateRange {
    let today = local_today(now, tz);
    let first_this_month = today - Duration::days(today.day0() as i64);
    let first_last_month = first_this_month - Months::new(1);
    local_days(first_last_month, first_this_month - Duration::days(1), tz)
}
