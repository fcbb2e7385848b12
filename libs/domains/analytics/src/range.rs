//! Time windows and the period shorthand used by dashboard queries.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Inclusive UTC time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AnalyticsResult<Self> {
        if start > end {
            return Err(AnalyticsError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` days up to and including `now`
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Number of calendar days the window touches, at least one
    pub fn day_span(&self) -> i64 {
        let days = (self.end.date_naive() - self.start.date_naive()).num_days() + 1;
        days.max(1)
    }

    /// First and second half. The midpoint belongs to the second half.
    pub fn halves(&self) -> (DateRange, DateRange) {
        let mid = self.start + self.duration() / 2;
        let first_end = (mid - Duration::milliseconds(1)).max(self.start);
        (
            DateRange {
                start: self.start,
                end: first_end,
            },
            DateRange {
                start: mid,
                end: self.end,
            },
        )
    }

    /// Whole UTC day `date`, ending at `23:59:59.999`
    pub fn utc_day(date: NaiveDate) -> Self {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(1) - Duration::milliseconds(1),
        }
    }
}

/// Dashboard period shorthand: `7d`, `30d`, `90d`, `1y`, or any `<n>d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    days: i64,
}

impl Period {
    pub const DEFAULT: Period = Period { days: 7 };

    pub fn days(&self) -> i64 {
        self.days
    }

    pub fn ending_at(&self, now: DateTime<Utc>) -> DateRange {
        DateRange::last_days(now, self.days)
    }
}

impl Default for Period {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Period {
    type Err = AnalyticsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim().to_ascii_lowercase();
        let invalid = || AnalyticsError::InvalidPeriod(raw.clone());

        let days = if raw == "1y" {
            365
        } else if let Some(n) = raw.strip_suffix('d') {
            n.parse::<i64>().map_err(|_| invalid())?
        } else {
            return Err(invalid());
        };

        if !(1..=730).contains(&days) {
            return Err(invalid());
        }
        Ok(Period { days })
    }
}

/// Resolve the query window: explicit `start`+`end` win over `period`;
/// with neither the default period applies.
pub fn resolve_window(
    period: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AnalyticsResult<DateRange> {
    match (start, end) {
        (Some(start), Some(end)) => DateRange::new(start, end),
        (None, None) => {
            let period = period.map(str::parse::<Period>).transpose()?.unwrap_or_default();
            Ok(period.ending_at(now))
        }
        _ => Err(AnalyticsError::InvalidWindow(
            "start and end must be given together".into(),
        )),
    }
}
