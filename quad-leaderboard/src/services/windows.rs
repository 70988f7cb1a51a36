use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::Cadence;

/// Half-open `[start, end)` span of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Calendar date on campus at `now`.
pub fn local_date(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    (now.naive_utc() + Duration::minutes(utc_offset_minutes as i64)).date()
}

fn local_midnight(date: NaiveDate, utc_offset_minutes: i32) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - Duration::minutes(utc_offset_minutes as i64)))
}

/// The local calendar day containing `now`.
pub fn daily(now: DateTime<Utc>, utc_offset_minutes: i32) -> Window {
    let today = local_date(now, utc_offset_minutes);
    let start = local_midnight(today, utc_offset_minutes);
    Window { start, end: start + Duration::days(1) }
}

/// Monday 00:00 local up to the following Monday.
pub fn weekly(now: DateTime<Utc>, utc_offset_minutes: i32) -> Window {
    let today = local_date(now, utc_offset_minutes);
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let start = local_midnight(monday, utc_offset_minutes);
    Window { start, end: start + Duration::days(7) }
}

pub fn for_cadence(cadence: Cadence, now: DateTime<Utc>, utc_offset_minutes: i32) -> Window {
    match cadence {
        Cadence::Daily => daily(now, utc_offset_minutes),
        Cadence::Weekly => weekly(now, utc_offset_minutes),
    }
}
