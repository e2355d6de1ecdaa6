use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Working-time record as the backend sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingTime {
    #[serde(deserialize_with = "crate::identity::id_from_string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "crate::identity::id_from_string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub break_start: Option<String>,
    #[serde(default)]
    pub break_end: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Active,
    Complete,
}

/// Client-side view of one working time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeLog {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub clock_in: Option<NaiveDateTime>,
    pub clock_out: Option<NaiveDateTime>,
    pub break_start: Option<NaiveDateTime>,
    pub break_end: Option<NaiveDateTime>,
    /// Complete whenever a clock-out exists, whatever the backend claims.
    pub status: LogStatus,
    pub total_hours: f64,
}

const STAMP_FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a backend timestamp into local wall-clock time. Zoned stamps are
/// converted; naive ones are taken as already local.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    STAMP_FORMATS.iter().find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// Stamp format sent to the backend (local time, no zone).
pub fn format_timestamp(t: NaiveDateTime) -> String { t.format("%Y-%m-%dT%H:%M:%S").to_string() }

fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Hours between two stamps, rounded to two decimals; zero unless both exist.
pub fn total_hours(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> f64 {
    match (start, end) {
        (Some(s), Some(e)) => {
            let hours = (e - s).num_seconds() as f64 / 3600.0;
            (hours * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}

impl TimeLog {
    /// `None` when no date can be derived from the record.
    pub fn from_working_time(wt: &WorkingTime) -> Option<TimeLog> {
        let clock_in = wt.start_time.as_deref().and_then(parse_timestamp);
        let clock_out = wt.end_time.as_deref().and_then(parse_timestamp);
        let date = wt
            .date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| clock_in.map(|t| t.date()))?;
        Some(TimeLog {
            id: wt.id.clone(),
            user_id: wt.user_id.clone(),
            date,
            clock_in,
            clock_out,
            break_start: wt.break_start.as_deref().and_then(parse_timestamp),
            break_end: wt.break_end.as_deref().and_then(parse_timestamp),
            status: if wt.end_time.is_some() { LogStatus::Complete } else { LogStatus::Active },
            total_hours: total_hours(clock_in, clock_out),
        })
    }

    pub fn is_active(&self) -> bool { self.status == LogStatus::Active }

    /// Clocked in and not yet out.
    pub fn is_open(&self) -> bool { self.is_active() && self.clock_in.is_some() && self.clock_out.is_none() }

    pub fn on_break(&self) -> bool { self.break_start.is_some() && self.break_end.is_none() }
}

pub fn week_start(today: NaiveDate) -> NaiveDate {
    let back = today.weekday().num_days_from_sunday() as u64;
    today.checked_sub_days(Days::new(back)).unwrap_or(today)
}

pub fn month_start(today: NaiveDate) -> NaiveDate { today.with_day(1).unwrap_or(today) }

/// The active log for `today` if any, else the most recently finished one.
pub fn todays_log<'a>(logs: &'a [TimeLog], user_id: &str, today: NaiveDate) -> Option<&'a TimeLog> {
    let todays: Vec<&TimeLog> = logs.iter().filter(|l| l.user_id == user_id && l.date == today).collect();
    if let Some(active) = todays.iter().find(|l| l.is_active()) {
        return Some(*active);
    }
    todays
        .iter()
        .filter(|l| l.status == LogStatus::Complete)
        .max_by_key(|l| l.clock_out.or(l.clock_in))
        .or_else(|| todays.first())
        .copied()
}

/// Hours logged by `user_id` on or after `since`, to one decimal.
pub fn hours_since(logs: &[TimeLog], user_id: &str, since: NaiveDate) -> f64 {
    let sum: f64 = logs
        .iter()
        .filter(|l| l.user_id == user_id && l.date >= since && l.total_hours > 0.0)
        .map(|l| l.total_hours)
        .sum();
    (sum * 10.0).round() / 10.0
}

/// Logs of the last seven days, newest first, at most seven.
pub fn recent_logs(logs: &[TimeLog], user_id: &str, today: NaiveDate) -> Vec<TimeLog> {
    let cutoff = today.checked_sub_days(Days::new(7)).unwrap_or(today);
    let mut out: Vec<TimeLog> = logs
        .iter()
        .filter(|l| l.user_id == user_id && l.date >= cutoff)
        .cloned()
        .collect();
    out.sort_by(|a, b| b.date.cmp(&a.date).then(b.clock_in.cmp(&a.clock_in)));
    out.truncate(7);
    out
}
