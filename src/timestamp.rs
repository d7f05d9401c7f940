use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::{Captures, Regex};

use crate::error::{AppError, Result};

#[allow(clippy::expect_used)]
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([A-Z0-9]+)>").expect("mention pattern is valid"));

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Unix seconds of local midnight at the start of `date`.
pub fn local_midnight_secs(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    resolve_local(midnight)
        // Midnight can fall in a DST gap in a few zones; 01:00 always exists there.
        .or_else(|| resolve_local(midnight + chrono::Duration::hours(1)))
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&naive).earliest()
}

/// Slack `ts` string ("<secs>.000000") for local midnight of `date`.
pub fn date_to_slack_ts(date: NaiveDate) -> String {
    format!("{}.000000", local_midnight_secs(date))
}

/// Converts an optional `YYYY-MM-DD` bound into a Slack `ts` string.
pub fn date_str_to_slack_ts(date: Option<&str>) -> Result<Option<String>> {
    match date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(date_to_slack_ts(parse_date(s)?))),
        None => Ok(None),
    }
}

pub fn slack_ts_to_datetime(ts: &str) -> Option<DateTime<Local>> {
    let value: f64 = ts.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let secs = value.floor() as i64;
    let nanos = ((value - value.floor()) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999)).map(|dt| dt.with_timezone(&Local))
}

/// Renders a Slack `ts` as local `YYYY-MM-DD HH:MM:SS`, or "" when absent or invalid.
pub fn format_slack_ts(ts: Option<&str>) -> String {
    ts.and_then(slack_ts_to_datetime)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Replaces `<@USERID>` mentions with `@Name` for every id present in `user_map`.
pub fn replace_mentions(text: &str, user_map: &HashMap<String, String>) -> String {
    MENTION_RE
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(id) => match user_map.get(id.as_str()) {
                Some(name) => format!("@{}", name),
                None => caps[0].to_string(),
            },
            None => caps[0].to_string(),
        })
        .into_owned()
}
