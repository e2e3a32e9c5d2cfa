use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::AppError;

/// Field names accepted when building an outage from a key-value source.
pub const OUTAGE_FIELDS: [&str; 11] = [
    "id",
    "autostart",
    "warntime",
    "starttime",
    "stoptime",
    "finished",
    "title",
    "description",
    "createdby",
    "modifiedby",
    "lastmodified",
];

/// One scheduled maintenance window.
///
/// Notes:
/// - All timestamps are Unix seconds.
/// - `Outage::default()` is the canonical empty outage: every field is `None`.
/// - `warntime <= starttime <= stoptime` is expected but not enforced here; every predicate
///   below tolerates violations and missing values (a comparison with a missing value is false).
/// - Windows are half-open: the outage is ongoing on `[starttime, stoptime)`, cut short at
///   `finished` when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outage {
    pub id: Option<i64>,
    pub autostart: Option<bool>,
    pub warntime: Option<i64>,
    pub starttime: Option<i64>,
    pub stoptime: Option<i64>,
    pub finished: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub createdby: Option<i64>,
    pub modifiedby: Option<i64>,
    pub lastmodified: Option<i64>,
}

/// Lifecycle classification of an outage at a point in time. Derived, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Waiting,
    Warning,
    Ongoing,
    Stopped,
    Finished,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Waiting => "WAITING",
            Stage::Warning => "WARNING",
            Stage::Ongoing => "ONGOING",
            Stage::Stopped => "STOPPED",
            Stage::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

fn take_i64(field: &str, value: &Value) -> Result<Option<i64>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| {
            AppError::invalid_input(format!("Field {field} must be an integer"))
                .with_details(format!("value={n}"))
        }),
        other => Err(
            AppError::invalid_input(format!("Field {field} must be an integer"))
                .with_details(format!("value={other}")),
        ),
    }
}

fn take_bool(field: &str, value: &Value) -> Result<Option<bool>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        // Stored records carry the flag as 0/1.
        Value::Number(n) if n.as_i64() == Some(0) => Ok(Some(false)),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(Some(true)),
        other => Err(
            AppError::invalid_input(format!("Field {field} must be a boolean"))
                .with_details(format!("value={other}")),
        ),
    }
}

fn take_string(field: &str, value: &Value) -> Result<Option<String>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(
            AppError::invalid_input(format!("Field {field} must be a string"))
                .with_details(format!("value={other}")),
        ),
    }
}

impl Outage {
    /// Build an outage from a key-value source.
    ///
    /// `null` yields the empty outage. Objects may supply any subset of [`OUTAGE_FIELDS`];
    /// unknown keys fail with `CONFIGURATION`, any other JSON shape with `INVALID_INPUT`.
    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_map(map),
            other => Err(AppError::invalid_input(
                "Outage data must be an object or null",
            )
            .with_details(format!("value={other}"))),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, AppError> {
        let mut unknown: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !OUTAGE_FIELDS.contains(k))
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(AppError::configuration("Unknown outage field(s)")
                .with_details(unknown.join(", ")));
        }

        let mut outage = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "id" => outage.id = take_i64(key, value)?,
                "autostart" => outage.autostart = take_bool(key, value)?,
                "warntime" => outage.warntime = take_i64(key, value)?,
                "starttime" => outage.starttime = take_i64(key, value)?,
                "stoptime" => outage.stoptime = take_i64(key, value)?,
                "finished" => outage.finished = take_i64(key, value)?,
                "title" => outage.title = take_string(key, value)?,
                "description" => outage.description = take_string(key, value)?,
                "createdby" => outage.createdby = take_i64(key, value)?,
                "modifiedby" => outage.modifiedby = take_i64(key, value)?,
                "lastmodified" => outage.lastmodified = take_i64(key, value)?,
                _ => {}
            }
        }
        Ok(outage)
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Title with `{{start}}`, `{{stop}}` and `{{duration}}` substituted.
    pub fn title(&self) -> String {
        self.substitute(self.title.as_deref().unwrap_or_default())
    }

    /// Description with `{{start}}`, `{{stop}}` and `{{duration}}` substituted.
    pub fn description(&self) -> String {
        self.substitute(self.description.as_deref().unwrap_or_default())
    }

    fn substitute(&self, text: &str) -> String {
        let start = self.starttime.map(format_timestamp).unwrap_or_default();
        let stop = self.stoptime.map(format_timestamp).unwrap_or_default();
        let duration = self.duration_planned().map(format_duration).unwrap_or_default();
        text.replace("{{start}}", &start)
            .replace("{{stop}}", &stop)
            .replace("{{duration}}", &duration)
    }

    /// `None` when either end is unset or the difference does not fit in an `i64`.
    pub fn warning_duration(&self) -> Option<i64> {
        self.starttime?.checked_sub(self.warntime?)
    }

    pub fn duration_planned(&self) -> Option<i64> {
        self.stoptime?.checked_sub(self.starttime?)
    }

    /// `None` until the outage has been finished.
    pub fn duration_actual(&self) -> Option<i64> {
        self.finished?.checked_sub(self.starttime?)
    }

    pub fn is_autostart(&self) -> bool {
        self.autostart.unwrap_or(false)
    }

    fn finished_by(&self, time: i64) -> bool {
        matches!(self.finished, Some(f) if f <= time)
    }

    pub fn is_ongoing(&self, time: i64) -> bool {
        let (Some(start), Some(stop)) = (self.starttime, self.stoptime) else {
            return false;
        };
        start <= time && time < stop && !self.finished_by(time)
    }

    /// Warning period or ongoing, whichever applies.
    pub fn is_active(&self, time: i64) -> bool {
        if self.is_ongoing(time) {
            return true;
        }
        let (Some(warn), Some(start)) = (self.warntime, self.starttime) else {
            return false;
        };
        warn <= time && time < start && !self.has_ended(time)
    }

    pub fn has_ended(&self, time: i64) -> bool {
        matches!(self.stoptime, Some(stop) if stop <= time) || self.finished_by(time)
    }
}

/// Format a Unix timestamp as `YYYY-MM-DD HH:MM UTC`.
pub fn format_timestamp(ts: i64) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute] UTC");
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(&fmt).ok())
        .unwrap_or_else(|| ts.to_string())
}

/// Human readable duration, e.g. `1 day 2 hours 5 mins`.
pub fn format_duration(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let mut rem = secs.unsigned_abs();
    let mut parts = Vec::new();
    for (unit, one, many) in [
        (86_400, "day", "days"),
        (3_600, "hour", "hours"),
        (60, "min", "mins"),
        (1, "sec", "secs"),
    ] {
        let n = rem / unit;
        rem %= unit;
        if n > 0 {
            parts.push(format!("{n} {}", if n == 1 { one } else { many }));
        }
    }
    if parts.is_empty() {
        return "0 secs".to_string();
    }
    format!("{sign}{}", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window(warn: i64, start: i64, stop: i64) -> Outage {
        Outage {
            warntime: Some(warn),
            starttime: Some(start),
            stoptime: Some(stop),
            ..Outage::default()
        }
    }

    #[test]
    fn empty_outage_has_every_field_unset() {
        let o = Outage::default();
        assert!(o.is_empty());
        assert_eq!(o.id, None);
        assert_eq!(Outage::from_value(&Value::Null).unwrap(), o);
        assert_eq!(Outage::from_value(&json!({})).unwrap(), o);
    }

    #[test]
    fn from_value_rejects_unknown_fields_and_bad_shapes() {
        let err = Outage::from_value(&json!({"starttime": 10, "colour": "red"})).unwrap_err();
        assert_eq!(err.code, "CONFIGURATION");
        assert_eq!(err.details.as_deref(), Some("colour"));

        let err = Outage::from_value(&json!([1, 2])).unwrap_err();
        assert_eq!(err.code, "INVALID_INPUT");

        let err = Outage::from_value(&json!({"starttime": "soon"})).unwrap_err();
        assert_eq!(err.code, "INVALID_INPUT");
    }

    #[test]
    fn from_value_accepts_stored_autostart_flag() {
        let o = Outage::from_value(&json!({"autostart": 1, "title": "t"})).unwrap();
        assert_eq!(o.autostart, Some(true));
        assert_eq!(o.title.as_deref(), Some("t"));
    }

    #[test]
    fn durations() {
        let mut o = window(100, 200, 500);
        assert_eq!(o.warning_duration(), Some(100));
        assert_eq!(o.duration_planned(), Some(300));
        assert_eq!(o.duration_actual(), None);
        o.finished = Some(260);
        assert_eq!(o.duration_actual(), Some(60));
        assert_eq!(Outage::default().duration_planned(), None);
    }

    #[test]
    fn predicates_follow_half_open_windows() {
        let o = window(100, 200, 300);
        assert!(!o.is_active(99));
        assert!(o.is_active(100));
        assert!(!o.is_ongoing(199));
        assert!(o.is_ongoing(200));
        assert!(o.is_ongoing(299));
        assert!(!o.is_ongoing(300));
        assert!(o.has_ended(300));
        assert!(!o.has_ended(299));
    }

    #[test]
    fn finished_cuts_the_window_short() {
        let mut o = window(100, 200, 300);
        o.finished = Some(250);
        assert!(o.is_ongoing(249));
        assert!(!o.is_ongoing(250));
        assert!(!o.is_active(250));
        assert!(o.has_ended(250));

        // Finished before it even started.
        o.finished = Some(150);
        assert!(!o.is_active(160));
        assert!(o.has_ended(160));
    }

    #[test]
    fn inverted_windows_do_not_panic() {
        let o = window(300, 200, 100);
        for t in [50, 150, 250, 350] {
            assert!(!o.is_ongoing(t));
            assert!(!o.is_active(t));
        }
        assert!(o.has_ended(150));
    }

    #[test]
    fn extreme_timestamps_yield_no_duration() {
        let o = Outage::from_value(&json!({
            "warntime": i64::MIN,
            "starttime": 10,
            "stoptime": i64::MAX,
            "finished": i64::MIN,
        }))
        .unwrap();
        assert_eq!(o.warning_duration(), None);
        assert_eq!(o.duration_planned(), Some(i64::MAX - 10));
        assert_eq!(o.duration_actual(), None);

        let mut wide = window(i64::MIN, i64::MIN, i64::MAX);
        wide.title = Some("({{duration}})".to_string());
        assert_eq!(wide.duration_planned(), None);
        assert_eq!(wide.title(), "()");
        assert!(wide.is_ongoing(1));
        assert!(!wide.has_ended(i64::MAX - 1));
    }

    #[test]
    fn title_placeholders_are_substituted() {
        let mut o = window(0, 3_600, 3_600 + 5_400);
        o.title = Some("Down {{start}} - {{stop}} ({{duration}})".to_string());
        assert_eq!(
            o.title(),
            "Down 1970-01-01 01:00 UTC - 1970-01-01 02:30 UTC (1 hour 30 mins)"
        );
        assert_eq!(o.description(), "");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0 secs");
        assert_eq!(format_duration(45), "45 secs");
        assert_eq!(format_duration(60), "1 min");
        assert_eq!(format_duration(86_400 + 7_200 + 300), "1 day 2 hours 5 mins");
        assert_eq!(format_duration(-90), "-1 min 30 secs");
    }
}
