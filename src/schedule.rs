//! Brightness scheduling based on time of day and day of week.
//!
//! Panels sit on a desk, so they should dim in the evening and can go dark
//! (and stop changing photos) overnight.
//!
//! # Example Schedule (YAML)
//!
//! ```yaml
//! timezone: "Europe/Berlin"
//! default_brightness: 80
//!
//! rules:
//!   # Night - backlight off, keep the last photo
//!   - days: all
//!     start: "23:00"
//!     end: "07:00"
//!     brightness: 0
//!     show_photo: false
//!
//!   # Evenings - dimmed
//!   - days: all
//!     start: "19:00"
//!     end: "23:00"
//!     brightness: 30
//!
//!   # Weekend mornings - a bit brighter
//!   - days: weekends
//!     start: "07:00"
//!     end: "12:00"
//!     brightness: 100
//! ```

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;

use crate::error::Error;

/// Brightness schedule, evaluated rule by rule (first match wins).
#[derive(Debug, Clone, Deserialize)]
pub struct BrightnessSchedule {
    /// IANA timezone for interpreting times (default: UTC)
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Brightness when no rule matches
    pub default_brightness: u8,
    #[serde(default)]
    pub rules: Vec<ScheduleRule>,
}

/// A single schedule rule.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRule {
    pub days: DaySelector,
    /// Start time (HH:MM, 24-hour format), inclusive
    pub start: String,
    /// End time (HH:MM, 24-hour format), exclusive
    pub end: String,
    pub brightness: u8,
    /// Whether a new photo should be pushed during this window
    #[serde(default = "default_show_photo")]
    pub show_photo: bool,
}

/// Day selector for schedule rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DaySelector {
    /// A specific list of days (e.g., ["mon", "tue", "wed"])
    List(Vec<String>),
    /// "all", "weekdays", "weekends", or a single day name
    Named(String),
}

/// What the schedule says to do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub brightness: u8,
    pub show_photo: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_show_photo() -> bool {
    true
}

impl BrightnessSchedule {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "failed to read schedule file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a schedule.
    ///
    /// Unlike a refresh-rate hint, a bad brightness schedule would silently
    /// leave panels dark, so every field is checked up front.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let schedule: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid schedule YAML: {e}")))?;
        schedule.validate()?;
        Ok(schedule)
    }

    fn validate(&self) -> Result<(), Error> {
        self.tz()?;
        if self.default_brightness > 100 {
            return Err(Error::Config(format!(
                "default_brightness {} is out of range 0-100",
                self.default_brightness
            )));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.brightness > 100 {
                return Err(Error::Config(format!(
                    "rule {}: brightness {} is out of range 0-100",
                    i + 1,
                    rule.brightness
                )));
            }
            if parse_time(&rule.start).is_none() || parse_time(&rule.end).is_none() {
                return Err(Error::Config(format!(
                    "rule {}: times must be HH:MM (got {} - {})",
                    i + 1,
                    rule.start,
                    rule.end
                )));
            }
            if let DaySelector::Named(name) = &rule.days {
                if !matches!(name.to_lowercase().as_str(), "all" | "weekdays" | "weekends")
                    && weekday_from_str(name).is_none()
                {
                    return Err(Error::Config(format!("rule {}: unknown day '{}'", i + 1, name)));
                }
            }
        }
        Ok(())
    }

    fn tz(&self) -> Result<Tz, Error> {
        self.timezone
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Slot for the current wall-clock time.
    pub fn current_slot(&self) -> Slot {
        let tz = self.tz().unwrap_or(Tz::UTC);
        self.slot_at(Utc::now().with_timezone(&tz))
    }

    /// Slot for a specific time (interpreted in that time's own zone).
    pub fn slot_at<T: TimeZone>(&self, dt: DateTime<T>) -> Slot {
        let weekday = dt.weekday();
        let time = NaiveTime::from_hms_opt(dt.hour(), dt.minute(), 0).unwrap_or_default();

        for rule in &self.rules {
            if rule.matches(weekday, time) {
                tracing::debug!(
                    "Schedule rule matched: {:?} {}-{} brightness={} show_photo={}",
                    rule.days,
                    rule.start,
                    rule.end,
                    rule.brightness,
                    rule.show_photo
                );
                return Slot {
                    brightness: rule.brightness,
                    show_photo: rule.show_photo,
                };
            }
        }

        Slot {
            brightness: self.default_brightness,
            show_photo: true,
        }
    }
}

impl ScheduleRule {
    fn matches(&self, weekday: Weekday, time: NaiveTime) -> bool {
        if !self.day_matches(weekday) {
            return false;
        }

        match (parse_time(&self.start), parse_time(&self.end)) {
            (Some(s), Some(e)) if s <= e => time >= s && time < e,
            // Wraps midnight (e.g. 23:00 - 07:00)
            (Some(s), Some(e)) => time >= s || time < e,
            _ => false,
        }
    }

    fn day_matches(&self, weekday: Weekday) -> bool {
        match &self.days {
            DaySelector::Named(name) => match name.to_lowercase().as_str() {
                "all" => true,
                "weekdays" => !matches!(weekday, Weekday::Sat | Weekday::Sun),
                "weekends" => matches!(weekday, Weekday::Sat | Weekday::Sun),
                _ => weekday_from_str(name) == Some(weekday),
            },
            DaySelector::List(days) => days.iter().any(|d| weekday_from_str(d) == Some(weekday)),
        }
    }
}

/// Parse `HH:MM`.
fn parse_time(s: &str) -> Option<NaiveTime> {
    let (hour, minute) = s.trim().split_once(':')?;
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

fn weekday_from_str(s: &str) -> Option<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
