//! User notification preferences and their evaluation.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::severity::Severity;

/// A recurring do-not-disturb window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DndWindow {
    /// Weekday names (e.g. "monday").
    #[serde(default)]
    pub days: Vec<String>,
    /// Start time in HH:MM format.
    pub start_time: String,
    /// End time in HH:MM format.
    pub end_time: String,
}

/// How DND windows whose start is after their end are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DndMode {
    /// Same-day comparison only: `start <= now <= end` on a listed day.
    /// A window like 22:00-06:00 never matches.
    #[default]
    SameDay,
    /// Windows with `start > end` run past midnight into the following day.
    Overnight,
}

impl DndWindow {
    pub fn new(days: &[&str], start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            days: days.iter().map(|d| d.to_string()).collect(),
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    fn covers_day(&self, day: Weekday) -> bool {
        self.days.iter().any(|d| parse_weekday(d) == Some(day))
    }

    /// Check whether `local_now` falls inside this window.
    pub fn is_active(&self, local_now: NaiveDateTime, mode: DndMode) -> bool {
        let (Some(start), Some(end)) = (parse_time(&self.start_time), parse_time(&self.end_time))
        else {
            warn!(
                start = %self.start_time,
                end = %self.end_time,
                "Ignoring do-not-disturb window with unparsable time"
            );
            return false;
        };

        // Minute resolution, matching how windows are written.
        let now = local_now.time();
        let now = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now);
        let today = local_now.weekday();

        if start <= end || mode == DndMode::SameDay {
            return self.covers_day(today) && start <= now && now <= end;
        }

        (self.covers_day(today) && now >= start) || (self.covers_day(today.pred()) && now <= end)
    }
}

/// Stored preferences of one user within one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotificationPreferences {
    pub user_id: String,
    pub organization_id: String,
    #[serde(default)]
    pub mute_alerts: bool,
    #[serde(default)]
    pub severity_threshold: Severity,
    #[serde(default)]
    pub blocked_channels: Vec<String>,
    #[serde(default)]
    pub do_not_disturb_windows: Vec<DndWindow>,
}

impl UserNotificationPreferences {
    /// Preferences with every default applied.
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            mute_alerts: false,
            severity_threshold: Severity::default(),
            blocked_channels: Vec::new(),
            do_not_disturb_windows: Vec::new(),
        }
    }

    /// Decide whether a notification may be delivered. First matching rule wins.
    pub fn evaluate(
        &self,
        channel_type: &str,
        severity: Severity,
        local_now: NaiveDateTime,
        mode: DndMode,
    ) -> PreferenceDecision {
        if self.mute_alerts {
            return PreferenceDecision::deny("user has muted all alerts");
        }

        if severity.is_below(self.severity_threshold) {
            return PreferenceDecision::deny(format!(
                "severity {} is below user threshold {}",
                severity, self.severity_threshold
            ));
        }

        if self
            .blocked_channels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(channel_type))
        {
            return PreferenceDecision::deny(format!(
                "channel type {} is blocked by user",
                channel_type
            ));
        }

        if let Some(window) = self
            .do_not_disturb_windows
            .iter()
            .find(|w| w.is_active(local_now, mode))
        {
            return PreferenceDecision::deny(format!(
                "within do-not-disturb window {}-{}",
                window.start_time, window.end_time
            ));
        }

        PreferenceDecision::allow("allowed by user preferences")
    }
}

/// Outcome of a preference check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceDecision {
    pub allow: bool,
    pub reason: String,
}

impl PreferenceDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allow: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: reason.into(),
        }
    }
}

/// Parse "HH:MM" (or "HH:MM:SS").
fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Parse a weekday name, full or three-letter, case-insensitive.
fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
