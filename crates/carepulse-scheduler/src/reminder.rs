//! Reminder evaluation — does a reminder fire at this tick?
//!
//! A reminder fires while `now` sits in a one-minute window starting at
//! `occurrence - lead`. The window equals the poll interval, so a loop
//! ticking every minute sees each window exactly once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Width of the firing window, in seconds.
pub const REMINDER_WINDOW_SECS: i64 = 60;

/// Lead-time presets offered for appointments and tasks, in minutes.
pub const REMINDER_OPTIONS: [i64; 8] = [0, 5, 10, 15, 30, 60, 120, 1440];

/// Whether a reminder `lead_minutes` before `occurrence` fires at `now`.
///
/// True iff `now` is in `[occurrence - lead, occurrence - lead + 1 minute)`.
/// A lead of zero or less never fires.
pub fn should_fire_now(occurrence: DateTime<Utc>, lead_minutes: i64, now: DateTime<Utc>) -> bool {
    if lead_minutes <= 0 {
        return false;
    }
    Duration::try_minutes(lead_minutes)
        .and_then(|lead| occurrence.checked_sub_signed(lead))
        .is_some_and(|trigger| in_window(trigger, now))
}

fn in_window(trigger: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= trigger && now < trigger + Duration::seconds(REMINDER_WINDOW_SECS)
}

/// When, relative to an occurrence, an entity wants to be reminded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderSpec {
    /// No reminder.
    #[default]
    None,
    /// Fire at the occurrence itself (medication doses).
    AtOccurrence,
    /// Fire this many minutes before the occurrence.
    Before(i64),
}

impl ReminderSpec {
    /// Stored lead time to spec; `0`, negative or missing means no reminder.
    pub fn from_minutes(minutes: Option<i64>) -> Self {
        match minutes {
            Some(m) if m > 0 => ReminderSpec::Before(m),
            _ => ReminderSpec::None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ReminderSpec::None)
    }

    /// Whether this reminder for `occurrence` fires at `now`.
    pub fn fires_at(&self, occurrence: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            ReminderSpec::None => false,
            ReminderSpec::AtOccurrence => in_window(occurrence, now),
            ReminderSpec::Before(minutes) => should_fire_now(occurrence, *minutes, now),
        }
    }

    /// Human label such as "1 day, 2 hours, 5 min before".
    pub fn label(&self) -> String {
        match self {
            ReminderSpec::None => String::new(),
            ReminderSpec::AtOccurrence => "at time".into(),
            ReminderSpec::Before(minutes) => lead_label(*minutes),
        }
    }
}

fn lead_label(total_minutes: i64) -> String {
    if total_minutes <= 0 {
        return String::new();
    }
    let days = total_minutes / 1440;
    let hours = (total_minutes % 1440) / 60;
    let minutes = total_minutes % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days} day{}", if days > 1 { "s" } else { "" }));
    }
    if hours > 0 {
        parts.push(format!("{hours} hour{}", if hours > 1 { "s" } else { "" }));
    }
    if minutes > 0 {
        parts.push(format!("{minutes} min"));
    }
    format!("{} before", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_window_bounds() {
        let occ = at("2024-05-01T10:00:00Z");
        assert!(!should_fire_now(occ, 15, at("2024-05-01T09:44:59Z")));
        assert!(should_fire_now(occ, 15, at("2024-05-01T09:45:00Z")));
        assert!(should_fire_now(occ, 15, at("2024-05-01T09:45:59Z")));
        assert!(!should_fire_now(occ, 15, at("2024-05-01T09:46:00Z")));
    }

    #[test]
    fn test_non_positive_lead_never_fires() {
        let occ = at("2024-05-01T10:00:00Z");
        assert!(!should_fire_now(occ, 0, occ));
        assert!(!should_fire_now(occ, -5, occ + Duration::minutes(5)));
    }

    #[test]
    fn test_exactly_one_tick_per_sweep() {
        let occ = at("2024-05-01T10:00:00Z");
        for lead in REMINDER_OPTIONS.into_iter().filter(|l| *l > 0) {
            // Sweep two days either side at one-minute ticks, offset by 17s.
            let start = occ - Duration::days(2) + Duration::seconds(17);
            let fired = (0..(4 * 1440))
                .map(|i| start + Duration::minutes(i))
                .filter(|now| should_fire_now(occ, lead, *now))
                .count();
            assert_eq!(fired, 1, "lead {lead}");
        }
    }

    #[test]
    fn test_at_occurrence() {
        let occ = at("2024-01-05T09:00:00Z");
        let spec = ReminderSpec::AtOccurrence;
        assert!(spec.fires_at(occ, occ));
        assert!(spec.fires_at(occ, occ + Duration::seconds(59)));
        assert!(!spec.fires_at(occ, occ + Duration::minutes(1)));
        assert!(!spec.fires_at(occ, occ - Duration::seconds(1)));
    }

    #[test]
    fn test_from_minutes() {
        assert_eq!(ReminderSpec::from_minutes(None), ReminderSpec::None);
        assert_eq!(ReminderSpec::from_minutes(Some(0)), ReminderSpec::None);
        assert_eq!(ReminderSpec::from_minutes(Some(-3)), ReminderSpec::None);
        assert_eq!(ReminderSpec::from_minutes(Some(30)), ReminderSpec::Before(30));
        assert!(!ReminderSpec::None.fires_at(Utc::now(), Utc::now()));
    }

    #[test]
    fn test_labels() {
        assert_eq!(ReminderSpec::Before(5).label(), "5 min before");
        assert_eq!(ReminderSpec::Before(60).label(), "1 hour before");
        assert_eq!(ReminderSpec::Before(120).label(), "2 hours before");
        assert_eq!(ReminderSpec::Before(1440).label(), "1 day before");
        assert_eq!(ReminderSpec::Before(1565).label(), "1 day, 2 hours, 5 min before");
        assert_eq!(ReminderSpec::None.label(), "");
    }
}
