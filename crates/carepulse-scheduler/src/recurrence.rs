//! Recurrence calculator — given an occurrence and a rule, find the next one.
//!
//! Calendar arithmetic runs on the wall-clock time of a time zone (the host's
//! `Local` in production), so "every day at 09:00" stays at 09:00 across DST
//! changes and month lengths are respected.
//!
//! Month and year steps keep the day-of-month and let overflow roll into the
//! following month: Jan 31 + 1 month lands on Mar 2 (leap year) or Mar 3, and
//! Feb 29 + 1 year lands on Mar 1. Stored schedules depend on this, so it is
//! not clamped to the end of the month.

use std::collections::BTreeSet;

use chrono::{
    DateTime, Datelike, Days, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

const DAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Recurrence kind as stored on an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Persisted recurrence fields, flattened into each entity.
///
/// Every field except `recurrence` is optional and may hold junk written by
/// older clients; [`RecurrenceSpec::normalize`] is the only place defaults
/// get filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceSpec {
    #[serde(default)]
    pub recurrence: Recurrence,
    /// 0 = Sunday .. 6 = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly_interval: Option<i64>,
}

impl RecurrenceSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn daily(interval: i64) -> Self {
        Self {
            recurrence: Recurrence::Daily,
            daily_interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn weekly(days: &[i64]) -> Self {
        Self {
            recurrence: Recurrence::Weekly,
            weekly_days: Some(days.to_vec()),
            ..Self::default()
        }
    }

    pub fn monthly(interval: i64) -> Self {
        Self {
            recurrence: Recurrence::Monthly,
            monthly_interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn yearly(interval: i64) -> Self {
        Self {
            recurrence: Recurrence::Yearly,
            yearly_interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence != Recurrence::None
    }

    /// Fill defaults and produce the rule the calculator works on.
    ///
    /// Missing or non-positive intervals become 1. Weekly days outside 0..=6
    /// are dropped; an empty set means a flat 7-day step.
    pub fn normalize(&self) -> RecurrenceRule {
        match self.recurrence {
            Recurrence::None => RecurrenceRule::None,
            Recurrence::Daily => RecurrenceRule::Daily {
                interval_days: positive_or_one(self.daily_interval),
            },
            Recurrence::Weekly => RecurrenceRule::Weekly {
                days_of_week: self
                    .weekly_days
                    .iter()
                    .flatten()
                    .filter_map(|d| u8::try_from(*d).ok())
                    .filter(|d| *d <= 6)
                    .collect(),
            },
            Recurrence::Monthly => RecurrenceRule::Monthly {
                interval_months: positive_or_one(self.monthly_interval),
            },
            Recurrence::Yearly => RecurrenceRule::Yearly {
                interval_years: positive_or_one(self.yearly_interval),
            },
        }
    }
}

fn positive_or_one(value: Option<i64>) -> u32 {
    match value {
        Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Fully-populated recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceRule {
    None,
    Daily { interval_days: u32 },
    /// Days are 0 = Sunday .. 6 = Saturday.
    Weekly { days_of_week: BTreeSet<u8> },
    Monthly { interval_months: u32 },
    Yearly { interval_years: u32 },
}

impl RecurrenceRule {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, RecurrenceRule::None)
    }

    /// Short human description, e.g. "every 2 days" or "weekly on Mon, Fri".
    pub fn describe(&self) -> String {
        match self {
            RecurrenceRule::None => String::new(),
            RecurrenceRule::Daily { interval_days } => every(*interval_days, "day"),
            RecurrenceRule::Weekly { days_of_week } => {
                if days_of_week.len() == 7 {
                    "daily".into()
                } else if days_of_week.is_empty() {
                    "weekly".into()
                } else {
                    let labels: Vec<&str> = days_of_week
                        .iter()
                        .map(|d| DAY_LABELS[usize::from(*d)])
                        .collect();
                    format!("weekly on {}", labels.join(", "))
                }
            }
            RecurrenceRule::Monthly { interval_months } => every(*interval_months, "month"),
            RecurrenceRule::Yearly { interval_years } => every(*interval_years, "year"),
        }
    }
}

fn every(n: u32, unit: &str) -> String {
    if n > 1 {
        format!("every {n} {unit}s")
    } else {
        format!("every {n} {unit}")
    }
}

/// Next occurrence after `anchor` in the host's local time zone.
pub fn next_occurrence(anchor: DateTime<Utc>, rule: &RecurrenceRule) -> DateTime<Utc> {
    next_occurrence_in(anchor, rule, &Local)
}

/// Next occurrence after `anchor`, doing calendar math in `tz`.
///
/// `RecurrenceRule::None` returns `anchor` unchanged. A step that would
/// leave chrono's representable range also returns `anchor`, so callers
/// looping "until past now" terminate.
pub fn next_occurrence_in<Tz: TimeZone>(
    anchor: DateTime<Utc>,
    rule: &RecurrenceRule,
    tz: &Tz,
) -> DateTime<Utc> {
    let local = anchor.with_timezone(tz).naive_local();
    let next = match rule {
        RecurrenceRule::None => return anchor,
        RecurrenceRule::Daily { interval_days } => {
            local.checked_add_days(Days::new(u64::from(*interval_days)))
        }
        RecurrenceRule::Weekly { days_of_week } => {
            let weekday = local.weekday().num_days_from_sunday() as u8;
            local.checked_add_days(Days::new(weekly_step(weekday, days_of_week)))
        }
        RecurrenceRule::Monthly { interval_months } => {
            add_months_rolling(local, i64::from(*interval_months))
        }
        RecurrenceRule::Yearly { interval_years } => {
            add_months_rolling(local, i64::from(*interval_years) * 12)
        }
    };

    match next.and_then(|n| resolve_local(tz, n)) {
        Some(next) => next,
        None => {
            tracing::warn!("Recurrence step from {anchor} overflowed ({rule:?}), not advancing");
            anchor
        }
    }
}

/// Days from weekday `today` to the next selected weekday.
///
/// Only days strictly after `today` count for the current week, so an anchor
/// on a selected day moves to the next selected day, never the same one.
fn weekly_step(today: u8, days: &BTreeSet<u8>) -> u64 {
    let Some(first) = days.first() else {
        return 7;
    };
    match days.range(today + 1..).next() {
        Some(day) => u64::from(day - today),
        None => u64::from(7 - today + first),
    }
}

/// Add calendar months, keeping day-of-month and rolling overflow forward.
fn add_months_rolling(local: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let total = i64::from(local.year()) * 12 + i64::from(local.month0()) + months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let date = first.checked_add_days(Days::new(u64::from(local.day() - 1)))?;
    Some(date.and_time(local.time()))
}

/// Map a wall-clock time back to an instant. Ambiguous times (DST fall-back)
/// take the earlier instant; skipped times (spring-forward) move one hour on.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

/// Result of rolling an occurrence forward past "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollover {
    /// First occurrence at or after `now` (or the anchor if it never moved).
    pub next: DateTime<Utc>,
    /// The last occurrence that was stepped over, if any.
    pub lapsed: Option<DateTime<Utc>>,
    pub steps: u32,
}

impl Rollover {
    pub fn advanced(&self) -> bool {
        self.steps > 0
    }
}

/// Step `anchor` forward until it is no longer before `now`, in local time.
pub fn advance_past(anchor: DateTime<Utc>, rule: &RecurrenceRule, now: DateTime<Utc>) -> Rollover {
    advance_past_in(anchor, rule, now, &Local)
}

/// Step `anchor` forward until it is no longer before `now`.
///
/// Bounded by the number of missed periods: every step strictly advances
/// time, and a step that does not (a `None` rule) ends the loop.
pub fn advance_past_in<Tz: TimeZone>(
    anchor: DateTime<Utc>,
    rule: &RecurrenceRule,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Rollover {
    let mut current = anchor;
    let mut lapsed = None;
    let mut steps = 0u32;

    while current < now {
        let next = next_occurrence_in(current, rule, tz);
        if next <= current {
            break;
        }
        lapsed = Some(current);
        current = next;
        steps += 1;
    }

    Rollover {
        next: current,
        lapsed,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn next(anchor: &str, spec: RecurrenceSpec) -> DateTime<Utc> {
        next_occurrence_in(at(anchor), &spec.normalize(), &Utc)
    }

    #[test]
    fn test_none_returns_anchor() {
        assert_eq!(
            next("2024-01-01T09:00:00Z", RecurrenceSpec::none()),
            at("2024-01-01T09:00:00Z")
        );
    }

    #[test]
    fn test_daily_interval_repeats() {
        let rule = RecurrenceSpec::daily(3).normalize();
        let anchor = at("2024-01-30T09:00:00Z");
        let mut current = anchor;
        for _ in 0..5 {
            current = next_occurrence_in(current, &rule, &Utc);
        }
        assert_eq!(current, anchor + Duration::days(15));
    }

    #[test]
    fn test_daily_crosses_month_end() {
        assert_eq!(
            next("2024-02-28T22:15:00Z", RecurrenceSpec::daily(2)),
            at("2024-03-01T22:15:00Z")
        );
    }

    mod dst {
        use super::*;
        use chrono_tz::America::New_York;

        fn ny_daily(anchor: &str) -> DateTime<Utc> {
            next_occurrence_in(at(anchor), &RecurrenceSpec::daily(1).normalize(), &New_York)
        }

        #[test]
        fn test_daily_keeps_wall_clock_across_spring_forward() {
            // 09:00 EST -> 09:00 EDT, a 23-hour step.
            assert_eq!(ny_daily("2024-03-09T14:00:00Z"), at("2024-03-10T13:00:00Z"));
        }

        #[test]
        fn test_skipped_local_time_moves_forward_an_hour() {
            // 02:30 does not exist on 2024-03-10; lands on 03:30 EDT.
            assert_eq!(ny_daily("2024-03-09T07:30:00Z"), at("2024-03-10T07:30:00Z"));
        }

        #[test]
        fn test_ambiguous_local_time_takes_earlier_instant() {
            // 01:30 happens twice on 2024-11-03; the EDT one comes first.
            assert_eq!(ny_daily("2024-11-02T05:30:00Z"), at("2024-11-03T05:30:00Z"));
        }

        #[test]
        fn test_daily_keeps_wall_clock_across_fall_back() {
            assert_eq!(ny_daily("2024-11-02T13:00:00Z"), at("2024-11-03T14:00:00Z"));
        }

        #[test]
        fn test_monthly_across_spring_forward() {
            let rule = RecurrenceSpec::monthly(1).normalize();
            assert_eq!(
                next_occurrence_in(at("2024-02-10T14:00:00Z"), &rule, &New_York),
                at("2024-03-10T13:00:00Z")
            );
        }

        #[test]
        fn test_rollover_across_switch_stays_at_nine() {
            let rule = RecurrenceSpec::daily(1).normalize();
            let rollover = advance_past_in(
                at("2024-03-08T14:00:00Z"),
                &rule,
                at("2024-03-11T12:00:00Z"),
                &New_York,
            );
            assert_eq!(rollover.next, at("2024-03-11T13:00:00Z"));
            assert_eq!(rollover.lapsed, Some(at("2024-03-10T13:00:00Z")));
            assert_eq!(rollover.steps, 3);
        }
    }

    #[test]
    fn test_weekly_mon_wed_fri() {
        let spec = RecurrenceSpec::weekly(&[1, 3, 5]);
        // 2024-01-01 is a Monday.
        assert_eq!(
            next("2024-01-01T08:00:00Z", spec.clone()),
            at("2024-01-03T08:00:00Z")
        );
        assert_eq!(
            next("2024-01-03T08:00:00Z", spec.clone()),
            at("2024-01-05T08:00:00Z")
        );
        // Friday wraps to the following Monday.
        assert_eq!(
            next("2024-01-05T08:00:00Z", spec),
            at("2024-01-08T08:00:00Z")
        );
    }

    #[test]
    fn test_weekly_empty_days_is_flat_week() {
        let result = next("2024-01-03T08:00:00Z", RecurrenceSpec::weekly(&[]));
        assert_eq!(result, at("2024-01-10T08:00:00Z"));
        assert_eq!(result.weekday(), at("2024-01-03T08:00:00Z").weekday());
    }

    #[test]
    fn test_weekly_missing_days_is_flat_week() {
        let spec = RecurrenceSpec {
            recurrence: Recurrence::Weekly,
            ..RecurrenceSpec::default()
        };
        assert_eq!(
            next("2024-01-03T08:00:00Z", spec),
            at("2024-01-10T08:00:00Z")
        );
    }

    #[test]
    fn test_weekly_single_selected_day_never_repeats_same_day() {
        // Wednesday with only Wednesday selected.
        assert_eq!(
            next("2024-01-03T08:00:00Z", RecurrenceSpec::weekly(&[3])),
            at("2024-01-10T08:00:00Z")
        );
    }

    #[test]
    fn test_weekly_from_unselected_day() {
        // Saturday, Mon/Wed selected: jump to Monday.
        assert_eq!(
            next("2024-01-06T08:00:00Z", RecurrenceSpec::weekly(&[3, 1])),
            at("2024-01-08T08:00:00Z")
        );
        // Sunday, Sunday + Saturday selected: Saturday of the same week.
        assert_eq!(
            next("2024-01-07T08:00:00Z", RecurrenceSpec::weekly(&[0, 6])),
            at("2024-01-13T08:00:00Z")
        );
    }

    #[test]
    fn test_monthly_preserves_day() {
        assert_eq!(
            next("2024-03-10T09:00:00Z", RecurrenceSpec::monthly(1)),
            at("2024-04-10T09:00:00Z")
        );
        assert_eq!(
            next("2024-11-15T09:00:00Z", RecurrenceSpec::monthly(3)),
            at("2025-02-15T09:00:00Z")
        );
    }

    #[test]
    fn test_monthly_repeats() {
        let rule = RecurrenceSpec::monthly(2).normalize();
        let mut current = at("2024-03-10T09:00:00Z");
        for _ in 0..3 {
            current = next_occurrence_in(current, &rule, &Utc);
        }
        assert_eq!(current, at("2024-09-10T09:00:00Z"));
    }

    #[test]
    fn test_monthly_overflow_rolls_forward() {
        assert_eq!(
            next("2023-01-31T09:00:00Z", RecurrenceSpec::monthly(1)),
            at("2023-03-03T09:00:00Z")
        );
        assert_eq!(
            next("2024-01-31T09:00:00Z", RecurrenceSpec::monthly(1)),
            at("2024-03-02T09:00:00Z")
        );
    }

    #[test]
    fn test_yearly() {
        assert_eq!(
            next("2024-06-01T12:00:00Z", RecurrenceSpec::yearly(2)),
            at("2026-06-01T12:00:00Z")
        );
        // Leap day rolls into March.
        assert_eq!(
            next("2024-02-29T12:00:00Z", RecurrenceSpec::yearly(1)),
            at("2025-03-01T12:00:00Z")
        );
        assert_eq!(
            next("2024-02-29T12:00:00Z", RecurrenceSpec::yearly(4)),
            at("2028-02-29T12:00:00Z")
        );
    }

    #[test]
    fn test_normalize_defaults() {
        assert_eq!(
            RecurrenceSpec::daily(0).normalize(),
            RecurrenceRule::Daily { interval_days: 1 }
        );
        assert_eq!(
            RecurrenceSpec::monthly(-4).normalize(),
            RecurrenceRule::Monthly { interval_months: 1 }
        );
        let spec = RecurrenceSpec {
            recurrence: Recurrence::Yearly,
            ..RecurrenceSpec::default()
        };
        assert_eq!(spec.normalize(), RecurrenceRule::Yearly { interval_years: 1 });

        let RecurrenceRule::Weekly { days_of_week } =
            RecurrenceSpec::weekly(&[5, 1, 9, -1, 5]).normalize()
        else {
            panic!("expected weekly rule");
        };
        assert_eq!(days_of_week.into_iter().collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn test_advance_past_long_gap() {
        let now = at("2025-06-01T12:00:00Z");
        let anchor = now - Duration::days(400);
        let rule = RecurrenceSpec::daily(3).normalize();

        let rollover = advance_past_in(anchor, &rule, now, &Utc);
        assert!(rollover.next >= now);
        assert!(rollover.next - Duration::days(3) < now);
        assert_eq!((rollover.next - anchor).num_days() % 3, 0);
        assert_eq!(rollover.steps, 134);
        assert_eq!(rollover.lapsed, Some(rollover.next - Duration::days(3)));
    }

    #[test]
    fn test_advance_past_future_is_noop() {
        let now = at("2024-01-01T00:00:00Z");
        let anchor = at("2024-01-02T00:00:00Z");
        let rollover = advance_past_in(anchor, &RecurrenceSpec::daily(1).normalize(), now, &Utc);
        assert!(!rollover.advanced());
        assert_eq!(rollover.next, anchor);
        assert_eq!(rollover.lapsed, None);
    }

    #[test]
    fn test_advance_past_lands_exactly_on_now() {
        let now = at("2024-01-05T09:00:00Z");
        let rollover = advance_past_in(
            at("2024-01-01T09:00:00Z"),
            &RecurrenceSpec::daily(1).normalize(),
            now,
            &Utc,
        );
        assert_eq!(rollover.next, now);
        assert_eq!(rollover.steps, 4);
    }

    #[test]
    fn test_advance_past_none_rule_terminates() {
        let now = at("2024-01-05T09:00:00Z");
        let anchor = at("2024-01-01T09:00:00Z");
        let rollover = advance_past_in(anchor, &RecurrenceRule::None, now, &Utc);
        assert_eq!(rollover.next, anchor);
        assert_eq!(rollover.steps, 0);
    }

    #[test]
    fn test_describe() {
        assert_eq!(RecurrenceRule::None.describe(), "");
        assert_eq!(RecurrenceSpec::daily(1).normalize().describe(), "every 1 day");
        assert_eq!(RecurrenceSpec::daily(3).normalize().describe(), "every 3 days");
        assert_eq!(RecurrenceSpec::weekly(&[]).normalize().describe(), "weekly");
        assert_eq!(
            RecurrenceSpec::weekly(&[5, 1]).normalize().describe(),
            "weekly on Mon, Fri"
        );
        assert_eq!(
            RecurrenceSpec::weekly(&[0, 1, 2, 3, 4, 5, 6]).normalize().describe(),
            "daily"
        );
        assert_eq!(RecurrenceSpec::monthly(2).normalize().describe(), "every 2 months");
        assert_eq!(RecurrenceSpec::yearly(1).normalize().describe(), "every 1 year");
    }

    #[test]
    fn test_spec_reads_stored_fields() {
        let spec: RecurrenceSpec = serde_json::from_str(
            r#"{"recurrence":"Weekly","weeklyDays":[1,3],"monthlyInterval":1,"dailyInterval":1}"#,
        )
        .unwrap();
        assert_eq!(spec.recurrence, Recurrence::Weekly);
        assert_eq!(spec.weekly_days, Some(vec![1, 3]));
        assert!(spec.is_recurring());

        let bare: RecurrenceSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.normalize(), RecurrenceRule::None);
    }
}
