//! Entity definitions — appointments, medications and tasks — and the
//! [`Schedulable`] view the scheduler loop works through.
//!
//! Field names serialize in camelCase so stored collections keep the shape
//! the rest of the app already reads and writes.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::recurrence::RecurrenceSpec;
use crate::reminder::ReminderSpec;

/// The three entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Appointment,
    Medication,
    Task,
}

impl EntityKind {
    /// Store key holding the serialized collection.
    pub fn collection_key(&self) -> &'static str {
        match self {
            EntityKind::Appointment => "appointments",
            EntityKind::Medication => "medications",
            EntityKind::Task => "tasks",
        }
    }

    /// Short tag used in reminder marker keys.
    pub fn key_tag(&self) -> &'static str {
        match self {
            EntityKind::Appointment => "appt",
            EntityKind::Medication => "med",
            EntityKind::Task => "task",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection_key())
    }
}

/// Title and body of a reminder, ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub title: String,
    pub body: String,
}

/// What the scheduler needs to know about an entity.
pub trait Schedulable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Stored recurrence; normalized by the scheduler before use.
    fn recurrence(&self) -> &RecurrenceSpec;

    fn occurrences(&self) -> &[DateTime<Utc>];

    fn occurrences_mut(&mut self) -> &mut [DateTime<Utc>];

    fn reminder(&self) -> ReminderSpec;

    /// Inactive entities are skipped by rollover and reminders alike.
    fn is_active(&self) -> bool {
        true
    }

    fn render(&self, occurrence: DateTime<Utc>) -> ReminderMessage;
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

// ─── Appointments ──────────────────────────────────────────

/// A scheduled visit with a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    #[serde(rename = "type", default)]
    pub appointment_type: String,
    /// Used when `appointment_type` is "Other".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_type: Option<String>,
    #[serde(default)]
    pub provider: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
    /// Minutes before `date`; 0 disables the reminder.
    #[serde(default)]
    pub reminder: i64,
    #[serde(flatten)]
    pub recurrence: RecurrenceSpec,
}

impl Appointment {
    pub fn new(id: &str, provider: &str, date: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            appointment_type: "General Check-up".into(),
            custom_type: None,
            provider: provider.to_string(),
            date,
            location: String::new(),
            notes: String::new(),
            reminder: 0,
            recurrence: RecurrenceSpec::none(),
        }
    }

    pub fn display_type(&self) -> &str {
        match (&self.appointment_type[..], &self.custom_type) {
            ("Other", Some(custom)) => custom.as_str(),
            (kind, _) => kind,
        }
    }
}

impl Schedulable for Appointment {
    const KIND: EntityKind = EntityKind::Appointment;

    fn id(&self) -> &str {
        &self.id
    }

    fn recurrence(&self) -> &RecurrenceSpec {
        &self.recurrence
    }

    fn occurrences(&self) -> &[DateTime<Utc>] {
        std::slice::from_ref(&self.date)
    }

    fn occurrences_mut(&mut self) -> &mut [DateTime<Utc>] {
        std::slice::from_mut(&mut self.date)
    }

    fn reminder(&self) -> ReminderSpec {
        ReminderSpec::from_minutes(Some(self.reminder))
    }

    fn render(&self, occurrence: DateTime<Utc>) -> ReminderMessage {
        ReminderMessage {
            title: "Appointment Reminder".into(),
            body: format!(
                "Your appointment with {} is at {}.",
                self.provider,
                local_time(occurrence)
            ),
        }
    }
}

/// Upcoming appointments (at or after `since`), soonest first.
pub fn upcoming_appointments(appointments: &[Appointment], since: DateTime<Utc>) -> Vec<&Appointment> {
    let mut upcoming: Vec<&Appointment> = appointments.iter().filter(|a| a.date >= since).collect();
    upcoming.sort_by_key(|a| a.date);
    upcoming
}

// ─── Medications ──────────────────────────────────────────

/// Consecutive-day dose logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub count: u32,
    #[serde(rename = "lastTakenDate", default)]
    pub last_logged_date: Option<NaiveDate>,
}

impl Streak {
    /// Record a dose on `today`. Returns false if today was already logged.
    ///
    /// The count grows only when the previous log was exactly yesterday;
    /// any longer gap restarts it at 1.
    pub fn log(&mut self, today: NaiveDate) -> bool {
        if self.last_logged_date == Some(today) {
            return false;
        }
        self.count = if self.last_logged_date.is_some() && self.last_logged_date == today.pred_opt() {
            self.count + 1
        } else {
            1
        };
        self.last_logged_date = Some(today);
        true
    }

    pub fn logged_on(&self, day: NaiveDate) -> bool {
        self.last_logged_date == Some(day)
    }

    /// "Last logged: Today" / "Yesterday" / "N days ago".
    pub fn last_logged_label(&self, today: NaiveDate) -> Option<String> {
        let last = self.last_logged_date?;
        let days = (today - last).num_days();
        Some(match days {
            0 => "Last logged: Today".into(),
            1 => "Last logged: Yesterday".into(),
            n => format!("Last logged: {n} days ago"),
        })
    }
}

/// A medication with one or more daily dose times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dosage: f64,
    #[serde(default)]
    pub dosage_unit: String,
    /// Used when `dosage_unit` is "Other".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_dosage_unit: Option<String>,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub notes: String,
    /// Dose times; each one recurs independently.
    #[serde(default, deserialize_with = "lenient_timestamps")]
    pub reminders: Vec<DateTime<Utc>>,
    #[serde(flatten)]
    pub recurrence: RecurrenceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<Streak>,
}

impl Medication {
    pub fn new(id: &str, name: &str, dosage: f64, dosage_unit: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            dosage,
            dosage_unit: dosage_unit.to_string(),
            custom_dosage_unit: None,
            frequency: String::new(),
            notes: String::new(),
            reminders: Vec::new(),
            recurrence: RecurrenceSpec::none(),
            streak: Some(Streak::default()),
        }
    }

    pub fn display_unit(&self) -> &str {
        match (&self.dosage_unit[..], &self.custom_dosage_unit) {
            ("Other", Some(custom)) => custom.as_str(),
            (unit, _) => unit,
        }
    }

    /// Log a dose taken on `today`. Returns false if already logged today.
    pub fn log_dose(&mut self, today: NaiveDate) -> bool {
        self.streak.get_or_insert_with(Streak::default).log(today)
    }
}

/// Dose times written by older clients may be blank; those are dropped.
fn lenient_timestamps<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Option<String>> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("⚠️ Dropping unreadable dose time '{s}': {e}");
                None
            }
        })
        .collect())
}

impl Schedulable for Medication {
    const KIND: EntityKind = EntityKind::Medication;

    fn id(&self) -> &str {
        &self.id
    }

    fn recurrence(&self) -> &RecurrenceSpec {
        &self.recurrence
    }

    fn occurrences(&self) -> &[DateTime<Utc>] {
        &self.reminders
    }

    fn occurrences_mut(&mut self) -> &mut [DateTime<Utc>] {
        &mut self.reminders
    }

    /// A dose time is its own reminder.
    fn reminder(&self) -> ReminderSpec {
        ReminderSpec::AtOccurrence
    }

    fn render(&self, _occurrence: DateTime<Utc>) -> ReminderMessage {
        ReminderMessage {
            title: "Medication Reminder".into(),
            body: format!(
                "Time to take your {} ({} {}).",
                self.name,
                self.dosage,
                self.display_unit()
            ),
        }
    }
}

// ─── Tasks ──────────────────────────────────────────

/// A to-do item, optionally due at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(flatten)]
    pub recurrence: RecurrenceSpec,
    /// Minutes before `due_date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<i64>,
}

impl Task {
    pub fn new(id: &str, title: &str, due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            notes: None,
            due_date,
            is_completed: false,
            recurrence: RecurrenceSpec::none(),
            reminder: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date.is_some_and(|due| due < now)
    }
}

impl Schedulable for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &str {
        &self.id
    }

    fn recurrence(&self) -> &RecurrenceSpec {
        &self.recurrence
    }

    fn occurrences(&self) -> &[DateTime<Utc>] {
        self.due_date.as_slice()
    }

    fn occurrences_mut(&mut self) -> &mut [DateTime<Utc>] {
        self.due_date.as_mut_slice()
    }

    fn reminder(&self) -> ReminderSpec {
        ReminderSpec::from_minutes(self.reminder)
    }

    fn is_active(&self) -> bool {
        !self.is_completed
    }

    fn render(&self, occurrence: DateTime<Utc>) -> ReminderMessage {
        ReminderMessage {
            title: "Task Reminder".into(),
            body: format!(
                "Your task \"{}\" is due at {}.",
                self.title,
                local_time(occurrence)
            ),
        }
    }
}

/// Pending tasks: dated ones first by due date then title, undated last by title.
pub fn pending_tasks(tasks: &[Task]) -> Vec<&Task> {
    let mut pending: Vec<&Task> = tasks.iter().filter(|t| !t.is_completed).collect();
    pending.sort_by(|a, b| match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.title.cmp(&b.title)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.title.cmp(&b.title),
    });
    pending
}
