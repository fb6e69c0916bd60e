//! User-initiated changes: completing tasks, logging doses, minting ids.
//!
//! These are never run by the scheduler loop; they write through the same
//! [`EntityCollection`] so they serialize with it.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use carepulse_core::error::{CarePulseError, Result};

use crate::collection::EntityCollection;
use crate::models::{Medication, Schedulable, Task};
use crate::recurrence::next_occurrence_in;

/// How to resolve completing one instance of a recurring task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskResolution {
    /// Keep this instance as completed and add a pending copy at the next
    /// occurrence.
    ArchiveAndClone,
    /// Move this instance's due date to the next occurrence, still pending.
    AdvanceInPlace,
}

impl std::str::FromStr for TaskResolution {
    type Err = CarePulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clone" | "archive" | "archive-and-clone" => Ok(Self::ArchiveAndClone),
            "advance" | "advance-in-place" => Ok(Self::AdvanceInPlace),
            other => Err(CarePulseError::InvalidInput(format!(
                "unknown resolution '{other}' (expected clone or advance)"
            ))),
        }
    }
}

/// What completing a task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Plain toggle of a non-recurring (or undated, or already completed) task.
    Toggled { completed: bool },
    /// Original archived; a new pending instance was added.
    Cloned { new_id: String, due: DateTime<Utc> },
    /// Same instance, new due date.
    Advanced { due: DateTime<Utc> },
}

/// New entity id: the millisecond timestamp as a string, bumped
/// until it collides with nothing in `taken`.
pub fn new_entity_id<'a>(taken: impl IntoIterator<Item = &'a str>, now: DateTime<Utc>) -> String {
    let taken: Vec<&str> = taken.into_iter().collect();
    let mut candidate = now.timestamp_millis();
    while taken.contains(&candidate.to_string().as_str()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// Flip the completion flag of task `id`, recurring or not.
/// Returns the new state.
pub fn toggle_task(tasks: &EntityCollection<Task>, id: &str) -> Result<bool> {
    tasks.update(|items| {
        let task = items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CarePulseError::NotFound(format!("task '{id}'")))?;
        task.is_completed = !task.is_completed;
        Ok(task.is_completed)
    })
}

/// Toggle or complete task `id`, in the host's local time zone.
pub fn complete_task(
    tasks: &EntityCollection<Task>,
    id: &str,
    resolution: TaskResolution,
    now: DateTime<Utc>,
) -> Result<CompletionOutcome> {
    complete_task_in(tasks, id, resolution, now, &Local)
}

/// Toggle or complete task `id`.
///
/// A pending, dated, recurring task is resolved with `resolution`.
/// Anything else just flips `is_completed`.
pub fn complete_task_in<Tz: TimeZone>(
    tasks: &EntityCollection<Task>,
    id: &str,
    resolution: TaskResolution,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<CompletionOutcome> {
    tasks.update(|items| {
        let index = items
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CarePulseError::NotFound(format!("task '{id}'")))?;

        let rule = items[index].recurrence.normalize();
        let pending_due = items[index]
            .due_date
            .filter(|_| rule.is_recurring() && !items[index].is_completed);
        let Some(due) = pending_due else {
            let task = &mut items[index];
            task.is_completed = !task.is_completed;
            return Ok(CompletionOutcome::Toggled {
                completed: task.is_completed,
            });
        };
        let next_due = next_occurrence_in(due, &rule, tz);

        match resolution {
            TaskResolution::ArchiveAndClone => {
                let new_id = new_entity_id(items.iter().map(|t| t.id()), now);
                let mut clone = items[index].clone();
                clone.id = new_id.clone();
                clone.due_date = Some(next_due);
                clone.is_completed = false;
                items[index].is_completed = true;
                items.push(clone);
                tracing::info!("✅ Task '{}' archived, next instance {} due {}", id, new_id, next_due);
                Ok(CompletionOutcome::Cloned {
                    new_id,
                    due: next_due,
                })
            }
            TaskResolution::AdvanceInPlace => {
                items[index].due_date = Some(next_due);
                tracing::info!("⏭️ Task '{}' advanced to {}", id, next_due);
                Ok(CompletionOutcome::Advanced { due: next_due })
            }
        }
    })
}

/// Log a dose of medication `id` taken on `today`.
/// Returns the streak count afterwards; logging twice a day is a no-op.
pub fn log_dose(medications: &EntityCollection<Medication>, id: &str, today: NaiveDate) -> Result<u32> {
    medications.update(|items| {
        let med = items
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CarePulseError::NotFound(format!("medication '{id}'")))?;
        if !med.log_dose(today) {
            tracing::debug!("Dose for '{}' already logged on {}", med.name, today);
        }
        Ok(med.streak.as_ref().map_or(0, |s| s.count))
    })
}
