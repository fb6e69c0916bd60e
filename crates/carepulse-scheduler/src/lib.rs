//! # CarePulse Scheduler
//!
//! Recurrence engine, reminder evaluation, notification dedup and the
//! per-collection polling loops for appointments, medications and tasks.
//!
//! ## Architecture
//! ```text
//! CareScheduler
//!   ├── EntityScheduler<Appointment> ─┐
//!   ├── EntityScheduler<Medication>  ─┼─ tokio interval (60s)
//!   └── EntityScheduler<Task>        ─┘
//!         tick:
//!           1. rollover   (recurrence::advance_past)
//!           2. reminders  (reminder::ReminderSpec::fires_at)
//!           3. dedup      (notified-<kind>-<id>-<occurrence>)
//!           4. sink       → NotifyRouter (permission gate, tracing log, history)
//!
//! KvStore: MemoryStore | FileStore (JSON files) | SqliteStore
//! ```

pub mod actions;
pub mod collection;
pub mod dedup;
pub mod engine;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod recurrence;
pub mod reminder;
pub mod service;
pub mod store;

pub use actions::{
    CompletionOutcome, TaskResolution, complete_task, complete_task_in, log_dose, new_entity_id, toggle_task,
};
pub use collection::EntityCollection;
pub use dedup::{Deduplicator, NotifiedKey, StoreDeduplicator};
pub use engine::{EntityScheduler, FiredReminder, SchedulerHandle, TickReport};
pub use models::{Appointment, EntityKind, Medication, Schedulable, Streak, Task};
pub use notify::{Notification, NotifyRouter};
pub use persistence::SqliteStore;
pub use recurrence::{Recurrence, RecurrenceRule, RecurrenceSpec, next_occurrence, next_occurrence_in};
pub use reminder::{ReminderSpec, should_fire_now};
pub use service::{CareScheduler, open_store, stop_all};
pub use store::{FileStore, MemoryStore};
