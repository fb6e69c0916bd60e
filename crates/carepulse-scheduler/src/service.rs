//! Wiring: one store, one sink, one clock, three independent loops.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Local, TimeZone};

use carepulse_core::config::{CarePulseConfig, StoreBackend};
use carepulse_core::error::Result;
use carepulse_core::traits::{Clock, KvStore, NotificationSink};

use crate::collection::EntityCollection;
use crate::dedup::{Deduplicator, StoreDeduplicator};
use crate::engine::{EntityScheduler, SchedulerHandle, TickReport};
use crate::models::{Appointment, Medication, Schedulable, Task};
use crate::persistence::SqliteStore;
use crate::store::{FileStore, MemoryStore};

/// Open the backend named in `config`.
pub fn open_store(config: &CarePulseConfig) -> Result<Arc<dyn KvStore>> {
    let data_dir = config.data_path()?;
    let store: Arc<dyn KvStore> = match config.store.backend {
        StoreBackend::File => Arc::new(FileStore::open(&data_dir.join("store"))?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&data_dir.join("carepulse.db"))?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::debug!("📂 Store: {:?} under {}", config.store.backend, data_dir.display());
    Ok(store)
}

/// The appointment, medication and task loops sharing one store.
pub struct CareScheduler<Tz = Local> {
    appointments: Arc<EntityScheduler<Appointment, Tz>>,
    medications: Arc<EntityScheduler<Medication, Tz>>,
    tasks: Arc<EntityScheduler<Task, Tz>>,
    poll_interval: StdDuration,
}

impl CareScheduler<Local> {
    pub fn new(
        store: Arc<dyn KvStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: &CarePulseConfig,
    ) -> Self {
        Self::new_in(store, sink, clock, config, Local)
    }
}

impl<Tz> CareScheduler<Tz>
where
    Tz: TimeZone + Copy + Send + Sync + 'static,
{
    /// Like [`CareScheduler::new`], doing calendar math in `tz`.
    pub fn new_in(
        store: Arc<dyn KvStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: &CarePulseConfig,
        tz: Tz,
    ) -> Self {
        let dedup: Arc<dyn Deduplicator> = Arc::new(StoreDeduplicator::new(store.clone()));
        let sounds = &config.notifications;
        let poll_secs = config.scheduler.poll_interval_secs.max(1);
        if poll_secs > 60 {
            tracing::warn!("⚠️ Poll interval {poll_secs}s is wider than the reminder window; reminders may be missed");
        }

        let parts = LoopParts {
            store: &store,
            dedup: &dedup,
            sink: &sink,
            clock: &clock,
        };
        Self {
            appointments: parts.build(tz, sounds.appointments),
            medications: parts.build(tz, sounds.medications),
            tasks: parts.build(tz, sounds.tasks),
            poll_interval: StdDuration::from_secs(poll_secs),
        }
    }

    pub fn appointments(&self) -> &Arc<EntityCollection<Appointment>> {
        self.appointments.collection()
    }

    pub fn medications(&self) -> &Arc<EntityCollection<Medication>> {
        self.medications.collection()
    }

    pub fn tasks(&self) -> &Arc<EntityCollection<Task>> {
        self.tasks.collection()
    }

    pub fn poll_interval(&self) -> StdDuration {
        self.poll_interval
    }

    /// Tick all three loops once, appointments first.
    /// Every loop runs even if an earlier one fails; the first error is returned.
    pub fn tick_all(&self) -> Result<Vec<TickReport>> {
        let results = [
            self.appointments.tick(),
            self.medications.tick(),
            self.tasks.tick(),
        ];
        results.into_iter().collect()
    }

    /// Start the three loops on the current tokio runtime.
    pub fn spawn_all(&self) -> Vec<SchedulerHandle> {
        vec![
            self.appointments.clone().spawn(self.poll_interval),
            self.medications.clone().spawn(self.poll_interval),
            self.tasks.clone().spawn(self.poll_interval),
        ]
    }
}

/// Collaborators shared by the three loops.
struct LoopParts<'a> {
    store: &'a Arc<dyn KvStore>,
    dedup: &'a Arc<dyn Deduplicator>,
    sink: &'a Arc<dyn NotificationSink>,
    clock: &'a Arc<dyn Clock>,
}

impl LoopParts<'_> {
    fn build<E, Tz>(&self, tz: Tz, play_sound: bool) -> Arc<EntityScheduler<E, Tz>>
    where
        E: Schedulable,
        Tz: TimeZone + Send + Sync + 'static,
    {
        let scheduler = EntityScheduler::new(
            Arc::new(EntityCollection::new(self.store.clone())),
            self.dedup.clone(),
            self.sink.clone(),
            self.clock.clone(),
        )
        .with_time_zone(tz)
        .with_sound(play_sound);
        Arc::new(scheduler)
    }
}

/// Stop every loop and wait for them to wind down.
pub async fn stop_all(handles: Vec<SchedulerHandle>) {
    for handle in handles {
        handle.stop().await;
    }
}
