//! Scheduler loop — one per entity collection.
//!
//! Each tick rolls overdue recurring occurrences forward, then fires the
//! reminders whose window contains `now`. Ticks are plain synchronous calls;
//! [`EntityScheduler::spawn`] drives them from a tokio interval.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use carepulse_core::error::Result;
use carepulse_core::traits::{Clock, NotificationSink};

use crate::collection::EntityCollection;
use crate::dedup::{Deduplicator, NotifiedKey};
use crate::models::{EntityKind, Schedulable};
use crate::recurrence::advance_past_in;

/// A reminder that went out during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminder {
    pub entity_id: String,
    pub occurrence: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub kind: EntityKind,
    pub now: DateTime<Utc>,
    /// Occurrences moved forward by rollover.
    pub advanced: usize,
    pub fired: Vec<FiredReminder>,
}

/// Rollover and reminder loop for one kind of entity.
pub struct EntityScheduler<E, Tz = Local> {
    collection: Arc<EntityCollection<E>>,
    dedup: Arc<dyn Deduplicator>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    play_sound: bool,
    tz: Tz,
}

impl<E: Schedulable> EntityScheduler<E, Local> {
    pub fn new(
        collection: Arc<EntityCollection<E>>,
        dedup: Arc<dyn Deduplicator>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            collection,
            dedup,
            sink,
            clock,
            play_sound: true,
            tz: Local,
        }
    }
}

impl<E, Tz> EntityScheduler<E, Tz>
where
    E: Schedulable,
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Do calendar math in `tz` instead of the host zone.
    pub fn with_time_zone<Tz2: TimeZone>(self, tz: Tz2) -> EntityScheduler<E, Tz2> {
        EntityScheduler {
            collection: self.collection,
            dedup: self.dedup,
            sink: self.sink,
            clock: self.clock,
            play_sound: self.play_sound,
            tz,
        }
    }

    pub fn with_sound(mut self, play_sound: bool) -> Self {
        self.play_sound = play_sound;
        self
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    pub fn collection(&self) -> &Arc<EntityCollection<E>> {
        &self.collection
    }

    /// Run one pass. Store failures are returned; sink failures are not
    /// observable here.
    pub fn tick(&self) -> Result<TickReport> {
        let now = self.clock.now();

        // Rollover and candidate selection share one write of the collection.
        let (advanced, due) = self.collection.update(|items| {
            let mut advanced = 0;
            let mut due = Vec::new();

            for entity in items.iter_mut().filter(|e| e.is_active()) {
                let rule = entity.recurrence().normalize();
                let id = entity.id().to_string();
                let mut lapsed = Vec::new();

                if rule.is_recurring() {
                    for occurrence in entity.occurrences_mut() {
                        let rollover = advance_past_in(*occurrence, &rule, now, &self.tz);
                        if rollover.advanced() {
                            tracing::debug!(
                                "⏭️ {} '{}' {} -> {} ({} steps)",
                                E::KIND,
                                id,
                                occurrence,
                                rollover.next,
                                rollover.steps
                            );
                            *occurrence = rollover.next;
                            lapsed.extend(rollover.lapsed);
                            advanced += 1;
                        }
                    }
                }

                let reminder = entity.reminder();
                if !reminder.is_enabled() {
                    continue;
                }
                // An occurrence stepped over this tick may still be inside its
                // firing window (a dose due a few seconds ago).
                for occurrence in entity.occurrences().iter().copied().chain(lapsed) {
                    if reminder.fires_at(occurrence, now) {
                        due.push((id.clone(), occurrence, entity.render(occurrence)));
                    }
                }
            }

            Ok((advanced, due))
        })?;

        let mut fired = Vec::new();
        for (entity_id, occurrence, message) in due {
            let key = NotifiedKey::new(E::KIND, &entity_id, occurrence);
            if self.dedup.has_fired(&key)? {
                continue;
            }
            self.sink.notify(&message.title, &message.body, self.play_sound);
            self.dedup.mark_fired(&key)?;
            tracing::info!("🔔 {} reminder: {}", E::KIND, message.body);
            fired.push(FiredReminder {
                entity_id,
                occurrence,
                title: message.title,
                body: message.body,
            });
        }

        if advanced > 0 || !fired.is_empty() {
            tracing::debug!(
                "⏰ {} tick: {} advanced, {} fired",
                E::KIND,
                advanced,
                fired.len()
            );
        }

        Ok(TickReport {
            kind: E::KIND,
            now,
            advanced,
            fired,
        })
    }

    /// Run `tick` every `period` on the current tokio runtime until stopped.
    /// The first tick runs immediately.
    pub fn spawn(self: Arc<Self>, period: StdDuration) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let kind = E::KIND;

        let join = tokio::spawn(async move {
            tracing::info!("⏰ {} scheduler started (every {}s)", kind, period.as_secs());
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.tick() {
                            tracing::warn!("⚠️ {} tick failed: {e}", kind);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("🛑 {} scheduler stopped", kind);
        });

        SchedulerHandle {
            kind,
            shutdown_tx,
            join,
        }
    }
}

/// A running scheduler loop.
pub struct SchedulerHandle {
    kind: EntityKind,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Stop scheduling ticks. A tick already running finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!("⚠️ {} scheduler task ended abnormally: {e}", self.kind);
        }
    }
}
