//! Notification deduplication — remember which reminders already fired.
//!
//! One marker per (entity kind, entity id, occurrence). Advancing an
//! occurrence yields a fresh key, so the next period fires again without any
//! cleanup. Markers never expire; a TTL policy would be a change to
//! [`StoreDeduplicator`] alone.

use std::fmt;

use carepulse_core::error::Result;
use carepulse_core::traits::KvStore;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::EntityKind;

/// Identity of one fired reminder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotifiedKey {
    pub kind: EntityKind,
    pub entity_id: String,
    pub occurrence: DateTime<Utc>,
}

impl NotifiedKey {
    pub fn new(kind: EntityKind, entity_id: &str, occurrence: DateTime<Utc>) -> Self {
        Self {
            kind,
            entity_id: entity_id.to_string(),
            occurrence,
        }
    }

    /// Namespace shared by every marker of one entity kind.
    pub fn prefix(kind: EntityKind) -> String {
        format!("notified-{}-", kind.key_tag())
    }
}

impl fmt::Display for NotifiedKey {
    /// `notified-<kind>-<id>-<occurrence as RFC 3339, millis, Z>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}-{}",
            Self::prefix(self.kind),
            self.entity_id,
            self.occurrence.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Fired-reminder bookkeeping.
pub trait Deduplicator: Send + Sync {
    fn has_fired(&self, key: &NotifiedKey) -> Result<bool>;
    fn mark_fired(&self, key: &NotifiedKey) -> Result<()>;
}

/// Markers stored as plain keys in a [`KvStore`].
pub struct StoreDeduplicator<S> {
    store: S,
}

impl<S: KvStore> StoreDeduplicator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KvStore> Deduplicator for StoreDeduplicator<S> {
    fn has_fired(&self, key: &NotifiedKey) -> Result<bool> {
        Ok(self.store.get(&key.to_string())?.is_some())
    }

    fn mark_fired(&self, key: &NotifiedKey) -> Result<()> {
        self.store.set(&key.to_string(), "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_key_format() {
        let key = NotifiedKey::new(EntityKind::Medication, "1700000000000", at("2024-01-05T09:00:00Z"));
        assert_eq!(key.to_string(), "notified-med-1700000000000-2024-01-05T09:00:00.000Z");
        assert!(key.to_string().starts_with(&NotifiedKey::prefix(EntityKind::Medication)));
    }

    #[test]
    fn test_mark_then_has_fired() {
        let dedup = StoreDeduplicator::new(MemoryStore::new());
        let key = NotifiedKey::new(EntityKind::Task, "t1", at("2024-03-10T09:00:00Z"));
        assert!(!dedup.has_fired(&key).unwrap());
        dedup.mark_fired(&key).unwrap();
        assert!(dedup.has_fired(&key).unwrap());
    }

    #[test]
    fn test_advanced_occurrence_is_fresh() {
        let dedup = StoreDeduplicator::new(MemoryStore::new());
        let first = NotifiedKey::new(EntityKind::Appointment, "a1", at("2024-03-10T09:00:00Z"));
        dedup.mark_fired(&first).unwrap();
        let next = NotifiedKey::new(EntityKind::Appointment, "a1", at("2024-03-11T09:00:00Z"));
        assert!(!dedup.has_fired(&next).unwrap());
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let store = Arc::new(MemoryStore::new());
        let dedup = StoreDeduplicator::new(store.clone());
        let occ = at("2024-03-10T09:00:00Z");
        dedup.mark_fired(&NotifiedKey::new(EntityKind::Task, "1", occ)).unwrap();
        assert!(!dedup.has_fired(&NotifiedKey::new(EntityKind::Appointment, "1", occ)).unwrap());
        assert_eq!(store.keys_with_prefix("notified-task-").len(), 1);
    }
}
