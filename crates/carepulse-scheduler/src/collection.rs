//! Typed entity collections stored as one JSON list per store key.
//!
//! Every write goes through [`EntityCollection::update`], which holds the
//! collection's write lock across load → mutate → replace. The scheduler
//! tick and user actions share one `EntityCollection` per kind, so their
//! writes to the same list are serialized and readers only ever see a whole
//! list.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use carepulse_core::error::{CarePulseError, Result};
use carepulse_core::traits::KvStore;

use crate::models::{EntityKind, Schedulable};

pub struct EntityCollection<E> {
    store: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Schedulable> EntityCollection<E> {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    /// Current list. A missing key is an empty collection; unreadable JSON
    /// is an error.
    pub fn load(&self) -> Result<Vec<E>> {
        match self.store.get(E::KIND.collection_key())? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<E>> {
        Ok(self.load()?.into_iter().find(|e| e.id() == id))
    }

    /// Replace the whole list.
    pub fn replace(&self, items: &[E]) -> Result<()> {
        let _guard = self.lock();
        self.write(items)
    }

    /// Load, let `f` mutate a copy, and write it back if anything changed.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<E>) -> Result<R>) -> Result<R> {
        let _guard = self.lock();
        let before = self.load()?;
        let mut items = before.clone();
        let out = f(&mut items)?;
        if serde_json::to_value(&items)? != serde_json::to_value(&before)? {
            self.write(&items)?;
        }
        Ok(out)
    }

    pub fn insert(&self, item: E) -> Result<()> {
        self.update(|items| {
            if items.iter().any(|e| e.id() == item.id()) {
                return Err(CarePulseError::InvalidInput(format!(
                    "{} '{}' already exists",
                    E::KIND,
                    item.id()
                )));
            }
            items.push(item);
            Ok(())
        })
    }

    /// Replace the stored entity with `item`'s id by `item`, keeping its
    /// position in the list.
    pub fn save(&self, item: E) -> Result<()> {
        self.update(|items| {
            let slot = items
                .iter_mut()
                .find(|e| e.id() == item.id())
                .ok_or_else(|| CarePulseError::NotFound(format!("{} '{}'", E::KIND, item.id())))?;
            *slot = item;
            Ok(())
        })
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.remove_many(&[id])? > 0)
    }

    /// Bulk delete. Returns how many were removed.
    pub fn remove_many(&self, ids: &[&str]) -> Result<usize> {
        self.update(|items| {
            let len = items.len();
            items.retain(|e| !ids.iter().any(|id| *id == e.id()));
            Ok(len - items.len())
        })
    }

    fn write(&self, items: &[E]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.store.set(E::KIND.collection_key(), &json)?;
        tracing::debug!("💾 Saved {} {}", items.len(), E::KIND);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}
