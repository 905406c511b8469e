use std::any::TypeId;
use std::collections::HashMap;

use tracing::trace;

use super::entry::{key_string, EntityState, EntryId, TrackedEntry};
use crate::error::{Result, StoreError};
use crate::model::{Entity, Row};

/// Owns tracked entries in insertion order.
///
/// Slots of detached entries stay empty so that an [`EntryId`] is never
/// reused by a later entry.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: Vec<Option<TrackedEntry>>,
    identity: HashMap<(TypeId, String), EntryId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `entity` in `state`.
    ///
    /// Fails when another entry of the same type already holds the same
    /// resolved primary key.
    pub fn track<T: Entity>(&mut self, entity: T, state: EntityState) -> Result<EntryId> {
        if state == EntityState::Detached {
            return Err(StoreError::invalid_operation("cannot track an entity as Detached"));
        }

        let id = EntryId(self.entries.len());
        let entry = TrackedEntry::new(id, entity, state)?;

        let identity = entry
            .has_resolved_key()
            .then(|| (TypeId::of::<T>(), key_string(&entry.key_values())));
        if let Some(identity) = identity {
            if let Some(existing) = self.identity.get(&identity) {
                return Err(StoreError::invalid_operation(format!(
                    "{} with key {} is already tracked as {}",
                    T::table_name(),
                    identity.1,
                    existing
                )));
            }
            self.identity.insert(identity, id);
        }

        trace!(entry = %id, table = T::table_name(), ?state, "Tracking entity");
        self.entries.push(Some(entry));
        Ok(id)
    }

    pub fn entry(&self, id: EntryId) -> Option<&TrackedEntry> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackedEntry> {
        self.entries.get_mut(id.0).and_then(Option::as_mut)
    }

    /// State of an entry; `Detached` once it is no longer tracked.
    pub fn state(&self, id: EntryId) -> EntityState {
        self.entry(id).map_or(EntityState::Detached, TrackedEntry::state)
    }

    /// Live entries in tracking order.
    pub fn entries(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.entries.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compare every entity with its original row and settle entry states.
    pub fn detect_changes(&mut self) -> Result<()> {
        for entry in self.entries.iter_mut().flatten() {
            entry.detect()?;
        }
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.entries().any(|e| e.state().is_pending())
    }

    /// Entry holding the `T` stored under `key`, if tracked.
    pub fn lookup<T: Entity>(&self, key: &Row) -> Option<EntryId> {
        let key = T::model().key_of(key);
        self.identity
            .get(&(TypeId::of::<T>(), key_string(&key)))
            .copied()
    }

    /// Mark an entry for deletion. Added entries are simply forgotten.
    pub fn remove(&mut self, id: EntryId) -> Result<()> {
        let entry = self
            .entry_mut(id)
            .ok_or_else(|| StoreError::invalid_operation(format!("entry {} is not tracked", id)))?;

        match entry.state() {
            EntityState::Added => self.detach(id),
            EntityState::Unchanged | EntityState::Modified => entry.set_state(EntityState::Deleted),
            EntityState::Deleted | EntityState::Detached => {}
        }
        Ok(())
    }

    /// Stop tracking an entry.
    pub fn detach(&mut self, id: EntryId) {
        let Some(entry) = self.entries.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        let identity = (entry.type_id(), key_string(&entry.key_values()));
        if self.identity.get(&identity) == Some(&id) {
            self.identity.remove(&identity);
        }
        trace!(entry = %id, table = entry.table_name(), "Detached entity");
    }

    /// Mark a committed entry as matching storage.
    pub(crate) fn accept(&mut self, id: EntryId) {
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        match entry.state() {
            EntityState::Deleted => self.detach(id),
            _ => {
                entry.accept();
                self.register_identity(id);
            }
        }
    }

    /// Accept every pending change as saved.
    pub fn accept_all_changes(&mut self) {
        let ids: Vec<EntryId> = self.entries().map(TrackedEntry::id).collect();
        for id in ids {
            self.accept(id);
        }
    }

    /// Record the entry's key in the identity map once it is known.
    pub(crate) fn register_identity(&mut self, id: EntryId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        if entry.has_resolved_key() {
            let identity = (entry.type_id(), key_string(&entry.key_values()));
            self.identity.entry(identity).or_insert(id);
        }
    }
}
