//! Session
//!
//! A [`Session`] is the unit of work: it tracks entities, loads them from
//! its store through an identity map, and flushes every pending change in
//! one atomic batch on commit.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::model::{Entity, Row};
use crate::store::{Store, WriteCommand};
use crate::tracking::{ChangeTracker, EntityState, EntryId, TrackedEntry};

mod execution_context;
mod set;
mod unit_of_work;

pub use execution_context::ExecutionContext;
pub use set::EntitySet;
pub use unit_of_work::{SaveOptions, UnitOfWork};

/// Typed handle of a tracked entity.
pub struct Tracked<T> {
    id: EntryId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Tracked<T> {
    pub(crate) fn new(id: EntryId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Tracked<T> {}

impl<T> PartialEq for Tracked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Tracked<T> {}

impl<T> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tracked({})", self.id)
    }
}

pub struct Session<S: Store> {
    store: Arc<S>,
    tracker: ChangeTracker,
}

impl<S: Store> Session<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            tracker: ChangeTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Typed view over the entities of one type.
    pub fn set<T: Entity>(&mut self) -> EntitySet<'_, S, T> {
        EntitySet::new(self)
    }

    /// Track a new entity for insertion.
    pub fn add<T: Entity>(&mut self, entity: T) -> Result<Tracked<T>> {
        self.tracker.track(entity, EntityState::Added).map(Tracked::new)
    }

    /// Track an entity that already exists in storage.
    pub fn attach<T: Entity>(&mut self, entity: T) -> Result<Tracked<T>> {
        self.tracker.track(entity, EntityState::Unchanged).map(Tracked::new)
    }

    /// Mark an entity for deletion.
    pub fn remove<T: Entity>(&mut self, handle: Tracked<T>) -> Result<()> {
        self.tracker.remove(handle.id)
    }

    pub fn detach<T: Entity>(&mut self, handle: Tracked<T>) {
        self.tracker.detach(handle.id)
    }

    pub fn get<T: Entity>(&self, handle: Tracked<T>) -> Option<&T> {
        self.tracker.entry(handle.id).and_then(TrackedEntry::entity::<T>)
    }

    /// Mutable access to a tracked entity. Changes are picked up by the next
    /// change detection.
    pub fn get_mut<T: Entity>(&mut self, handle: Tracked<T>) -> Option<&mut T> {
        self.tracker
            .entry_mut(handle.id)
            .and_then(TrackedEntry::entity_mut::<T>)
    }

    pub fn entry<T: Entity>(&self, handle: Tracked<T>) -> Option<&TrackedEntry> {
        self.tracker.entry(handle.id)
    }

    pub fn state<T: Entity>(&self, handle: Tracked<T>) -> EntityState {
        self.tracker.state(handle.id)
    }

    pub fn detect_changes(&mut self) -> Result<()> {
        self.tracker.detect_changes()
    }

    pub fn has_changes(&mut self) -> Result<bool> {
        self.tracker.detect_changes()?;
        Ok(self.tracker.has_changes())
    }

    /// Load the `T` stored under `key`. An entity that is already tracked is
    /// returned as is, local changes included.
    pub async fn find<T: Entity>(&mut self, key: &Row) -> Result<Option<Tracked<T>>> {
        if let Some(id) = self.tracker.lookup::<T>(key) {
            return Ok(Some(Tracked::new(id)));
        }

        match self.store.find(T::model(), key).await? {
            Some(row) => self.track_loaded::<T>(row).map(Some),
            None => Ok(None),
        }
    }

    /// Load every `T` whose columns equal `filter`, ordered by key.
    pub async fn query<T: Entity>(&mut self, filter: &Row) -> Result<Vec<Tracked<T>>> {
        let rows = self.store.scan(T::model(), filter).await?;
        rows.into_iter()
            .map(|row| self.track_loaded::<T>(row))
            .collect()
    }

    fn track_loaded<T: Entity>(&mut self, row: Row) -> Result<Tracked<T>> {
        if let Some(id) = self.tracker.lookup::<T>(&row) {
            return Ok(Tracked::new(id));
        }
        let entity: T = T::model().from_row(&row)?;
        self.attach(entity)
    }

    /// Accept every pending change as saved without writing it.
    pub fn accept_all_changes(&mut self) {
        self.tracker.accept_all_changes()
    }

    /// Flush every pending change. Returns the number of rows written.
    pub async fn commit(&mut self, options: SaveOptions) -> Result<usize> {
        self.commit_where(options, |_| true).await
    }

    /// Flush the pending entries selected by `include`.
    ///
    /// The tracker is only updated after the store accepted the batch, so a
    /// failed or dropped commit leaves every entry as it was. Results the
    /// session cannot apply after that point yield
    /// [`StoreError::Unreconciled`].
    pub(crate) async fn commit_where<F>(&mut self, options: SaveOptions, include: F) -> Result<usize>
    where
        F: Fn(&TrackedEntry) -> bool + Send,
    {
        self.tracker.detect_changes()?;

        let pending: Vec<EntryId> = self
            .tracker
            .entries()
            .filter(|e| e.state().is_pending() && include(*e))
            .map(TrackedEntry::id)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let batch = pending
            .iter()
            .filter_map(|id| self.tracker.entry(*id))
            .map(write_command)
            .collect::<Result<Vec<_>>>()?;

        debug!(commands = batch.len(), "Executing store batch");
        let results = self.store.execute(&batch).await?;

        // The batch is durable from here on, so every result is applied
        // before any failure is reported.
        let mut rows_affected = 0usize;
        let mut failure = None;
        for (id, result) in pending.iter().zip(&results) {
            rows_affected += result.rows_affected as usize;
            let applied = match self.tracker.entry_mut(*id) {
                Some(entry) => entry.apply_generated(&result.generated),
                None => Ok(()),
            };
            if let Err(e) = applied {
                warn!(entry = %id, error = %e, "Detaching entry whose generated values could not be applied");
                self.tracker.detach(*id);
                failure.get_or_insert_with(|| e.to_string());
                continue;
            }
            self.tracker.register_identity(*id);
            if options.accept_all_changes_on_success {
                self.tracker.accept(*id);
            }
        }
        if results.len() != pending.len() {
            failure.get_or_insert_with(|| {
                format!(
                    "store returned {} results for {} commands",
                    results.len(),
                    pending.len()
                )
            });
        }

        match failure {
            Some(message) => Err(StoreError::Unreconciled {
                rows_affected,
                message,
            }),
            None => Ok(rows_affected),
        }
    }
}

fn write_command(entry: &TrackedEntry) -> Result<WriteCommand> {
    let model = entry.model();
    match entry.state() {
        EntityState::Added => Ok(WriteCommand::Insert {
            model,
            values: entry
                .properties()
                .filter(|p| !p.is_pending_generation)
                .map(|p| (p.name().to_string(), p.current_value.clone()))
                .collect(),
        }),
        EntityState::Modified => Ok(WriteCommand::Update {
            model,
            key: entry.key_values(),
            values: entry
                .properties()
                .filter(|p| p.is_modified)
                .map(|p| (p.name().to_string(), p.current_value.clone()))
                .collect(),
        }),
        EntityState::Deleted => Ok(WriteCommand::Delete {
            model,
            key: entry.key_values(),
        }),
        state => Err(StoreError::invalid_operation(format!(
            "entry {} in state {:?} has nothing to write",
            entry.id(),
            state
        ))),
    }
}
