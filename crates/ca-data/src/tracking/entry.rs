use std::any::{Any, TypeId};
use std::fmt;

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::model::{ColumnDef, Entity, EntityModel, Row};

static NULL: Value = Value::Null;

/// Handle of a tracked entry. Stable for the lifetime of the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not tracked
    Detached,
    /// Matches storage
    Unchanged,
    /// Pending insert
    Added,
    /// Pending update
    Modified,
    /// Pending delete
    Deleted,
}

impl EntityState {
    pub fn is_pending(&self) -> bool {
        matches!(self, EntityState::Added | EntityState::Modified | EntityState::Deleted)
    }
}

/// Type-erased entity owned by an entry.
pub(crate) trait TrackedObject: Any + Send + Sync {
    fn to_row(&self, model: &EntityModel) -> Result<Row>;
    fn load_row(&mut self, model: &EntityModel, row: &Row) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> TrackedObject for T {
    fn to_row(&self, model: &EntityModel) -> Result<Row> {
        model.to_row(self)
    }

    fn load_row(&mut self, model: &EntityModel, row: &Row) -> Result<()> {
        *self = model.from_row(row)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Identity-map key of a primary key row.
pub(crate) fn key_string(key: &Row) -> String {
    Value::Array(key.values().cloned().collect()).to_string()
}

pub struct TrackedEntry {
    id: EntryId,
    type_id: TypeId,
    model: &'static EntityModel,
    state: EntityState,
    object: Box<dyn TrackedObject>,
    original: Row,
    current: Row,
}

impl TrackedEntry {
    pub(crate) fn new<T: Entity>(id: EntryId, entity: T, state: EntityState) -> Result<Self> {
        let model = T::model();
        let current = model.to_row(&entity)?;
        let original = match state {
            EntityState::Added => Row::new(),
            _ => current.clone(),
        };

        Ok(Self {
            id,
            type_id: TypeId::of::<T>(),
            model,
            state,
            object: Box::new(entity),
            original,
            current,
        })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn model(&self) -> &'static EntityModel {
        self.model
    }

    pub fn table_name(&self) -> &'static str {
        self.model.table_name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// True when the tracked entity is a `T`.
    pub fn is<T: Entity>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn entity<T: Entity>(&self) -> Option<&T> {
        self.object.as_any().downcast_ref::<T>()
    }

    pub(crate) fn entity_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.object.as_any_mut().downcast_mut::<T>()
    }

    /// Values as of the last detect, load or commit.
    pub fn current_values(&self) -> &Row {
        &self.current
    }

    /// Values as last saved or loaded. Empty for Added entries.
    pub fn original_values(&self) -> &Row {
        &self.original
    }

    pub fn current_value(&self, column: &str) -> &Value {
        self.current.get(column).unwrap_or(&NULL)
    }

    pub fn original_value(&self, column: &str) -> &Value {
        self.original.get(column).unwrap_or(&NULL)
    }

    /// Primary key as storage knows it: the original key for persisted
    /// entries, the current one for Added entries.
    pub fn key_values(&self) -> Row {
        match self.state {
            EntityState::Added => self.model.key_of(&self.current),
            _ => self.model.key_of(&self.original),
        }
    }

    pub fn is_modified(&self, column: &ColumnDef) -> bool {
        self.state == EntityState::Modified
            && !column.primary_key
            && self.current_value(column.name) != self.original_value(column.name)
    }

    pub fn is_pending_generation(&self, column: &ColumnDef) -> bool {
        self.state == EntityState::Added
            && column.is_generated()
            && column.is_unset(self.current_value(column.name))
    }

    /// True when every key column holds a value storage will keep.
    pub(crate) fn has_resolved_key(&self) -> bool {
        self.model.primary_key().all(|c| !self.is_pending_generation(c))
    }

    /// One view per column, in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = PropertyEntry<'_>> {
        self.model.columns.iter().map(move |column| PropertyEntry {
            column,
            current_value: self.current_value(column.name),
            original_value: self.original_value(column.name),
            is_modified: self.is_modified(column),
            is_pending_generation: self.is_pending_generation(column),
        })
    }

    /// Refresh the current row from the entity and settle the state.
    pub(crate) fn detect(&mut self) -> Result<()> {
        match self.state {
            EntityState::Added => {
                self.current = self.object.to_row(self.model)?;
            }
            EntityState::Unchanged | EntityState::Modified => {
                let current = self.object.to_row(self.model)?;
                if self.model.key_of(&current) != self.model.key_of(&self.original) {
                    return Err(StoreError::invalid_operation(format!(
                        "primary key of tracked {} entry {} was changed",
                        self.model.table_name, self.id
                    )));
                }

                let changed = self
                    .model
                    .columns
                    .iter()
                    .filter(|c| !c.primary_key)
                    .any(|c| current.get(c.name) != self.original.get(c.name));

                self.current = current;
                self.state = if changed {
                    EntityState::Modified
                } else {
                    EntityState::Unchanged
                };
            }
            EntityState::Deleted | EntityState::Detached => {}
        }
        Ok(())
    }

    /// Write store-assigned values into the row and the entity.
    pub(crate) fn apply_generated(&mut self, generated: &Row) -> Result<()> {
        if generated.is_empty() {
            return Ok(());
        }
        for (column, value) in generated {
            self.current.insert(column.clone(), value.clone());
        }
        self.object.load_row(self.model, &self.current)
    }

    pub(crate) fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    pub(crate) fn accept(&mut self) {
        self.original = self.current.clone();
        self.state = EntityState::Unchanged;
    }
}

impl fmt::Debug for TrackedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntry")
            .field("id", &self.id)
            .field("table", &self.model.table_name)
            .field("state", &self.state)
            .field("current", &self.current)
            .finish()
    }
}

/// One column of a tracked entry.
#[derive(Debug, Clone, Copy)]
pub struct PropertyEntry<'a> {
    pub column: &'static ColumnDef,
    pub current_value: &'a Value,
    pub original_value: &'a Value,
    pub is_modified: bool,
    pub is_pending_generation: bool,
}

impl PropertyEntry<'_> {
    pub fn name(&self) -> &'static str {
        self.column.name
    }

    pub fn is_primary_key(&self) -> bool {
        self.column.primary_key
    }
}
