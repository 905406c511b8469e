//! Entity Model
//!
//! Static metadata every persisted type declares once: its table name and
//! its columns. Entities move in and out of storage as [`Row`]s, ordered
//! maps of column name to JSON value built with serde.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Column name to value, in column declaration order.
pub type Row = IndexMap<String, Value>;

/// Build a [`Row`] from `column => value` pairs.
///
/// ```ignore
/// let key = row! { "id" => 42 };
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::model::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::model::Row::new();
        $(
            row.insert($column.to_string(), $crate::__serde_json::json!($value));
        )+
        row
    }};
}

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    /// RFC 3339 text
    Timestamp,
    /// Arbitrary JSON stored as text
    Json,
}

/// Whether the store assigns the column's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueGenerated {
    Never,
    /// Assigned on insert when the entity leaves it unset
    OnAdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub generated: ValueGenerated,
    pub nullable: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            primary_key: false,
            generated: ValueGenerated::Never,
            nullable: false,
        }
    }

    pub const fn key(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, column_type)
        }
    }

    pub const fn generated_on_add(self) -> Self {
        Self {
            generated: ValueGenerated::OnAdd,
            ..self
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub fn is_generated(&self) -> bool {
        self.generated == ValueGenerated::OnAdd
    }

    /// An unset value is null or, for integer columns, zero: what a Rust
    /// integer key holds before the database assigns it.
    pub fn is_unset(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Number(n) if self.column_type == ColumnType::Integer => n.as_i64() == Some(0),
            _ => false,
        }
    }
}

/// Table name and columns of one entity type.
#[derive(Debug)]
pub struct EntityModel {
    pub table_name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl EntityModel {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        let columns: &'static [ColumnDef] = self.columns;
        columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &'static ColumnDef> {
        let columns: &'static [ColumnDef] = self.columns;
        columns.iter().filter(|c| c.primary_key)
    }

    pub fn primary_key_columns(&self) -> BTreeSet<&'static str> {
        self.primary_key().map(|c| c.name).collect()
    }

    pub fn generated_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        let columns: &'static [ColumnDef] = self.columns;
        columns.iter().filter(|c| c.is_generated())
    }

    /// Primary key subset of `row`, in key declaration order. Missing key
    /// columns come back as null.
    pub fn key_of(&self, row: &Row) -> Row {
        self.primary_key()
            .map(|c| (c.name.to_string(), row.get(c.name).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// Serialize an entity into a row holding exactly this model's columns.
    pub fn to_row<T: Serialize>(&self, entity: &T) -> Result<Row> {
        let mut fields = match serde_json::to_value(entity)? {
            Value::Object(fields) => fields,
            other => {
                return Err(StoreError::invalid_operation(format!(
                    "{} entities must serialize to an object, got {}",
                    self.table_name, other
                )))
            }
        };

        let row: Row = self
            .columns
            .iter()
            .map(|c| (c.name.to_string(), fields.remove(c.name).unwrap_or(Value::Null)))
            .collect();

        if let Some(extra) = fields.keys().next() {
            return Err(StoreError::unknown_column(self.table_name, extra.as_str()));
        }

        Ok(row)
    }

    /// Rebuild an entity from a row.
    pub fn from_row<T: DeserializeOwned>(&self, row: &Row) -> Result<T> {
        let fields: Map<String, Value> = row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Reject columns this model does not declare.
    pub fn check_columns(&self, row: &Row) -> Result<()> {
        match row.keys().find(|name| self.column(name).is_none()) {
            Some(unknown) => Err(StoreError::unknown_column(self.table_name, unknown.as_str())),
            None => Ok(()),
        }
    }
}

/// A persisted type with static table metadata.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn model() -> &'static EntityModel;

    fn table_name() -> &'static str {
        Self::model().table_name
    }

    fn primary_key_columns() -> BTreeSet<&'static str> {
        Self::model().primary_key_columns()
    }
}
