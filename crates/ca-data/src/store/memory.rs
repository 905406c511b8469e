//! In-memory store for tests and local development.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Store, WriteCommand, WriteResult};
use crate::error::{Result, StoreError};
use crate::model::{ColumnType, EntityModel, Row};
use crate::tracking::key_string;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: IndexMap<String, Row>,
    last_id: i64,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<&'static str, Table>,
    rejected: HashSet<String>,
}

/// Tables held in process memory.
///
/// A batch is applied to a copy of the tables which replaces the live ones
/// only when every command succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later batch touching `table` fail with
    /// [`StoreError::Rejected`].
    pub fn fail_writes_to(&self, table: impl Into<String>) {
        self.state.lock().rejected.insert(table.into());
    }

    pub fn clear_failures(&self) {
        self.state.lock().rejected.clear();
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute(&self, batch: &[WriteCommand]) -> Result<Vec<WriteResult>> {
        let mut state = self.state.lock();

        if let Some(command) = batch.iter().find(|c| state.rejected.contains(c.table_name())) {
            return Err(StoreError::Rejected {
                table: command.table_name().to_string(),
            });
        }

        let mut tables = state.tables.clone();
        let mut results = Vec::with_capacity(batch.len());
        for command in batch {
            let table = tables.entry(command.table_name()).or_default();
            results.push(apply(table, command)?);
        }

        state.tables = tables;
        debug!(commands = batch.len(), "Applied in-memory batch");
        Ok(results)
    }

    async fn find(&self, model: &'static EntityModel, key: &Row) -> Result<Option<Row>> {
        let key = model.key_of(key);
        let state = self.state.lock();
        Ok(state
            .tables
            .get(model.table_name)
            .and_then(|t| t.rows.get(&key_string(&key)))
            .cloned())
    }

    async fn scan(&self, model: &'static EntityModel, filter: &Row) -> Result<Vec<Row>> {
        model.check_columns(filter)?;

        let state = self.state.lock();
        let Some(table) = state.tables.get(model.table_name) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Row> = table
            .rows
            .values()
            .filter(|row| filter.iter().all(|(column, value)| row.get(column) == Some(value)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_keys(&model.key_of(a), &model.key_of(b)));
        Ok(rows)
    }
}

fn apply(table: &mut Table, command: &WriteCommand) -> Result<WriteResult> {
    match command {
        WriteCommand::Insert { model, values } => insert(table, *model, values),
        WriteCommand::Update { model, key, values } => {
            model.check_columns(values)?;
            let row = table
                .rows
                .get_mut(&key_string(&model.key_of(key)))
                .ok_or_else(|| StoreError::concurrency(model.table_name, 0))?;
            for (column, value) in values {
                row.insert(column.clone(), value.clone());
            }
            check_not_null(model, row)?;
            Ok(WriteResult {
                rows_affected: 1,
                generated: Row::new(),
            })
        }
        WriteCommand::Delete { model, key } => {
            table
                .rows
                .shift_remove(&key_string(&model.key_of(key)))
                .ok_or_else(|| StoreError::concurrency(model.table_name, 0))?;
            Ok(WriteResult {
                rows_affected: 1,
                generated: Row::new(),
            })
        }
    }
}

fn insert(table: &mut Table, model: &'static EntityModel, values: &Row) -> Result<WriteResult> {
    model.check_columns(values)?;

    let mut row = Row::new();
    let mut generated = Row::new();
    for column in model.columns {
        let value = values.get(column.name).cloned().unwrap_or(Value::Null);
        if column.is_generated() && column.is_unset(&value) {
            let value = match column.column_type {
                ColumnType::Integer => {
                    table.last_id += 1;
                    Value::from(table.last_id)
                }
                ColumnType::Timestamp => {
                    Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
                }
                other => {
                    warn!(
                        table = model.table_name,
                        column = column.name,
                        column_type = ?other,
                        "No generator for column, storing null"
                    );
                    Value::Null
                }
            };
            generated.insert(column.name.to_string(), value.clone());
            row.insert(column.name.to_string(), value);
        } else {
            if column.is_generated() && column.column_type == ColumnType::Integer {
                if let Some(explicit) = value.as_i64() {
                    table.last_id = table.last_id.max(explicit);
                }
            }
            row.insert(column.name.to_string(), value);
        }
    }

    check_not_null(model, &row)?;

    let key = key_string(&model.key_of(&row));
    if table.rows.contains_key(&key) {
        let columns: Vec<String> = model
            .primary_key()
            .map(|c| format!("{}.{}", model.table_name, c.name))
            .collect();
        return Err(StoreError::constraint(
            model.table_name,
            format!("UNIQUE constraint failed: {}", columns.join(", ")),
        ));
    }
    table.rows.insert(key, row);

    Ok(WriteResult {
        rows_affected: 1,
        generated,
    })
}

fn check_not_null(model: &EntityModel, row: &Row) -> Result<()> {
    let missing = model
        .columns
        .iter()
        .find(|c| !c.nullable && !c.is_generated() && row.get(c.name).map_or(true, Value::is_null));
    match missing {
        Some(column) => Err(StoreError::constraint(
            model.table_name,
            format!("NOT NULL constraint failed: {}.{}", model.table_name, column.name),
        )),
        None => Ok(()),
    }
}

fn compare_keys(a: &Row, b: &Row) -> Ordering {
    a.values()
        .zip(b.values())
        .map(|(x, y)| compare_values(x, y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
