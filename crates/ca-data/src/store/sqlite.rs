//! SQLite Store
//!
//! Each batch runs in one transaction. Inserts that leave generated columns
//! unset read the assigned values back with `RETURNING`.

use async_trait::async_trait;
use ca_config::DatabaseConfig;
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::{Store, WriteCommand, WriteResult};
use crate::error::{Result, StoreError};
use crate::model::{ColumnDef, ColumnType, EntityModel, Row};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

const TIMESTAMP_DEFAULT: &str = "(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))";

/// Store backed by a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config.url`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!(url = %config.url, max_connections = config.max_connections, "Connected to SQLite");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the tables of `models` that do not exist yet.
    pub async fn init_schema(&self, models: &[&'static EntityModel]) -> Result<()> {
        for model in models {
            sqlx::query(&create_table_sql(model))
                .execute(&self.pool)
                .await?;
            debug!(table = model.table_name, "Ensured table exists");
        }
        info!(tables = models.len(), "SQLite schema initialized");
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute(&self, batch: &[WriteCommand]) -> Result<Vec<WriteResult>> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(batch.len());

        for command in batch {
            let result = match command {
                WriteCommand::Insert { model, values } => {
                    model.check_columns(values)?;
                    let supplied: Vec<&'static ColumnDef> = model
                        .columns
                        .iter()
                        .filter(|c| values.get(c.name).is_some_and(|v| !(c.is_generated() && c.is_unset(v))))
                        .collect();
                    let returned: Vec<&'static ColumnDef> = model
                        .generated_columns()
                        .filter(|c| !supplied.iter().any(|s| s.name == c.name))
                        .collect();

                    let sql = insert_sql(model, &supplied, &returned);
                    let mut query = sqlx::query(&sql);
                    for column in &supplied {
                        query = bind_value(query, model, column, &values[column.name])?;
                    }

                    if returned.is_empty() {
                        let done = query
                            .execute(&mut *tx)
                            .await
                            .map_err(|e| map_write_error(model, e))?;
                        WriteResult {
                            rows_affected: done.rows_affected(),
                            generated: Row::new(),
                        }
                    } else {
                        let row = query
                            .fetch_one(&mut *tx)
                            .await
                            .map_err(|e| map_write_error(model, e))?;
                        WriteResult {
                            rows_affected: 1,
                            generated: decode_columns(&row, &returned)?,
                        }
                    }
                }
                WriteCommand::Update { model, key, values } => {
                    model.check_columns(values)?;
                    if values.is_empty() {
                        return Err(StoreError::invalid_operation(format!(
                            "update of {} without values",
                            model.table_name
                        )));
                    }

                    let assignments: Vec<String> = values
                        .keys()
                        .map(|c| format!("{} = ?", quote(c)))
                        .collect();
                    let (predicate, key_columns) = key_predicate(model);
                    let sql = format!(
                        "UPDATE {} SET {} WHERE {}",
                        quote(model.table_name),
                        assignments.join(", "),
                        predicate
                    );

                    let mut query = sqlx::query(&sql);
                    for (name, value) in values {
                        let column = model
                            .column(name)
                            .ok_or_else(|| StoreError::unknown_column(model.table_name, name.as_str()))?;
                        query = bind_value(query, model, column, value)?;
                    }
                    for column in &key_columns {
                        query = bind_value(query, model, column, key_value(key, column))?;
                    }

                    let done = query
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| map_write_error(model, e))?;
                    expect_one_row(model, done.rows_affected())?
                }
                WriteCommand::Delete { model, key } => {
                    let (predicate, key_columns) = key_predicate(model);
                    let sql = format!("DELETE FROM {} WHERE {}", quote(model.table_name), predicate);

                    let mut query = sqlx::query(&sql);
                    for column in &key_columns {
                        query = bind_value(query, model, column, key_value(key, column))?;
                    }

                    let done = query
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| map_write_error(model, e))?;
                    expect_one_row(model, done.rows_affected())?
                }
            };
            results.push(result);
        }

        tx.commit().await?;
        debug!(commands = batch.len(), "Committed SQLite batch");
        Ok(results)
    }

    async fn find(&self, model: &'static EntityModel, key: &Row) -> Result<Option<Row>> {
        let mut rows = self.scan(model, &model.key_of(key)).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    async fn scan(&self, model: &'static EntityModel, filter: &Row) -> Result<Vec<Row>> {
        model.check_columns(filter)?;

        let columns: Vec<String> = model.columns.iter().map(|c| quote(c.name)).collect();
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), quote(model.table_name));

        let mut bound: Vec<(&'static ColumnDef, &Value)> = Vec::new();
        let mut conditions = Vec::with_capacity(filter.len());
        for (name, value) in filter {
            let column = model
                .column(name)
                .ok_or_else(|| StoreError::unknown_column(model.table_name, name.as_str()))?;
            if value.is_null() {
                conditions.push(format!("{} IS NULL", quote(column.name)));
            } else {
                conditions.push(format!("{} = ?", quote(column.name)));
                bound.push((column, value));
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let order: Vec<String> = model.primary_key().map(|c| quote(c.name)).collect();
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        let mut query = sqlx::query(&sql);
        for (column, value) in bound {
            query = bind_value(query, model, column, value)?;
        }

        let rows = query.fetch_all(&self.pool).await?;
        let all_columns: Vec<&'static ColumnDef> = model.columns.iter().collect();
        rows.iter().map(|row| decode_columns(row, &all_columns)).collect()
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text | ColumnType::Timestamp | ColumnType::Json => "TEXT",
    }
}

fn create_table_sql(model: &EntityModel) -> String {
    let keys: Vec<&ColumnDef> = model.primary_key().collect();
    let single_key = keys.len() == 1;

    let mut definitions: Vec<String> = model
        .columns
        .iter()
        .map(|column| {
            let mut definition = format!("{} {}", quote(column.name), sql_type(column.column_type));
            if column.primary_key && single_key {
                definition.push_str(" PRIMARY KEY");
                if column.is_generated() && column.column_type == ColumnType::Integer {
                    definition.push_str(" AUTOINCREMENT");
                }
            } else if !column.nullable && !column.is_generated() {
                definition.push_str(" NOT NULL");
            }
            if column.is_generated() && column.column_type == ColumnType::Timestamp {
                definition.push_str(" DEFAULT ");
                definition.push_str(TIMESTAMP_DEFAULT);
            }
            definition
        })
        .collect();

    if keys.len() > 1 {
        let names: Vec<String> = keys.iter().map(|c| quote(c.name)).collect();
        definitions.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(model.table_name),
        definitions.join(", ")
    )
}

fn insert_sql(model: &EntityModel, supplied: &[&ColumnDef], returned: &[&ColumnDef]) -> String {
    let mut sql = if supplied.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote(model.table_name))
    } else {
        let names: Vec<String> = supplied.iter().map(|c| quote(c.name)).collect();
        let placeholders = vec!["?"; supplied.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(model.table_name),
            names.join(", "),
            placeholders
        )
    };

    if !returned.is_empty() {
        let names: Vec<String> = returned.iter().map(|c| quote(c.name)).collect();
        sql.push_str(" RETURNING ");
        sql.push_str(&names.join(", "));
    }
    sql
}

fn key_predicate(model: &EntityModel) -> (String, Vec<&'static ColumnDef>) {
    let columns: Vec<&'static ColumnDef> = model.primary_key().collect();
    let predicate = columns
        .iter()
        .map(|c| format!("{} = ?", quote(c.name)))
        .collect::<Vec<_>>()
        .join(" AND ");
    (predicate, columns)
}

fn key_value<'a>(key: &'a Row, column: &ColumnDef) -> &'a Value {
    static NULL: Value = Value::Null;
    key.get(column.name).unwrap_or(&NULL)
}

fn expect_one_row(model: &EntityModel, rows_affected: u64) -> Result<WriteResult> {
    if rows_affected == 0 {
        return Err(StoreError::concurrency(model.table_name, rows_affected));
    }
    Ok(WriteResult {
        rows_affected,
        generated: Row::new(),
    })
}

fn bind_value<'q>(
    query: SqliteQuery<'q>,
    model: &EntityModel,
    column: &ColumnDef,
    value: &Value,
) -> Result<SqliteQuery<'q>> {
    let mismatch = || {
        StoreError::invalid_operation(format!(
            "{}.{} expects {:?}, got {}",
            model.table_name, column.name, column.column_type, value
        ))
    };

    if value.is_null() {
        return Ok(query.bind(None::<String>));
    }

    Ok(match column.column_type {
        ColumnType::Integer => query.bind(value.as_i64().ok_or_else(mismatch)?),
        ColumnType::Real => query.bind(value.as_f64().ok_or_else(mismatch)?),
        ColumnType::Boolean => query.bind(value.as_bool().ok_or_else(mismatch)?),
        ColumnType::Text | ColumnType::Timestamp => {
            query.bind(value.as_str().ok_or_else(mismatch)?.to_string())
        }
        ColumnType::Json => query.bind(value.to_string()),
    })
}

fn decode_columns(row: &SqliteRow, columns: &[&'static ColumnDef]) -> Result<Row> {
    columns
        .iter()
        .map(|column| -> Result<(String, Value)> {
            let name = column.name;
            let value = match column.column_type {
                ColumnType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
                ColumnType::Real => row.try_get::<Option<f64>, _>(name)?.map(Value::from),
                ColumnType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::from),
                ColumnType::Text | ColumnType::Timestamp => {
                    row.try_get::<Option<String>, _>(name)?.map(Value::from)
                }
                ColumnType::Json => match row.try_get::<Option<String>, _>(name)? {
                    Some(text) => Some(serde_json::from_str(&text)?),
                    None => None,
                },
            };
            Ok((name.to_string(), value.unwrap_or(Value::Null)))
        })
        .collect()
}

fn map_write_error(model: &EntityModel, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => {
                return StoreError::constraint(model.table_name, db.message());
            }
            _ => {}
        }
    }
    StoreError::from(e)
}
