use thiserror::Error;

use crate::query_runner::{QueryBackend, QueryBackendError, QueryRow};
use crate::schema::TableSchema;
use crate::sql_generator::{
    add_column_sql, create_table_sql, delete_row_sql, drop_table_sql, fill_column_sql,
    insert_row_sql, rename_column_sql, update_cell_sql, ColumnDefinition, SqlGenerationError,
};
use crate::value::{coerce_input, coerce_insert_input, CellValue};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Sql(#[from] SqlGenerationError),
    #[error("database rejected the change: {0}")]
    Backend(#[source] QueryBackendError),
    #[error("schema of table `{0}` is unknown")]
    UnknownSchema(String),
    #[error("column `{column}` not found in table `{table}`")]
    UnknownColumn { table: String, column: String },
    #[error("key column `{column}` of `{table}` is not part of the current view")]
    PrimaryKeyNotVisible { table: String, column: String },
    #[error("row has {actual} values but the view has {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },
}

/// Identifies one row of a table by the value of its key column.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey {
    pub column: String,
    pub value: CellValue,
}

impl RowKey {
    /// Takes the key value from a displayed result row. The table's key is
    /// its ordinal-zero column, which must be visible under its bare name.
    pub fn from_row(
        schema: &TableSchema,
        display_columns: &[String],
        row: &QueryRow,
    ) -> Result<Self, MutationError> {
        if row.values.len() != display_columns.len() {
            return Err(MutationError::ArityMismatch {
                expected: display_columns.len(),
                actual: row.values.len(),
            });
        }
        let key_column = schema
            .primary_key_column()
            .ok_or_else(|| MutationError::UnknownSchema(schema.name.clone()))?;
        let position = display_columns
            .iter()
            .position(|column| *column == key_column.name)
            .ok_or_else(|| MutationError::PrimaryKeyNotVisible {
                table: schema.name.clone(),
                column: key_column.name.clone(),
            })?;

        Ok(Self {
            column: key_column.name.clone(),
            value: row.values[position].clone(),
        })
    }
}

/// Which table of the current view owns a bare display column: the base
/// table first, then joined tables in join order.
#[must_use]
pub fn owning_table<'a>(
    base: &'a TableSchema,
    joined: &[&'a TableSchema],
    column: &str,
) -> Option<&'a TableSchema> {
    std::iter::once(base)
        .chain(joined.iter().copied())
        .find(|table| table.has_column(column))
}

fn declared_type<'a>(schema: &'a TableSchema, column: &str) -> Result<&'a str, MutationError> {
    schema
        .column(column)
        .map(|entry| entry.declared_type.as_str())
        .ok_or_else(|| MutationError::UnknownColumn {
            table: schema.name.clone(),
            column: column.to_string(),
        })
}

async fn execute<B>(backend: &B, sql: &str, params: &[CellValue]) -> Result<u64, MutationError>
where
    B: QueryBackend + Sync,
{
    tracing::debug!(%sql, params = params.len(), "executing statement");
    backend
        .execute(sql, params)
        .await
        .map_err(MutationError::Backend)
}

/// Writes typed text into one cell; BOOLEAN columns are normalised to 1/0.
pub async fn update_cell<B>(
    backend: &B,
    schema: &TableSchema,
    key: &RowKey,
    column: &str,
    input: &str,
) -> Result<u64, MutationError>
where
    B: QueryBackend + Sync,
{
    let value = coerce_input(input, declared_type(schema, column)?);
    let sql = update_cell_sql(&schema.name, column, &key.column)?;
    let affected = execute(backend, &sql, &[value, key.value.clone()]).await?;
    tracing::info!(table = %schema.name, %column, affected, "cell updated");
    Ok(affected)
}

pub async fn update_image<B>(
    backend: &B,
    schema: &TableSchema,
    key: &RowKey,
    column: &str,
    bytes: Vec<u8>,
) -> Result<u64, MutationError>
where
    B: QueryBackend + Sync,
{
    declared_type(schema, column)?;
    let size = bytes.len();
    let sql = update_cell_sql(&schema.name, column, &key.column)?;
    let affected = execute(backend, &sql, &[CellValue::Blob(bytes), key.value.clone()]).await?;
    tracing::info!(table = %schema.name, %column, size, affected, "image stored");
    Ok(affected)
}

pub async fn delete_row<B>(
    backend: &B,
    schema: &TableSchema,
    key: &RowKey,
) -> Result<u64, MutationError>
where
    B: QueryBackend + Sync,
{
    let sql = delete_row_sql(&schema.name, &key.column)?;
    let affected = execute(backend, &sql, std::slice::from_ref(&key.value)).await?;
    tracing::info!(table = %schema.name, affected, "row deleted");
    Ok(affected)
}

/// Inserts one row from `(column, typed text)` pairs. Empty text is stored
/// as NULL.
pub async fn insert_row<B>(
    backend: &B,
    schema: &TableSchema,
    inputs: &[(String, String)],
) -> Result<u64, MutationError>
where
    B: QueryBackend + Sync,
{
    if schema.is_unknown() {
        return Err(MutationError::UnknownSchema(schema.name.clone()));
    }

    let mut columns = Vec::with_capacity(inputs.len());
    let mut values = Vec::with_capacity(inputs.len());
    for (column, input) in inputs {
        values.push(coerce_insert_input(input, declared_type(schema, column)?));
        columns.push(column.as_str());
    }

    let sql = insert_row_sql(&schema.name, &columns)?;
    let affected = execute(backend, &sql, &values).await?;
    tracing::info!(table = %schema.name, "row inserted");
    Ok(affected)
}

pub async fn create_table<B>(
    backend: &B,
    table: &str,
    columns: &[ColumnDefinition],
) -> Result<(), MutationError>
where
    B: QueryBackend + Sync,
{
    let sql = create_table_sql(table, columns)?;
    execute(backend, &sql, &[]).await?;
    tracing::info!(%table, columns = columns.len(), "table created");
    Ok(())
}

pub async fn drop_table<B>(backend: &B, table: &str) -> Result<(), MutationError>
where
    B: QueryBackend + Sync,
{
    let sql = drop_table_sql(table)?;
    execute(backend, &sql, &[]).await?;
    tracing::info!(%table, "table dropped");
    Ok(())
}

/// Adds a column; a default, when given, is written to every existing row
/// as a bound value after the column exists.
pub async fn add_column<B>(
    backend: &B,
    table: &str,
    column: &ColumnDefinition,
    default: Option<&str>,
) -> Result<(), MutationError>
where
    B: QueryBackend + Sync,
{
    let sql = add_column_sql(table, column)?;
    execute(backend, &sql, &[]).await?;

    if let Some(default) = default.filter(|value| !value.is_empty()) {
        let fill = fill_column_sql(table, &column.name)?;
        let value = coerce_input(default, &column.declared_type);
        execute(backend, &fill, &[value]).await?;
    }
    tracing::info!(%table, column = %column.name, "column added");
    Ok(())
}

pub async fn rename_column<B>(
    backend: &B,
    schema: &TableSchema,
    old_name: &str,
    new_name: &str,
) -> Result<(), MutationError>
where
    B: QueryBackend + Sync,
{
    declared_type(schema, old_name)?;
    let sql = rename_column_sql(&schema.name, old_name, new_name)?;
    execute(backend, &sql, &[]).await?;
    tracing::info!(table = %schema.name, %old_name, %new_name, "column renamed");
    Ok(())
}
