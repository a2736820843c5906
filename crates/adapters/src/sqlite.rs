use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, TypeInfo, ValueRef};
use tabula_core::query_runner::{QueryBackend, QueryBackendError, QueryRow};
use tabula_core::schema::{SchemaBackend, SchemaBackendError, SchemaEntry};
use tabula_core::sql_generator::{table_info_sql, LIST_TABLES_SQL};
use tabula_core::value::CellValue;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to open database {path}: {source}")]
pub struct OpenError {
    path: PathBuf,
    #[source]
    source: sqlx::Error,
}

/// One SQLite file behind a single-connection pool, so every statement
/// runs on the same connection in autocommit mode.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteDatabase {
    /// Opens `path`, creating the file when it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| OpenError {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), "database opened");
        Ok(Self { pool, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SchemaBackend for SqliteDatabase {
    async fn list_tables(&self) -> Result<Vec<String>, SchemaBackendError> {
        sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(to_schema_error)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<SchemaEntry>, SchemaBackendError> {
        let sql = table_info_sql(table).map_err(|error| SchemaBackendError::new(error.to_string()))?;
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(to_schema_error)?;

        rows.iter()
            .map(|row| {
                let ordinal: i64 = row.try_get("cid").map_err(to_schema_error)?;
                let name: String = row.try_get("name").map_err(to_schema_error)?;
                let declared_type: String = row.try_get("type").map_err(to_schema_error)?;
                let ordinal = usize::try_from(ordinal)
                    .map_err(|_| SchemaBackendError::new(format!("bad column ordinal {ordinal}")))?;
                Ok(SchemaEntry::new(ordinal, name, declared_type))
            })
            .collect()
    }
}

#[async_trait]
impl QueryBackend for SqliteDatabase {
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[CellValue],
    ) -> Result<Vec<QueryRow>, QueryBackendError> {
        let mut stream = bind_params(sqlx::query(sql), params).fetch(&self.pool);
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await.map_err(to_query_error)? {
            rows.push(row_to_query_row(&row)?);
        }
        Ok(rows)
    }

    async fn execute(&self, sql: &str, params: &[CellValue]) -> Result<u64, QueryBackendError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(to_query_error)?;
        Ok(result.rows_affected())
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [CellValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            CellValue::Null => query.bind(None::<i64>),
            CellValue::Integer(value) => query.bind(*value),
            CellValue::Real(value) => query.bind(*value),
            CellValue::Text(value) => query.bind(value.as_str()),
            CellValue::Blob(value) => query.bind(value.as_slice()),
        };
    }
    query
}

fn row_to_query_row(row: &SqliteRow) -> Result<QueryRow, QueryBackendError> {
    (0..row.len())
        .map(|index| cell_value(row, index))
        .collect::<Result<Vec<_>, _>>()
        .map(QueryRow::new)
}

// Dispatches on the storage class of the value itself, not the declared
// column type.
fn cell_value(row: &SqliteRow, index: usize) -> Result<CellValue, QueryBackendError> {
    let raw = row.try_get_raw(index).map_err(to_query_error)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let storage_class = raw.type_info().name().to_string();

    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => CellValue::Integer(row.try_get(index).map_err(to_query_error)?),
        "REAL" => CellValue::Real(row.try_get(index).map_err(to_query_error)?),
        "BLOB" => CellValue::Blob(row.try_get(index).map_err(to_query_error)?),
        _ => CellValue::Text(row.try_get(index).map_err(to_query_error)?),
    };
    Ok(value)
}

fn to_schema_error(error: sqlx::Error) -> SchemaBackendError {
    SchemaBackendError::new(error.to_string())
}

fn to_query_error(error: sqlx::Error) -> QueryBackendError {
    QueryBackendError::new(error.to_string())
}
