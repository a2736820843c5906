use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::export::file_name_part;
use crate::image_blob::{detect_image_format, is_image_column, MIN_IMAGE_BLOB_LEN};
use crate::query_runner::{QueryBackend, QueryBackendError};
use crate::schema::{SchemaBackend, SchemaBackendError, SchemaEntry};
use crate::sql_generator::{count_rows_sql, select_non_null_sql, SqlGenerationError};
use crate::value::CellValue;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to read the catalog: {0}")]
    Schema(#[from] SchemaBackendError),
    #[error("failed to read table data: {0}")]
    Query(#[from] QueryBackendError),
    #[error(transparent)]
    Sql(#[from] SqlGenerationError),
    #[error("cannot create `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub name: String,
    pub columns: Vec<SchemaEntry>,
    /// `None` when counting failed.
    pub row_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseReport {
    pub database_name: String,
    pub tables: Vec<TableReport>,
}

impl fmt::Display for DatabaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Database: {}", self.database_name)?;
        writeln!(f, "Tables: {}", self.tables.len())?;
        for table in &self.tables {
            writeln!(f)?;
            writeln!(f, "Table: {}", table.name)?;
            writeln!(f, "Columns:")?;
            for column in &table.columns {
                writeln!(f, "  - {} ({})", column.name, column.declared_type)?;
            }
            match table.row_count {
                Some(count) => writeln!(f, "Rows: {count}")?,
                None => writeln!(f, "Rows: unavailable")?,
            }
        }
        Ok(())
    }
}

/// Lists every table with its columns and row count. A table whose rows
/// cannot be counted is still reported.
pub async fn inspect_database<B>(
    backend: &B,
    database_name: &str,
) -> Result<DatabaseReport, InspectError>
where
    B: SchemaBackend + QueryBackend + Sync,
{
    let mut tables = Vec::new();
    for name in backend.list_tables().await? {
        let columns = backend.table_columns(&name).await?;
        let row_count = count_rows(backend, &name).await;
        tables.push(TableReport {
            name,
            columns,
            row_count,
        });
    }

    Ok(DatabaseReport {
        database_name: database_name.to_string(),
        tables,
    })
}

async fn count_rows<B: QueryBackend + Sync>(backend: &B, table: &str) -> Option<u64> {
    let sql = count_rows_sql(table).ok()?;
    let rows = match backend.fetch_rows(&sql, &[]).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(%table, %error, "row count failed");
            return None;
        }
    };
    match rows.first().and_then(|row| row.values.first()) {
        Some(CellValue::Integer(count)) => u64::try_from(*count).ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub table: String,
    pub column: String,
    pub rowid: i64,
    pub size: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlob {
    pub table: String,
    pub column: String,
    pub rowid: i64,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractionReport {
    pub saved: Vec<ExtractedImage>,
    pub too_small: Vec<SkippedBlob>,
    pub failures: Vec<String>,
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for image in &self.saved {
            writeln!(
                f,
                "saved {} ({} bytes)",
                image.path.display(),
                image.size
            )?;
        }
        for blob in &self.too_small {
            writeln!(
                f,
                "{}.{} row {}: {} bytes is too small for a photo",
                blob.table, blob.column, blob.rowid, blob.size
            )?;
        }
        for failure in &self.failures {
            writeln!(f, "{failure}")?;
        }
        if self.saved.is_empty() {
            writeln!(f, "No photos found")
        } else {
            writeln!(f, "Photos saved: {}", self.saved.len())
        }
    }
}

/// Writes every image-like BLOB of every table to
/// `photo_<table>_<column>_<rowid>.<ext>` under `target_dir`.
pub async fn extract_images<B>(
    backend: &B,
    target_dir: &Path,
) -> Result<ExtractionReport, InspectError>
where
    B: SchemaBackend + QueryBackend + Sync,
{
    fs::create_dir_all(target_dir).map_err(|source| InspectError::Io {
        path: target_dir.to_path_buf(),
        source,
    })?;

    let mut report = ExtractionReport::default();
    for table in backend.list_tables().await? {
        let columns = backend.table_columns(&table).await?;
        for column in columns
            .iter()
            .filter(|column| is_image_column(&column.name, Some(&column.declared_type)))
        {
            let sql = select_non_null_sql(&table, &column.name)?;
            for row in backend.fetch_rows(&sql, &[]).await? {
                let (Some(CellValue::Integer(rowid)), Some(CellValue::Blob(bytes))) =
                    (row.values.first(), row.values.get(1))
                else {
                    continue;
                };

                if bytes.len() < MIN_IMAGE_BLOB_LEN {
                    report.too_small.push(SkippedBlob {
                        table: table.clone(),
                        column: column.name.clone(),
                        rowid: *rowid,
                        size: bytes.len(),
                    });
                    continue;
                }

                let extension = detect_image_format(bytes).map_or("jpg", |format| format.extension());
                let path = target_dir.join(format!(
                    "photo_{}_{}_{rowid}.{extension}",
                    file_name_part(&table),
                    file_name_part(&column.name)
                ));
                match fs::write(&path, bytes) {
                    Ok(()) => report.saved.push(ExtractedImage {
                        table: table.clone(),
                        column: column.name.clone(),
                        rowid: *rowid,
                        size: bytes.len(),
                        path,
                    }),
                    Err(error) => report
                        .failures
                        .push(format!("failed to save {}: {error}", path.display())),
                }
            }
        }
    }

    tracing::info!(
        saved = report.saved.len(),
        dir = %target_dir.display(),
        "images extracted"
    );
    Ok(report)
}
