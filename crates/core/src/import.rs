use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mutations::MutationError;
use crate::query_runner::QueryBackend;
use crate::schema::TableSchema;
use crate::sql_generator::insert_row_sql;
use crate::value::CellValue;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ReaderError {
    message: String,
}

impl ReaderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReaderError,
    },
    #[error("`{}` has no data rows", path.display())]
    EmptySheet { path: PathBuf },
    #[error("no spreadsheet column matches a column of `{0}`")]
    NoMatchingColumns(String),
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// First worksheet of a workbook: a header row and the data rows below it.
/// Blank cells are already `Null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

pub trait SpreadsheetReader {
    fn read_first_sheet(&self, path: &Path) -> Result<ImportSheet, ReaderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub rows: usize,
    pub matched_columns: Vec<String>,
    pub ignored_headers: Vec<String>,
}

/// Reads the first sheet of `path` and appends its rows to the table.
pub async fn import_spreadsheet<B, R>(
    backend: &B,
    reader: &R,
    schema: &TableSchema,
    path: &Path,
) -> Result<ImportReport, ImportError>
where
    B: QueryBackend + Sync,
    R: SpreadsheetReader + ?Sized,
{
    let sheet = reader
        .read_first_sheet(path)
        .map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if sheet.rows.is_empty() {
        return Err(ImportError::EmptySheet {
            path: path.to_path_buf(),
        });
    }
    import_rows(backend, schema, &sheet).await
}

/// Every table column is written: headers matching a column name exactly
/// supply its value, all other columns get NULL. Headers naming no column
/// are ignored.
pub async fn import_rows<B>(
    backend: &B,
    schema: &TableSchema,
    sheet: &ImportSheet,
) -> Result<ImportReport, ImportError>
where
    B: QueryBackend + Sync,
{
    if schema.is_unknown() {
        return Err(MutationError::UnknownSchema(schema.name.clone()).into());
    }

    let columns = schema.column_names().collect::<Vec<_>>();
    let sources = columns
        .iter()
        .map(|column| sheet.headers.iter().position(|header| header == column))
        .collect::<Vec<_>>();
    if sources.iter().all(Option::is_none) {
        return Err(ImportError::NoMatchingColumns(schema.name.clone()));
    }

    let sql = insert_row_sql(&schema.name, &columns).map_err(MutationError::from)?;
    for row in &sheet.rows {
        let values = sources
            .iter()
            .map(|source| {
                source
                    .and_then(|index| row.get(index))
                    .cloned()
                    .unwrap_or(CellValue::Null)
            })
            .collect::<Vec<_>>();
        backend
            .execute(&sql, &values)
            .await
            .map_err(MutationError::Backend)?;
    }

    let report = ImportReport {
        rows: sheet.rows.len(),
        matched_columns: columns
            .iter()
            .zip(&sources)
            .filter(|(_, source)| source.is_some())
            .map(|(column, _)| (*column).to_string())
            .collect(),
        ignored_headers: sheet
            .headers
            .iter()
            .filter(|header| !schema.has_column(header))
            .cloned()
            .collect(),
    };
    tracing::info!(
        table = %schema.name,
        rows = report.rows,
        matched = report.matched_columns.len(),
        "spreadsheet imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        import_rows, import_spreadsheet, ImportError, ImportSheet, ReaderError, SpreadsheetReader,
    };
    use crate::query_runner::test_support::RecordingQueryBackend;
    use crate::schema::{SchemaEntry, TableSchema};
    use crate::value::CellValue;

    fn people() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                SchemaEntry::new(0, "id", "INTEGER"),
                SchemaEntry::new(1, "name", "TEXT"),
                SchemaEntry::new(2, "score", "REAL"),
            ],
        )
    }

    struct FixedReader(Result<ImportSheet, ReaderError>);

    impl SpreadsheetReader for FixedReader {
        fn read_first_sheet(&self, _path: &Path) -> Result<ImportSheet, ReaderError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn rows_bind_every_column_in_table_order() {
        let backend = RecordingQueryBackend::with_rows(Vec::new());
        let sheet = ImportSheet {
            headers: vec!["name".to_string(), "nickname".to_string(), "id".to_string()],
            rows: vec![
                vec![CellValue::from("Ann"), CellValue::from("A"), CellValue::Integer(1)],
                vec![CellValue::Null, CellValue::from("B")],
            ],
        };

        let report = import_rows(&backend, &people(), &sheet).await.expect("import");
        assert_eq!(report.rows, 2);
        assert_eq!(report.matched_columns, vec!["id", "name"]);
        assert_eq!(report.ignored_headers, vec!["nickname"]);

        let calls = backend.calls();
        assert_eq!(
            calls[0].0,
            "INSERT INTO \"people\" (\"id\", \"name\", \"score\") VALUES (?, ?, ?)"
        );
        assert_eq!(
            calls[0].1,
            vec![CellValue::Integer(1), CellValue::from("Ann"), CellValue::Null]
        );
        assert_eq!(calls[1].1, vec![CellValue::Null; 3]);
    }

    #[tokio::test]
    async fn sheet_without_known_headers_is_rejected() {
        let backend = RecordingQueryBackend::with_rows(Vec::new());
        let sheet = ImportSheet {
            headers: vec!["Name".to_string()],
            rows: vec![vec![CellValue::from("Ann")]],
        };
        let err = import_rows(&backend, &people(), &sheet).await.expect_err("no match");
        assert!(matches!(err, ImportError::NoMatchingColumns(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_or_unreadable_sheets_insert_nothing() {
        let backend = RecordingQueryBackend::with_rows(Vec::new());
        let empty = FixedReader(Ok(ImportSheet {
            headers: vec!["id".to_string()],
            rows: Vec::new(),
        }));
        let err = import_spreadsheet(&backend, &empty, &people(), Path::new("in.xlsx"))
            .await
            .expect_err("empty");
        assert!(matches!(err, ImportError::EmptySheet { .. }));

        let broken = FixedReader(Err(ReaderError::new("not a workbook")));
        let err = import_spreadsheet(&backend, &broken, &people(), Path::new("in.xlsx"))
            .await
            .expect_err("unreadable");
        assert!(err.to_string().contains("not a workbook"), "{err}");
        assert!(backend.calls().is_empty());
    }
}
