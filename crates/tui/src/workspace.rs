use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tabula_adapters::codec::ImageCrateCodec;
use tabula_adapters::export::{export_table_to_csv, export_table_to_json};
use tabula_adapters::pdf::PdfWriter;
use tabula_adapters::sqlite::{OpenError, SqliteDatabase};
use tabula_adapters::workbook::CalamineReader;
use tabula_adapters::xlsx::XlsxSpreadsheet;
use tabula_core::export::{
    export_document, export_spreadsheet, ExportError, ExportReport, ExportSettings, ExportTable,
};
use tabula_core::image_blob::is_displayable_image_bytes;
use tabula_core::import::{import_spreadsheet, ImportError};
use tabula_core::inspect::{extract_images, inspect_database, InspectError};
use tabula_core::joins::{JoinKind, QuickJoinOutcome};
use tabula_core::mutations::{self, MutationError, RowKey};
use tabula_core::query_builder::{SortDirection, SortSpec};
use tabula_core::query_runner::{QueryRunner, QueryRunnerError, ResultSet};
use tabula_core::schema::{SchemaCacheError, SchemaIntrospector, TableSchema};
use tabula_core::session::{Session, SessionError, ViewSchemas};
use tabula_core::sql_generator::ColumnDefinition;
use thiserror::Error;
use tokio::runtime::Runtime;

const DEFAULT_COLUMN_TYPE: &str = "TEXT";

/// Failure of one user action. Shown in the status line, never fatal.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Schema(#[from] SchemaCacheError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Query(#[from] QueryRunnerError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Inspect(#[from] InspectError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("cannot read `{}`: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Input(String),
    #[error("no rows to work on; select a table first")]
    NoResult,
}

impl WorkspaceError {
    fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Pdf,
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// The rows on screen and what is known about their columns.
#[derive(Debug)]
pub struct Grid {
    pub result: ResultSet,
    pub image_columns: Vec<bool>,
    view: ViewSchemas,
}

impl Grid {
    #[must_use]
    pub fn is_image_column(&self, column: usize) -> bool {
        self.image_columns.get(column).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn column_name(&self, column: usize) -> Option<&str> {
        self.result.columns.get(column).map(String::as_str)
    }

    /// Declared BLOB in the table that owns the column.
    #[must_use]
    pub fn is_blob_column(&self, column: usize) -> bool {
        self.column_name(column)
            .and_then(|name| self.view.owner_of(name).and_then(|owner| owner.column(name)))
            .is_some_and(|entry| entry.declared_type.trim().eq_ignore_ascii_case("BLOB"))
    }
}

/// One open database plus the session built on top of it. Every operation
/// runs to completion on the caller's runtime.
#[derive(Debug)]
pub struct Workspace {
    database: SqliteDatabase,
    introspector: SchemaIntrospector<SqliteDatabase>,
    runner: QueryRunner<SqliteDatabase>,
    session: Session,
    tables: Vec<String>,
    grid: Option<Grid>,
}

impl Workspace {
    pub fn open(
        runtime: &Runtime,
        path: &Path,
        schema_ttl: std::time::Duration,
    ) -> Result<Self, WorkspaceError> {
        let database = runtime.block_on(SqliteDatabase::open(path))?;
        let mut workspace = Self {
            introspector: SchemaIntrospector::new(database.clone(), schema_ttl),
            runner: QueryRunner::new(database.clone()),
            session: Session::new(path),
            database,
            tables: Vec::new(),
            grid: None,
        };
        workspace.refresh_tables(runtime)?;
        Ok(workspace)
    }

    pub fn close(self, runtime: &Runtime) {
        runtime.block_on(self.database.close());
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    #[must_use]
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    fn refresh_tables(&mut self, runtime: &Runtime) -> Result<(), WorkspaceError> {
        self.tables = runtime.block_on(self.introspector.list_tables())?;
        Ok(())
    }

    fn current_table(&self) -> Result<String, WorkspaceError> {
        self.session
            .current_table()
            .map(str::to_string)
            .ok_or_else(|| SessionError::NoTableSelected.into())
    }

    /// Re-runs the current view. The grid is cleared when the query fails.
    pub fn reload(&mut self, runtime: &Runtime) -> Result<(), WorkspaceError> {
        let query = runtime.block_on(self.session.build_query(&mut self.introspector));
        if query.is_empty() {
            self.grid = None;
            return Ok(());
        }

        let view = runtime.block_on(self.session.view_schemas(&mut self.introspector))?;
        let result = match runtime.block_on(self.runner.run_select(&query)) {
            Ok(result) => result,
            Err(error) => {
                self.grid = None;
                return Err(error.into());
            }
        };
        let image_columns = runtime.block_on(
            self.session
                .image_columns(&mut self.introspector, &result.columns),
        );
        self.grid = Some(Grid {
            result,
            image_columns,
            view,
        });
        Ok(())
    }

    /// Drops cached schemas and reads everything again.
    pub fn refresh(&mut self, runtime: &Runtime) -> Result<(), WorkspaceError> {
        self.introspector.invalidate_all();
        self.refresh_tables(runtime)?;
        self.reload(runtime)
    }

    pub fn select_table(&mut self, runtime: &Runtime, table: &str) -> Result<(), WorkspaceError> {
        self.session.select_table(table);
        self.reload(runtime)
    }

    /// Joins every target on its first shared column. Targets that cannot
    /// be joined are listed as skipped; the others still join.
    pub fn quick_join(
        &mut self,
        runtime: &Runtime,
        targets: &[String],
    ) -> Result<String, WorkspaceError> {
        let targets = targets.iter().map(String::as_str).collect::<Vec<_>>();
        let outcomes =
            runtime.block_on(self.session.quick_join(&mut self.introspector, &targets))?;
        let message = outcomes
            .iter()
            .map(|outcome| match outcome {
                QuickJoinOutcome::Joined { target, column, .. } => {
                    format!("Joined `{target}` on `{column}`")
                }
                QuickJoinOutcome::Skipped { target, reason } => {
                    format!("Skipped `{target}`: {reason}")
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        self.reload(runtime)?;
        Ok(if message.is_empty() {
            "Nothing to join".to_string()
        } else {
            message
        })
    }

    /// `<table> <base column> <target column> [inner|left]`
    pub fn add_join(&mut self, runtime: &Runtime, spec: &str) -> Result<String, WorkspaceError> {
        let (target, base_column, target_column, kind) = parse_join_spec(spec)?;
        let descriptor = runtime.block_on(self.session.add_join(
            &mut self.introspector,
            &target,
            &base_column,
            &target_column,
            kind,
        ))?;
        self.reload(runtime)?;
        Ok(format!(
            "{} JOIN `{}` ON {}",
            descriptor.kind, descriptor.target_table, descriptor.condition
        ))
    }

    pub fn remove_last_join(&mut self, runtime: &Runtime) -> Result<String, WorkspaceError> {
        let Some(removed) = self.session.remove_last_join() else {
            return Ok("No joins to remove".to_string());
        };
        self.reload(runtime)?;
        Ok(format!("Removed join with `{}`", removed.target_table))
    }

    pub fn clear_joins(&mut self, runtime: &Runtime) -> Result<String, WorkspaceError> {
        self.session.clear_joins();
        self.reload(runtime)?;
        Ok("All joins removed".to_string())
    }

    /// Sorting twice on the same column flips the direction.
    pub fn sort_by(&mut self, runtime: &Runtime, column: &str) -> Result<String, WorkspaceError> {
        let direction = match self.session.sort() {
            Some(sort) if sort.column == column => sort.direction.toggled(),
            _ => SortDirection::Ascending,
        };
        self.session
            .set_sort(Some(SortSpec::new(column, direction)));
        self.reload(runtime)?;
        Ok(format!("Sorted by `{column}` {direction}"))
    }

    pub fn toggle_sort_direction(&mut self, runtime: &Runtime) -> Result<String, WorkspaceError> {
        let Some(sort) = self.session.sort().cloned() else {
            return Ok("No sort column chosen".to_string());
        };
        let direction = sort.direction.toggled();
        self.session
            .set_sort(Some(SortSpec::new(sort.column.clone(), direction)));
        self.reload(runtime)?;
        Ok(format!("Sorted by `{}` {direction}", sort.column))
    }

    /// Comma-separated `column` or `table.column` entries; blank shows all.
    pub fn set_selection(&mut self, runtime: &Runtime, spec: &str) -> Result<String, WorkspaceError> {
        let selection = spec
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        let count = selection.len();
        self.session.set_selection(selection);
        self.reload(runtime)?;
        Ok(if count == 0 {
            "Showing all columns".to_string()
        } else {
            format!("Showing {count} selected columns")
        })
    }

    fn cell_target(&self, row: usize, column: usize) -> Result<(TableSchema, RowKey, String), WorkspaceError> {
        let grid = self.grid.as_ref().ok_or(WorkspaceError::NoResult)?;
        let column_name = grid
            .column_name(column)
            .ok_or(WorkspaceError::NoResult)?
            .to_string();
        let result_row = grid.result.rows.get(row).ok_or(WorkspaceError::NoResult)?;
        let owner = grid.view.owner_of(&column_name).ok_or_else(|| {
            WorkspaceError::input(format!("column `{column_name}` belongs to no table in view"))
        })?;
        let key = RowKey::from_row(owner, &grid.result.columns, result_row)?;
        Ok((owner.clone(), key, column_name))
    }

    pub fn update_cell(
        &mut self,
        runtime: &Runtime,
        row: usize,
        column: usize,
        input: &str,
    ) -> Result<String, WorkspaceError> {
        let (schema, key, column_name) = self.cell_target(row, column)?;
        let affected = runtime.block_on(mutations::update_cell(
            &self.database,
            &schema,
            &key,
            &column_name,
            input,
        ))?;
        self.reload(runtime)?;
        Ok(format!("Updated `{column_name}` in {affected} row(s)"))
    }

    /// Stores the file at `path` as the cell's BLOB. Only recognised image
    /// formats are accepted.
    pub fn update_image(
        &mut self,
        runtime: &Runtime,
        row: usize,
        column: usize,
        path: &Path,
    ) -> Result<String, WorkspaceError> {
        let (schema, key, column_name) = self.cell_target(row, column)?;
        let bytes = fs::read(path).map_err(|source| WorkspaceError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        if !is_displayable_image_bytes(&bytes) {
            return Err(WorkspaceError::input(format!(
                "`{}` is not a JPEG, PNG, GIF or BMP image",
                path.display()
            )));
        }
        runtime.block_on(mutations::update_image(
            &self.database,
            &schema,
            &key,
            &column_name,
            bytes,
        ))?;
        self.reload(runtime)?;
        Ok(format!("Stored image in `{column_name}`"))
    }

    /// Deletes the row from the base table.
    pub fn delete_row(&mut self, runtime: &Runtime, row: usize) -> Result<String, WorkspaceError> {
        let grid = self.grid.as_ref().ok_or(WorkspaceError::NoResult)?;
        let result_row = grid.result.rows.get(row).ok_or(WorkspaceError::NoResult)?;
        let schema = Arc::clone(&grid.view.base);
        let key = RowKey::from_row(&schema, &grid.result.columns, result_row)?;
        let affected = runtime.block_on(mutations::delete_row(&self.database, &schema, &key))?;
        self.reload(runtime)?;
        Ok(format!("Deleted {affected} row(s) from `{}`", schema.name))
    }

    /// `column=value | column=value` into the current table.
    pub fn insert_row(&mut self, runtime: &Runtime, spec: &str) -> Result<String, WorkspaceError> {
        let table = self.current_table()?;
        let inputs = parse_assignments(spec)?;
        let schema = runtime.block_on(self.introspector.columns_of(&table));
        runtime.block_on(mutations::insert_row(&self.database, &schema, &inputs))?;
        self.reload(runtime)?;
        Ok(format!("Inserted a row into `{table}`"))
    }

    /// `<table> <column> <TYPE>, <column> <TYPE>, ...`
    pub fn create_table(&mut self, runtime: &Runtime, spec: &str) -> Result<String, WorkspaceError> {
        let (table, columns) = parse_table_definition(spec)?;
        runtime.block_on(mutations::create_table(&self.database, &table, &columns))?;
        self.introspector.invalidate(&table);
        self.refresh_tables(runtime)?;
        Ok(format!("Created table `{table}`"))
    }

    pub fn drop_table(&mut self, runtime: &Runtime, table: &str) -> Result<String, WorkspaceError> {
        runtime.block_on(mutations::drop_table(&self.database, table))?;
        self.introspector.invalidate(table);
        self.session.table_dropped(table);
        self.refresh_tables(runtime)?;
        self.reload(runtime)?;
        Ok(format!("Dropped table `{table}`"))
    }

    /// `<column> [TYPE] [default value]` on the current table.
    pub fn add_column(&mut self, runtime: &Runtime, spec: &str) -> Result<String, WorkspaceError> {
        let table = self.current_table()?;
        let (column, default) = parse_new_column(spec)?;
        runtime.block_on(mutations::add_column(
            &self.database,
            &table,
            &column,
            default.as_deref(),
        ))?;
        self.introspector.invalidate(&table);
        self.reload(runtime)?;
        Ok(format!("Added column `{}` to `{table}`", column.name))
    }

    pub fn rename_column(
        &mut self,
        runtime: &Runtime,
        column: usize,
        new_name: &str,
    ) -> Result<String, WorkspaceError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(WorkspaceError::input("new column name is empty"));
        }
        let grid = self.grid.as_ref().ok_or(WorkspaceError::NoResult)?;
        let old_name = grid
            .column_name(column)
            .ok_or(WorkspaceError::NoResult)?
            .to_string();
        let owner = grid.view.owner_of(&old_name).cloned().ok_or_else(|| {
            WorkspaceError::input(format!("column `{old_name}` belongs to no table in view"))
        })?;

        runtime.block_on(mutations::rename_column(
            &self.database,
            &owner,
            &old_name,
            new_name,
        ))?;
        self.introspector.invalidate(&owner.name);
        self.forget_column(&old_name);
        self.reload(runtime)?;
        Ok(format!("Renamed `{old_name}` to `{new_name}`"))
    }

    // Selection and sort entries naming a renamed column would break the view.
    fn forget_column(&mut self, column: &str) {
        let names_column =
            |entry: &String| entry.rsplit('.').next().is_some_and(|bare| bare == column);
        if self.session.selection().iter().any(names_column) {
            self.session.set_selection(Vec::new());
        }
        if self.session.sort().is_some_and(|sort| sort.column == column) {
            self.session.set_sort(None);
        }
    }

    /// Appends the rows of a workbook's first sheet to the current table.
    pub fn import_spreadsheet(
        &mut self,
        runtime: &Runtime,
        source: &Path,
    ) -> Result<String, WorkspaceError> {
        let table = self.current_table()?;
        let schema = runtime.block_on(self.introspector.columns_of(&table));
        let report = runtime.block_on(import_spreadsheet(
            &self.database,
            &CalamineReader,
            &schema,
            source,
        ))?;
        self.reload(runtime)?;
        let mut message = format!(
            "Imported {} rows into `{table}` from {}",
            report.rows,
            source.display()
        );
        if !report.ignored_headers.is_empty() {
            message.push_str(&format!(
                " (ignored: {})",
                report.ignored_headers.join(", ")
            ));
        }
        Ok(message)
    }

    pub fn export(
        &self,
        format: ExportFormat,
        destination: &Path,
        settings: &ExportSettings,
        font_path: Option<PathBuf>,
    ) -> Result<String, WorkspaceError> {
        let grid = self.grid.as_ref().ok_or(WorkspaceError::NoResult)?;
        let title = self.current_table()?;
        let table = ExportTable::new(
            title.clone(),
            self.session.database_name(),
            &grid.result,
            grid.image_columns.clone(),
        );

        let message = match format {
            ExportFormat::Xlsx => {
                let report = export_spreadsheet(
                    &table,
                    settings,
                    &ImageCrateCodec,
                    &mut XlsxSpreadsheet::new(),
                    destination,
                )?;
                spreadsheet_summary(destination, &report)
            }
            ExportFormat::Pdf => {
                let report = export_document(
                    &table,
                    &ImageCrateCodec,
                    &mut PdfWriter::new(title, font_path),
                    destination,
                )?;
                format!(
                    "Exported {} rows to {} ({} pages, {} images)",
                    report.rows,
                    destination.display(),
                    report.pages,
                    report.embedded_images
                )
            }
            ExportFormat::Csv => {
                let rows = export_table_to_csv(destination, &table)?;
                format!("Exported {rows} rows to {}", destination.display())
            }
            ExportFormat::Json => {
                let rows = export_table_to_json(destination, &table)?;
                format!("Exported {rows} rows to {}", destination.display())
            }
        };
        Ok(message)
    }

    pub fn inspect(&self, runtime: &Runtime) -> Result<String, WorkspaceError> {
        let report = runtime.block_on(inspect_database(
            &self.database,
            &self.session.database_name(),
        ))?;
        Ok(report.to_string())
    }

    pub fn extract_images(&self, runtime: &Runtime, target_dir: &Path) -> Result<String, WorkspaceError> {
        let report = runtime.block_on(extract_images(&self.database, target_dir))?;
        Ok(report.to_string())
    }
}

fn spreadsheet_summary(destination: &Path, report: &ExportReport) -> String {
    let mut message = format!(
        "Exported {} rows to {} ({} images",
        report.rows,
        destination.display(),
        report.embedded_images
    );
    if !report.saved_files.is_empty() {
        message.push_str(&format!(", {} files saved", report.saved_files.len()));
    }
    if report.invalid_images + report.failed_images > 0 {
        message.push_str(&format!(
            ", {} unreadable",
            report.invalid_images + report.failed_images
        ));
    }
    message.push(')');
    message
}

fn parse_join_spec(spec: &str) -> Result<(String, String, String, JoinKind), WorkspaceError> {
    let parts = spec.split_whitespace().collect::<Vec<_>>();
    let (target, base_column, target_column, kind) = match parts.as_slice() {
        [target, base_column, target_column] => (target, base_column, target_column, None),
        [target, base_column, target_column, kind] => {
            (target, base_column, target_column, Some(kind))
        }
        _ => {
            return Err(WorkspaceError::input(
                "expected: <table> <base column> <target column> [inner|left]",
            ))
        }
    };
    let kind = match kind {
        Some(raw) => raw
            .parse::<JoinKind>()
            .map_err(|error| WorkspaceError::input(error.to_string()))?,
        None => JoinKind::default(),
    };
    Ok((
        (*target).to_string(),
        (*base_column).to_string(),
        (*target_column).to_string(),
        kind,
    ))
}

fn parse_assignments(spec: &str) -> Result<Vec<(String, String)>, WorkspaceError> {
    let mut inputs = Vec::new();
    for part in spec.split('|').filter(|part| !part.trim().is_empty()) {
        let (column, value) = part
            .split_once('=')
            .ok_or_else(|| WorkspaceError::input(format!("expected column=value, got `{}`", part.trim())))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(WorkspaceError::input("column name is empty"));
        }
        inputs.push((column.to_string(), value.trim().to_string()));
    }
    if inputs.is_empty() {
        return Err(WorkspaceError::input("no values given"));
    }
    Ok(inputs)
}

fn parse_column(raw: &str) -> Option<ColumnDefinition> {
    let mut words = raw.split_whitespace();
    let name = words.next()?;
    let declared_type = words.collect::<Vec<_>>().join(" ");
    Some(ColumnDefinition::new(
        name,
        if declared_type.is_empty() {
            DEFAULT_COLUMN_TYPE.to_string()
        } else {
            declared_type
        },
    ))
}

fn parse_table_definition(spec: &str) -> Result<(String, Vec<ColumnDefinition>), WorkspaceError> {
    let spec = spec.trim();
    let (table, rest) = spec
        .split_once(char::is_whitespace)
        .ok_or_else(|| WorkspaceError::input("expected: <table> <column> <TYPE>, ..."))?;
    let columns = rest
        .split(',')
        .filter_map(parse_column)
        .collect::<Vec<_>>();
    Ok((table.to_string(), columns))
}

fn parse_new_column(spec: &str) -> Result<(ColumnDefinition, Option<String>), WorkspaceError> {
    let mut words = spec.split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| WorkspaceError::input("expected: <column> [TYPE] [default]"))?;
    let declared_type = words.next().unwrap_or(DEFAULT_COLUMN_TYPE);
    let default = words.collect::<Vec<_>>().join(" ");
    Ok((
        ColumnDefinition::new(name, declared_type),
        (!default.is_empty()).then_some(default),
    ))
}

#[cfg(test)]
mod tests {
    use tabula_core::joins::JoinKind;
    use tabula_core::sql_generator::ColumnDefinition;

    use super::{
        parse_assignments, parse_join_spec, parse_new_column, parse_table_definition,
        WorkspaceError,
    };

    #[test]
    fn join_spec_defaults_to_inner() {
        let (target, base, other, kind) = parse_join_spec("contacts id person_id").expect("spec");
        assert_eq!(
            (target.as_str(), base.as_str(), other.as_str()),
            ("contacts", "id", "person_id")
        );
        assert_eq!(kind, JoinKind::Inner);

        let (_, _, _, kind) = parse_join_spec("contacts id id left").expect("left");
        assert_eq!(kind, JoinKind::Left);
        assert!(matches!(
            parse_join_spec("contacts id id outer"),
            Err(WorkspaceError::Input(_))
        ));
        assert!(parse_join_spec("contacts").is_err());
    }

    #[test]
    fn assignments_split_on_pipes() {
        let inputs = parse_assignments("name=Ann, Jr. | active = yes | note=").expect("parse");
        assert_eq!(
            inputs,
            vec![
                ("name".to_string(), "Ann, Jr.".to_string()),
                ("active".to_string(), "yes".to_string()),
                ("note".to_string(), String::new()),
            ]
        );
        assert!(parse_assignments("").is_err());
        assert!(parse_assignments("just text").is_err());
    }

    #[test]
    fn table_definition_defaults_missing_types_to_text() {
        let (table, columns) =
            parse_table_definition("people id INTEGER, name, score DOUBLE PRECISION")
                .expect("parse");
        assert_eq!(table, "people");
        assert_eq!(
            columns,
            vec![
                ColumnDefinition::new("id", "INTEGER"),
                ColumnDefinition::new("name", "TEXT"),
                ColumnDefinition::new("score", "DOUBLE PRECISION"),
            ]
        );
        assert!(parse_table_definition("lonely").is_err());
    }

    #[test]
    fn new_column_takes_optional_default() {
        let (column, default) = parse_new_column("active BOOLEAN yes").expect("parse");
        assert_eq!(column, ColumnDefinition::new("active", "BOOLEAN"));
        assert_eq!(default.as_deref(), Some("yes"));

        let (column, default) = parse_new_column("note").expect("parse");
        assert_eq!(column.declared_type, "TEXT");
        assert!(default.is_none());
    }
}
