use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::image_blob::is_image_column;
use crate::joins::{quick_join, JoinDescriptor, JoinError, JoinKind, JoinRegistry, QuickJoinOutcome};
use crate::projection::effective_columns;
use crate::query_builder::{build_select, SelectQuery, SortSpec};
use crate::schema::{SchemaBackend, SchemaIntrospector, TableSchema};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no table selected")]
    NoTableSelected,
    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Base table plus the schemas of its joined tables, in join order.
#[derive(Debug, Clone)]
pub struct ViewSchemas {
    pub base: Arc<TableSchema>,
    pub joined: Vec<Arc<TableSchema>>,
}

impl ViewSchemas {
    #[must_use]
    pub fn joined_refs(&self) -> Vec<&TableSchema> {
        self.joined.iter().map(AsRef::as_ref).collect()
    }

    /// The table owning a bare column name: base first, then joins.
    #[must_use]
    pub fn owner_of(&self, column: &str) -> Option<&TableSchema> {
        crate::mutations::owning_table(&self.base, &self.joined_refs(), column)
    }
}

/// Everything the user has set up against one open database.
#[derive(Debug, Clone)]
pub struct Session {
    database_path: PathBuf,
    current_table: Option<String>,
    joins: JoinRegistry,
    selection: Vec<String>,
    sort: Option<SortSpec>,
}

impl Session {
    #[must_use]
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            current_table: None,
            joins: JoinRegistry::new(),
            selection: Vec::new(),
            sort: None,
        }
    }

    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    #[must_use]
    pub fn database_name(&self) -> String {
        self.database_path
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn current_table(&self) -> Option<&str> {
        self.current_table.as_deref()
    }

    #[must_use]
    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    #[must_use]
    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Joins of the current base table, in join order.
    #[must_use]
    pub fn joins(&self) -> Vec<JoinDescriptor> {
        self.current_table
            .as_deref()
            .map(|table| self.joins.snapshot(table))
            .unwrap_or_default()
    }

    /// Switches the base table. Selection and sort start over; joins made
    /// earlier against `table` come back.
    pub fn select_table(&mut self, table: impl Into<String>) {
        self.current_table = Some(table.into());
        self.selection.clear();
        self.sort = None;
    }

    pub fn table_dropped(&mut self, table: &str) {
        self.joins.forget(table);
        if self.current_table.as_deref() == Some(table) {
            self.current_table = None;
            self.selection.clear();
            self.sort = None;
        }
    }

    pub fn set_selection(&mut self, selection: Vec<String>) {
        self.selection = selection;
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
    }

    pub fn remove_last_join(&mut self) -> Option<JoinDescriptor> {
        let table = self.current_table.clone()?;
        let removed = self.joins.remove_last_join(&table)?;
        self.drop_selection_for(&removed.target_table);
        Some(removed)
    }

    pub fn clear_joins(&mut self) {
        let Some(table) = self.current_table.clone() else {
            return;
        };
        for join in self.joins.snapshot(&table) {
            self.drop_selection_for(&join.target_table);
        }
        self.joins.clear(&table);
    }

    // Qualified entries pointing at a table that left the view would make
    // the statement fail.
    fn drop_selection_for(&mut self, table: &str) {
        self.selection.retain(|entry| {
            entry
                .split_once('.')
                .map_or(true, |(owner, _)| owner != table)
        });
    }

    fn require_table(&self) -> Result<&str, SessionError> {
        self.current_table
            .as_deref()
            .ok_or(SessionError::NoTableSelected)
    }

    pub async fn view_schemas<B: SchemaBackend + Send>(
        &self,
        introspector: &mut SchemaIntrospector<B>,
    ) -> Result<ViewSchemas, SessionError> {
        let base_table = self.require_table()?;
        let base = introspector.columns_of(base_table).await;
        let targets = self.joins.joined_tables(base_table);
        let joined = introspector.schemas_of(&targets).await;
        Ok(ViewSchemas { base, joined })
    }

    pub async fn add_join<B: SchemaBackend + Send>(
        &mut self,
        introspector: &mut SchemaIntrospector<B>,
        target_table: &str,
        base_column: &str,
        target_column: &str,
        kind: JoinKind,
    ) -> Result<JoinDescriptor, SessionError> {
        let base_table = self.require_table()?.to_string();
        let base = introspector.columns_of(&base_table).await;
        let target = introspector.columns_of(target_table).await;
        let descriptor = self
            .joins
            .add_join(&base, &target, base_column, target_column, kind)?;
        tracing::info!(base = %base_table, target = %target_table, "join added");
        Ok(descriptor)
    }

    /// Joins each target on its first shared column; failures are reported
    /// per target.
    pub async fn quick_join<B: SchemaBackend + Send>(
        &mut self,
        introspector: &mut SchemaIntrospector<B>,
        targets: &[&str],
    ) -> Result<Vec<QuickJoinOutcome>, SessionError> {
        let base_table = self.require_table()?.to_string();
        let base = introspector.columns_of(&base_table).await;
        let target_schemas = introspector.schemas_of(targets).await;
        let target_refs: Vec<&TableSchema> = target_schemas.iter().map(AsRef::as_ref).collect();

        let outcomes = quick_join(&mut self.joins, &base, &target_refs);
        for outcome in &outcomes {
            if let QuickJoinOutcome::Skipped { target, reason } = outcome {
                tracing::info!(base = %base_table, %target, %reason, "quick join skipped");
            }
        }
        Ok(outcomes)
    }

    /// Builds the statement for the current view. Without a base table the
    /// query is empty.
    pub async fn build_query<B: SchemaBackend + Send>(
        &self,
        introspector: &mut SchemaIntrospector<B>,
    ) -> SelectQuery {
        let Ok(view) = self.view_schemas(introspector).await else {
            return SelectQuery::default();
        };
        let columns = effective_columns(&view.base, &view.joined_refs(), &self.selection);
        let query = build_select(
            self.current_table.as_deref(),
            &self.joins(),
            &columns,
            self.sort.as_ref(),
        );
        tracing::debug!(statement = %query.statement, "built select");
        query
    }

    /// Per display column: does it hold images? A BLOB column of that name
    /// in any table of the view counts, as does an image-like name.
    pub async fn image_columns<B: SchemaBackend + Send>(
        &self,
        introspector: &mut SchemaIntrospector<B>,
        display_columns: &[String],
    ) -> Vec<bool> {
        let view = self.view_schemas(introspector).await.ok();
        display_columns
            .iter()
            .map(|column| {
                let blob_in_view = view.as_ref().is_some_and(|view| {
                    std::iter::once(&view.base)
                        .chain(&view.joined)
                        .filter_map(|table| table.column(column))
                        .any(|entry| is_image_column(column, Some(&entry.declared_type)))
                });
                blob_in_view || is_image_column(column, None)
            })
            .collect()
    }
}
