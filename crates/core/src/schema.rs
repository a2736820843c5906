use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub ordinal: usize,
    pub name: String,
    pub declared_type: String,
}

impl SchemaEntry {
    #[must_use]
    pub fn new(ordinal: usize, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// Columns of one table, ordered by storage position. An empty column list
/// means the schema is unknown, not that the table has no columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<SchemaEntry>,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, mut columns: Vec<SchemaEntry>) -> Self {
        columns.sort_by_key(|column| column.ordinal);
        Self {
            name: name.into(),
            columns,
        }
    }

    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&SchemaEntry> {
        self.columns.iter().find(|column| column.name == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The column treated as the unique row identifier for updates and
    /// deletes: whichever column sits at the lowest ordinal. Real key
    /// constraints are never consulted.
    #[must_use]
    pub fn primary_key_column(&self) -> Option<&SchemaEntry> {
        self.columns.first()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SchemaBackendError {
    message: String,
}

impl SchemaBackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaCacheError {
    #[error("schema backend failed: {0}")]
    Backend(#[source] SchemaBackendError),
}

#[async_trait]
pub trait SchemaBackend {
    async fn list_tables(&self) -> Result<Vec<String>, SchemaBackendError>;

    /// Fails or returns nothing when the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Vec<SchemaEntry>, SchemaBackendError>;
}

#[derive(Debug)]
struct CachedSchema {
    fetched_at: Instant,
    schema: Arc<TableSchema>,
}

/// Reads table schemas through a [`SchemaBackend`], keeping known schemas
/// for `ttl`. Unknown (empty) schemas are never cached.
#[derive(Debug)]
pub struct SchemaIntrospector<B: SchemaBackend> {
    backend: B,
    ttl: Duration,
    cache: HashMap<String, CachedSchema>,
}

impl<B: SchemaBackend> SchemaIntrospector<B> {
    #[must_use]
    pub fn new(backend: B, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn invalidate(&mut self, table: &str) {
        self.cache.remove(table);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, SchemaCacheError> {
        self.backend
            .list_tables()
            .await
            .map_err(SchemaCacheError::Backend)
    }

    pub async fn columns_of(&mut self, table: &str) -> Arc<TableSchema> {
        self.columns_of_at(table, Instant::now()).await
    }

    pub async fn schemas_of(&mut self, tables: &[&str]) -> Vec<Arc<TableSchema>> {
        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            schemas.push(self.columns_of(table).await);
        }
        schemas
    }

    async fn columns_of_at(&mut self, table: &str, now: Instant) -> Arc<TableSchema> {
        if let Some(cached) = self.cache.get(table) {
            if now.duration_since(cached.fetched_at) <= self.ttl {
                return Arc::clone(&cached.schema);
            }
        }

        let columns = match self.backend.table_columns(table).await {
            Ok(columns) => columns,
            Err(error) => {
                tracing::warn!(%table, %error, "schema introspection failed");
                Vec::new()
            }
        };

        let schema = Arc::new(TableSchema::new(table, columns));
        if schema.is_unknown() {
            self.cache.remove(table);
        } else {
            self.cache.insert(
                table.to_string(),
                CachedSchema {
                    fetched_at: now,
                    schema: Arc::clone(&schema),
                },
            );
        }
        schema
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::{SchemaBackend, SchemaBackendError, SchemaEntry};

    /// In-memory catalog; tables map to `(name, type)` pairs in ordinal order.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct FakeSchemaBackend {
        pub(crate) tables: Vec<(String, Vec<SchemaEntry>)>,
        pub(crate) fetch_count: Arc<AtomicUsize>,
    }

    impl FakeSchemaBackend {
        pub(crate) fn with_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
            let entries = columns
                .iter()
                .enumerate()
                .map(|(ordinal, (column, declared_type))| {
                    SchemaEntry::new(ordinal, *column, *declared_type)
                })
                .collect();
            self.tables.push((name.to_string(), entries));
            self
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetch_count.load(Ordering::Relaxed)
        }
    }

    #[async_trait::async_trait]
    impl SchemaBackend for FakeSchemaBackend {
        async fn list_tables(&self) -> Result<Vec<String>, SchemaBackendError> {
            Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
        }

        async fn table_columns(
            &self,
            table: &str,
        ) -> Result<Vec<SchemaEntry>, SchemaBackendError> {
            self.fetch_count.fetch_add(1, Ordering::Relaxed);
            let by_name: HashMap<_, _> = self
                .tables
                .iter()
                .map(|(name, columns)| (name.as_str(), columns))
                .collect();
            by_name
                .get(table)
                .map(|columns| (*columns).clone())
                .ok_or_else(|| SchemaBackendError::new(format!("no such table: {table}")))
        }
    }
}
