use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::query_builder::SelectQuery;
use crate::value::CellValue;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub values: Vec<CellValue>,
}

impl QueryRow {
    #[must_use]
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryBackendError {
    message: String,
}

impl QueryBackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryRunnerError {
    #[error("query backend failed: {0}")]
    Backend(#[source] QueryBackendError),
    #[error("nothing to query: no table selected or no columns to show")]
    EmptyQuery,
    #[error("row {row} has {actual} values but {expected} columns were projected")]
    RowArity {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Executes statements with bound parameters. Values are never spliced into
/// SQL text.
#[async_trait]
pub trait QueryBackend {
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[CellValue],
    ) -> Result<Vec<QueryRow>, QueryBackendError>;

    /// Returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[CellValue]) -> Result<u64, QueryBackendError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<QueryRow>,
    pub elapsed: Duration,
}

impl ResultSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|row| row.values.get(column))
    }
}

#[derive(Debug)]
pub struct QueryRunner<B: QueryBackend> {
    backend: B,
}

impl<B: QueryBackend> QueryRunner<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn run_select(&self, query: &SelectQuery) -> Result<ResultSet, QueryRunnerError> {
        if query.is_empty() {
            return Err(QueryRunnerError::EmptyQuery);
        }

        let started_at = Instant::now();
        let rows = self
            .backend
            .fetch_rows(&query.statement, &[])
            .await
            .map_err(QueryRunnerError::Backend)?;

        let expected = query.display_columns.len();
        if let Some((row, actual)) = rows
            .iter()
            .map(|row| row.values.len())
            .enumerate()
            .find(|(_, actual)| *actual != expected)
        {
            return Err(QueryRunnerError::RowArity {
                row,
                expected,
                actual,
            });
        }

        let elapsed = started_at.elapsed();
        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = elapsed.as_millis(),
            "select finished"
        );
        Ok(ResultSet {
            columns: query.display_columns.clone(),
            rows,
            elapsed,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingQueryBackend;
    use super::{QueryRow, QueryRunner, QueryRunnerError};
    use crate::query_builder::SelectQuery;
    use crate::value::CellValue;

    fn query() -> SelectQuery {
        SelectQuery {
            statement: "SELECT \"t\".\"id\", \"t\".\"name\" FROM \"t\"".to_string(),
            display_columns: vec!["id".to_string(), "name".to_string()],
        }
    }

    #[tokio::test]
    async fn select_returns_rows_under_display_headers() {
        let backend = RecordingQueryBackend::with_rows(vec![
            QueryRow::new(vec![CellValue::Integer(1), CellValue::from("Ann")]),
            QueryRow::new(vec![CellValue::Integer(2), CellValue::Null]),
        ]);
        let runner = QueryRunner::new(backend);

        let result = runner.run_select(&query()).await.expect("select");

        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.cell(1, 1), Some(&CellValue::Null));
        assert_eq!(runner.backend().calls()[0].0, query().statement);
        assert!(runner.backend().calls()[0].1.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_refused_without_touching_backend() {
        let runner = QueryRunner::new(RecordingQueryBackend::default());
        let err = runner
            .run_select(&SelectQuery::default())
            .await
            .expect_err("empty query");

        assert!(matches!(err, QueryRunnerError::EmptyQuery));
        assert!(runner.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn rows_with_wrong_width_are_rejected() {
        let backend = RecordingQueryBackend::with_rows(vec![QueryRow::new(vec![
            CellValue::Integer(1),
        ])]);
        let err = QueryRunner::new(backend)
            .run_select(&query())
            .await
            .expect_err("arity mismatch");

        assert!(matches!(
            err,
            QueryRunnerError::RowArity {
                row: 0,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn backend_errors_are_surfaced() {
        let backend = RecordingQueryBackend {
            fail_with: Some("ambiguous column name: id".to_string()),
            ..RecordingQueryBackend::default()
        };
        let err = QueryRunner::new(backend)
            .run_select(&query())
            .await
            .expect_err("backend failure");

        assert_eq!(
            err.to_string(),
            "query backend failed: ambiguous column name: id"
        );
    }
}
