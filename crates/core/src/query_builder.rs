use std::fmt;

use crate::joins::JoinDescriptor;
use crate::projection::SelectedColumn;
use crate::sql_generator::quote_identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Ordering on a bare column name. With joins active the name may be
/// ambiguous; SQLite then reports the error at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    #[must_use]
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectQuery {
    pub statement: String,
    /// Header labels, one per projected column, in projection order.
    pub display_columns: Vec<String>,
}

impl SelectQuery {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }
}

/// Composes `SELECT .. FROM .. [JOIN ..] [ORDER BY ..]` with every identifier
/// quoted. Yields an empty query when there is no base table or nothing to
/// project.
#[must_use]
pub fn build_select(
    base_table: Option<&str>,
    joins: &[JoinDescriptor],
    columns: &[SelectedColumn],
    sort: Option<&SortSpec>,
) -> SelectQuery {
    let Some(base_table) = base_table.filter(|table| !table.is_empty()) else {
        return SelectQuery::default();
    };
    if columns.is_empty() {
        return SelectQuery::default();
    }

    let projection = columns
        .iter()
        .map(SelectedColumn::to_sql)
        .collect::<Vec<_>>()
        .join(", ");

    let mut statement = format!("SELECT {projection} FROM {}", quote_identifier(base_table));
    for join in joins {
        statement.push_str(&format!(
            " {} JOIN {} ON {}",
            join.kind.as_sql(),
            quote_identifier(&join.target_table),
            join.condition
        ));
    }
    if let Some(sort) = sort {
        statement.push_str(&format!(
            " ORDER BY {} {}",
            quote_identifier(&sort.column),
            sort.direction.as_sql()
        ));
    }

    SelectQuery {
        statement,
        display_columns: columns
            .iter()
            .map(|column| column.display_name().to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_select, SortDirection, SortSpec};
    use crate::joins::{JoinDescriptor, JoinKind};
    use crate::projection::{effective_columns, SelectedColumn};
    use crate::schema::{SchemaEntry, TableSchema};

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema::new(
            name,
            columns
                .iter()
                .enumerate()
                .map(|(ordinal, column)| SchemaEntry::new(ordinal, *column, "TEXT"))
                .collect(),
        )
    }

    #[test]
    fn plain_select_lists_base_columns_in_ordinal_order() {
        let people = table("people", &["id", "name", "photo"]);
        let query = build_select(
            Some("people"),
            &[],
            &effective_columns(&people, &[], &[]),
            None,
        );

        assert_eq!(
            query.statement,
            "SELECT \"people\".\"id\", \"people\".\"name\", \"people\".\"photo\" FROM \"people\""
        );
        assert_eq!(query.display_columns, vec!["id", "name", "photo"]);
    }

    #[test]
    fn joins_and_sort_are_appended_in_order() {
        let joins = vec![
            JoinDescriptor {
                target_table: "customers".to_string(),
                condition: "\"orders\".\"customer_id\" = \"customers\".\"id\"".to_string(),
                kind: JoinKind::Inner,
            },
            JoinDescriptor {
                target_table: "items".to_string(),
                condition: "\"orders\".\"id\" = \"items\".\"order_id\"".to_string(),
                kind: JoinKind::Left,
            },
        ];
        let columns = vec![
            SelectedColumn::qualified("orders", "id"),
            SelectedColumn::qualified("customers", "name"),
        ];
        let sort = SortSpec::new("name", SortDirection::Descending);

        let query = build_select(Some("orders"), &joins, &columns, Some(&sort));

        assert_eq!(
            query.statement,
            "SELECT \"orders\".\"id\", \"customers\".\"name\" FROM \"orders\" \
             INNER JOIN \"customers\" ON \"orders\".\"customer_id\" = \"customers\".\"id\" \
             LEFT JOIN \"items\" ON \"orders\".\"id\" = \"items\".\"order_id\" \
             ORDER BY \"name\" DESC"
        );
        assert_eq!(query.display_columns, vec!["id", "name"]);
    }

    #[test]
    fn hostile_identifiers_stay_inside_quotes() {
        let columns = vec![SelectedColumn::bare("a\"; DROP TABLE t; --")];
        let query = build_select(Some("weird \"name\""), &[], &columns, None);
        assert_eq!(
            query.statement,
            "SELECT \"a\"\"; DROP TABLE t; --\" FROM \"weird \"\"name\"\"\""
        );
    }

    #[test]
    fn missing_base_or_columns_yield_empty_query() {
        let columns = vec![SelectedColumn::bare("id")];
        assert!(build_select(None, &[], &columns, None).is_empty());
        assert!(build_select(Some(""), &[], &columns, None).is_empty());
        let query = build_select(Some("t"), &[], &[], None);
        assert!(query.is_empty());
        assert!(query.display_columns.is_empty());
    }

    #[test]
    fn direction_toggles() {
        assert_eq!(SortDirection::default().toggled(), SortDirection::Descending);
        assert_eq!(SortDirection::Descending.toggled().as_sql(), "ASC");
    }
}
