use std::collections::{BTreeSet, HashSet};

use crate::schema::TableSchema;
use crate::sql_generator::{qualified_column, quote_identifier};

const SUMMARY_LIMIT: usize = 3;

/// One entry of the projection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedColumn {
    pub table: Option<String>,
    pub column: String,
}

impl SelectedColumn {
    #[must_use]
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    #[must_use]
    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// `table.column` splits at the first dot; anything else is a bare name.
    #[must_use]
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('.') {
            Some((table, column)) => Self::qualified(table, column),
            None => Self::bare(entry),
        }
    }

    #[must_use]
    pub fn to_sql(&self) -> String {
        match &self.table {
            Some(table) => qualified_column(table, &self.column),
            None => quote_identifier(&self.column),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{table}.{}", self.column),
            None => self.column.clone(),
        }
    }
}

/// Resolves the projection for a base table and its joins.
///
/// Without an explicit selection every column of the base table and then of
/// each joined table (join order, ordinal order) is included. Either way a
/// bare column name appears at most once: the first occurrence wins, even
/// when a later one belongs to a different table.
#[must_use]
pub fn effective_columns(
    base: &TableSchema,
    joined: &[&TableSchema],
    explicit_selection: &[String],
) -> Vec<SelectedColumn> {
    let mut seen = HashSet::new();

    if explicit_selection.is_empty() {
        return std::iter::once(base)
            .chain(joined.iter().copied())
            .flat_map(|table| {
                table
                    .columns
                    .iter()
                    .map(move |column| SelectedColumn::qualified(&table.name, &column.name))
            })
            .filter(|selected| seen.insert(selected.column.clone()))
            .collect();
    }

    explicit_selection
        .iter()
        .map(|entry| SelectedColumn::parse(entry))
        .filter(|selected| seen.insert(selected.column.clone()))
        .collect()
}

/// Unique bare column names across the view, sorted, for the sort picker.
#[must_use]
pub fn sortable_columns(base: &TableSchema, joined: &[&TableSchema]) -> Vec<String> {
    std::iter::once(base)
        .chain(joined.iter().copied())
        .flat_map(|table| table.column_names().map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Columns offered for explicit selection, grouped by table and deduplicated
/// by bare name in traversal order.
#[must_use]
pub fn selectable_columns(
    base: &TableSchema,
    joined: &[&TableSchema],
) -> Vec<(String, Vec<String>)> {
    let mut seen = HashSet::new();
    std::iter::once(base)
        .chain(joined.iter().copied())
        .map(|table| {
            let columns = table
                .column_names()
                .filter(|column| seen.insert((*column).to_string()))
                .map(str::to_string)
                .collect();
            (table.name.clone(), columns)
        })
        .collect()
}

#[must_use]
pub fn selection_summary(selection: &[String]) -> String {
    if selection.is_empty() {
        return "all".to_string();
    }

    let mut summary = selection
        .iter()
        .take(SUMMARY_LIMIT)
        .map(|entry| entry.rsplit('.').next().unwrap_or(entry))
        .collect::<Vec<_>>()
        .join(", ");
    if selection.len() > SUMMARY_LIMIT {
        summary.push_str(&format!("... (+{})", selection.len() - SUMMARY_LIMIT));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::{
        effective_columns, selectable_columns, selection_summary, sortable_columns,
        SelectedColumn,
    };
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

    fn qualified_names(columns: &[SelectedColumn]) -> Vec<String> {
        columns.iter().map(SelectedColumn::qualified_name).collect()
    }

    #[test]
    fn all_columns_of_base_table_in_ordinal_order() {
        let base = table("people", &["id", "name", "photo"]);
        let columns = effective_columns(&base, &[], &[]);
        assert_eq!(
            qualified_names(&columns),
            vec!["people.id", "people.name", "people.photo"]
        );
    }

    #[test]
    fn joined_columns_deduplicate_by_bare_name() {
        let base = table("base", &["id", "name"]);
        let joined = table("joined", &["id", "email"]);
        let columns = effective_columns(&base, &[&joined], &[]);

        assert_eq!(
            qualified_names(&columns),
            vec!["base.id", "base.name", "joined.email"]
        );
    }

    #[test]
    fn explicit_selection_keeps_order_and_first_bare_name() {
        let base = table("base", &["id", "name"]);
        let joined = table("joined", &["id", "email"]);
        let selection = vec![
            "joined.email".to_string(),
            "joined.id".to_string(),
            "base.id".to_string(),
            "name".to_string(),
        ];
        let columns = effective_columns(&base, &[&joined], &selection);

        assert_eq!(
            columns,
            vec![
                SelectedColumn::qualified("joined", "email"),
                SelectedColumn::qualified("joined", "id"),
                SelectedColumn::bare("name"),
            ]
        );
    }

    #[test]
    fn explicit_selection_ignores_schema_knowledge() {
        let columns = effective_columns(&TableSchema::unknown("t"), &[], &["a.b".to_string()]);
        assert_eq!(columns, vec![SelectedColumn::qualified("a", "b")]);
    }

    #[test]
    fn unknown_base_schema_resolves_to_nothing() {
        assert!(effective_columns(&TableSchema::unknown("t"), &[], &[]).is_empty());
    }

    #[test]
    fn sql_rendering_quotes_each_part() {
        assert_eq!(
            SelectedColumn::qualified("my table", "select").to_sql(),
            "\"my table\".\"select\""
        );
        assert_eq!(SelectedColumn::bare("name").to_sql(), "\"name\"");
        assert_eq!(SelectedColumn::parse("a.b.c").column, "b.c");
    }

    #[test]
    fn sort_and_selection_pickers_list_unique_names() {
        let base = table("base", &["name", "id"]);
        let joined = table("joined", &["id", "email"]);

        assert_eq!(
            sortable_columns(&base, &[&joined]),
            vec!["email", "id", "name"]
        );
        assert_eq!(
            selectable_columns(&base, &[&joined]),
            vec![
                (
                    "base".to_string(),
                    vec!["name".to_string(), "id".to_string()]
                ),
                ("joined".to_string(), vec!["email".to_string()]),
            ]
        );
    }

    #[test]
    fn summary_shows_first_three_bare_names() {
        assert_eq!(selection_summary(&[]), "all");
        let selection: Vec<String> = ["a.x", "a.y", "b.z", "b.w", "v"]
            .iter()
            .map(|entry| (*entry).to_string())
            .collect();
        assert_eq!(selection_summary(&selection), "x, y, z... (+2)");
    }
}
