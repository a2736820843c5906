use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlGenerationError {
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("column name cannot be empty")]
    EmptyColumnName,
    #[error("a table needs at least one column")]
    NoColumns,
    #[error("column type `{0}` is not a valid SQLite type name")]
    InvalidColumnType(String),
}

/// A column as declared in `CREATE TABLE` / `ALTER TABLE ... ADD COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub declared_type: String,
}

impl ColumnDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

pub const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid";

/// Quotes an identifier for embedding in SQL text. Never use for values.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[must_use]
pub fn qualified_column(table: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(table), quote_identifier(column))
}

fn require_table(table: &str) -> Result<(), SqlGenerationError> {
    if table.trim().is_empty() {
        return Err(SqlGenerationError::EmptyTableName);
    }
    Ok(())
}

fn require_column(column: &str) -> Result<(), SqlGenerationError> {
    if column.trim().is_empty() {
        return Err(SqlGenerationError::EmptyColumnName);
    }
    Ok(())
}

// Type names are embedded verbatim, so only letters, digits, underscores,
// spaces, commas and a parenthesised size suffix pass, e.g. `VARCHAR(255)`.
fn validate_declared_type(declared_type: &str) -> Result<&str, SqlGenerationError> {
    let trimmed = declared_type.trim();
    let starts_with_letter = trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic());
    let allowed = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | ' ' | '(' | ')' | ','));
    let balanced = trimmed.matches('(').count() == trimmed.matches(')').count()
        && trimmed.matches('(').count() <= 1;

    if starts_with_letter && allowed && balanced {
        Ok(trimmed)
    } else {
        Err(SqlGenerationError::InvalidColumnType(declared_type.to_string()))
    }
}

fn column_definition_sql(column: &ColumnDefinition) -> Result<String, SqlGenerationError> {
    require_column(&column.name)?;
    let declared_type = validate_declared_type(&column.declared_type)?;
    Ok(format!("{} {}", quote_identifier(&column.name), declared_type))
}

pub fn table_info_sql(table: &str) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    Ok(format!("PRAGMA table_info({})", quote_identifier(table)))
}

pub fn create_table_sql(
    table: &str,
    columns: &[ColumnDefinition],
) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    if columns.is_empty() {
        return Err(SqlGenerationError::NoColumns);
    }

    let definitions = columns
        .iter()
        .map(column_definition_sql)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table),
        definitions.join(", ")
    ))
}

pub fn drop_table_sql(table: &str) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    Ok(format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
}

pub fn add_column_sql(table: &str, column: &ColumnDefinition) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_identifier(table),
        column_definition_sql(column)?
    ))
}

/// Sets one column on every row; the value is the single bound parameter.
pub fn fill_column_sql(table: &str, column: &str) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    require_column(column)?;
    Ok(format!(
        "UPDATE {} SET {} = ?",
        quote_identifier(table),
        quote_identifier(column)
    ))
}

pub fn rename_column_sql(
    table: &str,
    old_name: &str,
    new_name: &str,
) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    require_column(old_name)?;
    require_column(new_name)?;
    Ok(format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_identifier(table),
        quote_identifier(old_name),
        quote_identifier(new_name)
    ))
}

/// Parameters: new value, then key value.
pub fn update_cell_sql(
    table: &str,
    column: &str,
    key_column: &str,
) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    require_column(column)?;
    require_column(key_column)?;
    Ok(format!(
        "UPDATE {} SET {} = ? WHERE {} = ?",
        quote_identifier(table),
        quote_identifier(column),
        quote_identifier(key_column)
    ))
}

pub fn delete_row_sql(table: &str, key_column: &str) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    require_column(key_column)?;
    Ok(format!(
        "DELETE FROM {} WHERE {} = ?",
        quote_identifier(table),
        quote_identifier(key_column)
    ))
}

pub fn insert_row_sql(table: &str, columns: &[&str]) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    if columns.is_empty() {
        return Err(SqlGenerationError::NoColumns);
    }
    for column in columns {
        require_column(column)?;
    }

    let column_list = columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        quote_identifier(table)
    ))
}

pub fn count_rows_sql(table: &str) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    Ok(format!("SELECT COUNT(*) FROM {}", quote_identifier(table)))
}

/// Selects `rowid` plus one column for rows where that column is set.
pub fn select_non_null_sql(table: &str, column: &str) -> Result<String, SqlGenerationError> {
    require_table(table)?;
    require_column(column)?;
    let quoted_column = quote_identifier(column);
    Ok(format!(
        "SELECT rowid, {quoted_column} FROM {} WHERE {quoted_column} IS NOT NULL",
        quote_identifier(table)
    ))
}

#[cfg(test)]
mod tests {
    use super::{
        add_column_sql, count_rows_sql, create_table_sql, delete_row_sql, drop_table_sql,
        fill_column_sql, insert_row_sql, qualified_column, quote_identifier, rename_column_sql,
        select_non_null_sql, table_info_sql, update_cell_sql, ColumnDefinition,
        SqlGenerationError,
    };

    #[test]
    fn quotes_identifiers_with_double_quotes() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(quote_identifier("order by"), "\"order by\"");
        assert_eq!(qualified_column("orders", "id"), "\"orders\".\"id\"");
    }

    #[test]
    fn generates_ddl_with_quoted_identifiers() {
        let sql = create_table_sql(
            "people",
            &[
                ColumnDefinition::new("id", "INTEGER"),
                ColumnDefinition::new("full name", "VARCHAR(64)"),
            ],
        )
        .expect("valid create table");
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"people\" (\"id\" INTEGER, \"full name\" VARCHAR(64))"
        );

        assert_eq!(
            drop_table_sql("people").expect("drop"),
            "DROP TABLE IF EXISTS \"people\""
        );
        assert_eq!(
            add_column_sql("people", &ColumnDefinition::new("photo", "BLOB")).expect("add"),
            "ALTER TABLE \"people\" ADD COLUMN \"photo\" BLOB"
        );
        assert_eq!(
            rename_column_sql("people", "photo", "avatar").expect("rename"),
            "ALTER TABLE \"people\" RENAME COLUMN \"photo\" TO \"avatar\""
        );
        assert_eq!(
            table_info_sql("select").expect("pragma"),
            "PRAGMA table_info(\"select\")"
        );
    }

    #[test]
    fn generates_dml_with_placeholders_for_values() {
        assert_eq!(
            update_cell_sql("people", "name", "id").expect("update"),
            "UPDATE \"people\" SET \"name\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            delete_row_sql("people", "id").expect("delete"),
            "DELETE FROM \"people\" WHERE \"id\" = ?"
        );
        assert_eq!(
            insert_row_sql("people", &["id", "name"]).expect("insert"),
            "INSERT INTO \"people\" (\"id\", \"name\") VALUES (?, ?)"
        );
        assert_eq!(
            fill_column_sql("people", "active").expect("fill"),
            "UPDATE \"people\" SET \"active\" = ?"
        );
        assert_eq!(
            count_rows_sql("people").expect("count"),
            "SELECT COUNT(*) FROM \"people\""
        );
        assert_eq!(
            select_non_null_sql("people", "photo").expect("non-null"),
            "SELECT rowid, \"photo\" FROM \"people\" WHERE \"photo\" IS NOT NULL"
        );
    }

    #[test]
    fn rejects_empty_identifiers() {
        assert_eq!(
            drop_table_sql("  ").expect_err("empty table"),
            SqlGenerationError::EmptyTableName
        );
        assert_eq!(
            delete_row_sql("people", "").expect_err("empty key"),
            SqlGenerationError::EmptyColumnName
        );
        assert_eq!(
            insert_row_sql("people", &[]).expect_err("no columns"),
            SqlGenerationError::NoColumns
        );
    }

    #[test]
    fn rejects_type_names_that_could_smuggle_sql() {
        let err = add_column_sql(
            "people",
            &ColumnDefinition::new("x", "TEXT); DROP TABLE people; --"),
        )
        .expect_err("injection attempt");
        assert!(matches!(err, SqlGenerationError::InvalidColumnType(_)));

        let err = create_table_sql("t", &[ColumnDefinition::new("x", "")])
            .expect_err("empty type");
        assert!(matches!(err, SqlGenerationError::InvalidColumnType(_)));

        assert!(add_column_sql("t", &ColumnDefinition::new("price", "DECIMAL(10,2)")).is_ok());
    }
}
