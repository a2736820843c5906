use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::TableSchema;
use crate::sql_generator::qualified_column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

impl JoinKind {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown join kind `{0}`")]
pub struct ParseJoinKindError(String);

impl FromStr for JoinKind {
    type Err = ParseJoinKindError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INNER" => Ok(Self::Inner),
            "LEFT" => Ok(Self::Left),
            _ => Err(ParseJoinKindError(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinDescriptor {
    pub target_table: String,
    /// Fully quoted equality, e.g. `"orders"."customer_id" = "customers"."id"`.
    pub condition: String,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("column `{column}` not found in table `{table}`")]
    UnknownBaseColumn { table: String, column: String },
    #[error("column `{column}` not found in table `{table}`")]
    UnknownTargetColumn { table: String, column: String },
    #[error("table `{target}` is already joined to `{base}`")]
    AlreadyJoined { base: String, target: String },
    #[error("table `{0}` cannot be joined to itself")]
    SelfJoin(String),
    #[error("no common columns between `{base}` and `{target}`")]
    NoCommonColumns { base: String, target: String },
}

#[must_use]
pub fn join_condition(
    base_table: &str,
    base_column: &str,
    target_table: &str,
    target_column: &str,
) -> String {
    format!(
        "{} = {}",
        qualified_column(base_table, base_column),
        qualified_column(target_table, target_column)
    )
}

/// Join descriptors per base table. Switching the base table away and back
/// restores its joins.
#[derive(Debug, Clone, Default)]
pub struct JoinRegistry {
    joins: HashMap<String, Vec<JoinDescriptor>>,
}

impl JoinRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_join(
        &mut self,
        base: &TableSchema,
        target: &TableSchema,
        base_column: &str,
        target_column: &str,
        kind: JoinKind,
    ) -> Result<JoinDescriptor, JoinError> {
        if !base.has_column(base_column) {
            return Err(JoinError::UnknownBaseColumn {
                table: base.name.clone(),
                column: base_column.to_string(),
            });
        }
        if !target.has_column(target_column) {
            return Err(JoinError::UnknownTargetColumn {
                table: target.name.clone(),
                column: target_column.to_string(),
            });
        }
        if base.name == target.name {
            return Err(JoinError::SelfJoin(base.name.clone()));
        }
        if self.is_joined(&base.name, &target.name) {
            return Err(JoinError::AlreadyJoined {
                base: base.name.clone(),
                target: target.name.clone(),
            });
        }

        let descriptor = JoinDescriptor {
            target_table: target.name.clone(),
            condition: join_condition(&base.name, base_column, &target.name, target_column),
            kind,
        };
        self.joins
            .entry(base.name.clone())
            .or_default()
            .push(descriptor.clone());
        Ok(descriptor)
    }

    pub fn remove_last_join(&mut self, base_table: &str) -> Option<JoinDescriptor> {
        self.joins.get_mut(base_table).and_then(Vec::pop)
    }

    pub fn clear(&mut self, base_table: &str) {
        if let Some(joins) = self.joins.get_mut(base_table) {
            joins.clear();
        }
    }

    /// Drops everything known about a base table, e.g. after `DROP TABLE`.
    pub fn forget(&mut self, base_table: &str) {
        self.joins.remove(base_table);
    }

    #[must_use]
    pub fn snapshot(&self, base_table: &str) -> Vec<JoinDescriptor> {
        self.joins.get(base_table).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn joined_tables(&self, base_table: &str) -> Vec<&str> {
        self.joins
            .get(base_table)
            .map(|joins| {
                joins
                    .iter()
                    .map(|join| join.target_table.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_joined(&self, base_table: &str, target_table: &str) -> bool {
        self.joins.get(base_table).is_some_and(|joins| {
            joins
                .iter()
                .any(|join| join.target_table == target_table)
        })
    }
}

/// The shared column with the lowest ordinal in the base table.
#[must_use]
pub fn common_join_column<'a>(base: &'a TableSchema, target: &TableSchema) -> Option<&'a str> {
    base.columns
        .iter()
        .find(|column| target.has_column(&column.name))
        .map(|column| column.name.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickJoinOutcome {
    Joined {
        target: String,
        column: String,
        descriptor: JoinDescriptor,
    },
    Skipped {
        target: String,
        reason: JoinError,
    },
}

/// Equi-joins each target on its first common column. A target that cannot
/// be joined is reported and skipped; the rest of the batch still runs.
pub fn quick_join(
    registry: &mut JoinRegistry,
    base: &TableSchema,
    targets: &[&TableSchema],
) -> Vec<QuickJoinOutcome> {
    targets
        .iter()
        .map(|target| {
            let Some(column) = common_join_column(base, target) else {
                return QuickJoinOutcome::Skipped {
                    target: target.name.clone(),
                    reason: JoinError::NoCommonColumns {
                        base: base.name.clone(),
                        target: target.name.clone(),
                    },
                };
            };

            match registry.add_join(base, target, column, column, JoinKind::Inner) {
                Ok(descriptor) => QuickJoinOutcome::Joined {
                    target: target.name.clone(),
                    column: column.to_string(),
                    descriptor,
                },
                Err(reason) => QuickJoinOutcome::Skipped {
                    target: target.name.clone(),
                    reason,
                },
            }
        })
        .collect()
}
