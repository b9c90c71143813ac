//! Directive model: the immutable records parsed out of `COMMENT ON
//! TABLE`/`COMMENT ON COLUMN` payloads.
//!
//! Directives accumulate for the whole run: once a comment is parsed, its
//! entries persist regardless of how many tables or COPY blocks follow.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// One relation specification inside a mutation entry.
///
/// `to_column_name` is accepted for forward compatibility with directive
/// authors but unused: both the write and the read side of the relation
/// store key off `from_column_name` (see [`crate::relation::RelationStore`]).
#[derive(Debug, Clone, Deserialize)]
pub struct RelationSpec {
    pub table_name: String,
    pub column_name: String,
    pub from_column_name: String,
    #[serde(default)]
    pub to_column_name: Option<String>,
}

/// The three condition operations a directive can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equal,
    NotEqual,
    ByPattern,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionSpec {
    pub column_name: String,
    pub operation: ConditionOp,
    pub value: String,
}

/// One mutation entry in a column's ordered mutation list.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationEntry {
    pub mutation_name: String,
    #[serde(default)]
    pub mutation_kwargs: Value,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
}

/// Accepts either a single object or an array of objects — the "one element
/// is equivalent to a singleton array" rule from the column-directive
/// payload contract.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<MutationEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        other => {
            let entry: MutationEntry =
                serde_json::from_value(other).map_err(serde::de::Error::custom)?;
            Ok(vec![entry])
        }
    }
}

/// Wrapper used only to reuse `one_or_many` via `serde_json::from_str`.
#[derive(Deserialize)]
struct MutationEntries(#[serde(deserialize_with = "one_or_many")] Vec<MutationEntry>);

/// Parse a column directive's `anon:` JSON payload into its mutation
/// entries, accepting either a bare object or an array.
pub fn parse_mutation_entries(json: &str) -> serde_json::Result<Vec<MutationEntry>> {
    let wrapper: MutationEntries = serde_json::from_str(json)?;
    Ok(wrapper.0)
}

/// Table-level directive payload. The only recognized `mutation_name`
/// today is `"delete"`; anything else is parsed but ignored by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct TableDirective {
    pub mutation_name: String,
}

/// All column directives accumulated so far, keyed by schema-qualified
/// table name, then by column name. Each column maps to its ordered list
/// of mutation entries.
#[derive(Debug, Default)]
pub struct DirectiveStore {
    columns: HashMap<String, HashMap<String, Vec<MutationEntry>>>,
    delete_tables: std::collections::HashSet<String>,
}

impl DirectiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column_entries(&mut self, table: &str, column: &str, entries: Vec<MutationEntry>) {
        self.columns
            .entry(table.to_string())
            .or_default()
            .entry(column.to_string())
            .or_default()
            .extend(entries);
    }

    pub fn mark_delete(&mut self, table: &str) {
        self.delete_tables.insert(table.to_string());
    }

    /// Column mutation map for a table, if any directives were registered.
    pub fn columns_for(&self, table: &str) -> Option<&HashMap<String, Vec<MutationEntry>>> {
        self.columns.get(table)
    }

    pub fn has_any_directives(&self, table: &str) -> bool {
        self.columns.get(table).is_some_and(|m| !m.is_empty())
    }

    pub fn is_marked_delete(&self, table: &str) -> bool {
        self.delete_tables.contains(table)
    }
}
