//! Relation key store: ties a source value in one column to a freshly
//! minted replacement so that other rows — in the same table or another
//! one — referencing the same source value receive an identical
//! replacement.
//!
//! The store deliberately conflates `from_column_name` and
//! `to_column_name` (see [`SPEC_FULL.md`]'s Open Questions §9): both the
//! write and the read side key off `from_column_name`, so a relation spec
//! resolves correctly whenever the same column name is used as both the
//! publishing and subscribing key.

use std::collections::HashMap;

use crate::directive::RelationSpec;
use crate::error::{ObfuscateError, Result};

/// `(table:column) -> from_column_name -> source_value -> relation_key`
type FkMap = HashMap<String, HashMap<String, HashMap<String, String>>>;

#[derive(Debug, Default)]
pub struct RelationStore {
    fk_map: FkMap,
    value_map: HashMap<String, String>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a replacement for the given relation specs against the
    /// current row's values. Returns `Some(replacement)` on a hit.
    ///
    /// `lookup_value` resolves a column name in the *current* row to its
    /// original (pre-obfuscation) string value.
    pub fn find_existing<'a>(
        &self,
        relations: &[RelationSpec],
        lookup_value: impl Fn(&str) -> Option<&'a str>,
    ) -> Result<Option<String>> {
        for relation in relations {
            let key_table = format!("{}:{}", relation.table_name, relation.column_name);
            let Some(value) = lookup_value(&relation.from_column_name) else {
                continue;
            };
            let Some(relation_key) = self
                .fk_map
                .get(&key_table)
                .and_then(|by_col| by_col.get(&relation.from_column_name))
                .and_then(|by_val| by_val.get(value))
            else {
                continue;
            };

            let replacement = self.value_map.get(relation_key).ok_or_else(|| {
                ObfuscateError::InvalidRelationKey(relation_key.clone())
            })?;
            return Ok(Some(replacement.clone()));
        }

        Ok(None)
    }

    /// Record a freshly generated replacement under every relation spec of
    /// the firing mutation entry, keyed by the *owning* table/column (not
    /// the relation's target table), as the source spec describes.
    pub fn record_new<'a>(
        &mut self,
        own_table: &str,
        own_column: &str,
        relations: &[RelationSpec],
        lookup_value: impl Fn(&str) -> Option<&'a str>,
        replacement: String,
    ) {
        let relation_key = uuid::Uuid::new_v4().to_string();
        let key_table = format!("{}:{}", own_table, own_column);

        for relation in relations {
            let Some(value) = lookup_value(&relation.from_column_name) else {
                continue;
            };
            self.fk_map
                .entry(key_table.clone())
                .or_default()
                .entry(relation.from_column_name.clone())
                .or_default()
                .insert(value.to_string(), relation_key.clone());
        }

        self.value_map.insert(relation_key, replacement);
    }
}
