//! Line Obfuscator: the plain-text state machine that recognizes
//! `COMMENT ON TABLE`/`COMMENT ON COLUMN` directives and rewrites `COPY
//! ... FROM stdin` row data accordingly.

use std::collections::HashMap;

use regex::Regex;

use crate::condition::conditions_met;
use crate::directive::{parse_mutation_entries, DirectiveStore, MutationEntry, TableDirective};
use crate::error::{ObfuscateError, Result};
use crate::generator::GeneratorRegistry;
use crate::relation::RelationStore;

const ROW_TERMINATOR: &str = "\\.";

/// Compiled once per obfuscator instance; none of these patterns depend
/// on run configuration.
struct Patterns {
    copy_header: Regex,
    comment_column: Regex,
    comment_table: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            copy_header: Regex::new(r"^COPY ([\w.]+) \(([\s\S]+)\) FROM stdin;$").unwrap(),
            comment_column: Regex::new(
                r"^COMMENT ON COLUMN ([\w.]+)\.([\w]+) IS 'anon: ([\s\S]*)';$",
            )
            .unwrap(),
            comment_table: Regex::new(r"^COMMENT ON TABLE ([\w.]+) IS 'anon: ([\s\S]*)';$")
                .unwrap(),
        }
    }
}

/// Row-context state tracked between a `COPY ... FROM stdin;` header and
/// its terminating `\.` line.
#[derive(Default)]
struct RowContext {
    active: bool,
    delete_active: bool,
    table: String,
    columns: Vec<String>,
    column_indices: HashMap<String, usize>,
}

pub struct LineObfuscator {
    patterns: Patterns,
    directives: DirectiveStore,
    relations: RelationStore,
    generators: GeneratorRegistry,
    delimiter: char,
    delete_patterns: Vec<Regex>,
    row: RowContext,
}

impl LineObfuscator {
    pub fn new(
        delimiter: char,
        seed: u64,
        locale: impl Into<String>,
        delete_patterns: Vec<Regex>,
    ) -> Self {
        Self {
            patterns: Patterns::new(),
            directives: DirectiveStore::new(),
            relations: RelationStore::new(),
            generators: GeneratorRegistry::new(seed, locale),
            delimiter,
            delete_patterns,
            row: RowContext::default(),
        }
    }

    /// Process one logical line (no trailing newline). Returns the line
    /// to emit, or `None` if the row was dropped.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<String>> {
        if line.starts_with(ROW_TERMINATOR) {
            self.row = RowContext::default();
            return Ok(Some(line.to_string()));
        }

        if self.row.active {
            return self.transform_row(line);
        }

        if let Some(caps) = self.patterns.comment_column.captures(line) {
            self.parse_column_directive(&caps[1], &caps[2], &caps[3])?;
            return Ok(Some(line.to_string()));
        }

        if let Some(caps) = self.patterns.comment_table.captures(line) {
            self.parse_table_directive(&caps[1], &caps[2]);
            return Ok(Some(line.to_string()));
        }

        if let Some(caps) = self.patterns.copy_header.captures(line) {
            self.parse_copy_header(&caps[1], &caps[2]);
            return Ok(Some(line.to_string()));
        }

        Ok(Some(line.to_string()))
    }

    fn parse_column_directive(&mut self, qualified: &str, column: &str, json: &str) -> Result<()> {
        let table = qualified.to_string();
        let entries = match parse_mutation_entries(json) {
            Ok(entries) => entries,
            Err(_) => {
                // Malformed JSON is tolerated: the line still passes through.
                return Ok(());
            }
        };

        for entry in &entries {
            if !self.generators.is_known(&entry.mutation_name) {
                return Err(ObfuscateError::UnknownMutation(entry.mutation_name.clone()));
            }
        }

        self.directives.add_column_entries(&table, column, entries);
        Ok(())
    }

    fn parse_table_directive(&mut self, qualified: &str, json: &str) {
        let Ok(directive) = serde_json::from_str::<TableDirective>(json) else {
            return;
        };
        if directive.mutation_name == "delete" {
            self.directives.mark_delete(qualified);
        }
    }

    fn parse_copy_header(&mut self, qualified: &str, column_list: &str) {
        let columns: Vec<String> = column_list
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_string())
            .collect();
        let column_indices = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        let delete_active = self.directives.is_marked_delete(qualified)
            || self
                .delete_patterns
                .iter()
                .any(|p| p.is_match(qualified));

        self.row = RowContext {
            active: true,
            delete_active,
            table: qualified.to_string(),
            columns,
            column_indices,
        };
    }

    fn transform_row(&mut self, line: &str) -> Result<Option<String>> {
        if self.row.delete_active {
            return Ok(None);
        }

        let has_directives = self.directives.has_any_directives(&self.row.table);
        if !has_directives {
            return Ok(Some(line.to_string()));
        }

        let values: Vec<&str> = line.split(self.delimiter).collect();
        let mut out: Vec<String> = values.iter().map(|v| v.to_string()).collect();

        let column_entries: HashMap<String, Vec<MutationEntry>> = self
            .directives
            .columns_for(&self.row.table)
            .cloned()
            .unwrap_or_default();

        let columns = self.row.columns.clone();
        for (index, column) in columns.into_iter().enumerate() {
            let Some(entries) = column_entries.get(&column) else {
                continue;
            };
            if let Some(replacement) =
                self.fire_entries(&column, entries, &values, &out)?
            {
                out[index] = replacement;
            }
        }

        Ok(Some(out.join(&self.delimiter.to_string())))
    }

    fn fire_entries(
        &mut self,
        column: &str,
        entries: &[MutationEntry],
        values: &[&str],
        obfuscated_so_far: &[String],
    ) -> Result<Option<String>> {
        let lookup = |col: &str| -> Option<&str> {
            self.row.column_indices.get(col).and_then(|&i| values.get(i)).copied()
        };
        let already_obfuscated = |col: &str| -> Option<String> {
            self.row
                .column_indices
                .get(col)
                .and_then(|&i| obfuscated_so_far.get(i))
                .cloned()
        };

        for entry in entries {
            if !conditions_met(&entry.conditions, lookup) {
                continue;
            }

            if entry.relations.is_empty() {
                let value =
                    self.generators
                        .generate(&entry.mutation_name, &entry.mutation_kwargs, &already_obfuscated)?;
                return Ok(Some(value));
            }

            if let Some(existing) = self.relations.find_existing(&entry.relations, lookup)? {
                return Ok(Some(existing));
            }

            let fresh =
                self.generators
                    .generate(&entry.mutation_name, &entry.mutation_kwargs, &already_obfuscated)?;
            self.relations.record_new(
                &self.row.table,
                column,
                &entry.relations,
                lookup,
                fresh.clone(),
            );
            return Ok(Some(fresh));
        }

        Ok(None)
    }
}
