//! VariableTable: the resolved, read-only symbol snapshot
//!
//! A table is built once per program image by
//! [`super::resolver::SymbolResolver`] and never mutated afterwards.
//! [`DataDictionary`] holds the current table behind an `Arc`; a reload
//! builds a fresh table and swaps the pointer, so readers holding an older
//! snapshot keep seeing it unchanged.

use super::resolver::{ResolveDiagnostics, SymbolResolver};
use super::type_table::TypeGraphStats;
use crate::error::{DestraError, Result};
use crate::types::Variable;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Name-keyed variables of one program image
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: BTreeMap<String, Variable>,
    diagnostics: ResolveDiagnostics,
    type_stats: TypeGraphStats,
    source: Option<PathBuf>,
}

impl VariableTable {
    pub fn new(
        variables: BTreeMap<String, Variable>,
        diagnostics: ResolveDiagnostics,
        type_stats: TypeGraphStats,
    ) -> Self {
        Self {
            variables,
            diagnostics,
            type_stats,
            source: None,
        }
    }

    /// Record the image this table was built from
    pub fn with_source(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn diagnostics(&self) -> &ResolveDiagnostics {
        &self.diagnostics
    }

    pub fn type_stats(&self) -> &TypeGraphStats {
        &self.type_stats
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Variables in name order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Sorted names matching a case-insensitive shell glob
    ///
    /// `None` or an empty pattern returns every name. A pattern that is not
    /// a valid glob is matched literally.
    pub fn list(&self, pattern: Option<&str>) -> Vec<&str> {
        match pattern.filter(|p| !p.is_empty()) {
            None => self.variables.keys().map(String::as_str).collect(),
            Some(pattern) => {
                let pattern = compile(pattern);
                self.variables
                    .keys()
                    .filter(|name| pattern.matches_with(name, MATCH_OPTIONS))
                    .map(String::as_str)
                    .collect()
            }
        }
    }

    /// Variables passing every given filter
    ///
    /// Size bounds are inclusive and the type tag must match exactly.
    pub fn search(
        &self,
        pattern: &str,
        min_size: Option<u64>,
        max_size: Option<u64>,
        type_tag: Option<&str>,
    ) -> Vec<&Variable> {
        let pattern = compile(pattern);
        self.variables
            .iter()
            .filter(|(name, _)| pattern.matches_with(name, MATCH_OPTIONS))
            .map(|(_, var)| var)
            .filter(|var| min_size.is_none_or(|min| var.size >= min))
            .filter(|var| max_size.is_none_or(|max| var.size <= max))
            .filter(|var| type_tag.is_none_or(|tag| var.base_type == tag))
            .collect()
    }

    /// Pretty JSON array of every variable, in name order
    pub fn to_json(&self) -> Result<String> {
        let variables: Vec<&Variable> = self.variables.values().collect();
        serde_json::to_string_pretty(&variables)
            .map_err(|e| DestraError::Serialization(e.to_string()))
    }
}

fn compile(pattern: &str) -> Pattern {
    Pattern::new(pattern).unwrap_or_else(|e| {
        tracing::debug!("Invalid pattern {:?} ({}), matching literally", pattern, e);
        Pattern::new(&Pattern::escape(pattern)).unwrap_or_default()
    })
}

/// Holder of the current [`VariableTable`]
#[derive(Debug, Default, Clone)]
pub struct DataDictionary {
    current: Option<Arc<VariableTable>>,
}

impl DataDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from `path`; the previous table stays current on failure
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<Arc<VariableTable>> {
        let path = path.as_ref();
        match SymbolResolver::build(path) {
            Ok(table) => {
                let table = Arc::new(table);
                self.current = Some(Arc::clone(&table));
                Ok(table)
            }
            Err(e) => {
                tracing::warn!("Reload of {} failed, keeping previous table: {}", path.display(), e);
                Err(e)
            }
        }
    }

    /// Replace the current table directly
    pub fn replace(&mut self, table: VariableTable) -> Arc<VariableTable> {
        let table = Arc::new(table);
        self.current = Some(Arc::clone(&table));
        table
    }

    pub fn snapshot(&self) -> Option<Arc<VariableTable>> {
        self.current.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }
}
