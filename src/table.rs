use crate::error::{PipelineError, Result};
use crate::types::{Column, Product};
use std::collections::BTreeSet;

/// Normalized, deduplicated product table shared read-only by every query.
///
/// Rows are ordered by product code. `present` records which columns the
/// source actually carried, so a query can tell "no value for this row"
/// apart from "this column does not exist".
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTable {
    rows: Vec<Product>,
    present: BTreeSet<Column>,
}

impl CleanedTable {
    /// Builds a table, sorting rows by product code.
    pub fn new(mut rows: Vec<Product>, present: BTreeSet<Column>) -> Self {
        rows.sort_by(|a, b| a.product_code.cmp(&b.product_code));
        Self { rows, present }
    }

    /// Table where every schema column counts as present
    pub fn with_all_columns(rows: Vec<Product>) -> Self {
        Self::new(rows, Column::ALL.into_iter().collect())
    }

    pub fn rows(&self) -> &[Product] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.present.contains(&column)
    }

    /// Drops a column from the schema, e.g. to mimic a source that never carried it
    pub fn without_column(mut self, column: Column) -> Self {
        self.present.remove(&column);
        for derived in Column::ALL {
            if derived.derived_from().contains(&column) {
                self.present.remove(&derived);
            }
        }
        self
    }

    /// Fails with `QueryComputation` naming the first absent column
    pub fn require(&self, query: &str, columns: &[Column]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(**c)) {
            Some(missing) => Err(PipelineError::QueryComputation {
                query: query.to_string(),
                reason: format!("required column '{}' is absent from the cleaned table", missing),
            }),
            None => Ok(()),
        }
    }
}
