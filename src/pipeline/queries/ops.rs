//! Building blocks shared by the query set: grouping, ranking and
//! projection over cleaned rows. All of them walk rows in table order so
//! floating point sums come out identical on every run.

use std::collections::BTreeMap;

use crate::types::{Cell, Column, ColumnSpec, Product, QueryResult, ValueKind};

/// Running sum for a grouped mean
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAcc {
    pub sum: f64,
    pub count: usize,
}

impl MeanAcc {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Row count per key; rows whose key is `None` are excluded.
pub fn count_by<'a, K, F>(rows: impl IntoIterator<Item = &'a Product>, key: F) -> BTreeMap<K, usize>
where
    K: Ord,
    F: Fn(&Product) -> Option<K>,
{
    let mut groups = BTreeMap::new();
    for row in rows {
        if let Some(k) = key(row) {
            *groups.entry(k).or_insert(0) += 1;
        }
    }
    groups
}

/// Mean of `value` per key; rows missing either the key or the value are excluded.
pub fn mean_by<'a, K, F>(
    rows: impl IntoIterator<Item = &'a Product>,
    key: F,
    value: Column,
) -> BTreeMap<K, MeanAcc>
where
    K: Ord,
    F: Fn(&Product) -> Option<K>,
{
    let mut groups: BTreeMap<K, MeanAcc> = BTreeMap::new();
    for row in rows {
        if let (Some(k), Some(v)) = (key(row), row.number(value)) {
            groups.entry(k).or_default().push(v);
        }
    }
    groups
}

/// Mean of a column over rows that carry it
pub fn mean_of<'a>(rows: impl IntoIterator<Item = &'a Product>, value: Column) -> Option<f64> {
    let mut acc = MeanAcc::default();
    for v in rows.into_iter().filter_map(|r| r.number(value)) {
        acc.push(v);
    }
    acc.mean()
}

/// Counts ordered by count descending, ties by key ascending
pub fn ranked<K: Ord>(counts: BTreeMap<K, usize>, limit: Option<usize>) -> Vec<(K, usize)> {
    let mut entries: Vec<(K, usize)> = counts.into_iter().collect();
    // stable: equal counts keep key order
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}

/// `n` rows with the largest value of `column`, ties kept in table order
pub fn largest<'a>(rows: &'a [Product], column: Column, n: usize) -> Vec<&'a Product> {
    let mut with_value: Vec<(&Product, f64)> = rows
        .iter()
        .filter_map(|r| r.number(column).map(|v| (r, v)))
        .collect();
    with_value.sort_by(|a, b| b.1.total_cmp(&a.1));
    with_value.into_iter().take(n).map(|(r, _)| r).collect()
}

/// Full snapshot rows for every product passing `keep`
pub fn filter_rows<F>(name: &str, rows: &[Product], keep: F) -> QueryResult
where
    F: Fn(&Product) -> bool,
{
    project(name, rows.iter().filter(|r| keep(*r)), &Column::ALL)
}

pub fn project<'a>(
    name: &str,
    rows: impl IntoIterator<Item = &'a Product>,
    columns: &[Column],
) -> QueryResult {
    let mut result = QueryResult::new(name, columns.iter().map(|c| c.spec()).collect());
    for row in rows {
        result.push_row(columns.iter().map(|c| row.cell(*c)).collect());
    }
    result
}

/// Two-column `key, count` table
pub fn count_table<K: Into<Cell>>(
    name: &str,
    key: ColumnSpec,
    count_name: &str,
    entries: impl IntoIterator<Item = (K, usize)>,
) -> QueryResult {
    let mut result = QueryResult::new(name, vec![key, ColumnSpec::new(count_name, ValueKind::Integer)]);
    for (k, n) in entries {
        result.push_row(vec![k.into(), Cell::count(n)]);
    }
    result
}

/// Two-column `key, mean` table, groups in key order
pub fn mean_table<K: Into<Cell>>(
    name: &str,
    key: ColumnSpec,
    mean_name: &str,
    groups: BTreeMap<K, MeanAcc>,
) -> QueryResult {
    let mut result = QueryResult::new(name, vec![key, ColumnSpec::new(mean_name, ValueKind::Float)]);
    for (k, acc) in groups {
        result.push_row(vec![k.into(), Cell::float(acc.mean())]);
    }
    result
}

/// One-row, one-column table
pub fn scalar_table(name: &str, column: ColumnSpec, value: Cell) -> QueryResult {
    let mut result = QueryResult::new(name, vec![column]);
    result.push_row(vec![value]);
    result
}
