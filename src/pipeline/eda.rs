//! Exploratory tables: the numbers behind the energy/sugar histograms,
//! the sugar-by-calorie box plot and the nutrient correlation heatmap.
//! They go through the same writer as the query artifacts.

use std::collections::BTreeMap;

use crate::constants::HISTOGRAM_BINS;
use crate::pipeline::queries::QueryDef;
use crate::table::CleanedTable;
use crate::types::{Cell, Column, ColumnSpec, QueryResult, ValueKind};

const CORRELATION_FIELDS: [Column; 5] = [
    Column::EnergyKcal,
    Column::Sugars,
    Column::Carbohydrates,
    Column::Fat,
    Column::Proteins,
];

static EDA_TABLES: [QueryDef; 4] = [
    QueryDef::new(
        "energy_hist",
        "Energy (kcal per 100g) histogram",
        &[Column::EnergyKcal],
        energy_hist,
    ),
    QueryDef::new(
        "sugar_hist",
        "Sugar (g per 100g) histogram",
        &[Column::Sugars],
        sugar_hist,
    ),
    QueryDef::new(
        "box_sugar_calorie",
        "Sugar distribution per calorie category",
        &[Column::CalorieCategory, Column::Sugars],
        box_sugar_calorie,
    ),
    QueryDef::new(
        "heatmap_corr",
        "Pearson correlation between core nutrients",
        &CORRELATION_FIELDS,
        heatmap_corr,
    ),
];

pub fn eda_tables() -> &'static [QueryDef] {
    &EDA_TABLES
}

fn values(table: &CleanedTable, column: Column) -> Vec<f64> {
    table.rows().iter().filter_map(|p| p.number(column)).collect()
}

fn energy_hist(name: &str, table: &CleanedTable) -> QueryResult {
    histogram_table(name, &values(table, Column::EnergyKcal), HISTOGRAM_BINS)
}

fn sugar_hist(name: &str, table: &CleanedTable) -> QueryResult {
    histogram_table(name, &values(table, Column::Sugars), HISTOGRAM_BINS)
}

/// Equal-width bins over `[min, max]`; the last bin is closed on the right.
/// A single distinct value is spread over `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    // divide before subtracting so a span near f64::MAX stays finite
    let width = hi / bins as f64 - lo / bins as f64;
    if !width.is_finite() || width <= 0.0 {
        return Vec::new();
    }
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = ((v / width - lo / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, n)| {
            let start = lo + i as f64 * width;
            let end = if i + 1 == bins { hi } else { lo + (i + 1) as f64 * width };
            (start, end, n)
        })
        .collect()
}

fn histogram_table(name: &str, values: &[f64], bins: usize) -> QueryResult {
    let mut result = QueryResult::new(
        name,
        vec![
            ColumnSpec::new("bin_start", ValueKind::Float),
            ColumnSpec::new("bin_end", ValueKind::Float),
            ColumnSpec::new("count", ValueKind::Integer),
        ],
    );
    for (start, end, n) in histogram(values, bins) {
        result.push_row(vec![Cell::float(Some(start)), Cell::float(Some(end)), Cell::count(n)]);
    }
    result
}

/// Linear-interpolation percentile of sorted data, `q` in `[0, 1]`
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    let (a, b) = (sorted[lower], sorted[upper]);
    let value = a + (b - a) * frac;
    if value.is_finite() {
        Some(value)
    } else {
        Some(a * (1.0 - frac) + b * frac).filter(|v| v.is_finite())
    }
}

fn box_sugar_calorie(name: &str, table: &CleanedTable) -> QueryResult {
    let mut groups: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
    for p in table.rows() {
        if let Some(s) = p.nutrients.sugars {
            groups.entry(p.calorie_category.as_str()).or_default().push(s);
        }
    }

    let stat_columns = ["count", "min", "q1", "median", "q3", "max"];
    let mut columns = vec![Column::CalorieCategory.spec()];
    columns.extend(stat_columns.iter().map(|c| {
        let kind = if *c == "count" { ValueKind::Integer } else { ValueKind::Float };
        ColumnSpec::new(*c, kind)
    }));
    let mut result = QueryResult::new(name, columns);

    for (category, mut sugars) in groups {
        sugars.sort_by(f64::total_cmp);
        let mut row = vec![Cell::text(category), Cell::count(sugars.len())];
        row.extend(
            [0.0, 0.25, 0.5, 0.75, 1.0]
                .iter()
                .map(|q| Cell::float(percentile(&sugars, *q))),
        );
        result.push_row(row);
    }
    result
}

/// Pearson correlation over rows where both columns are present
pub fn pearson(table: &CleanedTable, a: Column, b: Column) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = table
        .rows()
        .iter()
        .filter_map(|p| Some((p.number(a)?, p.number(b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if !(cov.is_finite() && var_x.is_finite() && var_y.is_finite()) {
        return None;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

fn heatmap_corr(name: &str, table: &CleanedTable) -> QueryResult {
    let mut columns = vec![ColumnSpec::new("field", ValueKind::Text)];
    columns.extend(
        CORRELATION_FIELDS
            .iter()
            .map(|c| ColumnSpec::new(c.name(), ValueKind::Float)),
    );
    let mut result = QueryResult::new(name, columns);
    for a in CORRELATION_FIELDS {
        let mut row = vec![Cell::text(a.name())];
        row.extend(CORRELATION_FIELDS.iter().map(|b| Cell::float(pearson(table, a, *b))));
        result.push_row(row);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Level, Nutrients, Product, UltraProcessed};

    #[test]
    fn histogram_covers_every_value() {
        let values = [0.0, 1.0, 2.0, 3.0, 10.0];
        let bins = histogram(&values, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.2).sum::<usize>(), 5);
        assert_eq!(bins[0], (0.0, 2.0, 2));
        assert_eq!(bins[4].2, 1);
        assert_eq!(bins[4].1, 10.0);
    }

    #[test]
    fn histogram_of_constant_values() {
        let bins = histogram(&[7.0, 7.0], 2);
        assert_eq!(bins[0].0, 6.5);
        assert_eq!(bins[1].1, 7.5);
        assert_eq!(bins.iter().map(|b| b.2).sum::<usize>(), 2);
    }

    #[test]
    fn histogram_of_extreme_span_stays_finite() {
        let bins = histogram(&[-1e308, 0.0, 1e308], 4);
        assert_eq!(bins.len(), 4);
        assert!(bins.iter().all(|(start, end, _)| start.is_finite() && end.is_finite()));
        assert_eq!(bins.iter().map(|b| b.2).sum::<usize>(), 3);
        assert_eq!(bins[0].2, 1);
        assert_eq!(bins[3].2, 1);
    }

    #[test]
    fn extreme_values_never_produce_nan() {
        let sorted = [-1e308, 1e308];
        assert_eq!(percentile(&sorted, 0.5), Some(0.0));

        let table = CleanedTable::with_all_columns(
            [(-1e308, 1.0), (1e308, 2.0), (0.0, 3.0)]
                .iter()
                .enumerate()
                .map(|(i, (kcal, sugars))| {
                    let mut nutrients = Nutrients::default();
                    nutrients.energy_kcal = Some(*kcal);
                    nutrients.sugars = Some(*sugars);
                    Product {
                        product_code: format!("{i}"),
                        product_name: None,
                        brand: "Test".into(),
                        nutrients,
                        nova_group: None,
                        sugar_to_carb_ratio: None,
                        calorie_category: Level::Unknown,
                        sugar_category: Level::Unknown,
                        ultra_processed: UltraProcessed::Unknown,
                    }
                })
                .collect(),
        );
        assert_eq!(pearson(&table, Column::EnergyKcal, Column::Sugars), None);

        let heatmap = heatmap_corr("heatmap_corr", &table);
        assert!(heatmap
            .rows
            .iter()
            .flatten()
            .all(|cell| !cell.render().contains("NaN") && !cell.render().contains("inf")));
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.5), Some(2.5));
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 1.0), Some(4.0));
        assert_eq!(percentile(&[], 0.5), None);
    }
}
