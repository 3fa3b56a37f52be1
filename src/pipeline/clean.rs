use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::constants::{
    LOW_CALORIE_MAX_KCAL, LOW_SUGAR_BELOW_G, MODERATE_CALORIE_MAX_KCAL, MODERATE_SUGAR_MAX_G,
    ULTRA_PROCESSED_NOVA_GROUP, UNKNOWN_BRAND,
};
use crate::error::{PipelineError, Result};
use crate::table::CleanedTable;
use crate::types::{Column, Level, Nutrients, Product, RawRecord, UltraProcessed};

/// Counts from one cleaning pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningStats {
    pub input_records: usize,
    pub missing_identifier: usize,
    pub duplicates: usize,
    pub kept: usize,
}

/// Turns fetched records into the cleaned table.
///
/// Missing-value policy: a nutrient that is absent or fails numeric
/// coercion becomes `None` for that row only. Rows are dropped solely for
/// a missing identifier or as later duplicates of an identifier.
#[instrument(skip(records), fields(input = records.len()))]
pub fn clean(records: &[RawRecord]) -> Result<(CleanedTable, CleaningStats)> {
    if records.is_empty() {
        return Err(PipelineError::EmptyInput("source yielded zero records".into()));
    }

    let mut stats = CleaningStats {
        input_records: records.len(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut present: BTreeSet<Column> = [Column::ProductCode, Column::ProductName, Column::Brand]
        .into_iter()
        .collect();
    let mut rows = Vec::new();

    for record in records {
        let Some(code) = record.identifier() else {
            stats.missing_identifier += 1;
            continue;
        };
        if !seen.insert(code.clone()) {
            debug!("Dropping duplicate product {}", code);
            stats.duplicates += 1;
            continue;
        }

        for column in Column::NUTRIENTS {
            if column.source_keys().iter().any(|k| record.nutriment(k).is_some()) {
                present.insert(column);
            }
        }
        if nova_source(record).is_some() {
            present.insert(Column::NovaGroup);
        }

        rows.push(clean_record(code, record));
    }

    for derived in [
        Column::SugarToCarbRatio,
        Column::CalorieCategory,
        Column::SugarCategory,
        Column::UltraProcessed,
    ] {
        if derived.derived_from().iter().all(|c| present.contains(c)) {
            present.insert(derived);
        }
    }

    stats.kept = rows.len();
    if rows.is_empty() {
        return Err(PipelineError::EmptyInput(format!(
            "all {} records lacked a product identifier",
            stats.input_records
        )));
    }

    info!(
        "Cleaned {} records: kept {}, {} without identifier, {} duplicates",
        stats.input_records, stats.kept, stats.missing_identifier, stats.duplicates
    );
    Ok((CleanedTable::new(rows, present), stats))
}

fn clean_record(code: String, record: &RawRecord) -> Product {
    let mut nutrients = Nutrients::default();
    for column in Column::NUTRIENTS {
        let value = column
            .source_keys()
            .iter()
            .find_map(|k| record.nutriment(k))
            .and_then(to_float);
        nutrients.set(column, value);
    }
    let nova_group = nova_source(record).and_then(to_float).and_then(nova_level);

    let sugar_to_carb_ratio = sugar_to_carb_ratio(nutrients.sugars, nutrients.carbohydrates);
    let calorie_category = calorie_category(nutrients.energy_kcal);
    let sugar_category = sugar_category(nutrients.sugars);
    let ultra_processed = ultra_processed(nova_group);

    Product {
        product_code: code,
        product_name: text_field(record.product_name.as_ref()),
        brand: normalize_brand(text_field(record.brands.as_ref()).as_deref()),
        nutrients,
        nova_group,
        sugar_to_carb_ratio,
        calorie_category,
        sugar_category,
        ultra_processed,
    }
}

fn nova_source(record: &RawRecord) -> Option<&serde_json::Value> {
    Column::NovaGroup
        .source_keys()
        .iter()
        .find_map(|k| record.nutriment(k))
        .or_else(|| record.nova_group.as_ref().filter(|v| !v.is_null()))
}

fn text_field(value: Option<&serde_json::Value>) -> Option<String> {
    let text = match value? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Numeric coercion: numbers as is, strings by their first token.
/// Non-finite results count as missing.
pub fn to_float(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.split_whitespace().next()?.parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn nova_level(value: f64) -> Option<u8> {
    if value.fract() == 0.0 && (1.0..=4.0).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// First comma-separated brand, title-cased; `"Unknown"` when blank.
pub fn normalize_brand(brands: Option<&str>) -> String {
    let first = brands
        .and_then(|b| b.split(',').next())
        .map(str::trim)
        .unwrap_or("");
    if first.is_empty() {
        return UNKNOWN_BRAND.to_string();
    }
    title_case(first)
}

/// Capitalizes the first letter of every alphabetic run and lowercases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn sugar_to_carb_ratio(sugars: Option<f64>, carbohydrates: Option<f64>) -> Option<f64> {
    match (sugars, carbohydrates) {
        (Some(s), Some(c)) if c > 0.0 => Some((s / c).clamp(0.0, 1.0)),
        _ => None,
    }
}

pub fn calorie_category(kcal: Option<f64>) -> Level {
    match kcal {
        None => Level::Unknown,
        Some(k) if k <= LOW_CALORIE_MAX_KCAL => Level::Low,
        Some(k) if k <= MODERATE_CALORIE_MAX_KCAL => Level::Moderate,
        Some(_) => Level::High,
    }
}

pub fn sugar_category(sugars: Option<f64>) -> Level {
    match sugars {
        None => Level::Unknown,
        Some(s) if s < LOW_SUGAR_BELOW_G => Level::Low,
        Some(s) if s <= MODERATE_SUGAR_MAX_G => Level::Moderate,
        Some(_) => Level::High,
    }
}

pub fn ultra_processed(nova_group: Option<u8>) -> UltraProcessed {
    match nova_group {
        Some(ULTRA_PROCESSED_NOVA_GROUP) => UltraProcessed::Yes,
        Some(_) => UltraProcessed::No,
        None => UltraProcessed::Unknown,
    }
}
