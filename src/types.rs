use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw product data as returned by the source, one JSON object per product
pub type RawProductData = serde_json::Value;

/// One fetched product before cleaning.
///
/// Every field is kept as loose JSON because the upstream data mixes
/// strings, numbers and nulls for the same keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub product_name: Option<serde_json::Value>,
    #[serde(default)]
    pub brands: Option<serde_json::Value>,
    #[serde(default)]
    pub nova_group: Option<serde_json::Value>,
    /// Usually an object; upstream sends `[]` when a product has no nutrition facts
    #[serde(default)]
    pub nutriments: Option<serde_json::Value>,
}

impl RawRecord {
    pub fn from_json(data: RawProductData) -> serde_json::Result<Self> {
        serde_json::from_value(data)
    }

    /// Product identifier as text, `None` when missing or blank
    pub fn identifier(&self) -> Option<String> {
        let id = match self.code.as_ref()? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// Non-null nutriment value; a `nutriments` field that is not an object counts as empty
    pub fn nutriment(&self, key: &str) -> Option<&serde_json::Value> {
        self.nutriments
            .as_ref()
            .and_then(serde_json::Value::as_object)
            .and_then(|n| n.get(key))
            .filter(|v| !v.is_null())
    }
}

/// Value type of a column, recorded in the artifact manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Float,
    Integer,
}

/// Every column of the cleaned schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    ProductCode,
    ProductName,
    Brand,
    EnergyKcal,
    EnergyKj,
    Carbohydrates,
    Sugars,
    Fat,
    SaturatedFat,
    Proteins,
    Fiber,
    Salt,
    Sodium,
    FruitsVegNuts,
    NutritionScoreFr,
    NovaGroup,
    SugarToCarbRatio,
    CalorieCategory,
    SugarCategory,
    UltraProcessed,
}

impl Column {
    /// Snapshot column order
    pub const ALL: [Column; 20] = [
        Column::ProductCode,
        Column::ProductName,
        Column::Brand,
        Column::EnergyKcal,
        Column::EnergyKj,
        Column::Carbohydrates,
        Column::Sugars,
        Column::Fat,
        Column::SaturatedFat,
        Column::Proteins,
        Column::Fiber,
        Column::Salt,
        Column::Sodium,
        Column::FruitsVegNuts,
        Column::NutritionScoreFr,
        Column::NovaGroup,
        Column::SugarToCarbRatio,
        Column::CalorieCategory,
        Column::SugarCategory,
        Column::UltraProcessed,
    ];

    /// Numeric nutrient columns coerced from the `nutriments` map
    pub const NUTRIENTS: [Column; 12] = [
        Column::EnergyKcal,
        Column::EnergyKj,
        Column::Carbohydrates,
        Column::Sugars,
        Column::Fat,
        Column::SaturatedFat,
        Column::Proteins,
        Column::Fiber,
        Column::Salt,
        Column::Sodium,
        Column::FruitsVegNuts,
        Column::NutritionScoreFr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::ProductCode => "product_code",
            Column::ProductName => "product_name",
            Column::Brand => "brand",
            Column::EnergyKcal => "energy-kcal_value",
            Column::EnergyKj => "energy-kj_value",
            Column::Carbohydrates => "carbohydrates_value",
            Column::Sugars => "sugars_value",
            Column::Fat => "fat_value",
            Column::SaturatedFat => "saturated-fat_value",
            Column::Proteins => "proteins_value",
            Column::Fiber => "fiber_value",
            Column::Salt => "salt_value",
            Column::Sodium => "sodium_value",
            Column::FruitsVegNuts => "fruits-vegetables-nuts-estimate-from-ingredients_100g",
            Column::NutritionScoreFr => "nutrition-score-fr",
            Column::NovaGroup => "nova-group",
            Column::SugarToCarbRatio => "sugar_to_carb_ratio",
            Column::CalorieCategory => "calorie_category",
            Column::SugarCategory => "sugar_category",
            Column::UltraProcessed => "is_ultra_processed",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Column::ProductCode
            | Column::ProductName
            | Column::Brand
            | Column::CalorieCategory
            | Column::SugarCategory
            | Column::UltraProcessed => ValueKind::Text,
            Column::NovaGroup => ValueKind::Integer,
            _ => ValueKind::Float,
        }
    }

    /// Keys looked up in `nutriments`, first non-null wins
    pub fn source_keys(self) -> &'static [&'static str] {
        match self {
            Column::EnergyKcal => &["energy-kcal_100g"],
            Column::EnergyKj => &["energy-kj_100g"],
            Column::Carbohydrates => &["carbohydrates_100g"],
            Column::Sugars => &["sugars_100g"],
            Column::Fat => &["fat_100g"],
            Column::SaturatedFat => &["saturated-fat_100g"],
            Column::Proteins => &["proteins_100g"],
            Column::Fiber => &["fiber_100g"],
            Column::Salt => &["salt_100g"],
            Column::Sodium => &["sodium_100g"],
            Column::FruitsVegNuts => &["fruits-vegetables-nuts-estimate-from-ingredients_100g"],
            Column::NutritionScoreFr => &["nutrition-score-fr_100g", "nutrition-score-fr"],
            Column::NovaGroup => &["nova-group_100g", "nova-group"],
            _ => &[],
        }
    }

    /// Columns whose presence a derived column depends on
    pub fn derived_from(self) -> &'static [Column] {
        match self {
            Column::SugarToCarbRatio => &[Column::Sugars, Column::Carbohydrates],
            Column::CalorieCategory => &[Column::EnergyKcal],
            Column::SugarCategory => &[Column::Sugars],
            Column::UltraProcessed => &[Column::NovaGroup],
            _ => &[],
        }
    }

    pub fn spec(self) -> ColumnSpec {
        ColumnSpec::new(self.name(), self.kind())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three-way banding used for calorie and sugar content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    Moderate,
    High,
    Unknown,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "Low",
            Level::Moderate => "Moderate",
            Level::High => "High",
            Level::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UltraProcessed {
    Yes,
    No,
    Unknown,
}

impl UltraProcessed {
    pub fn as_str(self) -> &'static str {
        match self {
            UltraProcessed::Yes => "Yes",
            UltraProcessed::No => "No",
            UltraProcessed::Unknown => "Unknown",
        }
    }
}

/// Per-100g nutrient values; `None` marks a missing or unparseable value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nutrients {
    pub energy_kcal: Option<f64>,
    pub energy_kj: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub sugars: Option<f64>,
    pub fat: Option<f64>,
    pub saturated_fat: Option<f64>,
    pub proteins: Option<f64>,
    pub fiber: Option<f64>,
    pub salt: Option<f64>,
    pub sodium: Option<f64>,
    pub fruits_veg_nuts: Option<f64>,
    pub nutrition_score_fr: Option<f64>,
}

impl Nutrients {
    pub fn get(&self, column: Column) -> Option<f64> {
        match column {
            Column::EnergyKcal => self.energy_kcal,
            Column::EnergyKj => self.energy_kj,
            Column::Carbohydrates => self.carbohydrates,
            Column::Sugars => self.sugars,
            Column::Fat => self.fat,
            Column::SaturatedFat => self.saturated_fat,
            Column::Proteins => self.proteins,
            Column::Fiber => self.fiber,
            Column::Salt => self.salt,
            Column::Sodium => self.sodium,
            Column::FruitsVegNuts => self.fruits_veg_nuts,
            Column::NutritionScoreFr => self.nutrition_score_fr,
            _ => None,
        }
    }

    pub fn set(&mut self, column: Column, value: Option<f64>) {
        let slot = match column {
            Column::EnergyKcal => &mut self.energy_kcal,
            Column::EnergyKj => &mut self.energy_kj,
            Column::Carbohydrates => &mut self.carbohydrates,
            Column::Sugars => &mut self.sugars,
            Column::Fat => &mut self.fat,
            Column::SaturatedFat => &mut self.saturated_fat,
            Column::Proteins => &mut self.proteins,
            Column::Fiber => &mut self.fiber,
            Column::Salt => &mut self.salt,
            Column::Sodium => &mut self.sodium,
            Column::FruitsVegNuts => &mut self.fruits_veg_nuts,
            Column::NutritionScoreFr => &mut self.nutrition_score_fr,
            _ => return,
        };
        *slot = value;
    }
}

/// One row of the cleaned table
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub product_code: String,
    pub product_name: Option<String>,
    pub brand: String,
    pub nutrients: Nutrients,
    pub nova_group: Option<u8>,
    pub sugar_to_carb_ratio: Option<f64>,
    pub calorie_category: Level,
    pub sugar_category: Level,
    pub ultra_processed: UltraProcessed,
}

impl Product {
    /// Numeric value of a column, `None` for missing or non-numeric columns
    pub fn number(&self, column: Column) -> Option<f64> {
        match column {
            Column::NovaGroup => self.nova_group.map(f64::from),
            Column::SugarToCarbRatio => self.sugar_to_carb_ratio,
            other => self.nutrients.get(other),
        }
    }

    pub fn cell(&self, column: Column) -> Cell {
        match column {
            Column::ProductCode => Cell::text(&self.product_code),
            Column::ProductName => self.product_name.as_deref().map(Cell::text).unwrap_or(Cell::Null),
            Column::Brand => Cell::text(&self.brand),
            Column::NovaGroup => self.nova_group.map(|n| Cell::Int(i64::from(n))).unwrap_or(Cell::Null),
            Column::CalorieCategory => Cell::text(self.calorie_category.as_str()),
            Column::SugarCategory => Cell::text(self.sugar_category.as_str()),
            Column::UltraProcessed => Cell::text(self.ultra_processed.as_str()),
            other => Cell::float(self.number(other)),
        }
    }
}

/// A single value in a query result
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Float(f64),
    Int(i64),
    Null,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Non-finite values render as an empty cell
    pub fn float(value: Option<f64>) -> Self {
        value.filter(|v| v.is_finite()).map(Cell::Float).unwrap_or(Cell::Null)
    }

    pub fn count(n: usize) -> Self {
        Cell::Int(n as i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// CSV rendering: shortest round-trip floats, empty for null
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Float(v) => v.to_string(),
            Cell::Int(v) => v.to_string(),
            Cell::Null => String::new(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Derived table produced by one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Cell>>,
}

impl QueryResult {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<u8> for Cell {
    fn from(n: u8) -> Self {
        Cell::Int(i64::from(n))
    }
}
