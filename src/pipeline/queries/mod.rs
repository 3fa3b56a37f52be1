//! The fixed analytical query set.
//!
//! Each query is a pure function of the cleaned table and declares the
//! columns it reads; a query whose columns are absent fails on its own
//! without affecting the others.

pub mod ops;

use crate::error::Result;
use crate::table::CleanedTable;
use crate::types::{Cell, Column, ColumnSpec, Level, QueryResult, UltraProcessed, ValueKind};

use ops::{
    count_by, count_table, filter_rows, largest, mean_by, mean_of, mean_table, project, ranked,
    scalar_table,
};

type Compute = fn(&str, &CleanedTable) -> QueryResult;

/// A named query together with the columns it depends on
#[derive(Clone, Copy)]
pub struct QueryDef {
    pub id: &'static str,
    pub description: &'static str,
    pub requires: &'static [Column],
    compute: Compute,
}

impl std::fmt::Debug for QueryDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDef")
            .field("id", &self.id)
            .field("requires", &self.requires)
            .finish()
    }
}

impl QueryDef {
    pub const fn new(
        id: &'static str,
        description: &'static str,
        requires: &'static [Column],
        compute: Compute,
    ) -> Self {
        Self {
            id,
            description,
            requires,
            compute,
        }
    }

    /// Checks required columns, then computes the result
    pub fn run(&self, table: &CleanedTable) -> Result<QueryResult> {
        table.require(self.id, self.requires)?;
        Ok((self.compute)(self.id, table))
    }
}

/// The 27 standard queries in artifact order
pub fn standard_queries() -> &'static [QueryDef] {
    &QUERIES
}

pub fn find_query(id: &str) -> Option<&'static QueryDef> {
    QUERIES.iter().find(|q| q.id == id)
}

static QUERIES: [QueryDef; 27] = [
    QueryDef::new(
        "q01_products_per_brand",
        "Number of products per brand",
        &[Column::Brand],
        products_per_brand,
    ),
    QueryDef::new(
        "q02_unique_products_per_brand",
        "Distinct product codes per brand",
        &[Column::Brand, Column::ProductCode],
        unique_products_per_brand,
    ),
    QueryDef::new(
        "q03_top5_brands_by_count",
        "Five brands with the most products",
        &[Column::Brand],
        top5_brands_by_count,
    ),
    QueryDef::new(
        "q04_missing_product_name",
        "Products without a name",
        &[Column::ProductName],
        missing_product_name,
    ),
    QueryDef::new(
        "q05_unique_brands_count",
        "Number of distinct brands",
        &[Column::Brand],
        unique_brands_count,
    ),
    QueryDef::new(
        "q06_codes_starting_3",
        "Products whose code starts with 3",
        &[Column::ProductCode],
        codes_starting_3,
    ),
    QueryDef::new(
        "q07_top10_energy_kcal",
        "Ten most energy-dense products",
        &[Column::EnergyKcal],
        top10_energy_kcal,
    ),
    QueryDef::new(
        "q08_avg_sugar_by_nova",
        "Mean sugar per NOVA processing group",
        &[Column::NovaGroup, Column::Sugars],
        avg_sugar_by_nova,
    ),
    QueryDef::new(
        "q09_fat_gt20",
        "Products with more than 20 g fat",
        &[Column::Fat],
        fat_gt20,
    ),
    QueryDef::new(
        "q10_avg_carbs_per_product",
        "Mean carbohydrates per product code",
        &[Column::Carbohydrates],
        avg_carbs_per_product,
    ),
    QueryDef::new(
        "q11_sodium_gt1g",
        "Products with more than 1 g sodium",
        &[Column::Sodium],
        sodium_gt1g,
    ),
    QueryDef::new(
        "q12_fvn_nonzero",
        "Products with a fruit/vegetable/nut share",
        &[Column::FruitsVegNuts],
        fvn_nonzero,
    ),
    QueryDef::new(
        "q13_energy_gt500",
        "Products above 500 kcal",
        &[Column::EnergyKcal],
        energy_gt500,
    ),
    QueryDef::new(
        "q14_count_per_calorie_category",
        "Products per calorie category",
        &[Column::CalorieCategory],
        count_per_calorie_category,
    ),
    QueryDef::new(
        "q15_high_sugar",
        "High-sugar products",
        &[Column::SugarCategory],
        high_sugar,
    ),
    QueryDef::new(
        "q16_avg_ratio_high_calorie",
        "Mean sugar-to-carb ratio of high-calorie products",
        &[Column::CalorieCategory, Column::SugarToCarbRatio],
        avg_ratio_high_calorie,
    ),
    QueryDef::new(
        "q17_high_cal_high_sugar",
        "Products both high-calorie and high-sugar",
        &[Column::CalorieCategory, Column::SugarCategory],
        high_cal_high_sugar,
    ),
    QueryDef::new(
        "q18_ultra_processed",
        "Ultra-processed products",
        &[Column::UltraProcessed],
        ultra_processed,
    ),
    QueryDef::new(
        "q19_ratio_gt0_7",
        "Products with sugar-to-carb ratio above 0.7",
        &[Column::SugarToCarbRatio],
        ratio_gt0_7,
    ),
    QueryDef::new(
        "q20_avg_ratio_by_calorie_category",
        "Mean sugar-to-carb ratio per calorie category",
        &[Column::CalorieCategory, Column::SugarToCarbRatio],
        avg_ratio_by_calorie_category,
    ),
    QueryDef::new(
        "q21_top5_brands_high_cal",
        "Five brands with the most high-calorie products",
        &[Column::CalorieCategory, Column::Brand],
        top5_brands_high_cal,
    ),
    QueryDef::new(
        "q22_avg_kcal_by_calorie_category",
        "Mean kcal per calorie category",
        &[Column::CalorieCategory, Column::EnergyKcal],
        avg_kcal_by_calorie_category,
    ),
    QueryDef::new(
        "q23_ultra_count_per_brand",
        "Ultra-processed products per brand",
        &[Column::UltraProcessed, Column::Brand],
        ultra_count_per_brand,
    ),
    QueryDef::new(
        "q24_high_sugar_high_cal_brand",
        "Brand, sugar and kcal of high-sugar high-calorie products",
        &[
            Column::SugarCategory,
            Column::CalorieCategory,
            Column::Sugars,
            Column::EnergyKcal,
        ],
        high_sugar_high_cal_brand,
    ),
    QueryDef::new(
        "q25_avg_sugar_ultra_by_brand",
        "Mean sugar of ultra-processed products per brand",
        &[Column::UltraProcessed, Column::Sugars],
        avg_sugar_ultra_by_brand,
    ),
    QueryDef::new(
        "q26_avg_fvn_by_calorie_category",
        "Mean fruit/vegetable/nut share per calorie category",
        &[Column::CalorieCategory, Column::FruitsVegNuts],
        avg_fvn_by_calorie_category,
    ),
    QueryDef::new(
        "q27_top5_by_ratio",
        "Five products with the highest sugar-to-carb ratio",
        &[
            Column::SugarToCarbRatio,
            Column::CalorieCategory,
            Column::SugarCategory,
        ],
        top5_by_ratio,
    ),
];

fn brand_key(p: &crate::types::Product) -> Option<String> {
    Some(p.brand.clone())
}

fn calorie_key(p: &crate::types::Product) -> Option<&'static str> {
    Some(p.calorie_category.as_str())
}

fn is_high_calorie(p: &crate::types::Product) -> bool {
    p.calorie_category == Level::High
}

fn is_ultra(p: &crate::types::Product) -> bool {
    p.ultra_processed == UltraProcessed::Yes
}

fn products_per_brand(name: &str, table: &CleanedTable) -> QueryResult {
    let counts = count_by(table.rows(), brand_key);
    count_table(name, Column::Brand.spec(), "total", counts)
}

fn unique_products_per_brand(name: &str, table: &CleanedTable) -> QueryResult {
    let mut codes: std::collections::BTreeMap<String, std::collections::BTreeSet<&str>> =
        std::collections::BTreeMap::new();
    for p in table.rows() {
        codes.entry(p.brand.clone()).or_default().insert(&p.product_code);
    }
    count_table(
        name,
        Column::Brand.spec(),
        "unique_products",
        codes.into_iter().map(|(brand, set)| (brand, set.len())),
    )
}

fn top5_brands_by_count(name: &str, table: &CleanedTable) -> QueryResult {
    let counts = count_by(table.rows(), brand_key);
    count_table(name, Column::Brand.spec(), "count", ranked(counts, Some(5)))
}

fn missing_product_name(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| p.product_name.is_none())
}

fn unique_brands_count(name: &str, table: &CleanedTable) -> QueryResult {
    let brands = count_by(table.rows(), brand_key);
    scalar_table(
        name,
        ColumnSpec::new("unique_brands", ValueKind::Integer),
        Cell::count(brands.len()),
    )
}

fn codes_starting_3(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| p.product_code.starts_with('3'))
}

fn top10_energy_kcal(name: &str, table: &CleanedTable) -> QueryResult {
    project(
        name,
        largest(table.rows(), Column::EnergyKcal, 10),
        &[Column::ProductCode, Column::Brand, Column::EnergyKcal],
    )
}

fn avg_sugar_by_nova(name: &str, table: &CleanedTable) -> QueryResult {
    let groups = mean_by(table.rows(), |p| p.nova_group, Column::Sugars);
    mean_table(name, Column::NovaGroup.spec(), "avg_sugar", groups)
}

fn fat_gt20(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| p.nutrients.fat.is_some_and(|v| v > 20.0))
}

fn avg_carbs_per_product(name: &str, table: &CleanedTable) -> QueryResult {
    let groups = mean_by(
        table.rows(),
        |p| Some(p.product_code.clone()),
        Column::Carbohydrates,
    );
    mean_table(
        name,
        Column::ProductCode.spec(),
        Column::Carbohydrates.name(),
        groups,
    )
}

fn sodium_gt1g(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| p.nutrients.sodium.is_some_and(|v| v > 1.0))
}

fn fvn_nonzero(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| {
        p.nutrients.fruits_veg_nuts.is_some_and(|v| v > 0.0)
    })
}

fn energy_gt500(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| {
        p.nutrients.energy_kcal.is_some_and(|v| v > 500.0)
    })
}

fn count_per_calorie_category(name: &str, table: &CleanedTable) -> QueryResult {
    let counts = count_by(table.rows(), calorie_key);
    count_table(name, Column::CalorieCategory.spec(), "count", ranked(counts, None))
}

fn high_sugar(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| p.sugar_category == Level::High)
}

fn avg_ratio_high_calorie(name: &str, table: &CleanedTable) -> QueryResult {
    let mean = mean_of(
        table.rows().iter().filter(|p| is_high_calorie(p)),
        Column::SugarToCarbRatio,
    );
    scalar_table(
        name,
        ColumnSpec::new("avg_ratio", ValueKind::Float),
        Cell::float(mean),
    )
}

fn high_cal_high_sugar(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| {
        is_high_calorie(p) && p.sugar_category == Level::High
    })
}

fn ultra_processed(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), is_ultra)
}

fn ratio_gt0_7(name: &str, table: &CleanedTable) -> QueryResult {
    filter_rows(name, table.rows(), |p| {
        p.sugar_to_carb_ratio.is_some_and(|r| r > 0.7)
    })
}

fn avg_ratio_by_calorie_category(name: &str, table: &CleanedTable) -> QueryResult {
    let groups = mean_by(table.rows(), calorie_key, Column::SugarToCarbRatio);
    mean_table(
        name,
        Column::CalorieCategory.spec(),
        Column::SugarToCarbRatio.name(),
        groups,
    )
}

fn top5_brands_high_cal(name: &str, table: &CleanedTable) -> QueryResult {
    let counts = count_by(table.rows().iter().filter(|p| is_high_calorie(p)), brand_key);
    count_table(name, Column::Brand.spec(), "count", ranked(counts, Some(5)))
}

fn avg_kcal_by_calorie_category(name: &str, table: &CleanedTable) -> QueryResult {
    let groups = mean_by(table.rows(), calorie_key, Column::EnergyKcal);
    mean_table(
        name,
        Column::CalorieCategory.spec(),
        Column::EnergyKcal.name(),
        groups,
    )
}

fn ultra_count_per_brand(name: &str, table: &CleanedTable) -> QueryResult {
    let counts = count_by(table.rows().iter().filter(|p| is_ultra(p)), brand_key);
    count_table(name, Column::Brand.spec(), "count", ranked(counts, None))
}

fn high_sugar_high_cal_brand(name: &str, table: &CleanedTable) -> QueryResult {
    project(
        name,
        table
            .rows()
            .iter()
            .filter(|p| p.sugar_category == Level::High && is_high_calorie(p)),
        &[Column::Brand, Column::Sugars, Column::EnergyKcal],
    )
}

fn avg_sugar_ultra_by_brand(name: &str, table: &CleanedTable) -> QueryResult {
    let groups = mean_by(
        table.rows().iter().filter(|p| is_ultra(p)),
        brand_key,
        Column::Sugars,
    );
    mean_table(name, Column::Brand.spec(), Column::Sugars.name(), groups)
}

fn avg_fvn_by_calorie_category(name: &str, table: &CleanedTable) -> QueryResult {
    let groups = mean_by(table.rows(), calorie_key, Column::FruitsVegNuts);
    mean_table(
        name,
        Column::CalorieCategory.spec(),
        Column::FruitsVegNuts.name(),
        groups,
    )
}

fn top5_by_ratio(name: &str, table: &CleanedTable) -> QueryResult {
    project(
        name,
        largest(table.rows(), Column::SugarToCarbRatio, 5),
        &[
            Column::ProductCode,
            Column::Brand,
            Column::ProductName,
            Column::SugarToCarbRatio,
            Column::CalorieCategory,
            Column::SugarCategory,
        ],
    )
}
