/// Open Food Facts v2 product search endpoint
pub const OPEN_FOOD_FACTS_SEARCH_URL: &str = "https://world.openfoodfacts.org/api/v2/search";

/// Search parameter sets tried in order when fetching remotely
pub const SEARCH_QUERIES: &[(&str, &str)] = &[("categories", "chocolates"), ("search_terms", "chocolate")];

pub const DEFAULT_MAX_RECORDS: usize = 12_000;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 50;

// File layout
pub const RAW_SNAPSHOT_FILE: &str = "raw_chocolate.jsonl";
pub const ENGINEERED_SNAPSHOT_FILE: &str = "full_engineered_snapshot.csv";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DEFAULT_CONFIG_FILE: &str = "choco.toml";

pub const UNKNOWN_BRAND: &str = "Unknown";

// Feature thresholds (per 100g)
pub const LOW_CALORIE_MAX_KCAL: f64 = 150.0;
pub const MODERATE_CALORIE_MAX_KCAL: f64 = 300.0;
pub const LOW_SUGAR_BELOW_G: f64 = 5.0;
pub const MODERATE_SUGAR_MAX_G: f64 = 15.0;
pub const ULTRA_PROCESSED_NOVA_GROUP: u8 = 4;

pub const HISTOGRAM_BINS: usize = 30;
