pub mod open_food_facts;
pub mod snapshot;

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::infra::http_client::ReqwestHttp;
use crate::types::{RawProductData, RawRecord};

pub use open_food_facts::OpenFoodFactsSource;
pub use snapshot::FileSource;

/// Where raw product data comes from
#[async_trait::async_trait]
pub trait ProductSource: Send + Sync {
    /// Human-readable reference, e.g. a path or URL
    fn describe(&self) -> String;

    /// Fetch every raw product object in one attempt
    async fn fetch(&self) -> Result<Vec<RawProductData>>;
}

/// A parsed `--source` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Remote(String),
    File(PathBuf),
}

impl SourceRef {
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SourceRef::Remote(trimmed.to_string())
        } else {
            SourceRef::File(PathBuf::from(trimmed))
        }
    }
}

/// Builds the adapter for the configured source reference
pub fn source_from_config(config: &Config) -> Result<Box<dyn ProductSource>> {
    match SourceRef::parse(&config.source.reference) {
        SourceRef::File(path) => Ok(Box::new(FileSource::new(path))),
        SourceRef::Remote(url) => {
            let http = ReqwestHttp::new(Duration::from_secs(config.source.timeout_seconds))
                .map_err(PipelineError::SourceUnavailable)?;
            Ok(Box::new(
                OpenFoodFactsSource::new(url, Box::new(http))
                    .with_limits(config.source.max_records, config.source.page_size)
                    .with_snapshot(config.raw_snapshot_path()),
            ))
        }
    }
}

/// Converts raw JSON products to records, skipping values that are not objects.
pub fn to_records(products: Vec<RawProductData>) -> Result<Vec<RawRecord>> {
    let total = products.len();
    let mut records = Vec::with_capacity(total);
    let mut rejected = 0usize;
    for (i, product) in products.into_iter().enumerate() {
        match RawRecord::from_json(product) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping product {}: {}", i, e);
                rejected += 1;
            }
        }
    }
    if total > 0 && records.is_empty() {
        return Err(PipelineError::MalformedSource(format!(
            "none of the {} products could be read",
            total
        )));
    }
    if rejected > 0 {
        warn!("{} of {} products were not JSON objects", rejected, total);
    }
    Ok(records)
}
