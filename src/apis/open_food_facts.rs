use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use super::{snapshot, ProductSource};
use crate::app::ports::HttpClientPort;
use crate::constants::{DEFAULT_MAX_RECORDS, DEFAULT_PAGE_SIZE, SEARCH_QUERIES};
use crate::error::{PipelineError, Result};
use crate::types::RawProductData;

/// Paged fetch from the Open Food Facts v2 search endpoint.
///
/// Each search parameter set in [`SEARCH_QUERIES`] is paged until an empty
/// page or until `max_records` products have been collected. Every request
/// is attempted once.
pub struct OpenFoodFactsSource {
    base_url: String,
    max_records: usize,
    page_size: usize,
    http: Box<dyn HttpClientPort>,
    snapshot_path: Option<PathBuf>,
}

impl OpenFoodFactsSource {
    pub fn new(base_url: impl Into<String>, http: Box<dyn HttpClientPort>) -> Self {
        Self {
            base_url: base_url.into(),
            max_records: DEFAULT_MAX_RECORDS,
            page_size: DEFAULT_PAGE_SIZE,
            http,
            snapshot_path: None,
        }
    }

    pub fn with_limits(mut self, max_records: usize, page_size: usize) -> Self {
        self.max_records = max_records;
        self.page_size = page_size.max(1);
        self
    }

    /// Also write everything fetched to a JSON Lines snapshot
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    fn page_url(&self, key: &str, value: &str, page: usize) -> Result<String> {
        let params = [
            (key, value.to_string()),
            ("page", page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        reqwest::Url::parse_with_params(&self.base_url, &params)
            .map(|u| u.to_string())
            .map_err(|e| PipelineError::SourceUnavailable(format!("invalid source url {}: {}", self.base_url, e)))
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<RawProductData>> {
        let resp = self
            .http
            .get(url)
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("GET {} failed: {}", url, e)))?;
        if !resp.is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "GET {} returned status {}",
                url, resp.status
            )));
        }
        parse_page(&resp.bytes)
    }
}

/// Extracts the `products` array of a search response; a missing or null
/// array is an empty page.
pub fn parse_page(bytes: &[u8]) -> Result<Vec<RawProductData>> {
    let body: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::MalformedSource(format!("search response is not JSON: {}", e)))?;
    match body.get("products") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(PipelineError::MalformedSource(
            "'products' is not an array".into(),
        )),
    }
}

#[async_trait::async_trait]
impl ProductSource for OpenFoodFactsSource {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn fetch(&self) -> Result<Vec<RawProductData>> {
        let mut products: Vec<RawProductData> = Vec::new();

        for (key, value) in SEARCH_QUERIES {
            let mut page = 1;
            while products.len() < self.max_records {
                let url = self.page_url(key, value, page)?;
                debug!("Fetching {}", url);
                let batch = self.fetch_page(&url).await?;
                if batch.is_empty() {
                    break;
                }
                products.extend(batch);
                info!("{}={} page {}: total {}", key, value, page, products.len());
                page += 1;
            }
            if products.len() >= self.max_records {
                break;
            }
        }
        products.truncate(self.max_records);

        if let Some(path) = &self.snapshot_path {
            if products.is_empty() {
                warn!("Nothing fetched, skipping raw snapshot");
            } else {
                snapshot::write_snapshot(path, &products)?;
            }
        }
        info!("Fetched {} products from {}", products.len(), self.base_url);
        Ok(products)
    }
}
