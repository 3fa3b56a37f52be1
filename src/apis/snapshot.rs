use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use super::ProductSource;
use crate::error::{PipelineError, Result};
use crate::pipeline::persist::{sha256_hex, write_atomic};
use crate::types::RawProductData;

/// Reads products from a local file: JSON Lines, or a JSON document that is
/// either an array of products or an object with a `products` array.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ProductSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<Vec<RawProductData>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let is_document = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let products = if is_document {
            parse_document(&text)?
        } else {
            parse_jsonl(&text)?
        };
        info!("Loaded {} products from {}", products.len(), self.path.display());
        Ok(products)
    }
}

/// One JSON value per non-blank line; unparseable lines are skipped.
pub fn parse_jsonl(text: &str) -> Result<Vec<RawProductData>> {
    let mut products = Vec::new();
    let mut bad_lines = 0usize;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawProductData>(line) {
            Ok(value) => products.push(value),
            Err(e) => {
                warn!("Skipping unparseable line {}: {}", lineno + 1, e);
                bad_lines += 1;
            }
        }
    }
    if products.is_empty() && bad_lines > 0 {
        return Err(PipelineError::MalformedSource(format!(
            "no parseable JSON lines ({} rejected)",
            bad_lines
        )));
    }
    Ok(products)
}

pub fn parse_document(text: &str) -> Result<Vec<RawProductData>> {
    let doc: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::MalformedSource(format!("invalid JSON document: {}", e)))?;
    match doc {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut obj) => match obj.remove("products") {
            Some(serde_json::Value::Array(items)) => Ok(items),
            _ => Err(PipelineError::MalformedSource(
                "document has no 'products' array".into(),
            )),
        },
        _ => Err(PipelineError::MalformedSource(
            "expected an array or an object with 'products'".into(),
        )),
    }
}

/// Writes products as JSON Lines and returns the content digest
pub fn write_snapshot(path: &Path, products: &[RawProductData]) -> Result<String> {
    let mut bytes = Vec::new();
    for product in products {
        serde_json::to_writer(&mut bytes, product)?;
        bytes.push(b'\n');
    }
    write_atomic(path, &bytes)?;
    let digest = sha256_hex(&bytes);
    info!(
        "Wrote raw snapshot of {} products to {} (sha256:{})",
        products.len(),
        path.display(),
        digest
    );
    Ok(digest)
}
