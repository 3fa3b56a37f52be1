use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_MAX_RECORDS, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECONDS,
    OPEN_FOOD_FACTS_SEARCH_URL, RAW_SNAPSHOT_FILE,
};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// File path or http(s) URL
    pub reference: String,
    pub max_records: usize,
    pub page_size: usize,
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            reference: OPEN_FOOD_FACTS_SEARCH_URL.to_string(),
            max_records: DEFAULT_MAX_RECORDS,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub eda_dir: PathBuf,
    pub write_eda: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            out_dir: PathBuf::from("out"),
            eda_dir: PathBuf::from("eda"),
            write_eda: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Run queries on scoped threads instead of one after another
    pub parallel_queries: bool,
}

impl Config {
    /// Loads `path`, or `choco.toml` when present, or the defaults; then
    /// applies `CHOCO_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_value("CHOCO_SOURCE") {
            self.source.reference = v;
        }
        if let Some(v) = env_value("CHOCO_OUT_DIR") {
            self.output.out_dir = PathBuf::from(v);
        }
        if let Some(v) = env_value("CHOCO_DATA_DIR") {
            self.output.data_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.reference.trim().is_empty() {
            return Err(PipelineError::Config("source reference is empty".into()));
        }
        if self.source.page_size == 0 {
            return Err(PipelineError::Config("page_size must be positive".into()));
        }
        if self.source.max_records == 0 {
            return Err(PipelineError::Config("max_records must be positive".into()));
        }
        Ok(())
    }

    pub fn raw_snapshot_path(&self) -> PathBuf {
        self.output.data_dir.join(RAW_SNAPSHOT_FILE)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [source]
            reference = "data/raw_chocolate.jsonl"

            [run]
            parallel_queries = true
            "#,
        )
        .unwrap();
        assert_eq!(config.source.reference, "data/raw_chocolate.jsonl");
        assert_eq!(config.source.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.output.out_dir, PathBuf::from("out"));
        assert!(config.output.write_eda);
        assert!(config.run.parallel_queries);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        config.source.page_size = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
        assert!(Config::from_toml("[source]\nmax_records = \"many\"").is_err());
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let err = Config::from_file(Path::new("/no/such/choco.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
