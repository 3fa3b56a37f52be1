use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::constants::{ENGINEERED_SNAPSHOT_FILE, MANIFEST_FILE};
use crate::error::{PipelineError, Result};
use crate::pipeline::queries::ops::project;
use crate::table::CleanedTable;
use crate::types::{Column, ColumnSpec, QueryResult};

/// Description of one written file, as listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub file: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: usize,
    pub bytes: usize,
    pub sha256: String,
}

/// Writes query results as CSV files named after the query
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    out_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{name}.csv"))
    }

    /// Writes `<name>.csv`, replacing any previous file of that name
    #[instrument(skip(self, result), fields(artifact = %result.name))]
    pub fn write(&self, result: &QueryResult) -> Result<Artifact> {
        let path = self.artifact_path(&result.name);
        let bytes = render_csv(result).map_err(|e| PipelineError::write(&path, e))?;
        write_atomic(&path, &bytes)?;
        debug!("Wrote {} rows to {}", result.len(), path.display());

        Ok(Artifact {
            name: result.name.clone(),
            file: file_name(&path),
            columns: result.columns.clone(),
            rows: result.len(),
            bytes: bytes.len(),
            sha256: sha256_hex(&bytes),
        })
    }

    /// Dumps the whole cleaned table for downstream readers
    pub fn write_snapshot(&self, table: &CleanedTable) -> Result<Artifact> {
        let name = ENGINEERED_SNAPSHOT_FILE.trim_end_matches(".csv");
        self.write(&project(name, table.rows(), &Column::ALL))
    }

    pub fn write_manifest<T: Serialize>(&self, manifest: &T) -> Result<PathBuf> {
        let path = self.out_dir.join(MANIFEST_FILE);
        let mut bytes = serde_json::to_vec_pretty(manifest)?;
        bytes.push(b'\n');
        write_atomic(&path, &bytes)?;
        Ok(path)
    }
}

/// Header row of column names followed by one record per row
pub fn render_csv(result: &QueryResult) -> std::io::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(result.columns.iter().map(|c| c.name.as_str()))
        .map_err(std::io::Error::other)?;
    for row in &result.rows {
        writer
            .write_record(row.iter().map(|cell| cell.render()))
            .map_err(std::io::Error::other)?;
    }
    writer.into_inner().map_err(|e| e.into_error())
}

/// Writes through a temporary sibling file and renames it over `path`,
/// so readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| PipelineError::write(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::write(path, e))?;
    tmp.write_all(bytes).map_err(|e| PipelineError::write(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::write(path, e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::write(path, e.error))?;
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, ValueKind};
    use tempfile::tempdir;

    fn sample() -> QueryResult {
        let mut result = QueryResult::new(
            "q_sample",
            vec![
                ColumnSpec::new("brand", ValueKind::Text),
                ColumnSpec::new("avg", ValueKind::Float),
            ],
        );
        result.push_row(vec![Cell::text("Lindt, Sprüngli"), Cell::Float(15.0)]);
        result.push_row(vec![Cell::text("Milka"), Cell::Null]);
        result
    }

    #[test]
    fn renders_header_quoting_and_nulls() {
        let csv = String::from_utf8(render_csv(&sample()).unwrap()).unwrap();
        assert_eq!(csv, "brand,avg\n\"Lindt, Sprüngli\",15\nMilka,\n");
    }

    #[test]
    fn write_overwrites_and_leaves_no_temp_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let writer = ArtifactWriter::new(dir.path());
        fs::write(writer.artifact_path("q_sample"), "stale")?;

        let artifact = writer.write(&sample())?;
        assert_eq!(artifact.file, "q_sample.csv");
        assert_eq!(artifact.rows, 2);

        let written = fs::read(writer.artifact_path("q_sample"))?;
        assert_eq!(artifact.sha256, sha256_hex(&written));
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn write_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let writer = ArtifactWriter::new(blocker.join("out"));
        assert!(matches!(writer.write(&sample()), Err(PipelineError::Write { .. })));
    }
}
