use std::path::PathBuf;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::apis::{to_records, ProductSource};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::metrics as run_metrics;
use crate::pipeline::clean::{clean, CleaningStats};
use crate::pipeline::eda::eda_tables;
use crate::pipeline::persist::{Artifact, ArtifactWriter};
use crate::pipeline::queries::{standard_queries, QueryDef};
use crate::table::CleanedTable;
use crate::types::QueryResult;

/// Which step an artifact failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Query,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactFailure {
    pub name: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of one full run. Serialized as the artifact manifest, so it
/// carries nothing that changes between identical runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub raw_records: usize,
    pub cleaning: CleaningStats,
    pub snapshot: Option<Artifact>,
    pub artifacts: Vec<Artifact>,
    pub eda: Vec<Artifact>,
    pub failures: Vec<ArtifactFailure>,
    #[serde(skip)]
    pub manifest_path: Option<PathBuf>,
}

impl RunReport {
    pub fn failed(&self, name: &str) -> Option<&ArtifactFailure> {
        self.failures.iter().find(|f| f.name == name)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetch → clean → query fan-out → persist
pub struct Pipeline {
    writer: ArtifactWriter,
    eda_writer: Option<ArtifactWriter>,
    queries: Vec<QueryDef>,
    parallel: bool,
}

impl Pipeline {
    /// Standard query set writing into `out_dir`, no EDA tables
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: ArtifactWriter::new(out_dir),
            eda_writer: None,
            queries: standard_queries().to_vec(),
            parallel: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let pipeline = Self::new(&config.output.out_dir).with_parallel(config.run.parallel_queries);
        if config.output.write_eda {
            pipeline.with_eda(&config.output.eda_dir)
        } else {
            pipeline
        }
    }

    pub fn with_eda(mut self, eda_dir: impl Into<PathBuf>) -> Self {
        self.eda_writer = Some(ArtifactWriter::new(eda_dir));
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_queries(mut self, queries: Vec<QueryDef>) -> Self {
        self.queries = queries;
        self
    }

    /// Runs everything. Fetch and clean failures abort before any artifact
    /// is written; query and write failures are collected in the report.
    #[instrument(skip(self, source), fields(source = %source.describe()))]
    pub async fn run(&self, source: &dyn ProductSource) -> Result<RunReport> {
        let started = Instant::now();
        counter!(run_metrics::RUNS_TOTAL).increment(1);
        info!("🚀 Starting pipeline for {}", source.describe());

        let t_fetch = Instant::now();
        let products = source.fetch().await?;
        histogram!(run_metrics::FETCH_DURATION_SECONDS).record(t_fetch.elapsed().as_secs_f64());
        histogram!(run_metrics::RAW_RECORDS_PER_RUN).record(products.len() as f64);
        let raw_records = products.len();

        let records = to_records(products)?;
        let (table, cleaning) = clean(&records)?;
        counter!(run_metrics::ROWS_DROPPED_TOTAL, "reason" => "missing_identifier")
            .increment(cleaning.missing_identifier as u64);
        counter!(run_metrics::ROWS_DROPPED_TOTAL, "reason" => "duplicate")
            .increment(cleaning.duplicates as u64);

        let report = self.run_table(&table, source.describe(), raw_records, cleaning);

        histogram!(run_metrics::RUN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(
            "✅ Pipeline finished in {:.2}s: {} artifacts, {} failures",
            started.elapsed().as_secs_f64(),
            report.artifacts.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Query, persist and describe an already cleaned table
    pub fn run_table(
        &self,
        table: &CleanedTable,
        source: String,
        raw_records: usize,
        cleaning: CleaningStats,
    ) -> RunReport {
        let mut report = RunReport {
            source,
            raw_records,
            cleaning,
            snapshot: None,
            artifacts: Vec::new(),
            eda: Vec::new(),
            failures: Vec::new(),
            manifest_path: None,
        };

        match self.writer.write_snapshot(table) {
            Ok(artifact) => report.snapshot = Some(artifact),
            Err(e) => record_failure(&mut report.failures, "full_engineered_snapshot", e),
        }

        let results = run_queries(&self.queries, table, self.parallel);
        report.artifacts = persist_all(&self.writer, results, &mut report.failures);

        if let Some(eda_writer) = &self.eda_writer {
            let results = run_queries(eda_tables(), table, self.parallel);
            report.eda = persist_all(eda_writer, results, &mut report.failures);
        }

        match self.writer.write_manifest(&report) {
            Ok(path) => report.manifest_path = Some(path),
            Err(e) => record_failure(&mut report.failures, "manifest", e),
        }
        report
    }
}

/// Evaluates every query against the table, in declaration order
pub fn run_queries(
    queries: &[QueryDef],
    table: &CleanedTable,
    parallel: bool,
) -> Vec<(&'static str, Result<QueryResult>)> {
    if !parallel {
        return queries.iter().map(|q| (q.id, q.run(table))).collect();
    }
    std::thread::scope(|scope| {
        let handles: Vec<_> = queries
            .iter()
            .map(|q| scope.spawn(move || q.run(table)))
            .collect();
        handles
            .into_iter()
            .zip(queries)
            .map(|(handle, q)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(PipelineError::QueryComputation {
                        query: q.id.to_string(),
                        reason: "query panicked".into(),
                    })
                });
                (q.id, result)
            })
            .collect()
    })
}

fn persist_all(
    writer: &ArtifactWriter,
    results: Vec<(&'static str, Result<QueryResult>)>,
    failures: &mut Vec<ArtifactFailure>,
) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for (name, result) in results {
        let written = result.and_then(|r| writer.write(&r));
        match written {
            Ok(artifact) => {
                counter!(run_metrics::QUERIES_SUCCEEDED_TOTAL).increment(1);
                histogram!(run_metrics::ARTIFACT_BYTES).record(artifact.bytes as f64);
                artifacts.push(artifact);
            }
            Err(e) => record_failure(failures, name, e),
        }
    }
    artifacts
}

fn record_failure(failures: &mut Vec<ArtifactFailure>, name: &str, err: PipelineError) {
    let stage = match err {
        PipelineError::Write { .. } => {
            counter!(run_metrics::WRITE_ERRORS_TOTAL).increment(1);
            FailureStage::Write
        }
        _ => {
            counter!(run_metrics::QUERIES_FAILED_TOTAL).increment(1);
            FailureStage::Query
        }
    };
    warn!("Artifact {} failed: {}", name, err);
    failures.push(ArtifactFailure {
        name: name.to_string(),
        stage,
        reason: err.to_string(),
    });
}
