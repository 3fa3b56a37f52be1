use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use choco_crunch::apis::{snapshot, source_from_config, SourceRef};
use choco_crunch::config::Config;
use choco_crunch::pipeline::queries::standard_queries;
use choco_crunch::pipeline::{Pipeline, RunReport};
use choco_crunch::{logging, metrics};

#[derive(Parser)]
#[command(name = "choco_crunch")]
#[command(about = "Chocolate product analytics over Open Food Facts data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, clean, run every query and write the CSV artifacts
    Run {
        /// Local JSON/JSONL file or Open Food Facts search URL
        #[arg(long)]
        source: Option<String>,
        /// TOML config file (defaults to ./choco.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for query artifacts
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Fetch products and write the raw JSONL snapshot only
    Fetch {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the standard queries and the columns they need
    Queries,
}

fn load_config(config: Option<PathBuf>, source: Option<String>) -> anyhow::Result<Config> {
    let mut config = Config::load(config.as_deref()).context("loading configuration")?;
    if let Some(source) = source {
        config.source.reference = source;
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(report: &RunReport) {
    println!("\n📊 Run summary for {}", report.source);
    println!(
        "   Records: {} raw, {} kept ({} without code, {} duplicates)",
        report.raw_records,
        report.cleaning.kept,
        report.cleaning.missing_identifier,
        report.cleaning.duplicates
    );
    println!("   ✅ Artifacts written: {}", report.artifacts.len());
    if !report.eda.is_empty() {
        println!("   📈 EDA tables written: {}", report.eda.len());
    }
    if let Some(path) = &report.manifest_path {
        println!("   🧾 Manifest: {}", path.display());
    }
    if !report.failures.is_empty() {
        println!("\n⚠️  Failed artifacts:");
        for failure in &report.failures {
            println!("   - {}: {}", failure.name, failure.reason);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            config,
            out_dir,
        } => {
            let mut config = load_config(config, source)?;
            if let Some(out_dir) = out_dir {
                config.output.out_dir = out_dir;
            }
            println!("🚀 Running pipeline from {}...", config.source.reference);

            let source = source_from_config(&config)?;
            let pipeline = Pipeline::from_config(&config);
            let outcome = pipeline.run(source.as_ref()).await;
            metrics::push_to_gateway("choco_crunch").await;

            match outcome {
                Ok(report) => print_summary(&report),
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Fetch { source, config } => {
            let config = load_config(config, source)?;
            println!("📥 Fetching from {}...", config.source.reference);

            let adapter = source_from_config(&config)?;
            let products = adapter.fetch().await?;
            let snapshot_path = config.raw_snapshot_path();
            if let SourceRef::File(path) = SourceRef::parse(&config.source.reference) {
                // remote sources write their own snapshot while fetching
                if path != snapshot_path && !products.is_empty() {
                    snapshot::write_snapshot(&snapshot_path, &products)?;
                }
            }
            info!("Fetched {} products", products.len());
            println!(
                "✅ Fetched {} products into {}",
                products.len(),
                snapshot_path.display()
            );
        }
        Commands::Queries => {
            for query in standard_queries() {
                let columns: Vec<&str> = query.requires.iter().map(|c| c.name()).collect();
                println!("{:<40} {}", query.id, query.description);
                println!("{:<40} requires: {}", "", columns.join(", "));
            }
        }
    }
    Ok(())
}
