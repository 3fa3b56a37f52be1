use std::fs;
use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::tempdir;

use choco_crunch::apis::FileSource;
use choco_crunch::constants::MANIFEST_FILE;
use choco_crunch::error::PipelineError;
use choco_crunch::pipeline::queries::standard_queries;
use choco_crunch::pipeline::{FailureStage, Pipeline};

fn nutriments(kcal: f64, sugars: f64, carbs: f64, fat: f64, sodium: f64, nova: u8) -> Value {
    json!({
        "energy-kcal_100g": kcal,
        "energy-kj_100g": kcal * 4.184,
        "carbohydrates_100g": carbs,
        "sugars_100g": sugars,
        "fat_100g": fat,
        "saturated-fat_100g": fat / 2.0,
        "proteins_100g": 6.5,
        "fiber_100g": 3.0,
        "salt_100g": sodium * 2.5,
        "sodium_100g": sodium,
        "fruits-vegetables-nuts-estimate-from-ingredients_100g": if nova < 4 { 12.0 } else { 0.0 },
        "nutrition-score-fr_100g": 20,
        "nova-group_100g": nova
    })
}

fn fixture() -> Vec<Value> {
    vec![
        json!({"code": "3017620422003", "product_name": "Dark 70%", "brands": "lindt",
               "nutriments": nutriments(566.0, 28.0, 34.0, 41.0, 0.01, 4)}),
        json!({"code": "7622210449283", "product_name": "Milk Bar", "brands": "Milka, Mondelez",
               "nutriments": nutriments(530.0, 56.0, 59.0, 29.0, 0.12, 4)}),
        json!({"code": "3046920028004", "product_name": "Noir Intense", "brands": "LINDT",
               "nutriments": nutriments(598.0, 14.0, 19.0, 50.0, 0.02, 3)}),
        json!({"code": "4000417025005", "brands": "ritter sport",
               "nutriments": nutriments(240.0, 12.0, 30.0, 12.0, 1.4, 2)}),
        json!({"code": "5000159461122", "product_name": "Light Cocoa", "brands": "",
               "nutriments": {"energy-kcal_100g": "120 kcal", "sugars_100g": 3, "carbohydrates_100g": 8}}),
        json!({"code": 8000500310427u64, "product_name": "Nut Spread", "brands": "ferrero",
               "nova_group": 4,
               "nutriments": nutriments(539.0, 56.3, 57.5, 30.9, 0.04, 4)}),
        // identical duplicate, dropped
        json!({"code": "3017620422003", "product_name": "Dark 70%", "brands": "lindt",
               "nutriments": nutriments(566.0, 28.0, 34.0, 41.0, 0.01, 4)}),
        // no identifier, dropped
        json!({"product_name": "Mystery Bar", "brands": "unknown maker"}),
    ]
}

fn write_jsonl(path: &Path, products: &[Value]) -> Result<()> {
    let lines: Vec<String> = products.iter().map(|p| p.to_string()).collect();
    fs::write(path, lines.join("\n") + "\n")?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

#[tokio::test]
async fn run_writes_every_artifact_and_a_manifest() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("raw.jsonl");
    write_jsonl(&input, &fixture())?;
    let out = dir.path().join("out");

    let report = Pipeline::new(&out)
        .with_eda(dir.path().join("eda"))
        .run(&FileSource::new(&input))
        .await?;

    assert!(report.is_complete(), "failures: {:?}", report.failures);
    assert_eq!(report.raw_records, 8);
    assert_eq!(report.cleaning.kept, 6);
    assert_eq!(report.cleaning.duplicates, 1);
    assert_eq!(report.cleaning.missing_identifier, 1);

    assert_eq!(report.artifacts.len(), 27);
    for query in standard_queries() {
        assert!(out.join(format!("{}.csv", query.id)).is_file(), "{} missing", query.id);
    }
    assert!(out.join("full_engineered_snapshot.csv").is_file());
    assert_eq!(report.eda.len(), 4);
    assert!(dir.path().join("eda").join("heatmap_corr.csv").is_file());

    let manifest: Value = serde_json::from_str(&fs::read_to_string(out.join(MANIFEST_FILE))?)?;
    assert_eq!(manifest["artifacts"].as_array().map(Vec::len), Some(27));
    assert_eq!(manifest["cleaning"]["kept"], 6);
    Ok(())
}

#[tokio::test]
async fn rerun_produces_identical_bytes() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("raw.jsonl");
    write_jsonl(&input, &fixture())?;
    let source = FileSource::new(&input);

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    Pipeline::new(&first).run(&source).await?;
    Pipeline::new(&second).with_parallel(true).run(&source).await?;

    let mut compared = 0;
    for entry in fs::read_dir(&first)? {
        let name = entry?.file_name();
        assert_eq!(
            fs::read(first.join(&name))?,
            fs::read(second.join(&name))?,
            "{:?} differs between runs",
            name
        );
        compared += 1;
    }
    // 27 queries, the engineered snapshot and the manifest
    assert_eq!(compared, 29);
    Ok(())
}

#[tokio::test]
async fn input_order_does_not_change_artifacts() -> Result<()> {
    let dir = tempdir()?;
    let forward = dir.path().join("forward.jsonl");
    let backward = dir.path().join("backward.jsonl");
    let products = fixture();
    write_jsonl(&forward, &products)?;
    let reversed: Vec<Value> = products.into_iter().rev().collect();
    write_jsonl(&backward, &reversed)?;

    let a = Pipeline::new(dir.path().join("a"))
        .run(&FileSource::new(&forward))
        .await?;
    let b = Pipeline::new(dir.path().join("b"))
        .run(&FileSource::new(&backward))
        .await?;

    let digests = |r: &choco_crunch::pipeline::RunReport| -> Vec<(String, String)> {
        r.artifacts.iter().map(|x| (x.name.clone(), x.sha256.clone())).collect()
    };
    assert_eq!(digests(&a), digests(&b));
    assert_eq!(a.snapshot, b.snapshot);
    Ok(())
}

#[tokio::test]
async fn empty_input_aborts_without_artifacts() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("empty.jsonl");
    fs::write(&input, "\n\n")?;
    let out = dir.path().join("out");

    let err = Pipeline::new(&out)
        .run(&FileSource::new(&input))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInput(_)));
    assert!(err.is_fatal());
    assert!(!out.exists());
    Ok(())
}

#[tokio::test]
async fn missing_sodium_fails_only_the_sodium_query() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("no_sodium.jsonl");
    let products: Vec<Value> = fixture()
        .into_iter()
        .map(|mut p| {
            if let Some(n) = p.get_mut("nutriments").and_then(Value::as_object_mut) {
                n.remove("sodium_100g");
            }
            p
        })
        .collect();
    write_jsonl(&input, &products)?;
    let out = dir.path().join("out");

    let report = Pipeline::new(&out).run(&FileSource::new(&input)).await?;

    assert_eq!(report.artifacts.len(), 26);
    assert_eq!(report.failures.len(), 1);
    let failure = report.failed("q11_sodium_gt1g").expect("q11 should fail");
    assert_eq!(failure.stage, FailureStage::Query);
    assert!(failure.reason.contains("sodium_value"));
    assert!(!out.join("q11_sodium_gt1g.csv").exists());
    assert!(out.join("q12_fvn_nonzero.csv").exists());
    Ok(())
}

#[tokio::test]
async fn grouped_counts_cover_every_kept_row() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("raw.jsonl");
    write_jsonl(&input, &fixture())?;
    let out = dir.path().join("out");
    let report = Pipeline::new(&out).run(&FileSource::new(&input)).await?;

    let rows = read_csv(&out.join("q14_count_per_calorie_category.csv"))?;
    assert_eq!(rows[0], vec!["calorie_category", "count"]);
    let total: usize = rows[1..].iter().map(|r| r[1].parse::<usize>().unwrap()).sum();
    assert_eq!(total, report.cleaning.kept);

    let per_brand = read_csv(&out.join("q01_products_per_brand.csv"))?;
    let total: usize = per_brand[1..].iter().map(|r| r[1].parse::<usize>().unwrap()).sum();
    assert_eq!(total, report.cleaning.kept);
    assert!(per_brand.iter().any(|r| r[0] == "Lindt" && r[1] == "2"));

    let sodium = read_csv(&out.join("q11_sodium_gt1g.csv"))?;
    assert_eq!(sodium.len(), 2);
    assert_eq!(sodium[1][0], "4000417025005");
    Ok(())
}

#[tokio::test]
async fn absent_fiber_column_fails_one_query_of_twenty_seven() -> Result<()> {
    use choco_crunch::pipeline::queries::QueryDef;
    use choco_crunch::types::{Cell, Column, ColumnSpec, QueryResult, ValueKind};

    fn avg_fiber(name: &str, table: &choco_crunch::table::CleanedTable) -> QueryResult {
        let values: Vec<f64> = table.rows().iter().filter_map(|p| p.number(Column::Fiber)).collect();
        let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
        let mut result = QueryResult::new(name, vec![ColumnSpec::new("avg_fiber", ValueKind::Float)]);
        result.push_row(vec![Cell::float(mean)]);
        result
    }

    let dir = tempdir()?;
    let input = dir.path().join("no_fiber.jsonl");
    let products: Vec<Value> = fixture()
        .into_iter()
        .map(|mut p| {
            if let Some(n) = p.get_mut("nutriments").and_then(Value::as_object_mut) {
                n.remove("fiber_100g");
            }
            p
        })
        .collect();
    write_jsonl(&input, &products)?;

    let mut queries: Vec<QueryDef> = standard_queries()
        .iter()
        .filter(|q| q.id != "q11_sodium_gt1g")
        .copied()
        .collect();
    queries.push(QueryDef::new("avg_fiber", "Mean fiber", &[Column::Fiber], avg_fiber));
    assert_eq!(queries.len(), 27);

    let report = Pipeline::new(dir.path().join("out"))
        .with_queries(queries)
        .run(&FileSource::new(&input))
        .await?;

    assert_eq!(report.artifacts.len(), 26);
    let failure = report.failed("avg_fiber").expect("fiber query should fail");
    assert!(failure.reason.contains("fiber_value"));
    Ok(())
}

#[tokio::test]
async fn products_with_empty_nutriments_are_kept() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("raw.jsonl");
    let mut products = fixture();
    products.push(json!({"code": "9000000000001", "product_name": "Bare Bar", "nutriments": []}));
    write_jsonl(&input, &products)?;

    let report = Pipeline::new(dir.path().join("out"))
        .run(&FileSource::new(&input))
        .await?;
    assert_eq!(report.cleaning.input_records, 9);
    assert_eq!(report.cleaning.kept, 7);
    assert!(report.is_complete(), "failures: {:?}", report.failures);

    let only_empty = dir.path().join("only_empty.jsonl");
    write_jsonl(&only_empty, &[json!({"code": "1", "nutriments": []})])?;
    let report = Pipeline::new(dir.path().join("out_empty"))
        .run(&FileSource::new(&only_empty))
        .await?;
    assert_eq!(report.cleaning.kept, 1);
    assert!(report.failed("q07_top10_energy_kcal").is_some());
    assert!(report.failed("q01_products_per_brand").is_none());
    Ok(())
}

#[tokio::test]
async fn unwritable_artifact_does_not_stop_the_others() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("raw.jsonl");
    write_jsonl(&input, &fixture())?;
    let out = dir.path().join("out");
    // a directory where the CSV should go cannot be replaced by a file
    fs::create_dir_all(out.join("q05_unique_brands_count.csv"))?;

    let report = Pipeline::new(&out).run(&FileSource::new(&input)).await?;

    let failure = report
        .failed("q05_unique_brands_count")
        .expect("q05 write should fail");
    assert_eq!(failure.stage, FailureStage::Write);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.artifacts.len(), 26);
    for query in standard_queries().iter().filter(|q| q.id != "q05_unique_brands_count") {
        assert!(out.join(format!("{}.csv", query.id)).is_file(), "{} missing", query.id);
    }
    assert!(out.join(MANIFEST_FILE).is_file());
    Ok(())
}

#[tokio::test]
async fn failed_manifest_write_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("raw.jsonl");
    write_jsonl(&input, &fixture())?;
    let out = dir.path().join("out");
    fs::create_dir_all(out.join(MANIFEST_FILE))?;

    let report = Pipeline::new(&out).run(&FileSource::new(&input)).await?;

    assert_eq!(report.artifacts.len(), 27);
    assert!(!report.is_complete());
    assert!(report.manifest_path.is_none());
    let failure = report.failed("manifest").expect("manifest write should fail");
    assert_eq!(failure.stage, FailureStage::Write);
    Ok(())
}
