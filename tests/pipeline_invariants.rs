mod common;

use ahash::AHashSet;
use heartprep::PrepError;
use heartprep::io::{CLEAN_FILE, ROW_ID_COLUMN, TEST_FILE, TRAIN_FILE};
use heartprep::pipeline::{PipelineConfig, prepare, run};
use heartprep::table::{Table, Value, read_delimited};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use tempfile::tempdir;

fn load(rows: usize, seed: u64) -> Table {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("survey.csv");
    common::write_survey(&path, rows, seed);
    read_delimited(&path).expect("read synthetic survey")
}

fn config() -> PipelineConfig {
    PipelineConfig::new("unused.csv", "unused")
}

fn column<'a>(table: &'a Table, name: &str) -> impl Iterator<Item = &'a Value> {
    let idx = table.schema.index_of(name).expect("column present");
    table.rows.iter().map(move |r| r.get(idx))
}

fn ids(table: &Table) -> AHashSet<u64> {
    table.rows.iter().map(|r| r.id).collect()
}

fn parquet_ids(path: &Path) -> Vec<i64> {
    let df = ParquetReader::new(File::open(path).expect("open parquet"))
        .finish()
        .expect("read parquet");
    df.column(ROW_ID_COLUMN)
        .expect("row_id column")
        .i64()
        .expect("row_id is i64")
        .into_no_null_iter()
        .collect()
}

#[test]
fn binary_and_ordinal_codes_stay_in_range() {
    let table = load(2_000, 7);
    let prepared = prepare(&table, &config()).expect("prepare");
    let clean = &prepared.clean;

    for name in ["HadHeartAttack", "HadAngina", "HadStroke", "HadCOPD", "ChestScan", "Sex"] {
        assert!(
            column(clean, name).all(|v| matches!(v, Value::Int(0) | Value::Int(1))),
            "{name} is not coded 0/1"
        );
    }
    let in_range = |name: &str, hi: i64| {
        column(clean, name).all(|v| matches!(v.as_i64(), Some(x) if (1..=hi).contains(&x)))
    };
    assert!(in_range("GeneralHealth", 5));
    assert!(in_range("RemovedTeeth", 4));
    assert!(in_range("AgeCategory", 13));
    assert!(in_range("SmokerOrECig_ord", 4));

    let smoker: Vec<_> = column(clean, "SmokerStatus_ord").map(Value::as_i64).collect();
    let ecig: Vec<_> = column(clean, "ECigaretteUsage_ord").map(Value::as_i64).collect();
    let combined: Vec<_> = column(clean, "SmokerOrECig_ord").map(Value::as_i64).collect();
    for ((s, e), c) in smoker.iter().zip(&ecig).zip(&combined) {
        assert_eq!(*c, Some(s.unwrap().max(e.unwrap())));
    }

    let regions: AHashSet<Option<&str>> =
        column(clean, "Region").map(Value::as_text).collect();
    assert!(regions.contains(&Some("South_Atlantic")));
    assert!(regions.contains(&None), "unknown states yield no region");
}

#[test]
fn scaled_columns_span_the_unit_interval() {
    let table = load(1_500, 3);
    let prepared = prepare(&table, &config()).expect("prepare");
    for name in [
        "BMI",
        "SleepHours",
        "HeightInMeters",
        "GeneralHealth",
        "AgeCategory",
        "SmokerOrECig_ord",
    ] {
        let range = prepared.scaler.range(name).expect("fitted range");
        let raw: Vec<f64> = column(&prepared.clean, name)
            .map(|v| v.as_f64().expect("numeric"))
            .collect();
        let scaled: Vec<f64> = column(&prepared.clean, &format!("{name}_scaled"))
            .map(|v| v.as_f64().expect("scaled"))
            .collect();
        for (x, s) in raw.iter().zip(&scaled) {
            assert!((0.0..=1.0).contains(s), "{name}: {s} out of range");
            if *x == range.min {
                assert_eq!(*s, 0.0);
            }
            if *x == range.max {
                assert_eq!(*s, 1.0);
            }
        }
    }
}

#[test]
fn partitions_cover_the_clean_dataset_exactly() {
    let table = load(3_000, 11);
    let prepared = prepare(&table, &config()).expect("prepare");
    let clean = ids(&prepared.clean);
    let train = ids(&prepared.train);
    let test = ids(&prepared.test);

    assert!(train.is_disjoint(&test));
    let union: AHashSet<u64> = train.union(&test).copied().collect();
    assert_eq!(union, clean);
    assert_eq!(prepared.train.height() + prepared.test.height(), table.height());
}

#[test]
fn membership_is_independent_of_worker_count() {
    let table = load(2_500, 5);
    let with_threads = |n: usize| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .expect("thread pool")
            .install(|| prepare(&table, &config()).expect("prepare"))
    };
    let single = with_threads(1);
    let many = with_threads(4);
    assert_eq!(single.partition.test_ids, many.partition.test_ids);
    assert_eq!(single.clean.rows, many.clean.rows);
}

#[test]
fn seed_changes_membership_but_not_the_rate() {
    let table = load(20_000, 21);
    let mut a_config = config();
    a_config.seed = 25;
    let mut b_config = config();
    b_config.seed = 2024;

    let a = prepare(&table, &a_config).expect("prepare");
    let b = prepare(&table, &b_config).expect("prepare");
    assert_ne!(a.partition.test_ids, b.partition.test_ids);

    for stratum in a.partition.strata.iter().chain(&b.partition.strata) {
        if stratum.rows > 1000 {
            assert!(
                (stratum.realized_fraction() - 0.3).abs() < 0.05,
                "label {} realized {}",
                stratum.label,
                stratum.realized_fraction()
            );
        }
    }
}

#[test]
fn reruns_write_identical_partitions() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("heart_2022_no_nans.csv");
    common::write_survey(&input, 800, 42);

    let first_out = dir.path().join("first");
    let second_out = dir.path().join("second");
    let report = run(&PipelineConfig::new(&input, &first_out)).expect("first run");
    run(&PipelineConfig::new(&input, &second_out)).expect("second run");

    assert_eq!(report.rows, 800);
    assert_eq!(report.train_rows + report.test_rows, report.rows);
    assert_eq!(report.strata.iter().map(|s| s.rows).sum::<usize>(), report.rows);
    assert_eq!(
        report.strata.iter().map(|s| s.test_rows).sum::<usize>(),
        report.test_rows
    );

    for file in [CLEAN_FILE, TRAIN_FILE, TEST_FILE] {
        assert_eq!(
            parquet_ids(&first_out.join(file)),
            parquet_ids(&second_out.join(file)),
            "{file} differs between runs"
        );
    }

    let mut clean_ids = parquet_ids(&first_out.join(CLEAN_FILE));
    let mut split_ids = parquet_ids(&first_out.join(TRAIN_FILE));
    split_ids.extend(parquet_ids(&first_out.join(TEST_FILE)));
    clean_ids.sort_unstable();
    split_ids.sort_unstable();
    assert_eq!(clean_ids, split_ids);
}

#[test]
fn missing_target_aborts_without_artifacts() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("survey.csv");
    common::write_survey(&input, 50, 1);
    let out = dir.path().join("out");

    let mut config = PipelineConfig::new(&input, &out);
    config.target = "HadHeartFailure".to_string();
    let err = run(&config).expect_err("target column is absent");
    assert!(err.is_schema_error());
    assert!(err.to_string().contains("HadHeartFailure"));
    assert!(!out.exists(), "no output directory may be created");
}

#[test]
fn unwritable_output_directory_is_fatal() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("survey.csv");
    common::write_survey(&input, 40, 4);
    let blocker = dir.path().join("processed");
    fs::write(&blocker, "occupied").expect("write blocker");

    let err = run(&PipelineConfig::new(&input, &blocker)).expect_err("outdir is a file");
    assert!(matches!(err, PrepError::Io(_)));
    assert!(!err.is_schema_error() && !err.is_configuration_error());
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .expect("list temporary directory")
        .map(|e| e.expect("entry").file_name())
        .collect();
    assert_eq!(leftovers.len(), 2, "unexpected files: {leftovers:?}");
}

#[test]
fn missing_feature_column_is_named() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("survey.csv");
    let text = common::survey_csv(30, 9).replace("SleepHours", "Sleep");
    fs::write(&input, text).expect("write survey");

    let err = run(&PipelineConfig::new(&input, dir.path().join("out"))).expect_err("schema");
    assert!(matches!(err, PrepError::ColumnNotFound(ref c) if c == "SleepHours"));
}
