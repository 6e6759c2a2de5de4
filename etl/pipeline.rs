// ========================================================================================
//
//                               The preparation pipeline
//
// ========================================================================================
//
// Stages, in order:
//
//   read -> normalize (row map) -> [fit barrier] -> scale (row map)
//        -> [label barrier] -> draw (row map) -> exclusion -> write
//
// The row maps run on the rayon pool. The two barriers need the whole table. Every
// schema check happens before the first byte is written, so a failing run leaves
// the output directory exactly as it found it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::PrepError;
use crate::io::{ArtifactPaths, OutputDtype, OutputLayout, write_artifacts};
use crate::mappings::Mappings;
use crate::normalize::Normalizer;
use crate::scale::{DEFAULT_SCALED_COLUMNS, ScalingModel};
use crate::split::{Partition, StratifiedSplitter, StratumSummary, validate_test_fraction};
use crate::table::{Table, read_delimited};

pub const DEFAULT_TEST_FRACTION: f64 = 0.3;
pub const DEFAULT_SEED: u64 = 25;
pub const DEFAULT_TARGET: &str = "HadHeartAttack";

/// Everything one run needs. Built by the CLI; usable directly from code.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub test_fraction: f64,
    pub seed: u64,
    pub write_csv: bool,
    pub target: String,
    pub scaled_columns: Vec<String>,
    pub mappings: Mappings,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            out_dir: out_dir.into(),
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
            write_csv: false,
            target: DEFAULT_TARGET.to_string(),
            scaled_columns: DEFAULT_SCALED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            mappings: Mappings::default(),
        }
    }

    /// Fails fast on configuration errors, before the input is opened.
    pub fn validate(&self) -> Result<(), PrepError> {
        validate_test_fraction(self.test_fraction)?;
        self.mappings.validate()
    }
}

/// The in-memory result of the transform stages, before anything is written.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub clean: Table,
    pub train: Table,
    pub test: Table,
    pub scaler: ScalingModel,
    pub partition: Partition,
    /// Column types shared by every artifact of the run.
    pub layout: OutputLayout,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub paths: ArtifactPaths,
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub strata: Vec<StratumSummary>,
}

/// Normalize, scale and split an already loaded table. Pure with respect to the
/// filesystem.
pub fn prepare(table: &Table, config: &PipelineConfig) -> Result<PreparedData, PrepError> {
    config.validate()?;

    let started = Instant::now();
    let normalizer = Normalizer::new(&config.mappings, &table.schema);
    let normalized = normalizer.normalize_table(table);
    log::info!(
        "Normalized {} rows into {} columns in {:.2?}",
        normalized.height(),
        normalized.schema.len(),
        started.elapsed()
    );

    let scaler = ScalingModel::fit(&normalized, &config.scaled_columns)?;
    let clean = scaler.transform(&normalized);

    // Derived columns keep one type even when a run leaves them entirely null.
    let mut layout = OutputLayout::from_table(&clean);
    for column in normalizer.derived_code_columns() {
        layout.pin(column, OutputDtype::Int64);
    }
    for column in normalizer.derived_text_columns() {
        layout.pin(column, OutputDtype::Utf8);
    }
    for column in scaler.scaled_columns() {
        layout.pin(column, OutputDtype::Float64);
    }

    let splitter = StratifiedSplitter::new(&config.target, config.test_fraction, config.seed)?;
    let partition = splitter.split(&clean)?;
    let (train, test) = partition.materialize(&clean);

    Ok(PreparedData {
        clean,
        train,
        test,
        scaler,
        partition,
        layout,
    })
}

/// Runs the whole pipeline from the input file to the persisted artifacts.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PrepError> {
    config.validate()?;
    let table = read_delimited(&config.input)?;
    let prepared = prepare(&table, config)?;
    persist(&config.out_dir, &prepared, config.write_csv)
}

fn persist(
    out_dir: &Path,
    prepared: &PreparedData,
    write_csv: bool,
) -> Result<PipelineReport, PrepError> {
    let paths = write_artifacts(
        out_dir,
        &prepared.layout,
        &prepared.clean,
        &prepared.train,
        &prepared.test,
        write_csv,
    )?;
    Ok(PipelineReport {
        paths,
        rows: prepared.clean.height(),
        train_rows: prepared.train.height(),
        test_rows: prepared.test.height(),
        strata: prepared.partition.strata.clone(),
    })
}
