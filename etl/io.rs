// ========================================================================================
//
//                               Artifact persistence
//
// ========================================================================================
//
// Converts the in-memory tables into Polars frames and writes them to the output
// directory. Every artifact is first written in full to a temporary file beside its
// destination. Only when all of them have been written are they renamed into place,
// so a failure while writing leaves the previous run's artifacts untouched. Each
// rename is atomic on its own; the set of renames is not.

use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::PrepError;
use crate::table::{Table, Value};

pub const CLEAN_FILE: &str = "heart_2022_clean.parquet";
pub const TRAIN_FILE: &str = "train_df0.1.parquet";
pub const TEST_FILE: &str = "test_df0.1.parquet";
pub const ROW_ID_COLUMN: &str = "row_id";

/// Storage type of one output column, fixed once for all artifacts of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDtype {
    Int64,
    Float64,
    Utf8,
}

impl OutputDtype {
    fn infer<'a>(values: impl Iterator<Item = &'a Value>) -> Self {
        let mut dtype = OutputDtype::Int64;
        for value in values {
            match value {
                Value::Null | Value::Int(_) => {}
                Value::Float(_) => dtype = OutputDtype::Float64,
                Value::Text(_) => return OutputDtype::Utf8,
            }
        }
        dtype
    }
}

/// Column order and types shared by the cleaned dataset and both partitions.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    names: Vec<String>,
    dtypes: Vec<OutputDtype>,
}

impl OutputLayout {
    /// Derives the layout from the complete table so partitions cannot drift.
    pub fn from_table(table: &Table) -> Self {
        let names = table.schema.names().to_vec();
        let dtypes = (0..names.len())
            .map(|c| OutputDtype::infer(table.rows.iter().map(|r| r.get(c))))
            .collect();
        Self { names, dtypes }
    }

    /// Fixes the storage type of `column` regardless of the values seen, for
    /// derived columns that may be entirely null in some runs.
    pub fn pin(&mut self, column: &str, dtype: OutputDtype) {
        if let Some(i) = self.names.iter().position(|n| n == column) {
            self.dtypes[i] = dtype;
        }
    }

    pub fn dtype(&self, column: &str) -> Option<OutputDtype> {
        self.names
            .iter()
            .position(|n| n == column)
            .map(|i| self.dtypes[i])
    }

    pub fn to_dataframe(&self, table: &Table) -> Result<DataFrame, PrepError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.names.len() + 1);
        let ids: Vec<i64> = table.rows.iter().map(|r| r.id as i64).collect();
        columns.push(Series::new(ROW_ID_COLUMN.into(), ids).into());

        for (c, (name, dtype)) in self.names.iter().zip(&self.dtypes).enumerate() {
            let cells = table.rows.iter().map(|r| r.get(c));
            let series = match dtype {
                OutputDtype::Int64 => {
                    let values: Vec<Option<i64>> = cells.map(Value::as_i64).collect();
                    Series::new(name.as_str().into(), values)
                }
                OutputDtype::Float64 => {
                    let values: Vec<Option<f64>> = cells.map(Value::as_f64).collect();
                    Series::new(name.as_str().into(), values)
                }
                OutputDtype::Utf8 => {
                    let values: Vec<Option<String>> = cells
                        .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
                        .collect();
                    Series::new(name.as_str().into(), values)
                }
            };
            columns.push(series.into());
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Destinations written by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub clean: PathBuf,
    pub train: PathBuf,
    pub test: PathBuf,
    /// Delimited mirrors, present when requested.
    pub csv: Option<[PathBuf; 3]>,
}

impl ArtifactPaths {
    pub fn in_dir(out_dir: &Path, write_csv: bool) -> Self {
        let clean = out_dir.join(CLEAN_FILE);
        let train = out_dir.join(TRAIN_FILE);
        let test = out_dir.join(TEST_FILE);
        let csv = write_csv.then(|| {
            [
                clean.with_extension("csv"),
                train.with_extension("csv"),
                test.with_extension("csv"),
            ]
        });
        Self {
            clean,
            train,
            test,
            csv,
        }
    }
}

/// A fully written temporary file waiting to replace its destination.
struct StagedArtifact {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedArtifact {
    fn write<F>(destination: &Path, write: F) -> Result<Self, PrepError>
    where
        F: FnOnce(&mut File) -> Result<(), PrepError>,
    {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)?;
        write(file.as_file_mut())?;
        file.as_file().sync_all()?;
        Ok(Self {
            file,
            destination: destination.to_path_buf(),
        })
    }

    fn commit(self) -> Result<(), PrepError> {
        // Earlier distributed runs left directories at these paths.
        if self.destination.is_dir() {
            fs::remove_dir_all(&self.destination)?;
        }
        self.file
            .persist(&self.destination)
            .map_err(|e| PrepError::Persist {
                path: self.destination.display().to_string(),
                source: e.error,
            })?;
        log::debug!("Wrote '{}'", self.destination.display());
        Ok(())
    }
}

/// One artifact: where it goes and how its bytes are produced.
type WriteJob<'a> = (&'a Path, Box<dyn FnOnce(&mut File) -> Result<(), PrepError> + 'a>);

/// Stages every job, then commits them in order. A job that fails to stage
/// drops the files staged before it, so no destination is touched.
fn replace_all(jobs: Vec<WriteJob<'_>>) -> Result<(), PrepError> {
    let mut staged = Vec::with_capacity(jobs.len());
    for (destination, write) in jobs {
        staged.push(StagedArtifact::write(destination, write)?);
    }
    for artifact in staged {
        artifact.commit()?;
    }
    Ok(())
}

fn parquet_job<'a>(df: &'a mut DataFrame, destination: &'a Path) -> WriteJob<'a> {
    (
        destination,
        Box::new(move |file: &mut File| -> Result<(), PrepError> {
            ParquetWriter::new(file).finish(df)?;
            Ok(())
        }),
    )
}

fn csv_job<'a>(df: &'a mut DataFrame, destination: &'a Path) -> WriteJob<'a> {
    (
        destination,
        Box::new(move |file: &mut File| -> Result<(), PrepError> {
            CsvWriter::new(file).include_header(true).finish(df)?;
            Ok(())
        }),
    )
}

/// Deletes mirrors left by an earlier run that requested them.
fn remove_stale_mirrors(paths: &ArtifactPaths) -> Result<(), PrepError> {
    for parquet in [&paths.clean, &paths.train, &paths.test] {
        let mirror = parquet.with_extension("csv");
        if mirror.is_dir() {
            fs::remove_dir_all(&mirror)?;
        } else if mirror.exists() {
            fs::remove_file(&mirror)?;
        } else {
            continue;
        }
        log::debug!("Removed stale mirror '{}'", mirror.display());
    }
    Ok(())
}

/// Writes the cleaned dataset and both partitions with the column types in
/// `layout`, overwriting earlier runs. Without `write_csv`, mirrors from an
/// earlier run are removed so they cannot disagree with the new partitions.
pub fn write_artifacts(
    out_dir: &Path,
    layout: &OutputLayout,
    clean: &Table,
    train: &Table,
    test: &Table,
    write_csv: bool,
) -> Result<ArtifactPaths, PrepError> {
    fs::create_dir_all(out_dir)?;
    let paths = ArtifactPaths::in_dir(out_dir, write_csv);

    let mut frames = [
        layout.to_dataframe(clean)?,
        layout.to_dataframe(train)?,
        layout.to_dataframe(test)?,
    ];
    let mut mirrors = frames.clone();

    let mut jobs: Vec<WriteJob<'_>> = Vec::with_capacity(6);
    for (df, path) in frames.iter_mut().zip([&paths.clean, &paths.train, &paths.test]) {
        jobs.push(parquet_job(df, path));
    }
    if let Some(csv_paths) = &paths.csv {
        for (df, path) in mirrors.iter_mut().zip(csv_paths) {
            jobs.push(csv_job(df, path));
        }
    }
    replace_all(jobs)?;
    if paths.csv.is_none() {
        remove_stale_mirrors(&paths)?;
    }

    log::info!(
        "Persisted {} rows ({} train, {} test) to '{}'",
        clean.height(),
        train.height(),
        test.height(),
        out_dir.display()
    );
    Ok(paths)
}
