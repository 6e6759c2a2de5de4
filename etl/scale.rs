//! # Feature Scaler
//!
//! Global min–max scaling of a fixed feature set. `ScalingModel::fit` is the
//! first aggregation barrier of the pipeline: it reduces every row of the
//! normalized table to one `(min, max)` pair per column. `apply` is then a
//! row-local map that appends one `<col>_scaled` cell per fitted column.

use rayon::prelude::*;

use crate::error::PrepError;
use crate::table::{Row, Schema, Table, Value};

pub const SCALED_SUFFIX: &str = "_scaled";

/// Continuous measurements followed by the ordinal encodings.
pub const DEFAULT_SCALED_COLUMNS: [&str; 12] = [
    "PhysicalHealthDays",
    "MentalHealthDays",
    "SleepHours",
    "HeightInMeters",
    "WeightInKilograms",
    "BMI",
    "GeneralHealth",
    "RemovedTeeth",
    "AgeCategory",
    "SmokerStatus_ord",
    "ECigaretteUsage_ord",
    "SmokerOrECig_ord",
];

/// Observed extremes of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    /// `(x - min) / (max - min)`, or `0` for a constant column.
    #[inline]
    pub fn scale(&self, x: f64) -> f64 {
        if self.max > self.min {
            (x - self.min) / (self.max - self.min)
        } else {
            0.0
        }
    }
}

/// Streaming min/max with counts of the cells that could not take part.
#[derive(Debug, Clone, Copy, Default)]
struct RangeAccumulator {
    range: Option<ColumnRange>,
    nulls: usize,
    non_numeric: usize,
}

impl RangeAccumulator {
    #[inline]
    fn observe(&mut self, value: &Value) {
        match value {
            Value::Null => self.nulls += 1,
            Value::Text(_) => self.non_numeric += 1,
            Value::Int(_) | Value::Float(_) => match value.as_f64() {
                Some(x) if x.is_finite() => self.include(x, x),
                _ => self.non_numeric += 1,
            },
        }
    }

    #[inline]
    fn include(&mut self, lo: f64, hi: f64) {
        self.range = Some(match self.range {
            Some(r) => ColumnRange {
                min: r.min.min(lo),
                max: r.max.max(hi),
            },
            None => ColumnRange { min: lo, max: hi },
        });
    }

    fn merge(&mut self, other: RangeAccumulator) {
        if let Some(r) = other.range {
            self.include(r.min, r.max);
        }
        self.nulls += other.nulls;
        self.non_numeric += other.non_numeric;
    }
}

#[derive(Debug, Clone)]
struct FittedColumn {
    name: String,
    source: usize,
    target: usize,
    range: Option<ColumnRange>,
}

/// Per-column statistics fitted once over the complete normalized dataset.
///
/// The statistics are taken before the train/test split, so rows that later
/// land in the test partition influence how training rows are scaled. This is
/// the intended behavior of the pipeline: it keeps the cleaned artifact and both
/// partitions on one shared scale. Consumers that need strictly train-only
/// statistics must refit on the train partition themselves.
#[derive(Debug, Clone)]
pub struct ScalingModel {
    output: Schema,
    columns: Vec<FittedColumn>,
}

impl ScalingModel {
    /// Fits every column in `columns`. A column absent from the table is a
    /// schema error naming that column; nothing is fitted in that case.
    pub fn fit<S: AsRef<str>>(table: &Table, columns: &[S]) -> Result<Self, PrepError> {
        let sources = columns
            .iter()
            .map(|c| table.schema.require(c.as_ref()))
            .collect::<Result<Vec<usize>, PrepError>>()?;

        let width = sources.len();
        let accumulators = table
            .rows
            .par_iter()
            .fold(
                || vec![RangeAccumulator::default(); width],
                |mut acc, row| {
                    for (slot, &source) in acc.iter_mut().zip(&sources) {
                        slot.observe(row.get(source));
                    }
                    acc
                },
            )
            .reduce(
                || vec![RangeAccumulator::default(); width],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        x.merge(y);
                    }
                    a
                },
            );

        let mut output = table.schema.clone();
        let mut fitted = Vec::with_capacity(width);
        for ((name, &source), acc) in columns.iter().zip(&sources).zip(accumulators) {
            let name = name.as_ref().to_string();
            if acc.non_numeric > 0 {
                log::warn!(
                    "Column '{name}' has {} non-numeric or non-finite values; they are left unscaled",
                    acc.non_numeric
                );
            }
            match acc.range {
                Some(r) => log::debug!(
                    "Fitted '{name}': min={}, max={}, nulls={}",
                    r.min,
                    r.max,
                    acc.nulls
                ),
                None => log::warn!("Column '{name}' has no numeric values; its scaled column is empty"),
            }
            let target = output.ensure(&format!("{name}{SCALED_SUFFIX}"));
            fitted.push(FittedColumn {
                name,
                source,
                target,
                range: acc.range,
            });
        }

        log::info!(
            "Fitted min-max statistics for {} columns over {} rows",
            fitted.len(),
            table.height()
        );
        Ok(Self {
            output,
            columns: fitted,
        })
    }

    /// Names of the appended `<col>_scaled` columns, in fit order.
    pub fn scaled_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(|c| self.output.names()[c.target].as_str())
    }

    /// Schema of rows produced by `apply`.
    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    pub fn range(&self, column: &str) -> Option<ColumnRange> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .and_then(|c| c.range)
    }

    /// Keeps every original cell and fills the `<col>_scaled` cells. Values that
    /// are null, non-numeric, NaN or infinite scale to null.
    pub fn apply(&self, row: &Row) -> Row {
        let mut values = row.values.clone();
        values.resize(self.output.len(), Value::Null);
        for column in &self.columns {
            let scaled = match (row.get(column.source).as_f64(), column.range) {
                (Some(x), Some(range)) if x.is_finite() => Value::Float(range.scale(x)),
                _ => Value::Null,
            };
            values[column.target] = scaled;
        }
        Row::new(row.id, values)
    }

    /// Row-parallel `apply`; row count and order are preserved.
    pub fn transform(&self, table: &Table) -> Table {
        let rows = table.rows.par_iter().map(|row| self.apply(row)).collect();
        Table::new(self.output.clone(), rows)
    }
}
