//! # Stratified Splitter
//!
//! Routes each row to the test partition with probability `test_fraction`.
//! The probability is the same inside every class of the target label. The
//! decision for a row is a pure function of `(seed, label, row id)`, so a rerun
//! over the same input reproduces the same membership exactly. The training
//! partition is never sampled. It is whatever the test id set excludes, so the
//! two partitions are disjoint and together cover the dataset.

use ahash::AHashSet;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::PrepError;
use crate::table::{RowId, Table, Value};

const UNIT_SCALE: f64 = 1.0 / (1u64 << 53) as f64;

/// Uniform draw in `[0, 1)` keyed by seed, stratum label and row identity.
pub fn unit_draw(seed: u64, label: &str, id: RowId) -> f64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    label.hash(&mut hasher);
    id.hash(&mut hasher);
    (hasher.finish() >> 11) as f64 * UNIT_SCALE
}

/// Canonical text of a label cell, used as the stratum key.
fn stratum_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Realized outcome for one class of the target label.
#[derive(Debug, Clone, PartialEq)]
pub struct StratumSummary {
    pub label: String,
    pub rows: usize,
    pub test_rows: usize,
    pub requested_fraction: f64,
}

impl StratumSummary {
    pub fn realized_fraction(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.test_rows as f64 / self.rows as f64
        }
    }
}

/// Train/test membership by row identifier.
#[derive(Debug, Clone)]
pub struct Partition {
    pub test_ids: Vec<RowId>,
    pub train_ids: Vec<RowId>,
    pub strata: Vec<StratumSummary>,
}

impl Partition {
    /// Materializes `(train, test)` from `table`. Train rows are the rows whose
    /// identifier is not in the test set; both keep the table's row order.
    pub fn materialize(&self, table: &Table) -> (Table, Table) {
        let test_set: AHashSet<RowId> = self.test_ids.iter().copied().collect();
        let (test_rows, train_rows): (Vec<_>, Vec<_>) = table
            .rows
            .par_iter()
            .cloned()
            .partition(|row| test_set.contains(&row.id));
        (
            Table::new(table.schema.clone(), train_rows),
            Table::new(table.schema.clone(), test_rows),
        )
    }
}

/// Seeded per-class acceptance sampling on one label column.
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    label_column: String,
    test_fraction: f64,
    seed: u64,
}

impl StratifiedSplitter {
    /// `test_fraction` must be finite and strictly between 0 and 1.
    pub fn new(
        label_column: impl Into<String>,
        test_fraction: f64,
        seed: u64,
    ) -> Result<Self, PrepError> {
        validate_test_fraction(test_fraction)?;
        Ok(Self {
            label_column: label_column.into(),
            test_fraction,
            seed,
        })
    }

    /// Per-class acceptance fractions for the labels observed in `table`.
    /// This is the second aggregation barrier: it needs every row's label.
    pub fn fractions(&self, table: &Table) -> Result<BTreeMap<String, f64>, PrepError> {
        let column = table.schema.require(&self.label_column)?;

        if let Some(row) = table.rows.par_iter().find_first(|r| r.get(column).is_null()) {
            return Err(PrepError::MissingValues {
                column: self.label_column.clone(),
                row_id: row.id,
            });
        }

        let labels = table
            .rows
            .par_iter()
            .filter_map(|r| stratum_key(r.get(column)))
            .fold(AHashSet::new, |mut set, label| {
                set.insert(label);
                set
            })
            .reduce(AHashSet::new, |mut a, b| {
                a.extend(b);
                a
            });

        Ok(labels
            .into_iter()
            .map(|label| (label, self.test_fraction))
            .collect())
    }

    pub fn split(&self, table: &Table) -> Result<Partition, PrepError> {
        let column = table.schema.require(&self.label_column)?;
        let fractions = self.fractions(table)?;
        log::debug!("Stratum fractions on '{}': {fractions:?}", self.label_column);

        let decisions: Vec<(String, RowId, bool)> = table
            .rows
            .par_iter()
            .filter_map(|row| {
                let label = stratum_key(row.get(column))?;
                let fraction = fractions.get(&label).copied().unwrap_or(0.0);
                let is_test = unit_draw(self.seed, &label, row.id) < fraction;
                Some((label, row.id, is_test))
            })
            .collect();

        let test_ids: Vec<RowId> = decisions
            .iter()
            .filter(|(_, _, is_test)| *is_test)
            .map(|(_, id, _)| *id)
            .collect();
        let test_set: AHashSet<RowId> = test_ids.iter().copied().collect();
        let train_ids: Vec<RowId> = table
            .rows
            .iter()
            .map(|r| r.id)
            .filter(|id| !test_set.contains(id))
            .collect();

        let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for (label, _, is_test) in &decisions {
            let entry = counts.entry(label.as_str()).or_default();
            entry.0 += 1;
            if *is_test {
                entry.1 += 1;
            }
        }
        let strata = counts
            .into_iter()
            .map(|(label, (rows, test_rows))| StratumSummary {
                label: label.to_string(),
                rows,
                test_rows,
                requested_fraction: fractions.get(label).copied().unwrap_or(0.0),
            })
            .collect();

        log::info!(
            "Split {} rows on '{}' (seed {}): {} train, {} test",
            table.height(),
            self.label_column,
            self.seed,
            train_ids.len(),
            test_ids.len()
        );

        Ok(Partition {
            test_ids,
            train_ids,
            strata,
        })
    }
}

pub fn validate_test_fraction(fraction: f64) -> Result<(), PrepError> {
    if fraction.is_finite() && fraction > 0.0 && fraction < 1.0 {
        Ok(())
    } else {
        Err(PrepError::InvalidTestFraction(fraction))
    }
}
