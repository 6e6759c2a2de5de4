//! # Schema Normalizer
//!
//! Rewrites raw survey answers into canonical categories and ordinal codes.
//! The `Mappings` tables are compiled once against the input schema into a
//! `Normalizer`. After that, normalizing a row is a pure function of that
//! row alone, so the whole table is mapped in parallel.
//!
//! Rules run in a fixed order: binary codings, ordinal scales, free-text
//! ladders, then the derived tobacco and region columns. A rule whose source
//! column is absent is skipped. The stage that needs that column reports it.
//! A value that no rule recognizes is passed through untouched.

use ahash::AHashMap;
use rayon::prelude::*;

use crate::mappings::{Ladder, Mappings};
use crate::table::{Row, Schema, Table, Value};

/// One in-place rewrite of a single column.
#[derive(Debug, Clone)]
enum FieldStep {
    Binary {
        column: usize,
        one: String,
        zero: String,
    },
    Ordinal {
        column: usize,
        codes: AHashMap<String, i64>,
    },
    Ladder {
        column: usize,
        ladder: Ladder,
    },
}

impl FieldStep {
    #[inline]
    fn apply(&self, values: &mut [Value]) {
        match self {
            FieldStep::Binary { column, one, zero } => {
                let coded = match values[*column].as_text() {
                    Some(text) if text == one.as_str() => Some(1),
                    Some(text) if text == zero.as_str() => Some(0),
                    _ => None,
                };
                if let Some(code) = coded {
                    values[*column] = Value::Int(code);
                }
            }
            FieldStep::Ordinal { column, codes } => {
                if let Some(&code) = values[*column].as_text().and_then(|t| codes.get(t)) {
                    values[*column] = Value::Int(code);
                }
            }
            FieldStep::Ladder { column, ladder } => {
                let label = values[*column]
                    .as_text()
                    .and_then(|text| ladder.consolidate(text))
                    .map(str::to_string);
                if let Some(label) = label {
                    values[*column] = Value::Text(label);
                }
            }
        }
    }
}

/// Derivation of `SmokerStatus_ord`, `ECigaretteUsage_ord` and their maximum.
#[derive(Debug, Clone)]
struct TobaccoPlan {
    codes: AHashMap<String, i64>,
    smoker: Option<(usize, usize)>,
    ecig: Option<(usize, usize)>,
    combined: Option<usize>,
}

impl TobaccoPlan {
    fn code(&self, value: &Value) -> Value {
        value
            .as_text()
            .and_then(|t| self.codes.get(t))
            .map_or(Value::Null, |&c| Value::Int(c))
    }

    fn derive(&self, values: &mut [Value]) {
        if let Some((source, target)) = self.smoker {
            values[target] = self.code(&values[source]);
        }
        if let Some((source, target)) = self.ecig {
            values[target] = self.code(&values[source]);
        }
        if let (Some(combined), Some((_, smoker)), Some((_, ecig))) =
            (self.combined, self.smoker, self.ecig)
        {
            values[combined] = max_defined(values[smoker].as_i64(), values[ecig].as_i64())
                .map_or(Value::Null, Value::Int);
        }
    }
}

/// Maximum over the operands that are present; `None` only when both are absent.
#[inline]
pub fn max_defined(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

#[derive(Debug, Clone)]
struct RegionPlan {
    state: usize,
    target: usize,
    lookup: AHashMap<String, String>,
}

impl RegionPlan {
    fn derive(&self, values: &mut [Value]) {
        values[self.target] = values[self.state]
            .as_text()
            .and_then(|state| self.lookup.get(state))
            .map_or(Value::Null, |region| Value::Text(region.clone()));
    }
}

/// A `Mappings` table resolved against one concrete input schema.
#[derive(Debug, Clone)]
pub struct Normalizer {
    output: Schema,
    steps: Vec<FieldStep>,
    tobacco: TobaccoPlan,
    region: Option<RegionPlan>,
}

impl Normalizer {
    pub fn new(mappings: &Mappings, input: &Schema) -> Self {
        let mut output = input.clone();
        let mut steps = Vec::new();

        for coding in &mappings.binary {
            for name in &coding.columns {
                match input.index_of(name) {
                    Some(column) => steps.push(FieldStep::Binary {
                        column,
                        one: coding.one.clone(),
                        zero: coding.zero.clone(),
                    }),
                    None => log::debug!("Binary column '{name}' absent; rule skipped"),
                }
            }
        }

        for scale in &mappings.ordinals {
            match input.index_of(&scale.column) {
                Some(column) => steps.push(FieldStep::Ordinal {
                    column,
                    codes: ordinal_codes(&scale.levels),
                }),
                None => log::debug!("Ordinal column '{}' absent; rule skipped", scale.column),
            }
        }

        for ladder in &mappings.ladders {
            match input.index_of(&ladder.column) {
                Some(column) => steps.push(FieldStep::Ladder {
                    column,
                    ladder: ladder.clone(),
                }),
                None => log::debug!("Ladder column '{}' absent; rule skipped", ladder.column),
            }
        }

        let t = &mappings.tobacco;
        let smoker = input
            .index_of(&t.smoker_column)
            .map(|source| (source, output.ensure(&t.smoker_ord_column)));
        let ecig = input
            .index_of(&t.ecig_column)
            .map(|source| (source, output.ensure(&t.ecig_ord_column)));
        let combined = match (smoker, ecig) {
            (Some(_), Some(_)) => Some(output.ensure(&t.combined_column)),
            _ => None,
        };
        let tobacco = TobaccoPlan {
            codes: ordinal_codes(&t.levels),
            smoker,
            ecig,
            combined,
        };

        let r = &mappings.region;
        let region = input.index_of(&r.state_column).map(|state| {
            let lookup = r
                .regions
                .iter()
                .flat_map(|group| {
                    group
                        .states
                        .iter()
                        .map(move |s| (s.clone(), group.name.clone()))
                })
                .collect();
            RegionPlan {
                state,
                target: output.ensure(&r.region_column),
                lookup,
            }
        });

        log::debug!(
            "Normalizer compiled: {} field rules, {} output columns",
            steps.len(),
            output.len()
        );

        Self {
            output,
            steps,
            tobacco,
            region,
        }
    }

    /// Schema of every row this normalizer produces.
    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    /// Integer-coded columns created by the tobacco derivation.
    pub fn derived_code_columns(&self) -> impl Iterator<Item = &str> {
        let t = &self.tobacco;
        t.smoker
            .map(|(_, target)| target)
            .into_iter()
            .chain(t.ecig.map(|(_, target)| target))
            .chain(t.combined)
            .map(|idx| self.output.names()[idx].as_str())
    }

    /// Text columns created by derivation: the region, when a state column exists.
    pub fn derived_text_columns(&self) -> impl Iterator<Item = &str> {
        self.region
            .iter()
            .map(|r| self.output.names()[r.target].as_str())
    }

    pub fn normalize(&self, row: &Row) -> Row {
        let mut values = row.values.clone();
        values.resize(self.output.len(), Value::Null);
        for step in &self.steps {
            step.apply(&mut values);
        }
        self.tobacco.derive(&mut values);
        if let Some(region) = &self.region {
            region.derive(&mut values);
        }
        Row::new(row.id, values)
    }

    /// Row-parallel map over the whole table. Output order equals input order.
    pub fn normalize_table(&self, table: &Table) -> Table {
        let rows = table.rows.par_iter().map(|row| self.normalize(row)).collect();
        Table::new(self.output.clone(), rows)
    }
}

fn ordinal_codes(levels: &[String]) -> AHashMap<String, i64> {
    levels
        .iter()
        .enumerate()
        .map(|(i, level)| (level.clone(), i as i64 + 1))
        .collect()
}
