//! # Tabular Input Model
//!
//! The survey arrives as a headered delimited file. This module owns the
//! in-memory shape of that data: an ordered `Schema`, one `Row` per respondent,
//! and the dynamically typed `Value` cells that flow through every stage.
//!
//! - Files are read with the polars CSV reader, which infers each column's type
//!   over the whole file: integral, floating point, or textual.
//! - Empty cells become `Value::Null`.
//! - Every row receives its `RowId` here, as the 0-based ordinal of the data row
//!   in the file. Identifiers are fixed before any parallel stage runs, so they do
//!   not depend on the size of the worker pool.

use ahash::AHashMap;
use polars::prelude::*;
use rayon::prelude::*;
use std::fmt;
use std::fs::File;
use std::path::Path;

use crate::error::PrepError;

static NULL: Value = Value::Null;

/// Stable per-row identifier, carried into every artifact as `row_id`.
pub type RowId = u64;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the cell. Text and null cells have none.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered column names with constant-time lookup by name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    names: Vec<String>,
    index: AHashMap<String, usize>,
}

impl Schema {
    pub fn new<I, S>(names: I) -> Result<Self, PrepError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Schema::default();
        for name in names {
            let name = name.into();
            if schema.index.contains_key(&name) {
                return Err(PrepError::DuplicateColumn(name));
            }
            schema.index.insert(name.clone(), schema.names.len());
            schema.names.push(name);
        }
        Ok(schema)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resolve a column that a later stage cannot do without.
    pub fn require(&self, name: &str) -> Result<usize, PrepError> {
        self.index_of(name)
            .ok_or_else(|| PrepError::ColumnNotFound(name.to_string()))
    }

    /// Returns the index of `name`, appending the column when it does not exist yet.
    /// An existing column is reused so a derived field replaces it in place.
    pub fn ensure(&mut self, name: &str) -> usize {
        if let Some(idx) = self.index_of(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }
}

/// One respondent.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Value {
        self.values.get(idx).unwrap_or(&NULL)
    }
}

/// A schema together with the rows that follow it.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Builds a table from string cells, applying the same column typing as
    /// `read_delimited`. Empty cells are null. Row identifiers are assigned by position.
    pub fn from_string_rows<S: AsRef<str>>(
        header: &[&str],
        cells: &[Vec<S>],
    ) -> Result<Self, PrepError> {
        // Named error before polars rejects the frame.
        Schema::new(header.iter().copied())?;
        let columns = header
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let raw: Vec<Option<&str>> = cells
                    .iter()
                    .map(|row| row.get(c).map(|s| s.as_ref()).filter(|s| !s.is_empty()))
                    .collect();
                narrow_text_column(Column::new((*name).into(), raw))
            })
            .collect();
        Table::from_dataframe(&DataFrame::new(columns)?)
    }

    /// Converts a frame into rows. Integer columns become `Int`, floating point
    /// columns `Float`, and every other type is rendered as `Text`.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self, PrepError> {
        let schema = Schema::new(df.get_column_names().into_iter().map(|n| n.to_string()))?;
        let columns = df
            .get_columns()
            .iter()
            .map(column_values)
            .collect::<Result<Vec<_>, PrepError>>()?;

        let rows = (0..df.height())
            .into_par_iter()
            .map(|i| {
                let values = columns.iter().map(|column| column[i].clone()).collect();
                Row::new(i as RowId, values)
            })
            .collect();
        Ok(Table::new(schema, rows))
    }
}

/// Narrowest of Int64, Float64 and String that holds every non-null cell.
fn narrow_text_column(column: Column) -> Column {
    if let Ok(ints) = column.strict_cast(&DataType::Int64) {
        return ints;
    }
    match column.strict_cast(&DataType::Float64) {
        Ok(floats) => floats,
        Err(_) => column,
    }
}

fn column_values(column: &Column) -> Result<Vec<Value>, PrepError> {
    let dtype = column.dtype();
    if dtype.is_integer() {
        let cast = column.cast(&DataType::Int64)?;
        let ca = cast.i64()?;
        Ok(ca.into_iter().map(|v| v.map_or(Value::Null, Value::Int)).collect())
    } else if dtype.is_float() {
        let cast = column.cast(&DataType::Float64)?;
        let ca = cast.f64()?;
        Ok(ca.into_iter().map(|v| v.map_or(Value::Null, Value::Float)).collect())
    } else {
        let cast = column.cast(&DataType::String)?;
        let ca = cast.str()?;
        Ok(ca
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
            .collect())
    }
}

/// Tab for `.tsv`/`.tab` files, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Reads a headered delimited file into a typed `Table`. Polars infers each
/// column's type from every row of the file.
pub fn read_delimited(path: &Path) -> Result<Table, PrepError> {
    let file = File::open(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|options| options.with_separator(delimiter_for(path)))
        .into_reader_with_file_handle(file)
        .finish()?;

    let table = Table::from_dataframe(&df)?;
    log::info!(
        "Read {} rows with {} columns from '{}'",
        table.height(),
        table.schema.len(),
        path.display()
    );
    Ok(table)
}
