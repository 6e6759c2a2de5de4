use polars::prelude::PolarsError;
use thiserror::Error;

/// Every failure the preparation run can surface. None of them are recovered
/// locally; the run aborts before any artifact is committed.
#[derive(Error, Debug)]
pub enum PrepError {
    #[error(
        "The required column '{0}' was not found after normalization. Please check the input header."
    )]
    ColumnNotFound(String),

    #[error(
        "Missing or null values were found in the target column '{column}' (first at row {row_id})."
    )]
    MissingValues { column: String, row_id: u64 },

    #[error("The input header declares the column '{0}' more than once.")]
    DuplicateColumn(String),

    #[error("The test fraction must lie strictly between 0 and 1 (got {0}).")]
    InvalidTestFraction(f64),

    #[error("Invalid mappings configuration: {0}")]
    Mappings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),

    #[error("Failed to parse the mappings file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize the mappings: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Failed to replace '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PrepError {
    /// Schema errors name a column that a later stage depends on.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PrepError::ColumnNotFound(_)
                | PrepError::MissingValues { .. }
                | PrepError::DuplicateColumn(_)
        )
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PrepError::InvalidTestFraction(_)
                | PrepError::Mappings(_)
                | PrepError::Toml(_)
                | PrepError::TomlSerialize(_)
        )
    }
}
