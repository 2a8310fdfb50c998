use crate::config::ConfigError;
use crate::processor::Stage;
use polars::error::PolarsError;
use polars::prelude::DataType;
use thiserror::Error;

/// Coarse classification of a [`ProcessorError`].
///
/// Callers that want to decide whether to re-run the pipeline (for example after a
/// transient `Connection` failure) can match on this instead of on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The data store could not be reached or the locator is malformed.
    Connection,
    /// The retrieval query failed on the data store side.
    Query,
    /// A step produced zero rows. Never handed back as an empty dataset.
    EmptyResult,
    /// The remote mapping table could not be fetched or parsed.
    MalformedResource,
    /// A named column is missing from the working dataset.
    ColumnNotFound,
    /// A column has a data type the step cannot work with.
    TypeMismatch,
    /// The working dataset and the mapping table cannot be joined.
    Join,
    /// The configuration is incomplete or unreadable.
    Config,
    /// A step was called before the steps it depends on.
    InvalidState,
    /// Any other failure inside polars.
    DataFrame,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start the I/O runtime for '{0}'")]
    RuntimeInit(String, #[source] std::io::Error),

    #[error("Failed to connect to data store '{locator}'")]
    Connection {
        locator: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {query}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query returned column '{column}' more than once")]
    DuplicateColumn { column: String },

    #[error("{operation} returned no rows")]
    EmptyResult { operation: &'static str },

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error buffering CSV data from {url}")]
    CsvReadIo {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parsing error reading CSV data from {url}")]
    CsvReadPolars {
        url: String,
        #[source]
        source: PolarsError,
    },

    #[error("CSV from {url} has no rows or no columns")]
    EmptyResource { url: String },

    #[error("Required column '{column}' not found while trying to {operation}")]
    ColumnNotFound {
        column: String,
        operation: &'static str,
    },

    #[error("Column '{column}' has type {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: DataType,
    },

    #[error("Absolute value of the minimum {dtype} in column '{column}' overflows")]
    MagnitudeOverflow { column: String, dtype: DataType },

    #[error("Cannot join: {0}")]
    Join(String),

    #[error("Cannot {operation} at stage {actual:?}, requires {required:?}")]
    InvalidState {
        operation: &'static str,
        required: Stage,
        actual: Stage,
    },

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}

impl ProcessorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessorError::Config(_) => ErrorKind::Config,
            ProcessorError::RuntimeInit(..) | ProcessorError::Connection { .. } => {
                ErrorKind::Connection
            }
            ProcessorError::Query { .. } | ProcessorError::DuplicateColumn { .. } => {
                ErrorKind::Query
            }
            ProcessorError::EmptyResult { .. } => ErrorKind::EmptyResult,
            ProcessorError::NetworkRequest(..)
            | ProcessorError::HttpStatus { .. }
            | ProcessorError::CsvReadIo { .. }
            | ProcessorError::CsvReadPolars { .. }
            | ProcessorError::EmptyResource { .. } => ErrorKind::MalformedResource,
            ProcessorError::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            ProcessorError::TypeMismatch { .. } | ProcessorError::MagnitudeOverflow { .. } => {
                ErrorKind::TypeMismatch
            }
            ProcessorError::Join(_) => ErrorKind::Join,
            ProcessorError::InvalidState { .. } => ErrorKind::InvalidState,
            ProcessorError::DataFrameProcessing(_) => ErrorKind::DataFrame,
        }
    }
}
