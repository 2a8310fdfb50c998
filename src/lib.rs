//! Load farm survey data from a SQL data store, normalise a handful of columns,
//! and map each field onto its weather station.
//!
//! The entry point is [`FieldDataProcessor`], configured by a [`ProcessorConfig`].

mod config;
mod dataset;
mod error;
mod gateway;
mod logging;
mod processor;
#[cfg(test)]
mod test_support;

pub use config::{
    ConfigError, ProcessorConfig, RenamePair, Verbosity, DEFAULT_ARTIFACT_COLUMN,
    DEFAULT_MAGNITUDE_COLUMN, DEFAULT_VALUE_COLUMN,
};
pub use dataset::FieldFrameExt;
pub use error::{ErrorKind, ProcessorError};
pub use gateway::{DataGateway, SqlConnection, SqlGateway};
pub use logging::{PipelineLogger, LOG_TARGET};
pub use processor::{FieldDataProcessor, Stage};
