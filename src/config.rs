//! Configuration for a [`crate::FieldDataProcessor`] run.
//!
//! A [`ProcessorConfig`] is built once, either in code through its builder or by
//! deserializing a JSON or TOML file, and is then owned by the processor for its
//! whole lifetime.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_VALUE_COLUMN: &str = "Crop_type";
pub const DEFAULT_MAGNITUDE_COLUMN: &str = "Elevation";
pub const DEFAULT_ARTIFACT_COLUMN: &str = "Unnamed: 0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse JSON config '{0}'")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("Failed to parse TOML config '{0}'")]
    Toml(PathBuf, #[source] toml::de::Error),

    #[error("Unsupported config file extension for '{0}', expected .json or .toml")]
    UnsupportedFormat(PathBuf),

    #[error("Rename pair must contain exactly one entry, found {0}")]
    InvalidRenamePair(usize),

    #[error("Config field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// Two columns whose names are exchanged by the rename step.
///
/// Serialized as a single-entry map, `{ "Field_ID": "Plot_ID" }`. The order of the
/// two names does not matter for the swap itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "HashMap<String, String>",
    into = "HashMap<String, String>"
)]
pub struct RenamePair {
    pub first: String,
    pub second: String,
}

impl RenamePair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }
}

impl TryFrom<HashMap<String, String>> for RenamePair {
    type Error = ConfigError;

    fn try_from(map: HashMap<String, String>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(ConfigError::InvalidRenamePair(map.len()));
        }
        map.into_iter()
            .next()
            .map(|(first, second)| RenamePair { first, second })
            .ok_or(ConfigError::InvalidRenamePair(0))
    }
}

impl From<RenamePair> for HashMap<String, String> {
    fn from(pair: RenamePair) -> Self {
        HashMap::from([(pair.first, pair.second)])
    }
}

/// How much the processor logs.
///
/// Parsing is case-insensitive. Anything that is not `DEBUG`, `INFO` or `NONE` is
/// treated as `INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    /// Discard every log record.
    None,
}

impl From<&str> for Verbosity {
    fn from(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "DEBUG" => Verbosity::Debug,
            "NONE" => Verbosity::None,
            _ => Verbosity::Info,
        }
    }
}

impl From<String> for Verbosity {
    fn from(value: String) -> Self {
        Verbosity::from(value.as_str())
    }
}

impl From<Verbosity> for String {
    fn from(value: Verbosity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Debug => "DEBUG",
            Verbosity::Info => "INFO",
            Verbosity::None => "NONE",
        };
        f.write_str(name)
    }
}

/// Everything a pipeline run needs to know.
///
/// # Examples
///
/// ```
/// use field_data_processor::{ProcessorConfig, RenamePair, Verbosity};
///
/// let config = ProcessorConfig::builder()
///     .data_source_locator("sqlite://Maji_Ndogo_farm_survey_small.db")
///     .retrieval_query("SELECT * FROM geographic_features")
///     .rename_pair(RenamePair::new("Annual_yield", "Crop_type"))
///     .remote_mapping_url("https://example.org/Weather_data_field_mapping.csv")
///     .logging_verbosity(Verbosity::Debug)
///     .build();
///
/// assert_eq!(config.value_column, "Crop_type");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// sqlx connection URL of the data store, e.g. `sqlite://survey.db`.
    #[builder(into)]
    #[serde(alias = "db_path")]
    pub data_source_locator: String,

    /// SQL run verbatim against the data store.
    #[builder(into)]
    #[serde(alias = "sql_query")]
    pub retrieval_query: String,

    #[serde(alias = "columns_to_rename")]
    pub rename_pair: RenamePair,

    /// Raw value to canonical value, applied to [`ProcessorConfig::value_column`].
    #[builder(default)]
    #[serde(default, alias = "values_to_rename")]
    pub value_substitution_table: HashMap<String, String>,

    /// Header-first CSV mapping fields onto weather stations.
    #[builder(into)]
    #[serde(alias = "weather_mapping_csv")]
    pub remote_mapping_url: String,

    #[builder(default)]
    #[serde(default)]
    pub logging_verbosity: Verbosity,

    #[builder(into, default = DEFAULT_VALUE_COLUMN.to_string())]
    #[serde(default = "default_value_column")]
    pub value_column: String,

    #[builder(into, default = DEFAULT_MAGNITUDE_COLUMN.to_string())]
    #[serde(default = "default_magnitude_column")]
    pub magnitude_column: String,

    /// Row-index column left behind by some export paths. Dropped at the end of a
    /// run when present.
    #[builder(into, default = DEFAULT_ARTIFACT_COLUMN.to_string())]
    #[serde(default = "default_artifact_column")]
    pub artifact_column: String,
}

fn default_value_column() -> String {
    DEFAULT_VALUE_COLUMN.to_string()
}

fn default_magnitude_column() -> String {
    DEFAULT_MAGNITUDE_COLUMN.to_string()
}

fn default_artifact_column() -> String {
    DEFAULT_ARTIFACT_COLUMN.to_string()
}

impl ProcessorConfig {
    /// Loads a config from a `.json` or `.toml` file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, a parse error for
    /// malformed contents, [`ConfigError::UnsupportedFormat`] for other extensions,
    /// and any error from [`ProcessorConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let config: ProcessorConfig = match extension.as_deref() {
            Some("json") => serde_json::from_str(&contents)
                .map_err(|e| ConfigError::Json(path.to_path_buf(), e))?,
            Some("toml") => {
                toml::from_str(&contents).map_err(|e| ConfigError::Toml(path.to_path_buf(), e))?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that every field the pipeline relies on is filled in.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("data_source_locator", &self.data_source_locator),
            ("retrieval_query", &self.retrieval_query),
            ("remote_mapping_url", &self.remote_mapping_url),
            ("rename_pair", &self.rename_pair.first),
            ("rename_pair", &self.rename_pair.second),
            ("value_column", &self.value_column),
            ("magnitude_column", &self.magnitude_column),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(field));
            }
        }
        Ok(())
    }
}
