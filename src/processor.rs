//! The pipeline orchestrator.
//!
//! [`FieldDataProcessor`] owns the configuration, the data store connection and the
//! working dataset, and moves that dataset through a fixed sequence of steps:
//!
//! ```text
//! Uninitialized -> Ingested -> Renamed -> Corrected -> Mapped -> Finalized
//! ```
//!
//! Each step can be called on its own (useful for inspecting intermediate results),
//! or [`FieldDataProcessor::process`] runs all of them in order.

use crate::config::{ProcessorConfig, RenamePair};
use crate::dataset::FieldFrameExt;
use crate::error::ProcessorError;
use crate::gateway::{DataGateway, SqlGateway};
use crate::logging::PipelineLogger;
use bon::bon;
use polars::prelude::DataFrame;

/// Where the working dataset is in the pipeline.
///
/// Stages are ordered, so `stage >= Stage::Renamed` means the rename step has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// No dataset loaded yet, or the last [`FieldDataProcessor::process`] failed.
    Uninitialized,
    Ingested,
    Renamed,
    Corrected,
    Mapped,
    /// The artifact column has been dropped; the dataset is final.
    Finalized,
}

/// Loads, cleans and enriches one farm survey dataset.
///
/// # Examples
///
/// ```no_run
/// use field_data_processor::{FieldDataProcessor, ProcessorConfig, ProcessorError, RenamePair};
///
/// # fn main() -> Result<(), ProcessorError> {
/// let config = ProcessorConfig::builder()
///     .data_source_locator("sqlite://Maji_Ndogo_farm_survey_small.db")
///     .retrieval_query("SELECT * FROM geographic_features LEFT JOIN weather_features USING (Field_ID)")
///     .rename_pair(RenamePair::new("Annual_yield", "Crop_type"))
///     .remote_mapping_url("https://example.org/Weather_data_field_mapping.csv")
///     .build();
///
/// let mut processor = FieldDataProcessor::new(config)?;
/// let df = processor.process()?;
/// println!("{}", df.head(Some(5)));
/// # Ok(())
/// # }
/// ```
pub struct FieldDataProcessor<G: DataGateway = SqlGateway> {
    config: ProcessorConfig,
    gateway: G,
    connection: Option<G::Connection>,
    frame: Option<DataFrame>,
    stage: Stage,
    logger: PipelineLogger,
}

impl FieldDataProcessor<SqlGateway> {
    /// Creates a processor that reads from SQLite and fetches the mapping over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Config`] if the configuration fails validation.
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorError> {
        Self::with_gateway(config, SqlGateway::new())
    }
}

#[bon]
impl<G: DataGateway> FieldDataProcessor<G> {
    /// Creates a processor on top of any [`DataGateway`].
    ///
    /// No I/O happens here; the connection is opened by the first
    /// [`FieldDataProcessor::ingest`].
    pub fn with_gateway(config: ProcessorConfig, gateway: G) -> Result<Self, ProcessorError> {
        config.validate()?;
        let logger = PipelineLogger::new(config.logging_verbosity);
        Ok(Self {
            config,
            gateway,
            connection: None,
            frame: None,
            stage: Stage::Uninitialized,
            logger,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The working dataset, if one has been loaded.
    pub fn frame(&self) -> Option<&DataFrame> {
        self.frame.as_ref()
    }

    /// Consumes the processor and hands back the working dataset. The connection,
    /// if open, is released.
    pub fn into_frame(self) -> Option<DataFrame> {
        self.frame
    }

    fn frame_at<'a>(
        frame: &'a mut Option<DataFrame>,
        stage: Stage,
        operation: &'static str,
        required: Stage,
    ) -> Result<&'a mut DataFrame, ProcessorError> {
        match frame {
            Some(df) if stage >= required => Ok(df),
            _ => Err(ProcessorError::InvalidState {
                operation,
                required,
                actual: stage,
            }),
        }
    }

    /// Loads the working dataset by running the retrieval query.
    ///
    /// The connection is opened on the first call and reused afterwards. Calling
    /// this again reloads the dataset and resets the stage to [`Stage::Ingested`].
    ///
    /// # Errors
    ///
    /// Propagates gateway errors unchanged: connection failures, query failures,
    /// and [`ProcessorError::EmptyResult`] when the query returns no rows. On error
    /// the working dataset is cleared.
    pub fn ingest(&mut self) -> Result<(), ProcessorError> {
        let logger = self.logger;

        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = self
                    .gateway
                    .connect(&self.config.data_source_locator)
                    .inspect_err(|e| {
                        logger.error(format_args!(
                            "Failed to connect to the data store. Error: {e}"
                        ))
                    })?;
                logger.info(format_args!("Database connection established."));
                connection
            }
        };

        let result = self
            .gateway
            .execute_query(&mut connection, &self.config.retrieval_query);
        self.connection = Some(connection);

        match result {
            Ok(df) => {
                logger.info(format_args!(
                    "Successfully loaded data: {} rows, {} columns.",
                    df.height(),
                    df.width()
                ));
                self.frame = Some(df);
                self.stage = Stage::Ingested;
                Ok(())
            }
            Err(e) => {
                logger.error(format_args!("Failed to load data. Error: {e}"));
                self.frame = None;
                self.stage = Stage::Uninitialized;
                Err(e)
            }
        }
    }

    /// Swaps the two columns named by the configured [`RenamePair`].
    ///
    /// Applying it twice restores the original dataset.
    pub fn rename_columns(&mut self) -> Result<(), ProcessorError> {
        let logger = self.logger;
        let RenamePair { first, second } = &self.config.rename_pair;

        Self::frame_at(&mut self.frame, self.stage, "rename columns", Stage::Ingested)
            .and_then(|df| df.swap_columns(first, second))
            .inspect_err(|e| logger.error(format_args!("Failed to swap columns. Error: {e}")))?;

        logger.info(format_args!("Swapped columns: {first} with {second}"));
        self.stage = self.stage.max(Stage::Renamed);
        Ok(())
    }

    /// Normalizes the magnitude and value columns.
    ///
    /// * every value in the magnitude column becomes its absolute value;
    /// * every value in the value column is mapped through the substitution table
    ///   and trimmed of surrounding whitespace.
    ///
    /// Column names default to [`ProcessorConfig::value_column`] and
    /// [`ProcessorConfig::magnitude_column`] and can be overridden per call.
    ///
    /// ```ignore
    /// processor.apply_corrections().call()?;
    /// processor
    ///     .apply_corrections()
    ///     .value_column("Soil_type")
    ///     .magnitude_column("Slope")
    ///     .call()?;
    /// ```
    ///
    /// # Errors
    ///
    /// [`ProcessorError::ColumnNotFound`] for missing columns and
    /// [`ProcessorError::TypeMismatch`] when the magnitude column is not numeric or
    /// the value column is not text.
    #[builder]
    pub fn apply_corrections(
        &mut self,
        value_column: Option<&str>,
        magnitude_column: Option<&str>,
    ) -> Result<(), ProcessorError> {
        let logger = self.logger;
        let value_column = value_column.unwrap_or(self.config.value_column.as_str());
        let magnitude_column = magnitude_column.unwrap_or(self.config.magnitude_column.as_str());
        let table = &self.config.value_substitution_table;

        Self::frame_at(
            &mut self.frame,
            self.stage,
            "apply corrections",
            Stage::Renamed,
        )
        .and_then(|df| {
            df.absolute_values(magnitude_column)?;
            df.substitute_and_trim(value_column, table)
        })
        .inspect_err(|e| {
            logger.error(format_args!("Failed to apply corrections. Error: {e}"))
        })?;

        logger.debug(format_args!(
            "Took absolute values of '{magnitude_column}', mapped {} substitutions over '{value_column}'",
            table.len()
        ));
        logger.info(format_args!("Corrections applied."));
        self.stage = self.stage.max(Stage::Corrected);
        Ok(())
    }

    /// Fetches the weather station mapping table and inner-joins it onto the working
    /// dataset over every shared column name.
    ///
    /// # Errors
    ///
    /// Gateway errors for the download, [`ProcessorError::Join`] if the tables share
    /// no column, and [`ProcessorError::EmptyResult`] if no row matches.
    pub fn map_weather_stations(&mut self) -> Result<(), ProcessorError> {
        let logger = self.logger;
        let url = &self.config.remote_mapping_url;
        let gateway = &self.gateway;

        let df = Self::frame_at(
            &mut self.frame,
            self.stage,
            "map weather stations",
            Stage::Corrected,
        )
        .inspect_err(|e| {
            logger.error(format_args!("Failed to map weather stations. Error: {e}"))
        })?;

        let mapping = gateway.fetch_remote_table(url).inspect_err(|e| {
            logger.error(format_args!("Failed to read mapping from {url}. Error: {e}"))
        })?;
        logger.debug(format_args!(
            "Joining on shared columns {:?}",
            df.shared_columns(&mapping)
        ));

        let rows_before = df.height();
        let joined = df.natural_join(&mapping).inspect_err(|e| {
            logger.error(format_args!("Failed to map weather stations. Error: {e}"))
        })?;
        logger.info(format_args!(
            "Mapped weather stations: {} of {rows_before} rows matched.",
            joined.height()
        ));

        *df = joined;
        self.stage = self.stage.max(Stage::Mapped);
        Ok(())
    }

    /// Drops the configured artifact column if the dataset has it.
    pub fn finalize(&mut self) -> Result<(), ProcessorError> {
        let logger = self.logger;
        let artifact = &self.config.artifact_column;

        let dropped = Self::frame_at(&mut self.frame, self.stage, "finalize", Stage::Mapped)
            .and_then(|df| df.drop_if_present(artifact))
            .inspect_err(|e| logger.error(format_args!("Failed to finalize. Error: {e}")))?;
        if dropped {
            logger.debug(format_args!("Dropped artifact column '{artifact}'"));
        }

        self.stage = Stage::Finalized;
        Ok(())
    }

    /// Runs every step in order and returns the finished dataset.
    ///
    /// The first failing step aborts the run. The working dataset is then discarded
    /// and the stage goes back to [`Stage::Uninitialized`]; the connection is kept
    /// so a retry does not reconnect.
    pub fn process(&mut self) -> Result<&DataFrame, ProcessorError> {
        let outcome = self
            .ingest()
            .and_then(|_| self.rename_columns())
            .and_then(|_| self.apply_corrections().call())
            .and_then(|_| self.map_weather_stations())
            .and_then(|_| self.finalize());

        if let Err(e) = outcome {
            self.frame = None;
            self.stage = Stage::Uninitialized;
            self.logger
                .error(format_args!("Data processing aborted. Error: {e}"));
            return Err(e);
        }

        self.logger
            .info(format_args!("Data processing completed successfully."));
        match &self.frame {
            Some(df) => Ok(df),
            None => Err(ProcessorError::InvalidState {
                operation: "process",
                required: Stage::Finalized,
                actual: self.stage,
            }),
        }
    }

    /// Closes the data store connection, if open. A later
    /// [`FieldDataProcessor::ingest`] opens a new one.
    pub fn shutdown(&mut self) -> Result<(), ProcessorError> {
        let logger = self.logger;
        if let Some(connection) = self.connection.take() {
            self.gateway.close(connection).inspect_err(|e| {
                logger.error(format_args!("Failed to close connection. Error: {e}"))
            })?;
            logger.info(format_args!("Database connection closed."));
        }
        Ok(())
    }
}
