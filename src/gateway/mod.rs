//! Access to the two external data sources: the survey data store and the remote
//! weather station mapping CSV.

pub(crate) mod remote;
pub(crate) mod sql;

use crate::error::ProcessorError;
use polars::prelude::DataFrame;
use reqwest::blocking::Client;

pub use sql::SqlConnection;

/// The I/O a [`crate::FieldDataProcessor`] needs from the outside world.
///
/// [`SqlGateway`] is the production implementation. Everything is blocking; a
/// gateway call returns only once its data is fully materialized.
pub trait DataGateway {
    /// An open handle to the data store.
    type Connection;

    /// Opens a connection to the data store at `locator`.
    ///
    /// # Errors
    ///
    /// Fails with an [`crate::ErrorKind::Connection`] error if the store is unreachable
    /// or the locator is malformed.
    fn connect(&self, locator: &str) -> Result<Self::Connection, ProcessorError>;

    /// Runs a read query and materializes every row.
    ///
    /// # Errors
    ///
    /// * [`crate::ErrorKind::EmptyResult`] if the query returns zero rows.
    /// * [`crate::ErrorKind::Query`] for malformed queries or store-side failures.
    fn execute_query(
        &self,
        connection: &mut Self::Connection,
        query: &str,
    ) -> Result<DataFrame, ProcessorError>;

    /// Downloads a header-first, comma-separated table.
    ///
    /// # Errors
    ///
    /// Fails with an [`crate::ErrorKind::MalformedResource`] error if the resource is
    /// unreachable, cannot be parsed, or has no rows or no columns.
    fn fetch_remote_table(&self, url: &str) -> Result<DataFrame, ProcessorError>;

    /// Releases a connection. Dropping it has the same effect, minus error reporting.
    fn close(&self, connection: Self::Connection) -> Result<(), ProcessorError> {
        drop(connection);
        Ok(())
    }
}

/// Gateway backed by sqlx (SQLite) for queries and a blocking reqwest client for
/// the remote CSV.
pub struct SqlGateway {
    download_client: Client,
}

impl SqlGateway {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Uses a preconfigured HTTP client, e.g. one with timeouts or proxy settings.
    pub fn with_client(download_client: Client) -> Self {
        Self { download_client }
    }
}

impl Default for SqlGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DataGateway for SqlGateway {
    type Connection = SqlConnection;

    fn connect(&self, locator: &str) -> Result<SqlConnection, ProcessorError> {
        SqlConnection::open(locator)
    }

    fn execute_query(
        &self,
        connection: &mut SqlConnection,
        query: &str,
    ) -> Result<DataFrame, ProcessorError> {
        connection.query_frame(query)
    }

    fn fetch_remote_table(&self, url: &str) -> Result<DataFrame, ProcessorError> {
        remote::fetch_csv_table(&self.download_client, url)
    }

    fn close(&self, connection: SqlConnection) -> Result<(), ProcessorError> {
        connection.close()
    }
}
