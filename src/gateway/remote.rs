use crate::error::ProcessorError;
use log::{info, warn};
use polars::frame::DataFrame;
use polars::prelude::*;
use reqwest::blocking::Client;
use std::io::Write;
use tempfile::NamedTempFile;

/// Downloads a CSV file and parses it into a DataFrame.
pub(crate) fn fetch_csv_table(client: &Client, url: &str) -> Result<DataFrame, ProcessorError> {
    info!("Downloading table from {}", url);

    let response = client
        .get(url)
        .send()
        .map_err(|e| ProcessorError::NetworkRequest(url.to_string(), e))?;

    let response = match response.error_for_status() {
        Ok(resp) => resp,
        Err(e) => {
            warn!("HTTP error for {}: {:?}", url, e);
            return Err(if let Some(status) = e.status() {
                ProcessorError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                }
            } else {
                ProcessorError::NetworkRequest(url.to_string(), e)
            });
        }
    };

    let body = response
        .bytes()
        .map_err(|e| ProcessorError::NetworkRequest(url.to_string(), e))?;
    info!("Downloaded {} bytes from {}", body.len(), url);

    csv_to_dataframe(&body, url)
}

/// Parses header-first CSV bytes into a DataFrame.
///
/// The bytes are spooled to a temporary file so polars can read them with its
/// regular file reader.
pub(crate) fn csv_to_dataframe(bytes: &[u8], url: &str) -> Result<DataFrame, ProcessorError> {
    let io_error = |source| ProcessorError::CsvReadIo {
        url: url.to_string(),
        source,
    };
    let polars_error = |source| ProcessorError::CsvReadPolars {
        url: url.to_string(),
        source,
    };

    let mut temp_file = NamedTempFile::new().map_err(io_error)?;
    temp_file.write_all(bytes).map_err(io_error)?;
    temp_file.flush().map_err(io_error)?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))
        .map_err(polars_error)?
        .finish()
        .map_err(polars_error)?;

    if df.width() == 0 || df.height() == 0 {
        warn!("CSV from {} has shape {:?}", url, df.shape());
        return Err(ProcessorError::EmptyResource {
            url: url.to_string(),
        });
    }
    Ok(df)
}
