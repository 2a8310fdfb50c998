use crate::error::ProcessorError;
use log::{debug, info, warn};
use polars::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, ConnectOptions, Connection as _, Row, TypeInfo, ValueRef};
use std::collections::HashSet;
use std::str::FromStr;
use tokio::runtime::{Builder, Runtime};

/// An open, read-only connection to a SQLite data store.
///
/// sqlx is async, so the connection carries its own single-threaded runtime and
/// blocks on every call. The connection is closed when this value is dropped or
/// passed to [`SqlConnection::close`].
pub struct SqlConnection {
    // Declared before `runtime` so it is dropped first.
    inner: SqliteConnection,
    runtime: Runtime,
    locator: String,
}

/// A single cell as SQLite stored it.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    fn into_text(self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(v.to_string()),
            SqlValue::Text(v) => Some(v),
        }
    }
}

impl SqlConnection {
    pub(crate) fn open(locator: &str) -> Result<Self, ProcessorError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ProcessorError::RuntimeInit(locator.to_string(), e))?;

        let connection_error = |source| ProcessorError::Connection {
            locator: locator.to_string(),
            source,
        };
        let options = SqliteConnectOptions::from_str(locator)
            .map_err(connection_error)?
            .read_only(true);
        let inner = runtime
            .block_on(options.connect())
            .map_err(connection_error)?;

        info!("Connected to data store {}", locator);
        Ok(Self {
            inner,
            runtime,
            locator: locator.to_string(),
        })
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Runs `query` and turns the full result set into a `DataFrame`.
    pub(crate) fn query_frame(&mut self, query: &str) -> Result<DataFrame, ProcessorError> {
        debug!("Executing query: {}", query);
        let rows = self
            .runtime
            .block_on(sqlx::query(query).fetch_all(&mut self.inner))
            .map_err(|e| ProcessorError::Query {
                query: query.to_string(),
                source: e,
            })?;

        if rows.is_empty() {
            warn!("Query returned no rows: {}", query);
            return Err(ProcessorError::EmptyResult {
                operation: "Retrieval query",
            });
        }

        let df = rows_to_dataframe(&rows, query)?;
        info!("Query returned {} rows and {} columns", df.height(), df.width());
        Ok(df)
    }

    pub(crate) fn close(self) -> Result<(), ProcessorError> {
        let SqlConnection {
            inner,
            runtime,
            locator,
        } = self;
        runtime
            .block_on(inner.close())
            .map_err(|source| ProcessorError::Connection {
                locator: locator.clone(),
                source,
            })?;
        debug!("Closed connection to {}", locator);
        Ok(())
    }
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    // SQLite is dynamically typed, so go by the storage class of this cell rather
    // than by the declared column type.
    let storage_class = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get(index)?),
        "REAL" | "NUMERIC" => SqlValue::Real(row.try_get(index)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => SqlValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

/// Builds one polars column from a column's worth of cells.
///
/// Integer-only columns become Int64, integer/real mixes become Float64, and a
/// column holding any text (or nothing but nulls) becomes String.
fn build_column(name: &str, values: Vec<SqlValue>) -> Column {
    let all_null = values.iter().all(|v| *v == SqlValue::Null);
    let all_integer = values
        .iter()
        .all(|v| matches!(v, SqlValue::Null | SqlValue::Integer(_)));
    let all_numeric = values.iter().all(|v| !matches!(v, SqlValue::Text(_)));

    if !all_null && all_integer {
        let ints: Vec<Option<i64>> = values
            .into_iter()
            .map(|v| match v {
                SqlValue::Integer(i) => Some(i),
                _ => None,
            })
            .collect();
        Column::new(name.into(), ints)
    } else if !all_null && all_numeric {
        let floats: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| match v {
                SqlValue::Integer(i) => Some(i as f64),
                SqlValue::Real(f) => Some(f),
                _ => None,
            })
            .collect();
        Column::new(name.into(), floats)
    } else {
        let texts: Vec<Option<String>> = values.into_iter().map(SqlValue::into_text).collect();
        Column::new(name.into(), texts)
    }
}

fn rows_to_dataframe(rows: &[SqliteRow], query: &str) -> Result<DataFrame, ProcessorError> {
    let Some(first) = rows.first() else {
        return Err(ProcessorError::EmptyResult {
            operation: "Retrieval query",
        });
    };

    let names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut seen = HashSet::new();
    if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(ProcessorError::DuplicateColumn {
            column: duplicate.clone(),
        });
    }

    let mut cells: Vec<Vec<SqlValue>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in rows {
        for (index, column_cells) in cells.iter_mut().enumerate() {
            let value = decode_value(row, index).map_err(|e| ProcessorError::Query {
                query: query.to_string(),
                source: e,
            })?;
            column_cells.push(value);
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .zip(cells)
        .map(|(name, values)| build_column(name, values))
        .collect();
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::seed_sqlite;
    use tempfile::tempdir;

    const SURVEY_TABLE: [&str; 3] = [
        "CREATE TABLE geographic_features (Field_ID INTEGER, Elevation REAL, Crop_type TEXT)",
        "INSERT INTO geographic_features VALUES (1, -430, ' cassaval '), (2, 512.5, 'tea')",
        "CREATE TABLE empty_features (Field_ID INTEGER)",
    ];

    #[test]
    fn test_query_materializes_typed_columns() -> Result<(), ProcessorError> {
        let dir = tempdir().expect("temp dir");
        let locator = seed_sqlite(dir.path(), &SURVEY_TABLE);

        let mut connection = SqlConnection::open(&locator)?;
        assert_eq!(connection.locator(), locator);
        let df = connection.query_frame("SELECT * FROM geographic_features")?;

        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("Field_ID")?.dtype(), &DataType::Int64);
        assert_eq!(df.column("Elevation")?.dtype(), &DataType::Float64);
        assert_eq!(df.column("Crop_type")?.dtype(), &DataType::String);
        assert_eq!(df.column("Elevation")?.f64()?.get(0), Some(-430.0));
        assert_eq!(df.column("Crop_type")?.str()?.get(0), Some(" cassaval "));

        connection.close()?;
        Ok(())
    }

    #[test]
    fn test_mixed_storage_classes() -> Result<(), ProcessorError> {
        let dir = tempdir().expect("temp dir");
        let locator = seed_sqlite(dir.path(), &SURVEY_TABLE);
        let mut connection = SqlConnection::open(&locator)?;

        let df = connection.query_frame(
            "SELECT 1 AS n, 'a' AS t, NULL AS empty UNION ALL SELECT 2.5, 7, NULL",
        )?;
        assert_eq!(df.column("n")?.dtype(), &DataType::Float64);
        assert_eq!(df.column("t")?.dtype(), &DataType::String);
        assert_eq!(df.column("t")?.str()?.get(1), Some("7"));
        assert_eq!(df.column("empty")?.null_count(), 2);
        Ok(())
    }

    #[test]
    fn test_empty_result_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let locator = seed_sqlite(dir.path(), &SURVEY_TABLE);
        let mut connection = SqlConnection::open(&locator).expect("connect");

        let err = connection
            .query_frame("SELECT * FROM empty_features")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[test]
    fn test_query_errors() {
        let dir = tempdir().expect("temp dir");
        let locator = seed_sqlite(dir.path(), &SURVEY_TABLE);
        let mut connection = SqlConnection::open(&locator).expect("connect");

        let err = connection.query_frame("SELEC nonsense").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);

        let err = connection
            .query_frame("SELECT Field_ID, Field_ID FROM geographic_features")
            .unwrap_err();
        assert!(matches!(err, ProcessorError::DuplicateColumn { .. }));
        assert_eq!(err.kind(), ErrorKind::Query);

        // Connections are read-only.
        let err = connection
            .query_frame("INSERT INTO empty_features VALUES (1)")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[test]
    fn test_missing_database_fails_to_connect() {
        let dir = tempdir().expect("temp dir");
        let locator = format!("sqlite://{}", dir.path().join("missing.db").display());

        let err = SqlConnection::open(&locator).err().expect("connect must fail");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
