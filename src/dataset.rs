//! Column-level operations the pipeline applies to its working `DataFrame`.

use crate::error::ProcessorError;
use polars::prelude::*;
use std::collections::HashMap;

const ROW_ORDER_NAME: &str = "__row_order__";

pub trait FieldFrameExt {
    /// Exchanges the names of two columns. Values keep their row alignment and their
    /// position, so the data under `first` ends up labelled `second` and vice versa.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::ColumnNotFound`] if either column is missing.
    fn swap_columns(&mut self, first: &str, second: &str) -> Result<(), ProcessorError>;

    /// Replaces every value in a numeric column with its absolute value.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::ColumnNotFound`] for a missing column,
    /// [`ProcessorError::TypeMismatch`] for a non-numeric one, and
    /// [`ProcessorError::MagnitudeOverflow`] if a signed integer column holds its
    /// type's minimum, which has no positive counterpart.
    fn absolute_values(&mut self, column: &str) -> Result<(), ProcessorError>;

    /// Maps values of a string column through `table`, then trims surrounding
    /// whitespace from every value.
    ///
    /// The raw value is looked up first. If it is not a key, the trimmed value is
    /// tried, so `" cassaval "` matches a `"cassaval"` key. Values found under
    /// neither are only trimmed. Nulls stay null.
    fn substitute_and_trim(
        &mut self,
        column: &str,
        table: &HashMap<String, String>,
    ) -> Result<(), ProcessorError>;

    /// Names present in both frames, in the order they appear in `self`.
    fn shared_columns(&self, other: &DataFrame) -> Vec<String>;

    /// Inner join on every column name the two frames share.
    ///
    /// Key columns of `other` are cast to the dtypes they have in `self` before
    /// joining. Rows of `other` whose key tuple matches some row of `self` must not
    /// repeat that tuple, which keeps the result at most as tall as `self`. Repeats
    /// among unmatched rows are ignored since the join drops them anyway.
    ///
    /// A null key never matches anything, including another null, so rows with a
    /// null in any key column are dropped from the result.
    ///
    /// # Errors
    ///
    /// * [`ProcessorError::Join`] if no column is shared or a matched key repeats in
    ///   `other`.
    /// * [`ProcessorError::EmptyResult`] if no row survives the join.
    fn natural_join(&self, other: &DataFrame) -> Result<DataFrame, ProcessorError>;

    /// Drops `column` if it exists. Returns whether anything was dropped.
    fn drop_if_present(&mut self, column: &str) -> Result<bool, ProcessorError>;
}

fn require_column(
    df: &DataFrame,
    column: &str,
    operation: &'static str,
) -> Result<DataType, ProcessorError> {
    df.column(column)
        .map(|c| c.dtype().clone())
        .map_err(|_| ProcessorError::ColumnNotFound {
            column: column.to_string(),
            operation,
        })
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn signed_integer_min(dtype: &DataType) -> Option<i64> {
    match dtype {
        DataType::Int8 => Some(i8::MIN.into()),
        DataType::Int16 => Some(i16::MIN.into()),
        DataType::Int32 => Some(i32::MIN.into()),
        DataType::Int64 => Some(i64::MIN),
        _ => None,
    }
}

/// A column name that does not collide with anything in `df`.
fn unused_column_name(df: &DataFrame, base: &str) -> String {
    let mut name = base.to_string();
    while df.get_column_index(&name).is_some() {
        name.push('_');
    }
    name
}

impl FieldFrameExt for DataFrame {
    fn swap_columns(&mut self, first: &str, second: &str) -> Result<(), ProcessorError> {
        require_column(self, first, "swap columns")?;
        require_column(self, second, "swap columns")?;
        if first == second {
            return Ok(());
        }

        // All names are replaced at once; renaming one at a time would collide.
        let names: Vec<PlSmallStr> = self
            .get_column_names()
            .into_iter()
            .map(|name| match name.as_str() {
                n if n == first => second.into(),
                n if n == second => first.into(),
                _ => name.clone(),
            })
            .collect();
        self.set_column_names(names)?;
        Ok(())
    }

    fn absolute_values(&mut self, column: &str) -> Result<(), ProcessorError> {
        let dtype = require_column(self, column, "take absolute values")?;
        if !is_numeric(&dtype) {
            return Err(ProcessorError::TypeMismatch {
                column: column.to_string(),
                expected: "numeric",
                found: dtype,
            });
        }
        // Unsigned values are already non-negative.
        if dtype.is_unsigned_integer() {
            return Ok(());
        }
        if let Some(type_min) = signed_integer_min(&dtype) {
            let column_min = self
                .column(column)?
                .as_materialized_series()
                .min::<i64>()?;
            if column_min == Some(type_min) {
                return Err(ProcessorError::MagnitudeOverflow {
                    column: column.to_string(),
                    dtype,
                });
            }
        }

        *self = self
            .clone()
            .lazy()
            .with_column(col(column).abs())
            .collect()?;
        Ok(())
    }

    fn substitute_and_trim(
        &mut self,
        column: &str,
        table: &HashMap<String, String>,
    ) -> Result<(), ProcessorError> {
        let dtype = require_column(self, column, "substitute values")?;
        if dtype != DataType::String {
            return Err(ProcessorError::TypeMismatch {
                column: column.to_string(),
                expected: "string",
                found: dtype,
            });
        }

        let corrected: StringChunked = self
            .column(column)?
            .str()?
            .into_iter()
            .map(|value| {
                value.map(|raw| {
                    table
                        .get(raw)
                        .or_else(|| table.get(raw.trim()))
                        .map(String::as_str)
                        .unwrap_or(raw)
                        .trim()
                        .to_string()
                })
            })
            .collect();

        self.with_column(corrected.with_name(column.into()).into_series())?;
        Ok(())
    }

    fn shared_columns(&self, other: &DataFrame) -> Vec<String> {
        self.get_column_names()
            .into_iter()
            .filter(|name| other.get_column_index(name.as_str()).is_some())
            .map(|name| name.to_string())
            .collect()
    }

    fn natural_join(&self, other: &DataFrame) -> Result<DataFrame, ProcessorError> {
        let shared = self.shared_columns(other);
        if shared.is_empty() {
            return Err(ProcessorError::Join(
                "the mapping table shares no column with the working dataset".to_string(),
            ));
        }

        let keys: Vec<Expr> = shared.iter().map(|name| col(name.as_str())).collect();

        let mut casts = Vec::new();
        for name in &shared {
            let left = self.column(name)?.dtype();
            if other.column(name)?.dtype() != left {
                casts.push(col(name.as_str()).cast(left.clone()));
            }
        }
        let mut right = other.clone().lazy();
        if !casts.is_empty() {
            right = right.with_columns(casts);
        }

        let matched = right
            .join(
                self.clone().lazy().select(keys.clone()),
                &keys,
                &keys,
                JoinArgs::new(JoinType::Semi),
            )
            .collect()?;
        let distinct_keys = matched
            .clone()
            .lazy()
            .group_by(keys.clone())
            .agg(Vec::<Expr>::new())
            .collect()?
            .height();
        if distinct_keys != matched.height() {
            return Err(ProcessorError::Join(format!(
                "the mapping table repeats keys over [{}]",
                shared.join(", ")
            )));
        }

        // Keep the working dataset's row order through the join.
        let mut row_order = unused_column_name(self, ROW_ORDER_NAME);
        while other.get_column_index(&row_order).is_some() {
            row_order.push('_');
        }
        let mut joined = self
            .clone()
            .lazy()
            .with_row_index(row_order.as_str(), None)
            .join(matched.lazy(), &keys, &keys, JoinArgs::new(JoinType::Inner))
            .sort([row_order.as_str()], Default::default())
            .collect()?;
        joined.drop_in_place(&row_order)?;

        if joined.height() == 0 {
            return Err(ProcessorError::EmptyResult {
                operation: "Weather station join",
            });
        }
        Ok(joined)
    }

    fn drop_if_present(&mut self, column: &str) -> Result<bool, ProcessorError> {
        if self.get_column_index(column).is_none() {
            return Ok(false);
        }
        self.drop_in_place(column)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn survey_frame() -> DataFrame {
        df!(
            "Field_ID" => [1i64, 2, 3],
            "Plot_ID" => [10i64, 20, 30],
            "Elevation" => [-430.5f64, 12.0, -0.25],
            "Crop_type" => [" cassaval ", "wheatn", "tea "],
        )
        .expect("valid frame")
    }

    fn substitutions() -> HashMap<String, String> {
        HashMap::from([
            ("cassaval".to_string(), "cassava".to_string()),
            ("wheatn".to_string(), "wheat".to_string()),
        ])
    }

    #[test]
    fn test_swap_moves_values_with_names() -> Result<(), ProcessorError> {
        let mut df = survey_frame();
        df.swap_columns("Field_ID", "Plot_ID")?;

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, ["Plot_ID", "Field_ID", "Elevation", "Crop_type"]);
        assert_eq!(df.column("Plot_ID")?.i64()?.get(0), Some(1));
        assert_eq!(df.column("Field_ID")?.i64()?.get(0), Some(10));
        Ok(())
    }

    #[test]
    fn test_swap_twice_restores_frame() -> Result<(), ProcessorError> {
        let original = survey_frame();
        let mut df = original.clone();
        df.swap_columns("Field_ID", "Plot_ID")?;
        df.swap_columns("Field_ID", "Plot_ID")?;
        assert!(df.equals(&original));
        Ok(())
    }

    #[test]
    fn test_swap_after_schema_is_cached() -> Result<(), ProcessorError> {
        let mut df = survey_frame();
        assert!(df.schema().contains("Plot_ID"));

        df.swap_columns("Plot_ID", "Field_ID")?;
        assert_eq!(df.schema().get("Field_ID"), Some(&DataType::Int64));
        assert_eq!(df.column("Field_ID")?.i64()?.get(2), Some(30));
        assert_eq!(df.column("Plot_ID")?.i64()?.get(2), Some(3));
        assert_eq!(df.width(), 4);
        Ok(())
    }

    #[test]
    fn test_swap_same_column_is_noop() -> Result<(), ProcessorError> {
        let original = survey_frame();
        let mut df = original.clone();
        df.swap_columns("Crop_type", "Crop_type")?;
        assert!(df.equals(&original));
        Ok(())
    }

    #[test]
    fn test_swap_missing_column() {
        let mut df = survey_frame();
        let err = df.swap_columns("Field_ID", "Missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }

    #[test]
    fn test_absolute_values_idempotent() -> Result<(), ProcessorError> {
        let mut df = survey_frame();
        df.absolute_values("Elevation")?;
        let once = df.clone();
        df.absolute_values("Elevation")?;

        assert!(df.equals(&once));
        let values: Vec<Option<f64>> = df.column("Elevation")?.f64()?.into_iter().collect();
        assert_eq!(values, [Some(430.5), Some(12.0), Some(0.25)]);
        Ok(())
    }

    #[test]
    fn test_absolute_values_keeps_integer_dtype_and_nulls() -> Result<(), ProcessorError> {
        let mut df = df!("Elevation" => [Some(-430i64), None, Some(7)])?;
        df.absolute_values("Elevation")?;
        let values: Vec<Option<i64>> = df.column("Elevation")?.i64()?.into_iter().collect();
        assert_eq!(values, [Some(430), None, Some(7)]);
        Ok(())
    }

    #[test]
    fn test_absolute_values_rejects_integer_minimum() -> Result<(), ProcessorError> {
        let mut df = df!("Elevation" => [i64::MIN, -5])?;
        let err = df.absolute_values("Elevation").unwrap_err();
        assert!(matches!(err, ProcessorError::MagnitudeOverflow { .. }));
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let mut df = df!("Elevation" => [i32::MIN, 4])?;
        assert!(df.absolute_values("Elevation").is_err());

        // One above the minimum still has a positive counterpart.
        let mut df = df!("Elevation" => [i64::MIN + 1])?;
        df.absolute_values("Elevation")?;
        assert_eq!(df.column("Elevation")?.i64()?.get(0), Some(i64::MAX));
        Ok(())
    }

    #[test]
    fn test_absolute_values_rejects_text() {
        let mut df = survey_frame();
        let err = df.absolute_values("Crop_type").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_substitute_and_trim() -> Result<(), ProcessorError> {
        let mut df = survey_frame();
        df.substitute_and_trim("Crop_type", &substitutions())?;

        let crops: Vec<Option<&str>> = df.column("Crop_type")?.str()?.into_iter().collect();
        assert_eq!(crops, [Some("cassava"), Some("wheat"), Some("tea")]);
        Ok(())
    }

    #[test]
    fn test_substitute_keeps_nulls_and_position() -> Result<(), ProcessorError> {
        let mut df = df!(
            "Crop_type" => [Some("  maize"), None],
            "Field_ID" => [1i64, 2],
        )?;
        df.substitute_and_trim("Crop_type", &substitutions())?;

        assert_eq!(df.get_column_index("Crop_type"), Some(0));
        let crops: Vec<Option<&str>> = df.column("Crop_type")?.str()?.into_iter().collect();
        assert_eq!(crops, [Some("maize"), None]);
        Ok(())
    }

    #[test]
    fn test_substitute_rejects_numeric_column() {
        let mut df = survey_frame();
        let err = df
            .substitute_and_trim("Elevation", &substitutions())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_natural_join_drops_unmatched_rows() -> Result<(), ProcessorError> {
        let df = survey_frame();
        let mapping = df!(
            "Field_ID" => [1i64, 3, 99],
            "Weather_station" => ["ST1", "ST3", "ST99"],
        )?;

        let joined = df.natural_join(&mapping)?;
        assert_eq!(joined.height(), 2);
        assert!(joined.height() <= df.height());
        assert_eq!(joined.width(), df.width() + 1);

        let stations: Vec<Option<&str>> = joined
            .column("Weather_station")?
            .str()?
            .into_iter()
            .collect();
        assert_eq!(stations, [Some("ST1"), Some("ST3")]);
        Ok(())
    }

    #[test]
    fn test_natural_join_casts_key_dtype() -> Result<(), ProcessorError> {
        let df = survey_frame();
        let mapping = df!(
            "Field_ID" => [1i32, 2],
            "Weather_station" => ["ST1", "ST2"],
        )?;
        let joined = df.natural_join(&mapping)?;
        assert_eq!(joined.height(), 2);
        assert_eq!(joined.column("Field_ID")?.dtype(), &DataType::Int64);
        Ok(())
    }

    #[test]
    fn test_natural_join_errors() -> Result<(), ProcessorError> {
        let df = survey_frame();

        let unrelated = df!("Station" => ["ST1"])?;
        assert_eq!(df.natural_join(&unrelated).unwrap_err().kind(), ErrorKind::Join);

        let no_match = df!("Field_ID" => [42i64], "Weather_station" => ["ST42"])?;
        assert_eq!(
            df.natural_join(&no_match).unwrap_err().kind(),
            ErrorKind::EmptyResult
        );

        let repeated = df!("Field_ID" => [1i64, 1], "Weather_station" => ["ST1", "ST2"])?;
        assert_eq!(df.natural_join(&repeated).unwrap_err().kind(), ErrorKind::Join);
        Ok(())
    }

    #[test]
    fn test_natural_join_ignores_repeats_outside_the_survey() -> Result<(), ProcessorError> {
        let df = df!("Field_ID" => [1i64, 2], "Elevation" => [10.0f64, 20.0])?;
        let mapping = df!(
            "Field_ID" => [1i64, 2, 99, 99],
            "Weather_station" => ["ST1", "ST2", "ST9", "ST9b"],
        )?;

        let joined = df.natural_join(&mapping)?;
        assert_eq!(joined.height(), 2);
        let stations: Vec<Option<&str>> = joined
            .column("Weather_station")?
            .str()?
            .into_iter()
            .collect();
        assert_eq!(stations, [Some("ST1"), Some("ST2")]);
        Ok(())
    }

    #[test]
    fn test_natural_join_null_keys_never_match() -> Result<(), ProcessorError> {
        let df = df!("Field_ID" => [Some(1i64), None], "Elevation" => [10.0f64, 20.0])?;
        let mapping = df!(
            "Field_ID" => [Some(1i64), None],
            "Weather_station" => ["ST1", "ST_null"],
        )?;

        let joined = df.natural_join(&mapping)?;
        assert_eq!(joined.height(), 1);
        assert_eq!(joined.column("Field_ID")?.i64()?.get(0), Some(1));
        Ok(())
    }

    #[test]
    fn test_drop_if_present() -> Result<(), ProcessorError> {
        let mut df = df!("Unnamed: 0" => [0i64, 1], "Field_ID" => [1i64, 2])?;
        assert!(df.drop_if_present("Unnamed: 0")?);
        assert!(!df.drop_if_present("Unnamed: 0")?);
        assert_eq!(df.width(), 1);
        Ok(())
    }
}
