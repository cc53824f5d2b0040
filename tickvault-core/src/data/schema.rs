use polars::prelude::*;

/// Column layout of an archived bar series.
pub struct BarSchema;

impl BarSchema {
    pub const COLUMNS: [&'static str; 7] =
        ["timestamp", "symbol", "open", "high", "low", "close", "volume"];

    /// Get the canonical bar schema
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("timestamp".into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
            Field::new("symbol".into(), DataType::String),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::Float64),
        ])
    }

    /// Validate DataFrame against schema
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
