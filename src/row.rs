use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SqlConduitError;
use crate::types::RowValues;

/// A single row from a query result.
///
/// Column names are shared across all rows of one result via `Arc`, with a
/// shared name→index cache so repeated lookups avoid string comparisons.
#[derive(Debug, Clone)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<RowValues>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Build a row from a shared column header and its values.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let cache = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );
        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    /// Build a row and its header in one step, for drivers that do not batch
    /// header construction.
    #[must_use]
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<RowValues>,
    {
        let (names, values): (Vec<String>, Vec<RowValues>) = pairs
            .into_iter()
            .map(|(n, v)| (n.into(), v.into()))
            .unzip();
        Self::new(Arc::new(names), values)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Value by column name, `None` when the column does not exist.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value by column position.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Decode a whole [`Row`] into a caller type, used by `getall`/`getrow`.
pub trait FromRow: Sized + Send {
    /// # Errors
    ///
    /// Returns [`SqlConduitError::Decode`] when the row does not fit.
    fn from_row(row: &Row) -> Result<Self, SqlConduitError>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self, SqlConduitError> {
        Ok(row.clone())
    }
}

/// Decode a single column value, used by `getval`/`getvals`.
pub trait FromValue: Sized + Send {
    /// # Errors
    ///
    /// Returns [`SqlConduitError::Decode`] when the value does not fit.
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError>;
}

fn decode_mismatch(expected: &str, got: &RowValues) -> SqlConduitError {
    SqlConduitError::Decode(format!("expected {expected}, got {got:?}"))
}

impl FromValue for RowValues {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        match value {
            RowValues::Int(i) => Ok(*i),
            // Identity columns can come back as exact numerics.
            RowValues::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            other => Err(decode_mismatch("integer", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        match value {
            RowValues::Float(f) => Ok(*f),
            RowValues::Int(i) => Ok(*i as f64),
            other => Err(decode_mismatch("float", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        match value {
            RowValues::Text(s) => Ok(s.clone()),
            other => Err(decode_mismatch("text", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        value
            .as_bool()
            .copied()
            .ok_or_else(|| decode_mismatch("bool", value))
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        value
            .as_timestamp()
            .ok_or_else(|| decode_mismatch("timestamp", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        match value {
            RowValues::Blob(bytes) => Ok(bytes.clone()),
            other => Err(decode_mismatch("blob", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        match value {
            RowValues::JSON(v) => Ok(v.clone()),
            other => Err(decode_mismatch("json", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &RowValues) -> Result<Self, SqlConduitError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
