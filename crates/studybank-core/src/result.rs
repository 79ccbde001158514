// crates/studybank-core/src/result.rs
// ============================================================================
// Module: Query Result Values
// Description: Scalar values, rows, and query outcomes returned by backends.
// Purpose: Give every backend a single immutable result shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`QueryResult`] is the complete outcome of one statement: the rows in
//! backend order, the number of rows affected, and the generated row id for
//! inserts. Results are plain values; callers receive copies and never share
//! mutable state with the cache that may also hold them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Severity;
use crate::error::StoreError;

// ============================================================================
// SECTION: Values
// ============================================================================

/// Scalar value bound as a statement parameter or read back from a row.
///
/// # Invariants
/// - Serialized untagged so rows render as plain JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`.
    #[default]
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the integer payload when the value is an integer.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload when the value is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true for SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Rough heap and inline footprint used for cache memory estimates.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Self::Null | Self::Integer(_) | Self::Real(_) => 8,
            Self::Text(value) => value.len() + 24,
            Self::Blob(value) => value.len() + 24,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One result row keyed by column name.
pub type Row = BTreeMap<String, SqlValue>;

// ============================================================================
// SECTION: Query Result
// ============================================================================

/// Outcome of a single statement.
///
/// # Invariants
/// - `rows` preserve the order produced by the backend.
/// - Values are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<T = Row> {
    /// Returned rows in backend order.
    pub rows: Vec<T>,
    /// Number of rows changed by the statement.
    pub rows_affected: u64,
    /// Row id generated by an insert, when any.
    pub insert_id: Option<i64>,
}

impl<T> QueryResult<T> {
    /// Builds a result carrying rows only.
    #[must_use]
    pub const fn from_rows(rows: Vec<T>) -> Self {
        Self {
            rows,
            rows_affected: 0,
            insert_id: None,
        }
    }

    /// Builds a result for a statement that returned no rows.
    #[must_use]
    pub const fn affected(rows_affected: u64, insert_id: Option<i64>) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
            insert_id,
        }
    }

    /// Builds an empty result (no rows, nothing affected).
    #[must_use]
    pub const fn empty() -> Self {
        Self::affected(0, None)
    }

    /// Returns true when the statement produced no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Applies `map` to each row, keeping the counters.
    #[must_use]
    pub fn map_rows<U>(self, map: impl FnMut(T) -> U) -> QueryResult<U> {
        QueryResult {
            rows: self.rows.into_iter().map(map).collect(),
            rows_affected: self.rows_affected,
            insert_id: self.insert_id,
        }
    }
}

impl QueryResult<Row> {
    /// Decodes every row into `U` through its serde representation.
    ///
    /// # Errors
    ///
    /// Returns a [`Severity::High`] [`StoreError`] when a row does not match
    /// the shape of `U`.
    pub fn decode<U: DeserializeOwned>(&self) -> Result<QueryResult<U>, StoreError> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (index, row) in self.rows.iter().enumerate() {
            let value = serde_json::to_value(row).map_err(|err| decode_error(index, &err))?;
            rows.push(serde_json::from_value(value).map_err(|err| decode_error(index, &err))?);
        }
        Ok(QueryResult {
            rows,
            rows_affected: self.rows_affected,
            insert_id: self.insert_id,
        })
    }

    /// Returns a value from the first row, when present.
    #[must_use]
    pub fn first_value(&self, column: &str) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.get(column))
    }

    /// Rough footprint of the result used for cache memory estimates.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.rows
            .iter()
            .map(|row| {
                row.iter().map(|(column, value)| column.len() + value.estimated_bytes()).sum::<usize>()
            })
            .sum::<usize>()
            + 32
    }
}

/// Builds the error reported when a row cannot be decoded.
fn decode_error(index: usize, error: &serde_json::Error) -> StoreError {
    StoreError::new("failed to decode query row", "DECODE", Severity::High, &error.to_string())
        .with_context("row_index", index)
}

// ============================================================================
// SECTION: Batch Statements
// ============================================================================

/// Statement text plus parameters executed as part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatement {
    /// Statement text.
    pub text: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

impl BatchStatement {
    /// Builds a batch statement.
    #[must_use]
    pub fn new(text: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use serde::Deserialize;

    use super::QueryResult;
    use super::Row;
    use super::SqlValue;

    /// Typed row used by decode tests.
    #[derive(Debug, Deserialize, PartialEq)]
    struct Question {
        /// Question identifier.
        id: String,
        /// Attempt counter.
        attempts: i64,
    }

    #[test]
    fn decode_maps_rows_into_typed_values() {
        let mut row = Row::new();
        row.insert("id".to_string(), SqlValue::from("Q1"));
        row.insert("attempts".to_string(), SqlValue::from(3_i64));
        let result = QueryResult::from_rows(vec![row]);
        let decoded = result.decode::<Question>().unwrap();
        assert_eq!(
            decoded.rows,
            vec![Question {
                id: "Q1".to_string(),
                attempts: 3
            }]
        );
    }

    #[test]
    fn decode_reports_row_index_on_mismatch() {
        let mut row = Row::new();
        row.insert("id".to_string(), SqlValue::Integer(1));
        let result = QueryResult::from_rows(vec![row]);
        let error = result.decode::<Question>().unwrap_err();
        assert_eq!(error.code(), "DECODE");
        assert_eq!(error.context_value("row_index"), Some(&serde_json::json!(0)));
    }

    #[test]
    fn values_serialize_as_plain_json() {
        let json = serde_json::to_string(&vec![
            SqlValue::Null,
            SqlValue::Integer(2),
            SqlValue::Text("x".to_string()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,2,"x"]"#);
    }
}
