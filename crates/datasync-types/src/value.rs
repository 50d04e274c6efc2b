//! SQL value model exchanged between the execution surface and callers.

use serde::{Deserialize, Serialize};

/// A single SQL column value.
///
/// Mirrors SQLite's storage classes. Serialized with an explicit tag so
/// forwarded writes and UI layers can decode values without guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ColumnValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<ColumnValue>,
}

/// Result of one SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, empty for statements that return no rows.
    pub columns: Vec<String>,
    /// Result rows, empty for mutating statements.
    pub rows: Vec<Row>,
    /// Rows changed by a mutating statement.
    pub affected_rows: u64,
    /// Rowid of the last insert, for mutating statements.
    pub last_insert_id: Option<i64>,
    /// Wall-clock execution time.
    pub execution_time_ms: f64,
}

impl QueryResult {
    /// An empty result for statements that produced neither rows nor changes.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            last_insert_id: None,
            execution_time_ms: 0.0,
        }
    }
}
