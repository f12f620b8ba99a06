//! Row data carried by result set parts.

use std::sync::Arc;

/// Column description of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Server type name (e.g. `Int32`, `Optional<Utf8>`)
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A single column value as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One row of a result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at a zero-based column index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }
}

/// One server-pushed chunk of rows sharing a column schema.
///
/// Batches are the unit of flow control: the result queue bounds the number of
/// batches, not the number of rows.
#[derive(Debug, Clone)]
pub struct RowBatch {
    columns: Arc<[ColumnInfo]>,
    rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(columns: Arc<[ColumnInfo]>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Column schema of this batch.
    pub fn columns(&self) -> &Arc<[ColumnInfo]> {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows in the batch.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}
