//! Read-only tabular projection of a finished response.

use serde::Serialize;

use crate::value::Value;

/// Column-major grid with an index.
///
/// Every column holds exactly one cell per index entry; constructors pad
/// absent cells with [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame<K> {
    index_name: Option<String>,
    index: Vec<Value>,
    columns: Vec<K>,
    cells: Vec<Vec<Value>>,
}

impl<K: PartialEq> Frame<K> {
    pub(crate) fn new(index_name: Option<String>, index: Vec<Value>) -> Self {
        Self {
            index_name,
            index,
            columns: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Appends a column, truncating or padding it to the index length.
    pub(crate) fn push_column(&mut self, key: K, mut values: Vec<Value>) {
        values.resize(self.index.len(), Value::Null);
        self.columns.push(key);
        self.cells.push(values);
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub fn index(&self) -> &[Value] {
        &self.index
    }

    pub fn columns(&self) -> &[K] {
        &self.columns
    }

    pub fn column(&self, key: &K) -> Option<&[Value]> {
        self.columns
            .iter()
            .position(|candidate| candidate == key)
            .map(|position| self.cells[position].as_slice())
    }

    /// Cells of row `row` in column order.
    pub fn row(&self, row: usize) -> Option<Vec<&Value>> {
        if row >= self.index.len() {
            return None;
        }
        Some(self.cells.iter().map(|column| &column[row]).collect())
    }

    pub fn cell(&self, row: usize, key: &K) -> Option<&Value> {
        self.column(key).and_then(|column| column.get(row))
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
