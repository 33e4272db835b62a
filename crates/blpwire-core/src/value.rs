use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime};

/// Native value produced by decoding an element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent value: missing child, null temporal, or a cell never received.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    Date(Date),
    Datetime(PrimitiveDateTime),
    Table(Table),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(value) => Some(*value),
            Self::Datetime(value) => Some(value.date()),
            _ => None,
        }
    }

    pub const fn as_datetime(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::Datetime(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Datetime(_) => "datetime",
            Self::Table(_) => "table",
        }
    }

    /// Ordering used to sort frame indexes: nulls first, then temporal values
    /// chronologically, then everything else by rendered text.
    pub fn index_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (a, b) => match (a.sort_instant(), b.sort_instant()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => a.to_string().cmp(&b.to_string()),
            },
        }
    }

    fn sort_instant(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::Date(date) => Some(date.midnight()),
            Self::Datetime(value) => Some(*value),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NaN"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            Self::String(value) => f.write_str(value),
            Self::Date(value) => write!(f, "{value}"),
            Self::Datetime(value) => write!(f, "{value}"),
            Self::Table(table) => write!(f, "<table {}x{}>", table.num_rows(), table.columns.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::Datetime(value)
    }
}

/// Column-oriented table decoded from a sequence array.
///
/// Column order is fixed by the first row. Columns that later rows omit are
/// not back-filled, so columns may have different lengths.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    data: HashMap<String, Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for column in columns {
            table.add_column(column.into());
        }
        table
    }

    /// Registers a column; a no-op if it already exists.
    pub fn add_column(&mut self, name: String) {
        if !self.data.contains_key(&name) {
            self.data.insert(name.clone(), Vec::new());
            self.columns.push(name);
        }
    }

    /// Appends a cell. Columns not registered up front are created on demand
    /// but stay out of the declared column order.
    pub fn push(&mut self, column: &str, value: Value) {
        self.data.entry(column.to_owned()).or_default().push(value);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.data.get(name).map(Vec::as_slice)
    }

    pub fn num_rows(&self) -> usize {
        self.columns
            .iter()
            .filter_map(|name| self.data.get(name))
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Cell at (row, column); `Value::Null` for short columns.
    pub fn cell(&self, row: usize, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.data
            .get(column)
            .and_then(|values| values.get(row))
            .unwrap_or(&NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn table_keeps_declared_column_order() {
        let mut table = Table::with_columns(["b", "a"]);
        table.push("a", Value::Int(1));
        table.push("b", Value::Int(2));
        table.push("a", Value::Int(3));

        assert_eq!(table.columns(), ["b", "a"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.cell(1, "b"), &Value::Null);
        assert_eq!(table.cell(1, "a"), &Value::Int(3));
    }

    #[test]
    fn index_ordering_sorts_dates_chronologically() {
        let mut values = vec![
            Value::Date(date!(2024 - 03 - 01)),
            Value::Null,
            Value::Datetime(datetime!(2024-01-15 10:00)),
            Value::Date(date!(2023 - 12 - 31)),
        ];
        values.sort_by(Value::index_cmp);

        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Date(date!(2023 - 12 - 31)),
                Value::Datetime(datetime!(2024-01-15 10:00)),
                Value::Date(date!(2024 - 03 - 01)),
            ]
        );
    }
}
