//! Read-only view of the self-describing payload tree delivered by the transport.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime, Time};

/// Datatype tag declared by every element.
///
/// Numeric codes follow the transport's own numbering so that unknown tags can
/// be reported verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Char,
    Byte,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    ByteArray,
    Date,
    Time,
    Decimal,
    Datetime,
    Enumeration,
    Sequence,
    Choice,
    CorrelationId,
    Unknown(i32),
}

impl DataType {
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::Byte,
            4 => Self::Int32,
            5 => Self::Int64,
            6 => Self::Float32,
            7 => Self::Float64,
            8 => Self::String,
            9 => Self::ByteArray,
            10 => Self::Date,
            11 => Self::Time,
            12 => Self::Decimal,
            13 => Self::Datetime,
            14 => Self::Enumeration,
            15 => Self::Sequence,
            16 => Self::Choice,
            17 => Self::CorrelationId,
            other => Self::Unknown(other),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            Self::Bool => 1,
            Self::Char => 2,
            Self::Byte => 3,
            Self::Int32 => 4,
            Self::Int64 => 5,
            Self::Float32 => 6,
            Self::Float64 => 7,
            Self::String => 8,
            Self::ByteArray => 9,
            Self::Date => 10,
            Self::Time => 11,
            Self::Decimal => 12,
            Self::Datetime => 13,
            Self::Enumeration => 14,
            Self::Sequence => 15,
            Self::Choice => 16,
            Self::CorrelationId => 17,
            Self::Unknown(code) => code,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Char => "CHAR",
            Self::Byte => "BYTE",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
            Self::String => "STRING",
            Self::ByteArray => "BYTEARRAY",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Decimal => "DECIMAL",
            Self::Datetime => "DATETIME",
            Self::Enumeration => "ENUMERATION",
            Self::Sequence => "SEQUENCE",
            Self::Choice => "CHOICE",
            Self::CorrelationId => "CORRELATION_ID",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Datetime)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Scalar carried by a leaf element, exactly as the transport hands it over.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Bool(bool),
    Char(char),
    Byte(u8),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
    String(String),
    Date(Date),
    Time(Time),
    Decimal(f64),
    Datetime(PrimitiveDateTime),
    Enumeration(String),
}

impl RawValue {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Char(_) => "char",
            Self::Byte(_) => "byte",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Decimal(_) => "decimal",
            Self::Datetime(_) => "datetime",
            Self::Enumeration(_) => "enumeration",
        }
    }
}

/// Node of a hierarchical payload.
///
/// Handles are expected to be cheap to clone; child accessors return owned
/// handles so that SDK bindings backed by opaque pointers can implement the
/// trait without borrowing from the parent.
///
/// For array elements `num_values`/`value_at` address the repeated entries;
/// for everything else `num_elements`/`element_at`/`get_element` address the
/// named children.
pub trait Element: Clone {
    fn name(&self) -> &str;

    fn datatype(&self) -> DataType;

    fn is_array(&self) -> bool;

    fn is_null(&self) -> bool;

    fn num_values(&self) -> usize;

    fn value_at(&self, index: usize) -> Option<Self>;

    fn num_elements(&self) -> usize;

    fn element_at(&self, index: usize) -> Option<Self>;

    fn get_element(&self, name: &str) -> Option<Self>;

    /// Leaf scalar; `None` for null, sequence, choice and array elements.
    fn raw_value(&self) -> Option<RawValue>;

    fn has_element(&self, name: &str) -> bool {
        self.get_element(name).is_some()
    }
}
