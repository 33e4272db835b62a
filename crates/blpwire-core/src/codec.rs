//! Element-to-value conversion engine.
//!
//! [`decode`] is total over the supported datatype tags and fails loudly on
//! anything else: a silently coerced value would corrupt the shape of every
//! table built on top of it.
//!
//! | Tag | Result |
//! |-----|--------|
//! | BOOL, CHAR, BYTE, INT32, INT64, FLOAT32, FLOAT64, BYTEARRAY, DECIMAL | native scalar |
//! | STRING | [`Value::String`] |
//! | DATE, DATETIME | temporal value, [`Value::Null`] when null |
//! | TIME | [`Value::Datetime`] anchored to [`process_today`], [`Value::Null`] when null |
//! | ENUMERATION | [`Value::String`] |
//! | SEQUENCE | [`Value::Table`] |
//! | CHOICE | [`PayloadError::NotImplemented`] |
//! | anything else | [`PayloadError::UnexpectedDatatype`] |

use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

use crate::element::{DataType, Element, RawValue};
use crate::error::{Error, PayloadError};
use crate::failure::{self, SecurityError};
use crate::transport::{Event, Message};
use crate::value::{Table, Value};

/// Converts an element into a native value, dispatching on its datatype tag.
pub fn decode<E: Element>(element: &E) -> Result<Value, PayloadError> {
    let datatype = element.datatype();
    match datatype {
        DataType::Sequence => decode_sequence(element),
        DataType::Choice => Err(PayloadError::NotImplemented { datatype }),
        DataType::CorrelationId | DataType::Unknown(_) => Err(PayloadError::UnexpectedDatatype {
            code: datatype.code(),
        }),
        _ if element.is_array() => Err(PayloadError::UnexpectedValue {
            name: element.name().to_owned(),
            expected: "scalar",
            actual: "array",
        }),
        _ if datatype.is_temporal() => decode_temporal(element, datatype),
        _ => decode_scalar(element, datatype),
    }
}

fn decode_scalar<E: Element>(element: &E, datatype: DataType) -> Result<Value, PayloadError> {
    let Some(raw) = element.raw_value() else {
        if element.is_null() {
            return Ok(Value::Null);
        }
        return Err(PayloadError::MissingValue {
            name: element.name().to_owned(),
            datatype,
        });
    };

    let value = match (datatype, raw) {
        (DataType::Bool, RawValue::Bool(value)) => Value::Bool(value),
        (DataType::Char, RawValue::Char(value)) => Value::String(value.to_string()),
        (DataType::Byte, RawValue::Byte(value)) => Value::Int(i64::from(value)),
        (DataType::Int32, RawValue::Int32(value)) => Value::Int(i64::from(value)),
        (DataType::Int64, RawValue::Int64(value)) => Value::Int(value),
        (DataType::Float32, RawValue::Float32(value)) => Value::Float(f64::from(value)),
        (DataType::Float64, RawValue::Float64(value)) => Value::Float(value),
        (DataType::ByteArray, RawValue::Bytes(value)) => Value::Bytes(value),
        (DataType::Decimal, RawValue::Decimal(value)) => Value::Float(value),
        (DataType::String, RawValue::String(value)) => Value::String(value),
        (DataType::Enumeration, RawValue::Enumeration(value))
        | (DataType::Enumeration, RawValue::String(value)) => Value::String(value),
        (_, raw) => return Err(mismatch(element, datatype, &raw)),
    };
    Ok(value)
}

fn decode_temporal<E: Element>(element: &E, datatype: DataType) -> Result<Value, PayloadError> {
    if element.is_null() {
        return Ok(Value::Null);
    }
    let Some(raw) = element.raw_value() else {
        return Ok(Value::Null);
    };

    let value = match (datatype, raw) {
        (DataType::Date, RawValue::Date(date)) => Value::Date(date),
        (DataType::Time, RawValue::Time(time)) => {
            Value::Datetime(PrimitiveDateTime::new(process_today(), time))
        }
        (DataType::Datetime, RawValue::Datetime(datetime)) => Value::Datetime(datetime),
        (DataType::Datetime, RawValue::Date(date)) => Value::Datetime(date.midnight()),
        (_, raw) => return Err(mismatch(element, datatype, &raw)),
    };
    Ok(value)
}

/// Date a bare TIME is anchored to: today at the local offset, or today in
/// UTC when the local offset is unavailable.
pub fn process_today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

fn decode_sequence<E: Element>(element: &E) -> Result<Value, PayloadError> {
    let rows: Vec<E> = if element.is_array() {
        node_iter(element)?.collect()
    } else {
        vec![element.clone()]
    };

    let mut table = Table::new();
    for (index, row) in rows.iter().enumerate() {
        if index == 0 {
            for name in child_names(row) {
                table.add_column(name);
            }
        }
        for cidx in 0..row.num_elements() {
            if let Some(cell) = row.element_at(cidx) {
                table.push(cell.name(), decode(&cell)?);
            }
        }
    }
    Ok(Value::Table(table))
}

fn mismatch<E: Element>(element: &E, datatype: DataType, raw: &RawValue) -> PayloadError {
    PayloadError::UnexpectedValue {
        name: element.name().to_owned(),
        expected: datatype.as_str(),
        actual: raw.kind(),
    }
}

/// Ordered names of the direct children of `element`.
pub fn child_names<E: Element>(element: &E) -> Vec<String> {
    (0..element.num_elements())
        .filter_map(|index| element.element_at(index))
        .map(|child| child.name().to_owned())
        .collect()
}

/// Child element by name, or [`PayloadError::MissingElement`].
pub fn require_child<E: Element>(parent: &E, name: &str) -> Result<E, PayloadError> {
    parent
        .get_element(name)
        .ok_or_else(|| PayloadError::MissingElement {
            name: name.to_owned(),
            parent: parent.name().to_owned(),
        })
}

/// Decoded value of the named child.
///
/// A missing child yields [`Value::Null`] when `allow_missing` is set and
/// [`PayloadError::MissingElement`] otherwise.
pub fn child_value<E: Element>(
    parent: &E,
    name: &str,
    allow_missing: bool,
) -> Result<Value, PayloadError> {
    match parent.get_element(name) {
        Some(child) => decode(&child),
        None if allow_missing => Ok(Value::Null),
        None => Err(PayloadError::MissingElement {
            name: name.to_owned(),
            parent: parent.name().to_owned(),
        }),
    }
}

/// Decoded values for each name, [`Value::Null`] for names the parent lacks.
pub fn child_values<E, S>(parent: &E, names: &[S]) -> Result<Vec<Value>, PayloadError>
where
    E: Element,
    S: AsRef<str>,
{
    names
        .iter()
        .map(|name| child_value(parent, name.as_ref(), true))
        .collect()
}

/// Mandatory child rendered as text; used for identifiers and error attributes.
pub fn child_text<E: Element>(parent: &E, name: &str) -> Result<String, PayloadError> {
    Ok(match child_value(parent, name, false)? {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Mandatory integer child.
pub fn child_int<E: Element>(parent: &E, name: &str) -> Result<i64, PayloadError> {
    let value = child_value(parent, name, false)?;
    value.as_i64().ok_or_else(|| PayloadError::UnexpectedValue {
        name: name.to_owned(),
        expected: "integer",
        actual: value.kind(),
    })
}

/// Iterator over the repeated values of an array element.
#[derive(Debug, Clone)]
pub struct NodeIter<E> {
    array: E,
    index: usize,
    len: usize,
}

impl<E: Element> Iterator for NodeIter<E> {
    type Item = E;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.len {
            let index = self.index;
            self.index += 1;
            if let Some(value) = self.array.value_at(index) {
                return Some(value);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.len - self.index))
    }
}

/// Lazy iteration over an array element; call again to restart.
pub fn node_iter<E: Element>(array: &E) -> Result<NodeIter<E>, PayloadError> {
    if !array.is_array() {
        return Err(PayloadError::NotAnArray {
            name: array.name().to_owned(),
        });
    }
    Ok(NodeIter {
        array: array.clone(),
        index: 0,
        len: array.num_values(),
    })
}

/// One entry of a `securityData` array: either data or the security's error.
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityNode<E> {
    Data(E),
    Error(SecurityError),
}

impl<E> SecurityNode<E> {
    pub fn data(&self) -> Option<&E> {
        match self {
            Self::Data(node) => Some(node),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SecurityError> {
        match self {
            Self::Data(_) => None,
            Self::Error(error) => Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityIter<E> {
    nodes: NodeIter<E>,
}

impl<E: Element> Iterator for SecurityIter<E> {
    type Item = Result<SecurityNode<E>, PayloadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.next()?;
        Some(failure::security_error(&node).map(|error| match error {
            Some(error) => SecurityNode::Error(error),
            None => SecurityNode::Data(node),
        }))
    }
}

/// Walks a `securityData` array, separating failing securities from data.
pub fn security_iter<E: Element>(array: &E) -> Result<SecurityIter<E>, PayloadError> {
    if array.name() != "securityData" {
        return Err(PayloadError::UnexpectedNode {
            expected: String::from("securityData"),
            actual: array.name().to_owned(),
        });
    }
    Ok(SecurityIter {
        nodes: node_iter(array)?,
    })
}

/// Iterator over the messages of one event.
///
/// Yields a [`Error::ResponseError`] and then stops as soon as a message
/// carries a top-level `responseError`: that error invalidates the whole event.
#[derive(Debug)]
pub struct MessageIter<M> {
    messages: std::vec::IntoIter<M>,
    failed: bool,
}

impl<M: Message> Iterator for MessageIter<M> {
    type Item = Result<M, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let message = self.messages.next()?;
        debug!(message_type = message.message_type(), "{}", message.dump());
        if message.has_element("responseError") {
            self.failed = true;
            return Some(Err(Error::ResponseError(message.dump())));
        }
        Some(Ok(message))
    }
}

pub fn message_iter<Ev: Event>(event: &Ev) -> MessageIter<Ev::Message> {
    MessageIter {
        messages: event.messages().into_iter(),
        failed: false,
    }
}
