//! Per-security and per-field failures, their extraction from payloads, and
//! the ignore/raise policy applied once a request completes.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::codec::{self, child_int, child_text, require_child};
use crate::element::Element;
use crate::error::{Error, PayloadError};

/// A security the server could not resolve or serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityError {
    pub security: String,
    pub source: String,
    pub code: i64,
    pub category: String,
    pub message: String,
    pub subcategory: String,
}

impl Display for SecurityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.security, self.category, self.message)
    }
}

/// A field that failed for a given security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub security: String,
    pub field: String,
    pub source: String,
    pub code: i64,
    pub category: String,
    pub message: String,
    pub subcategory: String,
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.security, self.field, self.category, self.message
        )
    }
}

struct ErrorInfo {
    source: String,
    code: i64,
    category: String,
    message: String,
    subcategory: String,
}

fn error_info<E: Element>(node: &E) -> Result<ErrorInfo, PayloadError> {
    let subcategory = match node.get_element("subcategory") {
        Some(child) => match codec::decode(&child)? {
            crate::Value::String(text) => text,
            other if other.is_null() => String::new(),
            other => other.to_string(),
        },
        None => String::new(),
    };
    Ok(ErrorInfo {
        source: child_text(node, "source")?,
        code: child_int(node, "code")?,
        category: child_text(node, "category")?,
        message: child_text(node, "message")?,
        subcategory,
    })
}

fn expect_name<E: Element>(node: &E, expected: &str) -> Result<(), PayloadError> {
    if node.name() == expected {
        Ok(())
    } else {
        Err(PayloadError::UnexpectedNode {
            expected: expected.to_owned(),
            actual: node.name().to_owned(),
        })
    }
}

/// Converts a `securityError` element into a [`SecurityError`].
pub fn as_security_error<E: Element>(
    node: &E,
    security: &str,
) -> Result<SecurityError, PayloadError> {
    expect_name(node, "securityError")?;
    let info = error_info(node)?;
    Ok(SecurityError {
        security: security.to_owned(),
        source: info.source,
        code: info.code,
        category: info.category,
        message: info.message,
        subcategory: info.subcategory,
    })
}

/// The node's security error, if it carries one.
pub fn security_error<E: Element>(node: &E) -> Result<Option<SecurityError>, PayloadError> {
    expect_name(node, "securityData")?;
    match node.get_element("securityError") {
        Some(error) => {
            let security = child_text(node, "security")?;
            as_security_error(&error, &security).map(Some)
        }
        None => Ok(None),
    }
}

/// Converts one `fieldExceptions` entry into a [`FieldError`].
pub fn as_field_error<E: Element>(node: &E, security: &str) -> Result<FieldError, PayloadError> {
    let field = child_text(node, "fieldId")?;
    let info = error_info(&require_child(node, "errorInfo")?)?;
    Ok(FieldError {
        security: security.to_owned(),
        field,
        source: info.source,
        code: info.code,
        category: info.category,
        message: info.message,
        subcategory: info.subcategory,
    })
}

/// All field exceptions reported on a `securityData` node; empty when none.
pub fn field_errors<E: Element>(node: &E) -> Result<Vec<FieldError>, PayloadError> {
    expect_name(node, "securityData")?;
    let Some(exceptions) = node.get_element("fieldExceptions") else {
        return Ok(Vec::new());
    };
    if exceptions.is_array() && exceptions.num_values() == 0 {
        return Ok(Vec::new());
    }

    let security = child_text(node, "security")?;
    if exceptions.is_array() {
        codec::node_iter(&exceptions)?
            .map(|entry| as_field_error(&entry, &security))
            .collect()
    } else {
        as_field_error(&exceptions, &security).map(|error| vec![error])
    }
}

/// Errors collected by a request plus the flags deciding whether they abort it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    pub ignore_security_error: bool,
    pub ignore_field_error: bool,
    security_errors: Vec<SecurityError>,
    field_errors: Vec<FieldError>,
}

impl ErrorLog {
    pub fn new(ignore_security_error: bool, ignore_field_error: bool) -> Self {
        Self {
            ignore_security_error,
            ignore_field_error,
            ..Self::default()
        }
    }

    pub fn record_security_error(&mut self, error: SecurityError) {
        self.security_errors.push(error);
    }

    pub fn record_field_errors(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.field_errors.extend(errors);
    }

    pub fn has_security_error(&self, security: &str) -> bool {
        self.security_errors
            .iter()
            .any(|error| error.security == security)
    }

    pub fn security_errors(&self) -> &[SecurityError] {
        &self.security_errors
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn clear(&mut self) {
        self.security_errors.clear();
        self.field_errors.clear();
    }

    /// Whether the collected errors must abort the request.
    pub fn has_exception(&self) -> bool {
        (!self.ignore_security_error && !self.security_errors.is_empty())
            || (!self.ignore_field_error && !self.field_errors.is_empty())
    }

    /// Aggregated error to fail with: security errors take precedence over
    /// field errors. Returns [`Error::NothingToRaise`] when nothing qualifies.
    pub fn raise(&self) -> Error {
        if !self.ignore_security_error && !self.security_errors.is_empty() {
            return Error::SecurityErrors(self.security_errors.clone());
        }
        if !self.ignore_field_error && !self.field_errors.is_empty() {
            return Error::FieldErrors(self.field_errors.clone());
        }
        Error::NothingToRaise
    }

    /// `Err` with the aggregated error when the policy triggers.
    pub fn check(&self) -> Result<(), Error> {
        if self.has_exception() {
            Err(self.raise())
        } else {
            Ok(())
        }
    }
}
