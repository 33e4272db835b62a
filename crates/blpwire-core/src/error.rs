use thiserror::Error;

use crate::element::DataType;
use crate::failure::{FieldError, SecurityError};

/// Parameter and configuration errors raised before anything reaches the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request must include at least one security")]
    EmptySecurities,
    #[error("request must include at least one field")]
    EmptyFields,
    #[error("security identifier cannot be empty")]
    EmptySecurity,
    #[error("field name cannot be empty")]
    EmptyField,
    #[error("duplicate {kind} '{value}'")]
    Duplicate { kind: &'static str, value: String },
    #[error("screen name cannot be empty")]
    EmptyScreenName,

    #[error("interval {value} is outside the supported range 1..=1440 minutes")]
    IntervalOutOfRange { value: u32 },
    #[error("subscription interval must be positive and finite")]
    InvalidSubscriptionInterval,
    #[error("start {start} must not be after end {end}")]
    InvertedRange { start: String, end: String },
    #[error("max data points must be greater than zero")]
    ZeroMaxDataPoints,
    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("invalid {option} '{value}'")]
    InvalidOption { option: &'static str, value: String },

    #[error("invalid value for {name}: '{value}'")]
    InvalidConfig { name: &'static str, value: String },
}

/// Decoded payload shape does not match what the decoding model expects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{datatype} data type is not implemented")]
    NotImplemented { datatype: DataType },
    #[error("unexpected data type {code}")]
    UnexpectedDatatype { code: i32 },
    #[error("element '{name}' declares a {datatype} value but carries none")]
    MissingValue { name: String, datatype: DataType },
    #[error("failed to find child element '{name}' in parent '{parent}'")]
    MissingElement { name: String, parent: String },
    #[error("element '{name}' is not an array")]
    NotAnArray { name: String },
    #[error("expected element '{expected}', found '{actual}'")]
    UnexpectedNode { expected: String, actual: String },
    #[error("element '{name}' expected {expected}, found {actual}")]
    UnexpectedValue {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("security '{security}' returned {actual} values for {expected} requested fields")]
    FieldCountMismatch {
        security: String,
        expected: usize,
        actual: usize,
    },
}

/// Top-level error type for terminal operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("failed to start session")]
    SessionStart,

    #[error("failed to open service {service}")]
    ServiceOpen { service: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response error: {0}")]
    ResponseError(String),

    #[error("subscription failed sid={security} desc={description}")]
    SubscriptionFailure {
        security: String,
        description: String,
    },

    #[error("SecurityError: {}", describe_security_errors(.0))]
    SecurityErrors(Vec<SecurityError>),

    #[error("FieldError: {}", describe_field_errors(.0))]
    FieldErrors(Vec<FieldError>),

    #[error("programmer error: no exception to raise")]
    NothingToRaise,

    #[error("programmer error: event received before new_response")]
    NoResponse,
}

impl Error {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "request.invalid",
            Self::Payload(PayloadError::NotImplemented { .. }) => "payload.not_implemented",
            Self::Payload(PayloadError::UnexpectedDatatype { .. }) => {
                "payload.unexpected_datatype"
            }
            Self::Payload(PayloadError::MissingValue { .. }) => "payload.missing_value",
            Self::Payload(PayloadError::MissingElement { .. }) => "payload.missing_element",
            Self::Payload(PayloadError::NotAnArray { .. }) => "payload.not_an_array",
            Self::Payload(PayloadError::UnexpectedNode { .. }) => "payload.unexpected_node",
            Self::Payload(PayloadError::UnexpectedValue { .. }) => "payload.unexpected_value",
            Self::Payload(PayloadError::FieldCountMismatch { .. }) => {
                "payload.field_count_mismatch"
            }
            Self::SessionStart => "transport.session_start",
            Self::ServiceOpen { .. } => "transport.service_open",
            Self::Transport(_) => "transport.failure",
            Self::ResponseError(_) => "response.error",
            Self::SubscriptionFailure { .. } => "subscription.failure",
            Self::SecurityErrors(_) => "policy.security_error",
            Self::FieldErrors(_) => "policy.field_error",
            Self::NothingToRaise => "programmer.nothing_to_raise",
            Self::NoResponse => "programmer.no_response",
        }
    }

    /// Transport failures abort before any event is processed.
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SessionStart | Self::ServiceOpen { .. } | Self::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn describe_security_errors(errors: &[SecurityError]) -> String {
    errors
        .iter()
        .map(|error| {
            format!(
                "({}, {}, {})",
                error.security, error.category, error.message
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| {
            format!(
                "({}, {}, {}, {})",
                error.security, error.field, error.category, error.message
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}
