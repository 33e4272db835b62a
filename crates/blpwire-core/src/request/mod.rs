//! Request variants and the lifecycle the executor drives them through.
//!
//! ```text
//! Unsent --new_response--> Dispatched --on_event(partial)*--> Accumulating
//!        --on_event(final)--> Final --error policy--> Resolved
//! ```
//!
//! | Variant | Operation | Response |
//! |---------|-----------|----------|
//! | [`ReferenceDataRequest`] | `ReferenceDataRequest` | [`FieldMapResponse`](crate::response::FieldMapResponse) |
//! | [`HistoricalDataRequest`] | `HistoricalDataRequest` | [`HistoricalResponse`](crate::response::HistoricalResponse) |
//! | [`IntradayBarRequest`] | `IntradayBarRequest` | [`RecordResponse`](crate::response::RecordResponse) |
//! | [`IntradayTickRequest`] | `IntradayTickRequest` | [`RecordResponse`](crate::response::RecordResponse) |
//! | [`ScreeningRequest`] | `BeqsRequest` | [`FieldMapResponse`](crate::response::FieldMapResponse) |

mod historical;
mod intraday_bar;
mod intraday_tick;
pub mod options;
mod reference;
mod screening;

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;

use time::{Date, PrimitiveDateTime};
use tracing::debug;

use crate::codec::{child_names, child_value, node_iter};
use crate::element::Element;
use crate::error::{PayloadError, Result, ValidationError};
use crate::failure::ErrorLog;
use crate::response::{Record, RecordResponse};
use crate::transport::{Event, RequestBuilder, Service, WireValue};

pub use historical::HistoricalDataRequest;
pub use intraday_bar::IntradayBarRequest;
pub use intraday_tick::IntradayTickRequest;
pub use reference::ReferenceDataRequest;
pub use screening::ScreeningRequest;

pub const REFDATA_SERVICE: &str = "//blp/refdata";

/// Free-form `fieldId → value` overrides sent with a request.
pub type Overrides = BTreeMap<String, String>;

/// One request kind: its wire encoding plus the interpretation of its events.
pub trait Request: Display {
    type Response;

    fn service_name(&self) -> &str {
        REFDATA_SERVICE
    }

    fn operation(&self) -> &'static str;

    /// Builds the outbound request on `service`.
    fn build_wire_request<S: Service>(&self, service: &S) -> Result<S::Request>;

    /// Allocates a fresh accumulator and clears previously collected errors.
    fn new_response(&mut self);

    /// Folds a response or partial-response event into the accumulator.
    ///
    /// Returns [`Error::NoResponse`](crate::Error::NoResponse) if [`Request::new_response`] was not
    /// called first.
    fn on_event<Ev: Event>(&mut self, event: &Ev, is_final: bool) -> Result<()>;

    /// Any non-response event polled while waiting.
    fn on_admin_event<Ev: Event>(&mut self, event: &Ev) -> Result<()> {
        debug!(event_type = %event.event_type(), "ignoring administrative event");
        Ok(())
    }

    fn errors(&self) -> &ErrorLog;

    /// Hands the accumulator over, leaving the request without a response.
    fn take_response(&mut self) -> Option<Self::Response>;
}

/// Appends one `overrides` entry per pair.
pub fn apply_overrides<B>(wire: &mut B, overrides: &Overrides) -> Result<()>
where
    B: RequestBuilder + ?Sized,
{
    for (field, value) in overrides {
        let entry = wire.append_element("overrides")?;
        entry.set("fieldId", WireValue::from(field))?;
        entry.set("value", WireValue::from(value))?;
    }
    Ok(())
}

/// Sets a boolean field only when the flag was specified.
pub fn set_flag<B>(wire: &mut B, name: &str, flag: Option<bool>) -> Result<()>
where
    B: RequestBuilder + ?Sized,
{
    match flag {
        Some(flag) => wire.set(name, WireValue::Bool(flag)),
        None => Ok(()),
    }
}

pub(crate) fn set_option<B, T>(wire: &mut B, name: &str, value: Option<T>) -> Result<()>
where
    B: RequestBuilder + ?Sized,
    T: Into<WireValue>,
{
    match value {
        Some(value) => wire.set(name, value.into()),
        None => Ok(()),
    }
}

/// `YYYYMMDD` rendering used by date-valued request fields.
pub fn compact_date(date: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Validates a list of identifiers: non-empty, no blank entries, no repeats.
pub(crate) fn validate_names<I, S>(
    names: I,
    kind: &'static str,
    empty: ValidationError,
    blank: ValidationError,
) -> std::result::Result<Vec<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names
        .into_iter()
        .map(|name| name.into().trim().to_owned())
        .collect();
    if names.is_empty() {
        return Err(empty);
    }
    let mut seen = HashSet::new();
    for name in &names {
        if name.is_empty() {
            return Err(blank);
        }
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::Duplicate {
                kind,
                value: name.clone(),
            });
        }
    }
    Ok(names)
}

pub(crate) fn validate_securities<I, S>(
    securities: I,
) -> std::result::Result<Vec<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    validate_names(
        securities,
        "security",
        ValidationError::EmptySecurities,
        ValidationError::EmptySecurity,
    )
}

pub(crate) fn validate_fields<I, S>(fields: I) -> std::result::Result<Vec<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    validate_names(
        fields,
        "field",
        ValidationError::EmptyFields,
        ValidationError::EmptyField,
    )
}

pub(crate) fn validate_security(security: &str) -> std::result::Result<String, ValidationError> {
    let security = security.trim();
    if security.is_empty() {
        return Err(ValidationError::EmptySecurity);
    }
    Ok(security.to_owned())
}

pub(crate) fn validate_range<T>(start: T, end: T) -> std::result::Result<(), ValidationError>
where
    T: PartialOrd + Display,
{
    if start > end {
        return Err(ValidationError::InvertedRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

/// Start/end pair for intraday requests; end defaults to now, start to one
/// hour before end.
pub(crate) fn intraday_window(
    start: Option<PrimitiveDateTime>,
    end: Option<PrimitiveDateTime>,
) -> std::result::Result<(PrimitiveDateTime, PrimitiveDateTime), ValidationError> {
    let end = end.unwrap_or_else(|| {
        let now = time::OffsetDateTime::now_utc();
        PrimitiveDateTime::new(now.date(), now.time())
    });
    let start = start.unwrap_or(end - time::Duration::hours(1));
    validate_range(start, end)?;
    Ok((start, end))
}

/// Every child of `entry` as a name/value pair, in payload order.
pub(crate) fn record_from<E: Element>(entry: &E) -> std::result::Result<Record, PayloadError> {
    let entries = child_names(entry)
        .into_iter()
        .map(|name| {
            let value = child_value(entry, &name, false)?;
            Ok((name, value))
        })
        .collect::<std::result::Result<Vec<_>, PayloadError>>()?;
    Ok(Record::new(entries))
}

/// Appends one generic record per entry of a bar or tick array.
pub(crate) fn collect_records<E: Element>(
    response: &mut RecordResponse,
    array: &E,
) -> std::result::Result<usize, PayloadError> {
    let mut appended = 0;
    for entry in node_iter(array)? {
        response.push(record_from(&entry)?);
        appended += 1;
    }
    Ok(appended)
}
