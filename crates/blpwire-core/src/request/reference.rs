use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use tracing::warn;

use crate::codec::{child_text, decode, message_iter, require_child, security_iter, SecurityNode};
use crate::element::Element;
use crate::error::{Error, PayloadError, Result, ValidationError};
use crate::failure::{field_errors, ErrorLog, SecurityError};
use crate::request::{
    apply_overrides, set_flag, validate_fields, validate_securities, Overrides, Request,
};
use crate::response::FieldMapResponse;
use crate::transport::{Event, Message, RequestBuilder, Service, WireValue};
use crate::value::Value;

/// Current field values for a set of securities.
#[derive(Debug, Clone)]
pub struct ReferenceDataRequest {
    securities: Vec<String>,
    fields: Vec<String>,
    return_formatted_value: Option<bool>,
    use_utc_time: Option<bool>,
    overrides: Overrides,
    errors: ErrorLog,
    response: Option<FieldMapResponse>,
}

impl ReferenceDataRequest {
    pub const OPERATION: &'static str = "ReferenceDataRequest";

    pub fn new<I, S, J, T>(securities: I, fields: J) -> std::result::Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Ok(Self {
            securities: validate_securities(securities)?,
            fields: validate_fields(fields)?,
            return_formatted_value: None,
            use_utc_time: None,
            overrides: Overrides::new(),
            errors: ErrorLog::default(),
            response: None,
        })
    }

    pub fn ignore_security_error(mut self, ignore: bool) -> Self {
        self.errors.ignore_security_error = ignore;
        self
    }

    pub fn ignore_field_error(mut self, ignore: bool) -> Self {
        self.errors.ignore_field_error = ignore;
        self
    }

    pub fn return_formatted_value(mut self, flag: bool) -> Self {
        self.return_formatted_value = Some(flag);
        self
    }

    pub fn use_utc_time(mut self, flag: bool) -> Self {
        self.use_utc_time = Some(flag);
        self
    }

    pub fn with_override(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(field.into(), value.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn securities(&self) -> &[String] {
        &self.securities
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    fn is_requested(&self, security: &str) -> bool {
        self.securities.iter().any(|requested| requested == security)
    }

    /// A failed security keeps no data in the response.
    fn on_security_error(&mut self, error: SecurityError) {
        if let Some(response) = self.response.as_mut() {
            response.remove(&error.security);
        }
        self.errors.record_security_error(error);
    }

    fn on_security_node<E: Element>(&mut self, node: &E) -> std::result::Result<(), PayloadError> {
        let security = child_text(node, "security")?;
        if !self.is_requested(&security) {
            warn!(security = %security, "skipping data for unrequested security");
            return Ok(());
        }
        if self.errors.has_security_error(&security) {
            warn!(security = %security, "skipping data for failed security");
            return Ok(());
        }

        let failed = field_errors(node)?;
        let excepted: HashSet<&str> = failed.iter().map(|error| error.field.as_str()).collect();
        let field_data = match node.get_element("fieldData") {
            Some(data) => Some(data),
            None if !failed.is_empty() => None,
            None => Some(require_child(node, "fieldData")?),
        };

        // Positional parity: a field either decodes or is explained by an exception.
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match field_data.as_ref().and_then(|data| data.get_element(field)) {
                Some(child) => values.push((field.clone(), decode(&child)?)),
                None if excepted.contains(field.as_str()) => {
                    values.push((field.clone(), Value::Null));
                }
                None => {}
            }
        }
        if values.len() != self.fields.len() {
            return Err(PayloadError::FieldCountMismatch {
                security,
                expected: self.fields.len(),
                actual: values.len(),
            });
        }

        if let Some(response) = self.response.as_mut() {
            response.merge(&security, values);
        }
        self.errors.record_field_errors(failed);
        Ok(())
    }
}

impl Display for ReferenceDataRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let overrides: Vec<String> = self
            .overrides
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        write!(
            f,
            "ReferenceDataRequest([{}], [{}], overrides={})",
            self.securities.join(","),
            self.fields.join(","),
            overrides.join(",")
        )
    }
}

impl Request for ReferenceDataRequest {
    type Response = FieldMapResponse;

    fn operation(&self) -> &'static str {
        Self::OPERATION
    }

    fn build_wire_request<S: Service>(&self, service: &S) -> Result<S::Request> {
        let mut wire = service.create_request(Self::OPERATION)?;
        for security in &self.securities {
            wire.append("securities", WireValue::from(security))?;
        }
        for field in &self.fields {
            wire.append("fields", WireValue::from(field))?;
        }
        set_flag(&mut wire, "returnFormattedValue", self.return_formatted_value)?;
        set_flag(&mut wire, "useUTCTime", self.use_utc_time)?;
        apply_overrides(&mut wire, &self.overrides)?;
        Ok(wire)
    }

    fn new_response(&mut self) {
        self.errors.clear();
        self.response = Some(FieldMapResponse::with_fields(&self.fields));
    }

    fn on_event<Ev: Event>(&mut self, event: &Ev, _is_final: bool) -> Result<()> {
        if self.response.is_none() {
            return Err(Error::NoResponse);
        }
        for message in message_iter(event) {
            let message = message?;
            let data = message.get_element("securityData").ok_or_else(|| {
                PayloadError::MissingElement {
                    name: String::from("securityData"),
                    parent: message.message_type().to_owned(),
                }
            })?;
            for node in security_iter(&data)? {
                match node? {
                    SecurityNode::Error(error) if !self.is_requested(&error.security) => {
                        warn!(security = %error.security, "skipping error for unrequested security");
                    }
                    SecurityNode::Error(error) => self.on_security_error(error),
                    SecurityNode::Data(node) => self.on_security_node(&node)?,
                }
            }
        }
        Ok(())
    }

    fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    fn take_response(&mut self) -> Option<FieldMapResponse> {
        self.response.take()
    }
}
