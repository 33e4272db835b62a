use std::fmt::{Display, Formatter};

use time::Date;

use crate::codec::{
    child_names, child_text, child_values, message_iter, require_child, security_iter,
    SecurityNode,
};
use crate::element::Element;
use crate::error::{Error, PayloadError, Result, ValidationError};
use crate::failure::{field_errors, ErrorLog};
use crate::request::options::ScreenType;
use crate::request::{apply_overrides, compact_date, Overrides, Request};
use crate::response::FieldMapResponse;
use crate::transport::{Event, Message, RequestBuilder, Service, WireValue};

pub const DEFAULT_GROUP: &str = "General";

/// Runs a saved equity screen and returns its members with the screen's columns.
#[derive(Debug, Clone)]
pub struct ScreeningRequest {
    screen_name: String,
    screen_type: ScreenType,
    group: String,
    as_of: Option<Date>,
    language: Option<String>,
    errors: ErrorLog,
    response: Option<FieldMapResponse>,
}

impl ScreeningRequest {
    pub const OPERATION: &'static str = "BeqsRequest";

    pub fn new(screen_name: &str) -> std::result::Result<Self, ValidationError> {
        let screen_name = screen_name.trim();
        if screen_name.is_empty() {
            return Err(ValidationError::EmptyScreenName);
        }
        Ok(Self {
            screen_name: screen_name.to_owned(),
            screen_type: ScreenType::default(),
            group: String::from(DEFAULT_GROUP),
            as_of: None,
            language: None,
            errors: ErrorLog::default(),
            response: None,
        })
    }

    pub fn screen_type(mut self, screen_type: ScreenType) -> Self {
        self.screen_type = screen_type;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Point-in-time date the screen is evaluated as of.
    pub fn as_of(mut self, date: Date) -> Self {
        self.as_of = Some(date);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn ignore_security_error(mut self, ignore: bool) -> Self {
        self.errors.ignore_security_error = ignore;
        self
    }

    pub fn ignore_field_error(mut self, ignore: bool) -> Self {
        self.errors.ignore_field_error = ignore;
        self
    }

    pub fn screen_name(&self) -> &str {
        &self.screen_name
    }

    fn overrides(&self) -> Overrides {
        let mut overrides = Overrides::new();
        if let Some(as_of) = self.as_of {
            overrides.insert(String::from("PiTDate"), compact_date(as_of));
        }
        if let Some(language) = &self.language {
            overrides.insert(String::from("languageId"), language.clone());
        }
        overrides
    }

    fn on_security_node<E: Element>(&mut self, node: &E) -> std::result::Result<(), PayloadError> {
        let security = child_text(node, "security")?;
        if self.errors.has_security_error(&security) {
            return Ok(());
        }
        let field_data = require_child(node, "fieldData")?;
        // Columns are whatever the screen defines; learn them from the payload.
        let names = child_names(&field_data);
        let values = child_values(&field_data, &names)?;

        if let Some(response) = self.response.as_mut() {
            response.merge(&security, names.into_iter().zip(values));
        }
        self.errors.record_field_errors(field_errors(node)?);
        Ok(())
    }
}

impl Display for ScreeningRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ScreeningRequest({}, type={}, group={}, asof=",
            self.screen_name, self.screen_type, self.group
        )?;
        match self.as_of {
            Some(date) => write!(f, "{date})"),
            None => f.write_str("None)"),
        }
    }
}

impl Request for ScreeningRequest {
    type Response = FieldMapResponse;

    fn operation(&self) -> &'static str {
        Self::OPERATION
    }

    fn build_wire_request<S: Service>(&self, service: &S) -> Result<S::Request> {
        let mut wire = service.create_request(Self::OPERATION)?;
        wire.set("screenName", WireValue::from(&self.screen_name))?;
        wire.set("screenType", self.screen_type.as_str().into())?;
        wire.set("Group", WireValue::from(&self.group))?;
        apply_overrides(&mut wire, &self.overrides())?;
        Ok(wire)
    }

    fn new_response(&mut self) {
        self.errors.clear();
        self.response = Some(FieldMapResponse::discovering());
    }

    fn on_event<Ev: Event>(&mut self, event: &Ev, _is_final: bool) -> Result<()> {
        if self.response.is_none() {
            return Err(Error::NoResponse);
        }
        for message in message_iter(event) {
            let message = message?;
            let data = message
                .get_element("data")
                .ok_or_else(|| PayloadError::MissingElement {
                    name: String::from("data"),
                    parent: message.message_type().to_owned(),
                })?;
            for node in security_iter(&require_child(&data, "securityData")?)? {
                match node? {
                    SecurityNode::Error(error) => {
                        if let Some(response) = self.response.as_mut() {
                            response.remove(&error.security);
                        }
                        self.errors.record_security_error(error);
                    }
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
