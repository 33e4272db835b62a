use std::fmt::{Display, Formatter};

use time::PrimitiveDateTime;
use tracing::debug;

use crate::codec::message_iter;
use crate::element::Element;
use crate::error::{Error, Result, ValidationError};
use crate::failure::ErrorLog;
use crate::request::options::MarketEvent;
use crate::request::{collect_records, intraday_window, set_flag, validate_security, Request};
use crate::response::RecordResponse;
use crate::transport::{Event, Message, RequestBuilder, Service, WireValue};

/// Raw ticks for one security over an intraday window.
#[derive(Debug, Clone)]
pub struct IntradayTickRequest {
    security: String,
    events: Vec<MarketEvent>,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
    include_condition_codes: Option<bool>,
    include_non_plottable_events: Option<bool>,
    include_exchange_codes: Option<bool>,
    return_eids: Option<bool>,
    include_broker_codes: Option<bool>,
    include_rps_codes: Option<bool>,
    include_bic_mic_codes: Option<bool>,
    errors: ErrorLog,
    response: Option<RecordResponse>,
}

impl IntradayTickRequest {
    pub const OPERATION: &'static str = "IntradayTickRequest";

    /// Samples trades only unless [`IntradayTickRequest::events`] says otherwise.
    pub fn new(
        security: &str,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
    ) -> std::result::Result<Self, ValidationError> {
        let security = validate_security(security)?;
        let (start, end) = intraday_window(start, end)?;
        Ok(Self {
            security,
            events: vec![MarketEvent::default()],
            start,
            end,
            include_condition_codes: None,
            include_non_plottable_events: None,
            include_exchange_codes: None,
            return_eids: None,
            include_broker_codes: None,
            include_rps_codes: None,
            include_bic_mic_codes: None,
            errors: ErrorLog::default(),
            response: None,
        })
    }

    /// Replaces the sampled event types; an empty list keeps the default.
    pub fn events(mut self, events: impl IntoIterator<Item = MarketEvent>) -> Self {
        let mut selected: Vec<MarketEvent> = Vec::new();
        for event in events {
            if !selected.contains(&event) {
                selected.push(event);
            }
        }
        if !selected.is_empty() {
            self.events = selected;
        }
        self
    }

    pub fn include_condition_codes(mut self, flag: bool) -> Self {
        self.include_condition_codes = Some(flag);
        self
    }

    pub fn include_non_plottable_events(mut self, flag: bool) -> Self {
        self.include_non_plottable_events = Some(flag);
        self
    }

    pub fn include_exchange_codes(mut self, flag: bool) -> Self {
        self.include_exchange_codes = Some(flag);
        self
    }

    pub fn return_eids(mut self, flag: bool) -> Self {
        self.return_eids = Some(flag);
        self
    }

    pub fn include_broker_codes(mut self, flag: bool) -> Self {
        self.include_broker_codes = Some(flag);
        self
    }

    pub fn include_rps_codes(mut self, flag: bool) -> Self {
        self.include_rps_codes = Some(flag);
        self
    }

    pub fn include_bic_mic_codes(mut self, flag: bool) -> Self {
        self.include_bic_mic_codes = Some(flag);
        self
    }

    pub fn security(&self) -> &str {
        &self.security
    }

    pub fn event_types(&self) -> &[MarketEvent] {
        &self.events
    }
}

impl Display for IntradayTickRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let events: Vec<&str> = self.events.iter().map(|event| event.as_str()).collect();
        write!(
            f,
            "IntradayTickRequest({}, [{}], start={}, end={})",
            self.security,
            events.join(","),
            self.start,
            self.end
        )
    }
}

impl Request for IntradayTickRequest {
    type Response = RecordResponse;

    fn operation(&self) -> &'static str {
        Self::OPERATION
    }

    fn build_wire_request<S: Service>(&self, service: &S) -> Result<S::Request> {
        let mut wire = service.create_request(Self::OPERATION)?;
        wire.set("security", WireValue::from(&self.security))?;
        for event in &self.events {
            wire.append("eventTypes", event.as_str().into())?;
        }
        wire.set("startDateTime", self.start.into())?;
        wire.set("endDateTime", self.end.into())?;
        set_flag(&mut wire, "includeConditionCodes", self.include_condition_codes)?;
        set_flag(
            &mut wire,
            "includeNonPlottableEvents",
            self.include_non_plottable_events,
        )?;
        set_flag(&mut wire, "includeExchangeCodes", self.include_exchange_codes)?;
        set_flag(&mut wire, "returnEids", self.return_eids)?;
        set_flag(&mut wire, "includeBrokerCodes", self.include_broker_codes)?;
        set_flag(&mut wire, "includeRpsCodes", self.include_rps_codes)?;
        set_flag(&mut wire, "includeBicMicCodes", self.include_bic_mic_codes)?;
        Ok(wire)
    }

    fn new_response(&mut self) {
        self.errors.clear();
        self.response = Some(RecordResponse::new());
    }

    fn on_event<Ev: Event>(&mut self, event: &Ev, _is_final: bool) -> Result<()> {
        let Some(response) = self.response.as_mut() else {
            return Err(Error::NoResponse);
        };
        for message in message_iter(event) {
            let message = message?;
            // tickData holds zero or one tickData[] array.
            let Some(ticks) = message
                .get_element("tickData")
                .and_then(|data| data.get_element("tickData"))
            else {
                debug!(security = %self.security, "message carries no ticks");
                continue;
            };
            collect_records(response, &ticks)?;
        }
        Ok(())
    }

    fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    fn take_response(&mut self) -> Option<RecordResponse> {
        self.response.take()
    }
}
