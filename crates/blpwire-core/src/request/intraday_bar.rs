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

pub const MIN_INTERVAL: u32 = 1;
pub const MAX_INTERVAL: u32 = 1440;

/// Open/high/low/close bars for one security over an intraday window.
#[derive(Debug, Clone)]
pub struct IntradayBarRequest {
    security: String,
    event: MarketEvent,
    interval: u32,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
    gap_fill_initial_bar: Option<bool>,
    return_eids: Option<bool>,
    adjustment_normal: Option<bool>,
    adjustment_abnormal: Option<bool>,
    adjustment_split: Option<bool>,
    adjustment_follow_dpdf: Option<bool>,
    errors: ErrorLog,
    response: Option<RecordResponse>,
}

impl IntradayBarRequest {
    pub const OPERATION: &'static str = "IntradayBarRequest";

    /// `end` defaults to now (UTC) and `start` to one hour before `end`.
    pub fn new(
        security: &str,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
    ) -> std::result::Result<Self, ValidationError> {
        let security = validate_security(security)?;
        let (start, end) = intraday_window(start, end)?;
        Ok(Self {
            security,
            event: MarketEvent::default(),
            interval: MIN_INTERVAL,
            start,
            end,
            gap_fill_initial_bar: None,
            return_eids: None,
            adjustment_normal: None,
            adjustment_abnormal: None,
            adjustment_split: None,
            adjustment_follow_dpdf: None,
            errors: ErrorLog::default(),
            response: None,
        })
    }

    pub fn event(mut self, event: MarketEvent) -> Self {
        self.event = event;
        self
    }

    /// Bar width in minutes, 1 through 1440.
    pub fn interval(mut self, minutes: u32) -> std::result::Result<Self, ValidationError> {
        if !(MIN_INTERVAL..=MAX_INTERVAL).contains(&minutes) {
            return Err(ValidationError::IntervalOutOfRange { value: minutes });
        }
        self.interval = minutes;
        Ok(self)
    }

    /// Fill the first bar from the previous value when the window opens without ticks.
    pub fn gap_fill_initial_bar(mut self, flag: bool) -> Self {
        self.gap_fill_initial_bar = Some(flag);
        self
    }

    pub fn return_eids(mut self, flag: bool) -> Self {
        self.return_eids = Some(flag);
        self
    }

    pub fn adjustment_normal(mut self, flag: bool) -> Self {
        self.adjustment_normal = Some(flag);
        self
    }

    pub fn adjustment_abnormal(mut self, flag: bool) -> Self {
        self.adjustment_abnormal = Some(flag);
        self
    }

    pub fn adjustment_split(mut self, flag: bool) -> Self {
        self.adjustment_split = Some(flag);
        self
    }

    pub fn adjustment_follow_dpdf(mut self, flag: bool) -> Self {
        self.adjustment_follow_dpdf = Some(flag);
        self
    }

    pub fn security(&self) -> &str {
        &self.security
    }

    pub const fn window(&self) -> (PrimitiveDateTime, PrimitiveDateTime) {
        (self.start, self.end)
    }
}

impl Display for IntradayBarRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IntradayBarRequest({}, {}, start={}, end={}, interval={})",
            self.security, self.event, self.start, self.end, self.interval
        )
    }
}

impl Request for IntradayBarRequest {
    type Response = RecordResponse;

    fn operation(&self) -> &'static str {
        Self::OPERATION
    }

    fn build_wire_request<S: Service>(&self, service: &S) -> Result<S::Request> {
        let mut wire = service.create_request(Self::OPERATION)?;
        wire.set("security", WireValue::from(&self.security))?;
        wire.set("eventType", self.event.as_str().into())?;
        wire.set("startDateTime", self.start.into())?;
        wire.set("endDateTime", self.end.into())?;
        wire.set("interval", self.interval.into())?;
        set_flag(&mut wire, "gapFillInitialBar", self.gap_fill_initial_bar)?;
        set_flag(&mut wire, "returnEids", self.return_eids)?;
        set_flag(&mut wire, "adjustmentNormal", self.adjustment_normal)?;
        set_flag(&mut wire, "adjustmentAbnormal", self.adjustment_abnormal)?;
        set_flag(&mut wire, "adjustmentSplit", self.adjustment_split)?;
        set_flag(&mut wire, "adjustmentFollowDPDF", self.adjustment_follow_dpdf)?;
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
            let Some(bars) = message
                .get_element("barData")
                .and_then(|data| data.get_element("barTickData"))
            else {
                debug!(security = %self.security, "message carries no bars");
                continue;
            };
            collect_records(response, &bars)?;
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
