//! Capability traits implemented by the session SDK binding.
//!
//! The protocol layer never talks to the network itself. Everything it needs
//! from the transport is expressed here:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`SessionFactory`] | Creates a fresh session per terminal call |
//! | [`Session`] | Start/stop, open services, send requests, poll events |
//! | [`Service`] | Creates outbound wire requests for an operation |
//! | [`RequestBuilder`] | Mutation surface of an outbound wire request |
//! | [`Event`] | A polled batch of messages tagged with an [`EventType`] |
//! | [`Message`] | One payload tree plus correlation identities |
//!
//! [`crate::mock`] provides an in-memory implementation used for tests.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use time::PrimitiveDateTime;

use crate::config::TerminalConfig;
use crate::element::Element;
use crate::error::Result;

/// Kind of a polled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Response,
    PartialResponse,
    SubscriptionData,
    SubscriptionStatus,
    Timeout,
    /// Session, service and other administrative events, with the raw code.
    Admin(i32),
}

impl EventType {
    pub const fn is_response(self) -> bool {
        matches!(self, Self::Response | Self::PartialResponse)
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response => f.write_str("RESPONSE"),
            Self::PartialResponse => f.write_str("PARTIAL_RESPONSE"),
            Self::SubscriptionData => f.write_str("SUBSCRIPTION_DATA"),
            Self::SubscriptionStatus => f.write_str("SUBSCRIPTION_STATUS"),
            Self::Timeout => f.write_str("TIMEOUT"),
            Self::Admin(code) => write!(f, "ADMIN({code})"),
        }
    }
}

/// Opaque token tying a streaming message back to its subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scalar accepted by the outbound request surface.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Datetime(PrimitiveDateTime),
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for WireValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for WireValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<PrimitiveDateTime> for WireValue {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::Datetime(value)
    }
}

/// Mutation surface of an outbound request.
pub trait RequestBuilder {
    /// Sets a scalar field.
    fn set(&mut self, name: &str, value: WireValue) -> Result<()>;

    /// Appends a scalar to an array field.
    fn append(&mut self, name: &str, value: WireValue) -> Result<()>;

    /// Appends a new complex entry to an array field (e.g. `overrides`) and
    /// returns it for population.
    fn append_element(&mut self, name: &str) -> Result<&mut dyn RequestBuilder>;
}

/// Handle on an opened service.
pub trait Service {
    type Request: RequestBuilder;

    fn name(&self) -> &str;

    fn create_request(&self, operation: &str) -> Result<Self::Request>;
}

/// One streaming subscription entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEntry {
    pub topic: String,
    pub fields: Vec<String>,
    pub options: Vec<String>,
    pub correlation_id: CorrelationId,
}

/// Payload tree delivered inside an event.
pub trait Message {
    type Element: Element;

    fn message_type(&self) -> &str;

    fn correlation_ids(&self) -> Vec<CorrelationId>;

    fn as_element(&self) -> Self::Element;

    /// Printable rendering of the whole message for diagnostics.
    fn dump(&self) -> String;

    fn get_element(&self, name: &str) -> Option<Self::Element> {
        self.as_element().get_element(name)
    }

    fn has_element(&self, name: &str) -> bool {
        self.as_element().has_element(name)
    }
}

/// Event handed back by [`Session::next_event`].
pub trait Event {
    type Message: Message;

    fn event_type(&self) -> EventType;

    fn messages(&self) -> Vec<Self::Message>;
}

/// Live connection to the terminal.
pub trait Session {
    type Service: Service;
    type Event: Event;

    fn start(&mut self) -> bool;

    fn stop(&mut self);

    fn open_service(&mut self, name: &str) -> bool;

    fn get_service(&self, name: &str) -> Result<Self::Service>;

    fn send_request(&mut self, request: <Self::Service as Service>::Request) -> Result<()>;

    fn subscribe(&mut self, subscriptions: &[SubscriptionEntry]) -> Result<()>;

    /// Blocks for at most `timeout`; a stalled transport yields
    /// [`EventType::Timeout`] events.
    fn next_event(&mut self, timeout: Duration) -> Self::Event;
}

/// Creates sessions bound to a host/port configuration.
pub trait SessionFactory {
    type Session: Session;

    fn create_session(&self, config: &TerminalConfig) -> Self::Session;
}
