//! In-memory transport for deterministic offline tests.
//!
//! [`ElementNode`] builds payload trees, [`MockEvent`]/[`MockMessage`] wrap
//! them into events, and [`ScriptedFactory`] hands out sessions that replay a
//! queue of events while recording every request and subscription they see.
//! Once the script is exhausted sessions report [`EventType::Timeout`].

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value as Json};
use time::{Date, PrimitiveDateTime, Time};

use crate::config::TerminalConfig;
use crate::element::{DataType, Element, RawValue};
use crate::error::{Error, Result};
use crate::transport::{
    CorrelationId, Event, EventType, Message, RequestBuilder, Service, Session, SessionFactory,
    SubscriptionEntry, WireValue,
};

#[derive(Debug, PartialEq)]
struct NodeData {
    name: String,
    datatype: DataType,
    is_array: bool,
    is_null: bool,
    raw: Option<RawValue>,
    children: Vec<ElementNode>,
}

/// Reference-counted payload node.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode(Arc<NodeData>);

impl ElementNode {
    fn leaf(name: impl Into<String>, datatype: DataType, raw: RawValue) -> Self {
        Self(Arc::new(NodeData {
            name: name.into(),
            datatype,
            is_array: false,
            is_null: false,
            raw: Some(raw),
            children: Vec::new(),
        }))
    }

    pub fn bool(name: impl Into<String>, value: bool) -> Self {
        Self::leaf(name, DataType::Bool, RawValue::Bool(value))
    }

    pub fn char(name: impl Into<String>, value: char) -> Self {
        Self::leaf(name, DataType::Char, RawValue::Char(value))
    }

    pub fn byte(name: impl Into<String>, value: u8) -> Self {
        Self::leaf(name, DataType::Byte, RawValue::Byte(value))
    }

    pub fn int32(name: impl Into<String>, value: i32) -> Self {
        Self::leaf(name, DataType::Int32, RawValue::Int32(value))
    }

    pub fn int64(name: impl Into<String>, value: i64) -> Self {
        Self::leaf(name, DataType::Int64, RawValue::Int64(value))
    }

    pub fn float32(name: impl Into<String>, value: f32) -> Self {
        Self::leaf(name, DataType::Float32, RawValue::Float32(value))
    }

    pub fn float64(name: impl Into<String>, value: f64) -> Self {
        Self::leaf(name, DataType::Float64, RawValue::Float64(value))
    }

    pub fn decimal(name: impl Into<String>, value: f64) -> Self {
        Self::leaf(name, DataType::Decimal, RawValue::Decimal(value))
    }

    pub fn bytes(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self::leaf(name, DataType::ByteArray, RawValue::Bytes(value))
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(name, DataType::String, RawValue::String(value.into()))
    }

    pub fn enumeration(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::leaf(name, DataType::Enumeration, RawValue::Enumeration(value.into()))
    }

    pub fn date(name: impl Into<String>, value: Date) -> Self {
        Self::leaf(name, DataType::Date, RawValue::Date(value))
    }

    pub fn time(name: impl Into<String>, value: Time) -> Self {
        Self::leaf(name, DataType::Time, RawValue::Time(value))
    }

    pub fn datetime(name: impl Into<String>, value: PrimitiveDateTime) -> Self {
        Self::leaf(name, DataType::Datetime, RawValue::Datetime(value))
    }

    /// Leaf flagged null by the transport.
    pub fn null(name: impl Into<String>, datatype: DataType) -> Self {
        Self(Arc::new(NodeData {
            name: name.into(),
            datatype,
            is_array: false,
            is_null: true,
            raw: None,
            children: Vec::new(),
        }))
    }

    /// Complex element with named children.
    pub fn sequence(name: impl Into<String>, children: Vec<ElementNode>) -> Self {
        Self(Arc::new(NodeData {
            name: name.into(),
            datatype: DataType::Sequence,
            is_array: false,
            is_null: false,
            raw: None,
            children,
        }))
    }

    /// Array of complex rows.
    pub fn sequence_array(name: impl Into<String>, rows: Vec<ElementNode>) -> Self {
        Self::array(name, DataType::Sequence, rows)
    }

    /// Array element of any datatype; `values` are its repeated entries.
    pub fn array(name: impl Into<String>, datatype: DataType, values: Vec<ElementNode>) -> Self {
        Self(Arc::new(NodeData {
            name: name.into(),
            datatype,
            is_array: true,
            is_null: false,
            raw: None,
            children: values,
        }))
    }

    /// Same node with a different declared datatype.
    pub fn with_datatype(self, datatype: DataType) -> Self {
        let data = &self.0;
        Self(Arc::new(NodeData {
            name: data.name.clone(),
            datatype,
            is_array: data.is_array,
            is_null: data.is_null,
            raw: data.raw.clone(),
            children: data.children.clone(),
        }))
    }

    pub fn to_json(&self) -> Json {
        let data = &self.0;
        if data.is_array {
            return Json::Array(data.children.iter().map(Self::to_json).collect());
        }
        if data.datatype == DataType::Sequence || data.datatype == DataType::Choice {
            let mut map = Map::new();
            for child in &data.children {
                map.insert(child.0.name.clone(), child.to_json());
            }
            return Json::Object(map);
        }
        match &data.raw {
            None => Json::Null,
            Some(RawValue::Bool(value)) => json!(value),
            Some(RawValue::Char(value)) => json!(value.to_string()),
            Some(RawValue::Byte(value)) => json!(value),
            Some(RawValue::Int32(value)) => json!(value),
            Some(RawValue::Int64(value)) => json!(value),
            Some(RawValue::Float32(value)) => json!(value),
            Some(RawValue::Float64(value)) | Some(RawValue::Decimal(value)) => json!(value),
            Some(RawValue::Bytes(value)) => json!(value),
            Some(RawValue::String(value)) | Some(RawValue::Enumeration(value)) => json!(value),
            Some(RawValue::Date(value)) => json!(value.to_string()),
            Some(RawValue::Time(value)) => json!(value.to_string()),
            Some(RawValue::Datetime(value)) => json!(value.to_string()),
        }
    }
}

impl Element for ElementNode {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn datatype(&self) -> DataType {
        self.0.datatype
    }

    fn is_array(&self) -> bool {
        self.0.is_array
    }

    fn is_null(&self) -> bool {
        self.0.is_null
    }

    fn num_values(&self) -> usize {
        if self.0.is_array {
            self.0.children.len()
        } else {
            usize::from(self.0.raw.is_some())
        }
    }

    fn value_at(&self, index: usize) -> Option<Self> {
        if self.0.is_array {
            self.0.children.get(index).cloned()
        } else {
            None
        }
    }

    fn num_elements(&self) -> usize {
        if self.0.is_array {
            0
        } else {
            self.0.children.len()
        }
    }

    fn element_at(&self, index: usize) -> Option<Self> {
        if self.0.is_array {
            None
        } else {
            self.0.children.get(index).cloned()
        }
    }

    fn get_element(&self, name: &str) -> Option<Self> {
        if self.0.is_array {
            return None;
        }
        self.0
            .children
            .iter()
            .find(|child| child.0.name == name)
            .cloned()
    }

    fn raw_value(&self) -> Option<RawValue> {
        self.0.raw.clone()
    }
}

/// `securityData` node: a `security` identifier followed by `children`.
pub fn security_data(security: &str, children: Vec<ElementNode>) -> ElementNode {
    let mut nodes = vec![ElementNode::string("security", security)];
    nodes.extend(children);
    ElementNode::sequence("securityData", nodes)
}

pub fn field_data(fields: Vec<ElementNode>) -> ElementNode {
    ElementNode::sequence("fieldData", fields)
}

fn error_info_children(category: &str, message: &str) -> Vec<ElementNode> {
    vec![
        ElementNode::string("source", "mock"),
        ElementNode::int32("code", 1),
        ElementNode::string("category", category),
        ElementNode::string("message", message),
        ElementNode::string("subcategory", ""),
    ]
}

pub fn security_error_node(category: &str, message: &str) -> ElementNode {
    ElementNode::sequence("securityError", error_info_children(category, message))
}

/// One `fieldExceptions` entry.
pub fn field_exception(field: &str, category: &str, message: &str) -> ElementNode {
    ElementNode::sequence(
        "fieldExceptions",
        vec![
            ElementNode::string("fieldId", field),
            ElementNode::sequence("errorInfo", error_info_children(category, message)),
        ],
    )
}

pub fn field_exceptions(entries: Vec<ElementNode>) -> ElementNode {
    ElementNode::sequence_array("fieldExceptions", entries)
}

/// Wraps `securityData` entries into a `ReferenceDataResponse` message.
pub fn reference_message(nodes: Vec<ElementNode>) -> MockMessage {
    MockMessage::new(
        "ReferenceDataResponse",
        ElementNode::sequence(
            "ReferenceDataResponse",
            vec![ElementNode::sequence_array("securityData", nodes)],
        ),
    )
}

/// Message carrying a top-level `responseError`.
pub fn response_error_message(category: &str, message: &str) -> MockMessage {
    MockMessage::new(
        "ReferenceDataResponse",
        ElementNode::sequence(
            "ReferenceDataResponse",
            vec![ElementNode::sequence(
                "responseError",
                error_info_children(category, message),
            )],
        ),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    message_type: String,
    correlation_ids: Vec<CorrelationId>,
    root: ElementNode,
}

impl MockMessage {
    pub fn new(message_type: impl Into<String>, root: ElementNode) -> Self {
        Self {
            message_type: message_type.into(),
            correlation_ids: Vec::new(),
            root,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_ids.push(CorrelationId::new(id));
        self
    }
}

impl Message for MockMessage {
    type Element = ElementNode;

    fn message_type(&self) -> &str {
        &self.message_type
    }

    fn correlation_ids(&self) -> Vec<CorrelationId> {
        self.correlation_ids.clone()
    }

    fn as_element(&self) -> ElementNode {
        self.root.clone()
    }

    fn dump(&self) -> String {
        let mut map = Map::new();
        map.insert(self.message_type.clone(), self.root.to_json());
        Json::Object(map).to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockEvent {
    event_type: EventType,
    messages: Vec<MockMessage>,
}

impl MockEvent {
    pub fn new(event_type: EventType, messages: Vec<MockMessage>) -> Self {
        Self {
            event_type,
            messages,
        }
    }

    pub fn response(messages: Vec<MockMessage>) -> Self {
        Self::new(EventType::Response, messages)
    }

    pub fn partial(messages: Vec<MockMessage>) -> Self {
        Self::new(EventType::PartialResponse, messages)
    }

    pub fn subscription_data(messages: Vec<MockMessage>) -> Self {
        Self::new(EventType::SubscriptionData, messages)
    }

    pub fn subscription_status(messages: Vec<MockMessage>) -> Self {
        Self::new(EventType::SubscriptionStatus, messages)
    }

    pub fn timeout() -> Self {
        Self::new(EventType::Timeout, Vec::new())
    }

    pub fn admin(code: i32) -> Self {
        Self::new(EventType::Admin(code), Vec::new())
    }
}

impl Event for MockEvent {
    type Message = MockMessage;

    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn messages(&self) -> Vec<MockMessage> {
        self.messages.clone()
    }
}

/// Outbound request captured by the mock transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedRequest {
    pub service: String,
    pub operation: String,
    values: BTreeMap<String, WireValue>,
    arrays: BTreeMap<String, Vec<WireValue>>,
    elements: BTreeMap<String, Vec<RecordedRequest>>,
}

impl RecordedRequest {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(WireValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[WireValue] {
        self.arrays.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn strings(&self, name: &str) -> Vec<String> {
        self.list(name)
            .iter()
            .filter_map(|value| match value {
                WireValue::String(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn elements(&self, name: &str) -> &[RecordedRequest] {
        self.elements
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `(fieldId, value)` pairs appended under `overrides`.
    pub fn overrides(&self) -> Vec<(String, String)> {
        self.elements("overrides")
            .iter()
            .map(|entry| {
                (
                    entry.get_str("fieldId").unwrap_or_default().to_owned(),
                    entry.get_str("value").unwrap_or_default().to_owned(),
                )
            })
            .collect()
    }
}

impl RequestBuilder for RecordedRequest {
    fn set(&mut self, name: &str, value: WireValue) -> Result<()> {
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    fn append(&mut self, name: &str, value: WireValue) -> Result<()> {
        self.arrays.entry(name.to_owned()).or_default().push(value);
        Ok(())
    }

    fn append_element(&mut self, name: &str) -> Result<&mut dyn RequestBuilder> {
        let entries = self.elements.entry(name.to_owned()).or_default();
        let index = entries.len();
        entries.push(RecordedRequest::default());
        Ok(&mut entries[index])
    }
}

#[derive(Debug, Clone)]
pub struct MockService {
    name: String,
}

impl MockService {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Service for MockService {
    type Request = RecordedRequest;

    fn name(&self) -> &str {
        &self.name
    }

    fn create_request(&self, operation: &str) -> Result<RecordedRequest> {
        Ok(RecordedRequest::new(&self.name, operation))
    }
}

#[derive(Debug, Default)]
struct Script {
    refuse_start: bool,
    refuse_services: bool,
    events: VecDeque<MockEvent>,
    sent: Vec<RecordedRequest>,
    subscriptions: Vec<SubscriptionEntry>,
    opened_services: Vec<String>,
    addresses: Vec<String>,
    polls: Vec<Duration>,
    sessions_started: usize,
    sessions_stopped: usize,
}

/// Session factory replaying a shared event script.
///
/// Clones share the same script, so a test keeps one handle for inspection
/// while the terminal owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    script: Rc<RefCell<Script>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(self, event: MockEvent) -> Self {
        self.push_event(event);
        self
    }

    pub fn push_event(&self, event: MockEvent) {
        self.script.borrow_mut().events.push_back(event);
    }

    /// Sessions fail to start.
    pub fn refusing_start(self) -> Self {
        self.script.borrow_mut().refuse_start = true;
        self
    }

    /// Sessions start but cannot open any service.
    pub fn refusing_services(self) -> Self {
        self.script.borrow_mut().refuse_services = true;
        self
    }

    pub fn sent_requests(&self) -> Vec<RecordedRequest> {
        self.script.borrow().sent.clone()
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionEntry> {
        self.script.borrow().subscriptions.clone()
    }

    pub fn opened_services(&self) -> Vec<String> {
        self.script.borrow().opened_services.clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.script.borrow().addresses.clone()
    }

    pub fn polls(&self) -> Vec<Duration> {
        self.script.borrow().polls.clone()
    }

    pub fn remaining_events(&self) -> usize {
        self.script.borrow().events.len()
    }

    pub fn sessions_started(&self) -> usize {
        self.script.borrow().sessions_started
    }

    pub fn sessions_stopped(&self) -> usize {
        self.script.borrow().sessions_stopped
    }
}

impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    fn create_session(&self, config: &TerminalConfig) -> ScriptedSession {
        self.script.borrow_mut().addresses.push(config.address());
        ScriptedSession {
            script: Rc::clone(&self.script),
            running: false,
        }
    }
}

#[derive(Debug)]
pub struct ScriptedSession {
    script: Rc<RefCell<Script>>,
    running: bool,
}

impl Session for ScriptedSession {
    type Service = MockService;
    type Event = MockEvent;

    fn start(&mut self) -> bool {
        let mut script = self.script.borrow_mut();
        if script.refuse_start {
            return false;
        }
        script.sessions_started += 1;
        self.running = true;
        true
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.script.borrow_mut().sessions_stopped += 1;
        }
    }

    fn open_service(&mut self, name: &str) -> bool {
        let mut script = self.script.borrow_mut();
        if script.refuse_services || !self.running {
            return false;
        }
        script.opened_services.push(name.to_owned());
        true
    }

    fn get_service(&self, name: &str) -> Result<MockService> {
        let script = self.script.borrow();
        if script.opened_services.iter().any(|opened| opened == name) {
            Ok(MockService {
                name: name.to_owned(),
            })
        } else {
            Err(Error::Transport(format!("service {name} is not open")))
        }
    }

    fn send_request(&mut self, request: RecordedRequest) -> Result<()> {
        self.script.borrow_mut().sent.push(request);
        Ok(())
    }

    fn subscribe(&mut self, subscriptions: &[SubscriptionEntry]) -> Result<()> {
        self.script
            .borrow_mut()
            .subscriptions
            .extend_from_slice(subscriptions);
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> MockEvent {
        let mut script = self.script.borrow_mut();
        script.polls.push(timeout);
        script.events.pop_front().unwrap_or_else(MockEvent::timeout)
    }
}
