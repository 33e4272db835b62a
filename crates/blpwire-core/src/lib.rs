//! # blpwire Core
//!
//! Client-side protocol layer for a session-based market-data terminal.
//!
//! ## Overview
//!
//! This crate turns typed requests into wire requests, drives a blocking
//! event loop until the final response arrives, and decodes the terminal's
//! self-describing element trees into native values and tables:
//!
//! - **Request variants** for reference data, historical series, intraday
//!   bars and ticks, and equity screens
//! - **Element conversion engine** dispatching on the payload's datatype tags
//! - **Response accumulators** with read-only frame projections
//! - **Error policy** deciding whether security and field failures abort a call
//! - **Subscription matrix** holding the latest streamed value per ticker/field
//!
//! The network transport itself stays behind the traits in [`transport`].
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codec`] | Element-to-value conversion and payload iterators |
//! | [`config`] | Terminal address and polling configuration |
//! | [`element`] | Datatype tags and the element capability trait |
//! | [`error`] | Validation, payload and top-level errors |
//! | [`failure`] | Security/field errors and the ignore/raise policy |
//! | [`frame`] | Tabular projection of finished responses |
//! | [`logging`] | Default `tracing` subscriber setup |
//! | [`mock`] | In-memory transport for offline tests |
//! | [`request`] | Request variants and their lifecycle |
//! | [`response`] | Response accumulators |
//! | [`subscription`] | Streaming subscription grid |
//! | [`terminal`] | Request executor |
//! | [`transport`] | Session, service, event and message traits |
//! | [`value`] | Decoded values and tables |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blpwire_core::{ReferenceDataRequest, Terminal, TerminalConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     blpwire_core::logging::init_default();
//!
//!     // `factory` comes from the session SDK binding.
//!     let terminal = Terminal::new(TerminalConfig::from_env()?, factory);
//!
//!     let mut request = ReferenceDataRequest::new(["IBM US Equity"], ["PX_LAST", "NAME"])?
//!         .ignore_field_error(true);
//!     let response = terminal.execute(&mut request)?;
//!
//!     println!("{:?}", response.value("IBM US Equity", "PX_LAST"));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │    Terminal     │────▶│ SessionFactory   │
//! │  (event loop)   │     │ (transport)      │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Request variant │────▶│ Element codec    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Response + Frame│
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Security and field failures are collected while the response is
//! accumulated and only decide the outcome once the final event arrived:
//!
//! ```rust
//! use blpwire_core::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error {
//!         Error::SecurityErrors(_) | Error::FieldErrors(_) => "check identifiers",
//!         error if error.is_transport() => "terminal unreachable",
//!         _ => error.code(),
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod element;
pub mod error;
pub mod failure;
pub mod frame;
pub mod logging;
pub mod mock;
pub mod request;
pub mod response;
pub mod subscription;
pub mod terminal;
pub mod transport;
pub mod value;

// Configuration
pub use config::TerminalConfig;

// Payload model
pub use element::{DataType, Element, RawValue};
pub use value::{Table, Value};

// Error types
pub use error::{Error, PayloadError, Result, ValidationError};
pub use failure::{ErrorLog, FieldError, SecurityError};

// Requests and responses
pub use frame::Frame;
pub use request::options::{
    MarketEvent, NonTradingDayFillMethod, NonTradingDayFillOption, OverrideOption, Periodicity,
    PeriodicityAdjustment, PricingOption, ScreenType,
};
pub use request::{
    HistoricalDataRequest, IntradayBarRequest, IntradayTickRequest, Overrides,
    ReferenceDataRequest, Request, ScreeningRequest,
};
pub use response::{FieldMapResponse, HistoricalResponse, Record, RecordResponse};

// Execution
pub use subscription::SubscriptionMatrix;
pub use terminal::{RequestOptions, Terminal};
pub use transport::{
    CorrelationId, Event, EventType, Message, RequestBuilder, Service, Session, SessionFactory,
    SubscriptionEntry, WireValue,
};
