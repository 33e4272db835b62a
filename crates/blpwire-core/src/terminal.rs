//! Synchronous request executor.
//!
//! Every call to [`Terminal::execute`] runs on its own session:
//!
//! ```text
//! start session -> open service -> build wire request -> new_response -> send
//!   -> poll: RESPONSE (final) | PARTIAL_RESPONSE | anything else (admin)
//!   -> error policy -> response
//! ```
//!
//! Polling uses [`TerminalConfig::poll_timeout`] re-armed every iteration and
//! has no overall deadline: a server that never sends the final response keeps
//! the call polling.

use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

use time::{Date, PrimitiveDateTime};
use tracing::{debug, info};

use crate::config::TerminalConfig;
use crate::error::{Error, Result};
use crate::request::options::{MarketEvent, Periodicity, ScreenType};
use crate::request::{
    HistoricalDataRequest, IntradayBarRequest, IntradayTickRequest, Overrides,
    ReferenceDataRequest, Request, ScreeningRequest,
};
use crate::response::{FieldMapResponse, HistoricalResponse, RecordResponse};
use crate::transport::{Event, EventType, Session, SessionFactory};

/// Stops the wrapped session when dropped.
struct SessionGuard<S: Session> {
    session: S,
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        debug!("stopping session");
        self.session.stop();
    }
}

/// Per-call settings accepted by the `*_with` convenience methods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub overrides: Overrides,
    pub ignore_security_error: bool,
    pub ignore_field_error: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(field.into(), value.into());
        self
    }

    pub fn ignore_security_error(mut self, ignore: bool) -> Self {
        self.ignore_security_error = ignore;
        self
    }

    pub fn ignore_field_error(mut self, ignore: bool) -> Self {
        self.ignore_field_error = ignore;
        self
    }
}

/// Caller-owned client bound to one terminal address.
#[derive(Debug, Clone)]
pub struct Terminal<F> {
    config: TerminalConfig,
    factory: F,
}

impl<F: SessionFactory> Terminal<F> {
    pub fn new(config: TerminalConfig, factory: F) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    /// Starts and immediately stops a throwaway session.
    pub fn check_session(&self) -> bool {
        let mut session = self.factory.create_session(&self.config);
        let started = session.start();
        session.stop();
        started
    }

    fn start_session(&self) -> Result<SessionGuard<F::Session>> {
        let mut session = self.factory.create_session(&self.config);
        if !session.start() {
            return Err(Error::SessionStart);
        }
        Ok(SessionGuard { session })
    }

    /// Submits `request`, drives it to its final response and applies the
    /// request's ignore/raise policy.
    ///
    /// The session is stopped on every exit path.
    pub fn execute<R: Request>(&self, request: &mut R) -> Result<R::Response> {
        let mut session = self.start_session()?;
        info!(terminal = %self, request = %request, "executing request");

        let service_name = request.service_name().to_owned();
        if !session.open_service(&service_name) {
            return Err(Error::ServiceOpen {
                service: service_name,
            });
        }
        let service = session.get_service(&service_name)?;
        let wire = request.build_wire_request(&service)?;

        request.new_response();
        session.send_request(wire)?;

        loop {
            let event = session.next_event(self.config.poll_timeout);
            match event.event_type() {
                EventType::Response => {
                    request.on_event(&event, true)?;
                    break;
                }
                EventType::PartialResponse => request.on_event(&event, false)?,
                _ => request.on_admin_event(&event)?,
            }
        }

        request.errors().check()?;
        request.take_response().ok_or(Error::NoResponse)
    }

    pub fn get_reference_data<I, S, J, T>(
        &self,
        securities: I,
        fields: J,
    ) -> Result<FieldMapResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.get_reference_data_with(securities, fields, &RequestOptions::default())
    }

    pub fn get_reference_data_with<I, S, J, T>(
        &self,
        securities: I,
        fields: J,
        options: &RequestOptions,
    ) -> Result<FieldMapResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut request = ReferenceDataRequest::new(securities, fields)?
            .ignore_security_error(options.ignore_security_error)
            .ignore_field_error(options.ignore_field_error)
            .with_overrides(options.overrides.clone());
        self.execute(&mut request)
    }

    pub fn get_historical<I, S, J, T>(
        &self,
        securities: I,
        fields: J,
        start: Option<Date>,
        end: Option<Date>,
        periodicity: Periodicity,
    ) -> Result<HistoricalResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.get_historical_with(
            securities,
            fields,
            start,
            end,
            periodicity,
            &RequestOptions::default(),
        )
    }

    pub fn get_historical_with<I, S, J, T>(
        &self,
        securities: I,
        fields: J,
        start: Option<Date>,
        end: Option<Date>,
        periodicity: Periodicity,
        options: &RequestOptions,
    ) -> Result<HistoricalResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut request = HistoricalDataRequest::new(securities, fields, start, end)?
            .periodicity(periodicity)
            .ignore_security_error(options.ignore_security_error)
            .ignore_field_error(options.ignore_field_error)
            .with_overrides(options.overrides.clone());
        self.execute(&mut request)
    }

    pub fn get_intraday_bar(
        &self,
        security: &str,
        event: MarketEvent,
        interval: Option<u32>,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
    ) -> Result<RecordResponse> {
        let mut request = IntradayBarRequest::new(security, start, end)?.event(event);
        if let Some(minutes) = interval {
            request = request.interval(minutes)?;
        }
        self.execute(&mut request)
    }

    pub fn get_intraday_tick<E>(
        &self,
        security: &str,
        events: E,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
    ) -> Result<RecordResponse>
    where
        E: IntoIterator<Item = MarketEvent>,
    {
        let mut request = IntradayTickRequest::new(security, start, end)?.events(events);
        self.execute(&mut request)
    }

    pub fn get_screener(
        &self,
        name: &str,
        group: &str,
        screen_type: ScreenType,
        as_of: Option<Date>,
        language: Option<&str>,
    ) -> Result<FieldMapResponse> {
        let mut request = ScreeningRequest::new(name)?
            .group(group)
            .screen_type(screen_type);
        if let Some(as_of) = as_of {
            request = request.as_of(as_of);
        }
        if let Some(language) = language {
            request = request.language(language);
        }
        self.execute(&mut request)
    }
}

impl<F> Display for Terminal<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Terminal({})", self.config.address())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{reference_message, response_error_message, MockEvent, ScriptedFactory};

    fn terminal(factory: &ScriptedFactory) -> Terminal<ScriptedFactory> {
        Terminal::new(
            TerminalConfig::default().with_poll_timeout(Duration::from_millis(25)),
            factory.clone(),
        )
    }

    fn request() -> ReferenceDataRequest {
        ReferenceDataRequest::new(["AAA"], ["PX_LAST"]).expect("valid")
    }

    #[test]
    fn failed_start_surfaces_transport_error() {
        let factory = ScriptedFactory::new().refusing_start();
        let err = terminal(&factory)
            .execute(&mut request())
            .expect_err("must fail");
        assert!(matches!(err, Error::SessionStart));
        assert!(err.is_transport());
        assert!(factory.sent_requests().is_empty());
    }

    #[test]
    fn failed_service_open_stops_session() {
        let factory = ScriptedFactory::new().refusing_services();
        let err = terminal(&factory)
            .execute(&mut request())
            .expect_err("must fail");
        assert!(matches!(err, Error::ServiceOpen { ref service } if service == "//blp/refdata"));
        assert_eq!(factory.sessions_stopped(), 1);
    }

    #[test]
    fn polls_past_admin_and_timeout_events_with_configured_timeout() {
        let factory = ScriptedFactory::new()
            .with_event(MockEvent::admin(9))
            .with_event(MockEvent::timeout())
            .with_event(MockEvent::response(vec![reference_message(vec![])]));

        let response = terminal(&factory).execute(&mut request()).expect("response");
        assert!(response.is_empty());
        assert_eq!(factory.polls(), vec![Duration::from_millis(25); 3]);
        assert_eq!(factory.sessions_stopped(), 1);
    }

    #[test]
    fn response_error_aborts_and_stops_session() {
        let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![
            response_error_message("BAD_REQUEST", "oops"),
        ]));

        let err = terminal(&factory)
            .execute(&mut request())
            .expect_err("must fail");
        assert_eq!(err.code(), "response.error");
        assert_eq!(factory.sessions_stopped(), 1);
    }

    #[test]
    fn check_session_reports_start_result() {
        assert!(terminal(&ScriptedFactory::new()).check_session());
        assert!(!terminal(&ScriptedFactory::new().refusing_start()).check_session());
    }
}
