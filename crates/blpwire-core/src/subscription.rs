//! Live market-data grid fed by a streaming subscription.
//!
//! One subscription per ticker, correlated by the ticker string itself. Each
//! [`SubscriptionMatrix::check_for_updates`] call consumes at most one data
//! event; status and administrative events are re-polled in a loop bounded by
//! [`TerminalConfig::max_status_polls`].

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::{child_text, decode, message_iter};
use crate::config::TerminalConfig;
use crate::element::Element;
use crate::error::{Error, Result, ValidationError};
use crate::frame::Frame;
use crate::request::{validate_fields, validate_securities};
use crate::transport::{
    CorrelationId, Event, EventType, Message, Session, SessionFactory, SubscriptionEntry,
};
use crate::value::Value;

pub const MKTDATA_SERVICE: &str = "//blp/mktdata";

/// Tickers × fields grid of the latest streamed values.
pub struct SubscriptionMatrix<F: SessionFactory> {
    config: TerminalConfig,
    factory: F,
    tickers: Vec<String>,
    fields: Vec<String>,
    interval: Option<f64>,
    grid: Vec<Vec<Value>>,
    session: Option<F::Session>,
}

impl<F: SessionFactory> SubscriptionMatrix<F> {
    /// `interval` is the conflation interval in seconds; `None` streams every tick.
    pub fn new<I, S, J, T>(
        config: TerminalConfig,
        factory: F,
        tickers: I,
        fields: J,
        interval: Option<f64>,
    ) -> std::result::Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tickers = validate_securities(tickers)?;
        let fields = validate_fields(fields)?;
        if let Some(interval) = interval {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(ValidationError::InvalidSubscriptionInterval);
            }
        }
        let grid = vec![vec![Value::Null; fields.len()]; tickers.len()];
        Ok(Self {
            config,
            factory,
            tickers,
            fields,
            interval,
            grid,
            session: None,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    fn entries(&self) -> Vec<SubscriptionEntry> {
        let options = self
            .interval
            .map(|interval| vec![format!("interval={interval:.1}")])
            .unwrap_or_default();
        self.tickers
            .iter()
            .map(|ticker| SubscriptionEntry {
                topic: ticker.clone(),
                fields: self.fields.clone(),
                options: options.clone(),
                correlation_id: CorrelationId::new(ticker.as_str()),
            })
            .collect()
    }

    /// Starts the session, opens the market-data service and subscribes every
    /// ticker. Called lazily by [`SubscriptionMatrix::check_for_updates`].
    pub fn init(&mut self) -> Result<()> {
        self.stop();

        let mut session = self.factory.create_session(&self.config);
        if !session.start() {
            return Err(Error::SessionStart);
        }
        if !session.open_service(MKTDATA_SERVICE) {
            session.stop();
            return Err(Error::ServiceOpen {
                service: String::from(MKTDATA_SERVICE),
            });
        }

        info!(
            tickers = self.tickers.len(),
            fields = %self.fields.join(","),
            "subscribing to market data"
        );
        if let Err(err) = session.subscribe(&self.entries()) {
            session.stop();
            return Err(err);
        }
        self.session = Some(session);
        Ok(())
    }

    /// Polls for the next batch of updates.
    ///
    /// Returns after one data event, a timeout, or once the status re-poll
    /// budget is spent. A `SubscriptionFailure` status fails the call.
    pub fn check_for_updates(&mut self, timeout: Duration) -> Result<()> {
        if self.session.is_none() {
            self.init()?;
        }

        let mut remaining = self.config.max_status_polls;
        loop {
            let Some(session) = self.session.as_mut() else {
                return Err(Error::Transport(String::from(
                    "subscription session is not running",
                )));
            };
            let event = session.next_event(timeout);
            match event.event_type() {
                EventType::SubscriptionData => {
                    info!("subscription data");
                    return self.on_subscription_data(&event);
                }
                EventType::SubscriptionStatus => {
                    info!("subscription status");
                    Self::on_subscription_status(&event)?;
                }
                EventType::Timeout => return Ok(()),
                other => info!(event_type = %other, "ignoring event"),
            }

            if remaining == 0 {
                warn!(
                    budget = self.config.max_status_polls,
                    "status poll budget exhausted"
                );
                return Ok(());
            }
            remaining -= 1;
        }
    }

    fn on_subscription_status<Ev: Event>(event: &Ev) -> Result<()> {
        for message in message_iter(event) {
            let message = message?;
            if message.message_type() != "SubscriptionFailure" {
                continue;
            }
            let security = message
                .correlation_ids()
                .first()
                .map(|id| id.as_str().to_owned())
                .unwrap_or_default();
            let description = match message.get_element("reason") {
                Some(reason) => child_text(&reason, "description")?,
                None => String::new(),
            };
            return Err(Error::SubscriptionFailure {
                security,
                description,
            });
        }
        Ok(())
    }

    fn on_subscription_data<Ev: Event>(&mut self, event: &Ev) -> Result<()> {
        for message in message_iter(event) {
            let message = message?;
            let ids = message.correlation_ids();
            let Some(id) = ids.first() else {
                debug!("data message without correlation id");
                continue;
            };
            let Some(row) = self.tickers.iter().position(|ticker| ticker == id.as_str()) else {
                warn!(correlation_id = %id, "update for unknown subscription");
                continue;
            };

            let root = message.as_element();
            for (column, field) in self.fields.iter().enumerate() {
                if let Some(child) = root.get_element(&field.to_uppercase()) {
                    self.grid[row][column] = decode(&child)?;
                }
            }
        }
        Ok(())
    }

    pub fn value(&self, ticker: &str, field: &str) -> Option<&Value> {
        let row = self.tickers.iter().position(|candidate| candidate == ticker)?;
        let column = self.fields.iter().position(|candidate| candidate == field)?;
        Some(&self.grid[row][column])
    }

    pub fn row(&self, ticker: &str) -> Option<&[Value]> {
        let row = self.tickers.iter().position(|candidate| candidate == ticker)?;
        Some(&self.grid[row])
    }

    /// Snapshot of the grid indexed by ticker.
    pub fn frame(&self) -> Frame<String> {
        let index = self
            .tickers
            .iter()
            .map(|ticker| Value::String(ticker.clone()))
            .collect();
        let mut frame = Frame::new(Some(String::from("ticker")), index);
        for (column, field) in self.fields.iter().enumerate() {
            let values = self.grid.iter().map(|row| row[column].clone()).collect();
            frame.push_column(field.clone(), values);
        }
        frame
    }

    /// Tears the session down; the next poll subscribes again.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }
}

impl<F: SessionFactory> Drop for SubscriptionMatrix<F> {
    fn drop(&mut self) {
        self.stop();
    }
}
