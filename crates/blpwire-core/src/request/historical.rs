use std::fmt::{Display, Formatter};

use time::{Date, Duration, OffsetDateTime};
use tracing::warn;

use crate::codec::{child_text, child_value, message_iter, node_iter, require_child};
use crate::element::Element;
use crate::error::{Error, PayloadError, Result, ValidationError};
use crate::failure::{as_security_error, ErrorLog};
use crate::request::options::{
    NonTradingDayFillMethod, NonTradingDayFillOption, OverrideOption, Periodicity,
    PeriodicityAdjustment, PricingOption,
};
use crate::request::{
    apply_overrides, compact_date, set_flag, set_option, validate_fields, validate_range,
    validate_securities, Overrides, Request,
};
use crate::response::HistoricalResponse;
use crate::transport::{Event, Message, RequestBuilder, Service, WireValue};
use crate::value::Table;

/// Daily-or-coarser time series for a set of securities.
#[derive(Debug, Clone)]
pub struct HistoricalDataRequest {
    securities: Vec<String>,
    fields: Vec<String>,
    start: Date,
    end: Date,
    periodicity: Periodicity,
    periodicity_adjustment: Option<PeriodicityAdjustment>,
    currency: Option<String>,
    override_option: Option<OverrideOption>,
    pricing_option: Option<PricingOption>,
    fill_option: Option<NonTradingDayFillOption>,
    fill_method: Option<NonTradingDayFillMethod>,
    max_data_points: Option<u32>,
    calendar_code_override: Option<String>,
    adjustment_normal: Option<bool>,
    adjustment_abnormal: Option<bool>,
    adjustment_split: Option<bool>,
    adjustment_follow_dpdf: Option<bool>,
    overrides: Overrides,
    errors: ErrorLog,
    response: Option<HistoricalResponse>,
}

/// Same calendar day one year earlier; 29 February maps to the 28th.
fn one_year_before(date: Date) -> Date {
    let year = date.year() - 1;
    date.replace_year(year)
        .or_else(|_| date.replace_day(28).and_then(|day| day.replace_year(year)))
        .unwrap_or(date - Duration::days(365))
}

impl HistoricalDataRequest {
    pub const OPERATION: &'static str = "HistoricalDataRequest";

    /// `end` defaults to today (UTC) and `start` to one year before `end`.
    pub fn new<I, S, J, T>(
        securities: I,
        fields: J,
        start: Option<Date>,
        end: Option<Date>,
    ) -> std::result::Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let end = end.unwrap_or_else(|| OffsetDateTime::now_utc().date());
        let start = start.unwrap_or_else(|| one_year_before(end));
        validate_range(start, end)?;

        Ok(Self {
            securities: validate_securities(securities)?,
            fields: validate_fields(fields)?,
            start,
            end,
            periodicity: Periodicity::default(),
            periodicity_adjustment: None,
            currency: None,
            override_option: None,
            pricing_option: None,
            fill_option: None,
            fill_method: None,
            max_data_points: None,
            calendar_code_override: None,
            adjustment_normal: None,
            adjustment_abnormal: None,
            adjustment_split: None,
            adjustment_follow_dpdf: None,
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

    pub fn periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = periodicity;
        self
    }

    pub fn periodicity_adjustment(mut self, adjustment: PeriodicityAdjustment) -> Self {
        self.periodicity_adjustment = Some(adjustment);
        self
    }

    /// Converts values into `currency`, a three-letter uppercase ISO code.
    pub fn currency(mut self, currency: &str) -> std::result::Result<Self, ValidationError> {
        let code = currency.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency {
                value: currency.to_owned(),
            });
        }
        self.currency = Some(code.to_owned());
        Ok(self)
    }

    pub fn override_option(mut self, option: OverrideOption) -> Self {
        self.override_option = Some(option);
        self
    }

    pub fn pricing_option(mut self, option: PricingOption) -> Self {
        self.pricing_option = Some(option);
        self
    }

    pub fn non_trading_day_fill_option(mut self, option: NonTradingDayFillOption) -> Self {
        self.fill_option = Some(option);
        self
    }

    pub fn non_trading_day_fill_method(mut self, method: NonTradingDayFillMethod) -> Self {
        self.fill_method = Some(method);
        self
    }

    pub fn max_data_points(mut self, points: u32) -> std::result::Result<Self, ValidationError> {
        if points == 0 {
            return Err(ValidationError::ZeroMaxDataPoints);
        }
        self.max_data_points = Some(points);
        Ok(self)
    }

    /// Two-letter country calendar used to decide trading days.
    pub fn calendar_code_override(mut self, code: impl Into<String>) -> Self {
        self.calendar_code_override = Some(code.into());
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

    pub const fn start(&self) -> Date {
        self.start
    }

    pub const fn end(&self) -> Date {
        self.end
    }

    fn is_requested(&self, security: &str) -> bool {
        self.securities.iter().any(|requested| requested == security)
    }

    fn on_security_data_node<E: Element>(
        &mut self,
        security: &str,
        node: &E,
    ) -> std::result::Result<(), PayloadError> {
        let mut columns = Vec::with_capacity(self.fields.len() + 1);
        columns.push(String::from(HistoricalResponse::INDEX));
        columns.extend(self.fields.iter().cloned());

        let mut table = Table::with_columns(columns.iter().cloned());
        if let Some(rows) = node.get_element("fieldData") {
            for row in node_iter(&rows)? {
                for column in &columns {
                    table.push(column, child_value(&row, column, true)?);
                }
            }
        }

        if let Some(response) = self.response.as_mut() {
            response.on_security_complete(security, table);
        }
        Ok(())
    }
}

impl Display for HistoricalDataRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HistoricalDataRequest([{}], [{}], start={}, end={}, period={})",
            self.securities.join(","),
            self.fields.join(","),
            self.start,
            self.end,
            self.periodicity
        )
    }
}

impl Request for HistoricalDataRequest {
    type Response = HistoricalResponse;

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
        wire.set("startDate", WireValue::from(compact_date(self.start)))?;
        wire.set("endDate", WireValue::from(compact_date(self.end)))?;
        wire.set("periodicitySelection", self.periodicity.as_str().into())?;

        set_option(
            &mut wire,
            "periodicityAdjustment",
            self.periodicity_adjustment.map(|value| value.as_str()),
        )?;
        set_option(&mut wire, "currency", self.currency.as_deref())?;
        set_option(
            &mut wire,
            "overrideOption",
            self.override_option.map(|value| value.as_str()),
        )?;
        set_option(
            &mut wire,
            "pricingOption",
            self.pricing_option.map(|value| value.as_str()),
        )?;
        set_option(
            &mut wire,
            "nonTradingDayFillOption",
            self.fill_option.map(|value| value.as_str()),
        )?;
        set_option(
            &mut wire,
            "nonTradingDayFillMethod",
            self.fill_method.map(|value| value.as_str()),
        )?;
        set_option(&mut wire, "maxDataPoints", self.max_data_points)?;
        set_option(
            &mut wire,
            "calendarCodeOverride",
            self.calendar_code_override.as_deref(),
        )?;

        set_flag(&mut wire, "adjustmentNormal", self.adjustment_normal)?;
        set_flag(&mut wire, "adjustmentAbnormal", self.adjustment_abnormal)?;
        set_flag(&mut wire, "adjustmentSplit", self.adjustment_split)?;
        set_flag(&mut wire, "adjustmentFollowDPDF", self.adjustment_follow_dpdf)?;
        apply_overrides(&mut wire, &self.overrides)?;
        Ok(wire)
    }

    fn new_response(&mut self) {
        self.errors.clear();
        self.response = Some(HistoricalResponse::new(&self.fields));
    }

    fn on_event<Ev: Event>(&mut self, event: &Ev, _is_final: bool) -> Result<()> {
        if self.response.is_none() {
            return Err(Error::NoResponse);
        }
        for message in message_iter(event) {
            let message = message?;
            // One securityData node per message.
            let node = message.get_element("securityData").ok_or_else(|| {
                PayloadError::MissingElement {
                    name: String::from("securityData"),
                    parent: message.message_type().to_owned(),
                }
            })?;
            let security = child_text(&node, "security")?;
            if !self.is_requested(&security) {
                warn!(security = %security, "skipping unrequested security");
                continue;
            }
            if node.has_element("securityError") {
                let error = as_security_error(&require_child(&node, "securityError")?, &security)?;
                // Chunks received before the failure are discarded with it.
                if let Some(response) = self.response.as_mut() {
                    response.remove(&security);
                }
                self.errors.record_security_error(error);
            } else if self.errors.has_security_error(&security) {
                warn!(security = %security, "skipping data for failed security");
            } else {
                self.on_security_data_node(&security, &node)?;
            }
        }
        Ok(())
    }

    fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    fn take_response(&mut self) -> Option<HistoricalResponse> {
        self.response.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        security_data, security_error_node, ElementNode, MockEvent, MockMessage, MockService,
    };
    use crate::value::Value;
    use time::macros::date;

    fn historical_message(node: ElementNode) -> MockMessage {
        MockMessage::new(
            "HistoricalDataResponse",
            ElementNode::sequence("HistoricalDataResponse", vec![node]),
        )
    }

    fn bar(day: Date, price: f64) -> ElementNode {
        ElementNode::sequence(
            "fieldData",
            vec![
                ElementNode::date("date", day),
                ElementNode::float64("PX_LAST", price),
            ],
        )
    }

    fn request() -> HistoricalDataRequest {
        HistoricalDataRequest::new(
            ["AAA"],
            ["PX_LAST", "VOLUME"],
            Some(date!(2024 - 01 - 01)),
            Some(date!(2024 - 01 - 31)),
        )
        .expect("valid")
    }

    #[test]
    fn defaults_to_trailing_year_daily() {
        let request =
            HistoricalDataRequest::new(["AAA"], ["PX_LAST"], None, Some(date!(2024 - 02 - 29)))
                .expect("valid");
        assert_eq!(request.start(), date!(2023 - 02 - 28));

        let wire = request
            .build_wire_request(&MockService::new("//blp/refdata"))
            .expect("wire");
        assert_eq!(wire.get_str("startDate"), Some("20230228"));
        assert_eq!(wire.get_str("endDate"), Some("20240229"));
        assert_eq!(wire.get_str("periodicitySelection"), Some("DAILY"));
        assert!(wire.get("currency").is_none());
    }

    #[test]
    fn encodes_optional_settings() {
        let request = request()
            .periodicity(Periodicity::Weekly)
            .pricing_option(PricingOption::Yield)
            .adjustment_split(false)
            .currency("EUR")
            .expect("currency")
            .max_data_points(20)
            .expect("points");

        let wire = request
            .build_wire_request(&MockService::new("//blp/refdata"))
            .expect("wire");
        assert_eq!(wire.get_str("periodicitySelection"), Some("WEEKLY"));
        assert_eq!(wire.get_str("pricingOption"), Some("PRICING_OPTION_YIELD"));
        assert_eq!(wire.get_str("currency"), Some("EUR"));
        assert_eq!(wire.get("maxDataPoints"), Some(&WireValue::Int(20)));
        assert_eq!(wire.get("adjustmentSplit"), Some(&WireValue::Bool(false)));
        assert!(wire.get("adjustmentNormal").is_none());
    }

    #[test]
    fn validates_range_currency_and_points() {
        let err = HistoricalDataRequest::new(
            ["AAA"],
            ["PX_LAST"],
            Some(date!(2024 - 02 - 01)),
            Some(date!(2024 - 01 - 01)),
        )
        .expect_err("inverted");
        assert!(matches!(err, ValidationError::InvertedRange { .. }));
        assert!(matches!(
            request().currency("usd").expect_err("lowercase"),
            ValidationError::InvalidCurrency { .. }
        ));
        assert_eq!(
            request().max_data_points(0).expect_err("zero"),
            ValidationError::ZeroMaxDataPoints
        );
    }

    #[test]
    fn builds_date_indexed_table_with_missing_cells_as_null() {
        let node = security_data(
            "AAA",
            vec![ElementNode::sequence_array(
                "fieldData",
                vec![bar(date!(2024 - 01 - 02), 1.0), bar(date!(2024 - 01 - 03), 2.0)],
            )],
        );
        let mut request = request();
        request.new_response();
        request
            .on_event(&MockEvent::response(vec![historical_message(node)]), true)
            .expect("event");

        let response = request.take_response().expect("response");
        let table = response.get("AAA").expect("AAA");
        assert_eq!(table.columns(), ["date", "PX_LAST", "VOLUME"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.cell(1, "PX_LAST"), &Value::Float(2.0));
        assert_eq!(table.cell(0, "VOLUME"), &Value::Null);
    }

    #[test]
    fn empty_security_keeps_requested_columns() {
        let node = security_data("AAA", vec![ElementNode::sequence_array("fieldData", vec![])]);
        let mut request = request();
        request.new_response();
        request
            .on_event(&MockEvent::response(vec![historical_message(node)]), true)
            .expect("event");

        let response = request.take_response().expect("response");
        let table = response.get("AAA").expect("AAA");
        assert_eq!(table.columns(), ["date", "PX_LAST", "VOLUME"]);
        assert!(table.is_empty());
    }

    #[test]
    fn security_error_is_recorded_without_data() {
        let node = security_data("AAA", vec![security_error_node("BAD_SEC", "Unknown")]);
        let mut request = request();
        request.new_response();
        request
            .on_event(&MockEvent::response(vec![historical_message(node)]), true)
            .expect("event");

        assert_eq!(request.errors().security_errors().len(), 1);
        assert!(request.take_response().expect("response").is_empty());
    }

    #[test]
    fn late_security_error_discards_earlier_chunks() {
        let data = security_data(
            "AAA",
            vec![ElementNode::sequence_array(
                "fieldData",
                vec![bar(date!(2024 - 01 - 02), 1.0)],
            )],
        );
        let failure = security_data("AAA", vec![security_error_node("BAD_SEC", "Unknown")]);
        let retry = security_data(
            "AAA",
            vec![ElementNode::sequence_array(
                "fieldData",
                vec![bar(date!(2024 - 01 - 03), 2.0)],
            )],
        );
        let mut request = request().ignore_security_error(true);
        request.new_response();
        request
            .on_event(&MockEvent::partial(vec![historical_message(data)]), false)
            .expect("partial");
        request
            .on_event(
                &MockEvent::response(vec![historical_message(failure), historical_message(retry)]),
                true,
            )
            .expect("final");

        assert_eq!(request.errors().security_errors().len(), 1);
        let response = request.take_response().expect("response");
        assert!(response.get("AAA").is_none());
        assert!(response.securities().is_empty());
    }
}
