//! Behavior tests for the request lifecycle as seen through the terminal.
//!
//! These tests verify what goes out on the wire for each request kind and
//! what the caller gets back once the final response has been processed.

use std::time::Duration;

use blpwire_core::mock::{
    reference_message, security_data, security_error_node, ElementNode, MockEvent, MockMessage,
    ScriptedFactory,
};
use blpwire_core::{
    Error, HistoricalDataRequest, MarketEvent, Periodicity, ReferenceDataRequest, Request,
    RequestOptions, ScreenType, Terminal, TerminalConfig, Value, WireValue,
};
use time::macros::{date, datetime};
use time::Date;

fn terminal(factory: &ScriptedFactory) -> Terminal<ScriptedFactory> {
    Terminal::new(
        TerminalConfig::new("terminal.local", 9000).with_poll_timeout(Duration::from_millis(5)),
        factory.clone(),
    )
}

fn history_message(security: &str, rows: Vec<(Date, f64)>) -> MockMessage {
    let rows = rows
        .into_iter()
        .map(|(day, price)| {
            ElementNode::sequence(
                "fieldData",
                vec![
                    ElementNode::date("date", day),
                    ElementNode::float64("PX_LAST", price),
                ],
            )
        })
        .collect();
    MockMessage::new(
        "HistoricalDataResponse",
        ElementNode::sequence(
            "HistoricalDataResponse",
            vec![security_data(
                security,
                vec![ElementNode::sequence_array("fieldData", rows)],
            )],
        ),
    )
}

fn bar(time: time::PrimitiveDateTime, close: f64) -> ElementNode {
    ElementNode::sequence(
        "barTickData",
        vec![
            ElementNode::datetime("time", time),
            ElementNode::float64("close", close),
            ElementNode::int64("volume", 1_000),
        ],
    )
}

fn bar_message(bars: Vec<ElementNode>) -> MockMessage {
    MockMessage::new(
        "IntradayBarResponse",
        ElementNode::sequence(
            "IntradayBarResponse",
            vec![ElementNode::sequence(
                "barData",
                vec![ElementNode::sequence_array("barTickData", bars)],
            )],
        ),
    )
}

// =============================================================================
// Reference data
// =============================================================================

#[test]
fn reference_request_is_sent_to_refdata_service_at_configured_address() {
    // Given: a terminal with a custom address
    let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![reference_message(
        vec![security_data(
            "IBM US Equity",
            vec![ElementNode::sequence(
                "fieldData",
                vec![ElementNode::float64("PX_LAST", 187.5)],
            )],
        )],
    )]));

    // When: reference data is requested
    let response = terminal(&factory)
        .get_reference_data(["IBM US Equity"], ["PX_LAST"])
        .expect("reference data");

    // Then: one session against that address, one request with both lists
    assert_eq!(factory.addresses(), ["terminal.local:9000"]);
    let sent = factory.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].service, "//blp/refdata");
    assert_eq!(sent[0].operation, "ReferenceDataRequest");
    assert_eq!(sent[0].strings("securities"), ["IBM US Equity"]);
    assert_eq!(sent[0].strings("fields"), ["PX_LAST"]);
    assert_eq!(
        response.value("IBM US Equity", "PX_LAST"),
        Some(&Value::Float(187.5))
    );
}

#[test]
fn overrides_and_flags_reach_the_wire() {
    let factory = ScriptedFactory::new()
        .with_event(MockEvent::response(vec![reference_message(Vec::new())]));
    let mut request = ReferenceDataRequest::new(["AAA"], ["BEST_EPS"])
        .expect("valid")
        .with_override("BEST_FPERIOD_OVERRIDE", "1FY")
        .return_formatted_value(true);

    terminal(&factory).execute(&mut request).expect("response");

    let sent = factory.sent_requests();
    let sent = &sent[0];
    assert_eq!(
        sent.overrides(),
        [(String::from("BEST_FPERIOD_OVERRIDE"), String::from("1FY"))]
    );
    assert_eq!(sent.get("returnFormattedValue"), Some(&WireValue::Bool(true)));
    assert!(sent.get("useUTCTime").is_none());
}

#[test]
fn convenience_call_carries_overrides_and_ignore_flags() {
    // Given: one requested security resolves and the other is unknown
    let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![reference_message(
        vec![
            security_data(
                "AAA",
                vec![ElementNode::sequence(
                    "fieldData",
                    vec![ElementNode::float64("BEST_EPS", 4.2)],
                )],
            ),
            security_data(
                "BBB",
                vec![security_error_node("BAD_SEC", "Unknown/Invalid security")],
            ),
        ],
    )]));
    let options = RequestOptions::new()
        .with_override("BEST_FPERIOD_OVERRIDE", "2FY")
        .ignore_security_error(true);

    // When: the options-taking convenience method is used
    let response = terminal(&factory)
        .get_reference_data_with(["AAA", "BBB"], ["BEST_EPS"], &options)
        .expect("ignored security error");

    // Then: the override went out and the failed security was left out
    let sent = factory.sent_requests();
    assert_eq!(
        sent[0].overrides(),
        [(String::from("BEST_FPERIOD_OVERRIDE"), String::from("2FY"))]
    );
    assert_eq!(response.securities(), ["AAA"]);
    assert_eq!(response.value("AAA", "BEST_EPS"), Some(&Value::Float(4.2)));
}

#[test]
fn plain_convenience_call_keeps_the_raising_policy() {
    let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![reference_message(
        vec![security_data(
            "BBB",
            vec![security_error_node("BAD_SEC", "Unknown/Invalid security")],
        )],
    )]));

    let err = terminal(&factory)
        .get_reference_data(["BBB"], ["PX_LAST"])
        .expect_err("security errors raise by default");

    assert!(matches!(err, Error::SecurityErrors(_)));
    assert!(factory.sent_requests()[0].overrides().is_empty());
}

#[test]
fn event_before_new_response_is_a_programmer_error() {
    let mut request = ReferenceDataRequest::new(["AAA"], ["PX_LAST"]).expect("valid");

    let err = request
        .on_event(&MockEvent::response(vec![reference_message(Vec::new())]), true)
        .expect_err("no accumulator yet");

    assert!(matches!(err, Error::NoResponse));
}

#[test]
fn invalid_parameters_fail_before_a_session_is_started() {
    let factory = ScriptedFactory::new();

    let err = terminal(&factory)
        .get_reference_data(["AAA", " "], ["PX_LAST"])
        .expect_err("blank security");

    assert_eq!(err.code(), "request.invalid");
    assert_eq!(factory.sessions_started(), 0);
}

// =============================================================================
// Historical data
// =============================================================================

#[test]
fn historical_response_aligns_securities_on_date_union() {
    // Given: two securities whose histories only partly overlap
    let factory = ScriptedFactory::new()
        .with_event(MockEvent::partial(vec![history_message(
            "AAA",
            vec![(date!(2024 - 01 - 02), 10.0), (date!(2024 - 01 - 03), 11.0)],
        )]))
        .with_event(MockEvent::response(vec![history_message(
            "BBB",
            vec![(date!(2024 - 01 - 03), 20.0), (date!(2024 - 01 - 04), 21.0)],
        )]));

    // When: the history is requested weekly
    let response = terminal(&factory)
        .get_historical(
            ["AAA", "BBB"],
            ["PX_LAST"],
            Some(date!(2024 - 01 - 01)),
            Some(date!(2024 - 01 - 31)),
            Periodicity::Weekly,
        )
        .expect("history");

    // Then: the wire carries compact dates and the frame covers all three days
    let sent = factory.sent_requests();
    let sent = &sent[0];
    assert_eq!(sent.operation, HistoricalDataRequest::OPERATION);
    assert_eq!(sent.get_str("startDate"), Some("20240101"));
    assert_eq!(sent.get_str("periodicitySelection"), Some("WEEKLY"));

    let frame = response.frame();
    assert_eq!(frame.shape(), (3, 2));
    assert_eq!(
        frame.index(),
        [
            Value::Date(date!(2024 - 01 - 02)),
            Value::Date(date!(2024 - 01 - 03)),
            Value::Date(date!(2024 - 01 - 04)),
        ]
    );
    let bbb = (String::from("BBB"), String::from("PX_LAST"));
    assert_eq!(
        frame.column(&bbb).expect("BBB column"),
        [Value::Null, Value::Float(20.0), Value::Float(21.0)]
    );
}

#[test]
fn historical_security_error_aborts_unless_ignored() {
    let failing = || {
        ScriptedFactory::new().with_event(MockEvent::response(vec![MockMessage::new(
            "HistoricalDataResponse",
            ElementNode::sequence(
                "HistoricalDataResponse",
                vec![security_data(
                    "BAD",
                    vec![security_error_node("BAD_SEC", "Unknown/Invalid security")],
                )],
            ),
        )]))
    };
    let request = || {
        HistoricalDataRequest::new(
            ["BAD"],
            ["PX_LAST"],
            Some(date!(2024 - 01 - 01)),
            Some(date!(2024 - 01 - 10)),
        )
        .expect("valid")
    };

    let err = terminal(&failing())
        .execute(&mut request())
        .expect_err("security error");
    assert!(matches!(err, Error::SecurityErrors(_)));

    let response = terminal(&failing())
        .execute(&mut request().ignore_security_error(true))
        .expect("ignored");
    assert!(response.is_empty());
}

#[test]
fn historical_convenience_call_honours_options() {
    let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![MockMessage::new(
        "HistoricalDataResponse",
        ElementNode::sequence(
            "HistoricalDataResponse",
            vec![security_data(
                "BAD",
                vec![security_error_node("BAD_SEC", "Unknown/Invalid security")],
            )],
        ),
    )]));
    let options = RequestOptions::new()
        .with_override("CRNCY", "EUR")
        .ignore_security_error(true);

    let response = terminal(&factory)
        .get_historical_with(
            ["BAD"],
            ["PX_LAST"],
            Some(date!(2024 - 01 - 01)),
            Some(date!(2024 - 01 - 10)),
            Periodicity::Weekly,
            &options,
        )
        .expect("ignored");

    assert!(response.is_empty());
    let sent = factory.sent_requests();
    assert_eq!(
        sent[0].overrides(),
        [(String::from("CRNCY"), String::from("EUR"))]
    );
    assert_eq!(sent[0].get_str("periodicitySelection"), Some("WEEKLY"));
}

// =============================================================================
// Intraday bars and ticks
// =============================================================================

#[test]
fn intraday_bars_accumulate_across_partial_responses() {
    // Given: bars split over a partial and a final event
    let factory = ScriptedFactory::new()
        .with_event(MockEvent::partial(vec![bar_message(vec![bar(
            datetime!(2024-03-01 14:30),
            100.0,
        )])]))
        .with_event(MockEvent::response(vec![bar_message(vec![bar(
            datetime!(2024-03-01 14:35),
            101.0,
        )])]));

    // When: five-minute bars are requested
    let response = terminal(&factory)
        .get_intraday_bar(
            "AAA US Equity",
            MarketEvent::Bid,
            Some(5),
            Some(datetime!(2024-03-01 14:30)),
            Some(datetime!(2024-03-01 15:30)),
        )
        .expect("bars");

    // Then: records keep arrival order and the wire carries the settings
    assert_eq!(response.len(), 2);
    assert_eq!(
        response.records()[1].get("close"),
        Some(&Value::Float(101.0))
    );
    let sent = factory.sent_requests();
    let sent = &sent[0];
    assert_eq!(sent.get_str("eventType"), Some("BID"));
    assert_eq!(sent.get("interval"), Some(&WireValue::Int(5)));
    assert_eq!(
        sent.get("startDateTime"),
        Some(&WireValue::Datetime(datetime!(2024-03-01 14:30)))
    );

    let frame = response.frame();
    assert_eq!(frame.columns(), ["time", "close", "volume"]);
    assert_eq!(frame.index(), [Value::Int(0), Value::Int(1)]);
}

#[test]
fn intraday_bar_interval_out_of_range_is_rejected() {
    let factory = ScriptedFactory::new();

    let err = terminal(&factory)
        .get_intraday_bar("AAA US Equity", MarketEvent::Trade, Some(0), None, None)
        .expect_err("zero minutes");

    assert!(err.to_string().contains("outside the supported range"));
    assert!(factory.sent_requests().is_empty());
}

#[test]
fn intraday_ticks_request_every_listed_event_type() {
    let tick = ElementNode::sequence(
        "tickData",
        vec![
            ElementNode::datetime("time", datetime!(2024-03-01 14:30:01)),
            ElementNode::string("type", "TRADE"),
            ElementNode::float64("value", 99.5),
            ElementNode::int32("size", 200),
        ],
    );
    let message = MockMessage::new(
        "IntradayTickResponse",
        ElementNode::sequence(
            "IntradayTickResponse",
            vec![ElementNode::sequence(
                "tickData",
                vec![ElementNode::sequence_array("tickData", vec![tick])],
            )],
        ),
    );
    let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![message]));

    let response = terminal(&factory)
        .get_intraday_tick(
            "AAA US Equity",
            [MarketEvent::Trade, MarketEvent::Ask, MarketEvent::Trade],
            Some(datetime!(2024-03-01 14:00)),
            Some(datetime!(2024-03-01 15:00)),
        )
        .expect("ticks");

    let sent = factory.sent_requests();
    let sent = &sent[0];
    assert_eq!(sent.strings("eventTypes"), ["TRADE", "ASK"]);
    assert_eq!(response.len(), 1);
    assert_eq!(response.records()[0].get("size"), Some(&Value::Int(200)));
}

// =============================================================================
// Screening
// =============================================================================

#[test]
fn screen_members_come_back_with_screen_defined_columns() {
    let member = security_data(
        "AAA US Equity",
        vec![ElementNode::sequence(
            "fieldData",
            vec![
                ElementNode::string("Ticker", "AAA"),
                ElementNode::float64("Market Cap", 42.0),
            ],
        )],
    );
    let message = MockMessage::new(
        "BeqsResponse",
        ElementNode::sequence(
            "BeqsResponse",
            vec![ElementNode::sequence(
                "data",
                vec![ElementNode::sequence_array("securityData", vec![member])],
            )],
        ),
    );
    let factory = ScriptedFactory::new().with_event(MockEvent::response(vec![message]));

    let response = terminal(&factory)
        .get_screener(
            "Large Caps",
            "Team",
            ScreenType::Private,
            Some(date!(2024 - 05 - 31)),
            None,
        )
        .expect("screen");

    let sent = factory.sent_requests();
    let sent = &sent[0];
    assert_eq!(sent.operation, "BeqsRequest");
    assert_eq!(sent.get_str("screenName"), Some("Large Caps"));
    assert_eq!(sent.get_str("screenType"), Some("PRIVATE"));
    assert_eq!(sent.get_str("Group"), Some("Team"));
    assert_eq!(
        sent.overrides(),
        [(String::from("PiTDate"), String::from("20240531"))]
    );
    assert_eq!(response.fields(), ["Ticker", "Market Cap"]);
    assert_eq!(
        response.value("AAA US Equity", "Market Cap"),
        Some(&Value::Float(42.0))
    );
}
