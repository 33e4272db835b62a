//! Behavior tests for the streaming subscription grid.

use std::time::Duration;

use blpwire_core::mock::{ElementNode, MockEvent, MockMessage, ScriptedFactory};
use blpwire_core::{Error, SubscriptionMatrix, TerminalConfig, Value};

const POLL: Duration = Duration::from_millis(20);

fn matrix(factory: &ScriptedFactory, interval: Option<f64>) -> SubscriptionMatrix<ScriptedFactory> {
    SubscriptionMatrix::new(
        TerminalConfig::default(),
        factory.clone(),
        ["ESA Index", "CLA Comdty"],
        ["LAST_PRICE", "BID", "ASK"],
        interval,
    )
    .expect("valid subscription")
}

fn tick(ticker: &str, fields: Vec<ElementNode>) -> MockMessage {
    MockMessage::new(
        "MarketDataEvents",
        ElementNode::sequence("MarketDataEvents", fields),
    )
    .with_correlation_id(ticker)
}

#[test]
fn first_poll_subscribes_lazily_and_later_polls_reuse_the_session() {
    // Given: a matrix that has never been polled
    let factory = ScriptedFactory::new();
    let mut matrix = matrix(&factory, None);
    assert!(!matrix.is_running());
    assert!(factory.subscriptions().is_empty());

    // When: it is polled twice
    matrix.check_for_updates(POLL).expect("first poll");
    matrix.check_for_updates(POLL).expect("second poll");

    // Then: one session, one subscription per ticker, no conflation option
    assert_eq!(factory.sessions_started(), 1);
    let entries = factory.subscriptions();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.options.is_empty()));
    assert_eq!(factory.polls(), vec![POLL; 2]);
}

#[test]
fn latest_value_wins_for_each_cell() {
    // Given: two updates for the same ticker in consecutive events
    let factory = ScriptedFactory::new()
        .with_event(MockEvent::subscription_data(vec![tick(
            "ESA Index",
            vec![
                ElementNode::float64("LAST_PRICE", 5000.25),
                ElementNode::float64("BID", 5000.0),
            ],
        )]))
        .with_event(MockEvent::subscription_data(vec![tick(
            "ESA Index",
            vec![ElementNode::float64("LAST_PRICE", 5001.0)],
        )]));
    let mut matrix = matrix(&factory, Some(1.0));

    // When: each event is consumed by its own poll
    matrix.check_for_updates(POLL).expect("first update");
    assert_eq!(
        matrix.value("ESA Index", "LAST_PRICE"),
        Some(&Value::Float(5000.25))
    );
    matrix.check_for_updates(POLL).expect("second update");

    // Then: the overwritten cell moved, the untouched ones kept their values
    assert_eq!(
        matrix.row("ESA Index").expect("row"),
        [Value::Float(5001.0), Value::Float(5000.0), Value::Null]
    );
    assert_eq!(
        matrix.row("CLA Comdty").expect("row"),
        [Value::Null, Value::Null, Value::Null]
    );
}

#[test]
fn status_events_are_skipped_until_data_arrives() {
    // Given: a started acknowledgement ahead of the first data event
    let started = MockMessage::new(
        "SubscriptionStarted",
        ElementNode::sequence("SubscriptionStarted", Vec::new()),
    )
    .with_correlation_id("CLA Comdty");
    let factory = ScriptedFactory::new()
        .with_event(MockEvent::subscription_status(vec![started]))
        .with_event(MockEvent::admin(5))
        .with_event(MockEvent::subscription_data(vec![tick(
            "CLA Comdty",
            vec![ElementNode::float64("ASK", 78.31)],
        )]));
    let mut matrix = matrix(&factory, None);

    // When: polled once
    matrix.check_for_updates(POLL).expect("poll");

    // Then: the single call consumed all three events
    assert_eq!(factory.remaining_events(), 0);
    assert_eq!(matrix.value("CLA Comdty", "ASK"), Some(&Value::Float(78.31)));
}

#[test]
fn subscription_failure_aborts_the_poll() {
    let failure = MockMessage::new(
        "SubscriptionFailure",
        ElementNode::sequence(
            "SubscriptionFailure",
            vec![ElementNode::sequence(
                "reason",
                vec![
                    ElementNode::string("source", "mktdata"),
                    ElementNode::string("description", "Not authorized"),
                ],
            )],
        ),
    )
    .with_correlation_id("CLA Comdty");
    let factory =
        ScriptedFactory::new().with_event(MockEvent::subscription_status(vec![failure]));
    let mut matrix = matrix(&factory, None);

    let err = matrix.check_for_updates(POLL).expect_err("failure");

    assert_eq!(err.code(), "subscription.failure");
    assert!(matches!(
        err,
        Error::SubscriptionFailure { ref security, .. } if security == "CLA Comdty"
    ));
}

#[test]
fn frame_snapshot_is_indexed_by_ticker() {
    let factory = ScriptedFactory::new().with_event(MockEvent::subscription_data(vec![tick(
        "CLA Comdty",
        vec![ElementNode::float64("BID", 78.3)],
    )]));
    let mut matrix = matrix(&factory, None);
    matrix.check_for_updates(POLL).expect("poll");

    let frame = matrix.frame();

    assert_eq!(frame.index_name(), Some("ticker"));
    assert_eq!(frame.shape(), (2, 3));
    assert_eq!(
        frame.cell(1, &String::from("BID")),
        Some(&Value::Float(78.3))
    );
}

#[test]
fn stopping_and_polling_again_resubscribes() {
    let factory = ScriptedFactory::new();
    let mut matrix = matrix(&factory, None);
    matrix.check_for_updates(POLL).expect("poll");

    matrix.stop();
    assert!(!matrix.is_running());
    matrix.check_for_updates(POLL).expect("poll after stop");

    assert_eq!(factory.sessions_started(), 2);
    assert_eq!(factory.sessions_stopped(), 1);
    assert_eq!(factory.subscriptions().len(), 4);
}

#[test]
fn refused_session_start_is_a_transport_error() {
    let factory = ScriptedFactory::new().refusing_start();
    let mut matrix = matrix(&factory, None);

    let err = matrix.check_for_updates(POLL).expect_err("no session");

    assert!(err.is_transport());
    assert!(!matrix.is_running());
}
