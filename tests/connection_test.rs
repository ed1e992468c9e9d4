//! End-to-end client tests against an in-process mock exchange.

mod common;

use std::time::Duration;

use bitfeed::BitfeedError;
use bitfeed::models::{MarketEvent, StreamKind};
use bitfeed::websocket::{CandleParams, ConnectionState, FeedClient};
use futures_util::StreamExt;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tungstenite::Message;
use tungstenite::protocol::frame::coding::CloseCode;

use common::{TIMEOUT, mock_exchange, next_json, send_text};

const SUBSCRIBED_TRADES: &str = include_str!("fixtures/subscribed_trades.json");
const SUBSCRIBED_CANDLES: &str = include_str!("fixtures/subscribed_candles.json");
const CANDLE_UPDATE: &str = include_str!("fixtures/candle_update.json");
const INFO: &str = include_str!("fixtures/info.json");

async fn next_event(events: &mut tokio::sync::mpsc::Receiver<MarketEvent>) -> MarketEvent {
    timeout(TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event queue closed")
}

async fn wait_for_state(client: &FeedClient, expected: ConnectionState) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while client.state() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "state stayed {:?}, expected {expected:?}",
            client.state()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_subscribe_receive_and_unsubscribe_trades() {
    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    let mut events = client.events(16).expect("event queue");

    assert_ok!(client.start().await);
    let mut ws = server.await.expect("server task");
    assert_eq!(client.state(), ConnectionState::Open);
    send_text(&mut ws, INFO).await;

    client.subscribe_trades("tBTCUSD").await.expect("subscribe");
    assert_eq!(
        next_json(&mut ws).await,
        json!({"event": "subscribe", "channel": "trades", "symbol": "tBTCUSD"})
    );

    send_text(&mut ws, SUBSCRIBED_TRADES).await;
    send_text(&mut ws, "[17,[[1,1699999999000,0.5,30000]]]").await;

    match next_event(&mut events).await {
        MarketEvent::BuyTrade(trade) => {
            assert_eq!(trade.amount, dec!(0.5));
            assert_eq!(trade.price, dec!(30000));
            assert_eq!(trade.symbol, "tBTCUSD");
        }
        other => panic!("expected a buy trade, got {other:?}"),
    }
    assert_eq!(
        client.registry().resolve(17),
        Some(("tBTCUSD".to_string(), StreamKind::Trades))
    );

    client.unsubscribe_trades("tBTCUSD").await.expect("unsubscribe");
    assert_eq!(
        next_json(&mut ws).await,
        json!({"event": "unsubscribe", "chanId": 17})
    );
    assert_eq!(client.registry().resolve(17), None);

    // A frame still in flight for the old channel, then a candle
    // subscription as an ordering barrier.
    send_text(&mut ws, "[17,\"te\",[2,1700000000000,-0.1,30001]]").await;
    client
        .subscribe_candles("tBTCUSD", CandleParams::new(60))
        .await
        .expect("subscribe candles");
    assert_eq!(
        next_json(&mut ws).await,
        json!({"event": "subscribe", "channel": "candles", "key": "trade:1m:tBTCUSD"})
    );
    send_text(&mut ws, SUBSCRIBED_CANDLES).await;
    send_text(&mut ws, CANDLE_UPDATE).await;

    match next_event(&mut events).await {
        MarketEvent::Candle(candle) => {
            assert_eq!(candle.close, dec!(102));
            assert_eq!(candle.high, dec!(105));
        }
        other => panic!("trailing frame leaked through: {other:?}"),
    }

    assert_ok!(client.stop().await);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn test_stop_sends_normal_close_frame() {
    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    client.start().await.expect("start");
    let mut ws = server.await.expect("server task");

    client.stop().await.expect("stop");
    assert_eq!(client.state(), ConnectionState::Closed);

    let msg = timeout(TIMEOUT, ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended without close")
        .expect("stream error");
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    client.start().await.expect("start");
    let _ws = server.await.expect("server task");

    let err = assert_err!(client.start().await);
    assert!(matches!(
        err,
        BitfeedError::AlreadyStarted {
            state: ConnectionState::Open
        }
    ));

    client.stop().await.expect("stop");
}

#[tokio::test]
async fn test_start_failure_returns_to_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FeedClient::new(format!("ws://{addr}"));
    let err = assert_err!(client.start().await);

    assert!(matches!(err, BitfeedError::Connection(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_zero_capacity_event_queue_is_rejected() {
    let client = FeedClient::new("ws://127.0.0.1:1");
    let err = assert_err!(client.events(0));
    assert!(matches!(err, BitfeedError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let client = FeedClient::new("ws://127.0.0.1:1");
    assert_ok!(client.stop().await);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    client.start().await.expect("start");
    let _ws = server.await.expect("server task");

    assert_ok!(client.stop().await);
    assert_ok!(client.stop().await);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_duplicate_subscription_is_rejected() {
    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    client.start().await.expect("start");
    let mut ws = server.await.expect("server task");

    client.subscribe_trades("tBTCUSD").await.expect("subscribe");
    let _ = next_json(&mut ws).await;

    let err = assert_err!(client.subscribe_trades("tBTCUSD").await);
    assert!(matches!(
        err,
        BitfeedError::DuplicateSubscription {
            kind: StreamKind::Trades,
            ..
        }
    ));

    // Same symbol on the other stream is a separate binding.
    assert_ok!(client.subscribe_candles("tBTCUSD", CandleParams::new(300)).await);
    assert_eq!(client.registry().len(), 2);

    client.stop().await.expect("stop");
}

#[tokio::test]
async fn test_rejected_subscription_can_be_retried() {
    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    let mut events = client.events(16).expect("event queue");
    client.start().await.expect("start");
    let mut ws = server.await.expect("server task");

    client.subscribe_trades("tBTCUSD").await.expect("subscribe");
    let _ = next_json(&mut ws).await;
    send_text(
        &mut ws,
        r#"{"event":"error","msg":"subscribe: dup","code":10301,"channel":"trades","symbol":"tBTCUSD"}"#,
    )
    .await;

    // The candle stream orders the error before the retry check.
    client
        .subscribe_candles("tBTCUSD", CandleParams::new(60))
        .await
        .expect("subscribe candles");
    let _ = next_json(&mut ws).await;
    send_text(&mut ws, SUBSCRIBED_CANDLES).await;
    send_text(&mut ws, CANDLE_UPDATE).await;
    assert!(matches!(next_event(&mut events).await, MarketEvent::Candle(_)));

    assert!(client.registry().binding("tBTCUSD", StreamKind::Trades).is_none());
    assert_ok!(client.subscribe_trades("tBTCUSD").await);

    client.stop().await.expect("stop");
}

#[tokio::test]
async fn test_remote_close_drops_bindings() {
    let (url, server) = mock_exchange().await;
    let client = FeedClient::new(url);
    client.start().await.expect("start");
    let mut ws = server.await.expect("server task");

    client.subscribe_trades("tBTCUSD").await.expect("subscribe");
    let _ = next_json(&mut ws).await;
    send_text(&mut ws, SUBSCRIBED_TRADES).await;

    ws.close(None).await.expect("server close");
    wait_for_state(&client, ConnectionState::Closed).await;

    assert!(client.registry().is_empty());
    let err = assert_err!(client.subscribe_trades("tETHUSD").await);
    assert!(matches!(
        err,
        BitfeedError::NotConnected {
            state: ConnectionState::Closed
        }
    ));
    assert_ok!(client.stop().await);
}
