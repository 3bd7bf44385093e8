//! Tick Pipeline Integration Tests
//!
//! Fires vendor callbacks into a loaded engine and checks what reaches the
//! downstream sink: queue bounds, venue decoding, malformed snapshots and
//! diagnostics that must not touch session state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use md_gateway::{
    ApiError, DepthMarketData, MdEngine, NormalizedTick, OrderQueue, SessionPhase,
    SubscribeTicker, Transport, Venue,
};

use common::{Recorder, RecordingFactory, collecting_sink, engine_config};

fn setup() -> (Arc<Recorder>, Arc<MdEngine>, Arc<Mutex<Vec<NormalizedTick>>>) {
    let recorder = Recorder::new();
    let (seen, sink) = collecting_sink();
    let engine = MdEngine::load(
        engine_config(1, Transport::Tcp, Vec::new()),
        Arc::new(RecordingFactory(Arc::clone(&recorder))),
        Arc::new(sink),
    );
    engine.connect(Duration::ZERO).unwrap();
    (recorder, engine, seen)
}

fn depth(ticker: &str, exchange_id: u8) -> DepthMarketData {
    let mut raw = DepthMarketData {
        exchange_id,
        ticker: ticker.to_string(),
        last_price: 10.12,
        pre_close_price: 10.0,
        data_time: 20_240_315_093_000_250,
        qty: 1_200,
        turnover: 12_144.0,
        trades_count: 3,
        ..DepthMarketData::default()
    };
    raw.bid[0] = 10.11;
    raw.bid_qty[0] = 600;
    raw.ask[0] = 10.13;
    raw.ask_qty[0] = 300;
    raw
}

#[test]
fn queue_reads_only_delivered_entries() {
    let (recorder, _engine, seen) = setup();

    // Exactly three entries exist; reading a fourth would panic.
    let bids = [100_i64, 200, 300];
    recorder.fire(|cb| {
        cb.on_depth_market_data(
            &depth("600000", 1),
            OrderQueue::new(&bids, 3, 5),
            OrderQueue::empty(),
        );
    });

    let ticks = seen.lock();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].bid_queue.orders, vec![100, 200, 300]);
    assert_eq!(ticks[0].bid_queue.max_reportable, 5);
    assert_eq!(ticks[0].bid_queue.price, Decimal::new(1011, 2));
    assert_eq!(ticks[0].bid_queue.quantity, 600);
    assert!(ticks[0].ask_queue.orders.is_empty());
}

#[test]
fn queue_is_capped_by_max_count() {
    let (recorder, _engine, seen) = setup();

    let asks = [10_i64, 20];
    recorder.fire(|cb| {
        cb.on_depth_market_data(
            &depth("000001", 2),
            OrderQueue::empty(),
            OrderQueue::new(&asks, 4, 2),
        );
    });

    let ticks = seen.lock();
    assert_eq!(ticks[0].ask_queue.orders, vec![10, 20]);
    assert!(ticks[0].ask_queue.is_saturated());
    assert_eq!(ticks[0].venue, Venue::Shenzhen);
}

#[test]
fn tick_fields_are_normalized() {
    let (recorder, _engine, seen) = setup();

    recorder.fire(|cb| {
        cb.on_depth_market_data(&depth("600000", 1), OrderQueue::empty(), OrderQueue::empty());
    });

    let ticks = seen.lock();
    let tick = &ticks[0];
    assert_eq!(tick.instrument_id, "600000");
    assert_eq!(tick.venue, Venue::Shanghai);
    assert_eq!(tick.last_price, Decimal::new(1012, 2));
    assert_eq!(tick.volume, 1_200);
    assert_eq!(tick.trade_count, 3);
    assert_eq!(tick.trading_day.unwrap().to_string(), "2024-03-15");
    assert_eq!(tick.exchange_time.unwrap().to_string(), "2024-03-15 09:30:00.250");
    assert_eq!(tick.bids.len(), 1);
    assert_eq!(tick.asks.len(), 1);
    assert_eq!(tick.mid_price(), Some(Decimal::new(1012, 2)));
}

#[test]
fn malformed_snapshots_are_dropped() {
    let (recorder, engine, seen) = setup();

    let short = [1_i64, 2];
    recorder.fire(|cb| {
        // Unknown exchange.
        cb.on_depth_market_data(&depth("600000", 9), OrderQueue::empty(), OrderQueue::empty());
        // Count promises more entries than were delivered.
        cb.on_depth_market_data(
            &depth("600000", 1),
            OrderQueue::new(&short, 3, 3),
            OrderQueue::empty(),
        );
        // Non-finite price.
        let mut bad = depth("600000", 1);
        bad.last_price = f64::NAN;
        cb.on_depth_market_data(&bad, OrderQueue::empty(), OrderQueue::empty());
        // A good one still gets through.
        cb.on_depth_market_data(&depth("600036", 1), OrderQueue::empty(), OrderQueue::empty());
    });

    assert_eq!(seen.lock().len(), 1);
    let ticks = engine.status().ticks;
    assert_eq!(ticks.received, 4);
    assert_eq!(ticks.malformed, 3);
    assert_eq!(ticks.forwarded, 1);
}

#[test]
fn ticks_arrive_in_callback_order() {
    let (recorder, _engine, seen) = setup();

    recorder.fire(|cb| {
        for ticker in ["600000", "000001", "600036", "300750"] {
            let exchange = if ticker.starts_with('6') { 1 } else { 2 };
            cb.on_depth_market_data(
                &depth(ticker, exchange),
                OrderQueue::empty(),
                OrderQueue::empty(),
            );
        }
    });

    let order: Vec<String> = seen.lock().iter().map(|t| t.instrument_id.clone()).collect();
    assert_eq!(order, vec!["600000", "000001", "600036", "300750"]);
}

#[test]
fn acks_and_errors_leave_session_alone() {
    let (recorder, engine, _seen) = setup();
    let ticker = SubscribeTicker {
        exchange_id: 1,
        ticker: "600000".to_string(),
    };

    recorder.fire(|cb| {
        cb.on_subscribe_market_data(Some(&ticker), None, false);
        cb.on_subscribe_market_data(Some(&ticker), Some(&ApiError::default()), true);
        cb.on_unsubscribe_market_data(None, Some(&ApiError::new(11_200_003, "unknown")), true);
        cb.on_error(Some(&ApiError::new(0, "")), true);
        cb.on_error(Some(&ApiError::new(10_000_001, "heartbeat late")), true);
    });

    assert_eq!(engine.phase(), SessionPhase::LoggedIn);
    let diagnostics = engine.status().diagnostics;
    assert_eq!(diagnostics.errors, 2);
    assert_eq!(diagnostics.disconnects, 0);
    assert_eq!(diagnostics.last_error.unwrap().code, 10_000_001);
}
