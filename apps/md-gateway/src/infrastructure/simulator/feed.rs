//! Simulated Feed Thread
//!
//! One background thread per logged-in simulated session. It owns the
//! random walks, delivers queued acknowledgments and pushes a depth snapshot
//! for every subscribed ticker once per tick interval.
//!
//! Callbacks run without any feed lock held, so a callback may call back
//! into the handle.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::application::ports::{SessionCallbacks, SubscribeTicker};
use crate::domain::market_data::{DEPTH_LEVELS, DepthMarketData, OrderQueue};
use crate::domain::session::ApiError;
use crate::domain::venue::Venue;

/// Most orders the simulated best-price queue reports.
pub const MAX_QUEUE_ORDERS: usize = 50;

/// Price increment between depth levels.
const TICK_SIZE: f64 = 0.01;

/// Largest relative move per step.
const MAX_STEP: f64 = 0.002;

// =============================================================================
// Shared State
// =============================================================================

/// Acknowledgment waiting to be delivered on the feed thread.
#[derive(Debug, Clone)]
pub(super) enum Ack {
    Subscribe {
        ticker: SubscribeTicker,
        error: Option<ApiError>,
        is_last: bool,
    },
    Unsubscribe {
        ticker: SubscribeTicker,
        error: Option<ApiError>,
        is_last: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Running,
    Stop,
    Disconnect(i32),
}

#[derive(Debug)]
struct FeedState {
    subscriptions: BTreeMap<Venue, BTreeSet<String>>,
    pending: VecDeque<Ack>,
    signal: Signal,
}

/// State shared between a simulated handle and its feed thread.
#[derive(Debug)]
pub(super) struct Feed {
    state: Mutex<FeedState>,
    wake: Condvar,
}

impl Feed {
    fn new() -> Self {
        Self {
            state: Mutex::new(FeedState {
                subscriptions: BTreeMap::new(),
                pending: VecDeque::new(),
                signal: Signal::Running,
            }),
            wake: Condvar::new(),
        }
    }

    /// Add tickers and queue one acknowledgment per ticker.
    pub(super) fn subscribe(&self, tickers: &[String], venue: Venue) {
        let mut state = self.state.lock();
        let last = tickers.len().saturating_sub(1);
        for (i, ticker) in tickers.iter().enumerate() {
            state
                .subscriptions
                .entry(venue)
                .or_default()
                .insert(ticker.clone());
            state.pending.push_back(Ack::Subscribe {
                ticker: SubscribeTicker {
                    exchange_id: venue.code(),
                    ticker: ticker.clone(),
                },
                error: None,
                is_last: i == last,
            });
        }
        drop(state);
        self.wake.notify_one();
    }

    /// Remove tickers and queue one acknowledgment per ticker.
    ///
    /// Tickers that were never subscribed are acknowledged with an error.
    pub(super) fn unsubscribe(&self, tickers: &[String], venue: Venue) {
        let mut state = self.state.lock();
        let last = tickers.len().saturating_sub(1);
        for (i, ticker) in tickers.iter().enumerate() {
            let removed = state
                .subscriptions
                .get_mut(&venue)
                .is_some_and(|set| set.remove(ticker));
            state.pending.push_back(Ack::Unsubscribe {
                ticker: SubscribeTicker {
                    exchange_id: venue.code(),
                    ticker: ticker.clone(),
                },
                error: (!removed).then(|| {
                    ApiError::new(super::TICKER_NOT_SUBSCRIBED, "ticker is not subscribed")
                }),
                is_last: i == last,
            });
        }
        drop(state);
        self.wake.notify_one();
    }

    /// Number of subscribed tickers across venues.
    pub(super) fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .map(BTreeSet::len)
            .sum()
    }

    fn signal(&self, signal: Signal) {
        let mut state = self.state.lock();
        if state.signal == Signal::Running {
            state.signal = signal;
        }
        drop(state);
        self.wake.notify_all();
    }

    /// Ask the feed thread to exit quietly.
    pub(super) fn stop(&self) {
        self.signal(Signal::Stop);
    }

    /// Ask the feed thread to report a disconnect and exit.
    pub(super) fn disconnect(&self, reason: i32) {
        self.signal(Signal::Disconnect(reason));
    }

    /// Check whether the feed has been told to exit.
    pub(super) fn is_running(&self) -> bool {
        self.state.lock().signal == Signal::Running
    }
}

// =============================================================================
// Feed Thread
// =============================================================================

/// A running feed thread and its shared state.
#[derive(Debug)]
pub(super) struct FeedThread {
    feed: Arc<Feed>,
    thread: Option<JoinHandle<()>>,
}

impl FeedThread {
    /// Spawn a feed thread delivering to `callbacks`.
    pub(super) fn spawn(
        client_id: u32,
        interval: Duration,
        callbacks: Option<Weak<dyn SessionCallbacks>>,
    ) -> std::io::Result<Self> {
        let feed = Arc::new(Feed::new());
        let worker = Arc::clone(&feed);
        let thread = thread::Builder::new()
            .name(format!("md-sim-{client_id}"))
            .spawn(move || run(&worker, interval, callbacks.as_ref()))?;

        Ok(Self {
            feed,
            thread: Some(thread),
        })
    }

    /// Shared state handle.
    pub(super) const fn feed(&self) -> &Arc<Feed> {
        &self.feed
    }

    /// Stop the thread and wait for it to exit.
    ///
    /// Called from the feed thread itself, the thread is detached instead.
    pub(super) fn shutdown(&mut self) {
        self.feed.stop();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("Simulated feed thread panicked");
            }
        }
    }
}

impl Drop for FeedThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(feed: &Feed, interval: Duration, callbacks: Option<&Weak<dyn SessionCallbacks>>) {
    let mut rng = rand::rng();
    let mut walks: HashMap<String, Walk> = HashMap::new();
    let mut next_tick = Instant::now() + interval;

    loop {
        let (acks, tickers, signal) = {
            let mut state = feed.state.lock();
            while state.signal == Signal::Running
                && state.pending.is_empty()
                && Instant::now() < next_tick
            {
                if feed.wake.wait_until(&mut state, next_tick).timed_out() {
                    break;
                }
            }

            let tickers: Vec<(Venue, String)> = if Instant::now() >= next_tick {
                next_tick = Instant::now() + interval;
                state
                    .subscriptions
                    .iter()
                    .flat_map(|(venue, set)| set.iter().map(|t| (*venue, t.clone())))
                    .collect()
            } else {
                Vec::new()
            };
            (state.pending.drain(..).collect::<Vec<_>>(), tickers, state.signal)
        };

        // Nobody left to deliver to.
        let Some(receiver) = callbacks.and_then(Weak::upgrade) else {
            return;
        };

        match signal {
            Signal::Running => {}
            Signal::Stop => return,
            Signal::Disconnect(reason) => {
                receiver.on_disconnected(reason);
                return;
            }
        }

        for ack in acks {
            deliver_ack(receiver.as_ref(), &ack);
        }

        for (venue, ticker) in tickers {
            let walk = walks
                .entry(ticker.clone())
                .or_insert_with(|| Walk::seeded(&ticker));
            walk.step(&mut rng);
            let (raw, bid_orders, ask_orders) = walk.snapshot(venue, &ticker, &mut rng);
            receiver.on_depth_market_data(
                &raw,
                queue(&bid_orders),
                queue(&ask_orders),
            );
        }
    }
}

fn deliver_ack(receiver: &dyn SessionCallbacks, ack: &Ack) {
    match ack {
        Ack::Subscribe {
            ticker,
            error,
            is_last,
        } => receiver.on_subscribe_market_data(Some(ticker), error.as_ref(), *is_last),
        Ack::Unsubscribe {
            ticker,
            error,
            is_last,
        } => receiver.on_unsubscribe_market_data(Some(ticker), error.as_ref(), *is_last),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn queue(orders: &[i64]) -> OrderQueue<'_> {
    OrderQueue::new(orders, orders.len() as i32, MAX_QUEUE_ORDERS as i32)
}

// =============================================================================
// Random Walk
// =============================================================================

/// Price path and session counters for one ticker.
#[derive(Debug, Clone)]
struct Walk {
    pre_close: f64,
    open: f64,
    high: f64,
    low: f64,
    last: f64,
    volume: i64,
    turnover: f64,
    trades: i64,
}

impl Walk {
    /// Start a walk at a price derived from the ticker digits.
    fn seeded(ticker: &str) -> Self {
        let base = ticker
            .bytes()
            .fold(0_u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        let pre_close = 5.0 + f64::from(base % 9_500) / 100.0;
        Self {
            pre_close,
            open: pre_close,
            high: pre_close,
            low: pre_close,
            last: pre_close,
            volume: 0,
            turnover: 0.0,
            trades: 0,
        }
    }

    fn upper_limit(&self) -> f64 {
        round_cents(self.pre_close * 1.1)
    }

    fn lower_limit(&self) -> f64 {
        round_cents(self.pre_close * 0.9)
    }

    fn step(&mut self, rng: &mut impl Rng) {
        let change: f64 = rng.random_range(-MAX_STEP..=MAX_STEP);
        let next = round_cents(self.last * (1.0 + change))
            .clamp(self.lower_limit(), self.upper_limit())
            .max(TICK_SIZE);

        let lots: i64 = rng.random_range(1..=20);
        let qty = lots * 100;
        #[allow(clippy::cast_precision_loss)]
        let value = qty as f64 * next;

        self.last = next;
        self.high = self.high.max(next);
        self.low = self.low.min(next);
        self.volume += qty;
        self.turnover += value;
        self.trades += 1;
    }

    fn snapshot(
        &self,
        venue: Venue,
        ticker: &str,
        rng: &mut impl Rng,
    ) -> (DepthMarketData, Vec<i64>, Vec<i64>) {
        let mut raw = DepthMarketData {
            exchange_id: venue.code(),
            ticker: ticker.to_string(),
            last_price: self.last,
            pre_close_price: self.pre_close,
            open_price: self.open,
            high_price: self.high,
            low_price: self.low,
            close_price: 0.0,
            upper_limit_price: self.upper_limit(),
            lower_limit_price: self.lower_limit(),
            data_time: exchange_timestamp(),
            qty: self.volume,
            turnover: self.turnover,
            trades_count: self.trades,
            ..DepthMarketData::default()
        };

        for level in 0..DEPTH_LEVELS {
            #[allow(clippy::cast_precision_loss)]
            let offset = TICK_SIZE * (level + 1) as f64;
            let bid = round_cents(self.last - offset);
            if bid > 0.0 {
                raw.bid[level] = bid;
                raw.bid_qty[level] = rng.random_range(1..=100) * 100;
            }
            raw.ask[level] = round_cents(self.last + offset);
            raw.ask_qty[level] = rng.random_range(1..=100) * 100;
        }

        let bid_orders = orders(raw.bid_qty[0], rng);
        let ask_orders = orders(raw.ask_qty[0], rng);
        (raw, bid_orders, ask_orders)
    }
}

/// Split a level quantity into queued order sizes, in lots of 100.
fn orders(total: i64, rng: &mut impl Rng) -> Vec<i64> {
    let mut remaining = total / 100;
    let mut out = Vec::new();
    while remaining > 0 && out.len() < MAX_QUEUE_ORDERS {
        let lots = rng.random_range(1..=remaining.min(10));
        out.push(lots * 100);
        remaining -= lots;
    }
    out
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current time as `YYYYMMDDHHMMSSmmm`.
fn exchange_timestamp() -> i64 {
    Utc::now()
        .format("%Y%m%d%H%M%S%3f")
        .to_string()
        .parse()
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
