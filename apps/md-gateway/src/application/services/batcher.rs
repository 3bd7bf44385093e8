//! Subscription Batcher
//!
//! Turns a flat instrument list into one upstream call per venue and keeps
//! the per-venue registry of what has been requested.

use crate::application::services::session::{SessionError, SessionManager};
use crate::domain::session::ApiError;
use crate::domain::subscription::{
    BatchPlan, InstrumentRequest, SubscriptionRegistry, SubscriptionStats, VenueTicket,
};
use crate::domain::venue::Venue;
use crate::infrastructure::metrics::{self, SubscribeAction};

/// Summary of one batched request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Tickets sent upstream, in call order.
    pub tickets: Vec<VenueTicket>,
    /// Instruments dropped because their venue could not be resolved.
    pub unresolved: Vec<String>,
    /// Tickets the endpoint refused synchronously.
    pub failures: Vec<(Venue, ApiError)>,
}

impl BatchReport {
    /// Number of upstream calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.tickets.len()
    }

    /// Check whether every call was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Groups subscription requests by venue and sends them.
#[derive(Debug, Default)]
pub struct SubscriptionBatcher {
    registry: SubscriptionRegistry,
}

impl SubscriptionBatcher {
    /// Create a batcher with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe instruments, one call per venue.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if there is no session handle and
    /// at least one instrument resolved.
    pub fn subscribe(
        &self,
        session: &SessionManager,
        requests: &[InstrumentRequest],
    ) -> Result<BatchReport, SessionError> {
        self.send(session, requests, SubscribeAction::Subscribe)
    }

    /// Unsubscribe instruments, one call per venue.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub fn unsubscribe(
        &self,
        session: &SessionManager,
        requests: &[InstrumentRequest],
    ) -> Result<BatchReport, SessionError> {
        self.send(session, requests, SubscribeAction::Unsubscribe)
    }

    /// Per-venue counts of requested instruments.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.registry.stats()
    }

    /// Instruments requested on a venue.
    #[must_use]
    pub fn instruments(&self, venue: Venue) -> Vec<String> {
        self.registry.instruments(venue)
    }

    /// Forget all requested instruments.
    pub fn clear(&self) {
        self.registry.clear();
        for venue in Venue::all() {
            metrics::set_subscriptions(*venue, 0);
        }
    }

    fn send(
        &self,
        session: &SessionManager,
        requests: &[InstrumentRequest],
        action: SubscribeAction,
    ) -> Result<BatchReport, SessionError> {
        let plan = BatchPlan::group(requests);

        for id in &plan.unresolved {
            tracing::debug!(
                instrument_id = %id,
                action = action.as_str(),
                "Venue unresolved, skipping"
            );
        }

        let mut report = BatchReport {
            unresolved: plan.unresolved,
            ..BatchReport::default()
        };
        if plan.tickets.is_empty() {
            return Ok(report);
        }

        session.with_handle(|api| {
            for ticket in plan.tickets {
                let result = match action {
                    SubscribeAction::Subscribe => {
                        api.subscribe_market_data(&ticket.instrument_ids, ticket.venue)
                    }
                    SubscribeAction::Unsubscribe => {
                        api.unsubscribe_market_data(&ticket.instrument_ids, ticket.venue)
                    }
                };
                metrics::record_subscribe_request(action, ticket.venue, result.is_ok());

                match result {
                    Ok(()) => {
                        match action {
                            SubscribeAction::Subscribe => self.registry.record(&ticket),
                            SubscribeAction::Unsubscribe => self.registry.forget(&ticket),
                        };
                        metrics::set_subscriptions(
                            ticket.venue,
                            self.registry.instruments(ticket.venue).len(),
                        );
                        tracing::info!(
                            venue = %ticket.venue,
                            count = ticket.len(),
                            action = action.as_str(),
                            "Market data request sent"
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            venue = %ticket.venue,
                            count = ticket.len(),
                            action = action.as_str(),
                            code = err.code,
                            message = %err.message,
                            "Market data request failed"
                        );
                        report.failures.push((ticket.venue, err));
                    }
                }
                report.tickets.push(ticket);
            }
        })?;

        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use mockall::Sequence;

    use super::*;
    use crate::application::ports::{
        MockQuoteApi, MockQuoteApiFactory, QuoteApiFactory, SessionCallbacks,
    };
    use crate::application::services::session::SessionSettings;
    use crate::domain::session::Transport;

    struct Detached;

    impl SessionCallbacks for Detached {
        fn on_disconnected(&self, _reason: i32) {}
        fn on_subscribe_market_data(
            &self,
            _ticker: Option<&crate::application::ports::SubscribeTicker>,
            _error: Option<&ApiError>,
            _is_last: bool,
        ) {
        }
        fn on_unsubscribe_market_data(
            &self,
            _ticker: Option<&crate::application::ports::SubscribeTicker>,
            _error: Option<&ApiError>,
            _is_last: bool,
        ) {
        }
        fn on_error(&self, _error: Option<&ApiError>, _is_last: bool) {}
        fn on_depth_market_data(
            &self,
            _data: &crate::domain::market_data::DepthMarketData,
            _bid_queue: crate::domain::market_data::OrderQueue<'_>,
            _ask_queue: crate::domain::market_data::OrderQueue<'_>,
        ) {
        }
    }

    fn session_with(api: MockQuoteApi) -> SessionManager {
        let mut factory = MockQuoteApiFactory::new();
        let mut api = Some(api);
        factory.expect_create().times(1).returning(move |_| {
            let mut api = api.take().unwrap();
            api.expect_register_callbacks().return_const(());
            api.expect_login().returning(|_, _, _, _, _| Ok(()));
            Ok(Box::new(api))
        });
        let factory: Arc<dyn QuoteApiFactory> = Arc::new(factory);
        let callbacks: Weak<dyn SessionCallbacks> = Weak::<Detached>::new();
        let session = SessionManager::new(
            SessionSettings {
                client_id: 1,
                user_id: "u".to_string(),
                password: "p".to_string(),
                host: "h".to_string(),
                port: 1,
                transport: Transport::Tcp,
                max_collision_retries: 0,
            },
            factory,
            callbacks,
        );
        session.connect().unwrap();
        session
    }

    fn requests(pairs: &[(&str, &str)]) -> Vec<InstrumentRequest> {
        pairs.iter().map(|&p| InstrumentRequest::from(p)).collect()
    }

    #[test]
    fn one_call_per_venue_and_unknown_dropped() {
        let mut api = MockQuoteApi::new();
        let mut seq = Sequence::new();
        api.expect_subscribe_market_data()
            .withf(|ids, venue| ids == ["600000".to_string()] && *venue == Venue::Shanghai)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_subscribe_market_data()
            .withf(|ids, venue| ids == ["000001".to_string()] && *venue == Venue::Shenzhen)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let session = session_with(api);
        let batcher = SubscriptionBatcher::new();
        let report = batcher
            .subscribe(
                &session,
                &requests(&[("600000", "SH"), ("000001", "SZ"), ("bogus", "")]),
            )
            .unwrap();

        assert_eq!(report.calls(), 2);
        assert_eq!(report.unresolved, vec!["bogus"]);
        assert!(report.is_clean());
        assert_eq!(batcher.stats().total(), 2);
    }

    #[test]
    fn failed_ticket_does_not_stop_others() {
        let mut api = MockQuoteApi::new();
        api.expect_subscribe_market_data()
            .withf(|_, venue| *venue == Venue::Shanghai)
            .returning(|_, _| Err(ApiError::new(5, "throttled")));
        api.expect_subscribe_market_data()
            .withf(|_, venue| *venue == Venue::Shenzhen)
            .times(1)
            .returning(|_, _| Ok(()));

        let session = session_with(api);
        let batcher = SubscriptionBatcher::new();
        let report = batcher
            .subscribe(&session, &requests(&[("600000", ""), ("000001", "")]))
            .unwrap();

        assert_eq!(report.calls(), 2);
        assert_eq!(report.failures, vec![(Venue::Shanghai, ApiError::new(5, "throttled"))]);
        assert_eq!(batcher.stats().shanghai, 0);
        assert_eq!(batcher.stats().shenzhen, 1);
    }

    #[test]
    fn unsubscribe_forgets_instruments() {
        let mut api = MockQuoteApi::new();
        api.expect_subscribe_market_data().returning(|_, _| Ok(()));
        api.expect_unsubscribe_market_data()
            .times(1)
            .returning(|_, _| Ok(()));

        let session = session_with(api);
        let batcher = SubscriptionBatcher::new();
        let reqs = requests(&[("600000", ""), ("600036", "")]);

        batcher.subscribe(&session, &reqs).unwrap();
        assert_eq!(batcher.instruments(Venue::Shanghai), vec!["600000", "600036"]);

        batcher.unsubscribe(&session, &reqs[..1]).unwrap();
        assert_eq!(batcher.instruments(Venue::Shanghai), vec!["600036"]);
    }

    #[test]
    fn all_unresolved_sends_nothing() {
        let mut api = MockQuoteApi::new();
        api.expect_subscribe_market_data().never();

        let session = session_with(api);
        let report = SubscriptionBatcher::new()
            .subscribe(&session, &requests(&[("bogus", ""), ("600000", "NYSE")]))
            .unwrap();

        assert_eq!(report.calls(), 0);
        assert_eq!(report.unresolved.len(), 2);
    }

    #[test]
    fn no_handle_is_an_error() {
        let session = session_with(MockQuoteApi::new());
        session.release_handle();

        let err = SubscriptionBatcher::new()
            .subscribe(&session, &requests(&[("600000", "")]))
            .unwrap_err();
        assert_eq!(err, SessionError::NoSession);
    }
}
