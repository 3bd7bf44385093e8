//! Subscription Batching Types
//!
//! Domain types for grouping instrument subscriptions by venue and for
//! tracking what has been requested upstream.
//!
//! # Design
//!
//! A subscription request is a flat list of `(instrument, explicit venue)`
//! pairs. Each pair is resolved to a venue, unresolved pairs are dropped,
//! and the survivors are grouped into one [`VenueTicket`] per venue:
//!
//! - tickets are ordered by the first time their venue was seen
//! - ids inside a ticket keep their input order
//!
//! One ticket maps to exactly one upstream subscribe call.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::venue::{Venue, resolve_venue};

// =============================================================================
// Requests
// =============================================================================

/// One instrument to subscribe, with an optional explicit venue code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentRequest {
    /// Instrument identifier (ticker).
    pub instrument_id: String,
    /// Explicit venue code; empty means "infer from the ticker".
    pub explicit_venue: String,
}

impl InstrumentRequest {
    /// Create a request with an explicit venue code.
    #[must_use]
    pub fn new(instrument_id: impl Into<String>, explicit_venue: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            explicit_venue: explicit_venue.into(),
        }
    }

    /// Create a request whose venue is inferred from the ticker.
    #[must_use]
    pub fn inferred(instrument_id: impl Into<String>) -> Self {
        Self::new(instrument_id, String::new())
    }

    /// Pair up parallel instrument and venue lists.
    ///
    /// Instruments without a matching venue entry get an empty code.
    #[must_use]
    pub fn pair_up(instruments: &[String], venues: &[String]) -> Vec<Self> {
        instruments
            .iter()
            .enumerate()
            .map(|(i, id)| Self::new(id.clone(), venues.get(i).cloned().unwrap_or_default()))
            .collect()
    }

    /// Parse a `id[:venue]` spec, e.g. `600000:SH` or `000001`.
    #[must_use]
    pub fn parse_spec(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }
        match spec.split_once(':') {
            Some((id, venue)) if !id.trim().is_empty() => Some(Self::new(id.trim(), venue.trim())),
            Some(_) => None,
            None => Some(Self::inferred(spec)),
        }
    }

    /// Resolve this request's venue.
    #[must_use]
    pub fn resolve(&self) -> Option<Venue> {
        resolve_venue(&self.instrument_id, &self.explicit_venue)
    }
}

impl<I: Into<String>, V: Into<String>> From<(I, V)> for InstrumentRequest {
    fn from((id, venue): (I, V)) -> Self {
        Self::new(id, venue)
    }
}

// =============================================================================
// Venue Tickets
// =============================================================================

/// Instrument ids grouped under one resolved venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueTicket {
    /// Resolved venue for every id in this ticket.
    pub venue: Venue,
    /// Instrument ids in input order.
    pub instrument_ids: Vec<String>,
}

impl VenueTicket {
    /// Number of instruments in the ticket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrument_ids.len()
    }

    /// Check whether the ticket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrument_ids.is_empty()
    }
}

/// Result of grouping a subscription request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// One ticket per distinct venue, in first-seen venue order.
    pub tickets: Vec<VenueTicket>,
    /// Instrument ids whose venue could not be resolved.
    pub unresolved: Vec<String>,
}

impl BatchPlan {
    /// Group requests into per-venue tickets.
    #[must_use]
    pub fn group<'a, I>(requests: I) -> Self
    where
        I: IntoIterator<Item = &'a InstrumentRequest>,
    {
        let mut plan = Self::default();

        for request in requests {
            let Some(venue) = request.resolve() else {
                plan.unresolved.push(request.instrument_id.clone());
                continue;
            };

            if let Some(ticket) = plan.tickets.iter_mut().find(|t| t.venue == venue) {
                ticket.instrument_ids.push(request.instrument_id.clone());
            } else {
                plan.tickets.push(VenueTicket {
                    venue,
                    instrument_ids: vec![request.instrument_id.clone()],
                });
            }
        }

        plan
    }

    /// Total number of resolved instruments across all tickets.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.tickets.iter().map(VenueTicket::len).sum()
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Tracks instruments requested upstream, per venue.
///
/// Used for status reporting only; the upstream endpoint does not correlate
/// acknowledgments back to tickets.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    venues: RwLock<BTreeMap<Venue, Vec<String>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ticket as subscribed.
    ///
    /// Returns the number of ids that were not already recorded.
    pub fn record(&self, ticket: &VenueTicket) -> usize {
        let mut venues = self.venues.write();
        let ids = venues.entry(ticket.venue).or_default();
        let mut added = 0;
        for id in &ticket.instrument_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
                added += 1;
            }
        }
        added
    }

    /// Forget a ticket's ids.
    ///
    /// Returns the number of ids that were removed.
    pub fn forget(&self, ticket: &VenueTicket) -> usize {
        let mut venues = self.venues.write();
        let Some(ids) = venues.get_mut(&ticket.venue) else {
            return 0;
        };

        let before = ids.len();
        ids.retain(|id| !ticket.instrument_ids.contains(id));
        let removed = before - ids.len();

        if ids.is_empty() {
            venues.remove(&ticket.venue);
        }
        removed
    }

    /// Instruments recorded for a venue.
    #[must_use]
    pub fn instruments(&self, venue: Venue) -> Vec<String> {
        self.venues.read().get(&venue).cloned().unwrap_or_default()
    }

    /// Per-venue counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let venues = self.venues.read();
        let count = |venue| venues.get(&venue).map_or(0, Vec::len);
        SubscriptionStats {
            shanghai: count(Venue::Shanghai),
            shenzhen: count(Venue::Shenzhen),
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.venues.write().clear();
    }
}

/// Subscription counts per venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SubscriptionStats {
    /// Shanghai instruments.
    pub shanghai: usize,
    /// Shenzhen instruments.
    pub shenzhen: usize,
}

impl SubscriptionStats {
    /// Total instruments across venues.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.shanghai + self.shenzhen
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn requests(pairs: &[(&str, &str)]) -> Vec<InstrumentRequest> {
        pairs.iter().map(|&(id, venue)| InstrumentRequest::new(id, venue)).collect()
    }

    #[test]
    fn groups_by_venue_and_drops_unknown() {
        let plan = BatchPlan::group(&requests(&[("600000", "SH"), ("000001", "SZ"), ("bogus", "")]));

        assert_eq!(plan.tickets.len(), 2);
        assert_eq!(plan.tickets[0].venue, Venue::Shanghai);
        assert_eq!(plan.tickets[0].instrument_ids, vec!["600000"]);
        assert_eq!(plan.tickets[1].venue, Venue::Shenzhen);
        assert_eq!(plan.tickets[1].instrument_ids, vec!["000001"]);
        assert_eq!(plan.unresolved, vec!["bogus"]);
    }

    #[test]
    fn tickets_follow_first_seen_venue_order() {
        let plan = BatchPlan::group(&requests(&[
            ("000001", ""),
            ("600000", ""),
            ("000002", ""),
            ("600036", ""),
        ]));

        assert_eq!(plan.tickets[0].venue, Venue::Shenzhen);
        assert_eq!(plan.tickets[0].instrument_ids, vec!["000001", "000002"]);
        assert_eq!(plan.tickets[1].venue, Venue::Shanghai);
        assert_eq!(plan.tickets[1].instrument_ids, vec!["600000", "600036"]);
        assert_eq!(plan.instrument_count(), 4);
    }

    #[test]
    fn explicit_venue_groups_non_numeric_ids() {
        let plan = BatchPlan::group(&requests(&[("IF2406", "SH"), ("IC2406", "sh")]));

        assert_eq!(plan.tickets.len(), 1);
        assert_eq!(plan.tickets[0].instrument_ids, vec!["IF2406", "IC2406"]);
    }

    #[test]
    fn empty_request_yields_empty_plan() {
        let plan = BatchPlan::group(&[]);
        assert!(plan.tickets.is_empty());
        assert!(plan.unresolved.is_empty());
    }

    #[test]
    fn pair_up_pads_missing_venues() {
        let pairs = InstrumentRequest::pair_up(
            &["600000".to_string(), "000001".to_string()],
            &["SH".to_string()],
        );
        assert_eq!(pairs[0], InstrumentRequest::new("600000", "SH"));
        assert_eq!(pairs[1], InstrumentRequest::inferred("000001"));
    }

    #[test]
    fn parse_spec_forms() {
        assert_eq!(
            InstrumentRequest::parse_spec("600000:SH"),
            Some(InstrumentRequest::new("600000", "SH"))
        );
        assert_eq!(
            InstrumentRequest::parse_spec(" 000001 "),
            Some(InstrumentRequest::inferred("000001"))
        );
        assert_eq!(InstrumentRequest::parse_spec(":SH"), None);
        assert_eq!(InstrumentRequest::parse_spec(""), None);
    }

    #[test]
    fn registry_records_without_duplicates() {
        let registry = SubscriptionRegistry::new();
        let ticket = VenueTicket {
            venue: Venue::Shanghai,
            instrument_ids: vec!["600000".to_string(), "600036".to_string()],
        };

        assert_eq!(registry.record(&ticket), 2);
        assert_eq!(registry.record(&ticket), 0);
        assert_eq!(registry.stats().shanghai, 2);
        assert_eq!(registry.stats().total(), 2);
    }

    #[test]
    fn registry_forget_removes_empty_venue() {
        let registry = SubscriptionRegistry::new();
        let ticket = VenueTicket {
            venue: Venue::Shenzhen,
            instrument_ids: vec!["000001".to_string()],
        };

        registry.record(&ticket);
        assert_eq!(registry.forget(&ticket), 1);
        assert!(registry.instruments(Venue::Shenzhen).is_empty());
        assert_eq!(registry.stats(), SubscriptionStats::default());
    }

    #[test]
    fn registry_forget_unknown_venue_is_noop() {
        let registry = SubscriptionRegistry::new();
        let ticket = VenueTicket {
            venue: Venue::Shanghai,
            instrument_ids: vec!["600000".to_string()],
        };
        assert_eq!(registry.forget(&ticket), 0);
    }

    #[test]
    fn registry_concurrent_records() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let r = Arc::clone(&registry);
                thread::spawn(move || {
                    r.record(&VenueTicket {
                        venue: Venue::Shanghai,
                        instrument_ids: vec![format!("60000{i}"), "600036".to_string()],
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // 8 unique + 1 shared
        assert_eq!(registry.stats().shanghai, 9);
    }

    proptest! {
        #[test]
        fn grouping_preserves_every_resolved_id_in_order(
            ids in proptest::collection::vec("[0-9]{6}|[a-z]{3,8}", 0..40)
        ) {
            let reqs: Vec<_> = ids.iter().map(InstrumentRequest::inferred).collect();
            let plan = BatchPlan::group(&reqs);

            for ticket in &plan.tickets {
                prop_assert!(!ticket.is_empty());
                let expected: Vec<_> = ids
                    .iter()
                    .filter(|id| resolve_venue(id, "") == Some(ticket.venue))
                    .cloned()
                    .collect();
                prop_assert_eq!(&ticket.instrument_ids, &expected);
            }

            let resolved = ids.iter().filter(|id| resolve_venue(id, "").is_some()).count();
            prop_assert_eq!(plan.instrument_count(), resolved);
            prop_assert_eq!(plan.unresolved.len(), ids.len() - resolved);

            let mut venues: Vec<_> = plan.tickets.iter().map(|t| t.venue).collect();
            venues.dedup();
            prop_assert_eq!(venues.len(), plan.tickets.len());
        }
    }
}
