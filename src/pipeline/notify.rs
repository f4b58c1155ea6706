//! Diff and notification engine.
//!
//! Decides, per subscriber, whether a discovered route is new against
//! the persisted notification history, applies date-range filters, and
//! prunes history entries for routes that vanished upstream.
//!
//! The engine is the sole owner of the in-memory history. Persistence
//! happens after every mutation; a failed persist is logged and the
//! in-memory state stays authoritative (at-least-once delivery, worst
//! case a duplicate notification after a restart).

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{MatchSide, Route, SubscriptionBook};
use crate::storage::{HistoryStore, NotificationHistory};

/// A notify-worthy (subscriber, route) pair.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub subscriber: String,
    pub route: Route,
    pub matched_as_origin: bool,
}

/// External dispatcher for notification events (chat layer, test
/// collector). Delivery failures are the dispatcher's concern.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: &NotificationEvent);
}

/// The central diff/dedup state machine.
pub struct NotificationEngine<S: HistoryStore> {
    history: NotificationHistory,
    store: S,
}

impl<S: HistoryStore> NotificationEngine<S> {
    /// Load persisted history from the store.
    pub async fn load(store: S) -> Result<Self> {
        let history = store.load().await?;
        Ok(Self { history, store })
    }

    pub fn history(&self) -> &NotificationHistory {
        &self.history
    }

    /// Whether this (subscriber, route, side) candidate has not been
    /// notified before.
    pub fn is_novel(&self, subscriber: &str, route: &Route, side: MatchSide) -> bool {
        let fingerprint = route.fingerprint(side);
        !self
            .history
            .get(subscriber)
            .is_some_and(|seen| seen.contains(&fingerprint))
    }

    /// Record a sent notification and persist the history.
    pub async fn mark_notified(&mut self, subscriber: &str, route: &Route, side: MatchSide) {
        self.history
            .entry(subscriber.to_string())
            .or_insert_with(BTreeSet::new)
            .insert(route.fingerprint(side));
        self.persist().await;
    }

    /// Evaluate one route against all subscriptions, emitting events
    /// for novel, filter-passing matches. Returns the number of events
    /// emitted.
    ///
    /// Origin and destination matches are evaluated and deduplicated
    /// independently; a subscriber favoriting both ends of a route
    /// receives two events.
    pub async fn process_route(
        &mut self,
        route: &Route,
        subscriptions: &SubscriptionBook,
        sink: &dyn NotificationSink,
    ) -> usize {
        let mut emitted = 0;
        let subscribers: Vec<String> = subscriptions.subscribers().map(str::to_string).collect();

        for subscriber in subscribers {
            if !subscriptions.dates_pass(&subscriber, &route.available_dates) {
                continue;
            }

            for (side, station) in [
                (MatchSide::Origin, route.origin.as_str()),
                (MatchSide::Destination, route.destination.as_str()),
            ] {
                if !subscriptions.is_favorite(&subscriber, station) {
                    continue;
                }
                if !self.is_novel(&subscriber, route, side) {
                    continue;
                }

                let event = NotificationEvent {
                    subscriber: subscriber.clone(),
                    route: route.clone(),
                    matched_as_origin: side == MatchSide::Origin,
                };
                sink.send(&event).await;
                self.mark_notified(&subscriber, route, side).await;
                emitted += 1;
            }
        }
        emitted
    }

    /// Evaluate a full catalog, returning the total events emitted.
    pub async fn process_catalog(
        &mut self,
        routes: &[Route],
        subscriptions: &SubscriptionBook,
        sink: &dyn NotificationSink,
    ) -> usize {
        let mut emitted = 0;
        for route in routes {
            emitted += self.process_route(route, subscriptions, sink).await;
        }
        emitted
    }

    /// Prune history entries whose fingerprint no longer appears in the
    /// fresh catalog, so a route that disappears and later reappears is
    /// treated as novel again. Never adds entries.
    pub async fn reconcile(&mut self, routes: &[Route]) {
        let live: HashSet<String> = routes
            .iter()
            .flat_map(|route| {
                [
                    route.fingerprint(MatchSide::Origin),
                    route.fingerprint(MatchSide::Destination),
                ]
            })
            .collect();

        let mut pruned = 0usize;
        for seen in self.history.values_mut() {
            let before = seen.len();
            seen.retain(|fingerprint| live.contains(fingerprint));
            pruned += before - seen.len();
        }
        self.history.retain(|_, seen| !seen.is_empty());

        if pruned > 0 {
            log::info!("Reconciliation pruned {pruned} stale history entries");
            self.persist().await;
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.history).await {
            log::error!("History persist failed, in-memory state remains authoritative: {e}");
        }
    }
}
