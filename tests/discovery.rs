//! End-to-end discovery cycle tests over an in-memory upstream.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use rally_scout::error::Result;
use rally_scout::models::{AvailabilityWindow, SubscriptionBook, WalkerConfig};
use rally_scout::pipeline::{NotificationEngine, NotificationEvent, NotificationSink, run_discovery_cycle};
use rally_scout::services::catalog::{CatalogApi, CatalogWalker, RawOffer, RawStation, RawTimeframe};
use rally_scout::storage::JsonStateStore;

/// In-memory upstream with two stations and one relocation edge.
#[derive(Clone, Default)]
struct FakeUpstream {
    timeframes: HashMap<(u64, u64), Vec<RawTimeframe>>,
}

impl FakeUpstream {
    fn with_edge(start: &str, end: &str) -> Self {
        let mut upstream = Self::default();
        upstream.timeframes.insert(
            (1, 2),
            vec![RawTimeframe {
                start_date: start.to_string(),
                end_date: end.to_string(),
            }],
        );
        upstream
    }
}

#[async_trait]
impl CatalogApi for FakeUpstream {
    async fn list_stations(&self) -> Result<Vec<RawStation>> {
        Ok(vec![
            RawStation {
                id: Some(1),
                name: Some("A".to_string()),
                address: Some("A street 1".to_string()),
                returns: None,
            },
            RawStation {
                id: Some(2),
                name: Some("B".to_string()),
                address: Some("B street 2".to_string()),
                returns: None,
            },
        ])
    }

    async fn station_detail(&self, id: u64) -> Result<RawStation> {
        Ok(RawStation {
            id: Some(id),
            name: None,
            address: None,
            returns: if id == 1 { Some(vec![2]) } else { None },
        })
    }

    async fn timeframes(&self, origin: u64, destination: u64) -> Result<Vec<RawTimeframe>> {
        Ok(self
            .timeframes
            .get(&(origin, destination))
            .cloned()
            .unwrap_or_default())
    }

    async fn search_offers(
        &self,
        _origin: u64,
        _destination: u64,
        _window: &AvailabilityWindow,
    ) -> Result<Vec<RawOffer>> {
        Ok(Vec::new())
    }

    fn booking_url(&self, origin: u64, destination: u64, window: &AvailabilityWindow) -> String {
        format!("fake://book/{origin}-{destination}/{}", window.start)
    }
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl CollectingSink {
    fn take(&self) -> Vec<NotificationEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn send(&self, event: &NotificationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn subscriptions() -> SubscriptionBook {
    SubscriptionBook::from_raw(
        HashMap::from([("u1".to_string(), vec!["A".to_string()])]),
        HashMap::new(),
    )
}

fn walker(upstream: FakeUpstream) -> CatalogWalker<FakeUpstream> {
    CatalogWalker::new(upstream, None, &WalkerConfig { max_concurrent: 2 })
}

#[tokio::test]
async fn first_cycle_notifies_second_cycle_is_quiet() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = JsonStateStore::new(tmp.path());
    let walker = walker(FakeUpstream::with_edge("2024-07-01", "2024-07-05"));
    let mut engine = NotificationEngine::load(store.clone()).await.unwrap();
    let sink = CollectingSink::default();
    let subs = subscriptions();

    let first = run_discovery_cycle(&walker, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    assert_eq!(first.notifications, 1);

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subscriber, "u1");
    assert!(events[0].matched_as_origin);
    assert_eq!(events[0].route.origin, "A");
    assert_eq!(events[0].route.destination, "B");
    assert_eq!(
        events[0].route.available_dates,
        vec![AvailabilityWindow {
            start: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 7, 5).unwrap(),
        }]
    );
    // Offer search returned nothing, so the route degrades gracefully.
    assert_eq!(events[0].route.vehicle_model, "Unknown model");

    // Identical upstream data: no new events.
    let second = run_discovery_cycle(&walker, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    assert_eq!(second.notifications, 0);
    assert!(sink.take().is_empty());
}

#[tokio::test]
async fn realtime_cycle_matches_batch_behavior() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = JsonStateStore::new(tmp.path());
    let walker = walker(FakeUpstream::with_edge("2024-07-01", "2024-07-05"));
    let mut engine = NotificationEngine::load(store.clone()).await.unwrap();
    let sink = CollectingSink::default();
    let subs = subscriptions();

    let first = run_discovery_cycle(&walker, &mut engine, &store, &subs, &sink, true)
        .await
        .unwrap();
    assert_eq!(first.notifications, 1);
    assert_eq!(sink.take().len(), 1);

    let second = run_discovery_cycle(&walker, &mut engine, &store, &subs, &sink, true)
        .await
        .unwrap();
    assert_eq!(second.notifications, 0);
}

#[tokio::test]
async fn snapshot_is_persisted_per_cycle() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = JsonStateStore::new(tmp.path());
    let walker = walker(FakeUpstream::with_edge("2024-07-01", "2024-07-05"));
    let mut engine = NotificationEngine::load(store.clone()).await.unwrap();
    let sink = CollectingSink::default();

    run_discovery_cycle(&walker, &mut engine, &store, &subscriptions(), &sink, false)
        .await
        .unwrap();

    let catalog = store.load_catalog().await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].origin, "A");
    assert_eq!(catalog[0].returns[0].destination, "B");
}

#[tokio::test]
async fn shifted_dates_renotify_after_reconciliation() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = JsonStateStore::new(tmp.path());
    let mut engine = NotificationEngine::load(store.clone()).await.unwrap();
    let sink = CollectingSink::default();
    let subs = subscriptions();

    let july = walker(FakeUpstream::with_edge("2024-07-01", "2024-07-05"));
    let first = run_discovery_cycle(&july, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    assert_eq!(first.notifications, 1);

    // The offer's dates shift: the old fingerprint is reconciled away
    // and the new window counts as a fresh route.
    let august = walker(FakeUpstream::with_edge("2024-08-01", "2024-08-05"));
    let second = run_discovery_cycle(&august, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    assert_eq!(second.notifications, 1);

    // And shifting back renotifies again: its fingerprint was pruned.
    let back = run_discovery_cycle(&july, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    assert_eq!(back.notifications, 1);
}

#[tokio::test]
async fn history_survives_engine_restart() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = JsonStateStore::new(tmp.path());
    let walker = walker(FakeUpstream::with_edge("2024-07-01", "2024-07-05"));
    let sink = CollectingSink::default();
    let subs = subscriptions();

    let mut engine = NotificationEngine::load(store.clone()).await.unwrap();
    run_discovery_cycle(&walker, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    drop(engine);

    // A fresh engine reads the persisted history and stays quiet.
    let mut engine = NotificationEngine::load(store.clone()).await.unwrap();
    let outcome = run_discovery_cycle(&walker, &mut engine, &store, &subs, &sink, false)
        .await
        .unwrap();
    assert_eq!(outcome.notifications, 0);
}
