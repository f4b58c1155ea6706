// src/pipeline/discover.rs

//! Discovery cycle orchestration.
//!
//! One cycle walks the upstream catalog, persists the fresh snapshot,
//! runs the diff pass over all subscriptions, and reconciles the
//! notification history against what is still offered upstream.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Route, StationRoutes, SubscriptionBook, group_by_origin};
use crate::pipeline::notify::{NotificationEngine, NotificationSink};
use crate::services::catalog::{CatalogApi, CatalogWalker, RouteObserver, WalkStats};
use crate::storage::{HistoryStore, JsonStateStore};

/// Result of one discovery cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Snapshot grouping, as persisted to catalog.json
    pub catalog: Vec<StationRoutes>,
    /// Flat normalized route set
    pub routes: Vec<Route>,
    /// Walk counters (skipped stations, failed edges)
    pub stats: WalkStats,
    /// Notification events emitted during this cycle
    pub notifications: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Bridges the walker's per-route hook to the notification engine so
/// subscribers hear about a route before the full walk finishes.
struct RealtimeNotifier<'a, S: HistoryStore> {
    engine: Mutex<&'a mut NotificationEngine<S>>,
    subscriptions: &'a SubscriptionBook,
    sink: &'a dyn NotificationSink,
    emitted: AtomicUsize,
}

#[async_trait]
impl<S: HistoryStore> RouteObserver for RealtimeNotifier<'_, S> {
    async fn on_route(&self, route: &Route) {
        let mut engine = self.engine.lock().await;
        let emitted = engine
            .process_route(route, self.subscriptions, self.sink)
            .await;
        self.emitted.fetch_add(emitted, Ordering::Relaxed);
    }
}

/// Run one full discovery cycle.
///
/// With `realtime` set, notifications go out as each route is
/// discovered; otherwise a single diff pass runs after the walk. Either
/// way the cycle ends by persisting the catalog snapshot and pruning
/// history entries for routes no longer present upstream.
pub async fn run_discovery_cycle<A: CatalogApi, S: HistoryStore>(
    walker: &CatalogWalker<A>,
    engine: &mut NotificationEngine<S>,
    store: &JsonStateStore,
    subscriptions: &SubscriptionBook,
    sink: &dyn NotificationSink,
    realtime: bool,
) -> Result<CycleOutcome> {
    let start_time = Utc::now();
    log::info!("Starting discovery cycle");

    let (outcome, notifications) = if realtime {
        let notifier = RealtimeNotifier {
            engine: Mutex::new(&mut *engine),
            subscriptions,
            sink,
            emitted: AtomicUsize::new(0),
        };
        let outcome = walker.walk(Some(&notifier as &dyn RouteObserver)).await?;
        (outcome, notifier.emitted.into_inner())
    } else {
        let outcome = walker.walk(None).await?;
        let emitted = engine
            .process_catalog(&outcome.routes, subscriptions, sink)
            .await;
        (outcome, emitted)
    };

    let catalog = group_by_origin(&outcome.routes);
    if let Err(e) = store.save_catalog(&catalog).await {
        log::error!("Catalog snapshot persist failed: {e}");
    }

    engine.reconcile(&outcome.routes).await;

    let end_time = Utc::now();
    log::info!(
        "Discovery cycle finished: {} routes, {} notifications, {} edges failed",
        outcome.routes.len(),
        notifications,
        outcome.stats.edges_failed
    );

    Ok(CycleOutcome {
        catalog,
        routes: outcome.routes,
        stats: outcome.stats,
        notifications,
        start_time,
        end_time,
    })
}
