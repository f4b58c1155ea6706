// src/services/catalog.rs

//! Catalog walker service.
//!
//! Walks the upstream relocation catalog in strict dependency order:
//! station list, per-station return declarations, per-edge availability
//! windows, then offer details for the first window of each surviving
//! edge. Every failure below the station list is isolated to its edge.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{AvailabilityWindow, Route, Station, UpstreamConfig, WalkerConfig};
use crate::services::fetcher::{Fetcher, Transport};
use crate::services::images::ImageCache;
use crate::utils::{clean_text, parse_iso_date};

/// Placeholder when the offer lookup yields no usable vehicle data.
const UNKNOWN_MODEL: &str = "Unknown model";

/// Station entry as the upstream lists it. All fields optional so one
/// bad entry never poisons the whole listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStation {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub returns: Option<Vec<u64>>,
}

/// Availability window as the upstream reports it (ISO timestamps).
#[derive(Debug, Clone, Deserialize)]
pub struct RawTimeframe {
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
}

/// One offer from the pairwise search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOffer {
    #[serde(default)]
    pub model: Option<RawOfferModel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOfferModel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<RawOfferImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOfferImage {
    #[serde(default)]
    pub image: Option<RawImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImageRef {
    #[serde(default)]
    pub url: Option<String>,
}

/// Typed view of the three upstream catalog endpoints.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_stations(&self) -> Result<Vec<RawStation>>;

    async fn station_detail(&self, id: u64) -> Result<RawStation>;

    async fn timeframes(&self, origin: u64, destination: u64) -> Result<Vec<RawTimeframe>>;

    async fn search_offers(
        &self,
        origin: u64,
        destination: u64,
        window: &AvailabilityWindow,
    ) -> Result<Vec<RawOffer>>;

    /// Deep link into the upstream booking flow for an edge and window.
    fn booking_url(&self, origin: u64, destination: u64, window: &AvailabilityWindow) -> String;
}

/// HTTP implementation of [`CatalogApi`] over the paced fetcher.
///
/// Each endpoint carries the same fixed header set plus a per-endpoint
/// `X-Requested-Alias` routing value.
pub struct HttpCatalogClient<T: Transport> {
    fetcher: Fetcher<T>,
    upstream: UpstreamConfig,
    referer: String,
}

impl<T: Transport> HttpCatalogClient<T> {
    pub fn new(fetcher: Fetcher<T>, upstream: UpstreamConfig) -> Self {
        let referer = format!(
            "{}?currency={}",
            upstream.booking_url.trim_end_matches("/pick"),
            upstream.currency
        );
        Self {
            fetcher,
            upstream,
            referer,
        }
    }

    fn headers(&self, alias: &'static str) -> Vec<(&str, &str)> {
        vec![
            ("Accept", "application/json, text/plain, */*"),
            ("Accept-Language", "en-UK,en;q=0.7"),
            ("Cache-Control", "no-cache"),
            ("Pragma", "no-cache"),
            ("Referer", self.referer.as_str()),
            ("Sec-Fetch-Dest", "empty"),
            ("Sec-Fetch-Mode", "cors"),
            ("Sec-Fetch-Site", "same-origin"),
            ("X-Requested-Alias", alias),
        ]
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/en/rally/{}", self.upstream.base_url, path)
    }

    /// Expect a JSON array and deserialize entries, skipping bad ones.
    fn tolerant_array<D: serde::de::DeserializeOwned>(url: &str, value: Value) -> Result<Vec<D>> {
        let entries = value
            .as_array()
            .ok_or_else(|| AppError::malformed(url, "expected a JSON array"))?;

        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<D>(entry.clone()) {
                Ok(item) => parsed.push(item),
                Err(e) => log::warn!("Skipping malformed entry from {url}: {e}"),
            }
        }
        Ok(parsed)
    }
}

#[async_trait]
impl<T: Transport> CatalogApi for HttpCatalogClient<T> {
    async fn list_stations(&self) -> Result<Vec<RawStation>> {
        let url = self.endpoint("stations");
        let value = self
            .fetcher
            .fetch(&url, &self.headers("rally.startStations"))
            .await?;
        Self::tolerant_array(&url, value)
    }

    async fn station_detail(&self, id: u64) -> Result<RawStation> {
        let url = self.endpoint(&format!("stations/{id}"));
        let value = self
            .fetcher
            .fetch(&url, &self.headers("rally.fetchRoutes"))
            .await?;
        serde_json::from_value(value).map_err(|e| AppError::malformed(&url, e))
    }

    async fn timeframes(&self, origin: u64, destination: u64) -> Result<Vec<RawTimeframe>> {
        let url = self.endpoint(&format!("timeframes/{origin}-{destination}"));
        let value = self
            .fetcher
            .fetch(&url, &self.headers("rally.timeframes"))
            .await?;
        Self::tolerant_array(&url, value)
    }

    async fn search_offers(
        &self,
        origin: u64,
        destination: u64,
        window: &AvailabilityWindow,
    ) -> Result<Vec<RawOffer>> {
        let mut url = Url::parse(&self.endpoint("search"))
            .map_err(|e| AppError::malformed(self.upstream.base_url.as_str(), e))?;
        url.query_pairs_mut()
            .append_pair("stations", &format!("[[{origin},{destination}]]"))
            .append_pair("range", &format!("[\"{}\",\"{}\"]", window.start, window.end))
            .append_pair("currency", &self.upstream.currency)
            .append_pair("models", "[]");

        let url = url.to_string();
        let value = self.fetcher.fetch(&url, &self.headers("rally.search")).await?;
        Self::tolerant_array(&url, value)
    }

    fn booking_url(&self, origin: u64, destination: u64, window: &AvailabilityWindow) -> String {
        format!(
            "{}?pickup_date={}&return_date={}&currency={}&startStation={}&endStation={}",
            self.upstream.booking_url,
            window.start,
            window.end,
            self.upstream.currency,
            origin,
            destination
        )
    }
}

/// Hook invoked as each route is finalized, before the full catalog is
/// assembled. The walker awaits the hook, so discovery order is
/// preserved; hooks that must not stall the walk should enqueue and
/// return.
#[async_trait]
pub trait RouteObserver: Send + Sync {
    async fn on_route(&self, route: &Route);
}

/// Counters for one walk, used to tell "cycle failed" apart from
/// "cycle completed with N edges skipped".
#[derive(Debug, Default, Clone)]
pub struct WalkStats {
    pub stations_total: usize,
    pub stations_invalid: usize,
    pub stations_detail_failed: usize,
    pub edges_total: usize,
    pub edges_failed: usize,
    pub edges_empty: usize,
}

/// A full walk's output: the normalized route set plus counters.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub routes: Vec<Route>,
    pub stats: WalkStats,
}

/// Walks the catalog through a [`CatalogApi`].
pub struct CatalogWalker<A: CatalogApi> {
    api: A,
    images: Option<ImageCache>,
    max_concurrent: usize,
}

impl<A: CatalogApi> CatalogWalker<A> {
    pub fn new(api: A, images: Option<ImageCache>, config: &WalkerConfig) -> Self {
        Self {
            api,
            images,
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Run one full discovery walk.
    ///
    /// A station-list failure is fatal. Everything below it degrades
    /// per edge. When an observer is supplied it is awaited for each
    /// route as it is finalized.
    pub async fn walk(&self, observer: Option<&dyn RouteObserver>) -> Result<WalkOutcome> {
        let mut stats = WalkStats::default();

        // Step 1: station listing. Nothing to walk if this fails.
        let raw_stations = self.api.list_stations().await?;
        stats.stations_total = raw_stations.len();

        let mut registry: HashMap<u64, Station> = HashMap::new();
        for raw in raw_stations {
            match (raw.id, raw.name, raw.address) {
                (Some(id), Some(name), Some(address)) => {
                    registry.insert(
                        id,
                        Station {
                            id,
                            name: clean_text(&name),
                            address: clean_text(&address),
                        },
                    );
                }
                (id, name, _) => {
                    stats.stations_invalid += 1;
                    log::warn!(
                        "Skipping station with missing fields (id: {id:?}, name: {name:?})"
                    );
                }
            }
        }

        // Step 2: per-station detail, to learn declared return routes.
        let ids: Vec<u64> = registry.keys().copied().collect();
        let mut detail_stream = stream::iter(ids)
            .map(|id| async move { (id, self.api.station_detail(id).await) })
            .buffer_unordered(self.max_concurrent);

        let mut edges: Vec<(u64, u64)> = Vec::new();
        while let Some((id, result)) = detail_stream.next().await {
            match result {
                Ok(detail) => {
                    // Stations declaring no returns contribute nothing.
                    for destination in detail.returns.unwrap_or_default() {
                        if registry.contains_key(&destination) {
                            edges.push((id, destination));
                        } else {
                            log::warn!(
                                "Station {id} declares unknown return station {destination}"
                            );
                        }
                    }
                }
                Err(e) => {
                    stats.stations_detail_failed += 1;
                    log::warn!("Failed to fetch detail for station {id}: {e}");
                }
            }
        }

        // Steps 3 and 4: per-edge windows and offer details. Failures
        // are isolated per edge.
        stats.edges_total = edges.len();
        let registry = &registry;
        let mut edge_stream = stream::iter(edges)
            .map(|(origin_id, destination_id)| async move {
                let origin = &registry[&origin_id];
                let destination = &registry[&destination_id];
                (
                    (origin_id, destination_id),
                    self.process_edge(origin, destination).await,
                )
            })
            .buffer_unordered(self.max_concurrent);

        let mut routes = Vec::new();
        while let Some(((origin_id, destination_id), result)) = edge_stream.next().await {
            match result {
                Ok(Some(route)) => {
                    if let Some(observer) = observer {
                        observer.on_route(&route).await;
                    }
                    routes.push(route);
                }
                Ok(None) => stats.edges_empty += 1,
                Err(e) => {
                    stats.edges_failed += 1;
                    log::warn!("Skipping edge {origin_id} -> {destination_id}: {e}");
                }
            }
        }

        log::info!(
            "Walk complete: {} routes, {} empty edges, {} failed edges",
            routes.len(),
            stats.edges_empty,
            stats.edges_failed
        );
        Ok(WalkOutcome { routes, stats })
    }

    /// Build the route for one origin/destination pair, or `None` when
    /// the pair has no usable availability windows.
    async fn process_edge(&self, origin: &Station, destination: &Station) -> Result<Option<Route>> {
        let raw_windows = self.api.timeframes(origin.id, destination.id).await?;

        let mut windows = Vec::new();
        for raw in &raw_windows {
            match (parse_iso_date(&raw.start_date), parse_iso_date(&raw.end_date)) {
                (Some(start), Some(end)) => windows.push(AvailabilityWindow { start, end }),
                _ => log::warn!(
                    "Dropping unparseable window {}..{} for {} -> {}",
                    raw.start_date,
                    raw.end_date,
                    origin.name,
                    destination.name
                ),
            }
        }

        // A pair without windows is not a route.
        if windows.is_empty() {
            log::debug!("No availability for {} -> {}", origin.name, destination.name);
            return Ok(None);
        }

        let first = windows[0];
        let (vehicle_model, vehicle_image_ref) =
            self.vehicle_details(origin, destination, &first).await;

        Ok(Some(Route {
            origin: origin.name.clone(),
            origin_address: origin.address.clone(),
            destination: destination.name.clone(),
            destination_address: destination.address.clone(),
            available_dates: windows,
            vehicle_model,
            vehicle_image_ref,
            booking_url: self.api.booking_url(origin.id, destination.id, &first),
        }))
    }

    /// Offer details for the first window, degrading to placeholders.
    async fn vehicle_details(
        &self,
        origin: &Station,
        destination: &Station,
        window: &AvailabilityWindow,
    ) -> (String, String) {
        let offers = match self
            .api
            .search_offers(origin.id, destination.id, window)
            .await
        {
            Ok(offers) => offers,
            Err(e) => {
                log::warn!(
                    "Offer lookup failed for {} -> {}: {e}",
                    origin.name,
                    destination.name
                );
                return (UNKNOWN_MODEL.to_string(), String::new());
            }
        };

        let Some(model) = offers.iter().find_map(|offer| offer.model.as_ref()) else {
            return (UNKNOWN_MODEL.to_string(), String::new());
        };

        let name = model
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string());

        let image_url = model
            .images
            .first()
            .and_then(|entry| entry.image.as_ref())
            .and_then(|image| image.url.clone());

        let image_ref = match (&image_url, &self.images) {
            (Some(url), Some(cache)) => cache.ensure(url).await,
            (Some(url), None) => ImageCache::cache_key(url).unwrap_or_default(),
            (None, _) => String::new(),
        };

        (name, image_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn window(y: i32, m: u32, d: u32, y2: i32, m2: u32, d2: u32) -> AvailabilityWindow {
        AvailabilityWindow {
            start: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            end: NaiveDate::from_ymd_opt(y2, m2, d2).unwrap(),
        }
    }

    /// In-memory upstream for walker tests.
    #[derive(Default)]
    struct FakeApi {
        stations: Vec<RawStation>,
        details: HashMap<u64, RawStation>,
        timeframes: HashMap<(u64, u64), Vec<RawTimeframe>>,
        failing_timeframes: HashSet<(u64, u64)>,
        offers: HashMap<(u64, u64), Vec<RawOffer>>,
    }

    #[async_trait]
    impl CatalogApi for FakeApi {
        async fn list_stations(&self) -> Result<Vec<RawStation>> {
            Ok(self.stations.clone())
        }

        async fn station_detail(&self, id: u64) -> Result<RawStation> {
            Ok(self.details.get(&id).cloned().unwrap_or_default())
        }

        async fn timeframes(&self, origin: u64, destination: u64) -> Result<Vec<RawTimeframe>> {
            if self.failing_timeframes.contains(&(origin, destination)) {
                return Err(AppError::transient("fake://timeframes", "boom"));
            }
            Ok(self
                .timeframes
                .get(&(origin, destination))
                .cloned()
                .unwrap_or_default())
        }

        async fn search_offers(
            &self,
            origin: u64,
            destination: u64,
            _window: &AvailabilityWindow,
        ) -> Result<Vec<RawOffer>> {
            Ok(self
                .offers
                .get(&(origin, destination))
                .cloned()
                .unwrap_or_default())
        }

        fn booking_url(
            &self,
            origin: u64,
            destination: u64,
            window: &AvailabilityWindow,
        ) -> String {
            format!("fake://book/{origin}-{destination}/{}", window.start)
        }
    }

    fn station(id: u64, name: &str) -> RawStation {
        RawStation {
            id: Some(id),
            name: Some(name.to_string()),
            address: Some(format!("{name} address")),
            returns: None,
        }
    }

    fn detail(id: u64, returns: Vec<u64>) -> RawStation {
        RawStation {
            id: Some(id),
            name: None,
            address: None,
            returns: Some(returns),
        }
    }

    fn raw_window(start: &str, end: &str) -> RawTimeframe {
        RawTimeframe {
            start_date: start.to_string(),
            end_date: end.to_string(),
        }
    }

    fn two_station_api() -> FakeApi {
        let mut api = FakeApi {
            stations: vec![station(1, "Hamburg"), station(2, "München")],
            ..FakeApi::default()
        };
        api.details.insert(1, detail(1, vec![2]));
        api.details.insert(2, detail(2, vec![]));
        api.timeframes.insert(
            (1, 2),
            vec![raw_window("2024-07-01T00:00:00Z", "2024-07-05T00:00:00Z")],
        );
        api.offers.insert(
            (1, 2),
            vec![RawOffer {
                model: Some(RawOfferModel {
                    name: Some("Surfer Suite".to_string()),
                    images: vec![RawOfferImage {
                        image: Some(RawImageRef {
                            url: Some("https://cdn.example.com/m/suite.jpeg".to_string()),
                        }),
                    }],
                }),
            }],
        );
        api
    }

    fn walker(api: FakeApi) -> CatalogWalker<FakeApi> {
        CatalogWalker::new(api, None, &WalkerConfig { max_concurrent: 2 })
    }

    #[tokio::test]
    async fn test_walk_builds_normalized_route() {
        let outcome = walker(two_station_api()).walk(None).await.unwrap();

        assert_eq!(outcome.routes.len(), 1);
        let route = &outcome.routes[0];
        assert_eq!(route.origin, "Hamburg");
        assert_eq!(route.destination, "Muenchen");
        assert_eq!(
            route.available_dates,
            vec![window(2024, 7, 1, 2024, 7, 5)]
        );
        assert_eq!(route.vehicle_model, "Surfer Suite");
        assert_eq!(route.vehicle_image_ref, "suite.jpeg");
        assert_eq!(route.booking_url, "fake://book/1-2/2024-07-01");
    }

    #[tokio::test]
    async fn test_invalid_stations_skipped() {
        let mut api = two_station_api();
        api.stations.push(RawStation::default());

        let outcome = walker(api).walk(None).await.unwrap();
        assert_eq!(outcome.stats.stations_total, 3);
        assert_eq!(outcome.stats.stations_invalid, 1);
        assert_eq!(outcome.routes.len(), 1);
    }

    #[tokio::test]
    async fn test_edge_failure_is_isolated() {
        let mut api = two_station_api();
        api.stations.push(station(3, "Berlin"));
        api.details.insert(1, detail(1, vec![2, 3]));
        api.details.insert(3, detail(3, vec![]));
        api.failing_timeframes.insert((1, 3));

        let outcome = walker(api).walk(None).await.unwrap();
        // Sibling edge still produced its route.
        assert_eq!(outcome.routes.len(), 1);
        assert_eq!(outcome.stats.edges_total, 2);
        assert_eq!(outcome.stats.edges_failed, 1);
    }

    #[tokio::test]
    async fn test_unparseable_windows_dropped_edge_skipped() {
        let mut api = two_station_api();
        api.timeframes
            .insert((1, 2), vec![raw_window("garbage", "2024-07-05")]);

        let outcome = walker(api).walk(None).await.unwrap();
        assert!(outcome.routes.is_empty());
        assert_eq!(outcome.stats.edges_empty, 1);
    }

    #[tokio::test]
    async fn test_missing_offer_degrades_to_placeholder() {
        let mut api = two_station_api();
        api.offers.clear();

        let outcome = walker(api).walk(None).await.unwrap();
        assert_eq!(outcome.routes[0].vehicle_model, "Unknown model");
        assert_eq!(outcome.routes[0].vehicle_image_ref, "");
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RouteObserver for Recorder {
        async fn on_route(&self, route: &Route) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}>{}", route.origin, route.destination));
        }
    }

    #[tokio::test]
    async fn test_observer_sees_each_route() {
        let recorder = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        let outcome = walker(two_station_api())
            .walk(Some(&recorder as &dyn RouteObserver))
            .await
            .unwrap();

        assert_eq!(outcome.routes.len(), 1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["Hamburg>Muenchen"]);
    }
}
