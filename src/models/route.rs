//! Route and station data structures.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A location node in the rental network, as listed by the upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Station {
    /// Upstream unique identifier
    pub id: u64,

    /// Display name (cleaned before use)
    pub name: String,

    /// Street address (cleaned before use)
    pub address: String,
}

/// An inclusive calendar range during which a route can be booked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityWindow {
    /// First bookable pickup date
    #[serde(rename = "startDate")]
    pub start: NaiveDate,

    /// Last bookable return date
    #[serde(rename = "endDate")]
    pub end: NaiveDate,
}

/// A directed origin→destination relocation offer.
///
/// Produced fresh each discovery cycle and never mutated afterwards.
/// `available_dates` is never empty; a pair without windows yields no
/// `Route` at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    /// Cleaned origin station name
    pub origin: String,

    /// Cleaned origin address
    pub origin_address: String,

    /// Cleaned destination station name
    pub destination: String,

    /// Cleaned destination address
    pub destination_address: String,

    /// Availability windows, in upstream order
    pub available_dates: Vec<AvailabilityWindow>,

    /// Vehicle model name ("Unknown model" when the offer lookup fails)
    pub vehicle_model: String,

    /// Local image cache key, empty when no image could be fetched
    pub vehicle_image_ref: String,

    /// Deep link into the upstream booking flow
    pub booking_url: String,
}

/// Which side of a route matched a subscriber's favorites.
///
/// Origin and destination matches are deduplicated independently, so
/// the side is part of the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchSide {
    Origin,
    Destination,
}

impl MatchSide {
    fn tag(self) -> &'static str {
        match self {
            MatchSide::Origin => "origin",
            MatchSide::Destination => "destination",
        }
    }
}

impl Route {
    /// Deterministic identity string used for notification dedup.
    ///
    /// Format (version 1):
    /// `v1|{side}|{origin}|{destination}|{start}..{end}|...` with one
    /// `start..end` segment per window, ISO dates, windows in their
    /// given order. Changing this format is a history migration; bump
    /// the version prefix rather than editing in place.
    pub fn fingerprint(&self, side: MatchSide) -> String {
        let mut fp = format!("v1|{}|{}|{}", side.tag(), self.origin, self.destination);
        for window in &self.available_dates {
            fp.push_str(&format!("|{}..{}", window.start, window.end));
        }
        fp
    }
}

/// Snapshot grouping: one origin station with all of its return routes.
///
/// This is the shape persisted to the route catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationRoutes {
    pub origin: String,
    pub origin_address: String,
    pub returns: Vec<ReturnLeg>,
}

/// One destination entry inside a [`StationRoutes`] group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLeg {
    pub destination: String,
    pub destination_address: String,
    pub available_dates: Vec<AvailabilityWindow>,
    pub vehicle_model: String,
    pub vehicle_image_ref: String,
    pub booking_url: String,
}

/// Group a flat route list by origin, preserving discovery order.
pub fn group_by_origin(routes: &[Route]) -> Vec<StationRoutes> {
    let mut grouped: Vec<StationRoutes> = Vec::new();
    for route in routes {
        let leg = ReturnLeg {
            destination: route.destination.clone(),
            destination_address: route.destination_address.clone(),
            available_dates: route.available_dates.clone(),
            vehicle_model: route.vehicle_model.clone(),
            vehicle_image_ref: route.vehicle_image_ref.clone(),
            booking_url: route.booking_url.clone(),
        };
        match grouped.iter_mut().find(|g| g.origin == route.origin) {
            Some(group) => group.returns.push(leg),
            None => grouped.push(StationRoutes {
                origin: route.origin.clone(),
                origin_address: route.origin_address.clone(),
                returns: vec![leg],
            }),
        }
    }
    grouped
}
