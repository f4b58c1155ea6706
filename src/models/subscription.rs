//! Subscriber interest declarations.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::AvailabilityWindow;
use crate::utils::parse_iso_date;

/// An inclusive date range a subscriber cares about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Inclusive overlap test against an availability window.
    ///
    /// A window ending exactly on the filter's start date (or starting
    /// on its end date) counts as an overlap.
    pub fn overlaps(&self, window: &AvailabilityWindow) -> bool {
        window.start <= self.end && window.end >= self.start
    }
}

/// Raw date-range entry as stored on disk. Dates may be full ISO
/// timestamps; only the date portion is used.
#[derive(Debug, Clone, Deserialize)]
struct RawDateRange {
    start: String,
    end: String,
}

/// All subscriber interest state: favorite stations plus optional
/// date-range filters, keyed by subscriber id.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionBook {
    favorites: HashMap<String, HashSet<String>>,
    date_ranges: HashMap<String, Vec<DateRange>>,
}

impl SubscriptionBook {
    pub fn new(
        favorites: HashMap<String, HashSet<String>>,
        date_ranges: HashMap<String, Vec<DateRange>>,
    ) -> Self {
        Self {
            favorites,
            date_ranges,
        }
    }

    /// Build a book from the on-disk JSON shapes
    /// (`{subscriber: [station, ...]}` and `{subscriber: [{start, end}]}`).
    ///
    /// A date range that fails to parse is skipped with a warning; the
    /// subscriber's remaining ranges and all other subscribers are
    /// unaffected.
    pub fn from_raw(
        favorites: HashMap<String, Vec<String>>,
        raw_ranges: HashMap<String, serde_json::Value>,
    ) -> Self {
        let favorites = favorites
            .into_iter()
            .map(|(subscriber, stations)| (subscriber, stations.into_iter().collect()))
            .collect();

        let mut date_ranges: HashMap<String, Vec<DateRange>> = HashMap::new();
        for (subscriber, value) in raw_ranges {
            let entries: Vec<RawDateRange> = match serde_json::from_value(value) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Ignoring date filters for subscriber {subscriber}: {e}");
                    continue;
                }
            };
            let mut parsed = Vec::new();
            for raw in entries {
                match (parse_iso_date(&raw.start), parse_iso_date(&raw.end)) {
                    (Some(start), Some(end)) => parsed.push(DateRange { start, end }),
                    _ => log::warn!(
                        "Skipping malformed date range {}..{} for subscriber {subscriber}",
                        raw.start,
                        raw.end
                    ),
                }
            }
            if !parsed.is_empty() {
                date_ranges.insert(subscriber, parsed);
            }
        }

        Self {
            favorites,
            date_ranges,
        }
    }

    /// Iterate over all subscriber ids with at least one favorite.
    pub fn subscribers(&self) -> impl Iterator<Item = &str> {
        self.favorites.keys().map(String::as_str)
    }

    /// Whether a station name is among a subscriber's favorites.
    pub fn is_favorite(&self, subscriber: &str, station: &str) -> bool {
        self.favorites
            .get(subscriber)
            .is_some_and(|stations| stations.contains(station))
    }

    /// Whether any of the given windows passes the subscriber's date
    /// filters. No filters configured means all dates pass.
    pub fn dates_pass(&self, subscriber: &str, windows: &[AvailabilityWindow]) -> bool {
        match self.date_ranges.get(subscriber) {
            None => true,
            Some(ranges) if ranges.is_empty() => true,
            Some(ranges) => windows
                .iter()
                .any(|w| ranges.iter().any(|r| r.overlaps(w))),
        }
    }
}
