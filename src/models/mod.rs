// src/models/mod.rs

//! Domain models for rally-scout.
//!
//! This module contains all data structures used throughout the
//! application, organized by their primary purpose.

mod config;
mod route;
mod subscription;

// Re-export all public types
pub use config::{Config, FetcherConfig, LoggingConfig, PathsConfig, UpstreamConfig, WalkerConfig};
pub use route::{
    AvailabilityWindow, MatchSide, ReturnLeg, Route, Station, StationRoutes, group_by_origin,
};
pub use subscription::{DateRange, SubscriptionBook};
