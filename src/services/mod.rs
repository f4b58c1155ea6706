//! Service layer for rally-scout.
//!
//! This module contains the I/O-facing building blocks:
//! - Paced, retrying upstream fetches (`Fetcher`)
//! - Catalog walking (`CatalogWalker` over a `CatalogApi`)
//! - Vehicle image caching (`ImageCache`)

pub mod catalog;
pub mod fetcher;
pub mod images;

pub use catalog::{CatalogApi, CatalogWalker, HttpCatalogClient, RouteObserver, WalkOutcome, WalkStats};
pub use fetcher::{Fetcher, HttpTransport, RetryPolicy, Transport};
pub use images::ImageCache;
