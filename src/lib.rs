// src/lib.rs

//! rally-scout library
//!
//! Discovers relocation routes offered by a remote vehicle-rental
//! catalog and notifies subscribers whose watched stations or date
//! ranges newly match an offer.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
