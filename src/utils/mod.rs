//! Utility functions and helpers.

pub mod clean;

pub use clean::{clean_text, parse_iso_date};
