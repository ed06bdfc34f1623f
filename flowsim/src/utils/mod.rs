//! Utility functions for identifier generation and timestamp handling.

mod ids;
pub mod timestamps;

pub use ids::{generate_execution_id, generate_event_id};
pub use timestamps::{format_iso8601, iso_timestamp, now_utc, parse_timestamp, Timestamp};
