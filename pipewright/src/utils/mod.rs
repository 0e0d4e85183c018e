//! Utility helpers for UUID generation and timestamps.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a new v4 UUID.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Returns the current UTC time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
