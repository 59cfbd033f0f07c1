//! Wall-clock helper.

use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Current unix time in seconds (0 if the system clock is before the epoch).
pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
