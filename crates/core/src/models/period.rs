//! Poll periods.
//!
//! A poll period is identified by `YYYY-MM-WW`, where `WW` is the
//! Monday-based week of the year (`%W`). One weekly poll exists per period
//! and team. A week that straddles a month boundary yields two identifiers.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const PERIOD_FORMAT: &str = "%Y-%m-%W";

/// Identifier of the poll period containing `now`, evaluated in `tz`.
#[must_use]
pub fn current_period_id(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format(PERIOD_FORMAT).to_string()
}
