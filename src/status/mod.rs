//! Per-source freshness decision.
//!
//! One timestamp per source, fixed 5-minute TTL, nothing to evict. The
//! check-then-act window between [`should_scrape`] and the status write is
//! deliberately unguarded: concurrent refreshes of the same source may both
//! scrape, and the (external_id, source) upsert key absorbs the duplicates.

use chrono::{Duration, NaiveDateTime};

/// How long a source's listings are served from the store before a re-scrape.
pub const FRESHNESS_TTL_MINUTES: i64 = 5;

/// True when a scrape is needed: forced, never scraped, or stale.
pub fn should_scrape(force: bool, last_scraped_at: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    if force {
        return true;
    }
    match last_scraped_at {
        None => true,
        Some(last) => now - last > Duration::minutes(FRESHNESS_TTL_MINUTES),
    }
}
