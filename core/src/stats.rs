//! Read-through cache for admin statistics.
//!
//! Entries live for a bounded TTL and are dropped on every ledger mutation
//! that can move a figure, so a dashboard never shows totals older than the
//! last write it made itself.

use std::cell::RefCell;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use entitle_types::AdminStats;

use crate::error::LedgerError;

#[derive(Debug)]
pub struct StatsCache {
    ttl: TimeDelta,
    entry: RefCell<Option<(DateTime<Utc>, AdminStats)>>,
}

impl StatsCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            entry: RefCell::new(None),
        }
    }

    /// Cached figures if still fresh at `now`, otherwise `load` and remember.
    pub fn get_or_load(
        &self,
        now: DateTime<Utc>,
        load: impl FnOnce() -> Result<AdminStats, LedgerError>,
    ) -> Result<AdminStats, LedgerError> {
        if let Some((loaded_at, stats)) = *self.entry.borrow()
            && now.signed_duration_since(loaded_at) < self.ttl
        {
            return Ok(stats);
        }

        let stats = load()?;
        tracing::debug!(?stats, "Admin statistics refreshed");
        *self.entry.borrow_mut() = Some((now, stats));
        Ok(stats)
    }

    pub fn invalidate(&self) {
        self.entry.borrow_mut().take();
    }
}
