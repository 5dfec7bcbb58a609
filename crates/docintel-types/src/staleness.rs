//! Staleness predicate used by the reconciliation sweep.
//!
//! A tag is stale when it was never indexed, or when either its own
//! modification date or the newest date among its documents is more than
//! `max_delay` past its last index date.

use chrono::{DateTime, Duration, Utc};

use crate::tag::Tag;

/// Upper bound for minute-valued settings (one year).
pub const MAX_SETTING_MINUTES: u64 = 366 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub max_delay: Duration,
}

impl StalenessPolicy {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    /// Build from the `max_indexing_delay` setting (minutes).
    ///
    /// Values above [`MAX_SETTING_MINUTES`] are clamped to it.
    pub fn from_minutes(minutes: u64) -> Self {
        let minutes = minutes.min(MAX_SETTING_MINUTES) as i64;
        Self::new(Duration::try_minutes(minutes).unwrap_or(Duration::MAX))
    }

    /// Check whether `tag` needs re-indexing.
    ///
    /// `latest_document_date` is the maximum document date among the
    /// tag's associated documents, `None` when it has none.
    pub fn is_stale(&self, tag: &Tag, latest_document_date: Option<DateTime<Utc>>) -> bool {
        let Some(last_index) = tag.last_index_date else {
            return true;
        };

        if tag.modification_date - last_index > self.max_delay {
            return true;
        }

        latest_document_date.is_some_and(|date| date - last_index > self.max_delay)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_minutes(10)
    }
}
