//! Tracking of outstanding AuthnRequests.
//!
//! When enabled, the validator only accepts a Response whose
//! `InResponseTo` names a request this SP issued in the last few minutes,
//! and each request can be answered once.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// How long an issued request stays answerable.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(5 * 60);

/// How many requests may be outstanding at once.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Outstanding AuthnRequest IDs.
#[derive(Debug)]
pub struct PendingRequests {
    issued: DashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TTL)
    }
}

impl PendingRequests {
    /// Creates an empty tracker whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            issued: DashMap::new(),
            ttl,
            max_entries: DEFAULT_MAX_PENDING,
        }
    }

    /// Sets how many requests may be outstanding at once.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Records an issued request ID.
    ///
    /// When the tracker is full, expired entries are dropped first and then
    /// the oldest outstanding request, which can no longer be answered.
    pub fn record(&self, request_id: &str) {
        if self.issued.len() >= self.max_entries && self.purge_expired() == 0 {
            let oldest = self
                .issued
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.issued.remove(&oldest);
                tracing::warn!(
                    request_id = %oldest,
                    max_entries = self.max_entries,
                    "pending request table full, evicted oldest request"
                );
            }
        }
        self.issued.insert(request_id.to_string(), Instant::now());
    }

    /// Removes `request_id` and returns true if it was outstanding and not
    /// expired.
    pub fn consume(&self, request_id: &str) -> bool {
        self.issued
            .remove(request_id)
            .is_some_and(|(_, issued_at)| issued_at.elapsed() < self.ttl)
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.issued.len();
        self.issued.retain(|_, issued_at| issued_at.elapsed() < self.ttl);
        before.saturating_sub(self.issued.len())
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    /// Returns true if no request is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_can_be_consumed_once() {
        let pending = PendingRequests::default();
        pending.record("_abc");
        assert!(pending.consume("_abc"));
        assert!(!pending.consume("_abc"));
    }

    #[test]
    fn unknown_request_is_not_consumed() {
        let pending = PendingRequests::default();
        assert!(!pending.consume("_never_issued"));
    }

    #[test]
    fn full_tracker_evicts_instead_of_growing() {
        let pending = PendingRequests::default().with_max_entries(2);
        pending.record("_a");
        pending.record("_b");
        pending.record("_c");

        assert_eq!(pending.len(), 2);
        assert!(pending.consume("_c"));
        let survivors = ["_a", "_b"].iter().filter(|id| pending.consume(id)).count();
        assert_eq!(survivors, 1);
    }

    #[test]
    fn full_tracker_drops_expired_entries_first() {
        let pending = PendingRequests::new(Duration::ZERO).with_max_entries(2);
        pending.record("_a");
        pending.record("_b");
        pending.record("_c");
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn expired_requests_are_rejected_and_purged() {
        let pending = PendingRequests::new(Duration::ZERO);
        pending.record("_a");
        pending.record("_b");
        assert!(!pending.consume("_a"));
        assert_eq!(pending.purge_expired(), 1);
        assert!(pending.is_empty());
    }
}
