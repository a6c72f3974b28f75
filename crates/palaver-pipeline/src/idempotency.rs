// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-line webhook deduplication.
//!
//! Providers deliver at least once, so the same `MessageSid` can arrive
//! several times within seconds. The guard remembers ids for a TTL window
//! and answers "seen it" without touching storage. It is process-local and
//! forgets everything on restart; the unique constraint on
//! `messages.provider_message_id` is the durable backstop.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use palaver_config::model::CacheConfig;
use tokio::time::Instant;
use tracing::debug;

pub struct IdempotencyGuard {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl IdempotencyGuard {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.idempotency_ttl_secs),
            config.idempotency_max_entries,
        )
    }

    /// Records `id` and returns `true` if it had not been seen inside the TTL
    /// window. Concurrent callers with the same id: exactly one gets `true`.
    pub fn check_and_mark(&self, id: &str) -> bool {
        let now = Instant::now();
        if !self.seen.contains_key(id) && self.seen.len() >= self.max_entries {
            self.make_room(now);
        }
        match self.seen.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_live(*entry.get(), now) {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn has_been_processed(&self, id: &str) -> bool {
        let now = Instant::now();
        self.seen
            .get(id)
            .is_some_and(|seen_at| self.is_live(*seen_at, now))
    }

    pub fn mark_processed(&self, id: &str) {
        let now = Instant::now();
        if !self.seen.contains_key(id) && self.seen.len() >= self.max_entries {
            self.make_room(now);
        }
        self.seen.insert(id.to_string(), now);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.seen.len();
        self.seen.retain(|_, seen_at| self.is_live(*seen_at, now));
        before.saturating_sub(self.seen.len())
    }

    fn is_live(&self, seen_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(seen_at) < self.ttl
    }

    fn make_room(&self, now: Instant) {
        self.seen.retain(|_, seen_at| self.is_live(*seen_at, now));
        while self.seen.len() >= self.max_entries {
            let oldest = self
                .seen
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    debug!(provider_message_id = %key, "idempotency guard full, evicting oldest id");
                    self.seen.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn second_delivery_is_rejected_within_ttl() {
        let guard = IdempotencyGuard::new(Duration::from_secs(600), 100);
        assert!(!guard.has_been_processed("SM123"));
        assert!(guard.check_and_mark("SM123"));
        assert!(guard.has_been_processed("SM123"));
        assert!(!guard.check_and_mark("SM123"));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(!guard.check_and_mark("SM123"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!guard.has_been_processed("SM123"));
        assert!(guard.check_and_mark("SM123"));
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_purges_expired_then_evicts_oldest() {
        let guard = IdempotencyGuard::new(Duration::from_secs(10), 3);
        guard.mark_processed("a");
        tokio::time::advance(Duration::from_secs(11)).await;
        guard.mark_processed("b");
        tokio::time::advance(Duration::from_millis(1)).await;
        guard.mark_processed("c");
        tokio::time::advance(Duration::from_millis(1)).await;

        // "a" is expired and goes first; nothing live is evicted yet.
        assert!(guard.check_and_mark("d"));
        assert_eq!(guard.len(), 3);
        assert!(guard.has_been_processed("b"));

        // Full with live ids: the oldest live one ("b") is evicted.
        assert!(guard.check_and_mark("e"));
        assert_eq!(guard.len(), 3);
        assert!(!guard.has_been_processed("b"));
        assert!(guard.has_been_processed("c"));
        assert!(guard.has_been_processed("e"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_ids() {
        let guard = IdempotencyGuard::new(Duration::from_secs(5), 10);
        guard.mark_processed("x");
        tokio::time::advance(Duration::from_secs(3)).await;
        guard.mark_processed("y");
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(guard.purge_expired(), 1);
        assert!(guard.has_been_processed("y"));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(guard.purge_expired(), 1);
        assert!(guard.is_empty());
    }

    #[test]
    fn concurrent_marks_admit_exactly_one() {
        let guard = Arc::new(IdempotencyGuard::new(Duration::from_secs(600), 1000));
        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let guard = Arc::clone(&guard);
                    scope.spawn(move || guard.check_and_mark("SM-race") as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(admitted, 1);
    }
}
