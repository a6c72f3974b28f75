// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation serialization.
//!
//! Two webhooks from the same customer must not interleave their
//! read-modify-write of flow state. Each (tenant, customer phone) pair gets
//! an async mutex; the entry is removed again once nobody holds or waits on
//! it. Process-local only.

use std::sync::Arc;

use dashmap::DashMap;
use palaver_core::TenantId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (TenantId, String);
type LockMap = DashMap<LockKey, Arc<Mutex<()>>>;

#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<LockMap>,
}

/// Held for the duration of a turn; releases and cleans up on drop.
pub struct ConversationGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: LockKey,
    locks: Arc<LockMap>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the conversation of `customer_phone`.
    pub async fn acquire(&self, tenant_id: &TenantId, customer_phone: &str) -> ConversationGuard {
        let key = (tenant_id.clone(), customer_phone.to_string());
        let mutex = Arc::clone(&self.inner.entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;
        ConversationGuard {
            guard: Some(guard),
            key,
            locks: Arc::clone(&self.inner),
        }
    }

    /// Number of conversations currently locked or awaited.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        // Unlock first so the map holds the last reference when uncontended.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let locks = ConversationLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                tokio::spawn(async move {
                    let _guard = locks.acquire(&TenantId::new("t1"), "33600000001").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire(&TenantId::new("t1"), "331").await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&TenantId::new("t1"), "332"),
        )
        .await;
        assert!(b.is_ok());
        // Same phone under another tenant is a different conversation.
        let c = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&TenantId::new("t2"), "331"),
        )
        .await;
        assert!(c.is_ok());
        assert_eq!(locks.len(), 3);
    }
}
