// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destination number to tenant resolution with a read-through cache.
//!
//! Found tenants are cached for the hit TTL, unknown numbers for the
//! shorter miss TTL. Storage errors are returned to the caller and never
//! cached.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use palaver_config::model::CacheConfig;
use palaver_core::{PalaverError, StorageAdapter, Tenant, TenantId, normalize_phone};
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry {
    /// `None` caches the absence of a tenant.
    tenant: Option<Arc<Tenant>>,
    expires_at: Instant,
}

/// Counters for cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Resolutions answered with a cached tenant.
    pub hits: u64,
    /// Resolutions answered with a cached "no tenant".
    pub negative_hits: u64,
    /// Storage lookups performed.
    pub lookups: u64,
}

pub struct TenantResolver {
    storage: Arc<dyn StorageAdapter>,
    entries: DashMap<String, CacheEntry>,
    hit_ttl: Duration,
    miss_ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    negative_hits: AtomicU64,
    lookups: AtomicU64,
}

impl TenantResolver {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        hit_ttl: Duration,
        miss_ttl: Duration,
        max_entries: usize,
    ) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            hit_ttl,
            miss_ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            negative_hits: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        }
    }

    pub fn from_config(storage: Arc<dyn StorageAdapter>, config: &CacheConfig) -> Self {
        Self::new(
            storage,
            Duration::from_secs(config.tenant_hit_ttl_secs),
            Duration::from_secs(config.tenant_miss_ttl_secs),
            config.tenant_max_entries,
        )
    }

    /// Resolve the tenant owning `destination`, in any accepted number format.
    pub async fn resolve(&self, destination: &str) -> Result<Option<Arc<Tenant>>, PalaverError> {
        let number = normalize_phone(destination);
        if number.is_empty() {
            return Ok(None);
        }

        let now = Instant::now();
        if let Some(entry) = self.entries.get(&number) {
            if entry.expires_at > now {
                match &entry.tenant {
                    Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
                    None => self.negative_hits.fetch_add(1, Ordering::Relaxed),
                };
                return Ok(entry.tenant.clone());
            }
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let tenant = self
            .storage
            .find_tenant_by_number(&number)
            .await?
            .map(Arc::new);

        let ttl = if tenant.is_some() {
            self.hit_ttl
        } else {
            self.miss_ttl
        };
        let now = Instant::now();
        if !self.entries.contains_key(&number) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }
        self.entries.insert(
            number.clone(),
            CacheEntry {
                tenant: tenant.clone(),
                expires_at: now + ttl,
            },
        );
        debug!(number = %number, found = tenant.is_some(), "tenant cache filled");
        Ok(tenant)
    }

    /// Drops every entry for `tenant_id` and every cached miss, since a
    /// number newly assigned to the tenant may be negatively cached.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.entries.retain(|_, entry| match &entry.tenant {
            Some(tenant) => tenant.id != *tenant_id,
            None => false,
        });
        debug!(tenant_id = %tenant_id, "tenant cache invalidated");
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }

    fn make_room(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        while self.entries.len() >= self.max_entries {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());
            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
