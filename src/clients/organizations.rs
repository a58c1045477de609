//! Known organizations
//!
//! Derived from the origin store's application listing. Loaded once and
//! shared; reloaded on request or when a caller needs a newer snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::origin::OriginStore;
use crate::types::Result;

/// Organizations known at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationSnapshot {
    pub orgs: BTreeSet<String>,
    pub loaded_at: DateTime<Utc>,
}

impl OrganizationSnapshot {
    pub fn new(orgs: impl IntoIterator<Item = String>, loaded_at: DateTime<Utc>) -> Self {
        Self {
            orgs: orgs.into_iter().collect(),
            loaded_at,
        }
    }

    pub fn contains(&self, org: &str) -> bool {
        self.orgs.contains(org)
    }
}

pub struct OrganizationCache {
    origin: Arc<dyn OriginStore>,
    snapshot: RwLock<Option<Arc<OrganizationSnapshot>>>,
    /// Serializes loads so concurrent callers share one origin round trip
    loading: Mutex<()>,
}

impl OrganizationCache {
    pub fn new(origin: Arc<dyn OriginStore>) -> Self {
        Self {
            origin,
            snapshot: RwLock::new(None),
            loading: Mutex::new(()),
        }
    }

    /// Cache seeded with an already loaded snapshot
    pub fn with_snapshot(origin: Arc<dyn OriginStore>, snapshot: OrganizationSnapshot) -> Self {
        Self {
            origin,
            snapshot: RwLock::new(Some(Arc::new(snapshot))),
            loading: Mutex::new(()),
        }
    }

    /// Current snapshot, loading it on first use
    pub async fn get(&self) -> Result<Arc<OrganizationSnapshot>> {
        // Fast path
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let _guard = self.loading.lock().await;

        // Double-check after acquiring lock
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        self.load().await
    }

    /// Reload from the origin store
    pub async fn refresh(&self) -> Result<Arc<OrganizationSnapshot>> {
        let _guard = self.loading.lock().await;
        self.load().await
    }

    /// Snapshot loaded on or after `day`, reloading when the cached one is older
    pub async fn covering(&self, day: NaiveDate) -> Result<Arc<OrganizationSnapshot>> {
        let snapshot = self.get().await?;
        if snapshot.loaded_at.date_naive() >= day {
            return Ok(snapshot);
        }
        info!(loaded_at = %snapshot.loaded_at, %day, "Organization snapshot predates requested day");
        self.refresh().await
    }

    async fn load(&self) -> Result<Arc<OrganizationSnapshot>> {
        let apps = self.origin.list_applications().await?;
        let snapshot = Arc::new(OrganizationSnapshot::new(
            apps.into_iter().map(|a| a.org),
            Utc::now(),
        ));
        info!(count = snapshot.orgs.len(), "Loaded organizations");

        *self.snapshot.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::{sample_application, InMemoryOriginStore};

    #[tokio::test]
    async fn test_loaded_once() {
        let origin = Arc::new(InMemoryOriginStore::new());
        origin.add_application(sample_application("acme", "tax-form"));
        origin.add_application(sample_application("acme", "grant"));
        origin.add_application(sample_application("beta", "permit"));

        let cache = OrganizationCache::new(origin.clone());
        let first = cache.get().await.unwrap();
        assert_eq!(
            first.orgs.iter().cloned().collect::<Vec<_>>(),
            vec!["acme".to_string(), "beta".to_string()]
        );

        origin.add_application(sample_application("gamma", "x"));
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let refreshed = cache.refresh().await.unwrap();
        assert!(refreshed.contains("gamma"));
    }

    #[tokio::test]
    async fn test_stale_snapshot_reloaded_for_later_day() {
        let origin = Arc::new(InMemoryOriginStore::new());
        origin.add_application(sample_application("acme", "tax-form"));
        origin.add_application(sample_application("beta", "permit"));

        let loaded_at = Utc::now() - chrono::Duration::days(3);
        let cache = OrganizationCache::with_snapshot(
            origin.clone(),
            OrganizationSnapshot::new(["acme".to_string()], loaded_at),
        );

        // Old enough for a day it already covers
        let same = cache.covering(loaded_at.date_naive()).await.unwrap();
        assert!(!same.contains("beta"));

        let fresh = cache.covering(Utc::now().date_naive()).await.unwrap();
        assert!(fresh.contains("beta"));
        assert!(fresh.loaded_at > loaded_at);
        assert!(Arc::ptr_eq(&fresh, &cache.get().await.unwrap()));
    }
}
