//! Single-flight, TTL-bounded cache of finished search reports.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

use crate::config::SearchMode;
use crate::entities::report::SearchReport;
use crate::error::PharmyrusError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    molecule: String,
    brand: Option<String>,
    jurisdictions: Vec<String>,
    mode: SearchMode,
}

impl CacheKey {
    pub fn new(
        molecule: &str,
        brand: Option<&str>,
        jurisdictions: &[String],
        mode: SearchMode,
    ) -> Self {
        let mut jurisdictions = jurisdictions.to_vec();
        jurisdictions.sort();
        jurisdictions.dedup();
        Self {
            molecule: molecule.trim().to_lowercase(),
            brand: brand
                .map(|b| b.trim().to_lowercase())
                .filter(|b| !b.is_empty()),
            jurisdictions,
            mode,
        }
    }
}

type Slot = Arc<OnceCell<Arc<SearchReport>>>;

struct Entry {
    created: Instant,
    slot: Slot,
}

pub(crate) struct SearchCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot_for(&self, key: &CacheKey) -> Slot {
        let mut entries = self.lock();
        let ttl = self.ttl;
        entries.retain(|_, entry| !entry.slot.initialized() || entry.created.elapsed() < ttl);
        entries
            .entry(key.clone())
            .or_insert_with(|| Entry {
                created: Instant::now(),
                slot: Arc::new(OnceCell::new()),
            })
            .slot
            .clone()
    }

    fn forget_failed(&self, key: &CacheKey, slot: &Slot) {
        let mut entries = self.lock();
        if entries
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.slot, slot) && !entry.slot.initialized())
        {
            entries.remove(key);
        }
    }

    /// Returns the cached report for `key`, or runs `compute` once for all
    /// concurrent callers of the same key. Errors are never cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<Arc<SearchReport>, PharmyrusError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SearchReport, PharmyrusError>>,
    {
        if self.ttl.is_zero() {
            return compute().await.map(Arc::new);
        }

        let slot = self.slot_for(&key);
        if slot.initialized() {
            debug!(molecule = %key.molecule, "search cache hit");
        }
        let result = slot
            .get_or_try_init(|| async { compute().await.map(Arc::new) })
            .await
            .cloned();
        if result.is_err() {
            self.forget_failed(&key, &slot);
        }
        result
    }
}
