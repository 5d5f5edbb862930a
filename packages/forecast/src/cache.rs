//! In-process cache of fitted models.
//!
//! A model depends only on the municipality's series and the engine
//! configuration, so it is keyed by municipality plus a digest of the
//! series records. When the table changes the digest changes, and inserting
//! the new snapshot evicts the municipality's older ones.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use dengue_watch_series::Series;
use sha2::{Digest, Sha256};

use crate::training::FitOutcome;

/// Identifies one fitted model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    /// IBGE municipality code.
    pub municipality_id: String,
    /// Hex SHA-256 of the series records.
    pub snapshot: String,
}

impl CacheKey {
    /// Builds the key of a loaded series.
    #[must_use]
    pub fn for_series(series: &Series) -> Self {
        Self {
            municipality_id: series.municipality().code.clone(),
            snapshot: snapshot_digest(series),
        }
    }
}

/// SHA-256 over every record field, in chronological order.
#[must_use]
pub fn snapshot_digest(series: &Series) -> String {
    let mut hasher = Sha256::new();
    for record in series.records() {
        hasher.update(record.municipality_id.as_bytes());
        hasher.update(record.year.to_le_bytes());
        hasher.update(record.month.to_le_bytes());
        hasher.update(record.case_count.to_le_bytes());
        for reading in [record.rainfall_mm, record.avg_temperature_c, record.avg_humidity_pct] {
            match reading {
                Some(value) => {
                    hasher.update([1_u8]);
                    hasher.update(value.to_bits().to_le_bytes());
                }
                None => hasher.update([0_u8]),
            }
        }
        hasher.update(record.estimated_population.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

type Slot = Arc<Mutex<Option<Arc<FitOutcome>>>>;

/// Thread-safe map from [`CacheKey`] to fitted model.
///
/// Each key owns its own slot mutex: the first caller for a key fits the
/// model while holding it, and concurrent callers for the same key block
/// on the slot and then reuse the result. Different keys never wait on
/// each other's training.
#[derive(Debug, Default)]
pub struct ModelCache {
    slots: Mutex<BTreeMap<CacheKey, Slot>>,
}

impl ModelCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached model for `key`, fitting and storing it with
    /// `fit` on a miss.
    #[must_use]
    pub fn get_or_fit(&self, key: CacheKey, fit: impl FnOnce() -> FitOutcome) -> Arc<FitOutcome> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if !slots.contains_key(&key) {
                let before = slots.len();
                slots.retain(|cached, _| cached.municipality_id != key.municipality_id);
                if slots.len() < before {
                    log::debug!("Evicted stale model(s) for {}", key.municipality_id);
                }
            }
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outcome) = entry.as_ref() {
            log::debug!("Model cache hit for {}", key.municipality_id);
            return Arc::clone(outcome);
        }

        log::debug!("Model cache miss for {}", key.municipality_id);
        let outcome = Arc::new(fit());
        *entry = Some(Arc::clone(&outcome));
        outcome
    }

    /// Number of keys with a slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached model.
    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{contiguous_series, record, series_of};
    use crate::training::persistence_baseline;
    use dengue_watch_series_models::YearMonth;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn series(cases: &[u64]) -> Series {
        contiguous_series(YearMonth::new(2024, 1).unwrap(), cases)
    }

    #[test]
    fn digest_changes_with_any_field() {
        let base = snapshot_digest(&series(&[1, 2, 3]));
        assert_eq!(base, snapshot_digest(&series(&[1, 2, 3])));
        assert_eq!(base.len(), 64);
        assert_ne!(base, snapshot_digest(&series(&[1, 2, 4])));

        let mut records = vec![record(2024, 1, 1), record(2024, 2, 2), record(2024, 3, 3)];
        assert_eq!(base, snapshot_digest(&series_of(records.clone())));
        records[1].rainfall_mm = None;
        assert_ne!(base, snapshot_digest(&series_of(records)));
    }

    #[test]
    fn fits_once_per_key() {
        let cache = ModelCache::new();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::for_series(&series(&[5, 6, 7]));

        for _ in 0..3 {
            let outcome = cache.get_or_fit(key.clone(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                persistence_baseline(&[5, 6, 7])
            });
            assert_eq!(outcome.n_examples, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        let other = CacheKey::for_series(&series(&[5, 6, 8]));
        let _outcome = cache.get_or_fit(other, || {
            calls.fetch_add(1, Ordering::SeqCst);
            persistence_baseline(&[5, 6, 8])
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn new_snapshot_evicts_only_its_own_municipality() {
        let cache = ModelCache::new();
        let old = CacheKey::for_series(&series(&[5, 6, 7]));
        let other_municipality = CacheKey {
            municipality_id: "3550308".to_string(),
            snapshot: old.snapshot.clone(),
        };
        let _outcome = cache.get_or_fit(old.clone(), || persistence_baseline(&[5, 6, 7]));
        let _outcome = cache.get_or_fit(other_municipality, || persistence_baseline(&[1]));
        assert_eq!(cache.len(), 2);

        let updated = CacheKey::for_series(&series(&[5, 6, 7, 9]));
        let _outcome = cache.get_or_fit(updated, || persistence_baseline(&[6, 7, 9]));
        assert_eq!(cache.len(), 2);

        let refits = AtomicUsize::new(0);
        let _outcome = cache.get_or_fit(old, || {
            refits.fetch_add(1, Ordering::SeqCst);
            persistence_baseline(&[5, 6, 7])
        });
        assert_eq!(refits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_callers_share_one_fit() {
        let cache = ModelCache::new();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::for_series(&series(&[1, 1, 1]));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    cache.get_or_fit(key.clone(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        persistence_baseline(&[1, 1, 1])
                    })
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
