//! Residency of epoch caches and datasets.
//!
//! At most [`MAX_RESIDENT`] epochs are kept. The lock only covers the
//! decision of which epochs are resident; building a cache or dataset happens
//! outside of it, in a per-epoch [`OnceCell`] so that concurrent callers for
//! the same epoch wait for a single build while other epochs stay reachable.
//! An evicted slot stays reachable while a caller still holds it, so a build
//! in flight is joined rather than started twice.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::dag::{FullDag, LightDag};
use crate::error::Result;
use crate::{EpochParams, SeedHasher};

/// The epoch in use and its neighbour.
pub const MAX_RESIDENT: usize = 2;

/// Source of per-epoch caches and datasets.
pub trait DagStore: Send + Sync {
    fn params(&self) -> &EpochParams;

    /// Light cache for `epoch`, built on first use.
    fn light(&self, epoch: u64) -> Result<Arc<LightDag>>;

    /// Full dataset for `epoch`, built on first use.
    fn full(&self, epoch: u64) -> Result<Arc<FullDag>>;

    /// Hint that `epoch` will be needed soon. Repeated hints for an epoch
    /// that is built or building are cheap. Stores that cannot build in the
    /// background ignore it.
    fn prewarm(&self, _epoch: u64, _full: bool) {}
}

#[derive(Debug)]
struct Slot {
    epoch: u64,
    light: OnceCell<Arc<LightDag>>,
    full: OnceCell<Arc<FullDag>>,
    prewarming: AtomicBool,
}

impl Slot {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            light: OnceCell::new(),
            full: OnceCell::new(),
            prewarming: AtomicBool::new(false),
        }
    }
}

#[derive(Debug)]
struct Resident {
    slot: Arc<Slot>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Slots {
    resident: Vec<Resident>,
    evicted: Vec<Weak<Slot>>,
    clock: u64,
}

impl Slots {
    fn get_or_insert(&mut self, epoch: u64) -> Arc<Slot> {
        self.clock += 1;
        let now = self.clock;
        if let Some(r) = self.resident.iter_mut().find(|r| r.slot.epoch == epoch) {
            r.last_used = now;
            log::trace!("epoch {epoch} is resident");
            return r.slot.clone();
        }

        let held = self.take_evicted(epoch);
        while self.resident.len() >= MAX_RESIDENT {
            let victim = self.victim(epoch);
            let evicted = self.resident.swap_remove(victim);
            log::debug!("evicting epoch {} to make room for epoch {epoch}", evicted.slot.epoch);
            self.evicted.push(Arc::downgrade(&evicted.slot));
        }
        let slot = held.unwrap_or_else(|| Arc::new(Slot::new(epoch)));
        self.resident.push(Resident {
            slot: slot.clone(),
            last_used: now,
        });
        slot
    }

    /// An evicted slot for `epoch` that some caller still holds.
    fn take_evicted(&mut self, epoch: u64) -> Option<Arc<Slot>> {
        self.evicted.retain(|w| w.strong_count() > 0);
        let i = self
            .evicted
            .iter()
            .position(|w| w.upgrade().map_or(false, |s| s.epoch == epoch))?;
        let slot = self.evicted.swap_remove(i).upgrade()?;
        log::trace!("epoch {epoch} revived from an evicted slot");
        Some(slot)
    }

    /// Least recently used slot, sparing a neighbour of `incoming`.
    fn victim(&self, incoming: u64) -> usize {
        self.resident
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| (r.slot.epoch.abs_diff(incoming) == 1, r.last_used))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Drop `slot` if its cache never got built.
    fn forget_unbuilt(&mut self, slot: &Arc<Slot>) {
        if slot.light.get().is_none() {
            self.resident.retain(|r| !Arc::ptr_eq(&r.slot, slot));
            self.evicted.retain(|w| !std::ptr::eq(w.as_ptr(), Arc::as_ptr(slot)));
        }
    }
}

#[derive(Debug)]
struct Inner {
    params: EpochParams,
    dataset_dir: Option<PathBuf>,
    seeds: SeedHasher,
    slots: Mutex<Slots>,
}

/// In-memory [`DagStore`]. Cloning is cheap and shares the resident epochs.
#[derive(Debug, Clone)]
pub struct EpochStore {
    inner: Arc<Inner>,
}

impl EpochStore {
    pub fn new(params: EpochParams) -> Result<Self> {
        Self::build(params, None)
    }

    /// Like [`EpochStore::new`], recording where datasets may be persisted.
    /// Datasets are still only kept in memory.
    pub fn with_dataset_dir(params: EpochParams, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        log::debug!("dataset directory {} recorded, datasets stay in memory", dir.display());
        Self::build(params, Some(dir))
    }

    fn build(params: EpochParams, dataset_dir: Option<PathBuf>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                params,
                dataset_dir,
                seeds: SeedHasher::new(),
                slots: Mutex::new(Slots::default()),
            }),
        })
    }

    pub fn dataset_dir(&self) -> Option<&Path> {
        self.inner.dataset_dir.as_deref()
    }

    /// Epochs currently holding a slot, in ascending order.
    pub fn resident_epochs(&self) -> Vec<u64> {
        let mut epochs: Vec<u64> = self
            .inner
            .slots
            .lock()
            .resident
            .iter()
            .map(|r| r.slot.epoch)
            .collect();
        epochs.sort_unstable();
        epochs
    }

    fn slot(&self, epoch: u64) -> Arc<Slot> {
        self.inner.slots.lock().get_or_insert(epoch)
    }

    fn init_light(&self, slot: &Arc<Slot>) -> Result<Arc<LightDag>> {
        let inner = &self.inner;
        let built = slot
            .light
            .get_or_try_init(|| {
                let seed = inner.seeds.seed(slot.epoch);
                LightDag::with_seed(slot.epoch, seed, &inner.params).map(Arc::new)
            })
            .cloned();
        if built.is_err() {
            inner.slots.lock().forget_unbuilt(slot);
        }
        built
    }

    fn init_full(&self, slot: &Arc<Slot>) -> Result<Arc<FullDag>> {
        let light = self.init_light(slot)?;
        slot.full
            .get_or_try_init(|| FullDag::new(light).map(Arc::new))
            .cloned()
    }
}

impl DagStore for EpochStore {
    fn params(&self) -> &EpochParams {
        &self.inner.params
    }

    fn light(&self, epoch: u64) -> Result<Arc<LightDag>> {
        let slot = self.slot(epoch);
        self.init_light(&slot)
    }

    fn full(&self, epoch: u64) -> Result<Arc<FullDag>> {
        let slot = self.slot(epoch);
        self.init_full(&slot)
    }

    fn prewarm(&self, epoch: u64, full: bool) {
        let slot = self.slot(epoch);
        let built = if full {
            slot.full.get().is_some()
        } else {
            slot.light.get().is_some()
        };
        if built || slot.prewarming.swap(true, Ordering::AcqRel) {
            return;
        }

        let store = self.clone();
        let worker = slot.clone();
        let spawned = thread::Builder::new()
            .name(format!("ethash-prewarm-{epoch}"))
            .spawn(move || {
                log::debug!("prewarming epoch {epoch}");
                let built = if full {
                    store.init_full(&worker).map(drop)
                } else {
                    store.init_light(&worker).map(drop)
                };
                if let Err(err) = built {
                    log::warn!("prewarming epoch {epoch} failed: {err}");
                }
                worker.prewarming.store(false, Ordering::Release);
            });
        if let Err(err) = spawned {
            slot.prewarming.store(false, Ordering::Release);
            log::warn!("could not spawn prewarm thread for epoch {epoch}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::time::{Duration, Instant};

    fn store() -> EpochStore {
        EpochStore::new(EpochParams::testing()).unwrap()
    }

    #[test]
    fn concurrent_requests_share_one_build() {
        let store = store();
        let dags: Vec<Arc<LightDag>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| store.light(3).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for dag in &dags[1..] {
            assert!(Arc::ptr_eq(&dags[0], dag));
        }
        assert_eq!(store.resident_epochs(), vec![3]);
    }

    #[test]
    fn full_reuses_the_resident_cache() {
        let store = store();
        let light = store.light(1).unwrap();
        let full = store.full(1).unwrap();
        assert!(Arc::ptr_eq(&light, full.light()));
        assert!(Arc::ptr_eq(&full, &store.full(1).unwrap()));
    }

    #[test]
    fn keeps_two_epochs_and_spares_the_neighbour() {
        let store = store();
        store.light(0).unwrap();
        store.light(1).unwrap();
        assert_eq!(store.resident_epochs(), vec![0, 1]);

        // Neither is adjacent to 5, the least recently used goes.
        store.light(5).unwrap();
        assert_eq!(store.resident_epochs(), vec![1, 5]);

        store.light(4).unwrap();
        assert_eq!(store.resident_epochs(), vec![4, 5]);

        // 5 is older than 4 but is the neighbour of 6.
        store.light(6).unwrap();
        assert_eq!(store.resident_epochs(), vec![5, 6]);
    }

    #[test]
    fn evicted_entries_stay_usable_by_holders() {
        let store = store();
        let held = store.light(0).unwrap();
        store.light(7).unwrap();
        store.light(9).unwrap();
        assert!(!store.resident_epochs().contains(&0));
        assert_eq!(held.epoch(), 0);
        let rebuilt = store.light(0).unwrap();
        assert!(!Arc::ptr_eq(&held, &rebuilt));
        assert_eq!(held.cache(), rebuilt.cache());
    }

    #[test]
    fn evicted_slot_in_use_is_joined_not_rebuilt() {
        let store = store();
        // A caller in the middle of building epoch 5 holds its slot.
        let building = store.slot(5);
        store.light(7).unwrap();
        store.light(9).unwrap();
        assert_eq!(store.resident_epochs(), vec![7, 9]);

        let again = store.slot(5);
        assert!(Arc::ptr_eq(&building, &again));
        assert_eq!(store.resident_epochs(), vec![5, 9]);

        let ours = store.init_light(&building).unwrap();
        assert!(Arc::ptr_eq(&ours, &store.light(5).unwrap()));
    }

    #[test]
    fn concurrent_build_survives_eviction() {
        let params = EpochParams {
            cache_init: 4 << 20,
            ..EpochParams::testing()
        };
        let store = EpochStore::new(params).unwrap();
        let slot = store.slot(5);
        let dags = thread::scope(|s| {
            let first = s.spawn(|| store.init_light(&slot).unwrap());
            store.light(7).unwrap();
            store.light(9).unwrap();
            let second = store.light(5).unwrap();
            (first.join().unwrap(), second)
        });
        assert!(Arc::ptr_eq(&dags.0, &dags.1));
    }

    #[test]
    fn prewarm_is_repeated_after_eviction() {
        let store = store();
        store.prewarm(1, false);
        store.light(1).unwrap();
        store.light(7).unwrap();
        store.light(9).unwrap();
        assert!(!store.resident_epochs().contains(&1));

        store.prewarm(1, false);
        assert!(store.resident_epochs().contains(&1));
        let deadline = Instant::now() + Duration::from_secs(30);
        while store.slot(1).light.get().is_none() {
            assert!(Instant::now() < deadline, "second prewarm never finished");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn failed_build_is_not_left_resident() {
        let params = EpochParams {
            cache_init: 1 << 62,
            ..EpochParams::testing()
        };
        let store = EpochStore::new(params).unwrap();
        let err = store.light(0).unwrap_err();
        assert!(matches!(err, Error::Allocation { what: "cache", .. }));
        assert!(store.resident_epochs().is_empty());
    }

    #[test]
    fn prewarm_builds_in_the_background() {
        let store = store();
        store.prewarm(2, true);
        let deadline = Instant::now() + Duration::from_secs(30);
        while store.resident_epochs() != vec![2] {
            assert!(Instant::now() < deadline, "prewarm never started");
            thread::sleep(Duration::from_millis(5));
        }
        // Either joins the running build or returns the finished one.
        let full = store.full(2).unwrap();
        assert_eq!(full.epoch(), 2);
    }

    #[test]
    fn dataset_dir_is_recorded() {
        let with_dir = EpochStore::with_dataset_dir(EpochParams::testing(), "/tmp/ethash").unwrap();
        assert_eq!(with_dir.dataset_dir(), Some(Path::new("/tmp/ethash")));
        assert_eq!(store().dataset_dir(), None);
    }

    #[test]
    fn rejects_invalid_params() {
        let params = EpochParams {
            dataset_init: 100,
            ..EpochParams::testing()
        };
        assert!(matches!(EpochStore::new(params), Err(Error::InvalidConfig(_))));
    }
}
