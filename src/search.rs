//! Nonce search over a materialized dataset.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ethereum_types::{H256, U256, U512};
use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::store::DagStore;
use crate::verify::{difficulty_to_target, BlockView};

/// Pause after every attempt when not in turbo mode.
const THROTTLE: Duration = Duration::from_micros(20);

/// How close to the end of an epoch the next epoch's dataset is prewarmed.
const PREWARM_DISTANCE: u64 = 1_000;

/// Shared stop signal for one or more searches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub nonce: u64,
    pub mix_digest: H256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(SearchResult),
    Cancelled,
}

impl SearchOutcome {
    pub fn found(self) -> Option<SearchResult> {
        match self {
            SearchOutcome::Found(result) => Some(result),
            SearchOutcome::Cancelled => None,
        }
    }
}

/// Mines nonces for blocks against the full dataset of their epoch.
pub struct Searcher {
    store: Arc<dyn DagStore>,
    turbo: AtomicBool,
    hashes: AtomicU64,
    started: Instant,
}

impl Searcher {
    pub fn new(store: Arc<dyn DagStore>, turbo: bool) -> Self {
        Self {
            store,
            turbo: AtomicBool::new(turbo),
            hashes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn turbo(&self, on: bool) {
        self.turbo.store(on, Ordering::Relaxed);
    }

    pub fn is_turbo(&self) -> bool {
        self.turbo.load(Ordering::Relaxed)
    }

    /// Nonces tried since creation.
    pub fn hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    /// Average hashes per second since creation.
    pub fn hashrate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.hashes() as f64 / secs
    }

    /// Search nonces upward from `start`, or from a random nonce when `start`
    /// is `None`, until one meets the block's difficulty or `cancel` fires.
    ///
    /// `cancel` is checked before every attempt.
    pub fn search<B>(
        &self,
        block: &B,
        cancel: &CancelToken,
        start: Option<u64>,
    ) -> Result<SearchOutcome>
    where
        B: BlockView + ?Sized,
    {
        let target = difficulty_to_target(block.difficulty())
            .ok_or_else(|| Error::InvalidInput("cannot search with zero difficulty".into()))?;
        let params = *self.store.params();
        let number = block.number();
        let epoch = params.checked_epoch(number)?;
        if cancel.is_cancelled() {
            return Ok(SearchOutcome::Cancelled);
        }
        let dag = self.store.full(epoch)?;
        self.maybe_prewarm(number, epoch);

        let hash = block.hash_no_nonce();
        let mut nonce = start.unwrap_or_else(rand::random);
        log::debug!("searching block {number} (epoch {epoch}) from nonce {nonce:#x}");

        loop {
            if cancel.is_cancelled() {
                log::debug!("search for block {number} cancelled at nonce {nonce:#x}");
                return Ok(SearchOutcome::Cancelled);
            }

            let (mix_digest, result) = dag.hashimoto(hash, nonce);
            self.hashes.fetch_add(1, Ordering::Relaxed);
            if U512::from(U256::from_big_endian(result.as_bytes())) <= target {
                log::debug!("found nonce {nonce:#x} for block {number}");
                return Ok(SearchOutcome::Found(SearchResult { nonce, mix_digest }));
            }

            nonce = nonce.wrapping_add(1);
            if nonce == 0 {
                log::warn!("nonce counter wrapped for block {number}");
            }
            if !self.is_turbo() {
                thread::sleep(THROTTLE);
            }
        }
    }

    /// Run `workers` searches from random nonces; the first result wins and
    /// cancels the others through `cancel`. Returns
    /// [`SearchOutcome::Cancelled`] when `cancel` fires before any worker
    /// finds a nonce.
    pub fn race<B>(
        &self,
        block: &B,
        workers: usize,
        cancel: &CancelToken,
    ) -> Result<SearchOutcome>
    where
        B: BlockView + Sync + ?Sized,
    {
        let winner: OnceCell<SearchResult> = OnceCell::new();
        let failure: OnceCell<Error> = OnceCell::new();

        thread::scope(|s| {
            for _ in 0..workers.max(1) {
                s.spawn(|| match self.search(block, cancel, None) {
                    Ok(SearchOutcome::Found(found)) => {
                        // Later finders lose.
                        let _ = winner.set(found);
                        cancel.cancel();
                    }
                    Ok(SearchOutcome::Cancelled) => {}
                    Err(err) => {
                        let _ = failure.set(err);
                        cancel.cancel();
                    }
                });
            }
        });

        match (winner.into_inner(), failure.into_inner()) {
            (Some(found), _) => Ok(SearchOutcome::Found(found)),
            (None, Some(err)) => Err(err),
            (None, None) => Ok(SearchOutcome::Cancelled),
        }
    }

    /// Ask for the next epoch's dataset on every search near the boundary.
    /// The store ignores the hint while it is built or building.
    fn maybe_prewarm(&self, number: u64, epoch: u64) {
        let params = self.store.params();
        let next = epoch + 1;
        let remaining = params.epoch_length - number % params.epoch_length;
        if remaining > PREWARM_DISTANCE || next >= params.max_epoch {
            return;
        }
        self.store.prewarm(next, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{verify_with, Block};
    use crate::dag::{FullDag, LightDag};
    use crate::{EpochParams, EpochStore};
    use std::sync::atomic::AtomicUsize;

    /// Counts dataset lookups on top of a real store.
    struct Counting {
        inner: EpochStore,
        full_calls: AtomicUsize,
    }

    impl DagStore for Counting {
        fn params(&self) -> &EpochParams {
            self.inner.params()
        }

        fn light(&self, epoch: u64) -> Result<Arc<LightDag>> {
            self.inner.light(epoch)
        }

        fn full(&self, epoch: u64) -> Result<Arc<FullDag>> {
            self.full_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.full(epoch)
        }
    }

    fn searcher() -> (Arc<EpochStore>, Searcher) {
        let store = Arc::new(EpochStore::new(EpochParams::testing()).unwrap());
        let searcher = Searcher::new(store.clone(), true);
        (store, searcher)
    }

    fn block(difficulty: u64) -> Block {
        Block {
            difficulty: difficulty.into(),
            hash_no_nonce: H256::repeat_byte(0x42),
            number: 12,
            ..Block::default()
        }
    }

    #[test]
    fn found_nonce_verifies() {
        let (store, searcher) = searcher();
        let mut block = block(64);
        let found = searcher
            .search(&block, &CancelToken::new(), Some(0))
            .unwrap()
            .found()
            .unwrap();
        block.nonce = found.nonce;
        block.mix_digest = found.mix_digest;
        assert_eq!(verify_with(&*store, &block, false), Ok(true));
        assert!(searcher.hashes() >= 1);
    }

    #[test]
    fn explicit_start_is_deterministic() {
        let (_, searcher) = searcher();
        let block = block(16);
        let cancel = CancelToken::new();
        let a = searcher.search(&block, &cancel, Some(1000)).unwrap();
        let b = searcher.search(&block, &cancel, Some(1000)).unwrap();
        assert_eq!(a, b);
        assert!(a.found().unwrap().nonce >= 1000);
    }

    #[test]
    fn cancelled_before_start() {
        let (_, searcher) = searcher();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = searcher.search(&block(1), &cancel, None).unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled);
        assert_eq!(searcher.hashes(), 0);
    }

    #[test]
    fn cancelled_search_never_builds_the_dataset() {
        let store = Arc::new(Counting {
            inner: EpochStore::new(EpochParams::testing()).unwrap(),
            full_calls: AtomicUsize::new(0),
        });
        let searcher = Searcher::new(store.clone(), true);
        let cancel = CancelToken::new();
        cancel.cancel();
        let block = Block {
            number: 3 * 30_000 + 29_999,
            ..block(1)
        };
        let outcome = searcher.search(&block, &cancel, None).unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled);
        assert_eq!(store.full_calls.load(Ordering::SeqCst), 0);
        assert!(store.inner.resident_epochs().is_empty());
    }

    #[test]
    fn cancel_stops_a_hopeless_search() {
        let (_, searcher) = searcher();
        searcher.turbo(false);
        let block = Block {
            difficulty: U256::max_value(),
            ..block(1)
        };
        let cancel = CancelToken::new();
        let outcome = thread::scope(|s| {
            let handle = s.spawn(|| searcher.search(&block, &cancel, None));
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
            handle.join().unwrap()
        });
        assert_eq!(outcome, Ok(SearchOutcome::Cancelled));
    }

    #[test]
    fn zero_difficulty_is_invalid_input() {
        let (_, searcher) = searcher();
        let err = searcher.search(&block(0), &CancelToken::new(), None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn race_returns_a_verifiable_winner() {
        let (store, searcher) = searcher();
        let mut block = block(500);
        let cancel = CancelToken::new();
        let found = searcher.race(&block, 4, &cancel).unwrap().found().unwrap();
        assert!(cancel.is_cancelled());
        block.nonce = found.nonce;
        block.mix_digest = found.mix_digest;
        assert_eq!(verify_with(&*store, &block, false), Ok(true));
    }

    #[test]
    fn race_cancelled_from_outside() {
        let (_, searcher) = searcher();
        let block = Block {
            difficulty: U256::max_value(),
            ..block(1)
        };
        let cancel = CancelToken::new();
        let outcome = thread::scope(|s| {
            let handle = s.spawn(|| searcher.race(&block, 3, &cancel));
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
            handle.join().unwrap()
        });
        assert_eq!(outcome, Ok(SearchOutcome::Cancelled));
    }

    #[test]
    fn hashrate_counts_attempts() {
        let (_, searcher) = searcher();
        searcher
            .search(&block(8), &CancelToken::new(), Some(0))
            .unwrap();
        assert!(searcher.hashrate() > 0.0);
    }

    #[test]
    fn prewarms_the_next_epoch_near_the_boundary() {
        let (store, searcher) = searcher();
        let block = Block {
            number: 29_999,
            ..block(1)
        };
        searcher.search(&block, &CancelToken::new(), Some(0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(30);
        while !store.resident_epochs().contains(&1) {
            assert!(Instant::now() < deadline, "next epoch never prewarmed");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(store.resident_epochs().contains(&0));
    }

    #[test]
    fn prewarm_is_requested_again_after_eviction() {
        let (store, searcher) = searcher();
        let block = Block {
            number: 29_999,
            ..block(1)
        };
        let wait_for_next = || {
            let deadline = Instant::now() + Duration::from_secs(30);
            while !store.resident_epochs().contains(&1) {
                assert!(Instant::now() < deadline, "next epoch never prewarmed");
                thread::sleep(Duration::from_millis(5));
            }
        };
        searcher.search(&block, &CancelToken::new(), Some(0)).unwrap();
        wait_for_next();

        // Verifying old blocks pushes the prewarmed epoch out.
        store.light(7).unwrap();
        store.light(9).unwrap();
        store.light(7).unwrap();
        store.light(9).unwrap();

        searcher.search(&block, &CancelToken::new(), Some(0)).unwrap();
        wait_for_next();
    }
}
