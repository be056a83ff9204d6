use std::sync::Arc;

use ethereum_types::H256;

use crate::config::MinerConfig;
use crate::epoch::EpochParams;
use crate::error::Result;
use crate::search::{CancelToken, SearchOutcome, Searcher};
use crate::store::{DagStore, EpochStore};
use crate::verify::{verify_with, BlockView};

/// Verification and mining over one shared epoch store.
pub struct Ethash {
    store: Arc<dyn DagStore>,
    searcher: Searcher,
    config: MinerConfig,
}

impl Ethash {
    pub fn new(params: EpochParams) -> Result<Self> {
        Self::with_config(params, MinerConfig::default())
    }

    pub fn with_config(params: EpochParams, config: MinerConfig) -> Result<Self> {
        let store = match &config.dataset_dir {
            Some(dir) => EpochStore::with_dataset_dir(params, dir.clone())?,
            None => EpochStore::new(params)?,
        };
        Self::with_store(Arc::new(store), config)
    }

    /// Use a caller supplied store, e.g. one shared with other engines.
    pub fn with_store(store: Arc<dyn DagStore>, config: MinerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            searcher: Searcher::new(store.clone(), config.turbo),
            store,
            config,
        })
    }

    pub fn store(&self) -> &Arc<dyn DagStore> {
        &self.store
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Check the seal of `block`. See [`verify_with`].
    pub fn verify<B: BlockView + ?Sized>(&self, block: &B) -> Result<bool> {
        verify_with(&*self.store, block, self.config.force_full_mode)
    }

    pub fn search<B: BlockView + ?Sized>(
        &self,
        block: &B,
        cancel: &CancelToken,
        start: Option<u64>,
    ) -> Result<SearchOutcome> {
        self.searcher.search(block, cancel, start)
    }

    /// Race one searcher per configured thread.
    pub fn race<B: BlockView + Sync + ?Sized>(
        &self,
        block: &B,
        cancel: &CancelToken,
    ) -> Result<SearchOutcome> {
        self.searcher.race(block, self.config.threads, cancel)
    }

    pub fn turbo(&self, on: bool) {
        self.searcher.turbo(on);
    }

    pub fn hashrate(&self) -> f64 {
        self.searcher.hashrate()
    }

    /// Seed hash of the epoch containing block `number`.
    pub fn seed_hash(&self, number: u64) -> Result<H256> {
        self.store.params().get_seed_hash(number)
    }
}
