use std::sync::Arc;
use std::time::Instant;

use ethereum_types::H256;

use crate::error::Result;
use crate::EpochParams;

/// One epoch's light cache. Enough for verification.
#[derive(Debug)]
pub struct LightDag {
    epoch: u64,
    epoch_length: u64,
    seed: H256,
    cache: Vec<u8>,
    cache_size: usize,
    full_size: usize,
}

impl LightDag {
    pub fn new(epoch: u64, params: &EpochParams) -> Result<Self> {
        Self::with_seed(epoch, crate::get_seedhash(epoch), params)
    }

    /// Build from an already derived `seed`, which must be the seed of `epoch`.
    pub fn with_seed(epoch: u64, seed: H256, params: &EpochParams) -> Result<Self> {
        let cache_size = params.cache_size(epoch);
        let full_size = params.full_size(epoch);

        log::info!("generating cache for epoch {epoch} ({cache_size} bytes)");
        let started = Instant::now();
        let cache = crate::build_cache(seed, cache_size)?;
        log::info!("cache for epoch {epoch} ready in {:?}", started.elapsed());

        Ok(Self {
            epoch,
            epoch_length: params.epoch_length,
            seed,
            cache,
            cache_size,
            full_size,
        })
    }

    pub fn hashimoto(&self, hash: H256, nonce: u64) -> (H256, H256) {
        crate::hashimoto_light(hash, nonce, self.full_size, &self.cache)
    }

    pub fn is_valid_for(&self, number: u64) -> bool {
        number / self.epoch_length == self.epoch
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn seed(&self) -> H256 {
        self.seed
    }

    pub fn cache(&self) -> &[u8] {
        &self.cache
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn full_size(&self) -> usize {
        self.full_size
    }
}

/// One epoch's materialized dataset, used for mining.
#[derive(Debug)]
pub struct FullDag {
    light: Arc<LightDag>,
    dataset: Vec<u8>,
}

impl FullDag {
    pub fn new(light: Arc<LightDag>) -> Result<Self> {
        let epoch = light.epoch;
        log::info!(
            "generating dataset for epoch {epoch} ({} bytes, {} threads)",
            light.full_size,
            rayon::current_num_threads()
        );
        let started = Instant::now();
        let dataset = crate::build_dataset(&light.cache, light.full_size)?;
        log::info!("dataset for epoch {epoch} ready in {:?}", started.elapsed());
        Ok(Self { light, dataset })
    }

    pub fn hashimoto(&self, hash: H256, nonce: u64) -> (H256, H256) {
        crate::hashimoto_full(hash, nonce, self.light.full_size, &self.dataset)
    }

    pub fn is_valid_for(&self, number: u64) -> bool {
        self.light.is_valid_for(number)
    }

    pub fn light(&self) -> &Arc<LightDag> {
        &self.light
    }

    pub fn dataset(&self) -> &[u8] {
        &self.dataset
    }

    pub fn epoch(&self) -> u64 {
        self.light.epoch
    }
}
