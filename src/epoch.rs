//! Block number to epoch mapping and the per-epoch size table.

use ethereum_types::H256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::miller_rabin::is_prime;
use crate::{
    CACHE_BYTES_GROWTH, CACHE_BYTES_INIT, DATASET_BYTES_GROWTH, DATASET_BYTES_INIT, EPOCH_LENGTH,
    HASH_BYTES, MAX_EPOCH, MIX_BYTES,
};

/// Sizing table for caches and datasets.
///
/// [`EpochParams::default`] is the Ethereum table. Smaller tables only
/// change how much memory an epoch takes; every algorithm step stays the
/// same, which keeps the full dataset cheap to materialize in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochParams {
    pub epoch_length: u64,
    /// Epochs at or past this one are not supported; sizes stop growing
    /// before it.
    pub max_epoch: u64,
    pub cache_init: usize,
    pub cache_growth: usize,
    pub dataset_init: usize,
    pub dataset_growth: usize,
}

impl Default for EpochParams {
    fn default() -> Self {
        Self {
            epoch_length: EPOCH_LENGTH,
            max_epoch: MAX_EPOCH,
            cache_init: CACHE_BYTES_INIT,
            cache_growth: CACHE_BYTES_GROWTH,
            dataset_init: DATASET_BYTES_INIT,
            dataset_growth: DATASET_BYTES_GROWTH,
        }
    }
}

impl EpochParams {
    /// A table with a 16 KiB cache and a 256 KiB dataset at epoch 0.
    pub fn testing() -> Self {
        Self {
            cache_init: 16 * 1024,
            cache_growth: 1024,
            dataset_init: 256 * 1024,
            dataset_growth: 8 * 1024,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epoch_length == 0 {
            return Err(Error::InvalidConfig("epoch_length must be > 0".into()));
        }
        if self.max_epoch == 0 {
            return Err(Error::InvalidConfig("max_epoch must be > 0".into()));
        }
        if self.cache_init < 4 * HASH_BYTES
            || self.cache_init % HASH_BYTES != 0
            || self.cache_growth % HASH_BYTES != 0
        {
            return Err(Error::InvalidConfig(format!(
                "cache sizes must be multiples of {HASH_BYTES} bytes, at least {}",
                4 * HASH_BYTES
            )));
        }
        if self.dataset_init < 4 * MIX_BYTES
            || self.dataset_init % MIX_BYTES != 0
            || self.dataset_growth % MIX_BYTES != 0
        {
            return Err(Error::InvalidConfig(format!(
                "dataset sizes must be multiples of {MIX_BYTES} bytes, at least {}",
                4 * MIX_BYTES
            )));
        }
        let last = self.max_epoch - 1;
        if largest(self.cache_init, self.cache_growth, last).is_none()
            || largest(self.dataset_init, self.dataset_growth, last).is_none()
        {
            return Err(Error::InvalidConfig(format!("sizes overflow before epoch {last}")));
        }
        Ok(())
    }

    pub fn epoch(&self, number: u64) -> u64 {
        number / self.epoch_length
    }

    /// Epoch of `number`, or an error when it lies past `max_epoch`.
    pub fn checked_epoch(&self, number: u64) -> Result<u64> {
        let epoch = self.epoch(number);
        if epoch >= self.max_epoch {
            return Err(Error::InvalidInput(format!(
                "block number {number} too high, limit is {}",
                self.epoch_length.saturating_mul(self.max_epoch)
            )));
        }
        Ok(epoch)
    }

    pub fn cache_size(&self, epoch: u64) -> usize {
        let epoch = epoch.min(self.max_epoch - 1) as usize;
        let mut sz = self
            .cache_init
            .saturating_add(self.cache_growth.saturating_mul(epoch));
        sz -= HASH_BYTES;
        while !is_prime((sz / HASH_BYTES) as u64) {
            sz -= 2 * HASH_BYTES;
        }
        sz
    }

    pub fn full_size(&self, epoch: u64) -> usize {
        let epoch = epoch.min(self.max_epoch - 1) as usize;
        let mut sz = self
            .dataset_init
            .saturating_add(self.dataset_growth.saturating_mul(epoch));
        sz -= MIX_BYTES;
        while !is_prime((sz / MIX_BYTES) as u64) {
            sz -= 2 * MIX_BYTES;
        }
        sz
    }

    pub fn get_seed_hash(&self, number: u64) -> Result<H256> {
        let epoch = self.checked_epoch(number)?;
        Ok(crate::get_seedhash(epoch))
    }
}

/// `init + growth * epoch`, if it fits.
fn largest(init: usize, growth: usize, epoch: u64) -> Option<usize> {
    let epoch = usize::try_from(epoch).ok()?;
    growth.checked_mul(epoch)?.checked_add(init)
}

pub fn get_cache_size(epoch: u64) -> usize {
    EpochParams::default().cache_size(epoch)
}

pub fn get_full_size(epoch: u64) -> usize {
    EpochParams::default().full_size(epoch)
}

/// Seed hash of the epoch containing `number` on the Ethereum table.
pub fn get_seed_hash(number: u64) -> Result<H256> {
    EpochParams::default().get_seed_hash(number)
}
