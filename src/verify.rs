//! Seal verification against a difficulty.

use ethereum_types::{H256, U256, U512};

use crate::error::Result;
use crate::store::DagStore;

/// The fields of a block the engine needs.
pub trait BlockView {
    fn difficulty(&self) -> U256;
    fn hash_no_nonce(&self) -> H256;
    fn nonce(&self) -> u64;
    fn mix_digest(&self) -> H256;
    fn number(&self) -> u64;
}

/// Plain [`BlockView`] for callers that do not have a block type of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    pub difficulty: U256,
    pub hash_no_nonce: H256,
    pub nonce: u64,
    pub mix_digest: H256,
    pub number: u64,
}

impl BlockView for Block {
    fn difficulty(&self) -> U256 {
        self.difficulty
    }

    fn hash_no_nonce(&self) -> H256 {
        self.hash_no_nonce
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn mix_digest(&self) -> H256 {
        self.mix_digest
    }

    fn number(&self) -> u64 {
        self.number
    }
}

/// `2^256 / difficulty`, or `None` when the difficulty is zero.
pub fn difficulty_to_target(difficulty: U256) -> Option<U512> {
    if difficulty.is_zero() {
        return None;
    }
    Some((U512::one() << 256) / U512::from(difficulty))
}

/// Whether `result`, read as a big endian integer, is within the target of
/// `difficulty`.
pub fn meets_target(result: H256, difficulty: U256) -> bool {
    match difficulty_to_target(difficulty) {
        Some(target) => U512::from(U256::from_big_endian(result.as_bytes())) <= target,
        None => false,
    }
}

/// Check the seal of `block`.
///
/// Blocks that simply do not verify give `Ok(false)`. An error means the
/// epoch's cache or dataset could not be built. With `full` set the dataset
/// is materialized and read directly instead of recomputing items from the
/// cache.
pub fn verify_with<S, B>(store: &S, block: &B, full: bool) -> Result<bool>
where
    S: DagStore + ?Sized,
    B: BlockView + ?Sized,
{
    let difficulty = block.difficulty();
    if difficulty.is_zero() {
        log::debug!("block {} has zero difficulty", block.number());
        return Ok(false);
    }
    let epoch = match store.params().checked_epoch(block.number()) {
        Ok(epoch) => epoch,
        Err(err) => {
            log::debug!("{err}");
            return Ok(false);
        }
    };

    let hash = block.hash_no_nonce();
    let nonce = block.nonce();
    let claimed = block.mix_digest();
    // Cheap rejection before touching the cache.
    if !meets_target(crate::quick_hash(hash, nonce, claimed), difficulty) {
        return Ok(false);
    }

    let (mix_digest, result) = if full {
        store.full(epoch)?.hashimoto(hash, nonce)
    } else {
        store.light(epoch)?.hashimoto(hash, nonce)
    };
    Ok(mix_digest == claimed && meets_target(result, difficulty))
}
