//! Apache-2 licensed Ethash proof-of-work engine.
//!
//! The engine derives a per-epoch seed, grows the light cache and the full
//! dataset (DAG) from it, keeps at most two epochs resident, and runs the
//! hashimoto mix for verification (light mode) and mining (full mode).

// The reference algorithm used is from https://github.com/ethereum/wiki/wiki/Ethash

use byteorder::{ByteOrder, LittleEndian};
use sha3::{Digest, Keccak256, Keccak512};

mod miller_rabin;

pub mod cache;
pub mod config;
pub mod dag;
pub mod dataset;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod hashimoto;
pub mod search;
pub mod seed;
pub mod store;
pub mod verify;

pub use cache::{build_cache, make_cache};
pub use config::{MinerConfig, MinerConfigBuilder};
pub use dag::{FullDag, LightDag};
pub use dataset::{build_dataset, calc_dataset_item, make_dataset};
pub use engine::Ethash;
pub use epoch::{get_cache_size, get_full_size, get_seed_hash, EpochParams};
pub use error::{Error, Result};
pub use hashimoto::{hashimoto, hashimoto_full, hashimoto_light, quick_hash};
pub use search::{CancelToken, SearchOutcome, SearchResult, Searcher};
pub use seed::{get_seedhash, SeedHasher};
pub use store::{DagStore, EpochStore};
pub use verify::{difficulty_to_target, meets_target, verify_with, Block, BlockView};

pub const EPOCH_LENGTH: u64 = 30_000;
pub const MAX_EPOCH: u64 = 2048;

pub const DATASET_BYTES_INIT: usize = 1 << 30;
pub const DATASET_BYTES_GROWTH: usize = 1 << 23;
pub const CACHE_BYTES_INIT: usize = 1 << 24;
pub const CACHE_BYTES_GROWTH: usize = 1 << 17;

pub const MIX_BYTES: usize = 128;
pub const WORD_BYTES: usize = 4;
pub const HASH_BYTES: usize = 64;
pub const DATASET_PARENTS: usize = 256;
pub const CACHE_ROUNDS: usize = 3;
pub const ACCESSES: usize = 64;

/// 32-bit words per 64-byte cache element or dataset item.
pub const HASH_WORDS: usize = HASH_BYTES / WORD_BYTES;
/// 32-bit words in the hashimoto mix.
pub const MIX_WORDS: usize = MIX_BYTES / WORD_BYTES;

const FNV_PRIME: u32 = 0x0100_0193;

#[inline]
pub fn fnv(v1: u32, v2: u32) -> u32 {
    v1.wrapping_mul(FNV_PRIME) ^ v2
}

/// Wordwise FNV of `data` into `mix`.
#[inline]
pub fn fnv_mix_hash<const N: usize>(mix: &mut [u32; N], data: [u32; N]) {
    for (m, d) in mix.iter_mut().zip(data.iter()) {
        *m = fnv(*m, *d);
    }
}

pub fn keccak_512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Keccak512::new();
    hasher.update(data);
    let mut output = [0u8; 64];
    output.copy_from_slice(&hasher.finalize());
    output
}

pub fn keccak_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

pub(crate) fn read_words<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut words = [0u32; N];
    LittleEndian::read_u32_into(&bytes[..N * WORD_BYTES], &mut words);
    words
}

pub(crate) fn write_words(words: &[u32], bytes: &mut [u8]) {
    LittleEndian::write_u32_into(words, &mut bytes[..words.len() * WORD_BYTES]);
}
