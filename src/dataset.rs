//! Full dataset (DAG) items derived from the light cache.

use byteorder::{ByteOrder, LittleEndian};
use rayon::prelude::*;

use crate::error::Result;
use crate::{fnv, DATASET_PARENTS, HASH_BYTES, HASH_WORDS, WORD_BYTES};

/// Items handed to a rayon task at once.
const ITEMS_PER_TASK: usize = 1024;

/// Compute dataset item `index` from the cache.
pub fn calc_dataset_item(cache: &[u8], index: usize) -> [u8; HASH_BYTES] {
    let n = cache.len() / HASH_BYTES;
    let i = index as u32;

    let offset = (index % n) * HASH_BYTES;
    let mut seed = [0u8; HASH_BYTES];
    seed.copy_from_slice(&cache[offset..offset + HASH_BYTES]);
    let first = LittleEndian::read_u32(&seed) ^ i;
    LittleEndian::write_u32(&mut seed, first);

    let mut mix: [u32; HASH_WORDS] = crate::read_words(&crate::keccak_512(&seed));
    for j in 0..DATASET_PARENTS {
        let parent = fnv(i ^ j as u32, mix[j % HASH_WORDS]) as usize % n;
        let parent = &cache[parent * HASH_BYTES..(parent + 1) * HASH_BYTES];
        for (k, m) in mix.iter_mut().enumerate() {
            *m = fnv(*m, LittleEndian::read_u32(&parent[k * WORD_BYTES..]));
        }
    }

    let mut out = [0u8; HASH_BYTES];
    crate::write_words(&mix, &mut out);
    crate::keccak_512(&out)
}

/// Make an Ethash dataset using the given cache.
///
/// Items are independent once the cache is final, so the work is spread
/// across the rayon pool.
///
/// # Panics
///
/// If `dataset.len()` is not a multiple of [`HASH_BYTES`].
pub fn make_dataset(dataset: &mut [u8], cache: &[u8]) {
    assert_eq!(
        dataset.len() % HASH_BYTES,
        0,
        "dataset length {} is not a multiple of {HASH_BYTES}",
        dataset.len()
    );
    dataset
        .par_chunks_mut(HASH_BYTES * ITEMS_PER_TASK)
        .enumerate()
        .for_each(|(chunk, items)| {
            let base = chunk * ITEMS_PER_TASK;
            for (k, item) in items.chunks_exact_mut(HASH_BYTES).enumerate() {
                item.copy_from_slice(&calc_dataset_item(cache, base + k));
            }
        });
}

/// Allocate and fill a dataset of `full_size` bytes.
pub fn build_dataset(cache: &[u8], full_size: usize) -> Result<Vec<u8>> {
    let mut dataset = crate::cache::alloc_zeroed("dataset", full_size)?;
    make_dataset(&mut dataset, cache);
    Ok(dataset)
}
