//! Light cache generation (RandMemoHash).

use byteorder::{ByteOrder, LittleEndian};
use ethereum_types::H256;

use crate::error::{Error, Result};
use crate::{CACHE_ROUNDS, HASH_BYTES};

/// Allocate `len` zeroed bytes, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed(what: &'static str, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Allocation { what, bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Make an Ethash cache using the given seed.
///
/// # Panics
///
/// If `cache` is empty or its length is not a multiple of [`HASH_BYTES`].
pub fn make_cache(cache: &mut [u8], seed: H256) {
    assert!(
        !cache.is_empty() && cache.len() % HASH_BYTES == 0,
        "cache length {} is not a positive multiple of {HASH_BYTES}",
        cache.len()
    );
    let n = cache.len() / HASH_BYTES;

    cache[..HASH_BYTES].copy_from_slice(&crate::keccak_512(seed.as_bytes()));
    for i in 1..n {
        let (last, next) = cache.split_at_mut(i * HASH_BYTES);
        next[..HASH_BYTES].copy_from_slice(&crate::keccak_512(&last[(i - 1) * HASH_BYTES..]));
    }

    // Each element depends on the one rewritten just before it.
    for _ in 0..CACHE_ROUNDS {
        for i in 0..n {
            let v = LittleEndian::read_u32(&cache[i * HASH_BYTES..]) as usize % n;
            let prev = (i + n - 1) % n;
            let mut r = [0u8; HASH_BYTES];
            for (j, b) in r.iter_mut().enumerate() {
                *b = cache[prev * HASH_BYTES + j] ^ cache[v * HASH_BYTES + j];
            }
            cache[i * HASH_BYTES..(i + 1) * HASH_BYTES].copy_from_slice(&crate::keccak_512(&r));
        }
    }
}

/// Allocate and fill a cache of `cache_size` bytes.
pub fn build_cache(seed: H256, cache_size: usize) -> Result<Vec<u8>> {
    let mut cache = alloc_zeroed("cache", cache_size)?;
    make_cache(&mut cache, seed);
    Ok(cache)
}
