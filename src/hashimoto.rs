use byteorder::{ByteOrder, LittleEndian};
use ethereum_types::H256;

use crate::{fnv, ACCESSES, HASH_BYTES, HASH_WORDS, MIX_BYTES, MIX_WORDS};

const MIX_HASHES: usize = MIX_BYTES / HASH_BYTES;

fn seed_hash(header_hash: H256, nonce: u64) -> [u8; 64] {
    let mut seed = [0u8; 40]; // 32 + 8
    seed[..32].copy_from_slice(header_hash.as_bytes());
    seed[32..].copy_from_slice(&nonce.to_le_bytes());
    crate::keccak_512(&seed)
}

fn final_hash(s: &[u8; 64], mix_digest: &H256) -> H256 {
    let mut buf = [0u8; 64 + 32];
    buf[..64].copy_from_slice(s);
    buf[64..].copy_from_slice(mix_digest.as_bytes());
    H256(crate::keccak_256(&buf))
}

/// "Main" function of Ethash, calculating the mix digest and result given the
/// header hash and nonce. `lookup` returns dataset item `i` as little endian
/// words; it decides whether the dataset is materialized or not.
pub fn hashimoto<F>(header_hash: H256, nonce: u64, full_size: usize, lookup: F) -> (H256, H256)
where
    F: Fn(usize) -> [u32; HASH_WORDS],
{
    let rows = (full_size / MIX_BYTES) as u32;
    let s = seed_hash(header_hash, nonce);
    let s_head = LittleEndian::read_u32(&s);

    let mut mix = [0u32; MIX_WORDS];
    for (i, word) in mix.iter_mut().enumerate() {
        *word = LittleEndian::read_u32(&s[(i % HASH_WORDS) * 4..]);
    }

    let mut temp = [0u32; MIX_WORDS];
    for i in 0..ACCESSES {
        let p = fnv(i as u32 ^ s_head, mix[i % MIX_WORDS]) % rows;
        for k in 0..MIX_HASHES {
            let item = lookup(MIX_HASHES * p as usize + k);
            temp[k * HASH_WORDS..(k + 1) * HASH_WORDS].copy_from_slice(&item);
        }
        crate::fnv_mix_hash(&mut mix, temp);
    }

    let mut cmix = [0u32; MIX_WORDS / 4];
    for (i, c) in cmix.iter_mut().enumerate() {
        let w = &mix[i * 4..i * 4 + 4];
        *c = fnv(fnv(fnv(w[0], w[1]), w[2]), w[3]);
    }
    let mut mix_digest = H256::zero();
    crate::write_words(&cmix, mix_digest.as_bytes_mut());

    let result = final_hash(&s, &mix_digest);
    (mix_digest, result)
}

/// Ethash used by a light client. Only stores the cache and recomputes every
/// dataset item it touches.
pub fn hashimoto_light(
    header_hash: H256,
    nonce: u64,
    full_size: usize,
    cache: &[u8],
) -> (H256, H256) {
    hashimoto(header_hash, nonce, full_size, |i| {
        crate::read_words(&crate::calc_dataset_item(cache, i))
    })
}

/// Ethash used by a full client. Reads items straight from the dataset.
pub fn hashimoto_full(
    header_hash: H256,
    nonce: u64,
    full_size: usize,
    dataset: &[u8],
) -> (H256, H256) {
    hashimoto(header_hash, nonce, full_size, |i| {
        crate::read_words(&dataset[i * HASH_BYTES..(i + 1) * HASH_BYTES])
    })
}

/// Result hash for a claimed mix digest, without touching the dataset.
pub fn quick_hash(header_hash: H256, nonce: u64, mix_digest: H256) -> H256 {
    final_hash(&seed_hash(header_hash, nonce), &mix_digest)
}
