use ethereum_types::H256;
use parking_lot::Mutex;

/// Get the seedhash for a given epoch.
pub fn get_seedhash(epoch: u64) -> H256 {
    advance([0u8; 32], epoch)
}

fn advance(mut s: [u8; 32], steps: u64) -> H256 {
    for _ in 0..steps {
        s = crate::keccak_256(&s);
    }
    H256::from(s)
}

/// Seed derivation that remembers the last computed epoch, so walking the
/// epochs forward costs one hash per step instead of `epoch` hashes.
#[derive(Debug)]
pub struct SeedHasher {
    last: Mutex<(u64, H256)>,
}

impl SeedHasher {
    pub fn new() -> Self {
        Self {
            last: Mutex::new((0, H256::zero())),
        }
    }

    pub fn seed(&self, epoch: u64) -> H256 {
        let mut last = self.last.lock();
        let (from, start) = if epoch >= last.0 {
            (last.0, last.1)
        } else {
            (0, H256::zero())
        };
        let seed = advance(start.to_fixed_bytes(), epoch - from);
        *last = (epoch, seed);
        seed
    }
}

impl Default for SeedHasher {
    fn default() -> Self {
        Self::new()
    }
}
