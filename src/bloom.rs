//! Counting Bloom filter used by the B+tree-with-buckets backend to
//! short-circuit misses without touching the underlying tree.
//!
//! Unlike a plain Bloom filter, each slot carries a small counter instead of
//! a single bit, so `remove` can undo an earlier `add` without forcing a full
//! rebuild. Slot indices are derived with double hashing (Kirsch/Mitzenmacher)
//! from two independent `ahash` seeds, which avoids computing `k` fully
//! independent hash functions.

use ahash::RandomState;
use parking_lot::RwLock;
use std::hash::{BuildHasher, Hash, Hasher};

const SLOT_MAX: u8 = u8::MAX;

struct Seeds {
    h1: RandomState,
    h2: RandomState,
}

/// A counting Bloom filter sized for a target capacity and false-positive
/// rate at construction time.
///
/// `test(k) == false` is a sound guarantee the key is absent. `test(k) ==
/// true` may be a false positive and must be confirmed against the backing
/// store.
pub struct CountingBloomFilter {
    counters: RwLock<Vec<u8>>,
    seeds: Seeds,
    num_slots: usize,
    num_hashes: u32,
}

impl CountingBloomFilter {
    /// Sizes a filter for `capacity` expected entries at false-positive rate
    /// `fp_rate` (e.g. `0.01` for 1%).
    pub fn new(capacity: usize, fp_rate: f64) -> Self {
        let capacity = capacity.max(1);
        let fp_rate = fp_rate.clamp(1e-6, 0.5);

        let num_slots = optimal_num_slots(capacity, fp_rate);
        let num_hashes = optimal_num_hashes(num_slots, capacity);

        CountingBloomFilter {
            counters: RwLock::new(vec![0u8; num_slots]),
            seeds: Seeds {
                h1: RandomState::with_seeds(0x9E3779B97F4A7C15, 0xBF58476D1CE4E5B9, 1, 2),
                h2: RandomState::with_seeds(0x94D049BB133111EB, 0x2545F4914F6CDD1D, 3, 4),
            },
            num_slots,
            num_hashes,
        }
    }

    fn slot_indices(&self, key: &[u8]) -> Vec<usize> {
        let h1 = hash_with(&self.seeds.h1, key);
        let h2 = hash_with(&self.seeds.h2, key).wrapping_or_one();
        (0..self.num_hashes)
            .map(|i| (h1.wrapping_add((i as u64).wrapping_mul(h2)) as usize) % self.num_slots)
            .collect()
    }

    /// Records `key` as present, incrementing every slot it hashes to.
    pub fn add(&self, key: &[u8]) {
        let slots = self.slot_indices(key);
        let mut counters = self.counters.write();
        for idx in slots {
            if counters[idx] < SLOT_MAX {
                counters[idx] += 1;
            }
        }
    }

    /// Undoes an earlier `add`, decrementing every slot `key` hashes to.
    /// Slots already at zero are left untouched (they belong to some other
    /// key that collided into the same slot).
    pub fn remove(&self, key: &[u8]) {
        let slots = self.slot_indices(key);
        let mut counters = self.counters.write();
        for idx in slots {
            if counters[idx] > 0 {
                counters[idx] -= 1;
            }
        }
    }

    /// Returns `false` only when `key` is definitely absent.
    pub fn test(&self, key: &[u8]) -> bool {
        let slots = self.slot_indices(key);
        let counters = self.counters.read();
        slots.iter().all(|&idx| counters[idx] > 0)
    }

    /// Clears every counter, as if the filter were freshly constructed.
    pub fn reset(&self) {
        let mut counters = self.counters.write();
        counters.iter_mut().for_each(|c| *c = 0);
    }
}

fn hash_with(state: &RandomState, key: &[u8]) -> u64 {
    let mut hasher = state.build_hasher();
    key.hash(&mut hasher);
    hasher.finish()
}

trait NonZero {
    fn wrapping_or_one(self) -> Self;
}

impl NonZero for u64 {
    fn wrapping_or_one(self) -> Self {
        if self == 0 {
            1
        } else {
            self
        }
    }
}

fn optimal_num_slots(capacity: usize, fp_rate: f64) -> usize {
    let n = capacity as f64;
    let m = -(n * fp_rate.ln()) / (std::f64::consts::LN_2 * std::f64::consts::LN_2);
    (m.ceil() as usize).max(8)
}

fn optimal_num_hashes(num_slots: usize, capacity: usize) -> u32 {
    let m = num_slots as f64;
    let n = (capacity as f64).max(1.0);
    (((m / n) * std::f64::consts::LN_2).round() as u32).clamp(1, 16)
}
