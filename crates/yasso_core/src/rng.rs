//! Deterministic random stream utilities.
//!
//! Each [`Stream`] represents an independent pseudo-random sequence derived
//! from the run seed, a logical stage label, and the sample index. Samples
//! never share a generator, so an ensemble can be replayed (or split across
//! workers) sample by sample and still produce identical draws.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rand_seeder::Seeder;

#[derive(Clone, Debug)]
pub struct Stream {
    inner: ChaCha8Rng,
}

impl Stream {
    /// Construct a stream for the given `(seed, stage, sample)` triple.
    pub fn from(seed: u64, stage: &str, sample: u64) -> Self {
        let stage_hash = fnv1a64(stage.as_bytes());
        let stream_id = seed
            .wrapping_mul(0xA0761D6478BD642F)
            .wrapping_add(0xE7037ED1A0B428DB)
            ^ sample.wrapping_mul(0x8E9D5A8F6A09E667)
            ^ stage_hash;
        Self {
            inner: ChaCha8Rng::seed_from_u64(mix64(stream_id)),
        }
    }

    /// Deterministically derive a child stream identified by `label`.
    ///
    /// The parent is cloned before drawing the child seed, so deriving never
    /// advances `self`.
    pub fn derive(&self, label: u64) -> Self {
        let mut parent = self.inner.clone();
        let derived = mix64(parent.next_u64() ^ mix64(label ^ 0x94D049BB133111EB));
        Self {
            inner: ChaCha8Rng::seed_from_u64(derived),
        }
    }

    /// Draw from `N(mean, std)`. Falls back to `mean` when the distribution
    /// cannot be built (non-finite deviation).
    pub fn gauss(&mut self, mean: f64, std: f64) -> f64 {
        match Normal::new(mean, std) {
            Ok(normal) => normal.sample(&mut self.inner),
            Err(_) => mean,
        }
    }

    /// Uniform index in `low..high`.
    pub fn index_in(&mut self, low: usize, high: usize) -> usize {
        debug_assert!(low < high);
        self.inner.gen_range(low..high)
    }
}

/// Produce a deterministic label for deriving child streams.
pub fn stream_label(name: &str) -> u64 {
    fnv1a64(name.as_bytes())
}

/// Turn a free-form seed phrase into a numeric run seed.
pub fn seed_from_phrase(phrase: &str) -> u64 {
    let mut rng: ChaCha8Rng = Seeder::from(phrase).make_rng();
    rng.next_u64()
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
