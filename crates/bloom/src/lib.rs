//! # Bloom Filter Policy
//!
//! A space-efficient probabilistic summary for set membership testing,
//! exposed through the [`FilterPolicy`] capability that the table filter
//! block consumes.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives). The false positive rate depends on the
//! number of bits spent per key.
//!
//! ## Usage in RiptideKV
//!
//! Every table carries one filter block holding a filter per 2 KiB bucket of
//! data-block offsets. On point lookups the reader asks the filter first; a
//! negative answer skips the data block read entirely.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::{BloomFilterPolicy, FilterPolicy};
//!
//! let policy = BloomFilterPolicy::new(10);
//! let mut filter = Vec::new();
//! policy.create_filter(&[b"hello".as_slice()], &mut filter);
//! assert!(policy.key_may_match(b"hello", &filter));
//! ```

/// Largest probe count a filter may encode. Filters whose trailing byte is
/// larger are treated as an unknown encoding and always match.
pub const MAX_PROBES: u8 = 30;

/// Builds and queries approximate-membership summaries over a set of keys.
///
/// Implementations must be deterministic: a filter produced by
/// [`create_filter`](FilterPolicy::create_filter) today has to be readable by
/// [`key_may_match`](FilterPolicy::key_may_match) after a restart.
pub trait FilterPolicy: Send + Sync {
    /// Name persisted in the table's metaindex. Changing the encoding in an
    /// incompatible way must change the name.
    fn name(&self) -> &'static str;

    /// Appends a filter summarizing `keys` to `dst`.
    ///
    /// `keys` may contain duplicates and is not necessarily sorted.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// Returns `true` if `key` **might** be in the set summarized by `filter`.
    ///
    /// Must return `true` for every key that was passed to `create_filter`
    /// when `filter` was built.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Bloom filter policy backed by a bit vector with `k` probes per key.
///
/// Uses double hashing: `h(i) = h1 + i * h2` where `h1` and `h2` are derived
/// from FNV-1a with two different seeds.
///
/// Filter layout: `[bits: ceil(n * bits_per_key / 8) bytes, >= 8][k: u8]`.
#[derive(Clone)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    /// Number of probes (k).
    num_probes: u8,
}

impl BloomFilterPolicy {
    /// Creates a policy spending roughly `bits_per_key` bits per key.
    ///
    /// Ten bits per key yields a false positive rate close to 1%.
    ///
    /// # Panics
    ///
    /// Panics if `bits_per_key` is 0.
    pub fn new(bits_per_key: usize) -> Self {
        assert!(bits_per_key > 0, "bits_per_key must be > 0");

        // Optimal number of probes: k = bits_per_key * ln(2)
        let k = (bits_per_key as f64 * std::f64::consts::LN_2) as usize;
        let k = k.clamp(1, MAX_PROBES as usize) as u8;

        Self {
            bits_per_key,
            num_probes: k,
        }
    }

    /// Creates a policy sized for the given target `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `false_positive_rate` is not in `(0, 1)`.
    pub fn from_false_positive_rate(false_positive_rate: f64) -> Self {
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // Optimal bits per key: m/n = -ln(p) / (ln(2)^2)
        let bits = (-false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as usize;
        Self::new(bits.max(1))
    }

    /// Returns the configured bits per key.
    #[must_use]
    pub fn bits_per_key(&self) -> usize {
        self.bits_per_key
    }

    /// Returns the number of probes written into every filter.
    #[must_use]
    pub fn num_probes(&self) -> u8 {
        self.num_probes
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "riptide.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // Small key sets would otherwise get a uselessly high FPR.
        let bits = (keys.len() * self.bits_per_key).max(64);
        let byte_len = (bits + 7) / 8;
        let num_bits = (byte_len * 8) as u64;

        let init = dst.len();
        dst.resize(init + byte_len, 0);
        dst.push(self.num_probes);

        let array = &mut dst[init..init + byte_len];
        for key in keys {
            let (h1, h2) = hash_pair(key);
            for i in 0..self.num_probes {
                let bit_idx = get_bit_index(h1, h2, i, num_bits);
                set_bit(array, bit_idx);
            }
        }
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }

        let (array, k) = filter.split_at(filter.len() - 1);
        let k = k[0];
        if k > MAX_PROBES {
            // Reserved for newer encodings; be conservative.
            return true;
        }

        let num_bits = (array.len() * 8) as u64;
        let (h1, h2) = hash_pair(key);
        for i in 0..k {
            let bit_idx = get_bit_index(h1, h2, i, num_bits);
            if !get_bit(array, bit_idx) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for BloomFilterPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilterPolicy")
            .field("bits_per_key", &self.bits_per_key)
            .field("num_probes", &self.num_probes)
            .finish()
    }
}

// ---- Internal helpers ----

/// Computes two independent 64-bit hashes using FNV-1a with different seeds.
///
/// FNV-1a's low bits only depend on the low bits of the input bytes, and the
/// bit arrays here are byte-aligned, so both halves go through a finalizer.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = fmix64(fnv1a_64(key, 0xcbf29ce484222325));
    let h2 = fmix64(fnv1a_64(key, 0x517cc1b727220a95));
    (h1, h2)
}

/// MurmurHash3 64-bit finalizer.
fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// Double hashing: h(i) = (h1 + i * h2) mod num_bits.
fn get_bit_index(h1: u64, h2: u64, i: u8, num_bits: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % num_bits
}

fn set_bit(bits: &mut [u8], idx: u64) {
    let byte_idx = (idx / 8) as usize;
    let bit_offset = (idx % 8) as u8;
    bits[byte_idx] |= 1 << bit_offset;
}

fn get_bit(bits: &[u8], idx: u64) -> bool {
    let byte_idx = (idx / 8) as usize;
    let bit_offset = (idx % 8) as u8;
    (bits[byte_idx] >> bit_offset) & 1 == 1
}

/// FNV-1a 64-bit hash with a configurable starting basis.
fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
