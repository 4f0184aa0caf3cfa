// SPDX-License-Identifier: MIT

//! Fuzzy per-line hashes.
//!
//! Every line gets two values derived from its character bigrams:
//!
//!  * a 64-bit simhash-style [`Fingerprint`], used to bucket near-duplicate
//!    lines and blocks,
//!  * a 32-bit [`Signature`] with one bit set per bigram, whose Hamming
//!    distance gives a cheap similarity estimate.
//!
//! Empty and whitespace-only lines hash to zero.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

pub const FINGERPRINT_BITS: u32 = 64;
pub const SIGNATURE_BITS: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);
impl Fingerprint {
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Fixed-width hex rendering.
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Signature(pub u32);
impl Signature {
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn distance(self, other: Signature) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity estimate in [0, 1] from the Hamming distance.
    pub fn estimate(self, other: Signature) -> f64 {
        1.0 - self.distance(other) as f64 / SIGNATURE_BITS as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LineHash {
    pub fingerprint: Fingerprint,
    pub signature: Signature,
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

fn fnv1a64_chars(chars: &[char]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for &ch in chars {
        for b in (ch as u32).to_le_bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Base hashes of all character bigrams. A single-character line yields one
/// unigram hash.
fn bigram_hashes(text: &str) -> Vec<u64> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() == 1 {
        return vec![fnv1a64_chars(&chars)];
    }
    chars.windows(2).map(fnv1a64_chars).collect()
}

pub fn fingerprint(text: &str) -> Fingerprint {
    let hashes = bigram_hashes(text);
    if hashes.is_empty() {
        return Fingerprint(0);
    }

    let mut weights = [0i32; FINGERPRINT_BITS as usize];
    for base in hashes {
        for mixed in [base, splitmix64(base)] {
            for (bit, weight) in weights.iter_mut().enumerate() {
                if mixed >> bit & 1 != 0 {
                    *weight += 1;
                } else {
                    *weight -= 1;
                }
            }
        }
    }

    Fingerprint(
        weights
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w > 0)
            .fold(0u64, |acc, (bit, _)| acc | 1 << bit),
    )
}

pub fn signature(text: &str) -> Signature {
    Signature(
        bigram_hashes(text)
            .into_iter()
            .fold(0u32, |acc, base| {
                acc | 1 << (splitmix64(base ^ 0x5851_f42d_4c95_7f2d) % SIGNATURE_BITS as u64)
            }),
    )
}

pub fn line_hash(text: &str) -> LineHash {
    LineHash {
        fingerprint: fingerprint(text),
        signature: signature(text),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Memoizing hasher scoped to one classification.
///
/// Entries are only ever inserted, so concurrent region workers may share it;
/// racing computations of the same key produce the same value.
#[derive(Debug, Default)]
pub struct ContentHasher {
    cache: DashMap<String, LineHash>,
    hits: AtomicU64,
    misses: AtomicU64,
}
impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(&self, text: &str) -> LineHash {
        if let Some(hash) = self.cache.get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *hash;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let hash = line_hash(text);
        self.cache.entry(text.to_string()).or_insert(hash);
        hash
    }

    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        self.hash(text).fingerprint
    }

    pub fn signature(&self, text: &str) -> Signature {
        self.hash(text).signature
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
