//! Deterministic hashing for execution hashes and tracker tables.
//!
//! Spin-cycle hashes recorded in one invocation must be recognizable in the
//! next, and value views must hash identically across the search pass and
//! the replay pass, so everything identity- or value-keyed in the engine
//! uses a fixed-seed hasher instead of the randomized std default.

use std::hash::{BuildHasher, Hasher};

/// Deterministic, non-cryptographic hasher with a fixed seed.
#[derive(Debug, Clone)]
pub struct DetHasher {
    state: u64,
}

impl DetHasher {
    /// Fixed seed ensures deterministic hashes across runs.
    const SEED: u64 = 0x51ee_7c0d_e10c_a7e5;
    /// Prime multiplier for mixing.
    const MULTIPLIER: u64 = 0x517c_c1b7_2722_0a95;

    #[inline]
    fn mix_byte(&mut self, byte: u8) {
        self.state = self.state.wrapping_mul(Self::MULTIPLIER);
        self.state ^= u64::from(byte);
    }
}

impl Default for DetHasher {
    fn default() -> Self {
        Self { state: Self::SEED }
    }
}

impl Hasher for DetHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.mix_byte(byte);
        }
    }

    fn write_u64(&mut self, i: u64) {
        for byte in i.to_le_bytes() {
            self.mix_byte(byte);
        }
    }

    fn write_usize(&mut self, i: usize) {
        // Width-independent: always hash as u64.
        self.write_u64(i as u64);
    }

    fn write_i32(&mut self, i: i32) {
        for byte in i.to_le_bytes() {
            self.mix_byte(byte);
        }
    }

    fn write_i64(&mut self, i: i64) {
        self.write_u64(i.cast_unsigned());
    }

    fn finish(&self) -> u64 {
        // Final avalanche for better distribution.
        let mut h = self.state;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^= h >> 33;
        h
    }
}

/// Builder for deterministic hashers.
#[derive(Clone, Default)]
pub struct DetBuildHasher;

impl BuildHasher for DetBuildHasher {
    type Hasher = DetHasher;

    fn build_hasher(&self) -> Self::Hasher {
        DetHasher::default()
    }
}

/// `HashMap` with deterministic hashing.
///
/// Iteration order is still not guaranteed; use `BTreeMap` where
/// deterministic iteration order matters.
pub type DetHashMap<K, V> = std::collections::HashMap<K, V, DetBuildHasher>;

/// `HashSet` with deterministic hashing.
pub type DetHashSet<K> = std::collections::HashSet<K, DetBuildHasher>;

/// Hashes a single value with the deterministic hasher.
#[must_use]
pub fn det_hash<T: std::hash::Hash>(value: &T) -> u64 {
    let mut hasher = DetHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_hash() {
        assert_eq!(det_hash(&"monitor"), det_hash(&"monitor"));
        assert_eq!(det_hash(&42u64), det_hash(&42u64));
    }

    #[test]
    fn different_input_different_hash() {
        assert_ne!(det_hash(&"acquire"), det_hash(&"release"));
    }

    #[test]
    fn incremental_write_matches_bulk() {
        let mut h1 = DetHasher::default();
        h1.write(&[1, 2, 3, 4]);
        let mut h2 = DetHasher::default();
        h2.write(&[1, 2]);
        h2.write(&[3, 4]);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn det_map_lookup_stable() {
        let mut map: DetHashMap<String, i32> = DetHashMap::default();
        map.insert("w0".to_string(), 0);
        map.insert("w1".to_string(), 1);
        assert_eq!(map.get("w0"), Some(&0));
        assert_eq!(map.get("w1"), Some(&1));
    }
}
