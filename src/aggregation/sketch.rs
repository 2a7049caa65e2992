//! HyperLogLog sketch for approximate distinct counts
//!
//! 2048 six-bit registers (stored one per byte) over a 32-bit hash. Values
//! are hashed with CRC32 followed by the murmur3 finalizer so that short,
//! similar strings spread evenly across registers.

use serde::{Deserialize, Serialize};

const PRECISION: u32 = 11;
const REGISTERS: usize = 1 << PRECISION;

/// Mergeable distinct-count sketch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        Self {
            registers: vec![0; REGISTERS],
        }
    }

    /// Add one value
    pub fn add(&mut self, value: &[u8]) {
        let hash = fmix32(crc32fast::hash(value));
        let index = (hash >> (32 - PRECISION)) as usize;
        let rest = hash << PRECISION;
        let rank = if rest == 0 {
            (32 - PRECISION + 1) as u8
        } else {
            (rest.leading_zeros() + 1) as u8
        };
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Fold another sketch into this one
    pub fn union(&mut self, other: &HyperLogLog) {
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|r| *r == 0)
    }

    /// Estimated number of distinct values added
    pub fn estimate(&self) -> f64 {
        let m = REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);

        let mut sum = 0.0;
        let mut zeros = 0usize;
        for &register in &self.registers {
            sum += 2f64.powi(-(register as i32));
            if register == 0 {
                zeros += 1;
            }
        }

        let raw = alpha * m * m / sum;
        if raw <= 2.5 * m && zeros > 0 {
            // Linear counting for small cardinalities
            m * (m / zeros as f64).ln()
        } else if raw > (1u64 << 32) as f64 / 30.0 {
            let two_32 = (1u64 << 32) as f64;
            -two_32 * (1.0 - raw / two_32).ln()
        } else {
            raw
        }
    }
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sketch_of(range: std::ops::Range<u32>) -> HyperLogLog {
        let mut hll = HyperLogLog::new();
        for i in range {
            hll.add(format!("value-{}", i).as_bytes());
        }
        hll
    }

    #[test]
    fn test_empty_sketch() {
        let hll = HyperLogLog::new();
        assert!(hll.is_empty());
        assert_eq!(hll.estimate(), 0.0);
    }

    #[test]
    fn test_duplicates_do_not_grow_estimate() {
        let mut hll = HyperLogLog::new();
        for _ in 0..1000 {
            hll.add(b"same");
        }
        assert!((hll.estimate() - 1.0).abs() < 0.5);
    }

    #[test]
    fn test_estimate_accuracy() {
        let hll = sketch_of(0..10_000);
        let estimate = hll.estimate();
        let error = (estimate - 10_000.0).abs() / 10_000.0;
        assert!(error < 0.1, "estimate {} too far off", estimate);
    }

    #[test]
    fn test_union_matches_combined_input() {
        let mut left = sketch_of(0..3000);
        let right = sketch_of(2000..5000);
        left.union(&right);

        assert_eq!(left, sketch_of(0..5000));
    }
}
