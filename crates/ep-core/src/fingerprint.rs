//! Content fingerprints
//!
//! Uses Murmur3 32-bit with two different seeds to create a 64-bit digest.
//! The digest labels a compiled ruleset with the list contents it came from;
//! it is an identity tag, not a security boundary.

// Default seeds for the two hash passes
const SEED_LO: u32 = 0x9e3779b9; // Golden ratio
const SEED_HI: u32 = 0x85ebca6b; // Murmur3 constant

/// Murmur3 32-bit hash implementation.
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= scramble(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (shift, &byte) in tail.iter().enumerate() {
            k ^= (byte as u32) << (8 * shift);
        }
        h ^= scramble(k);
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

#[inline]
fn scramble(k: u32) -> u32 {
    k.wrapping_mul(0xcc9e2d51)
        .rotate_left(15)
        .wrapping_mul(0x1b873593)
}

/// Incremental fingerprint over a sequence of named parts.
///
/// Each part folds in its length so that `["ab", "c"]` and `["a", "bc"]`
/// produce different digests.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint {
    lo: u32,
    hi: u32,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprint {
    pub const fn new() -> Self {
        Self {
            lo: SEED_LO,
            hi: SEED_HI,
        }
    }

    /// Fold one part into the digest.
    pub fn update(&mut self, part: &[u8]) -> &mut Self {
        let len = (part.len() as u64).to_le_bytes();
        self.lo = murmur3_32(part, murmur3_32(&len, self.lo));
        self.hi = murmur3_32(part, murmur3_32(&len, self.hi));
        self
    }

    /// 16 hex digits.
    pub fn to_hex(&self) -> String {
        format!("{:08x}{:08x}", self.hi, self.lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_known_values() {
        // Reference values for MurmurHash3_x86_32
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e28b7);
        assert_eq!(murmur3_32(b"hello", 0), 0x248bfa47);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::new().update(b"easylist").update(b"||ads.com^").to_hex();
        let b = Fingerprint::new().update(b"easylist").update(b"||ads.com^").to_hex();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_fingerprint_separates_parts() {
        let a = Fingerprint::new().update(b"ab").update(b"c").to_hex();
        let b = Fingerprint::new().update(b"a").update(b"bc").to_hex();
        assert_ne!(a, b);
    }
}
