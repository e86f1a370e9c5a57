//! SCB, the SHAKE cost-based KDF: a memory-hard derivation with tunable
//! CPU and memory cost.
//!
//! Each iteration scatters cSHAKE output across a working buffer in
//! cache-line writes that land one L2 size apart, while a running SHA3
//! state absorbs every written index and, at each L2 boundary, the entire
//! buffer. The scatter forces the whole buffer to stay resident; the index
//! mixing stops an attacker from replaying a precomputed buffer.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::keccak::{KeccakState, DOMAIN_SHA3, DOMAIN_SHAKE, RATE_256, RATE_512};
use crate::sha3::CShake;
use crate::Error;

/// The inclusive CPU cost bounds, in iterations.
pub const CPU_COST_RANGE: core::ops::RangeInclusive<usize> = 1..=1000;
/// The inclusive memory cost bounds, in MiB.
pub const MEMORY_COST_RANGE: core::ops::RangeInclusive<usize> = 1..=128;
/// The maximum output per generate call.
pub const MAX_OUTPUT: usize = 10_240_000;

const CACHE_LINE: usize = 64;
const L2_SIZE: usize = 256 * 1024;
const MEMORY_COST_UNIT: usize = 1024 * 1024;
const NAME: &[u8] = b"SCB v1.d";

/// An SCB state parameterized by sponge rate and cache-key length. The
/// 32-byte-seed variant runs cSHAKE-256, the 64-byte variant cSHAKE-512.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Scb<const RATE: usize, const KEY_LEN: usize> {
    cache_key: [u8; KEY_LEN],
    cpu_cost: usize,
    mem_cost: usize,
}

/// SCB-256: 32-byte seeds, cSHAKE-256.
pub type Scb256 = Scb<RATE_256, 32>;
/// SCB-512: 64-byte seeds, cSHAKE-512.
pub type Scb512 = Scb<RATE_512, 64>;

impl<const RATE: usize, const KEY_LEN: usize> Scb<RATE, KEY_LEN> {
    /// Expands the seed (with the fixed "SCB v1.d" label and optional
    /// info string) into the cache key and records the cost parameters.
    pub fn new(
        seed: &[u8],
        info: &[u8],
        cpu_cost: usize,
        mem_cost: usize,
    ) -> Result<Self, Error> {
        if seed.len() != KEY_LEN
            || !CPU_COST_RANGE.contains(&cpu_cost)
            || !MEMORY_COST_RANGE.contains(&mem_cost)
        {
            return Err(Error::InvalidParameter);
        }

        let mut xof = CShake::<RATE>::new(NAME, info);
        xof.absorb(seed);
        let mut block = Zeroizing::new([0u8; RATE]);
        xof.squeeze(block.as_mut());

        let mut cache_key = [0u8; KEY_LEN];
        cache_key.copy_from_slice(&block[..KEY_LEN]);
        Ok(Scb { cache_key, cpu_cost, mem_cost })
    }

    /// Runs the cost loop and squeezes `output` from the derived key.
    /// Deterministic for a given seed, info, and cost pair. Allocates
    /// exactly `mem_cost` MiB transiently; the buffer is cleared and freed
    /// before return.
    pub fn generate(&mut self, output: &mut [u8]) -> Result<(), Error> {
        if output.len() > MAX_OUTPUT {
            return Err(Error::LengthOverflow);
        }

        let buf_len = self.mem_cost * MEMORY_COST_UNIT;
        let mut buffer: Vec<u8> = Vec::new();
        buffer.try_reserve_exact(buf_len).map_err(|_| Error::OutOfMemory)?;
        buffer.resize(buf_len, 0);

        let indices = scatter_indices(buf_len);
        let l2_lines = L2_SIZE / CACHE_LINE;

        for _ in 0..self.cpu_cost {
            let mut hash = KeccakState::<RATE>::new();
            hash.absorb(&self.cache_key);

            let mut xof = CShake::<RATE>::new(b"", b"");
            xof.absorb(&self.cache_key);
            for (line, &index) in indices.iter().enumerate() {
                let mut block = [0u8; RATE];
                xof.squeeze(&mut block);
                let at = index * CACHE_LINE;
                buffer[at..at + CACHE_LINE].copy_from_slice(&block[..CACHE_LINE]);

                hash.absorb(&u64::to_le_bytes(line as u64));
                hash.absorb(&u64::to_le_bytes(index as u64));
                if (line + 1) % l2_lines == 0 {
                    hash.absorb(&buffer);
                }
            }

            hash.finalize(DOMAIN_SHA3);
            hash.squeeze(&mut self.cache_key);
        }

        buffer.zeroize();
        drop(buffer);

        let mut xof = KeccakState::<RATE>::new();
        xof.absorb(&self.cache_key);
        xof.finalize(DOMAIN_SHAKE);
        xof.squeeze(output);
        Ok(())
    }

    /// Folds a new seed into the cache key.
    pub fn update(&mut self, seed: &[u8]) {
        let mut hash = KeccakState::<RATE>::new();
        hash.absorb(&self.cache_key);
        hash.absorb(seed);
        hash.finalize(DOMAIN_SHA3);
        hash.squeeze(&mut self.cache_key);
    }
}

// Consecutive writes land one L2 size apart: with `lanes` = buffer/L2,
// index[lanes*i + j] = i + j*(lines/lanes).
fn scatter_indices(buf_len: usize) -> Vec<usize> {
    let lines = buf_len / CACHE_LINE;
    let lanes = buf_len / L2_SIZE;
    let per_lane = lines / lanes;

    let mut indices = vec![0usize; lines];
    for i in 0..per_lane {
        for (j, slot) in indices[lanes * i..lanes * (i + 1)].iter_mut().enumerate() {
            *slot = i + j * per_lane;
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(n: usize) -> Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    // Pinned vectors for this implementation, cross-checked against an
    // independent port of the same construction.
    #[test]
    fn scb256_kat() {
        let mut kdf = Scb256::new(&seed(32), b"", 1, 1).unwrap();
        let mut out = [0u8; 32];
        kdf.generate(&mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex::decode("5cf64dd51f708bdf9535a663993eaec216d81daccd2bc9de87504975b1a3a1ec")
                .unwrap()
        );
    }

    #[test]
    fn scb512_kat() {
        let mut kdf = Scb512::new(&seed(64), b"", 1, 1).unwrap();
        let mut out = [0u8; 64];
        kdf.generate(&mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex::decode(
                "91529dc7caab3a19a97f6e3ca258c8bb1630a8c796a40ceb0fcd0cac23042111\
                 68f25da3adec14a5daf64bc9604e41134ac3a688094f54b1af6d0ba7b566aa49"
            )
            .unwrap()
        );
    }

    #[test]
    fn cpu_cost_changes_output() {
        let mut kdf = Scb256::new(&seed(32), b"", 2, 1).unwrap();
        let mut out = [0u8; 32];
        kdf.generate(&mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex::decode("987c02227327532eb8d1d8625c4b8839a29de11b52a1a447c9e934b3b3f7f794")
                .unwrap()
        );
    }

    // The scatter pattern is strictly length-dependent, so raising the
    // memory cost must change the output.
    #[test]
    fn memory_cost_changes_output() {
        let mut kdf = Scb256::new(&seed(32), b"", 1, 2).unwrap();
        let mut out = [0u8; 32];
        kdf.generate(&mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex::decode("9766170b9546b1c06f7bd691ba641272f88471662213fcd0aeb7d9dea445dae1")
                .unwrap()
        );
    }

    #[test]
    fn info_and_update_change_the_key() {
        let mut plain = Scb256::new(&seed(32), b"", 1, 1).unwrap();
        let mut tagged = Scb256::new(&seed(32), b"info", 1, 1).unwrap();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        plain.generate(&mut a).unwrap();
        tagged.generate(&mut b).unwrap();
        assert_ne!(a, b);

        let mut updated = Scb256::new(&seed(32), b"", 1, 1).unwrap();
        updated.update(b"fresh entropy");
        updated.generate(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parameter_bounds() {
        assert!(Scb256::new(&seed(31), b"", 1, 1).is_err());
        assert!(Scb256::new(&seed(32), b"", 0, 1).is_err());
        assert!(Scb256::new(&seed(32), b"", 1001, 1).is_err());
        assert!(Scb256::new(&seed(32), b"", 1, 0).is_err());
        assert!(Scb256::new(&seed(32), b"", 1, 129).is_err());
        assert!(Scb512::new(&seed(32), b"", 1, 1).is_err());
    }

    #[test]
    fn scatter_is_a_permutation() {
        for mem in [1usize, 3] {
            let mut indices = scatter_indices(mem * MEMORY_COST_UNIT);
            let lines = mem * MEMORY_COST_UNIT / CACHE_LINE;
            indices.sort_unstable();
            assert!(indices.iter().copied().eq(0..lines));
        }
    }

    #[test]
    fn scattered_writes_are_l2_distant() {
        let indices = scatter_indices(MEMORY_COST_UNIT);
        for pair in indices.windows(2).take(3) {
            let gap = pair[1].abs_diff(pair[0]) * CACHE_LINE;
            assert_eq!(gap, L2_SIZE);
        }
    }
}
