//! The KMAC keyed MACs (SP800-185) and the KPA eight-lane parallel MAC.
//!
//! KPA runs eight KMAC lanes over interleaved blocks of the message, each
//! lane keyed by the user key with a distinct lane nonce folded in, then
//! authenticates the concatenated lane digests with a terminal KMAC under
//! the unmodified key. It is deliberately not interchangeable with KMAC.

use zeroize::Zeroizing;

use crate::keccak::{KeccakStateX8, DOMAIN_CSHAKE, RATE_128, RATE_256, RATE_512};
use crate::sha3::{left_encode, right_encode, CShake};

/// A KMAC state parameterized by rate.
#[derive(Clone)]
pub struct Kmac<const RATE: usize> {
    cshake: CShake<RATE>,
}

/// KMAC-128.
pub type Kmac128 = Kmac<RATE_128>;
/// KMAC-256.
pub type Kmac256 = Kmac<RATE_256>;
/// KMAC-512.
pub type Kmac512 = Kmac<RATE_512>;

impl<const RATE: usize> Kmac<RATE> {
    /// Returns a new MAC state keyed with `key` and customized by `custom`.
    pub fn new(key: &[u8], custom: &[u8]) -> Self {
        let mut cshake = CShake::new(b"KMAC", custom);

        // bytepad(encode_string(key), rate)
        let mut enc = [0u8; 9];
        cshake.absorb(left_encode(&mut enc, RATE as u64));
        cshake.absorb(left_encode(&mut enc, 8 * key.len() as u64));
        cshake.absorb(key);
        cshake.fill_block();

        Kmac { cshake }
    }

    /// Absorbs the given slice.
    pub fn update(&mut self, data: &[u8]) {
        self.cshake.absorb(data);
    }

    /// Produces a tag of the output buffer's length. The length is bound
    /// into the MAC, so truncations of a longer tag do not verify.
    pub fn finalize(mut self, tag: &mut [u8]) {
        let mut enc = [0u8; 9];
        self.cshake.absorb(right_encode(&mut enc, 8 * tag.len() as u64));
        self.cshake.squeeze(tag);
    }

    /// Converts the MAC into an arbitrary-length XOF (KMACXOF).
    pub fn into_xof(mut self) -> CShake<RATE> {
        let mut enc = [0u8; 9];
        self.cshake.absorb(right_encode(&mut enc, 0));
        self.cshake
    }

    /// One-shot MAC computation.
    pub fn compute(key: &[u8], custom: &[u8], message: &[u8], tag: &mut [u8]) {
        let mut mac = Self::new(key, custom);
        mac.update(message);
        mac.finalize(tag);
    }
}

const KPA_LANES: usize = 8;

/// A KPA parallel MAC state parameterized by rate and per-lane digest
/// length.
pub struct Kpa<const RATE: usize, const LANE_DIGEST: usize> {
    bulk: KeccakStateX8<RATE>,
    pending: Zeroizing<Vec<u8>>,
    key: Zeroizing<Vec<u8>>,
}

/// KPA-256: eight KMAC-256 lanes with 32-byte lane digests.
pub type Kpa256 = Kpa<RATE_256, 32>;
/// KPA-512: eight KMAC-512 lanes with 64-byte lane digests.
pub type Kpa512 = Kpa<RATE_512, 64>;

impl<const RATE: usize, const LANE_DIGEST: usize> Kpa<RATE, LANE_DIGEST> {
    /// Returns a new parallel MAC state. The key must be at least eight
    /// bytes so the lane nonces can be folded in.
    pub fn new(key: &[u8], custom: &[u8]) -> Self {
        debug_assert!(key.len() >= 8);
        let mut bulk = KeccakStateX8::<RATE>::new();
        let mut enc = [0u8; 9];

        // The cSHAKE prefix is identical across lanes.
        let name: &[u8] = b"KMAC";
        Self::absorb_all(&mut bulk, left_encode(&mut enc, RATE as u64));
        Self::absorb_all(&mut bulk, left_encode(&mut enc, 8 * name.len() as u64));
        Self::absorb_all(&mut bulk, name);
        Self::absorb_all(&mut bulk, left_encode(&mut enc, 8 * custom.len() as u64));
        Self::absorb_all(&mut bulk, custom);
        bulk.fill_block();

        // bytepad(encode_string(lane_key)): per-lane keys differ in their
        // first eight bytes but not in length, so the lanes stay in
        // lockstep.
        let lane_keys: [Zeroizing<Vec<u8>>; KPA_LANES] = core::array::from_fn(|lane| {
            let mut k = Zeroizing::new(key.to_vec());
            for (b, n) in k.iter_mut().zip(u64::to_le_bytes(lane as u64 + 1)) {
                *b ^= n;
            }
            k
        });
        Self::absorb_all(&mut bulk, left_encode(&mut enc, RATE as u64));
        Self::absorb_all(&mut bulk, left_encode(&mut enc, 8 * key.len() as u64));
        bulk.absorb(core::array::from_fn(|lane| lane_keys[lane].as_slice()));
        bulk.fill_block();

        Kpa {
            bulk,
            pending: Zeroizing::new(Vec::new()),
            key: Zeroizing::new(key.to_vec()),
        }
    }

    fn absorb_all(bulk: &mut KeccakStateX8<RATE>, data: &[u8]) {
        bulk.absorb([data; KPA_LANES]);
    }

    /// Absorbs the given slice, distributing rate-sized blocks across the
    /// eight lanes round-robin.
    pub fn update(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        let group = KPA_LANES * RATE;
        let full = self.pending.len() / group * group;
        for chunk in self.pending[..full].chunks(group) {
            self.bulk.absorb(core::array::from_fn(|lane| &chunk[lane * RATE..(lane + 1) * RATE]));
        }
        self.pending.drain(..full);
    }

    /// Finalizes the eight lanes, then MACs the concatenated lane digests
    /// with a terminal KMAC under the unmodified key.
    pub fn finalize(self, tag: &mut [u8]) {
        let mut lanes = self.bulk.split();

        // Residual blocks continue the round-robin schedule from lane 0.
        for (lane, chunk) in self.pending.chunks(RATE).enumerate() {
            lanes[lane].absorb(chunk);
        }

        let mut digests = Zeroizing::new([0u8; KPA_LANES * 64]);
        let mut enc = [0u8; 9];
        for (lane, state) in lanes.iter_mut().enumerate() {
            state.absorb(right_encode(&mut enc, 8 * LANE_DIGEST as u64));
            state.finalize(DOMAIN_CSHAKE);
            state.squeeze(&mut digests[lane * LANE_DIGEST..(lane + 1) * LANE_DIGEST]);
        }

        let mut terminal = Kmac::<RATE>::new(&self.key, b"KPA");
        terminal.update(&digests[..KPA_LANES * LANE_DIGEST]);
        terminal.finalize(tag);
    }

    /// One-shot MAC computation.
    pub fn compute(key: &[u8], custom: &[u8], message: &[u8], tag: &mut [u8]) {
        let mut mac = Self::new(key, custom);
        mac.update(message);
        mac.finalize(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP800-185 KMAC_samples vectors 1 and 2.
    #[test]
    fn kmac128_kats() {
        let key = hex::decode("404142434445464748494a4b4c4d4e4f505152535455565758595a5b5c5d5e5f")
            .unwrap();
        let data = hex::decode("00010203").unwrap();

        let mut tag = [0u8; 32];
        Kmac128::compute(&key, b"", &data, &mut tag);
        assert_eq!(
            tag.to_vec(),
            hex::decode("e5780b0d3ea6f7d3a429c5706aa43a00fadbd7d49628839e3187243f456ee14e")
                .unwrap()
        );

        Kmac128::compute(&key, b"My Tagged Application", &data, &mut tag);
        assert_eq!(
            tag.to_vec(),
            hex::decode("3b1fba963cd8b0b59e8c1a6d71888b7143651af8ba0a7070c0979e2811324aa5")
                .unwrap()
        );
    }

    #[test]
    fn tag_length_is_bound() {
        let mut long = [0u8; 64];
        let mut short = [0u8; 32];
        Kmac256::compute(b"0123456789abcdef0123456789abcdef", b"", b"msg", &mut long);
        Kmac256::compute(b"0123456789abcdef0123456789abcdef", b"", b"msg", &mut short);
        assert_ne!(&long[..32], &short[..]);
    }

    #[test]
    fn kmac_xof_differs_from_fixed() {
        let mut fixed = [0u8; 32];
        let mut xofed = [0u8; 32];
        Kmac256::compute(b"0123456789abcdef0123456789abcdef", b"", b"msg", &mut fixed);
        let mut mac = Kmac256::new(b"0123456789abcdef0123456789abcdef", b"");
        mac.update(b"msg");
        mac.into_xof().squeeze(&mut xofed);
        assert_ne!(fixed, xofed);
    }

    #[test]
    fn kpa_is_deterministic_and_keyed() {
        let msg = vec![0x2au8; 5000];
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        Kpa256::compute(b"0123456789abcdef0123456789abcdef", b"", &msg, &mut a);
        Kpa256::compute(b"0123456789abcdef0123456789abcdef", b"", &msg, &mut b);
        assert_eq!(a, b);
        Kpa256::compute(b"1123456789abcdef0123456789abcdef", b"", &msg, &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn kpa_is_chunking_invariant() {
        // Lane distribution depends only on total absorbed bytes, not on
        // the update call pattern.
        let msg: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let mut whole = [0u8; 64];
        Kpa512::compute(b"0123456789abcdef", b"", &msg, &mut whole);

        let mut mac = Kpa512::new(b"0123456789abcdef", b"");
        for chunk in msg.chunks(113) {
            mac.update(chunk);
        }
        let mut split = [0u8; 64];
        mac.finalize(&mut split);
        assert_eq!(whole, split);
    }

    #[test]
    fn kpa_is_not_kmac() {
        let msg = vec![0u8; 1024];
        let mut kpa = [0u8; 32];
        let mut kmac = [0u8; 32];
        Kpa256::compute(b"0123456789abcdef0123456789abcdef", b"", &msg, &mut kpa);
        Kmac256::compute(b"0123456789abcdef0123456789abcdef", b"", &msg, &mut kmac);
        assert_ne!(kpa, kmac);
    }
}
