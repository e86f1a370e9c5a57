//! The FIPS-202 and SP800-185 Keccak constructions: SHA3-256/512, the
//! SHAKE-128/256/512 XOFs, and the customizable cSHAKE-128/256/512 XOFs.
//!
//! SHAKE-512 is not part of FIPS-202; it runs the sponge at the 72-byte
//! rate for callers that want a 512-bit-strength XOF and is used by the
//! entropy provider and the memory-hard KDF.

use zeroize::Zeroize;

use crate::keccak::{
    KeccakState, KeccakStateX4, DOMAIN_CSHAKE, DOMAIN_SHA3, DOMAIN_SHAKE, RATE_128, RATE_256,
    RATE_512,
};

/// A fixed-output SHA-3 hash parameterized by rate and digest length.
#[derive(Clone, Default, Zeroize)]
pub struct Sha3<const RATE: usize, const DIGEST: usize> {
    state: KeccakState<RATE>,
}

/// SHA3-256.
pub type Sha3_256 = Sha3<RATE_256, 32>;
/// SHA3-512.
pub type Sha3_512 = Sha3<RATE_512, 64>;

impl<const RATE: usize, const DIGEST: usize> Sha3<RATE, DIGEST> {
    /// Returns a new hash state.
    pub fn new() -> Self {
        Sha3 { state: KeccakState::new() }
    }

    /// Absorbs the given slice.
    pub fn update(&mut self, data: &[u8]) {
        self.state.absorb(data);
    }

    /// Pads, permutes, and returns the digest.
    pub fn finalize(mut self) -> [u8; DIGEST] {
        let mut digest = [0u8; DIGEST];
        self.state.finalize(DOMAIN_SHA3);
        self.state.squeeze(&mut digest);
        digest
    }
}

/// Computes SHA3-256 of the given slice.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha3_256::new();
    h.update(data);
    h.finalize()
}

/// Computes SHA3-512 of the given slice.
pub fn sha3_512(data: &[u8]) -> [u8; 64] {
    let mut h = Sha3_512::new();
    h.update(data);
    h.finalize()
}

/// A SHAKE XOF parameterized by rate.
#[derive(Clone, Default, Zeroize)]
pub struct Shake<const RATE: usize> {
    state: KeccakState<RATE>,
    squeezing: bool,
}

/// SHAKE-128.
pub type Shake128 = Shake<RATE_128>;
/// SHAKE-256.
pub type Shake256 = Shake<RATE_256>;
/// SHAKE-512 (SP800-185 rate discipline, non-FIPS variant).
pub type Shake512 = Shake<RATE_512>;

impl<const RATE: usize> Shake<RATE> {
    /// Returns a new XOF state.
    pub fn new() -> Self {
        Shake { state: KeccakState::new(), squeezing: false }
    }

    /// Absorbs the given slice. Must not be called after squeezing begins.
    pub fn absorb(&mut self, data: &[u8]) {
        debug_assert!(!self.squeezing);
        self.state.absorb(data);
    }

    /// Fills `out` with XOF output, finalizing the absorb phase on first
    /// use.
    pub fn squeeze(&mut self, out: &mut [u8]) {
        if !self.squeezing {
            self.state.finalize(DOMAIN_SHAKE);
            self.squeezing = true;
        }
        self.state.squeeze(out);
    }

    /// One-shot XOF computation.
    pub fn compute(data: &[u8], out: &mut [u8]) {
        let mut xof = Self::new();
        xof.absorb(data);
        xof.squeeze(out);
    }
}

/// A cSHAKE XOF parameterized by rate. With an empty name and custom
/// string this is exactly SHAKE, per SP800-185.
#[derive(Clone, Zeroize)]
pub struct CShake<const RATE: usize> {
    state: KeccakState<RATE>,
    domain: u8,
    squeezing: bool,
}

/// cSHAKE-128.
pub type CShake128 = CShake<RATE_128>;
/// cSHAKE-256.
pub type CShake256 = CShake<RATE_256>;
/// cSHAKE-512.
pub type CShake512 = CShake<RATE_512>;

impl<const RATE: usize> CShake<RATE> {
    /// Returns a new XOF state customized by `name` (the standard-defined
    /// function name) and `custom` (the caller-defined string).
    pub fn new(name: &[u8], custom: &[u8]) -> Self {
        let mut state = KeccakState::new();
        let domain = if name.is_empty() && custom.is_empty() {
            DOMAIN_SHAKE
        } else {
            let mut enc = [0u8; 9];
            state.absorb(left_encode(&mut enc, RATE as u64));
            state.absorb(left_encode(&mut enc, 8 * name.len() as u64));
            state.absorb(name);
            state.absorb(left_encode(&mut enc, 8 * custom.len() as u64));
            state.absorb(custom);
            state.fill_block();
            DOMAIN_CSHAKE
        };
        CShake { state, domain, squeezing: false }
    }

    /// Absorbs the given slice. Must not be called after squeezing begins.
    pub fn absorb(&mut self, data: &[u8]) {
        debug_assert!(!self.squeezing);
        self.state.absorb(data);
    }

    /// Pads the absorbed prefix to a rate boundary (SP800-185 `bytepad`).
    pub(crate) fn fill_block(&mut self) {
        self.state.fill_block();
    }

    /// Fills `out` with XOF output, finalizing the absorb phase on first
    /// use.
    pub fn squeeze(&mut self, out: &mut [u8]) {
        if !self.squeezing {
            self.state.finalize(self.domain);
            self.squeezing = true;
        }
        self.state.squeeze(out);
    }

    /// One-shot customized XOF computation of a keyed message.
    pub fn compute(key: &[u8], name: &[u8], custom: &[u8], out: &mut [u8]) {
        let mut xof = Self::new(name, custom);
        xof.absorb(key);
        xof.squeeze(out);
    }
}

/// Computes SHAKE at the given rate over four equal-length inputs in
/// lockstep, one output per lane.
fn shake_x4<const RATE: usize>(inputs: [&[u8]; 4], outs: [&mut [u8]; 4]) {
    let mut state = KeccakStateX4::<RATE>::new();
    state.absorb(inputs);
    state.finalize(DOMAIN_SHAKE);
    state.squeeze(outs);
}

/// Computes SHAKE-128 over four equal-length inputs in lockstep.
pub fn shake128_x4(inputs: [&[u8]; 4], outs: [&mut [u8]; 4]) {
    shake_x4::<RATE_128>(inputs, outs);
}

/// Computes SHAKE-256 over four equal-length inputs in lockstep.
pub fn shake256_x4(inputs: [&[u8]; 4], outs: [&mut [u8]; 4]) {
    shake_x4::<RATE_256>(inputs, outs);
}

/// SP800-185 `left_encode`: one length byte, then the value big-endian.
pub(crate) fn left_encode(buf: &mut [u8; 9], value: u64) -> &[u8] {
    let n = encoded_len(value);
    buf[0] = n as u8;
    for i in 0..n {
        buf[i + 1] = (value >> (8 * (n - 1 - i))) as u8;
    }
    &buf[..n + 1]
}

/// SP800-185 `right_encode`: the value big-endian, then one length byte.
pub(crate) fn right_encode(buf: &mut [u8; 9], value: u64) -> &[u8] {
    let n = encoded_len(value);
    for i in 0..n {
        buf[i] = (value >> (8 * (n - 1 - i))) as u8;
    }
    buf[n] = n as u8;
    &buf[..n + 1]
}

fn encoded_len(value: u64) -> usize {
    (8 - value.leading_zeros() as usize / 8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_256_kats() {
        assert_eq!(
            sha3_256(b"").to_vec(),
            hex::decode("a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a")
                .unwrap()
        );
        assert_eq!(
            sha3_256(b"abc").to_vec(),
            hex::decode("3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532")
                .unwrap()
        );
    }

    #[test]
    fn sha3_512_kats() {
        assert_eq!(
            sha3_512(b"").to_vec(),
            hex::decode(
                "a69f73cca23a9ac5c8b567dc185a756e97c982164fe25859e0d1dcc1475c80a6\
                 15b2123af1f5f94c11e3e9402c3ac558f500199d95b6d3e301758586281dcd26"
            )
            .unwrap()
        );
        assert_eq!(
            sha3_512(b"abc").to_vec(),
            hex::decode(
                "b751850b1a57168a5693cd924b6b096e08f621827444f70d884f5d0240d2712e\
                 10e116e9192af3c91a7ec57647e3934057340b4cf408d5a56592f8274eee5315"
            )
            .unwrap()
        );
    }

    #[test]
    fn shake_kats() {
        let mut out = [0u8; 32];
        Shake128::compute(b"", &mut out);
        assert_eq!(
            out.to_vec(),
            hex::decode("7f9c2ba4e88f827d616045507605853ed73b8093f6efbc88eb1a6eacfa66ef26")
                .unwrap()
        );
        Shake256::compute(b"", &mut out);
        assert_eq!(
            out.to_vec(),
            hex::decode("46b9dd2b0ba88d13233b3feb743eeb243fcd52ea62b81b82b50c27646ed5762f")
                .unwrap()
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = vec![0x5au8; 1000];
        let mut h = Sha3_256::new();
        for chunk in data.chunks(67) {
            h.update(chunk);
        }
        assert_eq!(h.finalize(), sha3_256(&data));
    }

    #[test]
    fn shake_squeeze_is_chunking_invariant() {
        let mut whole = [0u8; 200];
        Shake256::compute(b"parapet", &mut whole);

        let mut xof = Shake256::new();
        xof.absorb(b"parapet");
        let mut split = [0u8; 200];
        xof.squeeze(&mut split[..33]);
        xof.squeeze(&mut split[33..140]);
        xof.squeeze(&mut split[140..]);
        assert_eq!(whole, split);
    }

    #[test]
    fn cshake_with_empty_strings_is_shake() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        CShake256::compute(b"some input", b"", b"", &mut a);
        Shake256::compute(b"some input", &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn cshake_separates_domains() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut c = [0u8; 32];
        CShake256::compute(b"key", b"A", b"", &mut a);
        CShake256::compute(b"key", b"B", b"", &mut b);
        CShake256::compute(b"key", b"", b"A", &mut c);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn shake512_expands() {
        let mut a = [0u8; 144];
        let mut b = [0u8; 144];
        Shake512::compute(b"seed", &mut a);
        Shake512::compute(b"seed", &mut b);
        assert_eq!(a, b);
        Shake512::compute(b"seeds", &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn encodings() {
        let mut buf = [0u8; 9];
        assert_eq!(left_encode(&mut buf, 0), &[0x01, 0x00]);
        assert_eq!(left_encode(&mut buf, 168), &[0x01, 0xa8]);
        assert_eq!(left_encode(&mut buf, 4096), &[0x02, 0x10, 0x00]);
        assert_eq!(right_encode(&mut buf, 0), &[0x00, 0x01]);
        assert_eq!(right_encode(&mut buf, 256), &[0x01, 0x00, 0x02]);
    }

    #[test]
    fn x4_matches_scalar_shake() {
        let seeds: [Vec<u8>; 4] = core::array::from_fn(|i| vec![i as u8 + 1; 34]);
        let mut outs = [[0u8; 128]; 4];
        {
            let [o0, o1, o2, o3] = &mut outs;
            shake128_x4(
                [&seeds[0], &seeds[1], &seeds[2], &seeds[3]],
                [&mut o0[..], &mut o1[..], &mut o2[..], &mut o3[..]],
            );
        }
        for (seed, out) in seeds.iter().zip(&outs) {
            let mut expected = [0u8; 128];
            Shake128::compute(seed, &mut expected);
            assert_eq!(&expected[..], &out[..]);
        }
    }
}
