//! The Keccak-f\[1600\] permutation and the sponge state machinery underneath
//! the SHA-3, SHAKE, cSHAKE, KMAC, and KPA constructions.
//!
//! A [`KeccakState`] is 25 64-bit lanes plus a byte position inside the
//! current rate-sized block. The four supported rates are 168 bytes
//! (128-bit strength), 136 bytes (256-bit), 104 bytes (384-bit), and 72
//! bytes (512-bit); the remaining `200 - RATE` bytes are the capacity and
//! are never absorbed into or emitted from.
//!
//! [`KeccakStateX4`] and [`KeccakStateX8`] interleave four or eight
//! independent states so one lockstep pass updates every lane; the i-th
//! lane's output is bit-for-bit the scalar output for the i-th lane's
//! input.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// The width of the Keccak-f\[1600\] state in bytes.
pub const STATE_BYTES: usize = 200;

/// The 128-bit-strength rate (SHAKE-128, cSHAKE-128, KMAC-128).
pub const RATE_128: usize = 168;
/// The 256-bit-strength rate (SHA3-256, SHAKE-256, cSHAKE-256, KMAC-256).
pub const RATE_256: usize = 136;
/// The 384-bit-strength rate.
pub const RATE_384: usize = 104;
/// The 512-bit-strength rate (SHA3-512, SHAKE-512, cSHAKE-512, KMAC-512).
pub const RATE_512: usize = 72;

/// FIPS-202 domain-separation byte for the fixed-output SHA-3 hashes.
pub(crate) const DOMAIN_SHA3: u8 = 0x06;
/// FIPS-202 domain-separation byte for the plain SHAKE XOFs.
pub(crate) const DOMAIN_SHAKE: u8 = 0x1f;
/// SP800-185 domain-separation byte for cSHAKE, KMAC, and KPA.
pub(crate) const DOMAIN_CSHAKE: u8 = 0x04;

const ROUNDS: usize = 24;

const RC: [u64; ROUNDS] = [
    0x0000000000000001,
    0x0000000000008082,
    0x800000000000808a,
    0x8000000080008000,
    0x000000000000808b,
    0x0000000080000001,
    0x8000000080008081,
    0x8000000000008009,
    0x000000000000008a,
    0x0000000000000088,
    0x0000000080008009,
    0x000000008000000a,
    0x000000008000808b,
    0x800000000000008b,
    0x8000000000008089,
    0x8000000000008003,
    0x8000000000008002,
    0x8000000000000080,
    0x000000000000800a,
    0x800000008000000a,
    0x8000000080008081,
    0x8000000000008080,
    0x0000000080000001,
    0x8000000080008008,
];

// (0..24).map(|t| ((t+1)*(t+2)/2) % 64)
const RHO: [u32; 24] = [
    1, 3, 6, 10, 15, 21, 28, 36, 45, 55, 2, 14, 27, 41, 56, 8, 25, 43, 62, 18, 39, 61, 20, 44,
];
const PI: [usize; 24] = [
    10, 7, 11, 17, 18, 3, 5, 16, 8, 21, 24, 4, 15, 23, 19, 13, 12, 2, 20, 14, 22, 9, 6, 1,
];

/// The Keccak-f\[1600\] permutation: 24 rounds of θ, ρ, π, χ, ι over 25
/// little-endian 64-bit lanes.
pub fn permute(lanes: &mut [u64; 25]) {
    let mut c = [0u64; 5];

    for rc in RC {
        // θ
        for x in 0..5 {
            c[x] = lanes[x] ^ lanes[x + 5] ^ lanes[x + 10] ^ lanes[x + 15] ^ lanes[x + 20];
        }
        for x in 0..5 {
            let d = c[(x + 4) % 5] ^ c[(x + 1) % 5].rotate_left(1);
            for y in (0..25).step_by(5) {
                lanes[x + y] ^= d;
            }
        }

        // ρ and π
        let mut a = lanes[1];
        for t in 0..24 {
            let b = lanes[PI[t]];
            lanes[PI[t]] = a.rotate_left(RHO[t]);
            a = b;
        }

        // χ
        for y in (0..25).step_by(5) {
            for x in 0..5 {
                c[x] = lanes[x + y];
            }
            for x in 0..5 {
                lanes[x + y] = c[x] ^ ((!c[(x + 1) % 5]) & c[(x + 2) % 5]);
            }
        }

        // ι
        lanes[0] ^= rc;
    }
}

/// A Keccak sponge state with an absorption/squeeze rate of `RATE` bytes.
/// The state is overwritten on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeccakState<const RATE: usize> {
    lanes: [u64; 25],
    pos: usize,
}

impl<const RATE: usize> Default for KeccakState<RATE> {
    fn default() -> Self {
        KeccakState { lanes: [0u64; 25], pos: 0 }
    }
}

impl<const RATE: usize> KeccakState<RATE> {
    /// Returns a zeroed state.
    pub fn new() -> Self {
        debug_assert!(RATE == RATE_128 || RATE == RATE_256 || RATE == RATE_384 || RATE == RATE_512);
        KeccakState::default()
    }

    #[inline(always)]
    fn xor_byte(&mut self, at: usize, byte: u8) {
        self.lanes[at / 8] ^= u64::from(byte) << (8 * (at % 8));
    }

    #[inline(always)]
    fn byte(&self, at: usize) -> u8 {
        (self.lanes[at / 8] >> (8 * (at % 8))) as u8
    }

    /// Applies the permutation to the state.
    #[inline]
    pub fn permute(&mut self) {
        permute(&mut self.lanes);
    }

    /// XORs `input` into the rate portion of the state, permuting at each
    /// block boundary.
    pub fn absorb(&mut self, input: &[u8]) {
        for &byte in input {
            self.xor_byte(self.pos, byte);
            self.pos += 1;
            if self.pos == RATE {
                self.permute();
                self.pos = 0;
            }
        }
    }

    /// Pads the absorbed prefix to a rate boundary: if any bytes are
    /// pending, permutes and resets the position. Used by the SP800-185
    /// `bytepad` discipline.
    pub fn fill_block(&mut self) {
        if self.pos != 0 {
            self.permute();
            self.pos = 0;
        }
    }

    /// Appends the domain-separation byte and the final `0x80` pad bit,
    /// then permutes. After this the state is ready to squeeze.
    pub fn finalize(&mut self, domain: u8) {
        self.xor_byte(self.pos, domain);
        self.xor_byte(RATE - 1, 0x80);
        self.permute();
        self.pos = 0;
    }

    /// Fills `out` with squeezed bytes, permuting at each block boundary.
    /// Only valid after [`KeccakState::finalize`].
    pub fn squeeze(&mut self, out: &mut [u8]) {
        for byte in out {
            if self.pos == RATE {
                self.permute();
                self.pos = 0;
            }
            *byte = self.byte(self.pos);
            self.pos += 1;
        }
    }

    /// Splits an interleaved lane set out of a parallel state.
    fn from_lanes(lanes: [u64; 25]) -> Self {
        KeccakState { lanes, pos: 0 }
    }
}

fn permute_parallel<const N: usize>(lanes: &mut [[u64; N]; 25]) {
    let mut c = [[0u64; N]; 5];
    let mut d = [[0u64; N]; 5];

    for rc in RC {
        // θ
        for x in 0..5 {
            for l in 0..N {
                c[x][l] = lanes[x][l]
                    ^ lanes[x + 5][l]
                    ^ lanes[x + 10][l]
                    ^ lanes[x + 15][l]
                    ^ lanes[x + 20][l];
            }
        }
        for x in 0..5 {
            for l in 0..N {
                d[x][l] = c[(x + 4) % 5][l] ^ c[(x + 1) % 5][l].rotate_left(1);
            }
        }
        for x in 0..5 {
            for y in (0..25).step_by(5) {
                for l in 0..N {
                    lanes[x + y][l] ^= d[x][l];
                }
            }
        }

        // ρ and π
        let mut a = lanes[1];
        for t in 0..24 {
            let b = lanes[PI[t]];
            for l in 0..N {
                lanes[PI[t]][l] = a[l].rotate_left(RHO[t]);
            }
            a = b;
        }

        // χ
        for y in (0..25).step_by(5) {
            let mut row = [[0u64; N]; 5];
            for x in 0..5 {
                row[x] = lanes[x + y];
            }
            for x in 0..5 {
                for l in 0..N {
                    lanes[x + y][l] = row[x][l] ^ ((!row[(x + 1) % 5][l]) & row[(x + 2) % 5][l]);
                }
            }
        }

        // ι
        for l in 0..N {
            lanes[0][l] ^= rc;
        }
    }
}

macro_rules! parallel_state {
    ($name:ident, $n:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name<const RATE: usize> {
            lanes: [[u64; $n]; 25],
            pos: usize,
        }

        impl<const RATE: usize> Default for $name<RATE> {
            fn default() -> Self {
                $name { lanes: [[0u64; $n]; 25], pos: 0 }
            }
        }

        impl<const RATE: usize> $name<RATE> {
            /// Returns a zeroed parallel state.
            pub fn new() -> Self {
                Self::default()
            }

            #[inline(always)]
            fn xor_byte(&mut self, lane: usize, at: usize, byte: u8) {
                self.lanes[at / 8][lane] ^= u64::from(byte) << (8 * (at % 8));
            }

            #[inline(always)]
            fn byte(&self, lane: usize, at: usize) -> u8 {
                (self.lanes[at / 8][lane] >> (8 * (at % 8))) as u8
            }

            /// Permutes all lanes in lockstep.
            #[inline]
            pub fn permute(&mut self) {
                permute_parallel(&mut self.lanes);
            }

            /// Absorbs one input per lane. The inputs must be of equal
            /// length.
            pub fn absorb(&mut self, inputs: [&[u8]; $n]) {
                let len = inputs[0].len();
                debug_assert!(inputs.iter().all(|i| i.len() == len));
                for at in 0..len {
                    for (lane, input) in inputs.iter().enumerate() {
                        self.xor_byte(lane, self.pos, input[at]);
                    }
                    self.pos += 1;
                    if self.pos == RATE {
                        self.permute();
                        self.pos = 0;
                    }
                }
            }

            /// Pads the absorbed prefix of every lane to a rate boundary.
            pub fn fill_block(&mut self) {
                if self.pos != 0 {
                    self.permute();
                    self.pos = 0;
                }
            }

            /// Pads and permutes every lane with the same domain byte.
            pub fn finalize(&mut self, domain: u8) {
                for lane in 0..$n {
                    self.xor_byte(lane, self.pos, domain);
                    self.xor_byte(lane, RATE - 1, 0x80);
                }
                self.permute();
                self.pos = 0;
            }

            /// Fills one output per lane with squeezed bytes. The outputs
            /// must be of equal length.
            pub fn squeeze(&mut self, mut outs: [&mut [u8]; $n]) {
                let len = outs[0].len();
                debug_assert!(outs.iter().all(|o| o.len() == len));
                for at in 0..len {
                    if self.pos == RATE {
                        self.permute();
                        self.pos = 0;
                    }
                    for (lane, out) in outs.iter_mut().enumerate() {
                        out[at] = self.byte(lane, self.pos);
                    }
                    self.pos += 1;
                }
            }

            /// Splits the parallel state into its independent scalar lanes.
            /// Only valid on a block boundary (after `fill_block` or before
            /// any partial absorption).
            pub fn split(self) -> [KeccakState<RATE>; $n] {
                debug_assert_eq!(self.pos, 0);
                let mut out: [KeccakState<RATE>; $n] =
                    core::array::from_fn(|_| KeccakState::default());
                for (lane, state) in out.iter_mut().enumerate() {
                    let mut lanes = [0u64; 25];
                    for (at, l) in lanes.iter_mut().enumerate() {
                        *l = self.lanes[at][lane];
                    }
                    *state = KeccakState::from_lanes(lanes);
                }
                out
            }
        }
    };
}

parallel_state!(
    KeccakStateX4,
    4,
    "Four interleaved Keccak states permuted in lockstep (256-bit SIMD width)."
);
parallel_state!(
    KeccakStateX8,
    8,
    "Eight interleaved Keccak states permuted in lockstep (512-bit SIMD width)."
);

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, LittleEndian};

    use super::*;

    #[test]
    fn permutation_kat() {
        // test vector produced by XKCP rev 2a8d2311a830ab3037f8c7ef2511e5c7cc032127
        let mut lanes = [0u64; 25];
        permute(&mut lanes);
        let mut bytes = [0u8; 200];
        LittleEndian::write_u64_into(&lanes, &mut bytes);
        assert_eq!(
            &bytes[..32],
            &[
                0xe7, 0xdd, 0xe1, 0x40, 0x79, 0x8f, 0x25, 0xf1, 0x8a, 0x47, 0xc0, 0x33, 0xf9,
                0xcc, 0xd5, 0x84, 0xee, 0xa9, 0x5a, 0xa6, 0x1e, 0x26, 0x98, 0xd5, 0x4d, 0x49,
                0x80, 0x6f, 0x30, 0x47, 0x15, 0xbd,
            ]
        );
    }

    #[test]
    fn parallel_lanes_match_scalar() {
        let inputs: [Vec<u8>; 4] =
            core::array::from_fn(|i| (0u32..97).map(|b| (b * 3 + i as u32) as u8).collect());

        let mut x4 = KeccakStateX4::<RATE_256>::new();
        x4.absorb([&inputs[0], &inputs[1], &inputs[2], &inputs[3]]);
        x4.finalize(DOMAIN_SHAKE);
        let mut outs = [[0u8; 64]; 4];
        {
            let [o0, o1, o2, o3] = &mut outs;
            x4.squeeze([&mut o0[..], &mut o1[..], &mut o2[..], &mut o3[..]]);
        }

        for (input, out) in inputs.iter().zip(&outs) {
            let mut scalar = KeccakState::<RATE_256>::new();
            scalar.absorb(input);
            scalar.finalize(DOMAIN_SHAKE);
            let mut expected = [0u8; 64];
            scalar.squeeze(&mut expected);
            assert_eq!(&expected, out);
        }
    }

    #[test]
    fn x8_split_matches_scalar() {
        let mut x8 = KeccakStateX8::<RATE_512>::new();
        let blocks: [Vec<u8>; 8] = core::array::from_fn(|i| vec![i as u8; RATE_512]);
        x8.absorb(core::array::from_fn(|i| blocks[i].as_slice()));

        for (i, mut lane) in x8.split().into_iter().enumerate() {
            let mut scalar = KeccakState::<RATE_512>::new();
            scalar.absorb(&blocks[i]);
            lane.finalize(DOMAIN_SHAKE);
            scalar.finalize(DOMAIN_SHAKE);
            let mut a = [0u8; 32];
            let mut b = [0u8; 32];
            lane.squeeze(&mut a);
            scalar.squeeze(&mut b);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn zeroize_is_idempotent() {
        use zeroize::Zeroize;

        let mut state = KeccakState::<RATE_256>::new();
        state.absorb(b"sensitive");
        state.zeroize();
        let cleared = state.clone();
        state.zeroize();
        assert_eq!(state.lanes, cleared.lanes);
        assert_eq!(state.lanes, [0u64; 25]);
    }

    #[test]
    fn absorb_is_chunking_invariant() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut whole = KeccakState::<RATE_128>::new();
        whole.absorb(data);
        whole.finalize(DOMAIN_SHAKE);

        let mut split = KeccakState::<RATE_128>::new();
        split.absorb(&data[..7]);
        split.absorb(&data[7..30]);
        split.absorb(&data[30..]);
        split.finalize(DOMAIN_SHAKE);

        let mut a = [0u8; 96];
        let mut b = [0u8; 96];
        whole.squeeze(&mut a);
        split.squeeze(&mut b);
        assert_eq!(a, b);
    }
}
