//! The ChaCha20 stream cipher (RFC 8439 shape) with x4/x8 wide-block
//! variants.
//!
//! The parallel paths encrypt four or eight blocks per pass with
//! independent counters; their output is identical to sequential
//! single-block encryption from the same starting counter, so the lane
//! width is chosen from the capability bitfield at construction and never
//! affects the keystream.

use byteorder::{ByteOrder, LittleEndian};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cpu;

/// The ChaCha20 block size in bytes.
pub const BLOCK_SIZE: usize = 64;

// "expand 32-byte k" / "expand 16-byte k"
const SIGMA: [u32; 4] = [0x61707865, 0x3320646e, 0x79622d32, 0x6b206574];
const TAU: [u32; 4] = [0x61707865, 0x3120646e, 0x79622d36, 0x6b206574];

/// A ChaCha20 cipher state: four constant words, eight key words, one
/// 32-bit block counter, and three nonce words.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChaCha20 {
    state: [u32; 16],
    #[zeroize(skip)]
    lanes: usize,
}

impl ChaCha20 {
    /// Returns a new cipher keyed with a 256-bit key.
    pub fn new(key: &[u8; 32], nonce: &[u8; 12], counter: u32) -> ChaCha20 {
        let mut state = [0u32; 16];
        state[..4].copy_from_slice(&SIGMA);
        LittleEndian::read_u32_into(key, &mut state[4..12]);
        state[12] = counter;
        LittleEndian::read_u32_into(nonce, &mut state[13..16]);
        ChaCha20 { state, lanes: cpu::features().lane_width() }
    }

    /// Returns a new cipher keyed with a 128-bit key, which is loaded
    /// twice against the 16-byte constants.
    pub fn new_128(key: &[u8; 16], nonce: &[u8; 12], counter: u32) -> ChaCha20 {
        let mut state = [0u32; 16];
        state[..4].copy_from_slice(&TAU);
        LittleEndian::read_u32_into(key, &mut state[4..8]);
        LittleEndian::read_u32_into(key, &mut state[8..12]);
        state[12] = counter;
        LittleEndian::read_u32_into(nonce, &mut state[13..16]);
        ChaCha20 { state, lanes: cpu::features().lane_width() }
    }

    /// XORs the keystream into `data`, encrypting or decrypting in place.
    /// The counter advances one per 64-byte block; trailing partial blocks
    /// are supported.
    pub fn apply_keystream(&mut self, mut data: &mut [u8]) {
        if self.lanes >= 8 {
            data = self.apply_wide::<8>(data);
        }
        if self.lanes >= 4 {
            data = self.apply_wide::<4>(data);
        }
        for chunk in data.chunks_mut(BLOCK_SIZE) {
            let mut keystream = [0u8; BLOCK_SIZE];
            block(&self.state, &mut keystream);
            self.state[12] = self.state[12].wrapping_add(1);
            for (b, k) in chunk.iter_mut().zip(keystream) {
                *b ^= k;
            }
        }
    }

    fn apply_wide<'d, const N: usize>(&mut self, data: &'d mut [u8]) -> &'d mut [u8] {
        let group = N * BLOCK_SIZE;
        let wide = data.len() / group * group;
        let (head, tail) = data.split_at_mut(wide);
        let mut keystream = [0u8; 512];
        for chunk in head.chunks_exact_mut(group) {
            block_parallel::<N>(&self.state, &mut keystream[..group]);
            self.state[12] = self.state[12].wrapping_add(N as u32);
            for (b, k) in chunk.iter_mut().zip(&keystream[..group]) {
                *b ^= k;
            }
        }
        tail
    }
}

#[inline(always)]
fn quarter(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(12);
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(7);
}

/// One keystream block: ten double-rounds (column then diagonal), then the
/// feed-forward sum, serialized little-endian.
fn block(input: &[u32; 16], out: &mut [u8; BLOCK_SIZE]) {
    let mut working = *input;
    for _ in 0..10 {
        quarter(&mut working, 0, 4, 8, 12);
        quarter(&mut working, 1, 5, 9, 13);
        quarter(&mut working, 2, 6, 10, 14);
        quarter(&mut working, 3, 7, 11, 15);
        quarter(&mut working, 0, 5, 10, 15);
        quarter(&mut working, 1, 6, 11, 12);
        quarter(&mut working, 2, 7, 8, 13);
        quarter(&mut working, 3, 4, 9, 14);
    }
    for (w, i) in working.iter_mut().zip(input) {
        *w = w.wrapping_add(*i);
    }
    LittleEndian::write_u32_into(&working, out);
}

#[inline(always)]
fn quarter_parallel<const N: usize>(
    state: &mut [[u32; N]; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
) {
    for l in 0..N {
        state[a][l] = state[a][l].wrapping_add(state[b][l]);
        state[d][l] = (state[d][l] ^ state[a][l]).rotate_left(16);
        state[c][l] = state[c][l].wrapping_add(state[d][l]);
        state[b][l] = (state[b][l] ^ state[c][l]).rotate_left(12);
        state[a][l] = state[a][l].wrapping_add(state[b][l]);
        state[d][l] = (state[d][l] ^ state[a][l]).rotate_left(8);
        state[c][l] = state[c][l].wrapping_add(state[d][l]);
        state[b][l] = (state[b][l] ^ state[c][l]).rotate_left(7);
    }
}

/// `N` keystream blocks in lockstep, lane `l` running counter `base + l`.
fn block_parallel<const N: usize>(input: &[u32; 16], out: &mut [u8]) {
    debug_assert_eq!(out.len(), N * BLOCK_SIZE);
    let mut lanes = [[0u32; N]; 16];
    for (w, lane) in input.iter().zip(lanes.iter_mut()) {
        *lane = [*w; N];
    }
    for (l, ctr) in lanes[12].iter_mut().enumerate() {
        *ctr = ctr.wrapping_add(l as u32);
    }
    let start = lanes;

    for _ in 0..10 {
        quarter_parallel(&mut lanes, 0, 4, 8, 12);
        quarter_parallel(&mut lanes, 1, 5, 9, 13);
        quarter_parallel(&mut lanes, 2, 6, 10, 14);
        quarter_parallel(&mut lanes, 3, 7, 11, 15);
        quarter_parallel(&mut lanes, 0, 5, 10, 15);
        quarter_parallel(&mut lanes, 1, 6, 11, 12);
        quarter_parallel(&mut lanes, 2, 7, 8, 13);
        quarter_parallel(&mut lanes, 3, 4, 9, 14);
    }

    for l in 0..N {
        for w in 0..16 {
            let v = lanes[w][l].wrapping_add(start[w][l]);
            LittleEndian::write_u32(&mut out[l * BLOCK_SIZE + 4 * w..], v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8439 2.3.2-style zero vector: the well-known first keystream
    // block for an all-zero key, nonce, and counter.
    #[test]
    fn zero_key_kat() {
        let mut data = [0u8; 64];
        ChaCha20::new(&[0u8; 32], &[0u8; 12], 0).apply_keystream(&mut data);
        assert_eq!(
            data.to_vec(),
            hex::decode(
                "76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7\
                 da41597c5157488d7724e03fb8d84a376a43b8f41518a11cc387b669b2ee6586"
            )
            .unwrap()
        );
    }

    // RFC 8439 2.4.2.
    #[test]
    fn rfc8439_encryption_kat() {
        let key: [u8; 32] = core::array::from_fn(|i| i as u8);
        let nonce: [u8; 12] =
            hex::decode("000000000000004a00000000").unwrap().try_into().unwrap();
        let mut data = b"Ladies and Gentlemen of the class of '99: If I could offer you \
only one tip for the future, sunscreen would be it."
            .to_vec();
        ChaCha20::new(&key, &nonce, 1).apply_keystream(&mut data);
        assert_eq!(
            data[..32].to_vec(),
            hex::decode("6e2e359a2568f98041ba0728dd0d6981e97e7aec1d4360c20a27afccfd9fae0b")
                .unwrap()
        );
    }

    #[test]
    fn round_trip() {
        let key = [7u8; 32];
        let nonce = [9u8; 12];
        let plaintext: Vec<u8> = (0..1337u32).map(|i| i as u8).collect();
        let mut data = plaintext.clone();
        ChaCha20::new(&key, &nonce, 0).apply_keystream(&mut data);
        assert_ne!(data, plaintext);
        ChaCha20::new(&key, &nonce, 0).apply_keystream(&mut data);
        assert_eq!(data, plaintext);
    }

    // The wide paths must produce the same stream as block-at-a-time
    // scalar encryption.
    #[test]
    fn wide_blocks_match_scalar() {
        let key = [0x42u8; 32];
        let nonce = [0x24u8; 12];

        let mut whole = vec![0u8; 8 * BLOCK_SIZE + 13];
        ChaCha20::new(&key, &nonce, 5).apply_keystream(&mut whole);

        let mut blockwise = vec![0u8; 8 * BLOCK_SIZE + 13];
        let mut cipher = ChaCha20::new(&key, &nonce, 5);
        for chunk in blockwise.chunks_mut(BLOCK_SIZE) {
            cipher.apply_keystream(chunk);
        }
        assert_eq!(whole, blockwise);
    }

    #[test]
    fn short_key_variant_diverges() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        ChaCha20::new(&[0u8; 32], &[0u8; 12], 0).apply_keystream(&mut a);
        ChaCha20::new_128(&[0u8; 16], &[0u8; 12], 0).apply_keystream(&mut b);
        assert_ne!(a, b);
    }
}
