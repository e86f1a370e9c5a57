//! The Poly1305 one-time authenticator over GF(2¹³⁰−5).
//!
//! A key authenticates at most one message. The 26-bit-limb schedule keeps
//! every partial product inside a `u64`, so the reduction needs no
//! secret-dependent branches.

use byteorder::{ByteOrder, LittleEndian};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The tag length in bytes.
pub const TAG_SIZE: usize = 16;
/// The one-time key length in bytes.
pub const KEY_SIZE: usize = 32;

const MASK: u32 = 0x03ff_ffff;

/// A single-use Poly1305 state: the clamped multiplier `r`, the final
/// addend `s`, the 130-bit accumulator, and a partial-block buffer.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Poly1305 {
    r: [u32; 5],
    s: [u32; 4],
    h: [u32; 5],
    buffer: [u8; TAG_SIZE],
    buffered: usize,
}

impl Poly1305 {
    /// Returns a new state keyed with the 32-byte one-time key. The first
    /// half is clamped into `r`; the second half is the final addend.
    pub fn new(key: &[u8; KEY_SIZE]) -> Poly1305 {
        let r = [
            LittleEndian::read_u32(&key[0..4]) & 0x03ff_ffff,
            (LittleEndian::read_u32(&key[3..7]) >> 2) & 0x03ff_ff03,
            (LittleEndian::read_u32(&key[6..10]) >> 4) & 0x03ff_c0ff,
            (LittleEndian::read_u32(&key[9..13]) >> 6) & 0x03f0_3fff,
            (LittleEndian::read_u32(&key[12..16]) >> 8) & 0x000f_ffff,
        ];
        let mut s = [0u32; 4];
        LittleEndian::read_u32_into(&key[16..32], &mut s);
        Poly1305 { r, s, h: [0u32; 5], buffer: [0u8; TAG_SIZE], buffered: 0 }
    }

    /// Absorbs the given slice.
    pub fn update(&mut self, mut data: &[u8]) {
        if self.buffered > 0 {
            let take = data.len().min(TAG_SIZE - self.buffered);
            self.buffer[self.buffered..self.buffered + take].copy_from_slice(&data[..take]);
            self.buffered += take;
            data = &data[take..];
            if self.buffered == TAG_SIZE {
                let block = self.buffer;
                self.block(&block, 1 << 24);
                self.buffered = 0;
            }
        }
        while data.len() >= TAG_SIZE {
            let (block, rest) = data.split_at(TAG_SIZE);
            self.block(block.try_into().unwrap(), 1 << 24);
            data = rest;
        }
        self.buffer[..data.len()].copy_from_slice(data);
        self.buffered = data.len();
    }

    // Adds one 17-byte integer (the block plus the marker bit) into the
    // accumulator and multiplies by r mod 2^130-5.
    fn block(&mut self, block: &[u8; TAG_SIZE], hibit: u32) {
        let [r0, r1, r2, r3, r4] = self.r.map(u64::from);
        let (x1, x2, x3, x4) = (5 * r1, 5 * r2, 5 * r3, 5 * r4);

        let h0 = u64::from(self.h[0] + (LittleEndian::read_u32(&block[0..4]) & MASK));
        let h1 = u64::from(self.h[1] + ((LittleEndian::read_u32(&block[3..7]) >> 2) & MASK));
        let h2 = u64::from(self.h[2] + ((LittleEndian::read_u32(&block[6..10]) >> 4) & MASK));
        let h3 = u64::from(self.h[3] + ((LittleEndian::read_u32(&block[9..13]) >> 6) & MASK));
        let h4 = u64::from(self.h[4] + ((LittleEndian::read_u32(&block[12..16]) >> 8) | hibit));

        let d0 = h0 * r0 + h1 * x4 + h2 * x3 + h3 * x2 + h4 * x1;
        let d1 = h0 * r1 + h1 * r0 + h2 * x4 + h3 * x3 + h4 * x2;
        let d2 = h0 * r2 + h1 * r1 + h2 * r0 + h3 * x4 + h4 * x3;
        let d3 = h0 * r3 + h1 * r2 + h2 * r1 + h3 * r0 + h4 * x4;
        let d4 = h0 * r4 + h1 * r3 + h2 * r2 + h3 * r1 + h4 * r0;

        let mut c;
        let mut d1 = d1;
        let mut d2 = d2;
        let mut d3 = d3;
        let mut d4 = d4;
        c = d0 >> 26;
        self.h[0] = d0 as u32 & MASK;
        d1 += c;
        c = d1 >> 26;
        self.h[1] = d1 as u32 & MASK;
        d2 += c;
        c = d2 >> 26;
        self.h[2] = d2 as u32 & MASK;
        d3 += c;
        c = d3 >> 26;
        self.h[3] = d3 as u32 & MASK;
        d4 += c;
        c = d4 >> 26;
        self.h[4] = d4 as u32 & MASK;
        self.h[0] += (c as u32) * 5;
        let c = self.h[0] >> 26;
        self.h[0] &= MASK;
        self.h[1] += c;
    }

    /// Pads any final short block with `0x01 ‖ 0…`, fully reduces the
    /// accumulator, adds `s` mod 2¹²⁸, and serializes the tag
    /// little-endian.
    pub fn finalize(mut self) -> [u8; TAG_SIZE] {
        if self.buffered > 0 {
            let mut block = [0u8; TAG_SIZE];
            block[..self.buffered].copy_from_slice(&self.buffer[..self.buffered]);
            block[self.buffered] = 0x01;
            self.block(&block, 0);
            block.zeroize();
        }

        let [mut h0, mut h1, mut h2, mut h3, mut h4] = self.h;
        let mut c;
        c = h1 >> 26;
        h1 &= MASK;
        h2 += c;
        c = h2 >> 26;
        h2 &= MASK;
        h3 += c;
        c = h3 >> 26;
        h3 &= MASK;
        h4 += c;
        c = h4 >> 26;
        h4 &= MASK;
        h0 += c * 5;
        c = h0 >> 26;
        h0 &= MASK;
        h1 += c;

        // compute h + 5 - 2^130 and select it without branching if there
        // was no borrow
        let mut g0 = h0.wrapping_add(5);
        c = g0 >> 26;
        g0 &= MASK;
        let mut g1 = h1.wrapping_add(c);
        c = g1 >> 26;
        g1 &= MASK;
        let mut g2 = h2.wrapping_add(c);
        c = g2 >> 26;
        g2 &= MASK;
        let mut g3 = h3.wrapping_add(c);
        c = g3 >> 26;
        g3 &= MASK;
        let g4 = h4.wrapping_add(c).wrapping_sub(1 << 26);

        let select = (g4 >> 31).wrapping_sub(1);
        h0 = (h0 & !select) | (g0 & select);
        h1 = (h1 & !select) | (g1 & select);
        h2 = (h2 & !select) | (g2 & select);
        h3 = (h3 & !select) | (g3 & select);
        h4 = (h4 & !select) | (g4 & select);

        let words = [
            h0 | (h1 << 26),
            (h1 >> 6) | (h2 << 20),
            (h2 >> 12) | (h3 << 14),
            (h3 >> 18) | (h4 << 8),
        ];

        let mut tag = [0u8; TAG_SIZE];
        let mut carry = 0u64;
        for (i, (w, s)) in words.iter().zip(self.s).enumerate() {
            let f = u64::from(*w) + u64::from(s) + carry;
            LittleEndian::write_u32(&mut tag[4 * i..], f as u32);
            carry = f >> 32;
        }
        tag
    }

    /// One-shot authenticator computation.
    pub fn compute(key: &[u8; KEY_SIZE], message: &[u8]) -> [u8; TAG_SIZE] {
        let mut mac = Poly1305::new(key);
        mac.update(message);
        mac.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_key_empty_message_is_zero() {
        assert_eq!(Poly1305::compute(&[0u8; 32], b""), [0u8; 16]);
    }

    // RFC 8439 2.5.2.
    #[test]
    fn rfc8439_kat() {
        let key: [u8; 32] =
            hex::decode("85d6be7857556d337f4452fe42d506a80103808afb0db2fd4abff6af4149f51b")
                .unwrap()
                .try_into()
                .unwrap();
        assert_eq!(
            Poly1305::compute(&key, b"Cryptographic Forum Research Group").to_vec(),
            hex::decode("a8061dc1305136c6c22b8baf0c0127a9").unwrap()
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let key: [u8; 32] = core::array::from_fn(|i| (i * 7 + 1) as u8);
        let msg: Vec<u8> = (0..517u32).map(|i| (i % 251) as u8).collect();
        let mut mac = Poly1305::new(&key);
        for chunk in msg.chunks(23) {
            mac.update(chunk);
        }
        assert_eq!(mac.finalize(), Poly1305::compute(&key, &msg));
    }

    #[test]
    fn high_bit_keys_reduce_correctly() {
        let key = [0xffu8; 32];
        let msg = [0xffu8; 64];
        let tag = Poly1305::compute(&key, &msg);
        assert_eq!(tag, Poly1305::compute(&key, &msg));
    }
}
