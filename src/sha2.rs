//! The SHA-2 hashes (FIPS-180), HMAC (RFC 2104), and HKDF (RFC 5869).
//!
//! These carry the non-Keccak half of the hash surface: HMAC-SHA2 keyed
//! authentication and HKDF extract/expand key derivation.

use byteorder::{BigEndian, ByteOrder};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Error;

const K256: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

const K512: [u64; 80] = [
    0x428a2f98d728ae22, 0x7137449123ef65cd, 0xb5c0fbcfec4d3b2f, 0xe9b5dba58189dbbc,
    0x3956c25bf348b538, 0x59f111f1b605d019, 0x923f82a4af194f9b, 0xab1c5ed5da6d8118,
    0xd807aa98a3030242, 0x12835b0145706fbe, 0x243185be4ee4b28c, 0x550c7dc3d5ffb4e2,
    0x72be5d74f27b896f, 0x80deb1fe3b1696b1, 0x9bdc06a725c71235, 0xc19bf174cf692694,
    0xe49b69c19ef14ad2, 0xefbe4786384f25e3, 0x0fc19dc68b8cd5b5, 0x240ca1cc77ac9c65,
    0x2de92c6f592b0275, 0x4a7484aa6ea6e483, 0x5cb0a9dcbd41fbd4, 0x76f988da831153b5,
    0x983e5152ee66dfab, 0xa831c66d2db43210, 0xb00327c898fb213f, 0xbf597fc7beef0ee4,
    0xc6e00bf33da88fc2, 0xd5a79147930aa725, 0x06ca6351e003826f, 0x142929670a0e6e70,
    0x27b70a8546d22ffc, 0x2e1b21385c26c926, 0x4d2c6dfc5ac42aed, 0x53380d139d95b3df,
    0x650a73548baf63de, 0x766a0abb3c77b2a8, 0x81c2c92e47edaee6, 0x92722c851482353b,
    0xa2bfe8a14cf10364, 0xa81a664bbc423001, 0xc24b8b70d0f89791, 0xc76c51a30654be30,
    0xd192e819d6ef5218, 0xd69906245565a910, 0xf40e35855771202a, 0x106aa07032bbd1b8,
    0x19a4c116b8d2d0c8, 0x1e376c085141ab53, 0x2748774cdf8eeb99, 0x34b0bcb5e19b48a8,
    0x391c0cb3c5c95a63, 0x4ed8aa4ae3418acb, 0x5b9cca4f7763e373, 0x682e6ff3d6b2b8a3,
    0x748f82ee5defb2fc, 0x78a5636f43172f60, 0x84c87814a1f0ab72, 0x8cc702081a6439ec,
    0x90befffa23631e28, 0xa4506cebde82bde9, 0xbef9a3f7b2c67915, 0xc67178f2e372532b,
    0xca273eceea26619c, 0xd186b8c721c0c207, 0xeada7dd6cde0eb1e, 0xf57d4f7fee6ed178,
    0x06f067aa72176fba, 0x0a637dc5a2c898a6, 0x113f9804bef90dae, 0x1b710b35131c471b,
    0x28db77f523047d84, 0x32caab7b40c72493, 0x3c9ebe0a15c9bebc, 0x431d67c49c100d4c,
    0x4cc5d4becb3e42b6, 0x597f299cfc657e2a, 0x5fcb6fab3ad6faec, 0x6c44198c4a475817,
];

const H256: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

const H512: [u64; 8] = [
    0x6a09e667f3bcc908, 0xbb67ae8584caa73b, 0x3c6ef372fe94f82b, 0xa54ff53a5f1d36f1,
    0x510e527fade682d1, 0x9b05688c2b3e6c1f, 0x1f83d9abfb41bd6b, 0x5be0cd19137e2179,
];

macro_rules! sha2_impl {
    (
        $name:ident, $one_shot:ident, $word:ty, $block:literal, $digest:literal,
        $rounds:literal, $k:ident, $h0:ident, $read:ident, $write:ident,
        $s0:expr, $s1:expr, $e0:expr, $e1:expr, $doc:literal
    ) => {
        #[doc = $doc]
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name {
            state: [$word; 8],
            buffer: [u8; $block],
            buffered: usize,
            total: u128,
        }

        impl Default for $name {
            fn default() -> Self {
                $name { state: $h0, buffer: [0u8; $block], buffered: 0, total: 0 }
            }
        }

        impl $name {
            /// Returns a new hash state.
            pub fn new() -> Self {
                Self::default()
            }

            /// Absorbs the given slice.
            pub fn update(&mut self, mut data: &[u8]) {
                self.total += data.len() as u128;
                if self.buffered > 0 {
                    let take = data.len().min($block - self.buffered);
                    self.buffer[self.buffered..self.buffered + take]
                        .copy_from_slice(&data[..take]);
                    self.buffered += take;
                    data = &data[take..];
                    if self.buffered == $block {
                        let block = self.buffer;
                        self.compress(&block);
                        self.buffered = 0;
                    }
                }
                while data.len() >= $block {
                    let (block, rest) = data.split_at($block);
                    self.compress(block.try_into().unwrap());
                    data = rest;
                }
                self.buffer[..data.len()].copy_from_slice(data);
                self.buffered = data.len();
            }

            /// Pads and returns the digest.
            pub fn finalize(mut self) -> [u8; $digest] {
                let bits = self.total * 8;
                let mut pad = [0u8; $block + $block / 8];
                pad[0] = 0x80;
                // pad to a block boundary leaving room for the length field
                let len_bytes = $block / 8;
                let pad_len = $block - ((self.buffered + len_bytes) % $block);
                let total = pad_len + len_bytes;
                for (i, b) in pad[pad_len..total].iter_mut().enumerate() {
                    *b = (bits >> (8 * (len_bytes - 1 - i))) as u8;
                }
                self.update_no_count(&pad[..total]);

                let mut digest = [0u8; $digest];
                for (chunk, word) in digest.chunks_mut(core::mem::size_of::<$word>()).zip(self.state)
                {
                    BigEndian::$write(chunk, word);
                }
                digest
            }

            fn update_no_count(&mut self, data: &[u8]) {
                let total = self.total;
                self.update(data);
                self.total = total;
            }

            fn compress(&mut self, block: &[u8; $block]) {
                let mut w = [0 as $word; $rounds];
                for (i, chunk) in block.chunks(core::mem::size_of::<$word>()).enumerate() {
                    w[i] = BigEndian::$read(chunk);
                }
                for t in 16..$rounds {
                    w[t] = $s1(w[t - 2])
                        .wrapping_add(w[t - 7])
                        .wrapping_add($s0(w[t - 15]))
                        .wrapping_add(w[t - 16]);
                }

                let [mut a, mut b, mut c, mut d, mut e, mut f, mut g, mut h] = self.state;
                for t in 0..$rounds {
                    let t1 = h
                        .wrapping_add($e1(e))
                        .wrapping_add((e & f) ^ (!e & g))
                        .wrapping_add($k[t])
                        .wrapping_add(w[t]);
                    let t2 = $e0(a).wrapping_add((a & b) ^ (a & c) ^ (b & c));
                    h = g;
                    g = f;
                    f = e;
                    e = d.wrapping_add(t1);
                    d = c;
                    c = b;
                    b = a;
                    a = t1.wrapping_add(t2);
                }

                for (s, v) in self.state.iter_mut().zip([a, b, c, d, e, f, g, h]) {
                    *s = s.wrapping_add(v);
                }
            }
        }

        #[doc = concat!("Computes ", stringify!($name), " of the given slice.")]
        pub fn $one_shot(data: &[u8]) -> [u8; $digest] {
            let mut h = $name::new();
            h.update(data);
            h.finalize()
        }
    };
}

sha2_impl!(
    Sha256,
    sha256,
    u32,
    64,
    32,
    64,
    K256,
    H256,
    read_u32,
    write_u32,
    |x: u32| x.rotate_right(7) ^ x.rotate_right(18) ^ (x >> 3),
    |x: u32| x.rotate_right(17) ^ x.rotate_right(19) ^ (x >> 10),
    |x: u32| x.rotate_right(2) ^ x.rotate_right(13) ^ x.rotate_right(22),
    |x: u32| x.rotate_right(6) ^ x.rotate_right(11) ^ x.rotate_right(25),
    "SHA-256."
);

sha2_impl!(
    Sha512,
    sha512,
    u64,
    128,
    64,
    80,
    K512,
    H512,
    read_u64,
    write_u64,
    |x: u64| x.rotate_right(1) ^ x.rotate_right(8) ^ (x >> 7),
    |x: u64| x.rotate_right(19) ^ x.rotate_right(61) ^ (x >> 6),
    |x: u64| x.rotate_right(28) ^ x.rotate_right(34) ^ x.rotate_right(39),
    |x: u64| x.rotate_right(14) ^ x.rotate_right(18) ^ x.rotate_right(41),
    "SHA-512."
);

macro_rules! hmac_impl {
    ($name:ident, $hash:ident, $one_shot:ident, $block:literal, $digest:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name {
            inner: $hash,
            opad: [u8; $block],
        }

        impl $name {
            /// Returns a new MAC state keyed with `key`. Keys longer than
            /// the block size are hashed first, per RFC 2104.
            pub fn new(key: &[u8]) -> Self {
                let mut padded = [0u8; $block];
                if key.len() > $block {
                    padded[..$digest].copy_from_slice(&$one_shot(key));
                } else {
                    padded[..key.len()].copy_from_slice(key);
                }

                let mut ipad = [0u8; $block];
                let mut opad = [0u8; $block];
                for i in 0..$block {
                    ipad[i] = padded[i] ^ 0x36;
                    opad[i] = padded[i] ^ 0x5c;
                }
                padded.zeroize();

                let mut inner = $hash::new();
                inner.update(&ipad);
                ipad.zeroize();
                $name { inner, opad }
            }

            /// Absorbs the given slice.
            pub fn update(&mut self, data: &[u8]) {
                self.inner.update(data);
            }

            /// Returns the authentication tag.
            pub fn finalize(mut self) -> [u8; $digest] {
                let inner = core::mem::take(&mut self.inner).finalize();
                let mut outer = $hash::new();
                outer.update(&self.opad);
                outer.update(&inner);
                outer.finalize()
            }

            /// One-shot MAC computation.
            pub fn compute(key: &[u8], message: &[u8]) -> [u8; $digest] {
                let mut mac = Self::new(key);
                mac.update(message);
                mac.finalize()
            }
        }
    };
}

hmac_impl!(HmacSha256, Sha256, sha256, 64, 32, "HMAC-SHA2-256.");
hmac_impl!(HmacSha512, Sha512, sha512, 128, 64, "HMAC-SHA2-512.");

macro_rules! hkdf_impl {
    ($extract:ident, $expand:ident, $hmac:ident, $digest:literal, $tag:literal) => {
        #[doc = concat!("HKDF-Extract over HMAC-SHA2-", $tag, ".")]
        pub fn $extract(salt: &[u8], ikm: &[u8]) -> [u8; $digest] {
            $hmac::compute(salt, ikm)
        }

        #[doc = concat!("HKDF-Expand over HMAC-SHA2-", $tag, ".")]
        pub fn $expand(prk: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), Error> {
            if okm.len() > 255 * $digest {
                return Err(Error::LengthOverflow);
            }
            let mut previous: Option<[u8; $digest]> = None;
            for (block, chunk) in okm.chunks_mut($digest).enumerate() {
                let mut mac = $hmac::new(prk);
                if let Some(prev) = &previous {
                    mac.update(prev);
                }
                mac.update(info);
                mac.update(&[block as u8 + 1]);
                let t = mac.finalize();
                chunk.copy_from_slice(&t[..chunk.len()]);
                previous = Some(t);
            }
            Ok(())
        }
    };
}

hkdf_impl!(hkdf256_extract, hkdf256_expand, HmacSha256, 32, "256");
hkdf_impl!(hkdf512_extract, hkdf512_expand, HmacSha512, 64, "512");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_kats() {
        assert_eq!(
            sha256(b"").to_vec(),
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap()
        );
        assert_eq!(
            sha256(b"abc").to_vec(),
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .unwrap()
        );
    }

    #[test]
    fn sha512_kats() {
        assert_eq!(
            sha512(b"abc").to_vec(),
            hex::decode(
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
                 2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
            )
            .unwrap()
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = vec![0xabu8; 700];
        let mut h = Sha512::new();
        for chunk in data.chunks(111) {
            h.update(chunk);
        }
        assert_eq!(h.finalize(), sha512(&data));
    }

    // RFC 4231 cases 1 and 2.
    #[test]
    fn hmac_kats() {
        assert_eq!(
            HmacSha256::compute(&[0x0b; 20], b"Hi There").to_vec(),
            hex::decode("b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7")
                .unwrap()
        );
        assert_eq!(
            HmacSha512::compute(&[0x0b; 20], b"Hi There").to_vec(),
            hex::decode(
                "87aa7cdea5ef619d4ff0b4241a1d6cb02379f4e2ce4ec2787ad0b30545e17cde\
                 daa833b7d6b8a702038b274eaea3f4e4be9d914eeb61f1702e696c203a126854"
            )
            .unwrap()
        );
        assert_eq!(
            HmacSha256::compute(b"Jefe", b"what do ya want for nothing?").to_vec(),
            hex::decode("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
                .unwrap()
        );
    }

    #[test]
    fn hkdf_expands_deterministically() {
        let prk = hkdf256_extract(b"salt", b"input keying material");
        let mut a = [0u8; 100];
        let mut b = [0u8; 100];
        hkdf256_expand(&prk, b"ctx", &mut a).unwrap();
        hkdf256_expand(&prk, b"ctx", &mut b).unwrap();
        assert_eq!(a, b);

        let mut c = [0u8; 100];
        hkdf256_expand(&prk, b"other", &mut c).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn hkdf_expand_rejects_oversize() {
        let prk = hkdf512_extract(b"", b"ikm");
        let mut okm = vec![0u8; 255 * 64 + 1];
        assert_eq!(hkdf512_expand(&prk, b"", &mut okm), Err(Error::LengthOverflow));
    }
}
