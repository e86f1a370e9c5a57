//! The RCS authenticated wide-block cipher: a 256-bit-block Rijndael
//! variant in counter mode, keyed through cSHAKE and authenticated with
//! KMAC.
//!
//! The cSHAKE expansion replaces the FIPS-197 key schedule entirely: one
//! keyed squeeze fills the round keys and then the MAC key, so the cipher
//! and authenticator are domain-separated from a single root key.
//! Decryption recomputes the tag over the received ciphertext first and
//! only performs the stream transform when the comparison (constant-time)
//! succeeds.

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::aes::{xtime, S_BOX};
use crate::keccak::{RATE_256, RATE_512};
use crate::kmac::Kmac;
use crate::sha3::CShake;
use crate::Error;

/// The Rijndael-256 block size in bytes.
pub const BLOCK_SIZE: usize = 32;
/// The nonce length in bytes.
pub const NONCE_SIZE: usize = 16;

const COLUMNS: usize = 8;
// ShiftRows offsets for an eight-column Rijndael state.
const ROW_OFFSETS: [usize; 4] = [0, 1, 3, 4];

/// The Rijndael-256 round-key schedule, filled from a keyed XOF rather
/// than the FIPS-197 recursion. `NR1` is rounds + 1.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct WideCipher<const NR1: usize> {
    round_keys: [[u8; BLOCK_SIZE]; NR1],
}

impl<const NR1: usize> WideCipher<NR1> {
    fn from_xof<const RATE: usize>(xof: &mut CShake<RATE>) -> Self {
        let mut round_keys = [[0u8; BLOCK_SIZE]; NR1];
        for rk in round_keys.iter_mut() {
            xof.squeeze(rk);
        }
        WideCipher { round_keys }
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let rounds = NR1 - 1;
        add_round_key(block, &self.round_keys[0]);
        for r in 1..rounds {
            sub_bytes(block);
            shift_rows(block);
            mix_columns(block);
            add_round_key(block, &self.round_keys[r]);
        }
        sub_bytes(block);
        shift_rows(block);
        add_round_key(block, &self.round_keys[rounds]);
    }
}

fn add_round_key(block: &mut [u8; BLOCK_SIZE], rk: &[u8; BLOCK_SIZE]) {
    for (b, k) in block.iter_mut().zip(rk) {
        *b ^= k;
    }
}

fn sub_bytes(block: &mut [u8; BLOCK_SIZE]) {
    for b in block.iter_mut() {
        *b = S_BOX[*b as usize];
    }
}

// Column-major state, eight columns; row r rotates left by its offset.
fn shift_rows(block: &mut [u8; BLOCK_SIZE]) {
    for r in 1..4 {
        let mut row = [0u8; COLUMNS];
        for c in 0..COLUMNS {
            row[c] = block[r + 4 * c];
        }
        for c in 0..COLUMNS {
            block[r + 4 * c] = row[(c + ROW_OFFSETS[r]) % COLUMNS];
        }
    }
}

fn mix_columns(block: &mut [u8; BLOCK_SIZE]) {
    for col in block.chunks_exact_mut(4) {
        let (a0, a1, a2, a3) = (col[0], col[1], col[2], col[3]);
        col[0] = xtime(a0) ^ xtime(a1) ^ a1 ^ a2 ^ a3;
        col[1] = a0 ^ xtime(a1) ^ xtime(a2) ^ a2 ^ a3;
        col[2] = a0 ^ a1 ^ xtime(a2) ^ xtime(a3) ^ a3;
        col[3] = xtime(a0) ^ a0 ^ a1 ^ a2 ^ xtime(a3);
    }
}

macro_rules! rcs_impl {
    (
        $name:ident, $rate:ident, $nr1:literal, $key_size:literal, $tag_size:literal,
        $doc:literal
    ) => {
        #[doc = $doc]
        pub struct $name {
            cipher: WideCipher<$nr1>,
            mac: Kmac<$rate>,
            counter: [u8; BLOCK_SIZE],
            info: Zeroizing<Vec<u8>>,
        }

        impl $name {
            /// The key length in bytes.
            pub const KEY_SIZE: usize = $key_size;
            /// The appended tag length in bytes.
            pub const TAG_SIZE: usize = $tag_size;

            /// Derives the round-key schedule and MAC key from `key` via a
            /// keyed cSHAKE pass, and seeds the counter block with the
            /// nonce. An `(info, nonce)` pair must never repeat under the
            /// same key.
            pub fn new(
                key: &[u8; $key_size],
                nonce: &[u8; NONCE_SIZE],
                info: Option<&[u8]>,
            ) -> Self {
                let info = info.unwrap_or_default();
                let mut xof = CShake::<$rate>::new(b"RCS", info);
                xof.absorb(key);

                let cipher = WideCipher::from_xof(&mut xof);
                let mut mac_key = Zeroizing::new([0u8; $tag_size]);
                xof.squeeze(mac_key.as_mut());

                let mut counter = [0u8; BLOCK_SIZE];
                counter[..NONCE_SIZE].copy_from_slice(nonce);

                let mut mac = Kmac::<$rate>::new(mac_key.as_ref(), b"");
                mac.update(nonce);

                $name { cipher, mac, counter, info: Zeroizing::new(info.to_vec()) }
            }

            /// Absorbs associated data into the MAC. Must be called before
            /// the transform; it may be called more than once.
            pub fn set_associated(&mut self, aad: &[u8]) {
                self.mac.update(aad);
            }

            /// Encrypts `plaintext` and returns `ciphertext ‖ tag`.
            pub fn encrypt(self, plaintext: &[u8]) -> Vec<u8> {
                let $name { cipher, mut mac, mut counter, info } = self;

                let mut out = vec![0u8; plaintext.len() + Self::TAG_SIZE];
                let (ct, tag) = out.split_at_mut(plaintext.len());
                ct.copy_from_slice(plaintext);
                Self::transform(&cipher, &mut counter, ct);

                mac.update(ct);
                mac.update(&info);
                mac.update(&u64::to_le_bytes(ct.len() as u64));
                mac.finalize(tag);
                out
            }

            /// Verifies the tag over the received ciphertext and, only on
            /// success, decrypts and returns the plaintext. A mismatch
            /// yields [`Error::AuthFailure`] and releases nothing.
            pub fn decrypt(self, input: &[u8]) -> Result<Vec<u8>, Error> {
                if input.len() < Self::TAG_SIZE {
                    return Err(Error::InvalidParameter);
                }
                let $name { cipher, mut mac, mut counter, info } = self;
                let (ct, tag) = input.split_at(input.len() - Self::TAG_SIZE);

                mac.update(ct);
                mac.update(&info);
                mac.update(&u64::to_le_bytes(ct.len() as u64));
                let mut expected = Zeroizing::new([0u8; $tag_size]);
                mac.finalize(expected.as_mut());

                if !bool::from(expected.as_ref().ct_eq(tag)) {
                    return Err(Error::AuthFailure);
                }

                let mut out = ct.to_vec();
                Self::transform(&cipher, &mut counter, &mut out);
                Ok(out)
            }

            // CTR over the wide block: the low 64 bits of the counter half
            // increment little-endian, wrapping within a message.
            fn transform(
                cipher: &WideCipher<$nr1>,
                counter: &mut [u8; BLOCK_SIZE],
                data: &mut [u8],
            ) {
                for chunk in data.chunks_mut(BLOCK_SIZE) {
                    let mut keystream = *counter;
                    cipher.encrypt_block(&mut keystream);
                    for (b, k) in chunk.iter_mut().zip(keystream) {
                        *b ^= k;
                    }
                    let low: [u8; 8] = counter[NONCE_SIZE..NONCE_SIZE + 8].try_into().unwrap();
                    let next = u64::from_le_bytes(low).wrapping_add(1);
                    counter[NONCE_SIZE..NONCE_SIZE + 8].copy_from_slice(&next.to_le_bytes());
                }
            }
        }
    };
}

rcs_impl!(
    Rcs256,
    RATE_256,
    23,
    32,
    32,
    "RCS-256: 22 rounds, cSHAKE-256 key expansion, KMAC-256 tag."
);
rcs_impl!(
    Rcs512,
    RATE_512,
    31,
    64,
    64,
    "RCS-512: 30 rounds, cSHAKE-512 key expansion, KMAC-512 tag."
);

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher_256() -> Rcs256 {
        Rcs256::new(&[0x01; 32], &[0x02; 16], Some(b"test"))
    }

    #[test]
    fn round_trip_with_aad() {
        let plaintext = [0x03u8; 100];
        let mut enc = cipher_256();
        enc.set_associated(b"aad");
        let sealed = enc.encrypt(&plaintext);
        assert_eq!(sealed.len(), plaintext.len() + Rcs256::TAG_SIZE);

        let mut dec = cipher_256();
        dec.set_associated(b"aad");
        assert_eq!(dec.decrypt(&sealed).unwrap(), plaintext.to_vec());
    }

    #[test]
    fn tampered_tag_fails() {
        let mut enc = cipher_256();
        enc.set_associated(b"aad");
        let mut sealed = enc.encrypt(&[0x03u8; 100]);
        sealed[100] ^= 1;

        let mut dec = cipher_256();
        dec.set_associated(b"aad");
        assert_eq!(dec.decrypt(&sealed), Err(Error::AuthFailure));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        for flip in [0, 50, 99] {
            let sealed = cipher_256().encrypt(&[0x03u8; 100]);
            let mut bad = sealed.clone();
            bad[flip] ^= 0x80;
            assert_eq!(cipher_256().decrypt(&bad), Err(Error::AuthFailure));
        }
    }

    #[test]
    fn tampered_aad_fails() {
        let mut enc = cipher_256();
        enc.set_associated(b"aad");
        let sealed = enc.encrypt(&[0x03u8; 100]);

        let mut dec = cipher_256();
        dec.set_associated(b"bad");
        assert_eq!(dec.decrypt(&sealed), Err(Error::AuthFailure));

        // Dropping the AAD entirely must also fail.
        assert_eq!(cipher_256().decrypt(&sealed), Err(Error::AuthFailure));
    }

    #[test]
    fn info_separates_streams() {
        let a = Rcs256::new(&[1; 32], &[2; 16], Some(b"one")).encrypt(&[0u8; 64]);
        let b = Rcs256::new(&[1; 32], &[2; 16], Some(b"two")).encrypt(&[0u8; 64]);
        assert_ne!(a[..64], b[..64]);
    }

    #[test]
    fn rcs512_round_trip() {
        let key = [0x55u8; 64];
        let nonce = [0xaau8; 16];
        let plaintext: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

        let sealed = Rcs512::new(&key, &nonce, None).encrypt(&plaintext);
        assert_eq!(sealed.len(), plaintext.len() + Rcs512::TAG_SIZE);
        assert_eq!(Rcs512::new(&key, &nonce, None).decrypt(&sealed).unwrap(), plaintext);

        let mut bad = sealed.clone();
        *bad.last_mut().unwrap() ^= 1;
        assert_eq!(Rcs512::new(&key, &nonce, None).decrypt(&bad), Err(Error::AuthFailure));
    }

    #[test]
    fn empty_plaintext_authenticates() {
        let sealed = cipher_256().encrypt(b"");
        assert_eq!(sealed.len(), Rcs256::TAG_SIZE);
        assert_eq!(cipher_256().decrypt(&sealed).unwrap(), Vec::<u8>::new());
    }
}
