//! The CSX-512 authenticated stream cipher: a ChaCha-shaped permutation
//! over sixteen 64-bit words (1024-bit state) with a 512-bit key, 128-bit
//! nonce, 128-bit counter, and 256 bits of domain constants.
//!
//! Forty rounds (twenty double-rounds) of the 64-bit quarter-round produce
//! 128-byte keystream blocks. The stream key and KMAC-512 tag key are both
//! derived from the user key in one cSHAKE-512 pass, mirroring the RCS
//! discipline: verify first, decrypt only on success.

use byteorder::{ByteOrder, LittleEndian};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::keccak::RATE_512;
use crate::kmac::Kmac;
use crate::sha3::CShake;
use crate::Error;

/// The CSX keystream block size in bytes.
pub const BLOCK_SIZE: usize = 128;
/// The key length in bytes.
pub const KEY_SIZE: usize = 64;
/// The nonce length in bytes.
pub const NONCE_SIZE: usize = 16;
/// The appended tag length in bytes.
pub const TAG_SIZE: usize = 64;

const DOUBLE_ROUNDS: usize = 20;
const CONSTANTS: &[u8; 32] = b"CSX-512 authenticated stream v1 ";

/// The CSX-512 cipher state and its authenticating KMAC.
pub struct Csx512 {
    state: CsxState,
    mac: Kmac<RATE_512>,
    info: Zeroizing<Vec<u8>>,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct CsxState([u64; 16]);

impl CsxState {
    fn new(stream_key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE]) -> CsxState {
        let mut words = [0u64; 16];
        LittleEndian::read_u64_into(CONSTANTS, &mut words[..4]);
        LittleEndian::read_u64_into(stream_key, &mut words[4..12]);
        // words 12..14 are the 128-bit block counter
        LittleEndian::read_u64_into(nonce, &mut words[14..16]);
        CsxState(words)
    }

    fn block(&self, out: &mut [u8; BLOCK_SIZE]) {
        let mut working = self.0;
        for _ in 0..DOUBLE_ROUNDS {
            quarter(&mut working, 0, 4, 8, 12);
            quarter(&mut working, 1, 5, 9, 13);
            quarter(&mut working, 2, 6, 10, 14);
            quarter(&mut working, 3, 7, 11, 15);
            quarter(&mut working, 0, 5, 10, 15);
            quarter(&mut working, 1, 6, 11, 12);
            quarter(&mut working, 2, 7, 8, 13);
            quarter(&mut working, 3, 4, 9, 14);
        }
        for (w, i) in working.iter_mut().zip(self.0) {
            *w = w.wrapping_add(i);
        }
        LittleEndian::write_u64_into(&working, out);
    }

    fn increment(&mut self) {
        self.0[12] = self.0[12].wrapping_add(1);
        if self.0[12] == 0 {
            self.0[13] = self.0[13].wrapping_add(1);
        }
    }

    fn transform(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_mut(BLOCK_SIZE) {
            let mut keystream = [0u8; BLOCK_SIZE];
            self.block(&mut keystream);
            self.increment();
            for (b, k) in chunk.iter_mut().zip(keystream) {
                *b ^= k;
            }
        }
    }
}

#[inline(always)]
fn quarter(state: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize) {
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(38);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(19);
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(10);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(55);
}

impl Csx512 {
    /// Expands `stream_key ‖ mac_key` from the user key with cSHAKE-512
    /// (name "CSX", custom = `info`) and loads the 1024-bit state.
    pub fn new(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], info: Option<&[u8]>) -> Csx512 {
        let info = info.unwrap_or_default();
        let mut xof = CShake::<RATE_512>::new(b"CSX", info);
        xof.absorb(key);

        let mut stream_key = Zeroizing::new([0u8; KEY_SIZE]);
        let mut mac_key = Zeroizing::new([0u8; TAG_SIZE]);
        xof.squeeze(stream_key.as_mut());
        xof.squeeze(mac_key.as_mut());

        let state = CsxState::new(&stream_key, nonce);
        let mut mac = Kmac::<RATE_512>::new(mac_key.as_ref(), b"");
        mac.update(nonce);

        Csx512 { state, mac, info: Zeroizing::new(info.to_vec()) }
    }

    /// Absorbs associated data into the MAC. Must be called before the
    /// transform.
    pub fn set_associated(&mut self, aad: &[u8]) {
        self.mac.update(aad);
    }

    /// Encrypts `plaintext` and returns `ciphertext ‖ tag`.
    pub fn encrypt(self, plaintext: &[u8]) -> Vec<u8> {
        let Csx512 { mut state, mut mac, info } = self;

        let mut out = vec![0u8; plaintext.len() + TAG_SIZE];
        let (ct, tag) = out.split_at_mut(plaintext.len());
        ct.copy_from_slice(plaintext);
        state.transform(ct);

        mac.update(ct);
        mac.update(&info);
        mac.update(&u64::to_le_bytes(ct.len() as u64));
        mac.finalize(tag);
        out
    }

    /// Verifies the tag over the received ciphertext and, only on success,
    /// decrypts and returns the plaintext.
    pub fn decrypt(self, input: &[u8]) -> Result<Vec<u8>, Error> {
        if input.len() < TAG_SIZE {
            return Err(Error::InvalidParameter);
        }
        let Csx512 { mut state, mut mac, info } = self;
        let (ct, tag) = input.split_at(input.len() - TAG_SIZE);

        mac.update(ct);
        mac.update(&info);
        mac.update(&u64::to_le_bytes(ct.len() as u64));
        let mut expected = Zeroizing::new([0u8; TAG_SIZE]);
        mac.finalize(expected.as_mut());

        if !bool::from(expected.as_ref().ct_eq(tag)) {
            return Err(Error::AuthFailure);
        }

        let mut out = ct.to_vec();
        state.transform(&mut out);
        Ok(out)
    }

    /// Applies the raw keystream without authentication, for callers that
    /// carry their own integrity layer.
    pub fn transform_raw(self, data: &mut [u8]) {
        let Csx512 { mut state, .. } = self;
        state.transform(data);
    }
}
