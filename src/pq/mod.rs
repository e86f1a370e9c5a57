//! The post-quantum scheme harness: one uniform surface over the KEM and
//! signature families.
//!
//! Every scheme follows the same seed/PRF discipline: `keypair` and
//! `encapsulate` draw exactly the scheme's seed length from the caller's
//! RNG and then run deterministically, so known-answer testing only needs
//! a deterministic RNG. Key material is opaque bytes; the fixed per-scheme
//! lengths are exposed as associated constants and validated at the
//! surface.

pub mod frodo;
pub mod mceliece;
pub mod mldsa;
pub mod mlkem;
pub mod sphincs;

use rand_core::{CryptoRng, RngCore};

use crate::Error;

/// The outcome of a KEM decapsulation. Both arms carry a usable shared
/// secret; on [`Decapsulation::ImplicitReject`] it is a pseudorandom value
/// derived from the secret key and ciphertext, so a higher protocol that
/// ignores the flag still ends up with a secret the attacker cannot know.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decapsulation {
    /// The ciphertext was well-formed and the encapsulated secret was
    /// recovered.
    Ok,
    /// The ciphertext failed integrity; the implicit-rejection secret was
    /// emitted instead.
    ImplicitReject,
}

/// A key-encapsulation mechanism.
pub trait Kem {
    /// The public key length in bytes.
    const PUBLIC_KEY_SIZE: usize;
    /// The secret key length in bytes.
    const SECRET_KEY_SIZE: usize;
    /// The ciphertext length in bytes.
    const CIPHERTEXT_SIZE: usize;
    /// The shared secret length in bytes.
    const SHARED_SECRET_SIZE: usize;

    /// Generates a keypair `(public, secret)`.
    fn keypair<R: RngCore + CryptoRng>(rng: &mut R) -> Result<(Vec<u8>, Vec<u8>), Error>;

    /// Encapsulates a fresh shared secret to `pk`, returning
    /// `(ciphertext, shared_secret)`.
    fn encapsulate<R: RngCore + CryptoRng>(
        pk: &[u8],
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), Error>;

    /// Recovers the shared secret from `ct`. Constant-time over the
    /// accept/reject decision; see [`Decapsulation`].
    fn decapsulate(ct: &[u8], sk: &[u8]) -> Result<(Vec<u8>, Decapsulation), Error>;

    /// Like [`Kem::decapsulate`], but fails closed: implicit rejection
    /// surfaces as [`Error::ImplicitReject`] and no secret is released.
    /// Well-formed protocols usually want `decapsulate` instead — using
    /// the pseudorandom secret leaks nothing, while an explicit abort is
    /// observable to the attacker.
    fn decapsulate_checked(ct: &[u8], sk: &[u8]) -> Result<Vec<u8>, Error> {
        match Self::decapsulate(ct, sk)? {
            (ss, Decapsulation::Ok) => Ok(ss),
            (_, Decapsulation::ImplicitReject) => Err(Error::ImplicitReject),
        }
    }
}

/// A signature scheme. Signed messages travel as `signature ‖ message`.
pub trait Signer {
    /// The public key length in bytes.
    const PUBLIC_KEY_SIZE: usize;
    /// The secret key length in bytes.
    const SECRET_KEY_SIZE: usize;
    /// The signature length in bytes.
    const SIGNATURE_SIZE: usize;

    /// Generates a keypair `(public, secret)`.
    fn keypair<R: RngCore + CryptoRng>(rng: &mut R) -> Result<(Vec<u8>, Vec<u8>), Error>;

    /// Signs `msg` and returns `signature ‖ msg`.
    fn sign<R: RngCore + CryptoRng>(
        msg: &[u8],
        sk: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, Error>;

    /// Verifies `signature ‖ message` and returns the message, or
    /// [`Error::AuthFailure`].
    fn open(signed: &[u8], pk: &[u8]) -> Result<Vec<u8>, Error>;
}

pub(crate) fn draw<R: RngCore + CryptoRng>(rng: &mut R, out: &mut [u8]) -> Result<(), Error> {
    rng.try_fill_bytes(out).map_err(|_| Error::EntropyFailure)
}

#[cfg(test)]
pub(crate) mod testutil {
    use rand_core::{impls, CryptoRng, Error, RngCore};

    use crate::sha3::Shake256;

    /// A deterministic RNG for reproducible keypairs in tests.
    pub struct SeedRng(Shake256);

    impl SeedRng {
        pub fn new(seed: &[u8]) -> SeedRng {
            let mut xof = Shake256::new();
            xof.absorb(seed);
            SeedRng(xof)
        }
    }

    impl RngCore for SeedRng {
        fn next_u32(&mut self) -> u32 {
            impls::next_u32_via_fill(self)
        }

        fn next_u64(&mut self) -> u64 {
            impls::next_u64_via_fill(self)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.0.squeeze(dest);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl CryptoRng for SeedRng {}
}
