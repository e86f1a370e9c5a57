//! A quantum-secure cryptographic library.
//!
//! The crate is layered leaves-first:
//!
//! 1. [`cpu`] reads the platform capability bitfield once; primitives
//!    dispatch on it for hardware AES rounds, rdrand, and SIMD lane widths.
//! 2. [`keccak`], [`aes`], [`chacha`], and [`poly1305`] are the primitive
//!    kernels.
//! 3. [`sha3`], [`kmac`], and [`sha2`] wrap the kernels into hashes, XOFs,
//!    and MACs.
//! 4. [`rcs`] and [`csx`] are the authenticated ciphers: a wide-block
//!    Rijndael-256 CTR mode and a ChaCha-derived 1024-bit stream cipher,
//!    both keyed through cSHAKE and authenticated with KMAC. [`scb`] is the
//!    memory-hard, cost-based KDF.
//! 5. [`entropy`] aggregates the OS CSPRNG, the hardware RNG, and system
//!    state through cSHAKE-512.
//! 6. [`pq`] is the post-quantum scheme surface: ML-KEM, ML-DSA, Classic
//!    McEliece, SPHINCS+, and FrodoKEM behind uniform KEM/signature traits.
//!
//! Every primitive is single-threaded and owns its state exclusively;
//! secret-bearing states are overwritten on drop. Fallible operations
//! return the closed [`Error`] taxonomy and never panic on hostile input.

pub mod aes;
pub mod chacha;
pub mod cpu;
pub mod csx;
pub mod entropy;
pub mod keccak;
pub mod kmac;
pub mod poly1305;
pub mod pq;
pub mod rcs;
pub mod scb;
pub mod sha2;
pub mod sha3;

mod fuzzing;

/// The errors surfaced by the library. Errors are never swallowed; they
/// propagate from the outermost primitive call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A MAC tag or signature did not verify. No plaintext or message is
    /// released.
    #[error("authentication tag or signature mismatch")]
    AuthFailure,
    /// KEM decapsulation failed integrity. The plain decapsulation
    /// surface reports this through a status flag while emitting a
    /// pseudorandom secret derived from the secret key and ciphertext;
    /// the checked surface returns this error and releases nothing.
    #[error("ciphertext integrity failed during decapsulation")]
    ImplicitReject,
    /// The caller requested more output than the documented maximum.
    #[error("requested output exceeds the documented maximum")]
    LengthOverflow,
    /// A seed length, cost bound, or buffer length violates the stated
    /// contract.
    #[error("a parameter violates the stated contract")]
    InvalidParameter,
    /// A transient working buffer could not be allocated.
    #[error("working buffer allocation failed")]
    OutOfMemory,
    /// The OS or hardware entropy source failed.
    #[error("the underlying entropy source failed")]
    EntropyFailure,
}
