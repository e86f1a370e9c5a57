//! FrodoKEM-640 (SHAKE variant): the conservative unstructured-LWE KEM.
//!
//! Matrices are over Z_q with q = 2¹⁵; the public matrix A is never
//! stored, it is regenerated one 640-entry row at a time from the SHAKE128
//! row expansion while the products accumulate.

use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::pq::{draw, Decapsulation, Kem};
use crate::sha3::Shake128;
use crate::Error;

const N: usize = 640;
const NBAR: usize = 8;
const LOG_Q: usize = 15;
const Q_MASK: u16 = (1 << LOG_Q) - 1;
const B: usize = 2;

const SEED_A_SIZE: usize = 16;
const SEED_SE_SIZE: usize = 32;
const MU_SIZE: usize = NBAR * NBAR * B / 8; // 16
const PKH_SIZE: usize = 16;
const SS_SIZE: usize = 16;
const S_SIZE: usize = 16;

const B_PACKED: usize = N * NBAR * LOG_Q / 8; // 9600
const C_PACKED: usize = NBAR * NBAR * LOG_Q / 8; // 120
const PK_SIZE: usize = SEED_A_SIZE + B_PACKED; // 9616
const SK_SIZE: usize = S_SIZE + PK_SIZE + 2 * N * NBAR + PKH_SIZE; // 19888
const CT_SIZE: usize = B_PACKED + C_PACKED; // 9720

// The Frodo-640 error distribution CDF (support -12..12).
const CDF: [u16; 13] =
    [4643, 13363, 20579, 25843, 29227, 31145, 32103, 32525, 32689, 32745, 32762, 32766, 32767];

fn shake(input: &[&[u8]], out: &mut [u8]) {
    let mut xof = Shake128::new();
    for part in input {
        xof.absorb(part);
    }
    xof.squeeze(out);
}

// One sample from the rounded-Gaussian-shaped distribution, given a
// uniform 16-bit word.
fn sample(r: u16) -> u16 {
    let t = r >> 1;
    let mut e = 0u16;
    for &threshold in &CDF {
        e += u16::from(t > threshold);
    }
    let sign = r & 1;
    // negate mod q when the sign bit is set
    (e ^ sign.wrapping_neg()).wrapping_add(sign) & Q_MASK
}

fn sample_matrix(stream: &[u8], out: &mut [u16]) {
    for (v, chunk) in out.iter_mut().zip(stream.chunks_exact(2)) {
        *v = sample(u16::from_le_bytes(chunk.try_into().unwrap()));
    }
}

// Row i of the public matrix A, from SHAKE128(le16(i) ‖ seedA).
fn a_row(seed_a: &[u8; SEED_A_SIZE], i: usize, row: &mut [u16; N]) {
    let mut bytes = [0u8; 2 * N];
    shake(&[&(i as u16).to_le_bytes(), seed_a], &mut bytes);
    for (v, chunk) in row.iter_mut().zip(bytes.chunks_exact(2)) {
        *v = u16::from_le_bytes(chunk.try_into().unwrap()) & Q_MASK;
    }
}

fn pack15(values: &[u16], out: &mut [u8]) {
    debug_assert_eq!(out.len(), values.len() * LOG_Q / 8);
    let mut acc = 0u32;
    let mut bits = 0;
    let mut at = 0;
    for &v in values {
        // big-endian bit order, as the reference packs
        acc = (acc << LOG_Q) | u32::from(v & Q_MASK);
        bits += LOG_Q;
        while bits >= 8 {
            out[at] = (acc >> (bits - 8)) as u8;
            at += 1;
            bits -= 8;
        }
    }
}

fn unpack15(data: &[u8], out: &mut [u16]) {
    debug_assert_eq!(data.len(), out.len() * LOG_Q / 8);
    let mut acc = 0u32;
    let mut bits = 0;
    let mut at = 0;
    for v in out.iter_mut() {
        while bits < LOG_Q {
            acc = (acc << 8) | u32::from(data[at]);
            at += 1;
            bits += 8;
        }
        *v = ((acc >> (bits - LOG_Q)) as u16) & Q_MASK;
        bits -= LOG_Q;
    }
}

// ec(k) = k·q/2^B per 2-bit chunk of mu, row-major.
fn encode(mu: &[u8; MU_SIZE], out: &mut [u16; NBAR * NBAR]) {
    for (i, v) in out.iter_mut().enumerate() {
        let byte = mu[i * B / 8];
        let k = (byte >> (i * B % 8)) & ((1 << B) - 1);
        *v = u16::from(k) << (LOG_Q - B);
    }
}

fn decode(m: &[u16; NBAR * NBAR]) -> [u8; MU_SIZE] {
    let mut mu = [0u8; MU_SIZE];
    for (i, &v) in m.iter().enumerate() {
        let k = ((v & Q_MASK) as u32 + (1 << (LOG_Q - B - 1))) >> (LOG_Q - B);
        mu[i * B / 8] |= ((k as u8) & ((1 << B) - 1)) << (i * B % 8);
    }
    mu
}

fn mul_add_as_plus_e(
    seed_a: &[u8; SEED_A_SIZE],
    s: &[u16],
    e: &[u16],
    out: &mut [u16], // n x nbar
) {
    out.copy_from_slice(e);
    let mut row = [0u16; N];
    for i in 0..N {
        a_row(seed_a, i, &mut row);
        for k in 0..NBAR {
            let mut acc = 0u32;
            for (j, &a) in row.iter().enumerate() {
                acc = acc.wrapping_add(u32::from(a) * u32::from(s[k * N + j]));
            }
            out[i * NBAR + k] = (out[i * NBAR + k].wrapping_add(acc as u16)) & Q_MASK;
        }
    }
}

fn mul_add_sa_plus_e(
    seed_a: &[u8; SEED_A_SIZE],
    s: &[u16], // nbar x n
    e: &[u16],
    out: &mut [u16], // nbar x n
) {
    out.copy_from_slice(e);
    let mut row = [0u16; N];
    for i in 0..N {
        a_row(seed_a, i, &mut row);
        for k in 0..NBAR {
            let si = u32::from(s[k * N + i]);
            for (j, &a) in row.iter().enumerate() {
                let acc = u32::from(out[k * N + j]).wrapping_add(si.wrapping_mul(u32::from(a)));
                out[k * N + j] = acc as u16 & Q_MASK;
            }
        }
    }
}

// out = s·b + e over nbar x nbar, with b an n x nbar matrix.
fn mul_add_sb_plus_e(s: &[u16], b: &[u16], e: &[u16], out: &mut [u16]) {
    for k in 0..NBAR {
        for j in 0..NBAR {
            let mut acc = u32::from(e[k * NBAR + j]);
            for i in 0..N {
                acc = acc.wrapping_add(u32::from(s[k * N + i]) * u32::from(b[i * NBAR + j]));
            }
            out[k * NBAR + j] = acc as u16 & Q_MASK;
        }
    }
}

/// FrodoKEM-640-SHAKE.
pub struct Frodo640;

impl Kem for Frodo640 {
    const PUBLIC_KEY_SIZE: usize = PK_SIZE;
    const SECRET_KEY_SIZE: usize = SK_SIZE;
    const CIPHERTEXT_SIZE: usize = CT_SIZE;
    const SHARED_SECRET_SIZE: usize = SS_SIZE;

    fn keypair<R: rand_core::RngCore + rand_core::CryptoRng>(
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let mut randomness = Zeroizing::new([0u8; S_SIZE + SEED_SE_SIZE + 16]);
        draw(rng, randomness.as_mut())?;
        let (s, rest) = randomness.split_at(S_SIZE);
        let (seed_se, z) = rest.split_at(SEED_SE_SIZE);

        let mut seed_a = [0u8; SEED_A_SIZE];
        shake(&[z], &mut seed_a);

        let mut stream = Zeroizing::new(vec![0u8; 4 * N * NBAR]);
        shake(&[&[0x5f], seed_se], &mut stream);
        let mut s_mat = Zeroizing::new(vec![0u16; N * NBAR]);
        let mut e_mat = Zeroizing::new(vec![0u16; N * NBAR]);
        // S is sampled transposed (nbar x n) and used column-wise
        sample_matrix(&stream[..2 * N * NBAR], &mut s_mat);
        sample_matrix(&stream[2 * N * NBAR..], &mut e_mat);

        let mut b_mat = vec![0u16; N * NBAR];
        mul_add_as_plus_e(&seed_a, &s_mat, &e_mat, &mut b_mat);

        let mut pk = vec![0u8; PK_SIZE];
        pk[..SEED_A_SIZE].copy_from_slice(&seed_a);
        pack15(&b_mat, &mut pk[SEED_A_SIZE..]);

        let mut pkh = [0u8; PKH_SIZE];
        shake(&[&pk], &mut pkh);

        let mut sk = vec![0u8; SK_SIZE];
        let mut at = 0;
        sk[at..at + S_SIZE].copy_from_slice(s);
        at += S_SIZE;
        sk[at..at + PK_SIZE].copy_from_slice(&pk);
        at += PK_SIZE;
        for &v in s_mat.iter() {
            sk[at..at + 2].copy_from_slice(&v.to_le_bytes());
            at += 2;
        }
        sk[at..].copy_from_slice(&pkh);
        Ok((pk, sk))
    }

    fn encapsulate<R: rand_core::RngCore + rand_core::CryptoRng>(
        pk: &[u8],
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        if pk.len() != PK_SIZE {
            return Err(Error::InvalidParameter);
        }
        let mut mu = Zeroizing::new([0u8; MU_SIZE]);
        draw(rng, mu.as_mut())?;

        let mut pkh = [0u8; PKH_SIZE];
        shake(&[pk], &mut pkh);
        let mut seeds = Zeroizing::new([0u8; SEED_SE_SIZE + SS_SIZE]);
        shake(&[&pkh, mu.as_ref()], seeds.as_mut());
        let (seed_se, k) = seeds.split_at(SEED_SE_SIZE);

        let seed_a: [u8; SEED_A_SIZE] = pk[..SEED_A_SIZE].try_into().unwrap();
        let mut b_mat = vec![0u16; N * NBAR];
        unpack15(&pk[SEED_A_SIZE..], &mut b_mat);

        let ct = encrypt(&seed_a, &b_mat, seed_se, &mu);

        let mut ss = vec![0u8; SS_SIZE];
        shake(&[&ct, k], &mut ss);
        Ok((ct, ss))
    }

    fn decapsulate(ct: &[u8], sk: &[u8]) -> Result<(Vec<u8>, Decapsulation), Error> {
        if ct.len() != CT_SIZE || sk.len() != SK_SIZE {
            return Err(Error::InvalidParameter);
        }
        let s = &sk[..S_SIZE];
        let pk = &sk[S_SIZE..S_SIZE + PK_SIZE];
        let s_mat_bytes = &sk[S_SIZE + PK_SIZE..S_SIZE + PK_SIZE + 2 * N * NBAR];
        let pkh = &sk[S_SIZE + PK_SIZE + 2 * N * NBAR..];

        let mut s_mat = Zeroizing::new(vec![0u16; N * NBAR]);
        for (v, chunk) in s_mat.iter_mut().zip(s_mat_bytes.chunks_exact(2)) {
            *v = u16::from_le_bytes(chunk.try_into().unwrap());
        }

        let mut b_prime = vec![0u16; N * NBAR];
        unpack15(&ct[..B_PACKED], &mut b_prime);
        let mut c_mat = [0u16; NBAR * NBAR];
        unpack15(&ct[B_PACKED..], &mut c_mat);

        // M = C - B'·S
        let mut m = [0u16; NBAR * NBAR];
        for k in 0..NBAR {
            for j in 0..NBAR {
                let mut acc = 0u32;
                for i in 0..N {
                    acc = acc
                        .wrapping_add(u32::from(b_prime[k * N + i]) * u32::from(s_mat[j * N + i]));
                }
                m[k * NBAR + j] = c_mat[k * NBAR + j].wrapping_sub(acc as u16) & Q_MASK;
            }
        }
        let mu_prime = Zeroizing::new(decode(&m));

        let mut seeds = Zeroizing::new([0u8; SEED_SE_SIZE + SS_SIZE]);
        shake(&[pkh, mu_prime.as_ref()], seeds.as_mut());
        let (seed_se, k_prime) = seeds.split_at(SEED_SE_SIZE);

        let seed_a: [u8; SEED_A_SIZE] = pk[..SEED_A_SIZE].try_into().unwrap();
        let mut b_mat = vec![0u16; N * NBAR];
        unpack15(&pk[SEED_A_SIZE..], &mut b_mat);
        let ct_prime = encrypt(&seed_a, &b_mat, seed_se, &mu_prime);

        let accept = ct_prime.ct_eq(ct);
        let mut ss = vec![0u8; SS_SIZE];
        let mut accepted = Zeroizing::new([0u8; SS_SIZE]);
        let mut rejected = Zeroizing::new([0u8; SS_SIZE]);
        shake(&[ct, k_prime], accepted.as_mut());
        shake(&[ct, s], rejected.as_mut());
        for ((out, &a), &r) in ss.iter_mut().zip(accepted.iter()).zip(rejected.iter()) {
            *out = u8::conditional_select(&r, &a, accept);
        }
        let status =
            if bool::from(accept) { Decapsulation::Ok } else { Decapsulation::ImplicitReject };
        Ok((ss, status))
    }
}

// The deterministic encryption shared by encapsulate and the
// re-encryption check in decapsulate.
fn encrypt(
    seed_a: &[u8; SEED_A_SIZE],
    b_mat: &[u16],
    seed_se: &[u8],
    mu: &[u8; MU_SIZE],
) -> Vec<u8> {
    let mut stream = Zeroizing::new(vec![0u8; 2 * (2 * N * NBAR + NBAR * NBAR)]);
    shake(&[&[0x96], seed_se], &mut stream);

    let mut s_prime = Zeroizing::new(vec![0u16; N * NBAR]);
    let mut e_prime = Zeroizing::new(vec![0u16; N * NBAR]);
    let mut e2 = Zeroizing::new([0u16; NBAR * NBAR]);
    sample_matrix(&stream[..2 * N * NBAR], &mut s_prime);
    sample_matrix(&stream[2 * N * NBAR..4 * N * NBAR], &mut e_prime);
    sample_matrix(&stream[4 * N * NBAR..], e2.as_mut());

    let mut b_prime = vec![0u16; N * NBAR];
    mul_add_sa_plus_e(seed_a, &s_prime, &e_prime, &mut b_prime);

    let mut v = [0u16; NBAR * NBAR];
    mul_add_sb_plus_e(&s_prime, b_mat, e2.as_ref(), &mut v);

    let mut encoded = [0u16; NBAR * NBAR];
    encode(mu, &mut encoded);
    for (c, &m) in v.iter_mut().zip(&encoded) {
        *c = c.wrapping_add(m) & Q_MASK;
    }

    let mut ct = vec![0u8; CT_SIZE];
    pack15(&b_prime, &mut ct[..B_PACKED]);
    pack15(&v, &mut ct[B_PACKED..]);
    ct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::testutil::SeedRng;

    #[test]
    fn sampler_is_symmetric_and_bounded() {
        assert_eq!(sample(0), 0);
        // a sample and its sign-flipped twin negate each other mod q
        for r in [2u16, 100, 40000, 65534] {
            let plus = sample(r);
            let minus = sample(r | 1);
            assert_eq!(plus.wrapping_add(minus) & Q_MASK, 0);
            assert!(plus <= 12 || plus >= Q_MASK - 12 + 1);
        }
    }

    #[test]
    fn packing_round_trips() {
        let values: Vec<u16> = (0..N as u16 * 8).map(|i| (i * 2053 + 11) & Q_MASK).collect();
        let mut packed = vec![0u8; values.len() * LOG_Q / 8];
        pack15(&values, &mut packed);
        let mut back = vec![0u16; values.len()];
        unpack15(&packed, &mut back);
        assert_eq!(values, back);
    }

    #[test]
    fn message_encoding_round_trips() {
        let mu: [u8; MU_SIZE] = core::array::from_fn(|i| (i * 37 + 5) as u8);
        let mut encoded = [0u16; NBAR * NBAR];
        encode(&mu, &mut encoded);
        // decode must survive noise below q/2^(B+1)
        for (i, c) in encoded.iter_mut().enumerate() {
            let noise = (i as u16 * 97) % (1 << (LOG_Q - B - 1));
            *c = if i % 2 == 0 { c.wrapping_add(noise) } else { c.wrapping_sub(noise) } & Q_MASK;
        }
        assert_eq!(decode(&encoded), mu);
    }

    #[test]
    fn round_trip() {
        let mut rng = SeedRng::new(b"frodo round trip");
        let (pk, sk) = Frodo640::keypair(&mut rng).unwrap();
        assert_eq!(pk.len(), Frodo640::PUBLIC_KEY_SIZE);
        assert_eq!(sk.len(), Frodo640::SECRET_KEY_SIZE);

        let (ct, ss_enc) = Frodo640::encapsulate(&pk, &mut rng).unwrap();
        assert_eq!(ct.len(), Frodo640::CIPHERTEXT_SIZE);
        let (ss_dec, status) = Frodo640::decapsulate(&ct, &sk).unwrap();
        assert_eq!(status, Decapsulation::Ok);
        assert_eq!(ss_enc, ss_dec);
    }

    #[test]
    fn tampered_ciphertext_implicitly_rejects() {
        let mut rng = SeedRng::new(b"frodo tamper");
        let (pk, sk) = Frodo640::keypair(&mut rng).unwrap();
        let (ct, ss_enc) = Frodo640::encapsulate(&pk, &mut rng).unwrap();

        for flip in [0usize, B_PACKED, CT_SIZE - 1] {
            let mut bad = ct.clone();
            bad[flip] ^= 1;
            let (ss_dec, status) = Frodo640::decapsulate(&bad, &sk).unwrap();
            assert_eq!(status, Decapsulation::ImplicitReject);
            assert_ne!(ss_enc, ss_dec);
            assert_eq!(Frodo640::decapsulate_checked(&bad, &sk), Err(Error::ImplicitReject));
        }
        assert_eq!(Frodo640::decapsulate_checked(&ct, &sk).unwrap(), ss_enc);
    }
}
