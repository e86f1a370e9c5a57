//! Classic McEliece 348864: the Niederreiter KEM over a binary Goppa code
//! with n = 3488, t = 64 over GF(2¹²).
//!
//! The public key, ciphertext, and shared secret match the round-3 wire
//! sizes. The secret key stores the code description directly
//! (`s ‖ g ‖ support`) rather than Beneš control bits; keys are opaque to
//! callers and no cross-implementation secret-key interop is claimed.
//!
//! Key generation derives the irreducible Goppa polynomial as the minimal
//! polynomial of a random element of GF(2¹²)⁶⁴ (modulo the fixed
//! y⁶⁴ + y³ + y + z), then reduces the parity-check matrix to systematic
//! form, resampling the support permutation until it is invertible.
//! Decoding runs Berlekamp–Massey over the doubled syndrome sequence.

use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::pq::{draw, Decapsulation, Kem};
use crate::sha3::Shake256;
use crate::Error;

const GF_BITS: usize = 12;
const GF_MASK: u16 = 0x0fff;
const GF_POLY: u32 = 0x1009; // z^12 + z^3 + 1
const SYS_N: usize = 3488;
const SYS_T: usize = 64;
const PK_ROWS: usize = GF_BITS * SYS_T; // 768
const ROW_BYTES: usize = (SYS_N - PK_ROWS) / 8; // 340
const SYND_BYTES: usize = PK_ROWS / 8; // 96
const E_BYTES: usize = SYS_N / 8; // 436
const ROW_WORDS: usize = 55;
const SEED_SIZE: usize = 32;

const PK_SIZE: usize = PK_ROWS * ROW_BYTES;
const SK_SIZE: usize = E_BYTES + 2 * SYS_T + 2 * SYS_N;
const CT_SIZE: usize = SYND_BYTES + 32;
const SS_SIZE: usize = 32;

type Gf = u16;

fn gf_mul(a: Gf, b: Gf) -> Gf {
    let mut t = 0u32;
    for i in 0..GF_BITS {
        let mask = u32::from((b >> i) & 1).wrapping_neg();
        t ^= (u32::from(a) << i) & mask;
    }
    for i in (GF_BITS..2 * GF_BITS - 1).rev() {
        let bit = (t >> i) & 1;
        t ^= (GF_POLY << (i - GF_BITS)) * bit;
    }
    (t as u16) & GF_MASK
}

fn gf_pow(mut a: Gf, mut e: u32) -> Gf {
    let mut r: Gf = 1;
    while e > 0 {
        if e & 1 == 1 {
            r = gf_mul(r, a);
        }
        a = gf_mul(a, a);
        e >>= 1;
    }
    r
}

fn gf_inv(a: Gf) -> Gf {
    gf_pow(a, (1 << GF_BITS) - 2)
}

// Horner evaluation of the monic degree-64 Goppa polynomial.
fn eval_goppa(g: &[Gf; SYS_T], x: Gf) -> Gf {
    let mut r: Gf = 1;
    for &c in g.iter().rev() {
        r = gf_mul(r, x) ^ c;
    }
    r
}

// Multiplication in GF(2^12)[y]/(y^64 + y^3 + y + z).
fn ext_mul(a: &[Gf; SYS_T], b: &[Gf; SYS_T]) -> [Gf; SYS_T] {
    let mut prod = [0 as Gf; 2 * SYS_T - 1];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            if bj != 0 {
                prod[i + j] ^= gf_mul(ai, bj);
            }
        }
    }
    for d in (SYS_T..2 * SYS_T - 1).rev() {
        let c = prod[d];
        if c == 0 {
            continue;
        }
        prod[d] = 0;
        prod[d - SYS_T + 3] ^= c;
        prod[d - SYS_T + 1] ^= c;
        prod[d - SYS_T] ^= gf_mul(c, 2);
    }
    prod[..SYS_T].try_into().unwrap()
}

// Minimal polynomial of beta over GF(2^12), via Gaussian elimination on
// the powers of beta. Fails (rarely) when beta generates a proper
// subfield.
fn min_poly(beta: &[Gf; SYS_T]) -> Option<[Gf; SYS_T]> {
    let mut powers = [[0 as Gf; SYS_T]; SYS_T + 1];
    powers[0][0] = 1;
    for i in 1..=SYS_T {
        powers[i] = ext_mul(&powers[i - 1], beta);
    }

    // 64 coordinate rows, columns are beta^0..beta^63, rhs beta^64
    let mut mat = [[0 as Gf; SYS_T + 1]; SYS_T];
    for (r, row) in mat.iter_mut().enumerate() {
        for c in 0..SYS_T {
            row[c] = powers[c][r];
        }
        row[SYS_T] = powers[SYS_T][r];
    }

    for c in 0..SYS_T {
        let pivot = (c..SYS_T).find(|&r| mat[r][c] != 0)?;
        mat.swap(c, pivot);
        let inv = gf_inv(mat[c][c]);
        for x in 0..=SYS_T {
            mat[c][x] = gf_mul(mat[c][x], inv);
        }
        for r in 0..SYS_T {
            if r != c && mat[r][c] != 0 {
                let f = mat[r][c];
                for x in 0..=SYS_T {
                    mat[r][x] ^= gf_mul(f, mat[c][x]);
                }
            }
        }
    }

    let mut g = [0 as Gf; SYS_T];
    for (i, gi) in g.iter_mut().enumerate() {
        *gi = mat[i][SYS_T];
    }
    Some(g)
}

struct SecretKey {
    s: [u8; E_BYTES],
    goppa: [Gf; SYS_T],
    support: Vec<Gf>,
}

impl SecretKey {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SK_SIZE);
        out.extend_from_slice(&self.s);
        for &c in &self.goppa {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for &a in &self.support {
            out.extend_from_slice(&a.to_le_bytes());
        }
        out
    }

    fn from_bytes(sk: &[u8]) -> SecretKey {
        let s: [u8; E_BYTES] = sk[..E_BYTES].try_into().unwrap();
        let mut goppa = [0 as Gf; SYS_T];
        for (i, c) in goppa.iter_mut().enumerate() {
            *c = u16::from_le_bytes(sk[E_BYTES + 2 * i..E_BYTES + 2 * i + 2].try_into().unwrap());
        }
        let base = E_BYTES + 2 * SYS_T;
        let support = (0..SYS_N)
            .map(|i| u16::from_le_bytes(sk[base + 2 * i..base + 2 * i + 2].try_into().unwrap()))
            .collect();
        SecretKey { s, goppa, support }
    }
}

fn prg(seed: &[u8]) -> Shake256 {
    let mut xof = Shake256::new();
    xof.absorb(seed);
    xof
}

fn keygen_internal(seed: &[u8; SEED_SIZE]) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let mut rng = prg(seed);

    let mut s = [0u8; E_BYTES];
    rng.squeeze(&mut s);

    let goppa = loop {
        let mut beta = [0 as Gf; SYS_T];
        let mut buf = [0u8; 2 * SYS_T];
        rng.squeeze(&mut buf);
        for (b, chunk) in beta.iter_mut().zip(buf.chunks_exact(2)) {
            *b = u16::from_le_bytes(chunk.try_into().unwrap()) & GF_MASK;
        }
        if let Some(g) = min_poly(&beta) {
            break g;
        }
    };

    // Sample a field-element permutation and reduce the parity-check
    // matrix; a singular matrix resamples the permutation.
    for _ in 0..100 {
        let mut keyed: Vec<u64> = Vec::with_capacity(1 << GF_BITS);
        let mut buf = [0u8; 4];
        for i in 0..1u64 << GF_BITS {
            rng.squeeze(&mut buf);
            keyed.push(u64::from(u32::from_le_bytes(buf)) << GF_BITS | i);
        }
        keyed.sort_unstable();
        if keyed.windows(2).any(|w| w[0] >> GF_BITS == w[1] >> GF_BITS) {
            continue;
        }
        let support: Vec<Gf> = keyed[..SYS_N].iter().map(|&v| (v as u16) & GF_MASK).collect();

        if let Some(pk) = systematic_public_key(&goppa, &support) {
            let sk = SecretKey { s, goppa, support };
            return Ok((pk, sk.to_bytes()));
        }
    }
    Err(Error::InvalidParameter)
}

fn systematic_public_key(goppa: &[Gf; SYS_T], support: &[Gf]) -> Option<Vec<u8>> {
    let mut mat = vec![[0u64; ROW_WORDS]; PK_ROWS];
    for (j, &a) in support.iter().enumerate() {
        let mut entry = gf_inv(eval_goppa(goppa, a));
        for r in 0..SYS_T {
            for b in 0..GF_BITS {
                if (entry >> b) & 1 == 1 {
                    mat[r * GF_BITS + b][j / 64] |= 1u64 << (j % 64);
                }
            }
            entry = gf_mul(entry, a);
        }
    }

    for c in 0..PK_ROWS {
        let pivot = (c..PK_ROWS).find(|&r| mat[r][c / 64] >> (c % 64) & 1 == 1)?;
        mat.swap(c, pivot);
        for r in 0..PK_ROWS {
            if r != c && mat[r][c / 64] >> (c % 64) & 1 == 1 {
                let (pivot_row, other) = if r < c {
                    let (head, tail) = mat.split_at_mut(c);
                    (&tail[0], &mut head[r])
                } else {
                    let (head, tail) = mat.split_at_mut(r);
                    (&head[c], &mut tail[0])
                };
                for (o, p) in other.iter_mut().zip(pivot_row) {
                    *o ^= p;
                }
            }
        }
    }

    let mut pk = vec![0u8; PK_SIZE];
    for (r, row) in mat.iter().enumerate() {
        for j in 0..ROW_BYTES * 8 {
            let col = PK_ROWS + j;
            if row[col / 64] >> (col % 64) & 1 == 1 {
                pk[r * ROW_BYTES + j / 8] |= 1 << (j % 8);
            }
        }
    }
    Some(pk)
}

// Fixed-weight error sampling: 12-bit candidates below n, until t
// distinct positions accumulate.
fn gen_error(rng: &mut Shake256) -> [u8; E_BYTES] {
    let mut e = [0u8; E_BYTES];
    let mut weight = 0;
    let mut buf = [0u8; 2];
    while weight < SYS_T {
        rng.squeeze(&mut buf);
        let p = usize::from(u16::from_le_bytes(buf) & GF_MASK);
        if p < SYS_N && e[p / 8] >> (p % 8) & 1 == 0 {
            e[p / 8] |= 1 << (p % 8);
            weight += 1;
        }
    }
    e
}

fn syndrome(pk: &[u8], e: &[u8; E_BYTES]) -> [u8; SYND_BYTES] {
    let mut c0 = [0u8; SYND_BYTES];
    for r in 0..PK_ROWS {
        let mut bit = e[r / 8] >> (r % 8) & 1;
        let row = &pk[r * ROW_BYTES..(r + 1) * ROW_BYTES];
        for (rb, eb) in row.iter().zip(&e[SYND_BYTES..]) {
            bit ^= (rb & eb).count_ones() as u8 & 1;
        }
        c0[r / 8] |= bit << (r % 8);
    }
    c0
}

fn hash_with_prefix(prefix: u8, e: &[u8], suffix: &[u8]) -> [u8; 32] {
    let mut xof = Shake256::new();
    xof.absorb(&[prefix]);
    xof.absorb(e);
    xof.absorb(suffix);
    let mut out = [0u8; 32];
    xof.squeeze(&mut out);
    out
}

// The doubled syndrome sequence of a bit vector over 1/g².
fn double_syndromes(sk: &SecretKey, bits: impl Iterator<Item = usize>) -> [Gf; 2 * SYS_T] {
    let mut s = [0 as Gf; 2 * SYS_T];
    for i in bits {
        let a = sk.support[i];
        let ge = eval_goppa(&sk.goppa, a);
        let mut term = gf_inv(gf_mul(ge, ge));
        for slot in s.iter_mut() {
            *slot ^= term;
            term = gf_mul(term, a);
        }
    }
    s
}

// Berlekamp-Massey over the 2t syndromes; returns the connection
// polynomial.
fn berlekamp_massey(s: &[Gf; 2 * SYS_T]) -> ([Gf; SYS_T + 1], usize) {
    let mut c = [0 as Gf; SYS_T + 1];
    let mut b = [0 as Gf; SYS_T + 1];
    c[0] = 1;
    b[0] = 1;
    let mut l = 0usize;
    let mut m = 1usize;
    let mut bb: Gf = 1;

    for n in 0..2 * SYS_T {
        let mut d: Gf = 0;
        for i in 0..=l.min(SYS_T) {
            d ^= gf_mul(c[i], s[n - i]);
        }
        if d == 0 {
            m += 1;
        } else if 2 * l <= n {
            let t = c;
            let f = gf_mul(d, gf_inv(bb));
            for i in 0..=SYS_T.saturating_sub(m) {
                if i + m <= SYS_T {
                    c[i + m] ^= gf_mul(f, b[i]);
                }
            }
            l = n + 1 - l;
            b = t;
            bb = d;
            m = 1;
        } else {
            let f = gf_mul(d, gf_inv(bb));
            for i in 0..=SYS_T.saturating_sub(m) {
                if i + m <= SYS_T {
                    c[i + m] ^= gf_mul(f, b[i]);
                }
            }
            m += 1;
        }
    }
    (c, l)
}

fn decode(sk: &SecretKey, c0: &[u8; SYND_BYTES]) -> Option<[u8; E_BYTES]> {
    let s = double_syndromes(sk, (0..PK_ROWS).filter(|&i| c0[i / 8] >> (i % 8) & 1 == 1));
    let (locator, l) = berlekamp_massey(&s);

    // The reversed locator has its roots at the support values.
    let mut e = [0u8; E_BYTES];
    let mut weight = 0;
    for (i, &a) in sk.support.iter().enumerate() {
        let mut v: Gf = 0;
        for &c in locator.iter() {
            v = gf_mul(v, a) ^ c;
        }
        if v == 0 {
            e[i / 8] |= 1 << (i % 8);
            weight += 1;
        }
    }
    if weight != SYS_T || l != SYS_T {
        return None;
    }

    let check = double_syndromes(sk, (0..SYS_N).filter(|&i| e[i / 8] >> (i % 8) & 1 == 1));
    if check != s {
        return None;
    }
    Some(e)
}

/// Classic McEliece 348864.
pub struct McEliece348864;

impl Kem for McEliece348864 {
    const PUBLIC_KEY_SIZE: usize = PK_SIZE;
    const SECRET_KEY_SIZE: usize = SK_SIZE;
    const CIPHERTEXT_SIZE: usize = CT_SIZE;
    const SHARED_SECRET_SIZE: usize = SS_SIZE;

    fn keypair<R: rand_core::RngCore + rand_core::CryptoRng>(
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        draw(rng, seed.as_mut())?;
        keygen_internal(&seed)
    }

    fn encapsulate<R: rand_core::RngCore + rand_core::CryptoRng>(
        pk: &[u8],
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        if pk.len() != PK_SIZE {
            return Err(Error::InvalidParameter);
        }
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        draw(rng, seed.as_mut())?;
        let mut stream = prg(seed.as_ref());
        let e = Zeroizing::new(gen_error(&mut stream));

        let mut ct = vec![0u8; CT_SIZE];
        let c0 = syndrome(pk, &e);
        ct[..SYND_BYTES].copy_from_slice(&c0);
        let c1 = hash_with_prefix(2, e.as_ref(), b"");
        ct[SYND_BYTES..].copy_from_slice(&c1);

        let ss = hash_with_prefix(1, e.as_ref(), &ct);
        Ok((ct, ss.to_vec()))
    }

    fn decapsulate(ct: &[u8], sk: &[u8]) -> Result<(Vec<u8>, Decapsulation), Error> {
        if ct.len() != CT_SIZE || sk.len() != SK_SIZE {
            return Err(Error::InvalidParameter);
        }
        let secret = SecretKey::from_bytes(sk);
        let c0: [u8; SYND_BYTES] = ct[..SYND_BYTES].try_into().unwrap();

        let decoded = decode(&secret, &c0);
        let (e, mut ok) = match decoded {
            Some(e) => (Zeroizing::new(e), true),
            None => (Zeroizing::new([0u8; E_BYTES]), false),
        };
        if ok {
            let c1 = hash_with_prefix(2, e.as_ref(), b"");
            ok &= bool::from(c1.ct_eq(&ct[SYND_BYTES..]));
        }

        let accepted = hash_with_prefix(1, e.as_ref(), ct);
        let rejected = hash_with_prefix(0, &secret.s, ct);
        let choice = subtle::Choice::from(u8::from(ok));
        let mut ss = vec![0u8; SS_SIZE];
        for ((s, &a), &r) in ss.iter_mut().zip(&accepted).zip(&rejected) {
            *s = u8::conditional_select(&r, &a, choice);
        }
        let status = if ok { Decapsulation::Ok } else { Decapsulation::ImplicitReject };
        Ok((ss, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::testutil::SeedRng;

    #[test]
    fn field_arithmetic() {
        assert_eq!(gf_mul(0, 0x123), 0);
        assert_eq!(gf_mul(1, 0x123), 0x123);
        for a in [1u16, 2, 0x53, 0x800, 0xfff] {
            assert_eq!(gf_mul(a, gf_inv(a)), 1);
            assert_eq!(gf_mul(a, 0x10), gf_mul(0x10, a));
        }
    }

    #[test]
    fn minimal_polynomial_is_a_root_relation() {
        // g(beta) must vanish in the extension field.
        let mut beta = [0 as Gf; SYS_T];
        for (i, b) in beta.iter_mut().enumerate() {
            *b = ((i * 2741 + 7) & 0xfff) as u16;
        }
        let g = min_poly(&beta).unwrap();

        let mut acc = [0 as Gf; SYS_T];
        let mut power = [0 as Gf; SYS_T];
        power[0] = 1;
        for &coeff in &g {
            for (a, &p) in acc.iter_mut().zip(&power) {
                *a ^= gf_mul(coeff, p);
            }
            power = ext_mul(&power, &beta);
        }
        // add the monic beta^64 term
        for (a, &p) in acc.iter_mut().zip(&power) {
            *a ^= p;
        }
        assert_eq!(acc, [0 as Gf; SYS_T]);
    }

    #[test]
    fn round_trip() {
        let mut rng = SeedRng::new(b"mceliece round trip");
        let (pk, sk) = McEliece348864::keypair(&mut rng).unwrap();
        assert_eq!(pk.len(), McEliece348864::PUBLIC_KEY_SIZE);
        assert_eq!(sk.len(), McEliece348864::SECRET_KEY_SIZE);

        for _ in 0..3 {
            let (ct, ss_enc) = McEliece348864::encapsulate(&pk, &mut rng).unwrap();
            assert_eq!(ct.len(), McEliece348864::CIPHERTEXT_SIZE);
            let (ss_dec, status) = McEliece348864::decapsulate(&ct, &sk).unwrap();
            assert_eq!(status, Decapsulation::Ok);
            assert_eq!(ss_enc, ss_dec);
        }
    }

    #[test]
    fn tampered_ciphertext_implicitly_rejects() {
        let mut rng = SeedRng::new(b"mceliece tamper");
        let (pk, sk) = McEliece348864::keypair(&mut rng).unwrap();
        let (ct, ss_enc) = McEliece348864::encapsulate(&pk, &mut rng).unwrap();

        for flip in [0, SYND_BYTES - 1, SYND_BYTES, CT_SIZE - 1] {
            let mut bad = ct.clone();
            bad[flip] ^= 1;
            let (ss_dec, status) = McEliece348864::decapsulate(&bad, &sk).unwrap();
            assert_eq!(status, Decapsulation::ImplicitReject);
            assert_ne!(ss_enc, ss_dec);
        }
    }
}
