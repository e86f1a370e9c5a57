//! ML-KEM (FIPS 203), the module-lattice KEM standardized from
//! CRYSTALS-Kyber, in the 512/768/1024 parameter sets.
//!
//! The NTT twiddle tables are generated at compile time from the 17th
//! root of unity rather than transcribed. All polynomial coefficients are
//! kept in canonical form `[0, q)`; modular reductions use the public
//! constant modulus only.

use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use crate::pq::{draw, Decapsulation, Kem};
use crate::sha3::{sha3_256, sha3_512, shake256_x4, Shake128, Shake256};
use crate::Error;

const N: usize = 256;
const Q: u32 = 3329;
const SEED_SIZE: usize = 32;
const SHARED_SECRET_SIZE: usize = 32;

const fn pow_mod(base: u64, exp: u64, modulus: u64) -> u64 {
    let mut acc = 1u64;
    let mut b = base % modulus;
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            acc = acc * b % modulus;
        }
        b = b * b % modulus;
        e >>= 1;
    }
    acc
}

const fn bit_reverse(value: usize, bits: u32) -> usize {
    let mut v = value;
    let mut out = 0;
    let mut i = 0;
    while i < bits {
        out = (out << 1) | (v & 1);
        v >>= 1;
        i += 1;
    }
    out
}

// ζ^BitRev7(i) for the NTT butterflies.
const ZETAS: [u16; 128] = {
    let mut z = [0u16; 128];
    let mut i = 0;
    while i < 128 {
        z[i] = pow_mod(17, bit_reverse(i, 7) as u64, Q as u64) as u16;
        i += 1;
    }
    z
};

// ζ^(2·BitRev7(i)+1) for the base-case multiplications.
const GAMMAS: [u16; 128] = {
    let mut g = [0u16; 128];
    let mut i = 0;
    while i < 128 {
        g[i] = pow_mod(17, 2 * bit_reverse(i, 7) as u64 + 1, Q as u64) as u16;
        i += 1;
    }
    g
};

// 128^-1 mod q, the inverse-NTT scale factor.
const INV_128: u16 = pow_mod(128, Q as u64 - 2, Q as u64) as u16;

#[inline(always)]
fn add(a: u16, b: u16) -> u16 {
    let s = u32::from(a) + u32::from(b);
    (s - Q * u32::from(s >= Q)) as u16
}

#[inline(always)]
fn sub(a: u16, b: u16) -> u16 {
    add(a, (Q as u16) - b)
}

#[inline(always)]
fn mul(a: u16, b: u16) -> u16 {
    (u32::from(a) * u32::from(b) % Q) as u16
}

type Poly = [u16; N];

fn ntt(f: &mut Poly) {
    let mut i = 1;
    let mut len = 128;
    while len >= 2 {
        for start in (0..N).step_by(2 * len) {
            let zeta = ZETAS[i];
            i += 1;
            for j in start..start + len {
                let t = mul(zeta, f[j + len]);
                f[j + len] = sub(f[j], t);
                f[j] = add(f[j], t);
            }
        }
        len >>= 1;
    }
}

fn inv_ntt(f: &mut Poly) {
    let mut i = 127;
    let mut len = 2;
    while len <= 128 {
        for start in (0..N).step_by(2 * len) {
            let zeta = ZETAS[i];
            i -= 1;
            for j in start..start + len {
                let t = f[j];
                f[j] = add(t, f[j + len]);
                f[j + len] = mul(zeta, sub(f[j + len], t));
            }
        }
        len <<= 1;
    }
    for c in f.iter_mut() {
        *c = mul(*c, INV_128);
    }
}

// Pairwise products modulo X^2 - γ_i in the NTT domain.
fn base_mul(a: &Poly, b: &Poly, acc: &mut Poly) {
    for i in 0..128 {
        let (a0, a1) = (a[2 * i], a[2 * i + 1]);
        let (b0, b1) = (b[2 * i], b[2 * i + 1]);
        acc[2 * i] = add(acc[2 * i], add(mul(a0, b0), mul(mul(a1, b1), GAMMAS[i])));
        acc[2 * i + 1] = add(acc[2 * i + 1], add(mul(a0, b1), mul(a1, b0)));
    }
}

fn compress(x: u16, d: u32) -> u16 {
    ((((u32::from(x) << d) + Q / 2) / Q) & ((1 << d) - 1)) as u16
}

fn decompress(y: u16, d: u32) -> u16 {
    ((u32::from(y) * Q + (1 << (d - 1))) >> d) as u16
}

fn pack_bits(coeffs: &Poly, d: u32, out: &mut [u8]) {
    debug_assert_eq!(out.len(), N * d as usize / 8);
    let mut acc = 0u32;
    let mut bits = 0u32;
    let mut at = 0;
    for &c in coeffs {
        acc |= u32::from(c) << bits;
        bits += d;
        while bits >= 8 {
            out[at] = acc as u8;
            at += 1;
            acc >>= 8;
            bits -= 8;
        }
    }
}

fn unpack_bits(data: &[u8], d: u32) -> Poly {
    debug_assert_eq!(data.len(), N * d as usize / 8);
    let mut coeffs = [0u16; N];
    let mut acc = 0u32;
    let mut bits = 0u32;
    let mut at = 0;
    for c in coeffs.iter_mut() {
        while bits < d {
            acc |= u32::from(data[at]) << bits;
            at += 1;
            bits += 8;
        }
        *c = (acc & ((1 << d) - 1)) as u16;
        acc >>= d;
        bits -= d;
    }
    coeffs
}

// 12-bit encoding with the FIPS 203 modulus check on decode.
fn decode_12(data: &[u8]) -> Result<Poly, Error> {
    let coeffs = unpack_bits(data, 12);
    if coeffs.iter().any(|&c| u32::from(c) >= Q) {
        return Err(Error::InvalidParameter);
    }
    Ok(coeffs)
}

// Uniform rejection sampling from SHAKE128(rho ‖ j ‖ i).
fn sample_ntt(rho: &[u8; SEED_SIZE], b0: u8, b1: u8) -> Poly {
    let mut xof = Shake128::new();
    xof.absorb(rho);
    xof.absorb(&[b0, b1]);

    let mut coeffs = [0u16; N];
    let mut have = 0;
    let mut block = [0u8; 168];
    while have < N {
        xof.squeeze(&mut block);
        for chunk in block.chunks_exact(3) {
            let d1 = u16::from(chunk[0]) | (u16::from(chunk[1] & 0x0f) << 8);
            let d2 = u16::from(chunk[1] >> 4) | (u16::from(chunk[2]) << 4);
            if u32::from(d1) < Q && have < N {
                coeffs[have] = d1;
                have += 1;
            }
            if u32::from(d2) < Q && have < N {
                coeffs[have] = d2;
                have += 1;
            }
        }
    }
    coeffs
}

// Centered binomial sampling from 64*eta bytes of PRF output.
fn sample_cbd(bytes: &[u8], eta: usize) -> Poly {
    let mut coeffs = [0u16; N];
    match eta {
        2 => {
            for (i, chunk) in bytes.chunks_exact(4).enumerate() {
                let t = u32::from_le_bytes(chunk.try_into().unwrap());
                let d = (t & 0x5555_5555) + ((t >> 1) & 0x5555_5555);
                for j in 0..8 {
                    let a = ((d >> (4 * j)) & 0x3) as u16;
                    let b = ((d >> (4 * j + 2)) & 0x3) as u16;
                    coeffs[8 * i + j] = sub(a, b);
                }
            }
        }
        3 => {
            for (i, chunk) in bytes.chunks_exact(3).enumerate() {
                let t = u32::from(chunk[0])
                    | (u32::from(chunk[1]) << 8)
                    | (u32::from(chunk[2]) << 16);
                let d = (t & 0x0024_9249) + ((t >> 1) & 0x0024_9249) + ((t >> 2) & 0x0024_9249);
                for j in 0..4 {
                    let a = ((d >> (6 * j)) & 0x7) as u16;
                    let b = ((d >> (6 * j + 3)) & 0x7) as u16;
                    coeffs[4 * i + j] = sub(a, b);
                }
            }
        }
        _ => unreachable!("eta is 2 or 3"),
    }
    coeffs
}

// PRF(sigma, nonce) batched four lanes at a time over the parallel Keccak
// state; trailing lanes repeat the last nonce and are discarded.
fn prf_batch(
    sigma: &[u8; SEED_SIZE],
    first_nonce: u8,
    count: usize,
    len: usize,
    mut sink: impl FnMut(usize, &[u8]),
) {
    debug_assert!(len <= 192);
    let mut done = 0;
    while done < count {
        let inputs: [[u8; SEED_SIZE + 1]; 4] = core::array::from_fn(|lane| {
            let nonce = first_nonce + (done + lane).min(count - 1) as u8;
            let mut input = [0u8; SEED_SIZE + 1];
            input[..SEED_SIZE].copy_from_slice(sigma);
            input[SEED_SIZE] = nonce;
            input
        });
        let mut outs = [[0u8; 192]; 4];
        {
            let [o0, o1, o2, o3] = &mut outs;
            shake256_x4(
                [&inputs[0], &inputs[1], &inputs[2], &inputs[3]],
                [&mut o0[..len], &mut o1[..len], &mut o2[..len], &mut o3[..len]],
            );
        }
        for lane in 0..4.min(count - done) {
            sink(done + lane, &outs[lane][..len]);
        }
        done += 4;
    }
}

struct Params {
    k: usize,
    eta1: usize,
    eta2: usize,
    du: u32,
    dv: u32,
}

impl Params {
    const fn ek_size(&self) -> usize {
        384 * self.k + SEED_SIZE
    }

    const fn dk_size(&self) -> usize {
        768 * self.k + 96
    }

    const fn ct_size(&self) -> usize {
        32 * (self.du as usize * self.k + self.dv as usize)
    }
}

fn gen_matrix(rho: &[u8; SEED_SIZE], k: usize, transposed: bool) -> Vec<Poly> {
    let mut rows = Vec::with_capacity(k * k);
    for i in 0..k {
        for j in 0..k {
            let (b0, b1) = if transposed { (i as u8, j as u8) } else { (j as u8, i as u8) };
            rows.push(sample_ntt(rho, b0, b1));
        }
    }
    rows
}

// K-PKE.KeyGen: expand Â from rho, sample s and e, t̂ = Â∘ŝ + ê.
fn pke_keygen(d: &[u8; SEED_SIZE], p: &Params, ek: &mut [u8], dk: &mut [u8]) {
    let mut g_in = [0u8; SEED_SIZE + 1];
    g_in[..SEED_SIZE].copy_from_slice(d);
    g_in[SEED_SIZE] = p.k as u8;
    let g = sha3_512(&g_in);
    let (rho, sigma) = g.split_at(SEED_SIZE);
    let rho: [u8; SEED_SIZE] = rho.try_into().unwrap();
    let sigma: Zeroizing<[u8; SEED_SIZE]> = Zeroizing::new(sigma.try_into().unwrap());

    let a = gen_matrix(&rho, p.k, false);

    let mut s = vec![[0u16; N]; p.k];
    let mut e = vec![[0u16; N]; p.k];
    prf_batch(&sigma, 0, 2 * p.k, 64 * p.eta1, |i, bytes| {
        let target = if i < p.k { &mut s[i] } else { &mut e[i - p.k] };
        *target = sample_cbd(bytes, p.eta1);
    });
    for poly in s.iter_mut().chain(e.iter_mut()) {
        ntt(poly);
    }

    for i in 0..p.k {
        let mut t = e[i];
        for j in 0..p.k {
            base_mul(&a[i * p.k + j], &s[j], &mut t);
        }
        pack_bits(&t, 12, &mut ek[384 * i..384 * (i + 1)]);
        pack_bits(&s[i], 12, &mut dk[384 * i..384 * (i + 1)]);
    }
    ek[384 * p.k..].copy_from_slice(&rho);

    for poly in s.iter_mut().chain(e.iter_mut()) {
        poly.zeroize();
    }
}

// K-PKE.Encrypt with explicit randomness r.
fn pke_encrypt(
    ek: &[u8],
    m: &[u8; SEED_SIZE],
    r: &[u8; SEED_SIZE],
    p: &Params,
    ct: &mut [u8],
) -> Result<(), Error> {
    let mut t = Vec::with_capacity(p.k);
    for i in 0..p.k {
        t.push(decode_12(&ek[384 * i..384 * (i + 1)])?);
    }
    let rho: [u8; SEED_SIZE] = ek[384 * p.k..].try_into().unwrap();
    let at = gen_matrix(&rho, p.k, true);

    let mut y = vec![[0u16; N]; p.k];
    prf_batch(r, 0, p.k, 64 * p.eta1, |i, bytes| y[i] = sample_cbd(bytes, p.eta1));
    let mut e1 = vec![[0u16; N]; p.k];
    let mut e2 = [0u16; N];
    prf_batch(r, p.k as u8, p.k + 1, 64 * p.eta2, |i, bytes| {
        if i < p.k {
            e1[i] = sample_cbd(bytes, p.eta2);
        } else {
            e2 = sample_cbd(bytes, p.eta2);
        }
    });

    for poly in y.iter_mut() {
        ntt(poly);
    }

    let du_bytes = 32 * p.du as usize;
    for i in 0..p.k {
        let mut u = [0u16; N];
        for j in 0..p.k {
            base_mul(&at[i * p.k + j], &y[j], &mut u);
        }
        inv_ntt(&mut u);
        for (c, n) in u.iter_mut().zip(e1[i]) {
            *c = add(*c, n);
        }
        let mut compressed = [0u16; N];
        for (dst, &src) in compressed.iter_mut().zip(&u) {
            *dst = compress(src, p.du);
        }
        pack_bits(&compressed, p.du, &mut ct[du_bytes * i..du_bytes * (i + 1)]);
    }

    let mut v = [0u16; N];
    for j in 0..p.k {
        base_mul(&t[j], &y[j], &mut v);
    }
    inv_ntt(&mut v);
    for (i, c) in v.iter_mut().enumerate() {
        let m_bit = u16::from((m[i / 8] >> (i % 8)) & 1);
        *c = add(add(*c, e2[i]), decompress(m_bit, 1));
    }
    let mut compressed = [0u16; N];
    for (dst, &src) in compressed.iter_mut().zip(&v) {
        *dst = compress(src, p.dv);
    }
    pack_bits(&compressed, p.dv, &mut ct[du_bytes * p.k..]);

    for poly in y.iter_mut() {
        poly.zeroize();
    }
    Ok(())
}

// K-PKE.Decrypt: m = Compress_1(v - invntt(ŝ∘ntt(u))).
fn pke_decrypt(dk: &[u8], ct: &[u8], p: &Params) -> [u8; SEED_SIZE] {
    let du_bytes = 32 * p.du as usize;
    let mut w = [0u16; N];
    for i in 0..p.k {
        let mut u = unpack_bits(&ct[du_bytes * i..du_bytes * (i + 1)], p.du);
        for c in u.iter_mut() {
            *c = decompress(*c, p.du);
        }
        ntt(&mut u);
        let s = unpack_bits(&dk[384 * i..384 * (i + 1)], 12);
        base_mul(&s, &u, &mut w);
    }
    inv_ntt(&mut w);

    let mut v = unpack_bits(&ct[du_bytes * p.k..], p.dv);
    for c in v.iter_mut() {
        *c = decompress(*c, p.dv);
    }

    let mut m = [0u8; SEED_SIZE];
    for i in 0..N {
        let bit = compress(sub(v[i], w[i]), 1) as u8;
        m[i / 8] |= bit << (i % 8);
    }
    m
}

fn keypair(p: &Params, d: &[u8; SEED_SIZE], z: &[u8; SEED_SIZE]) -> (Vec<u8>, Vec<u8>) {
    let mut ek = vec![0u8; p.ek_size()];
    let mut dk = vec![0u8; p.dk_size()];
    let pke_dk_len = 384 * p.k;
    {
        let (dk_pke, rest) = dk.split_at_mut(pke_dk_len);
        pke_keygen(d, p, &mut ek, dk_pke);
        let (ek_copy, rest) = rest.split_at_mut(p.ek_size());
        ek_copy.copy_from_slice(&ek);
        let (h, z_out) = rest.split_at_mut(SEED_SIZE);
        h.copy_from_slice(&sha3_256(&ek));
        z_out.copy_from_slice(z);
    }
    (ek, dk)
}

fn encapsulate(
    p: &Params,
    ek: &[u8],
    m: &[u8; SEED_SIZE],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    if ek.len() != p.ek_size() {
        return Err(Error::InvalidParameter);
    }
    let mut g_in = [0u8; 2 * SEED_SIZE];
    g_in[..SEED_SIZE].copy_from_slice(m);
    g_in[SEED_SIZE..].copy_from_slice(&sha3_256(ek));
    let g = Zeroizing::new(sha3_512(&g_in));
    let (key, r) = g.split_at(SEED_SIZE);

    let mut ct = vec![0u8; p.ct_size()];
    pke_encrypt(ek, m, r.try_into().unwrap(), p, &mut ct)?;
    Ok((ct, key.to_vec()))
}

fn decapsulate(p: &Params, ct: &[u8], dk: &[u8]) -> Result<(Vec<u8>, Decapsulation), Error> {
    if ct.len() != p.ct_size() || dk.len() != p.dk_size() {
        return Err(Error::InvalidParameter);
    }
    let pke_dk = &dk[..384 * p.k];
    let ek = &dk[384 * p.k..384 * p.k + p.ek_size()];
    let h = &dk[384 * p.k + p.ek_size()..384 * p.k + p.ek_size() + SEED_SIZE];
    let z = &dk[384 * p.k + p.ek_size() + SEED_SIZE..];

    let m = Zeroizing::new(pke_decrypt(pke_dk, ct, p));

    let mut g_in = [0u8; 2 * SEED_SIZE];
    g_in[..SEED_SIZE].copy_from_slice(m.as_ref());
    g_in[SEED_SIZE..].copy_from_slice(h);
    let g = Zeroizing::new(sha3_512(&g_in));
    let (key, r) = g.split_at(SEED_SIZE);

    // J(z ‖ c): the implicit-rejection secret.
    let mut reject_key = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
    let mut j = Shake256::new();
    j.absorb(z);
    j.absorb(ct);
    j.squeeze(reject_key.as_mut());

    let mut ct_prime = vec![0u8; p.ct_size()];
    pke_encrypt(ek, &m, r.try_into().unwrap(), p, &mut ct_prime)?;

    let accept = ct_prime.ct_eq(ct);
    let mut ss = reject_key.to_vec();
    for (s, k) in ss.iter_mut().zip(key) {
        s.conditional_assign(k, accept);
    }
    let status =
        if bool::from(accept) { Decapsulation::Ok } else { Decapsulation::ImplicitReject };
    Ok((ss, status))
}

macro_rules! mlkem_impl {
    ($name:ident, $params:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name;

        impl $name {
            const PARAMS: Params = $params;
        }

        impl Kem for $name {
            const PUBLIC_KEY_SIZE: usize = Self::PARAMS.ek_size();
            const SECRET_KEY_SIZE: usize = Self::PARAMS.dk_size();
            const CIPHERTEXT_SIZE: usize = Self::PARAMS.ct_size();
            const SHARED_SECRET_SIZE: usize = SHARED_SECRET_SIZE;

            fn keypair<R: rand_core::RngCore + rand_core::CryptoRng>(
                rng: &mut R,
            ) -> Result<(Vec<u8>, Vec<u8>), Error> {
                let mut d = Zeroizing::new([0u8; SEED_SIZE]);
                let mut z = Zeroizing::new([0u8; SEED_SIZE]);
                draw(rng, d.as_mut())?;
                draw(rng, z.as_mut())?;
                Ok(keypair(&Self::PARAMS, &d, &z))
            }

            fn encapsulate<R: rand_core::RngCore + rand_core::CryptoRng>(
                pk: &[u8],
                rng: &mut R,
            ) -> Result<(Vec<u8>, Vec<u8>), Error> {
                let mut m = Zeroizing::new([0u8; SEED_SIZE]);
                draw(rng, m.as_mut())?;
                encapsulate(&Self::PARAMS, pk, &m)
            }

            fn decapsulate(ct: &[u8], sk: &[u8]) -> Result<(Vec<u8>, Decapsulation), Error> {
                decapsulate(&Self::PARAMS, ct, sk)
            }
        }
    };
}

mlkem_impl!(
    MlKem512,
    Params { k: 2, eta1: 3, eta2: 2, du: 10, dv: 4 },
    "ML-KEM-512."
);
mlkem_impl!(
    MlKem768,
    Params { k: 3, eta1: 2, eta2: 2, du: 10, dv: 4 },
    "ML-KEM-768."
);
mlkem_impl!(
    MlKem1024,
    Params { k: 4, eta1: 2, eta2: 2, du: 11, dv: 5 },
    "ML-KEM-1024."
);
