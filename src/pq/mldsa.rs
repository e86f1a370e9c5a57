//! ML-DSA (FIPS 204), the module-lattice signature standardized from
//! CRYSTALS-Dilithium, in the 44/65/87 parameter sets with hedged signing.
//!
//! As in [`crate::pq::mlkem`], the NTT twiddle table is generated at
//! compile time, here from the 512th root of unity 1753. Rounding
//! (Power2Round, Decompose) is written from the standard's arithmetic
//! definitions over the public modulus rather than magic-constant
//! shortcuts.

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::pq::{draw, Signer};
use crate::sha3::{Shake128, Shake256};
use crate::Error;

const N: usize = 256;
const Q: i32 = 8380417;
const D: u32 = 13;
const SEED_SIZE: usize = 32;
const TR_SIZE: usize = 64;
const RND_SIZE: usize = 32;

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

// 1753^BitRev8(i) mod q.
const ZETAS: [i32; 256] = {
    let mut z = [0i32; 256];
    let mut i = 0;
    while i < 256 {
        z[i] = pow_mod(1753, bit_reverse(i, 8) as u64, Q as u64) as i32;
        i += 1;
    }
    z
};

const INV_256: i32 = pow_mod(256, Q as u64 - 2, Q as u64) as i32;

#[inline(always)]
fn add(a: i32, b: i32) -> i32 {
    let s = a + b;
    s - Q * i32::from(s >= Q)
}

#[inline(always)]
fn sub(a: i32, b: i32) -> i32 {
    add(a, Q - b)
}

#[inline(always)]
fn mul(a: i32, b: i32) -> i32 {
    (i64::from(a) * i64::from(b) % i64::from(Q)) as i32
}

#[inline(always)]
fn centered(a: i32) -> i32 {
    a - Q * i32::from(a > (Q - 1) / 2)
}

#[inline(always)]
fn canonical(a: i32) -> i32 {
    a + Q * i32::from(a < 0)
}

type Poly = [i32; N];

fn ntt(f: &mut Poly) {
    let mut i = 0;
    let mut len = 128;
    while len >= 1 {
        for start in (0..N).step_by(2 * len) {
            i += 1;
            let zeta = ZETAS[i];
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
    let mut i = 256;
    let mut len = 1;
    while len <= 128 {
        for start in (0..N).step_by(2 * len) {
            i -= 1;
            let zeta = ZETAS[i];
            for j in start..start + len {
                let t = f[j];
                f[j] = add(t, f[j + len]);
                f[j + len] = mul(zeta, sub(f[j + len], t));
            }
        }
        len <<= 1;
    }
    for c in f.iter_mut() {
        *c = mul(*c, INV_256);
    }
}

fn pointwise_acc(a: &Poly, b: &Poly, acc: &mut Poly) {
    for i in 0..N {
        acc[i] = add(acc[i], mul(a[i], b[i]));
    }
}

fn infinity_norm(f: &Poly) -> i32 {
    f.iter().map(|&c| centered(c).abs()).max().unwrap_or(0)
}

// r = r1·2^13 + r0 with r0 in (-2^12, 2^12].
fn power2round(r: i32) -> (i32, i32) {
    let r1 = (r + (1 << (D - 1)) - 1) >> D;
    (r1, r - (r1 << D))
}

// r = r1·2γ2 + r0 with r0 in (-γ2, γ2], folding the q-1 wraparound into
// the zero bucket.
fn decompose(r: i32, gamma2: i32) -> (i32, i32) {
    let rp = r.rem_euclid(2 * gamma2);
    let r0 = rp - 2 * gamma2 * i32::from(rp > gamma2);
    if r - r0 == Q - 1 {
        (0, r0 - 1)
    } else {
        ((r - r0) / (2 * gamma2), r0)
    }
}

// h = [HighBits(r) != HighBits(r + z)], both arguments canonical.
fn make_hint(z: i32, r: i32, gamma2: i32) -> bool {
    decompose(r, gamma2).0 != decompose((r + z).rem_euclid(Q), gamma2).0
}

fn use_hint(hint: bool, r: i32, gamma2: i32) -> i32 {
    let m = (Q - 1) / (2 * gamma2);
    let (r1, r0) = decompose(r, gamma2);
    if !hint {
        r1
    } else if r0 > 0 {
        (r1 + 1).rem_euclid(m)
    } else {
        (r1 - 1).rem_euclid(m)
    }
}

// Uniform sampling mod q from SHAKE128(rho ‖ le16(nonce)), 23-bit
// rejection.
fn expand_a_poly(rho: &[u8; SEED_SIZE], nonce: u16) -> Poly {
    let mut xof = Shake128::new();
    xof.absorb(rho);
    xof.absorb(&nonce.to_le_bytes());

    let mut f = [0i32; N];
    let mut have = 0;
    let mut block = [0u8; 168];
    while have < N {
        xof.squeeze(&mut block);
        for chunk in block.chunks_exact(3) {
            let t = i32::from(chunk[0])
                | (i32::from(chunk[1]) << 8)
                | (i32::from(chunk[2] & 0x7f) << 16);
            if t < Q && have < N {
                f[have] = t;
                have += 1;
            }
        }
    }
    f
}

// Short-vector sampling from SHAKE256(rho' ‖ le16(nonce)), nibble
// rejection.
fn expand_s_poly(rho_prime: &[u8; 64], nonce: u16, eta: i32) -> Poly {
    let mut xof = Shake256::new();
    xof.absorb(rho_prime);
    xof.absorb(&nonce.to_le_bytes());

    let mut f = [0i32; N];
    let mut have = 0;
    let mut block = [0u8; 136];
    while have < N {
        xof.squeeze(&mut block);
        for &byte in &block {
            for t in [i32::from(byte & 0x0f), i32::from(byte >> 4)] {
                if have == N {
                    break;
                }
                if eta == 2 && t < 15 {
                    f[have] = canonical(2 - (t % 5));
                    have += 1;
                } else if eta == 4 && t < 9 {
                    f[have] = canonical(4 - t);
                    have += 1;
                }
            }
        }
    }
    f
}

// Mask sampling: 2·γ1-range coefficients bit-unpacked from
// SHAKE256(rho'' ‖ le16(nonce)).
fn expand_mask_poly(rho2: &[u8; 64], nonce: u16, gamma1: i32) -> Poly {
    let bits = gamma1_bits(gamma1);
    let mut bytes = vec![0u8; N * bits / 8];
    let mut xof = Shake256::new();
    xof.absorb(rho2);
    xof.absorb(&nonce.to_le_bytes());
    xof.squeeze(&mut bytes);

    let mut f = [0i32; N];
    unpack(&bytes, bits, &mut f);
    for c in f.iter_mut() {
        *c = canonical(gamma1 - *c);
    }
    f
}

fn gamma1_bits(gamma1: i32) -> usize {
    if gamma1 == 1 << 17 {
        18
    } else {
        20
    }
}

fn sample_in_ball(c_tilde: &[u8], tau: usize) -> Poly {
    let mut xof = Shake256::new();
    xof.absorb(c_tilde);
    let mut signs = [0u8; 8];
    xof.squeeze(&mut signs);
    let mut sign_bits = u64::from_le_bytes(signs);

    let mut c = [0i32; N];
    for i in N - tau..N {
        let j = loop {
            let mut b = [0u8; 1];
            xof.squeeze(&mut b);
            if usize::from(b[0]) <= i {
                break usize::from(b[0]);
            }
        };
        c[i] = c[j];
        c[j] = if sign_bits & 1 == 1 { Q - 1 } else { 1 };
        sign_bits >>= 1;
    }
    c
}

// Fixed-width little-endian bit packing of non-negative values.
fn pack(values: &Poly, bits: usize, out: &mut [u8]) {
    debug_assert_eq!(out.len(), N * bits / 8);
    let mut acc = 0u64;
    let mut have = 0;
    let mut at = 0;
    for &v in values {
        debug_assert!(v >= 0 && (v as u64) < (1 << bits));
        acc |= (v as u64) << have;
        have += bits;
        while have >= 8 {
            out[at] = acc as u8;
            at += 1;
            acc >>= 8;
            have -= 8;
        }
    }
}

fn unpack(data: &[u8], bits: usize, out: &mut Poly) {
    debug_assert_eq!(data.len(), N * bits / 8);
    let mut acc = 0u64;
    let mut have = 0;
    let mut at = 0;
    for v in out.iter_mut() {
        while have < bits {
            acc |= u64::from(data[at]) << have;
            at += 1;
            have += 8;
        }
        *v = (acc & ((1 << bits) - 1)) as i32;
        acc >>= bits;
        have -= bits;
    }
}

struct Params {
    k: usize,
    l: usize,
    eta: i32,
    tau: usize,
    gamma1: i32,
    gamma2: i32,
    omega: usize,
    lambda: usize,
}

impl Params {
    const fn c_tilde_size(&self) -> usize {
        self.lambda / 4
    }

    const fn eta_bits(&self) -> usize {
        if self.eta == 2 {
            3
        } else {
            4
        }
    }

    const fn z_bits(&self) -> usize {
        if self.gamma1 == 1 << 17 {
            18
        } else {
            20
        }
    }

    const fn w1_bits(&self) -> usize {
        if self.gamma2 == (Q - 1) / 88 {
            6
        } else {
            4
        }
    }

    const fn beta(&self) -> i32 {
        self.tau as i32 * self.eta
    }

    const fn pk_size(&self) -> usize {
        SEED_SIZE + self.k * N * 10 / 8
    }

    const fn sk_size(&self) -> usize {
        2 * SEED_SIZE
            + TR_SIZE
            + (self.k + self.l) * N * self.eta_bits() / 8
            + self.k * N * 13 / 8
    }

    const fn sig_size(&self) -> usize {
        self.c_tilde_size() + self.l * N * self.z_bits() / 8 + self.omega + self.k
    }
}

fn expand_matrix(rho: &[u8; SEED_SIZE], p: &Params) -> Vec<Poly> {
    let mut a = Vec::with_capacity(p.k * p.l);
    for i in 0..p.k {
        for j in 0..p.l {
            a.push(expand_a_poly(rho, ((i as u16) << 8) + j as u16));
        }
    }
    a
}

// w = InvNTT(A ∘ NTT-domain v), one row at a time.
fn matrix_mul(a: &[Poly], v_hat: &[Poly], p: &Params) -> Vec<Poly> {
    let mut w = vec![[0i32; N]; p.k];
    for i in 0..p.k {
        for j in 0..p.l {
            pointwise_acc(&a[i * p.l + j], &v_hat[j], &mut w[i]);
        }
        inv_ntt(&mut w[i]);
    }
    w
}

fn pack_eta(f: &Poly, eta: i32, bits: usize, out: &mut [u8]) {
    let mut shifted = [0i32; N];
    for (d, &s) in shifted.iter_mut().zip(f) {
        *d = eta - centered(s);
    }
    pack(&shifted, bits, out);
}

fn unpack_eta(data: &[u8], eta: i32, bits: usize) -> Poly {
    let mut f = [0i32; N];
    unpack(data, bits, &mut f);
    for c in f.iter_mut() {
        *c = canonical(eta - *c);
    }
    f
}

fn hint_pack(hints: &[[bool; N]], p: &Params, out: &mut [u8]) {
    debug_assert_eq!(out.len(), p.omega + p.k);
    out.fill(0);
    let mut at = 0;
    for (i, poly) in hints.iter().enumerate() {
        for (j, &h) in poly.iter().enumerate() {
            if h {
                out[at] = j as u8;
                at += 1;
            }
        }
        out[p.omega + i] = at as u8;
    }
}

fn hint_unpack(data: &[u8], p: &Params) -> Result<Vec<[bool; N]>, Error> {
    let mut hints = vec![[false; N]; p.k];
    let mut at = 0usize;
    for i in 0..p.k {
        let end = usize::from(data[p.omega + i]);
        if end < at || end > p.omega {
            return Err(Error::AuthFailure);
        }
        for pos in at..end {
            // positions must be strictly increasing for a canonical encoding
            if pos > at && data[pos] <= data[pos - 1] {
                return Err(Error::AuthFailure);
            }
            hints[i][usize::from(data[pos])] = true;
        }
        at = end;
    }
    if data[at..p.omega].iter().any(|&b| b != 0) {
        return Err(Error::AuthFailure);
    }
    Ok(hints)
}

fn keygen_internal(xi: &[u8; SEED_SIZE], p: &Params) -> (Vec<u8>, Vec<u8>) {
    let mut h = Shake256::new();
    h.absorb(xi);
    h.absorb(&[p.k as u8, p.l as u8]);
    let mut expanded = Zeroizing::new([0u8; 128]);
    h.squeeze(expanded.as_mut());
    let rho: [u8; SEED_SIZE] = expanded[..32].try_into().unwrap();
    let rho_prime: Zeroizing<[u8; 64]> = Zeroizing::new(expanded[32..96].try_into().unwrap());
    let key: Zeroizing<[u8; SEED_SIZE]> = Zeroizing::new(expanded[96..].try_into().unwrap());

    let a = expand_matrix(&rho, p);
    let mut s1 = vec![[0i32; N]; p.l];
    let mut s2 = vec![[0i32; N]; p.k];
    for (i, poly) in s1.iter_mut().enumerate() {
        *poly = expand_s_poly(&rho_prime, i as u16, p.eta);
    }
    for (i, poly) in s2.iter_mut().enumerate() {
        *poly = expand_s_poly(&rho_prime, (p.l + i) as u16, p.eta);
    }

    let mut s1_hat = s1.clone();
    for poly in s1_hat.iter_mut() {
        ntt(poly);
    }
    let mut t = matrix_mul(&a, &s1_hat, p);
    for (ti, s2i) in t.iter_mut().zip(&s2) {
        for (c, &e) in ti.iter_mut().zip(s2i) {
            *c = add(*c, e);
        }
    }

    let mut pk = vec![0u8; p.pk_size()];
    pk[..SEED_SIZE].copy_from_slice(&rho);
    let mut t0s = vec![[0i32; N]; p.k];
    for i in 0..p.k {
        let mut t1 = [0i32; N];
        for j in 0..N {
            let (high, low) = power2round(t[i][j]);
            t1[j] = high;
            t0s[i][j] = low;
        }
        pack(&t1, 10, &mut pk[SEED_SIZE + 320 * i..SEED_SIZE + 320 * (i + 1)]);
    }

    let mut tr = [0u8; TR_SIZE];
    let mut h = Shake256::new();
    h.absorb(&pk);
    h.squeeze(&mut tr);

    let mut sk = vec![0u8; p.sk_size()];
    let eta_bytes = N * p.eta_bits() / 8;
    let mut at = 0;
    sk[at..at + SEED_SIZE].copy_from_slice(&rho);
    at += SEED_SIZE;
    sk[at..at + SEED_SIZE].copy_from_slice(key.as_ref());
    at += SEED_SIZE;
    sk[at..at + TR_SIZE].copy_from_slice(&tr);
    at += TR_SIZE;
    for poly in &s1 {
        pack_eta(poly, p.eta, p.eta_bits(), &mut sk[at..at + eta_bytes]);
        at += eta_bytes;
    }
    for poly in &s2 {
        pack_eta(poly, p.eta, p.eta_bits(), &mut sk[at..at + eta_bytes]);
        at += eta_bytes;
    }
    for t0 in &t0s {
        let mut shifted = [0i32; N];
        for (d, &s) in shifted.iter_mut().zip(t0) {
            *d = (1 << (D - 1)) - s;
        }
        pack(&shifted, 13, &mut sk[at..at + 416]);
        at += 416;
    }

    for poly in s1.iter_mut().chain(s2.iter_mut()).chain(s1_hat.iter_mut()) {
        poly.zeroize();
    }
    (pk, sk)
}

struct SecretKey {
    rho: [u8; SEED_SIZE],
    key: Zeroizing<[u8; SEED_SIZE]>,
    tr: [u8; TR_SIZE],
    s1_hat: Vec<Poly>,
    s2_hat: Vec<Poly>,
    t0_hat: Vec<Poly>,
}

fn parse_sk(sk: &[u8], p: &Params) -> SecretKey {
    let eta_bytes = N * p.eta_bits() / 8;
    let mut at = 0;
    let rho: [u8; SEED_SIZE] = sk[at..at + SEED_SIZE].try_into().unwrap();
    at += SEED_SIZE;
    let key = Zeroizing::new(sk[at..at + SEED_SIZE].try_into().unwrap());
    at += SEED_SIZE;
    let tr: [u8; TR_SIZE] = sk[at..at + TR_SIZE].try_into().unwrap();
    at += TR_SIZE;

    let mut s1_hat = Vec::with_capacity(p.l);
    for _ in 0..p.l {
        let mut poly = unpack_eta(&sk[at..at + eta_bytes], p.eta, p.eta_bits());
        at += eta_bytes;
        ntt(&mut poly);
        s1_hat.push(poly);
    }
    let mut s2_hat = Vec::with_capacity(p.k);
    for _ in 0..p.k {
        let mut poly = unpack_eta(&sk[at..at + eta_bytes], p.eta, p.eta_bits());
        at += eta_bytes;
        ntt(&mut poly);
        s2_hat.push(poly);
    }
    let mut t0_hat = Vec::with_capacity(p.k);
    for _ in 0..p.k {
        let mut packed = [0i32; N];
        unpack(&sk[at..at + 416], 13, &mut packed);
        at += 416;
        let mut poly = [0i32; N];
        for (c, &v) in poly.iter_mut().zip(&packed) {
            *c = canonical((1 << (D - 1)) - v);
        }
        ntt(&mut poly);
        t0_hat.push(poly);
    }

    SecretKey { rho, key, tr, s1_hat, s2_hat, t0_hat }
}

fn message_representative(tr: &[u8; TR_SIZE], msg: &[u8]) -> Zeroizing<[u8; 64]> {
    // pure ML-DSA: M' = 0x00 ‖ |ctx| ‖ ctx ‖ M with an empty context
    let mut h = Shake256::new();
    h.absorb(tr);
    h.absorb(&[0u8, 0u8]);
    h.absorb(msg);
    let mut mu = Zeroizing::new([0u8; 64]);
    h.squeeze(mu.as_mut());
    mu
}

fn sign_internal(sk: &[u8], msg: &[u8], rnd: &[u8; RND_SIZE], p: &Params) -> Result<Vec<u8>, Error> {
    let secret = parse_sk(sk, p);
    let a = expand_matrix(&secret.rho, p);
    let mu = message_representative(&secret.tr, msg);

    let mut h = Shake256::new();
    h.absorb(secret.key.as_ref());
    h.absorb(rnd);
    h.absorb(mu.as_ref());
    let mut rho2 = Zeroizing::new([0u8; 64]);
    h.squeeze(rho2.as_mut());

    let w1_bytes = N * p.w1_bits() / 8;
    let mut sig = vec![0u8; p.sig_size()];
    let mut kappa: u16 = 0;

    loop {
        if usize::from(kappa) + p.l > usize::from(u16::MAX) {
            return Err(Error::InvalidParameter);
        }

        let mut y = vec![[0i32; N]; p.l];
        for (i, poly) in y.iter_mut().enumerate() {
            *poly = expand_mask_poly(&rho2, kappa + i as u16, p.gamma1);
        }
        kappa += p.l as u16;

        let mut y_hat = y.clone();
        for poly in y_hat.iter_mut() {
            ntt(poly);
        }
        let w = matrix_mul(&a, &y_hat, p);

        let mut w1_packed = vec![0u8; p.k * w1_bytes];
        for (i, wi) in w.iter().enumerate() {
            let mut w1 = [0i32; N];
            for (c, &v) in w1.iter_mut().zip(wi) {
                *c = decompose(v, p.gamma2).0;
            }
            pack(&w1, p.w1_bits(), &mut w1_packed[i * w1_bytes..(i + 1) * w1_bytes]);
        }

        let mut xof = Shake256::new();
        xof.absorb(mu.as_ref());
        xof.absorb(&w1_packed);
        let mut c_tilde = vec![0u8; p.c_tilde_size()];
        xof.squeeze(&mut c_tilde);

        let mut c_hat = sample_in_ball(&c_tilde, p.tau);
        ntt(&mut c_hat);

        // z = y + c·s1
        let mut z = vec![[0i32; N]; p.l];
        let mut ok = true;
        for i in 0..p.l {
            let mut cs1 = [0i32; N];
            pointwise_acc(&c_hat, &secret.s1_hat[i], &mut cs1);
            inv_ntt(&mut cs1);
            for j in 0..N {
                z[i][j] = add(y[i][j], cs1[j]);
            }
            if infinity_norm(&z[i]) >= p.gamma1 - p.beta() {
                ok = false;
                break;
            }
        }
        if !ok {
            continue;
        }

        // r0 = LowBits(w - c·s2); hints against +c·t0
        let mut hints = vec![[false; N]; p.k];
        let mut hint_count = 0usize;
        for i in 0..p.k {
            let mut cs2 = [0i32; N];
            pointwise_acc(&c_hat, &secret.s2_hat[i], &mut cs2);
            inv_ntt(&mut cs2);
            let mut ct0 = [0i32; N];
            pointwise_acc(&c_hat, &secret.t0_hat[i], &mut ct0);
            inv_ntt(&mut ct0);

            let mut r0_norm = 0;
            for j in 0..N {
                let r = sub(w[i][j], cs2[j]);
                r0_norm = r0_norm.max(decompose(r, p.gamma2).1.abs());
                let with_hint = add(r, ct0[j]);
                hints[i][j] = make_hint(sub(Q, ct0[j]), with_hint, p.gamma2);
            }
            let ct0_norm = infinity_norm(&ct0);
            if r0_norm >= p.gamma2 - p.beta() || ct0_norm >= p.gamma2 {
                ok = false;
                break;
            }
            hint_count += hints[i].iter().filter(|&&h| h).count();
        }
        if !ok || hint_count > p.omega {
            continue;
        }

        let z_bytes = N * p.z_bits() / 8;
        let mut at = 0;
        sig[at..at + c_tilde.len()].copy_from_slice(&c_tilde);
        at += c_tilde.len();
        for zi in &z {
            let mut shifted = [0i32; N];
            for (d, &s) in shifted.iter_mut().zip(zi) {
                *d = p.gamma1 - centered(s);
            }
            pack(&shifted, p.z_bits(), &mut sig[at..at + z_bytes]);
            at += z_bytes;
        }
        hint_pack(&hints, p, &mut sig[at..]);
        return Ok(sig);
    }
}

fn verify_internal(pk: &[u8], msg: &[u8], sig: &[u8], p: &Params) -> Result<(), Error> {
    if pk.len() != p.pk_size() || sig.len() != p.sig_size() {
        return Err(Error::InvalidParameter);
    }

    let rho: [u8; SEED_SIZE] = pk[..SEED_SIZE].try_into().unwrap();
    let c_tilde = &sig[..p.c_tilde_size()];
    let z_bytes = N * p.z_bits() / 8;

    let mut z = vec![[0i32; N]; p.l];
    for (i, zi) in z.iter_mut().enumerate() {
        let at = p.c_tilde_size() + i * z_bytes;
        let mut shifted = [0i32; N];
        unpack(&sig[at..at + z_bytes], p.z_bits(), &mut shifted);
        for (c, &v) in zi.iter_mut().zip(&shifted) {
            *c = canonical(p.gamma1 - v);
        }
        if infinity_norm(zi) >= p.gamma1 - p.beta() {
            return Err(Error::AuthFailure);
        }
    }
    let hints = hint_unpack(&sig[p.c_tilde_size() + p.l * z_bytes..], p)?;

    let a = expand_matrix(&rho, p);
    let mut tr = [0u8; TR_SIZE];
    let mut h = Shake256::new();
    h.absorb(pk);
    h.squeeze(&mut tr);
    let mu = message_representative(&tr, msg);

    let mut c_hat = sample_in_ball(c_tilde, p.tau);
    ntt(&mut c_hat);

    for poly in z.iter_mut() {
        ntt(poly);
    }

    let w1_bytes = N * p.w1_bits() / 8;
    let mut w1_packed = vec![0u8; p.k * w1_bytes];
    for i in 0..p.k {
        // w' = A·z - c·t1·2^d
        let mut w = [0i32; N];
        for j in 0..p.l {
            pointwise_acc(&a[i * p.l + j], &z[j], &mut w);
        }

        let mut t1 = [0i32; N];
        unpack(&pk[SEED_SIZE + 320 * i..SEED_SIZE + 320 * (i + 1)], 10, &mut t1);
        for c in t1.iter_mut() {
            *c <<= D;
        }
        ntt(&mut t1);
        let mut ct1 = [0i32; N];
        pointwise_acc(&c_hat, &t1, &mut ct1);
        for (c, &s) in w.iter_mut().zip(&ct1) {
            *c = sub(*c, s);
        }
        inv_ntt(&mut w);

        let mut w1 = [0i32; N];
        for (c, (&v, &hint)) in w1.iter_mut().zip(w.iter().zip(&hints[i])) {
            *c = use_hint(hint, v, p.gamma2);
        }
        pack(&w1, p.w1_bits(), &mut w1_packed[i * w1_bytes..(i + 1) * w1_bytes]);
    }

    let mut xof = Shake256::new();
    xof.absorb(mu.as_ref());
    xof.absorb(&w1_packed);
    let mut expected = vec![0u8; p.c_tilde_size()];
    xof.squeeze(&mut expected);

    if bool::from(expected.ct_eq(c_tilde)) {
        Ok(())
    } else {
        Err(Error::AuthFailure)
    }
}

macro_rules! mldsa_impl {
    ($name:ident, $params:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name;

        impl $name {
            const PARAMS: Params = $params;
        }

        impl Signer for $name {
            const PUBLIC_KEY_SIZE: usize = Self::PARAMS.pk_size();
            const SECRET_KEY_SIZE: usize = Self::PARAMS.sk_size();
            const SIGNATURE_SIZE: usize = Self::PARAMS.sig_size();

            fn keypair<R: rand_core::RngCore + rand_core::CryptoRng>(
                rng: &mut R,
            ) -> Result<(Vec<u8>, Vec<u8>), Error> {
                let mut xi = Zeroizing::new([0u8; SEED_SIZE]);
                draw(rng, xi.as_mut())?;
                Ok(keygen_internal(&xi, &Self::PARAMS))
            }

            fn sign<R: rand_core::RngCore + rand_core::CryptoRng>(
                msg: &[u8],
                sk: &[u8],
                rng: &mut R,
            ) -> Result<Vec<u8>, Error> {
                if sk.len() != Self::PARAMS.sk_size() {
                    return Err(Error::InvalidParameter);
                }
                let mut rnd = Zeroizing::new([0u8; RND_SIZE]);
                draw(rng, rnd.as_mut())?;
                let sig = sign_internal(sk, msg, &rnd, &Self::PARAMS)?;
                let mut signed = sig;
                signed.extend_from_slice(msg);
                Ok(signed)
            }

            fn open(signed: &[u8], pk: &[u8]) -> Result<Vec<u8>, Error> {
                if signed.len() < Self::PARAMS.sig_size() {
                    return Err(Error::InvalidParameter);
                }
                let (sig, msg) = signed.split_at(Self::PARAMS.sig_size());
                verify_internal(pk, msg, sig, &Self::PARAMS)?;
                Ok(msg.to_vec())
            }
        }
    };
}

mldsa_impl!(
    MlDsa44,
    Params {
        k: 4,
        l: 4,
        eta: 2,
        tau: 39,
        gamma1: 1 << 17,
        gamma2: (Q - 1) / 88,
        omega: 80,
        lambda: 128,
    },
    "ML-DSA-44."
);
mldsa_impl!(
    MlDsa65,
    Params {
        k: 6,
        l: 5,
        eta: 4,
        tau: 49,
        gamma1: 1 << 19,
        gamma2: (Q - 1) / 32,
        omega: 55,
        lambda: 192,
    },
    "ML-DSA-65."
);
mldsa_impl!(
    MlDsa87,
    Params {
        k: 8,
        l: 7,
        eta: 2,
        tau: 60,
        gamma1: 1 << 19,
        gamma2: (Q - 1) / 32,
        omega: 75,
        lambda: 256,
    },
    "ML-DSA-87."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::testutil::SeedRng;

    #[test]
    fn ntt_round_trips() {
        let mut f = [0i32; N];
        for (i, c) in f.iter_mut().enumerate() {
            *c = (i as i32 * 2077 + 5) % Q;
        }
        let original = f;
        ntt(&mut f);
        inv_ntt(&mut f);
        assert_eq!(f, original);
    }

    #[test]
    fn pointwise_matches_schoolbook() {
        let a = expand_a_poly(&[3u8; 32], 0);
        let b = expand_a_poly(&[4u8; 32], 1);

        let mut expected = [0i32; N];
        for i in 0..N {
            for j in 0..N {
                let p = mul(a[i], b[j]);
                if i + j < N {
                    expected[i + j] = add(expected[i + j], p);
                } else {
                    expected[i + j - N] = sub(expected[i + j - N], p);
                }
            }
        }

        let (mut fa, mut fb) = (a, b);
        ntt(&mut fa);
        ntt(&mut fb);
        let mut fc = [0i32; N];
        pointwise_acc(&fa, &fb, &mut fc);
        inv_ntt(&mut fc);
        assert_eq!(fc, expected);
    }

    #[test]
    fn rounding_identities() {
        for r in [0, 1, 4095, 4096, 8191, 12345, Q - 2, Q - 1] {
            let (r1, r0) = power2round(r);
            assert_eq!(canonical((r1 << D) + r0 - Q * i32::from((r1 << D) + r0 >= Q)), r);
            assert!(r0 > -(1 << (D - 1)) && r0 <= 1 << (D - 1));

            for gamma2 in [(Q - 1) / 88, (Q - 1) / 32] {
                let (d1, d0) = decompose(r, gamma2);
                assert!((d0 > -gamma2 && d0 <= gamma2) || (d1 == 0));
                let rebuilt = (d1 * 2 * gamma2 + d0).rem_euclid(Q);
                assert_eq!(rebuilt, r);
            }
        }
    }

    #[test]
    fn hints_recover_high_bits() {
        let gamma2 = (Q - 1) / 88;
        for r in [0, 95231, 95232, 190464, 1234567, Q - 1] {
            for z in [-250, -1, 0, 1, 77, 250] {
                    let shifted = (r + z).rem_euclid(Q);
                let hint = make_hint(canonical(-z), shifted, gamma2);
                let recovered = use_hint(hint, shifted, gamma2);
                assert_eq!(recovered, decompose(r, gamma2).0, "r={r} z={z}");
            }
        }
    }

    #[test]
    fn sample_in_ball_weight() {
        for tau in [39usize, 49, 60] {
            let c = sample_in_ball(&[0xabu8; 32], tau);
            let weight = c.iter().filter(|&&v| v != 0).count();
            assert_eq!(weight, tau);
            assert!(c.iter().all(|&v| v == 0 || v == 1 || v == Q - 1));
        }
    }

    fn round_trip<S: Signer>() {
        let mut rng = SeedRng::new(b"mldsa round trip");
        let (pk, sk) = S::keypair(&mut rng).unwrap();
        assert_eq!(pk.len(), S::PUBLIC_KEY_SIZE);
        assert_eq!(sk.len(), S::SECRET_KEY_SIZE);

        for msg_len in [0usize, 32, 64, 128] {
            let msg: Vec<u8> = (0..msg_len).map(|i| i as u8).collect();
            let signed = S::sign(&msg, &sk, &mut rng).unwrap();
            assert_eq!(signed.len(), S::SIGNATURE_SIZE + msg_len);
            assert_eq!(S::open(&signed, &pk).unwrap(), msg);
        }
    }

    #[test]
    fn mldsa44_round_trip() {
        round_trip::<MlDsa44>();
    }

    #[test]
    fn mldsa65_round_trip() {
        round_trip::<MlDsa65>();
    }

    #[test]
    fn mldsa87_round_trip() {
        round_trip::<MlDsa87>();
    }

    #[test]
    fn tampering_fails_verification() {
        let mut rng = SeedRng::new(b"mldsa tamper");
        let (pk, sk) = MlDsa44::keypair(&mut rng).unwrap();
        let msg = b"an important message";
        let signed = MlDsa44::sign(msg, &sk, &mut rng).unwrap();

        for flip in [0, 100, MlDsa44::SIGNATURE_SIZE - 1, signed.len() - 1] {
            let mut bad = signed.clone();
            bad[flip] ^= 1;
            assert!(MlDsa44::open(&bad, &pk).is_err(), "flip at {flip} accepted");
        }
    }

    #[test]
    fn flipped_secret_key_produces_invalid_signatures() {
        let mut rng = SeedRng::new(b"mldsa key sensitivity");
        let (pk, sk) = MlDsa44::keypair(&mut rng).unwrap();

        // Flip a bit inside the packed s1 region.
        let mut bad_sk = sk.clone();
        bad_sk[2 * SEED_SIZE + TR_SIZE + 10] ^= 1;
        let signed = MlDsa44::sign(b"msg", &bad_sk, &mut rng).unwrap();
        assert!(MlDsa44::open(&signed, &pk).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let mut rng = SeedRng::new(b"mldsa wrong key");
        let (_, sk) = MlDsa65::keypair(&mut rng).unwrap();
        let (other_pk, _) = MlDsa65::keypair(&mut rng).unwrap();
        let signed = MlDsa65::sign(b"msg", &sk, &mut rng).unwrap();
        assert!(MlDsa65::open(&signed, &other_pk).is_err());
    }
}
