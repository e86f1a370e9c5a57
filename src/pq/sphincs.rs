//! SPHINCS+ (SHAKE-128f-simple): the stateless hash-based signature.
//!
//! Everything is plumbing over SHAKE256: WOTS+ chains for the hypertree
//! leaves, FORS few-time trees for the message digest, and 22 XMSS layers
//! of height 3. The f ("fast") parameter set keeps the subtrees small
//! enough to rebuild whole layers per signature instead of streaming
//! treehash state.

use zeroize::Zeroizing;

use crate::pq::{draw, Signer};
use crate::sha3::Shake256;
use crate::Error;

const SPX_N: usize = 16;
const FULL_HEIGHT: usize = 66;
const LAYERS: usize = 22;
const TREE_HEIGHT: usize = 3; // full_height / layers
const FORS_HEIGHT: usize = 6;
const FORS_TREES: usize = 33;
const WOTS_W: u32 = 16;
const WOTS_LEN1: usize = 32;
const WOTS_LEN2: usize = 3;
const WOTS_LEN: usize = WOTS_LEN1 + WOTS_LEN2;
const MD_BYTES: usize = 25; // ceil(k·a / 8)
const DIGEST_BYTES: usize = MD_BYTES + 8 + 1;

const PK_SIZE: usize = 2 * SPX_N;
const SK_SIZE: usize = 4 * SPX_N;
const SIG_SIZE: usize = SPX_N
    + FORS_TREES * (FORS_HEIGHT + 1) * SPX_N
    + LAYERS * (WOTS_LEN + TREE_HEIGHT) * SPX_N;

// Address word types.
const ADDR_WOTS_HASH: u32 = 0;
const ADDR_WOTS_PK: u32 = 1;
const ADDR_TREE: u32 = 2;
const ADDR_FORS_TREE: u32 = 3;
const ADDR_FORS_ROOTS: u32 = 4;
const ADDR_WOTS_PRF: u32 = 5;
const ADDR_FORS_PRF: u32 = 6;

/// The 32-byte hash address: layer ‖ tree ‖ type ‖ three type-specific
/// words, all big-endian.
#[derive(Clone, Copy, Default)]
struct Adrs([u8; 32]);

impl Adrs {
    fn new(layer: u32, tree: u64) -> Adrs {
        let mut a = Adrs([0u8; 32]);
        a.0[..4].copy_from_slice(&layer.to_be_bytes());
        a.0[8..16].copy_from_slice(&tree.to_be_bytes());
        a
    }

    fn set_type(&mut self, t: u32) {
        self.0[16..20].copy_from_slice(&t.to_be_bytes());
        self.0[20..].fill(0);
    }

    fn set_keypair(&mut self, v: u32) {
        self.0[20..24].copy_from_slice(&v.to_be_bytes());
    }

    fn set_chain(&mut self, v: u32) {
        self.0[24..28].copy_from_slice(&v.to_be_bytes());
    }

    // tree height and hash index share words with chain/hash addresses
    fn set_height(&mut self, v: u32) {
        self.set_chain(v);
    }

    fn set_hash(&mut self, v: u32) {
        self.0[28..].copy_from_slice(&v.to_be_bytes());
    }

    fn set_index(&mut self, v: u32) {
        self.set_hash(v);
    }
}

type Node = [u8; SPX_N];

// The simple tweakable hash: SHAKE256(pk_seed ‖ adrs ‖ message parts).
fn thash(pk_seed: &[u8], adrs: &Adrs, parts: &[&[u8]]) -> Node {
    let mut xof = Shake256::new();
    xof.absorb(pk_seed);
    xof.absorb(&adrs.0);
    for part in parts {
        xof.absorb(part);
    }
    let mut out = [0u8; SPX_N];
    xof.squeeze(&mut out);
    out
}

fn prf_addr(pk_seed: &[u8], sk_seed: &[u8], adrs: &Adrs) -> Node {
    let mut xof = Shake256::new();
    xof.absorb(pk_seed);
    xof.absorb(&adrs.0);
    xof.absorb(sk_seed);
    let mut out = [0u8; SPX_N];
    xof.squeeze(&mut out);
    out
}

fn chain(pk_seed: &[u8], node: &mut Node, start: u32, steps: u32, adrs: &mut Adrs) {
    for i in start..start + steps {
        adrs.set_hash(i);
        *node = thash(pk_seed, adrs, &[node.as_slice()]);
    }
}

fn base_w(input: &[u8], digits: &mut [u32]) {
    for (i, d) in digits.iter_mut().enumerate() {
        let byte = input[i / 2];
        *d = u32::from(if i % 2 == 0 { byte >> 4 } else { byte & 0x0f });
    }
}

// Message digits plus the left-shifted checksum digits.
fn wots_digits(msg: &Node) -> [u32; WOTS_LEN] {
    let mut digits = [0u32; WOTS_LEN];
    base_w(msg, &mut digits[..WOTS_LEN1]);
    let csum: u32 = digits[..WOTS_LEN1].iter().map(|&d| WOTS_W - 1 - d).sum::<u32>() << 4;
    base_w(&csum.to_be_bytes()[2..], &mut digits[WOTS_LEN1..]);
    digits
}

fn wots_leaf(sk_seed: &[u8], pk_seed: &[u8], layer: u32, tree: u64, keypair: u32) -> Node {
    let mut parts = [[0u8; SPX_N]; WOTS_LEN];
    let mut adrs = Adrs::new(layer, tree);
    for (i, part) in parts.iter_mut().enumerate() {
        adrs.set_type(ADDR_WOTS_PRF);
        adrs.set_keypair(keypair);
        adrs.set_chain(i as u32);
        *part = prf_addr(pk_seed, sk_seed, &adrs);
        adrs.set_type(ADDR_WOTS_HASH);
        adrs.set_keypair(keypair);
        adrs.set_chain(i as u32);
        chain(pk_seed, part, 0, WOTS_W - 1, &mut adrs);
    }
    adrs.set_type(ADDR_WOTS_PK);
    adrs.set_keypair(keypair);
    let flat: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
    thash(pk_seed, &adrs, &flat)
}

// Root of one height-3 XMSS subtree; collects the auth path for
// `leaf_idx` when given.
fn xmss_root(
    sk_seed: &[u8],
    pk_seed: &[u8],
    layer: u32,
    tree: u64,
    leaf_idx: Option<usize>,
    mut auth: Option<&mut [u8]>,
) -> Node {
    let mut nodes: Vec<Node> = (0..1 << TREE_HEIGHT)
        .map(|j| wots_leaf(sk_seed, pk_seed, layer, tree, j as u32))
        .collect();

    let mut adrs = Adrs::new(layer, tree);
    adrs.set_type(ADDR_TREE);
    let mut idx = leaf_idx.unwrap_or(0);
    for h in 1..=TREE_HEIGHT {
        if let Some(auth) = auth.as_deref_mut() {
            auth[(h - 1) * SPX_N..h * SPX_N].copy_from_slice(&nodes[idx ^ 1]);
        }
        let pairs = nodes.len() / 2;
        for j in 0..pairs {
            adrs.set_height(h as u32);
            adrs.set_index(j as u32);
            nodes[j] = thash(pk_seed, &adrs, &[&nodes[2 * j], &nodes[2 * j + 1]]);
        }
        nodes.truncate(pairs);
        idx >>= 1;
    }
    nodes[0]
}

fn root_from_auth(
    pk_seed: &[u8],
    leaf: &Node,
    leaf_idx: usize,
    auth: &[u8],
    height: usize,
    adrs: &mut Adrs,
) -> Node {
    let mut node = *leaf;
    let mut idx = leaf_idx;
    for h in 1..=height {
        adrs.set_height(h as u32);
        adrs.set_index((idx >> 1) as u32);
        let sibling = &auth[(h - 1) * SPX_N..h * SPX_N];
        node = if idx & 1 == 1 {
            thash(pk_seed, adrs, &[sibling, &node])
        } else {
            thash(pk_seed, adrs, &[&node, sibling])
        };
        idx >>= 1;
    }
    node
}

fn fors_sk(sk_seed: &[u8], pk_seed: &[u8], tree: u64, keypair: u32, index: u32) -> Node {
    let mut adrs = Adrs::new(0, tree);
    adrs.set_type(ADDR_FORS_PRF);
    adrs.set_keypair(keypair);
    adrs.set_index(index);
    prf_addr(pk_seed, sk_seed, &adrs)
}

// Root of FORS tree `t`, collecting the auth path for its chosen leaf.
fn fors_root(
    sk_seed: &[u8],
    pk_seed: &[u8],
    tree: u64,
    keypair: u32,
    t: usize,
    leaf_idx: usize,
    mut auth: Option<&mut [u8]>,
) -> Node {
    let leaves = 1usize << FORS_HEIGHT;
    let mut adrs = Adrs::new(0, tree);
    adrs.set_type(ADDR_FORS_TREE);
    adrs.set_keypair(keypair);

    let mut nodes: Vec<Node> = (0..leaves)
        .map(|j| {
            let index = (t * leaves + j) as u32;
            let sk = fors_sk(sk_seed, pk_seed, tree, keypair, index);
            adrs.set_height(0);
            adrs.set_index(index);
            thash(pk_seed, &adrs, &[&sk])
        })
        .collect();

    let mut idx = leaf_idx;
    for h in 1..=FORS_HEIGHT {
        if let Some(auth) = auth.as_deref_mut() {
            auth[(h - 1) * SPX_N..h * SPX_N].copy_from_slice(&nodes[idx ^ 1]);
        }
        let pairs = nodes.len() / 2;
        for j in 0..pairs {
            adrs.set_height(h as u32);
            adrs.set_index(((t << (FORS_HEIGHT - h)) + j) as u32);
            nodes[j] = thash(pk_seed, &adrs, &[&nodes[2 * j], &nodes[2 * j + 1]]);
        }
        nodes.truncate(pairs);
        idx >>= 1;
    }
    nodes[0]
}

struct Digest {
    indices: [usize; FORS_TREES],
    tree: u64,
    leaf: usize,
}

fn digest_message(r: &[u8], pk_seed: &[u8], pk_root: &[u8], msg: &[u8]) -> Digest {
    let mut xof = Shake256::new();
    xof.absorb(r);
    xof.absorb(pk_seed);
    xof.absorb(pk_root);
    xof.absorb(msg);
    let mut digest = [0u8; DIGEST_BYTES];
    xof.squeeze(&mut digest);

    // k indices of a bits from the big-endian bit stream
    let mut indices = [0usize; FORS_TREES];
    let mut bit = 0;
    for index in indices.iter_mut() {
        let mut v = 0usize;
        for _ in 0..FORS_HEIGHT {
            v = (v << 1) | usize::from(digest[bit / 8] >> (7 - bit % 8) & 1);
            bit += 1;
        }
        *index = v;
    }

    let tree = u64::from_be_bytes(digest[MD_BYTES..MD_BYTES + 8].try_into().unwrap())
        & ((1 << (FULL_HEIGHT - TREE_HEIGHT)) - 1);
    let leaf = usize::from(digest[MD_BYTES + 8]) & ((1 << TREE_HEIGHT) - 1);
    Digest { indices, tree, leaf }
}

fn sign_internal(sk: &[u8], opt_rand: &[u8; SPX_N], msg: &[u8]) -> Vec<u8> {
    let (sk_seed, rest) = sk.split_at(SPX_N);
    let (sk_prf, rest) = rest.split_at(SPX_N);
    let (pk_seed, pk_root) = rest.split_at(SPX_N);

    let mut sig = vec![0u8; SIG_SIZE];

    let mut xof = Shake256::new();
    xof.absorb(sk_prf);
    xof.absorb(opt_rand);
    xof.absorb(msg);
    xof.squeeze(&mut sig[..SPX_N]);

    let digest = digest_message(&sig[..SPX_N].to_vec(), pk_seed, pk_root, msg);
    let keypair = digest.leaf as u32;

    let mut at = SPX_N;
    let mut roots = Vec::with_capacity(FORS_TREES * SPX_N);
    for (t, &index) in digest.indices.iter().enumerate() {
        let leaf_index = (t << FORS_HEIGHT | index) as u32;
        let sk_leaf = fors_sk(sk_seed, pk_seed, digest.tree, keypair, leaf_index);
        sig[at..at + SPX_N].copy_from_slice(&sk_leaf);
        at += SPX_N;
        let (auth, _) = sig[at..].split_at_mut(FORS_HEIGHT * SPX_N);
        let root =
            fors_root(sk_seed, pk_seed, digest.tree, keypair, t, index, Some(auth));
        at += FORS_HEIGHT * SPX_N;
        roots.extend_from_slice(&root);
    }
    let mut adrs = Adrs::new(0, digest.tree);
    adrs.set_type(ADDR_FORS_ROOTS);
    adrs.set_keypair(keypair);
    let mut node = thash(pk_seed, &adrs, &[&roots]);

    // hypertree: WOTS-sign each layer's root
    let mut tree = digest.tree;
    let mut leaf_idx = digest.leaf;
    for layer in 0..LAYERS as u32 {
        let digits = wots_digits(&node);
        let mut wots_adrs = Adrs::new(layer, tree);
        for (i, &d) in digits.iter().enumerate() {
            wots_adrs.set_type(ADDR_WOTS_PRF);
            wots_adrs.set_keypair(leaf_idx as u32);
            wots_adrs.set_chain(i as u32);
            let mut part = prf_addr(pk_seed, sk_seed, &wots_adrs);
            wots_adrs.set_type(ADDR_WOTS_HASH);
            wots_adrs.set_keypair(leaf_idx as u32);
            wots_adrs.set_chain(i as u32);
            chain(pk_seed, &mut part, 0, d, &mut wots_adrs);
            sig[at..at + SPX_N].copy_from_slice(&part);
            at += SPX_N;
        }

        let (auth, _) = sig[at..].split_at_mut(TREE_HEIGHT * SPX_N);
        node = xmss_root(sk_seed, pk_seed, layer, tree, Some(leaf_idx), Some(auth));
        at += TREE_HEIGHT * SPX_N;

        leaf_idx = (tree & ((1 << TREE_HEIGHT) - 1)) as usize;
        tree >>= TREE_HEIGHT;
    }
    sig
}

fn verify_internal(pk: &[u8], msg: &[u8], sig: &[u8]) -> Result<(), Error> {
    let (pk_seed, pk_root) = pk.split_at(SPX_N);
    let r = &sig[..SPX_N];
    let digest = digest_message(r, pk_seed, pk_root, msg);
    let keypair = digest.leaf as u32;

    let mut at = SPX_N;
    let mut roots = Vec::with_capacity(FORS_TREES * SPX_N);
    for (t, &index) in digest.indices.iter().enumerate() {
        let mut adrs = Adrs::new(0, digest.tree);
        adrs.set_type(ADDR_FORS_TREE);
        adrs.set_keypair(keypair);
        adrs.set_height(0);
        adrs.set_index((t << FORS_HEIGHT | index) as u32);
        let mut node = thash(pk_seed, &adrs, &[&sig[at..at + SPX_N]]);
        at += SPX_N;

        let mut idx = index;
        for h in 1..=FORS_HEIGHT {
            adrs.set_height(h as u32);
            adrs.set_index(((t << (FORS_HEIGHT - h)) + (idx >> 1)) as u32);
            let sibling = &sig[at..at + SPX_N];
            node = if idx & 1 == 1 {
                thash(pk_seed, &adrs, &[sibling, &node])
            } else {
                thash(pk_seed, &adrs, &[&node, sibling])
            };
            at += SPX_N;
            idx >>= 1;
        }
        roots.extend_from_slice(&node);
    }
    let mut adrs = Adrs::new(0, digest.tree);
    adrs.set_type(ADDR_FORS_ROOTS);
    adrs.set_keypair(keypair);
    let mut node = thash(pk_seed, &adrs, &[&roots]);

    let mut tree = digest.tree;
    let mut leaf_idx = digest.leaf;
    for layer in 0..LAYERS as u32 {
        let digits = wots_digits(&node);
        let mut parts = [[0u8; SPX_N]; WOTS_LEN];
        let mut wots_adrs = Adrs::new(layer, tree);
        for (i, part) in parts.iter_mut().enumerate() {
            part.copy_from_slice(&sig[at..at + SPX_N]);
            at += SPX_N;
            wots_adrs.set_type(ADDR_WOTS_HASH);
            wots_adrs.set_keypair(leaf_idx as u32);
            wots_adrs.set_chain(i as u32);
            chain(pk_seed, part, digits[i], WOTS_W - 1 - digits[i], &mut wots_adrs);
        }
        wots_adrs.set_type(ADDR_WOTS_PK);
        wots_adrs.set_keypair(leaf_idx as u32);
        let flat: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        let leaf = thash(pk_seed, &wots_adrs, &flat);

        let mut tree_adrs = Adrs::new(layer, tree);
        tree_adrs.set_type(ADDR_TREE);
        node = root_from_auth(
            pk_seed,
            &leaf,
            leaf_idx,
            &sig[at..at + TREE_HEIGHT * SPX_N],
            TREE_HEIGHT,
            &mut tree_adrs,
        );
        at += TREE_HEIGHT * SPX_N;

        leaf_idx = (tree & ((1 << TREE_HEIGHT) - 1)) as usize;
        tree >>= TREE_HEIGHT;
    }

    if node.as_slice() == pk_root {
        Ok(())
    } else {
        Err(Error::AuthFailure)
    }
}

/// SPHINCS+-SHAKE-128f-simple.
pub struct SphincsShake128f;

impl Signer for SphincsShake128f {
    const PUBLIC_KEY_SIZE: usize = PK_SIZE;
    const SECRET_KEY_SIZE: usize = SK_SIZE;
    const SIGNATURE_SIZE: usize = SIG_SIZE;

    fn keypair<R: rand_core::RngCore + rand_core::CryptoRng>(
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let mut seeds = Zeroizing::new([0u8; 3 * SPX_N]);
        draw(rng, seeds.as_mut())?;

        let mut sk = vec![0u8; SK_SIZE];
        sk[..3 * SPX_N].copy_from_slice(seeds.as_ref());
        let root = xmss_root(
            &seeds[..SPX_N],
            &seeds[2 * SPX_N..],
            LAYERS as u32 - 1,
            0,
            None,
            None,
        );
        sk[3 * SPX_N..].copy_from_slice(&root);

        let mut pk = vec![0u8; PK_SIZE];
        pk.copy_from_slice(&sk[2 * SPX_N..]);
        Ok((pk, sk))
    }

    fn sign<R: rand_core::RngCore + rand_core::CryptoRng>(
        msg: &[u8],
        sk: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        if sk.len() != SK_SIZE {
            return Err(Error::InvalidParameter);
        }
        let mut opt_rand = Zeroizing::new([0u8; SPX_N]);
        draw(rng, opt_rand.as_mut())?;
        let mut signed = sign_internal(sk, &opt_rand, msg);
        signed.extend_from_slice(msg);
        Ok(signed)
    }

    fn open(signed: &[u8], pk: &[u8]) -> Result<Vec<u8>, Error> {
        if signed.len() < SIG_SIZE || pk.len() != PK_SIZE {
            return Err(Error::InvalidParameter);
        }
        let (sig, msg) = signed.split_at(SIG_SIZE);
        verify_internal(pk, msg, sig)?;
        Ok(msg.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::testutil::SeedRng;

    #[test]
    fn wots_digit_checksum() {
        // all-zero message: every digit 0, checksum 32·15 = 480
        let digits = wots_digits(&[0u8; SPX_N]);
        assert!(digits[..WOTS_LEN1].iter().all(|&d| d == 0));
        // 480 << 4 = 0x1e00 -> digits 1, 14, 0
        assert_eq!(&digits[WOTS_LEN1..], &[1, 14, 0]);
    }

    #[test]
    fn auth_paths_reconstruct_the_root() {
        let sk_seed = [7u8; SPX_N];
        let pk_seed = [9u8; SPX_N];
        for leaf_idx in 0..1 << TREE_HEIGHT {
            let mut auth = [0u8; TREE_HEIGHT * SPX_N];
            let root =
                xmss_root(&sk_seed, &pk_seed, 3, 42, Some(leaf_idx), Some(&mut auth[..]));
            let leaf = wots_leaf(&sk_seed, &pk_seed, 3, 42, leaf_idx as u32);
            let mut adrs = Adrs::new(3, 42);
            adrs.set_type(ADDR_TREE);
            let rebuilt =
                root_from_auth(&pk_seed, &leaf, leaf_idx, &auth, TREE_HEIGHT, &mut adrs);
            assert_eq!(root, rebuilt);
        }
    }

    #[test]
    fn round_trip() {
        let mut rng = SeedRng::new(b"sphincs round trip");
        let (pk, sk) = SphincsShake128f::keypair(&mut rng).unwrap();
        assert_eq!(pk.len(), SphincsShake128f::PUBLIC_KEY_SIZE);
        assert_eq!(sk.len(), SphincsShake128f::SECRET_KEY_SIZE);

        for msg in [b"".as_slice(), b"stateless hash-based signatures".as_slice()] {
            let signed = SphincsShake128f::sign(msg, &sk, &mut rng).unwrap();
            assert_eq!(signed.len(), SIG_SIZE + msg.len());
            assert_eq!(SphincsShake128f::open(&signed, &pk).unwrap(), msg);
        }
    }

    #[test]
    fn tampering_fails_verification() {
        let mut rng = SeedRng::new(b"sphincs tamper");
        let (pk, sk) = SphincsShake128f::keypair(&mut rng).unwrap();
        let signed = SphincsShake128f::sign(b"msg", &sk, &mut rng).unwrap();

        // R, a FORS auth node, a WOTS chain value, and the message itself
        for flip in [0usize, SPX_N + 40, 5000, SIG_SIZE + 1] {
            let mut bad = signed.clone();
            bad[flip] ^= 1;
            assert!(SphincsShake128f::open(&bad, &pk).is_err(), "flip at {flip} accepted");
        }
    }

    #[test]
    fn flipped_secret_seed_fails_under_original_pk() {
        let mut rng = SeedRng::new(b"sphincs key sensitivity");
        let (pk, sk) = SphincsShake128f::keypair(&mut rng).unwrap();
        let mut bad_sk = sk.clone();
        bad_sk[0] ^= 1;
        let signed = SphincsShake128f::sign(b"msg", &bad_sk, &mut rng).unwrap();
        assert!(SphincsShake128f::open(&signed, &pk).is_err());
    }
}
