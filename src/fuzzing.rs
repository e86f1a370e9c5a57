#![cfg(test)]

use proptest::collection::vec;
use proptest::prelude::*;

use crate::aes::{Aes, CounterMode, Ctr};
use crate::chacha::ChaCha20;
use crate::kmac::Kmac256;
use crate::poly1305::Poly1305;
use crate::rcs::Rcs256;
use crate::sha3::Shake256;

fn arb_data() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..600)
}

// Chunk boundaries must never influence sponge output: a transcript of
// absorb calls is equivalent to absorbing the concatenation.
proptest! {
    #[test]
    fn shake_output_depends_only_on_input(
        data in arb_data(),
        splits in vec(0usize..600, 0..6),
    ) {
        let mut whole = Shake256::new();
        whole.absorb(&data);
        let mut expected = [0u8; 96];
        whole.squeeze(&mut expected);

        let mut chunked = Shake256::new();
        let mut cuts: Vec<usize> = splits.iter().map(|&s| s % (data.len() + 1)).collect();
        cuts.sort_unstable();
        let mut last = 0;
        for cut in cuts {
            chunked.absorb(&data[last..cut]);
            last = cut;
        }
        chunked.absorb(&data[last..]);

        let mut out = [0u8; 96];
        chunked.squeeze(&mut out[..17]);
        chunked.squeeze(&mut out[17..]);
        prop_assert_eq!(expected, out);
    }

    #[test]
    fn distinct_inputs_produce_distinct_digests(a in arb_data(), b in arb_data()) {
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        Shake256::compute(&a, &mut x);
        Shake256::compute(&b, &mut y);
        prop_assert_eq!(a == b, x == y);
    }

    #[test]
    fn kmac_update_pattern_is_irrelevant(
        key in vec(any::<u8>(), 16..64),
        data in arb_data(),
        cut in 0usize..600,
    ) {
        let mut whole = [0u8; 32];
        Kmac256::compute(&key, b"", &data, &mut whole);

        let cut = cut % (data.len() + 1);
        let mut mac = Kmac256::new(&key, b"");
        mac.update(&data[..cut]);
        mac.update(&data[cut..]);
        let mut split = [0u8; 32];
        mac.finalize(&mut split);
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn poly1305_update_pattern_is_irrelevant(
        key in proptest::array::uniform32(any::<u8>()),
        data in arb_data(),
        cut in 0usize..600,
    ) {
        let cut = cut % (data.len() + 1);
        let mut mac = Poly1305::new(&key);
        mac.update(&data[..cut]);
        mac.update(&data[cut..]);
        prop_assert_eq!(mac.finalize(), Poly1305::compute(&key, &data));
    }

    #[test]
    fn stream_ciphers_round_trip(
        key in proptest::array::uniform32(any::<u8>()),
        nonce in proptest::array::uniform12(any::<u8>()),
        data in arb_data(),
    ) {
        let mut buf = data.clone();
        ChaCha20::new(&key, &nonce, 1).apply_keystream(&mut buf);
        ChaCha20::new(&key, &nonce, 1).apply_keystream(&mut buf);
        prop_assert_eq!(&buf, &data);

        let counter: [u8; 16] = core::array::from_fn(|i| nonce[i % 12]);
        let mut ctr = Ctr::new(Aes::new_256(&key), counter, CounterMode::LittleEndian);
        ctr.transform(&mut buf);
        let mut ctr = Ctr::new(Aes::new_256(&key), counter, CounterMode::LittleEndian);
        ctr.transform(&mut buf);
        prop_assert_eq!(&buf, &data);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rcs_rejects_every_bit_flip_position(
        key in proptest::array::uniform32(any::<u8>()),
        nonce in proptest::array::uniform16(any::<u8>()),
        data in vec(any::<u8>(), 1..200),
        flip in any::<proptest::sample::Index>(),
    ) {
        let sealed = Rcs256::new(&key, &nonce, None).encrypt(&data);
        prop_assert_eq!(
            Rcs256::new(&key, &nonce, None).decrypt(&sealed).unwrap(),
            data
        );

        let mut bad = sealed.clone();
        let at = flip.index(bad.len());
        bad[at] ^= 1 << (at % 8);
        prop_assert!(Rcs256::new(&key, &nonce, None).decrypt(&bad).is_err());
    }
}
