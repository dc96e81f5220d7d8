//! End-to-end encode/decode behavior through the public API

use blz_rs::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn roundtrip(data: &[u8], opts: &CompressOptions) -> Vec<u8> {
    let packed = compress_with_options(data, opts).unwrap();
    assert!(packed.len() <= max_compressed_len(data.len()));
    let out = decompress_to_vec(&packed, Some(data.len())).unwrap();
    assert!(
        (out.warnings - DecodeWarnings::NOT_COMPRESSED).is_empty(),
        "warnings: {:?}",
        out.warnings
    );
    assert_eq!(out.data, data);
    packed
}

fn make_text(len: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    pattern.iter().copied().cycle().take(len).collect()
}

/// Text with occasional random edits, so matches of all lengths show up
fn make_noisy_text(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = make_text(len);
    for b in data.iter_mut() {
        if rng.gen_ratio(1, 16) {
            *b = rng.gen();
        }
    }
    data
}

#[test]
fn empty_input() {
    for mode in [CompressionMode::Normal, CompressionMode::Best] {
        let packed = compress_to_vec(&[], mode).unwrap();
        assert_eq!(packed, [0, 0, 0, 0]);
        let out = decompress_to_vec(&packed, None).unwrap();
        assert!(out.data.is_empty());
        assert!(out.warnings.contains(DecodeWarnings::NOT_COMPRESSED));
    }
}

#[test]
fn single_byte() {
    let packed = compress_to_vec(&[0x5a], CompressionMode::Best).unwrap();
    assert_eq!(packed, [0x5a, 0, 0, 0, 0, 0, 0, 0]);
    let out = decompress_to_vec(&packed, Some(1)).unwrap();
    assert_eq!(out.data, [0x5a]);
}

#[test]
fn incompressible_input_is_stored() {
    let mut rng = StdRng::seed_from_u64(0x626c_7a00);
    let mut data = vec![0u8; 1000];
    rng.fill(&mut data[..]);

    for mode in [CompressionMode::Normal, CompressionMode::Best] {
        let packed = roundtrip(&data, &CompressOptions::new(mode));
        assert!(packed.len() <= data.len() + 11);
        assert_eq!(packed[packed.len() - 4..], [0, 0, 0, 0]);
        assert_eq!(packed[..data.len()], data[..]);
    }
}

#[test]
fn repetitive_input_compresses() {
    let data = vec![0x42u8; 1000];
    for mode in [CompressionMode::Normal, CompressionMode::Best] {
        let packed = roundtrip(&data, &CompressOptions::new(mode));
        assert!(packed.len() < data.len() / 4, "{} bytes", packed.len());

        match Frame::parse(&packed, None).unwrap() {
            Frame::Compressed { raw_len, .. } => assert_eq!(raw_len, 1000),
            f => panic!("expected a compressed frame, got {:?}", f),
        }
    }
}

#[test]
fn text_roundtrip_both_modes() {
    let data = make_noisy_text(20000, 1);
    let normal = roundtrip(&data, &CompressOptions::new(CompressionMode::Normal));
    let best = roundtrip(&data, &CompressOptions::new(CompressionMode::Best));
    assert!(normal.len() < data.len());
    assert!(best.len() < data.len());
}

#[test]
fn uniform_data_same_in_both_modes() {
    // with nothing but maximal matches the lookahead never changes a choice
    let data = vec![0u8; 4096];
    let normal = compress_to_vec(&data, CompressionMode::Normal).unwrap();
    let best = compress_to_vec(&data, CompressionMode::Best).unwrap();
    assert_eq!(normal, best);
}

#[test]
fn best_falls_back_to_greedy() {
    // greedy parsing wins by 4 bytes on this one
    let data = b"aaaabbbaabbbbaaabbaababaabbbbbaaaab";
    let normal = roundtrip(data, &CompressOptions::new(CompressionMode::Normal));
    let best = roundtrip(data, &CompressOptions::new(CompressionMode::Best));
    assert_eq!(normal.len(), 32);
    assert_eq!(best, normal);
}

#[test]
fn compressed_frame_may_exceed_input() {
    let data = b"aabaaabbaabbaabba";
    let packed = roundtrip(data, &CompressOptions::new(CompressionMode::Normal));
    assert_eq!(packed.len(), 20);
    assert!(packed.len() < max_compressed_len(data.len()));
    assert!(matches!(
        Frame::parse(&packed, None).unwrap(),
        Frame::Compressed { raw_len: 17, .. }
    ));
}

#[test]
fn deterministic() {
    let data = make_noisy_text(5000, 2);
    for mode in [CompressionMode::Normal, CompressionMode::Best] {
        let a = compress_to_vec(&data, mode).unwrap();
        let b = compress_to_vec(&data, mode).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn arm9_prefix_is_verbatim() {
    let mut data = vec![0u8; ARM9_UNCOMPRESSED_PREFIX];
    StdRng::seed_from_u64(3).fill(&mut data[..]);
    data.extend(make_text(0x4000));

    let packed = roundtrip(&data, &CompressOptions::arm9(CompressionMode::Normal));
    assert_eq!(
        packed[..ARM9_UNCOMPRESSED_PREFIX],
        data[..ARM9_UNCOMPRESSED_PREFIX]
    );
    match Frame::parse(&packed, None).unwrap() {
        Frame::Compressed { verbatim_len, .. } => {
            assert!(verbatim_len >= ARM9_UNCOMPRESSED_PREFIX)
        }
        f => panic!("expected a compressed frame, got {:?}", f),
    }
}

#[test]
fn to_buf_matches_to_vec() {
    let data = make_noisy_text(3000, 4);
    let opts = CompressOptions::new(CompressionMode::Best);
    let vec = compress_with_options(&data, &opts).unwrap();

    let mut buf = vec![0u8; max_compressed_len(data.len())];
    let n = compress_to_buf(&data, &mut buf, &opts).unwrap();
    assert_eq!(buf[..n], vec[..]);

    let mut out = vec![0u8; data.len()];
    let (m, warnings) = decompress_to_buf(&vec, &mut out, None).unwrap();
    assert_eq!(m, data.len());
    assert!(!warnings.contains(DecodeWarnings::TRUNCATED_STREAM));
    assert_eq!(out, data);
}

#[test]
fn decode_rejects_wrong_expected_len() {
    let data = vec![0x11u8; 500];
    let packed = compress_to_vec(&data, CompressionMode::Normal).unwrap();
    assert_eq!(
        decompress_to_vec(&packed, Some(499)),
        Err(DecompressError::BadLength)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip_normal(data in proptest::collection::vec(any::<u8>(), 0..2000)) {
        let packed = compress_to_vec(&data, CompressionMode::Normal).unwrap();
        prop_assert!(packed.len() <= max_compressed_len(data.len()));
        let out = decompress_to_vec(&packed, Some(data.len())).unwrap().into_strict().unwrap();
        prop_assert_eq!(out, data);
    }

    #[test]
    fn prop_roundtrip_best_low_entropy(data in proptest::collection::vec(0u8..4, 0..2000)) {
        let packed = compress_to_vec(&data, CompressionMode::Best).unwrap();
        let out = decompress_to_vec(&packed, Some(data.len())).unwrap().into_strict().unwrap();
        prop_assert_eq!(out, data);
    }

    #[test]
    fn prop_best_never_larger(
        data in (2u8..6).prop_flat_map(|k| proptest::collection::vec(b'a'..b'a' + k, 0..300))
    ) {
        let normal = compress_to_vec(&data, CompressionMode::Normal).unwrap();
        let best = compress_to_vec(&data, CompressionMode::Best).unwrap();
        prop_assert!(best.len() <= normal.len(), "best {} normal {}", best.len(), normal.len());
    }

    #[test]
    fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = decompress_to_vec(&data, None);
        let mut out = [0u8; 256];
        let _ = decompress_to_buf(&data, &mut out, None);
    }
}
