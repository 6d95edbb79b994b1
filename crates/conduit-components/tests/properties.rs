//! Property-based tests for sample conversion.

use conduit_components::sample::{decode, encode, map_in_place, peak};
use conduit_core::FrameFormat;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Unity processing leaves integer samples bit-exact.
    #[test]
    fn identity_map_is_transparent(samples in prop::collection::vec(any::<i16>(), 0..256)) {
        let mut data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let before = data.clone();
        map_in_place(FrameFormat::S16Le, &mut data, |s| s);
        prop_assert_eq!(data, before);
    }

    /// Encoding never leaves full scale, whatever the input.
    #[test]
    fn encode_saturates(value in -8.0f32..8.0) {
        for fmt in [FrameFormat::S16Le, FrameFormat::S24In32Le, FrameFormat::S32Le, FrameFormat::Float] {
            let mut out = [0u8; 4];
            encode(fmt, value, &mut out);
            let back = decode(fmt, &out);
            prop_assert!((-1.0..=1.0).contains(&back));
            if value.abs() < 0.99 {
                prop_assert!((back - value).abs() < 1e-3);
            }
        }
    }

    /// The peak bounds every sample and is one of them.
    #[test]
    fn peak_is_the_largest_magnitude(samples in prop::collection::vec(-1.0f32..1.0, 1..128)) {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let p = peak(FrameFormat::Float, &data);
        prop_assert!(samples.iter().all(|s| s.abs() <= p));
        prop_assert!(samples.iter().any(|s| s.abs() == p));
    }
}
