//! Property tests for the frame codec.

use kfplink_frame::{
    decode_all, encode, Decoder, DecoderState, Frame, Step, DELIMITER, ESC, FRAME_SIZE,
    MAX_ENCODED_SIZE,
};
use proptest::prelude::*;

fn arb_frame() -> impl Strategy<Value = Frame> {
    // Bias towards the reserved values so escaping is exercised often.
    let byte = prop_oneof![
        3 => any::<u8>(),
        1 => Just(DELIMITER),
        1 => Just(ESC),
    ];
    proptest::array::uniform12(byte).prop_map(Frame::from_bytes)
}

proptest! {
    #[test]
    fn roundtrip_yields_exactly_the_frame(frame in arb_frame()) {
        let encoded = encode(&frame);
        prop_assert_eq!(decode_all(encoded.as_bytes()), vec![frame]);
    }

    #[test]
    fn reserved_bytes_only_appear_at_boundaries(frame in arb_frame()) {
        let encoded = encode(&frame);
        let bytes = encoded.as_bytes();
        prop_assert!(bytes.len() <= MAX_ENCODED_SIZE);
        prop_assert_eq!(bytes[0], DELIMITER);
        prop_assert_eq!(bytes[bytes.len() - 1], DELIMITER);

        let inner = &bytes[1..bytes.len() - 1];
        prop_assert!(!inner.contains(&DELIMITER));

        // Every ESC in the body starts an escape pair.
        let mut i = 0;
        while i < inner.len() {
            if inner[i] == ESC {
                prop_assert!(i + 1 < inner.len());
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    #[test]
    fn stray_bytes_never_produce_frames(noise in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut decoder = Decoder::new();
        for byte in noise.into_iter().filter(|&b| b != DELIMITER) {
            prop_assert_eq!(decoder.step(byte), Step::Stray(byte));
            prop_assert_eq!(decoder.state(), DecoderState::Idle);
        }
    }

    #[test]
    fn short_frames_are_discarded(data in proptest::collection::vec(any::<u8>().prop_filter("plain", |b| *b != DELIMITER && *b != ESC), 0..FRAME_SIZE)) {
        let mut wire = vec![DELIMITER];
        wire.extend_from_slice(&data);
        wire.push(DELIMITER);

        let mut decoder = Decoder::new();
        let frames: Vec<Frame> = wire.iter().filter_map(|&b| decoder.feed(b)).collect();
        prop_assert!(frames.is_empty());
        prop_assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn long_frames_never_exceed_capacity(extra in 1usize..64, fill in any::<u8>().prop_filter("plain", |b| *b != DELIMITER && *b != ESC)) {
        let mut decoder = Decoder::new();
        decoder.step(DELIMITER);
        for _ in 0..FRAME_SIZE + extra {
            decoder.step(fill);
            prop_assert!(decoder.collected() <= FRAME_SIZE);
        }
        let step = decoder.step(DELIMITER);
        prop_assert!(matches!(step, Step::Discarded { overflowed: true, .. }), "{:?}", step);
        prop_assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn arbitrary_input_never_panics(input in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut decoder = Decoder::new();
        for byte in input {
            decoder.step(byte);
            prop_assert!(decoder.collected() <= FRAME_SIZE);
        }
    }
}
