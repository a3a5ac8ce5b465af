//! Property tests for the framer.

use lpbank_proto::{Envelope, Framer, Origin, encode};
use proptest::prelude::*;

fn origin() -> impl Strategy<Value = Origin> {
    prop_oneof![Just(Origin::Bank), Just(Origin::Customer), Just(Origin::Teller)]
}

fn envelope() -> impl Strategy<Value = Envelope> {
    (origin(), "[^\u{a0}]{0,40}").prop_map(|(origin, message)| Envelope::new(origin, message))
}

fn stream_of(envelopes: &[Envelope]) -> Vec<u8> {
    envelopes.iter().flat_map(|e| encode(e).unwrap().to_vec()).collect()
}

proptest! {
    #[test]
    fn prop_round_trip(env in envelope()) {
        let mut framer = Framer::new();
        let decoded = framer.feed(&encode(&env).unwrap());
        prop_assert_eq!(decoded, vec![env]);
    }

    #[test]
    fn prop_fragmentation_transparent(
        envelopes in prop::collection::vec(envelope(), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let stream = stream_of(&envelopes);

        let mut whole = Framer::new();
        let expected = whole.feed(&stream);
        prop_assert_eq!(&expected, &envelopes);

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();

        let mut pieces = Framer::new();
        let mut decoded = Vec::new();
        let mut start = 0;
        for point in points {
            decoded.extend(pieces.feed(&stream[start..point]));
            start = point;
        }
        decoded.extend(pieces.feed(&stream[start..]));

        prop_assert_eq!(decoded, expected);
        prop_assert!(!pieces.has_partial());
    }

    #[test]
    fn prop_byte_at_a_time(envelopes in prop::collection::vec(envelope(), 1..4)) {
        let stream = stream_of(&envelopes);
        let mut framer = Framer::new();
        let decoded: Vec<Envelope> = stream.iter().flat_map(|b| framer.feed(&[*b])).collect();
        prop_assert_eq!(decoded, envelopes);
    }
}
