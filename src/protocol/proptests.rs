//! Property-based tests for the frame decoder
//!
//! Chunk boundaries must never change what gets decoded.

use super::frame::*;
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_event_type() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("stage1_start"),
        Just("stage1_complete"),
        Just("stage2_start"),
        Just("stage2_complete"),
        Just("stage3_start"),
        Just("stage3_complete"),
        Just("title_complete"),
        Just("complete"),
        Just("error"),
    ]
}

fn arb_payload() -> impl Strategy<Value = Value> {
    (arb_event_type(), "[a-zA-Z0-9 é✓]{0,40}").prop_map(|(event_type, text)| {
        json!({
            "type": event_type,
            "data": {"model": "council/member", "response": text},
        })
    })
}

/// Wire line that is either a valid frame or noise the decoder must skip
#[derive(Debug, Clone)]
enum WireLine {
    Frame(Value),
    Malformed(String),
    Comment(String),
    Blank,
}

fn arb_wire_line() -> impl Strategy<Value = WireLine> {
    prop_oneof![
        6 => arb_payload().prop_map(WireLine::Frame),
        1 => "[a-z{:\\[]{1,20}".prop_map(WireLine::Malformed),
        1 => "[a-z ]{0,20}".prop_map(WireLine::Comment),
        1 => Just(WireLine::Blank),
    ]
}

fn render(lines: &[WireLine]) -> Vec<u8> {
    let mut wire = String::new();
    for line in lines {
        match line {
            WireLine::Frame(payload) => wire.push_str(&format!("{DATA_PREFIX}{payload}\n")),
            WireLine::Malformed(text) => wire.push_str(&format!("{DATA_PREFIX}{{{text}\n")),
            WireLine::Comment(text) => wire.push_str(&format!(": {text}\n")),
            WireLine::Blank => wire.push('\n'),
        }
    }
    wire.into_bytes()
}

fn expected(lines: &[WireLine]) -> Vec<Value> {
    lines
        .iter()
        .filter_map(|line| match line {
            WireLine::Frame(payload) => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

fn decode_in_chunks(wire: &[u8], cuts: &[usize]) -> Vec<Value> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (wire.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut decoder = FrameDecoder::new();
    let mut records = Vec::new();
    let mut start = 0;
    for point in points {
        records.extend(decoder.push(&wire[start..point]));
        start = point;
    }
    records.extend(decoder.push(&wire[start..]));
    records.extend(decoder.finish());
    records.into_iter().map(|r| r.payload).collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Any chunking decodes to the same records as a single chunk
    #[test]
    fn prop_chunk_boundaries_do_not_affect_output(
        lines in proptest::collection::vec(arb_wire_line(), 0..12),
        cuts in proptest::collection::vec(any::<usize>(), 0..16)
    ) {
        let wire = render(&lines);
        let whole = decode_in_chunks(&wire, &[]);
        let split = decode_in_chunks(&wire, &cuts);
        prop_assert_eq!(whole, split);
    }

    // Byte-at-a-time delivery is just the most extreme chunking
    #[test]
    fn prop_single_byte_chunks(lines in proptest::collection::vec(arb_wire_line(), 0..6)) {
        let wire = render(&lines);
        let cuts: Vec<usize> = (0..wire.len()).collect();
        prop_assert_eq!(decode_in_chunks(&wire, &cuts), expected(&lines));
    }

    // Malformed lines never drop or corrupt their valid neighbours
    #[test]
    fn prop_malformed_lines_are_isolated(
        lines in proptest::collection::vec(arb_wire_line(), 0..12),
        cuts in proptest::collection::vec(any::<usize>(), 0..16)
    ) {
        let wire = render(&lines);
        prop_assert_eq!(decode_in_chunks(&wire, &cuts), expected(&lines));
    }
}
