use super::testutil::{dict, hanzi_dict};
use crate::decoder::lattice::Lattice;
use crate::decoder::Decoder;

#[test]
fn ambiguous_code_yields_both_segmentations() {
    let decoder = Decoder::with_params(hanzi_dict(), 5, 0.01);
    let predictions = decoder.predict("nihao", 10);

    // Two derivations spell the same text: one whole-word reduction and
    // one per syllable. At zero weights both paths score 0.
    assert_eq!(predictions.len(), 2);
    for p in &predictions {
        assert_eq!(p.text, "你好");
        assert!((p.prob - 0.5).abs() < 1e-9);
    }
}

#[test]
fn probabilities_sum_to_one() {
    let decoder = Decoder::with_params(hanzi_dict(), 5, 0.01);
    let predictions = decoder.predict("nihao", 10);
    let total: f64 = predictions.iter().map(|p| p.prob).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn unambiguous_code_decodes_to_a_single_path() {
    let decoder = Decoder::with_params(dict(&[("ab", "A"), ("cd", "B")]), 5, 0.01);
    let predictions = decoder.predict("abcd", 10);
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].text, "AB");
    assert!((predictions[0].prob - 1.0).abs() < 1e-9);
}

#[test]
fn uncoverable_code_fails_with_an_empty_beam() {
    let decoder = Decoder::with_params(dict(&[("ab", "A"), ("cd", "B")]), 5, 0.01);
    assert!(decoder.predict("abcxd", 10).is_empty());

    let mut lattice = Lattice::new();
    assert!(!decoder.decode("abcxd", None, &mut lattice, 5));
    assert!(lattice.back().is_empty());
}

#[test]
fn unknown_code_returns_no_candidates() {
    let decoder = Decoder::with_params(hanzi_dict(), 5, 0.01);
    assert!(decoder.predict("zz", 10).is_empty());
}

#[test]
fn constrained_decode_pins_code_and_text() {
    let decoder = Decoder::with_params(hanzi_dict(), 5, 0.01);
    let mut lattice = Lattice::new();
    assert!(decoder.decode("nihao", Some("你好"), &mut lattice, 5));

    for path in lattice.paths(usize::MAX) {
        let rear = lattice.node(*path.last().unwrap());
        assert_eq!(rear.code_pos, "nihao".len());
        assert_eq!(rear.text_pos, "你好".len());
    }

    // A target the dictionary cannot spell from this code.
    assert!(!decoder.decode("nihao", Some("好你"), &mut lattice, 5));
}

#[test]
fn beams_respect_the_beam_width() {
    let decoder = Decoder::with_params(hanzi_dict(), 1, 0.01);
    let mut lattice = Lattice::new();
    assert!(decoder.decode("nihao", None, &mut lattice, 1));
    for step in 0..lattice.num_steps() {
        assert!(lattice.beam(step).len() <= 1);
    }
}

#[test]
fn back_pointers_land_in_the_previous_beam() {
    let decoder = Decoder::with_params(hanzi_dict(), 5, 0.01);
    let mut lattice = Lattice::new();
    assert!(decoder.decode("nihao", None, &mut lattice, 5));

    for step in 1..lattice.num_steps() {
        let prev_range = lattice.beam_range(step - 1);
        for slot in lattice.beam_range(step) {
            let prev = lattice.node(slot).prev.expect("non-root node has a predecessor");
            assert!(prev_range.contains(&prev));
        }
    }

    // Walking any final path back visits exactly one node per step.
    for path in lattice.paths(usize::MAX) {
        assert_eq!(path.len(), lattice.num_steps());
    }
}

#[test]
fn scores_decompose_into_local_and_global_parts() {
    // Train a little first so the invariant is checked on nonzero weights.
    let mut decoder = Decoder::with_params(hanzi_dict(), 5, 0.01);
    for _ in 0..3 {
        assert!(decoder.update("nihao", "你好").is_some());
    }

    let mut lattice = Lattice::new();
    assert!(decoder.decode("nihao", None, &mut lattice, 5));

    let model = decoder.model();
    for step in 0..lattice.num_steps() {
        for slot in lattice.beam_range(step) {
            let node = lattice.node(slot);
            let prev_local = node
                .prev
                .map(|p| lattice.node(p).local_score)
                .unwrap_or(0.0);
            let local = prev_local + model.score(&node.local_features);
            assert!((node.local_score - local).abs() < 1e-9);
            let total = node.local_score + model.score(&node.global_features);
            assert!((node.score - total).abs() < 1e-9);
        }
    }
}

#[test]
fn shift_stops_at_the_longest_dictionary_code() {
    // max_code_len is 2, so a pending span can never exceed one byte
    // before either reducing or dying.
    let decoder = Decoder::with_params(dict(&[("ab", "A"), ("cd", "B")]), 5, 0.01);
    let mut lattice = Lattice::new();
    assert!(decoder.decode("abcd", None, &mut lattice, 5));

    for step in 1..lattice.num_steps() {
        for node in lattice.beam(step) {
            assert!(step.saturating_sub(node.code_pos) <= 2);
        }
    }
}
