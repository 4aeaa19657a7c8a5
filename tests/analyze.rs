//! Black-box integration tests over the public `Analyzer` facade
//! (spec.md §6, §8), mirroring the teacher's `tests/test_basic.rs`
//! convention of exercising the crate from outside as a downstream
//! caller would.
//!
//! This crate ships no trained Korean dictionary or language model
//! (spec.md explicitly treats model training as out of scope), so these
//! tests build tiny synthetic fixtures with `hangul_morph::model::write_test_model`
//! instead of loading a real one. The fixtures use plain ASCII letters as
//! dictionary forms rather than Hangul syllables: `jamo::normalize`
//! passes non-Hangul code points through unchanged (src/jamo.rs), so an
//! ASCII fixture exercises the exact same lattice/path/assemble code
//! paths a Hangul dictionary would, without needing real jamo
//! decomposition arithmetic baked into the fixture by hand. The
//! structural patterns below (multi-token sentence, sentence-boundary
//! break, top-N score ordering) mirror the mechanisms spec.md §8's
//! literal Korean scenarios exercise, not their literal text.

use std::io::Cursor;

use hangul_morph::model::write_test_model;
use hangul_morph::{AnalyzeOption, Analyzer, BuildOption, PosTag};

/// Tag discriminants written into fixture model bytes must match
/// `PosTag`'s `#[repr(u8)]` order exactly (src/types.rs).
const NNG: u8 = PosTag::Nng as u8;
const NNP: u8 = PosTag::Nnp as u8;
const EF: u8 = PosTag::Ef as u8;

fn two_word_dictionary() -> Analyzer {
    // form 0 = "A" -> morph 0 (Nng); form 1 = "B" -> morph 1 (Ef).
    let data = write_test_model(
        &[(vec![b'A' as u16], 0, vec![0]), (vec![b'B' as u16], 0, vec![1])],
        &[(0, NNG, 0, 0, 0.0), (1, EF, 0, 0, 0.0)],
        &[(0, 0, 0, -1.0, 0.0)],
    );
    Analyzer::new(Cursor::new(data), 0, BuildOption::default()).unwrap()
}

#[test]
fn analyzes_two_token_sentence_with_expected_tags_and_positions() {
    let analyzer = two_word_dictionary();
    let results = analyzer.analyze("AB", &AnalyzeOption::default()).unwrap();
    assert_eq!(results.len(), 1);
    let tokens = &results[0].tokens;
    assert_eq!(tokens.len(), 2);
    assert_eq!((tokens[0].form.as_str(), tokens[0].tag, tokens[0].position, tokens[0].length), ("A", PosTag::Nng, 0, 1));
    assert_eq!((tokens[1].form.as_str(), tokens[1].tag, tokens[1].position, tokens[1].length), ("B", PosTag::Ef, 1, 1));
}

/// Structural analogue of spec.md §8 scenario 2 ("나는 학교에 간다." ->
/// a single sentence) and the general rule behind scenario 6 (a
/// sentence-final ending followed by material that is not a
/// continuation starts a new sentence): an `Ef` token followed directly
/// by another content token (not `Vx`, not a closing-punctuation run,
/// not a `(요)` particle) must bump `sent_position`.
#[test]
fn ending_followed_by_new_clause_starts_new_sentence() {
    let analyzer = two_word_dictionary();
    let results = analyzer.analyze("ABA", &AnalyzeOption::default()).unwrap();
    let tokens = &results[0].tokens;
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0].sent_position, 0);
    assert_eq!(tokens[1].sent_position, 0);
    assert_eq!(tokens[2].sent_position, 1);
}

/// Every token's reported `(position, length)` span, read back out of the
/// original input, must equal the token's own surface form (spec.md §8's
/// position round-trip invariant).
#[test]
fn token_spans_round_trip_against_original_text() {
    let analyzer = two_word_dictionary();
    let text = "AB";
    let results = analyzer.analyze(text, &AnalyzeOption::default()).unwrap();
    for token in &results[0].tokens {
        let slice = &text[token.position as usize..token.position as usize + token.length as usize];
        assert_eq!(slice, token.form.as_str());
    }
}

/// Empty input must return one trivial, empty, zero-score analysis
/// rather than an error or an empty result vector (spec.md §7).
#[test]
fn empty_input_yields_single_empty_zero_score_result() {
    let analyzer = two_word_dictionary();
    let results = analyzer.analyze("", &AnalyzeOption::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].tokens.is_empty());
    assert_eq!(results[0].score, 0.0);
}

#[test]
fn find_morpheme_locates_by_form_and_tag_only() {
    let analyzer = two_word_dictionary();
    assert!(analyzer.find_morpheme("A", PosTag::Nng).is_some());
    assert!(analyzer.find_morpheme("A", PosTag::Ef).is_none());
    assert!(analyzer.find_morpheme("Z", PosTag::Nng).is_none());
}

/// Two homograph candidates on the same form must both surface as
/// distinct top-N paths, highest-scoring first (spec.md §8's score
/// ordering invariant) — and the ordering must actually reflect each
/// candidate's `user_score`, not just the shared LM score, since
/// `user_score` is part of spec.md §4.7's `cand_score` formula.
#[test]
fn top_n_scores_are_non_increasing_and_reflect_user_score() {
    // single form "A" with two homograph candidates: Nng (user_score 0.0,
    // scores higher) and Nnp (user_score -5.0, scores lower).
    let data = write_test_model(&[(vec![b'A' as u16], 0, vec![0, 1])], &[(0, NNG, 0, 0, 0.0), (0, NNP, 0, 0, -5.0)], &[(0, 0, 0, -1.0, 0.0)]);
    let analyzer = Analyzer::new(Cursor::new(data), 0, BuildOption::default()).unwrap();

    let option = AnalyzeOption { top_n: 2, ..AnalyzeOption::default() };
    let results = analyzer.analyze("A", &option).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
    assert_eq!(results[0].tokens[0].tag, PosTag::Nng);
    assert_eq!(results[1].tokens[0].tag, PosTag::Nnp);
    assert_eq!(results[0].score, -1.0);
    assert_eq!(results[1].score, -6.0);
}

#[test]
fn analyze_batch_matches_sequential_single_calls() {
    let analyzer = two_word_dictionary();
    let option = AnalyzeOption::default();
    let batch = analyzer.analyze_batch(&["AB", "A"], &option).unwrap();
    let single_ab = analyzer.analyze("AB", &option).unwrap();
    let single_a = analyzer.analyze("A", &option).unwrap();
    assert_eq!(batch[0], single_ab);
    assert_eq!(batch[1], single_a);
}

#[test]
fn rejects_top_n_zero_at_the_facade() {
    let analyzer = two_word_dictionary();
    let option = AnalyzeOption { top_n: 0, ..AnalyzeOption::default() };
    assert!(analyzer.analyze("A", &option).is_err());
}
