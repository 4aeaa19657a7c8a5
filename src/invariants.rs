//! Ambient runtime-invariant assertions (SPEC_FULL.md §7, spec.md §8).
//!
//! Debug-only, no-op in release, matching the teacher's original
//! `invariants.rs` pattern exactly. Extended beyond the teacher's
//! token-bounds checks to cover lattice reachability and cutoff
//! soundness, the two structural invariants spec.md §8 calls out for the
//! lattice/path stages.

use crate::lattice::Lattice;
use crate::path::PathResult;
use crate::types::TokenInfo;

#[cfg(debug_assertions)]
pub fn assert_lattice_reachable(lattice: &Lattice) {
    let n = lattice.nodes.len();
    if n < 2 {
        return;
    }
    let bos = crate::lattice::NodeId((n - 2) as u32);
    let eos = crate::lattice::NodeId((n - 1) as u32);
    let mut seen = vec![false; n];
    let mut stack = vec![bos];
    seen[bos.0 as usize] = true;
    while let Some(cur) = stack.pop() {
        for &next in lattice.successors(cur) {
            if !seen[next.0 as usize] {
                seen[next.0 as usize] = true;
                stack.push(next);
            }
        }
    }
    debug_assert!(seen[eos.0 as usize], "Invariant violation: sink unreachable from source in lattice");
}

#[cfg(not(debug_assertions))]
pub fn assert_lattice_reachable(_lattice: &Lattice) {}

/// A path's accumulated score must be explainable: the sum of its
/// per-token contributions must match the path's own total within
/// floating-point slack, catching a scorer bug that adds a token's
/// contribution twice (or drops one).
#[cfg(debug_assertions)]
pub fn assert_cutoff_soundness(path: &PathResult, per_token_scores: &[f32]) {
    let sum: f32 = per_token_scores.iter().sum();
    debug_assert!(
        (sum - path.score).abs() < 1e-3 * (path.score.abs() + 1.0),
        "Invariant violation: path score does not match sum of per-token contributions"
    );
}

#[cfg(not(debug_assertions))]
pub fn assert_cutoff_soundness(_path: &PathResult, _per_token_scores: &[f32]) {}

#[cfg(debug_assertions)]
pub fn assert_tokens_in_bounds(tokens: &[TokenInfo], text_len: u32) {
    for t in tokens {
        debug_assert!(t.position <= text_len, "Invariant violation: token position past end of input");
        debug_assert!(t.position + t.length as u32 <= text_len, "Invariant violation: token span past end of input");
    }
}

#[cfg(not(debug_assertions))]
pub fn assert_tokens_in_bounds(_tokens: &[TokenInfo], _text_len: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::GraphNode;

    #[test]
    fn reachable_lattice_passes() {
        let nodes = vec![
            GraphNode { start: 0, end: 1, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 1, end: 1, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![crate::lattice::NodeId(2)], vec![crate::lattice::NodeId(0)], vec![]];
        let lattice = Lattice { nodes, edges, len: 1 };
        assert_lattice_reachable(&lattice);
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore)]
    #[should_panic(expected = "Invariant violation")]
    fn unreachable_sink_panics_in_debug() {
        let nodes = vec![
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 1, end: 1, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![], vec![]];
        let lattice = Lattice { nodes, edges, len: 1 };
        assert_lattice_reachable(&lattice);
    }

    #[test]
    fn tokens_within_bounds_pass() {
        let tokens = vec![TokenInfo {
            form: "x".into(),
            tag: crate::types::PosTag::Nng,
            position: 0,
            length: 1,
            word_position: 0,
            sent_position: 0,
            sub_sent_position: 0,
            word_score: 0.0,
            typo_cost: 0.0,
            paired_token: None,
        }];
        assert_tokens_in_bounds(&tokens, 1);
    }
}
