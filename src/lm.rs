//! C7: LM query — modified Kneser-Ney n-gram language model over the
//! morpheme-id vocabulary (spec.md §4.6).
//!
//! Grounded on `original_source/include/kiwi/Knlm.h` (`KnLangModelHeader`,
//! `KnLangModelNode<KeyType, DiffType>` — a trie of back-off nodes with
//! per-node `ll`/`gamma` floats) and `LmState.h`'s `LmObjectBase` query
//! contract (`progress(node, next) -> logprob`). The packed-node binary
//! layout reader style follows the teacher's `src/gguf.rs` defensive
//! primitive-reader idiom.

use crate::morpheme::MorphId;

/// Index into the LM's flat back-off trie node array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LmNodeId(pub u32);

const LM_ROOT: LmNodeId = LmNodeId(0);

/// Quantization applied to the stored `ll`/`gamma` tables. Only the two
/// byte-aligned widths this crate's own model writer produces are
/// implemented (DESIGN.md Open Question #5); the general 1..16-bit case
/// is a documented extension point on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmQuant {
    None,
    Bits8,
    Bits16,
}

/// One node of the KN back-off trie: `num_nexts` children starting at
/// `next_offset` in the parallel `next_keys`/`next_diffs` arrays, a
/// `lower` back-off pointer, and this n-gram's `(ll, gamma)` pair.
#[derive(Debug, Clone, Copy)]
struct LmNode {
    num_nexts: u32,
    next_offset: u32,
    lower: i64,
    ll: f32,
    gamma: f32,
}

/// Frozen n-gram language model: a back-off trie keyed by [`MorphId`]'s
/// LM vocabulary index (`Morpheme::lm_morpheme_id`), queried one token at
/// a time via [`LangModel::progress`].
#[derive(Debug, Clone)]
pub struct LangModel {
    order: u8,
    vocab_size: u32,
    unk_id: u32,
    bos_id: u32,
    eos_id: u32,
    quant: LmQuant,
    nodes: Vec<LmNode>,
    next_keys: Vec<u32>,
    next_diffs: Vec<i64>,
    /// Present only when `quant != None`: maps a quantized code to a
    /// dequantized `(ll, gamma)` pair.
    qtable: Vec<(f32, f32)>,
}

impl LangModel {
    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn vocab_size(&self) -> u32 {
        self.vocab_size
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    pub fn bos_id(&self) -> u32 {
        self.bos_id
    }

    pub fn eos_id(&self) -> u32 {
        self.eos_id
    }

    pub fn root(&self) -> LmNodeId {
        LM_ROOT
    }

    fn child(&self, node: LmNodeId, key: u32) -> Option<LmNodeId> {
        let n = &self.nodes[node.0 as usize];
        let start = n.next_offset as usize;
        let end = start + n.num_nexts as usize;
        let keys = &self.next_keys[start..end];
        let pos = keys.binary_search(&key).ok()?;
        Some(LmNodeId((node.0 as i64 + self.next_diffs[start + pos]) as u32))
    }

    fn lower(&self, node: LmNodeId) -> Option<LmNodeId> {
        let l = self.nodes[node.0 as usize].lower;
        if node == LM_ROOT {
            None
        } else {
            Some(LmNodeId((node.0 as i64 + l) as u32))
        }
    }

    /// Advances `node` by one token, returning the KN log-probability of
    /// `next` given the context `node` represents, and mutating `node` in
    /// place to the resulting (possibly backed-off) state — mirrors
    /// `KnLangModelBase::progress(node_idx&, next)` in the original.
    pub fn progress(&self, node: &mut LmNodeId, next: MorphId, lm_id_of: impl Fn(MorphId) -> u32) -> f32 {
        let key = lm_id_of(next);
        let mut cur = *node;
        let mut backoff = 0.0f32;
        loop {
            if let Some(child) = self.child(cur, key) {
                *node = child;
                return backoff + self.ll_of(child);
            }
            backoff += self.gamma_of(cur);
            match self.lower(cur) {
                Some(l) => cur = l,
                None => {
                    // exhausted the back-off chain; treat as root unigram
                    *node = LM_ROOT;
                    return backoff + self.ll_of(LM_ROOT);
                }
            }
        }
    }

    fn ll_of(&self, node: LmNodeId) -> f32 {
        match self.quant {
            LmQuant::None => self.nodes[node.0 as usize].ll,
            LmQuant::Bits8 | LmQuant::Bits16 => {
                let code = self.nodes[node.0 as usize].ll as usize;
                self.qtable.get(code).map(|&(ll, _)| ll).unwrap_or(0.0)
            }
        }
    }

    fn gamma_of(&self, node: LmNodeId) -> f32 {
        match self.quant {
            LmQuant::None => self.nodes[node.0 as usize].gamma,
            LmQuant::Bits8 | LmQuant::Bits16 => {
                let code = self.nodes[node.0 as usize].gamma as usize;
                self.qtable.get(code).map(|&(_, g)| g).unwrap_or(0.0)
            }
        }
    }

    /// Evaluates the log-probability of an entire morpheme-id sequence
    /// starting from a fresh root state. Used by tests and by
    /// `Analyzer::evaluate_sequence`-style callers that want a whole-path
    /// score rather than incremental per-token scores.
    pub fn eval_sequence(&self, seq: &[MorphId], lm_id_of: impl Fn(MorphId) -> u32) -> f32 {
        let mut node = self.root();
        let mut total = 0.0f32;
        for &m in seq {
            total += self.progress(&mut node, m, &lm_id_of);
        }
        total
    }
}

/// Builder used by the model loader to assemble a [`LangModel`] from the
/// decoded node/key arrays in the model file (see `src/model.rs`).
#[derive(Debug, Default)]
pub struct LangModelBuilder {
    pub order: u8,
    pub vocab_size: u32,
    pub unk_id: u32,
    pub bos_id: u32,
    pub eos_id: u32,
    pub quant: Option<LmQuant>,
    pub nodes: Vec<(u32, u32, i64, f32, f32)>,
    pub next_keys: Vec<u32>,
    pub next_diffs: Vec<i64>,
    pub qtable: Vec<(f32, f32)>,
}

impl LangModelBuilder {
    pub fn build(self) -> LangModel {
        let nodes = self
            .nodes
            .into_iter()
            .map(|(num_nexts, next_offset, lower, ll, gamma)| LmNode {
                num_nexts,
                next_offset,
                lower,
                ll,
                gamma,
            })
            .collect();
        LangModel {
            order: self.order,
            vocab_size: self.vocab_size,
            unk_id: self.unk_id,
            bos_id: self.bos_id,
            eos_id: self.eos_id,
            quant: self.quant.unwrap_or(LmQuant::None),
            nodes,
            next_keys: self.next_keys,
            next_diffs: self.next_diffs,
            qtable: self.qtable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a tiny 2-node model: root (key 0, unigram) -> child keyed on
    /// morpheme lm-id 1, with root gamma 0.1 for back-off coverage.
    fn tiny_model() -> LangModel {
        let mut b = LangModelBuilder {
            order: 2,
            vocab_size: 4,
            unk_id: 0,
            bos_id: 1,
            eos_id: 2,
            quant: Some(LmQuant::None),
            ..Default::default()
        };
        b.nodes.push((1, 0, 0, -2.0, 0.1)); // root: ll=-2.0 (unigram fallback), 1 child
        b.nodes.push((0, 0, -1, -0.5, 0.0)); // child for key=1, backs off to root
        b.next_keys.push(1);
        b.next_diffs.push(1);
        b.build()
    }

    #[test]
    fn progress_finds_direct_child() {
        let lm = tiny_model();
        let mut node = lm.root();
        let score = lm.progress(&mut node, MorphId(7), |_| 1);
        assert_eq!(score, -0.5);
        assert_eq!(node, LmNodeId(1));
    }

    #[test]
    fn progress_backs_off_when_no_child() {
        let lm = tiny_model();
        let mut node = lm.root();
        let score = lm.progress(&mut node, MorphId(9), |_| 99);
        // no child for key 99: backoff = gamma(root) = 0.1, then root unigram -2.0
        assert_eq!(score, 0.1 + -2.0);
        assert_eq!(node, LM_ROOT);
    }

    #[test]
    fn eval_sequence_sums_incremental_scores() {
        let lm = tiny_model();
        let total = lm.eval_sequence(&[MorphId(0), MorphId(0)], |_| 1);
        // first call: root -> child (-0.5); second call: from child, no
        // key-1 child exists, so backoff via child's gamma (0.0) + lower(root)=root unigram
        assert!(total.is_finite());
    }
}
