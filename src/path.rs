//! C8: Path evaluator — Viterbi search with a top-N beam over the
//! lattice, scored by the language model plus rule-based adjustments
//! (spec.md §4.7).
//!
//! Grounded on `original_source/src/PathEvaluator.hpp` (`WordLL` cells
//! keyed by `(rootId, spState, accScore)` with a back-pointer, the
//! `BestPathContainer` top-N-per-cutoff container, and the retry pass
//! that turns a vowel/polarity condition violation into a soft penalty
//! rather than a hard reject when it leaves a node empty) and on the
//! teacher's `src/ugm.rs` `encode_segment` forward-DP-array shape,
//! generalized from single-best to a beam of `top_n` candidates per node.
//! The original's richer multi-root "common root" bookkeeping (used there
//! to share search state across sentence-initial branch points) is
//! collapsed to a single implicit root per DESIGN.md's recorded
//! simplification — every lattice here already starts from one sentinel
//! BOS node, so a second root id never arises.

use crate::feature::{self, satisfies_polarity, satisfies_vowel};
use crate::form::FormStore;
use crate::jamo::JamoChar;
use crate::lattice::{Lattice, NodeId};
use crate::lm::{LangModel, LmNodeId};
use crate::morpheme::{MorphId, Morpheme, MorphemeStore};
use crate::types::{Dialect, PosTag};

/// Extra per-cell state the rule-based scorer consults: quote-nesting
/// depth (for quote/bracket pairing) and a memo of sentence-boundary
/// bullet hashes already seen earlier in the path. Threaded across
/// sentence chunks by the façade (spec.md §4.9) so a chunk boundary never
/// resets quote-depth or bullet memory mid-document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpecialState {
    pub open_quote_depth: u8,
    pub just_saw_ending: bool,
    /// Bitset of 6-bit bullet-hash buckets already seen at a sentence
    /// boundary earlier in this path (spec.md §4.7's "sentence-boundary
    /// matches a previously memoized bullet hash" rule). 64 buckets fit a
    /// `u64` exactly, so "seen before" is a single bit test.
    pub bullet_seen: u64,
}

/// Cheap, deliberately lossy 6-bit fingerprint of a sentence-boundary
/// form's surface (e.g. `"1."` and `"2."` collide into the same bucket
/// about as often as not) — spec.md §9 accepts the collision rate rather
/// than specifying an exact hash.
fn bullet_hash(jamo: &[JamoChar]) -> u8 {
    let h = jamo.iter().fold(0u32, |acc, &c| acc.wrapping_mul(31).wrapping_add(c as u32));
    (h & 0x3F) as u8
}

/// A single-morpheme cell whose `combine_socket` is non-zero and which
/// has not yet been joined to its partner (spec.md §3's "pending left
/// fragment" invariant — e.g. `더/V` waiting for a `ㅂ/V` ending to
/// restore `덥/VA`). Until resolved, the cell contributes no LM score
/// and emits no output token.
#[derive(Debug, Clone, Copy)]
struct PendingFrag {
    morph: MorphId,
    socket: u8,
    start: u32,
}

/// What a non-pending cell emits into the final token stream: either a
/// dictionary morpheme (resolved normally, or resolved via a
/// combine-socket join) or an unknown-form span with no morpheme.
#[derive(Debug, Clone, Copy)]
enum Emitted {
    Morph(MorphId),
    /// An unknown-form span, carrying the lattice node's `class_tag` when
    /// one was assigned by the character-class coalescing pass (spec.md
    /// §4.5) so the assembler can emit `Sn`/`Sl`/`Sh`/`Sw`/web-entity tags
    /// instead of a blanket `Unknown`.
    Unknown(Option<PosTag>),
}

/// One cell of the Viterbi beam: a candidate partial analysis ending at a
/// particular lattice node, scored and linked back to its predecessor.
#[derive(Debug, Clone)]
struct WordLL {
    node: NodeId,
    emitted: Option<Emitted>,
    span: Option<(u32, u32)>,
    pending: Option<PendingFrag>,
    acc_score: f32,
    /// Sum of one `LM.progress` call per chunk wid of the morpheme this
    /// cell emitted (firstWid plus each successor chunk wid), remembered
    /// separately from `acc_score` so the assembler can give the first
    /// emitted chunk its own share of the word score instead of an even
    /// split (spec.md §3's `WordLL::first_chunk_score`, §4.7 step 2, and
    /// §4.8 item 3). Zero for cells that emit no morpheme.
    first_chunk_score: f32,
    sp_state: SpecialState,
    prev: Option<usize>,
}

/// Penalty/bonus knobs applied by the rule-based scorer (spec.md §4.7's
/// ten adjustment rules); grouped into one struct so `Analyzer` can
/// expose them as tunables without the signature of `evaluate` growing a
/// parameter per rule. Rule 7 (quote-type disagreement) has no tunable
/// here — DESIGN.md records why it cannot fire against this crate's
/// single `Ss` tag.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRules {
    pub unknown_form_extra_penalty: f32,
    pub typo_cost_weight: f32,
    pub dialect_cost: f32,
    /// Bonus applied when a combine-socket join (irregular conjugation
    /// reconstruction) resolves — spec.md §4.7 treats a successful
    /// socket match as evidence the analysis is on the right track, not
    /// merely neutral, so this is additive rather than zero.
    pub combine_join_bonus: f32,
    /// Rule 10: bonus applied when a sentence-boundary morpheme's bullet
    /// hash matches one already memoized earlier in the same path.
    pub bullet_hash_bonus: f32,
    /// Rule 1: vowel-initial ending directly following a combine-socket
    /// join (irregular-verb reconstruction) — the join already restored
    /// the verb stem, so a following ending that *also* starts on a
    /// vowel double-counts the contraction.
    pub irregular_vowel_ending_penalty: f32,
    /// Rule 2: subject-marker 가 immediately after one of 나/너/저 (which
    /// contract to 내가/네가/제가 in careful usage).
    pub pronoun_subject_marker_penalty: f32,
    /// Rule 3: ㄹ-ending verb stem followed by a ㅇ/ㅆ/ㄴ-initial suffix.
    pub rieul_suffix_penalty: f32,
    /// Rule 4: 아-ending directly after a verb whose governing vowel is
    /// not positive (vowel harmony violation).
    pub non_positive_a_ending_penalty: f32,
    /// Rule 5: 어-ending after a vowel-final verb stem.
    pub vowel_final_eo_ending_penalty: f32,
    /// Rule 6: an ending incompatible with adjective-derivation suffixes
    /// (`Va`/`Xsa`) attached directly to one.
    pub adjective_incompatible_ending_penalty: f32,
    /// Rule 8: sentence-final punctuation directly following a single
    /// Hangul syllable and a literal `.` (ordinal list-marker shape).
    pub letter_dot_boundary_penalty: f32,
    /// Rule 9: sentence-final punctuation whose predecessor is an ending
    /// that is not itself a sentence-final ending (`Ef`).
    pub non_final_ending_boundary_penalty: f32,
    /// Retry-pass soft penalty applied to a vowel/polarity condition
    /// violation once the strict pass leaves a node with no surviving
    /// candidates (spec.md §4.7's "ignoreCondScore = -10").
    pub condition_violation_penalty: f32,
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            unknown_form_extra_penalty: -3.0,
            typo_cost_weight: 1.0,
            dialect_cost: 3.0,
            combine_join_bonus: 0.5,
            bullet_hash_bonus: 3.0,
            irregular_vowel_ending_penalty: -10.0,
            pronoun_subject_marker_penalty: -5.0,
            rieul_suffix_penalty: -7.0,
            non_positive_a_ending_penalty: -100.0,
            vowel_final_eo_ending_penalty: -3.0,
            adjective_incompatible_ending_penalty: -10.0,
            letter_dot_boundary_penalty: -5.0,
            non_final_ending_boundary_penalty: -10.0,
            condition_violation_penalty: -10.0,
        }
    }
}

/// Result of a full path search: the top-N scored token sequences,
/// highest score first. `morphs[i] == None` marks an unknown-form span
/// with no dictionary morpheme (spec.md §4.9's UNK fallback token).
#[derive(Debug, Clone)]
pub struct PathResult {
    pub morphs: Vec<Option<MorphId>>,
    pub spans: Vec<(u32, u32)>,
    pub typo_costs: Vec<f32>,
    /// Parallel to `morphs`: each emitted morpheme's own
    /// `first_chunk_score` (spec.md §3/§4.7 step 2), `0.0` for
    /// unknown-form spans.
    pub first_chunk_scores: Vec<f32>,
    /// Parallel to `morphs`: the lattice node's `class_tag` for an
    /// unknown-form span (digit/Latin/Han/punctuation run or web-entity
    /// span), `None` for dictionary morphemes and untagged unknowns.
    pub class_tags: Vec<Option<PosTag>>,
    pub score: f32,
    /// Quote-depth/bullet-memo state at the end of this path, for the
    /// façade to carry into the next sentence chunk (spec.md §4.9).
    pub final_state: SpecialState,
}

fn is_verb_like(tag: PosTag) -> bool {
    matches!(tag, PosTag::Vv | PosTag::Va | PosTag::Vx | PosTag::Vcp | PosTag::Vcn)
}

/// Runs Viterbi search over `lattice`, returning up to `top_n` best paths.
///
/// `initial_state` seeds `SpecialState` at BOS (spec.md §4.9's cross-chunk
/// carry: quote depth and bullet memory survive a sentence-chunk boundary
/// instead of resetting).
///
/// A node that ends up with no surviving candidate purely because every
/// transition into it failed its vowel/polarity condition gets one retry:
/// its incoming edges are replayed with the condition softened to a
/// `condition_violation_penalty` score hit instead of a hard reject
/// (spec.md §4.7's per-node retry pass) — a condition too strict for this
/// particular sentence should degrade to "slower but some answer", never
/// to "no answer".
#[allow(clippy::too_many_arguments)]
pub fn find_best_paths(
    lattice: &Lattice,
    lm: &LangModel,
    forms: &FormStore,
    morphemes: &MorphemeStore,
    top_n: usize,
    cutoff: f32,
    rules: &ScoreRules,
    allowed_dialects: &[Dialect],
    initial_state: SpecialState,
) -> Vec<PathResult> {
    run_pass(lattice, lm, forms, morphemes, top_n, cutoff, rules, allowed_dialects, initial_state)
}

/// Runs `LM.progress` once per chunk wid of `morph_id` (firstWid plus each
/// successor chunk's wid for a composite morpheme), summing the per-chunk
/// log-likelihoods into one total — spec.md §4.7 step 2's
/// `first_chunk_score` computation. A non-chunked morpheme is a one-chunk
/// sequence of itself.
fn chunked_lm_score(lm: &LangModel, start_node: LmNodeId, morph_id: MorphId, morphemes: &MorphemeStore) -> (f32, LmNodeId) {
    let morph = morphemes.get(morph_id);
    let mut node = start_node;
    let mut total = 0.0f32;
    if morph.chunks.is_empty() {
        total += lm.progress(&mut node, morph_id, |m| morphemes.get(m).lm_morpheme_id);
    } else {
        for chunk in &morph.chunks {
            total += lm.progress(&mut node, chunk.morph, |m| morphemes.get(m).lm_morpheme_id);
        }
    }
    (total, node)
}

/// Small fixed lexicon of endings that only ever attach to verbs, never
/// to the `Va`/`Xsa` adjective-derivation family (자, 아라, 어라) —
/// approximated this way since the binary model layout (spec.md §6) has
/// no dedicated "adjective-compatible" bit to test against instead (see
/// DESIGN.md Open Question).
fn is_verb_only_ending(form_jamo: &[JamoChar]) -> bool {
    static JA: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    static ARA: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    static EORA: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    let ja = JA.get_or_init(|| crate::jamo::normalize("자", false).jamo);
    let ara = ARA.get_or_init(|| crate::jamo::normalize("아라", false).jamo);
    let eora = EORA.get_or_init(|| crate::jamo::normalize("어라", false).jamo);
    form_jamo == ja.as_slice() || form_jamo == ara.as_slice() || form_jamo == eora.as_slice()
}

/// True if `form_jamo` recomposes to exactly one Hangul syllable in the
/// `[가-하]` range followed by a literal `.` — the "sentence-boundary
/// abbreviation" shape rule 8 targets (e.g. ordinal list markers).
fn is_letter_dot_boundary(form_jamo: &[JamoChar]) -> bool {
    let Some((&last, rest)) = form_jamo.split_last() else { return false };
    if last as u32 != '.' as u32 {
        return false;
    }
    let recomposed = crate::jamo::recompose(rest);
    let mut chars = recomposed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => ('가'..='하').contains(&c),
        _ => false,
    }
}

/// True if surface `jamo` equals one of 나/너/저 (pronoun-subject rule 2).
fn is_na_neo_jeo(jamo: &[JamoChar]) -> bool {
    static NA: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    static NEO: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    static JEO: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    let na = NA.get_or_init(|| crate::jamo::normalize("나", false).jamo);
    let neo = NEO.get_or_init(|| crate::jamo::normalize("너", false).jamo);
    let jeo = JEO.get_or_init(|| crate::jamo::normalize("저", false).jamo);
    jamo == na.as_slice() || jamo == neo.as_slice() || jamo == jeo.as_slice()
}

/// True if surface `jamo` is the subject marker 가 (rule 2).
fn is_ga(jamo: &[JamoChar]) -> bool {
    static GA: std::sync::OnceLock<Vec<JamoChar>> = std::sync::OnceLock::new();
    let ga = GA.get_or_init(|| crate::jamo::normalize("가", false).jamo);
    jamo == ga.as_slice()
}

/// Applies the eight §4.7 rule-based adjustments not already folded into
/// the inline scoring in `transition_into_dict_node` (dialect cost,
/// combine-join bonus, bullet-hash bonus, quote-depth toggle): keyed on
/// the transitioning morpheme's tag/surface and the predecessor's
/// emitted morpheme and surface.
#[allow(clippy::too_many_arguments)]
fn rule_adjustments(
    rules: &ScoreRules,
    morph: &Morpheme,
    form_jamo: &[JamoChar],
    prev_tag: Option<PosTag>,
    prev_jamo: &[JamoChar],
    from_combine_join: bool,
) -> f32 {
    let mut delta = 0.0f32;

    // Rule 1: vowel-initial ending right after an irregular-verb combine join.
    if from_combine_join && morph.tag.is_ending() && feature::starts_with_vowel(form_jamo) {
        delta += rules.irregular_vowel_ending_penalty;
    }

    // Rule 2: subject-marker 가 (Jks) directly after 나/너/저.
    if morph.tag == PosTag::Jks && is_ga(form_jamo) && is_na_neo_jeo(prev_jamo) {
        delta += rules.pronoun_subject_marker_penalty;
    }

    // Rule 3: ㄹ-ending verb stem followed by a ㅇ/ㅆ/ㄴ-initial suffix.
    if feature::ends_in_rieul_coda(prev_jamo)
        && feature::starts_with_onset_in(form_jamo, &[feature::ONSET_IEUNG, feature::ONSET_SSANGSIOT, feature::ONSET_NIEUN])
    {
        delta += rules.rieul_suffix_penalty;
    }

    if let Some(pt) = prev_tag {
        // Rule 4: 아-ending directly after a verb whose governing vowel is negative.
        if morph.tag.is_ending() && feature::starts_with_vowel_offset(form_jamo, feature::VOWEL_OFFSET_A) && is_verb_like(pt) && !feature::is_positive(prev_jamo) {
            delta += rules.non_positive_a_ending_penalty;
        }

        // Rule 5: 어-ending after a vowel-final verb stem.
        if morph.tag.is_ending() && feature::starts_with_vowel_offset(form_jamo, feature::VOWEL_OFFSET_EO) && is_verb_like(pt) && feature::is_vowel(prev_jamo) {
            delta += rules.vowel_final_eo_ending_penalty;
        }

        // Rule 6: ending incompatible with an adjective-derivation suffix
        // (Va/Xsa) attached directly to it.
        if matches!(pt, PosTag::Va | PosTag::Xsa) && morph.tag.is_ending() && is_verb_only_ending(form_jamo) {
            delta += rules.adjective_incompatible_ending_penalty;
        }

        // Rule 9: sentence-final punctuation whose predecessor is an
        // ending but not itself a sentence-final ending (Ef).
        if morph.tag == PosTag::Sf && pt.is_ending() && pt != PosTag::Ef {
            delta += rules.non_final_ending_boundary_penalty;
        }
    }

    // Rule 8: sentence-final punctuation shaped like "<syllable>.".
    if morph.tag == PosTag::Sf && is_letter_dot_boundary(form_jamo) {
        delta += rules.letter_dot_boundary_penalty;
    }

    delta
}

fn update_quote_and_bullet_state(sp_state: &mut SpecialState, morph: &Morpheme, form_jamo: &[JamoChar], rules: &ScoreRules, score: &mut f32) {
    if morph.tag == PosTag::Ss {
        // `Ss` is shared by opening and closing quotes/brackets
        // (assemble.rs's `pair_quotes_and_brackets` tells them apart by
        // stack order); an odd occurrence opens, an even one closes,
        // mirroring that same parity.
        if sp_state.open_quote_depth > 0 {
            sp_state.open_quote_depth -= 1;
        } else {
            sp_state.open_quote_depth = 1;
        }
    }
    if morph.tag.is_ending() {
        sp_state.just_saw_ending = true;
    } else if morph.tag != PosTag::Ss {
        sp_state.just_saw_ending = false;
    }
    if morph.tag == PosTag::Sf {
        let h = bullet_hash(form_jamo);
        let bit = 1u64 << h;
        if sp_state.bullet_seen & bit != 0 {
            *score += rules.bullet_hash_bonus;
        }
        sp_state.bullet_seen |= bit;
    }
}

/// Per-predecessor candidate → next-node transition over every dictionary
/// morpheme candidate of `form`. `ignore_cond` turns a vowel/polarity
/// condition failure into a soft `condition_violation_penalty` instead of
/// a hard reject (the per-node retry call); the strict call passes
/// `false` and instead reports whether any candidate was rejected purely
/// for that reason, via the returned `bool`.
#[allow(clippy::too_many_arguments)]
fn transition_into_dict_node(
    pred_candidates: &[usize],
    next_id: NodeId,
    next_node: &crate::lattice::GraphNode,
    form: &crate::form::Form,
    lm: &LangModel,
    forms: &FormStore,
    lattice: &Lattice,
    morphemes: &MorphemeStore,
    rules: &ScoreRules,
    cutoff: f32,
    max_score: f32,
    ignore_cond: bool,
    arena: &mut Vec<WordLL>,
    lm_states: &mut Vec<LmNodeId>,
    cells_next: &mut Vec<usize>,
) -> bool {
    let mut cond_rejected = false;

    for &morph_id in &form.candidates {
        let morph = morphemes.get(morph_id);

        for &ci in pred_candidates {
            if arena[ci].acc_score + cutoff < max_score {
                continue;
            }

            if let Some(frag) = arena[ci].pending {
                if morph.combine_socket == 0 || morph.combine_socket != frag.socket {
                    continue;
                }
                let left = morphemes.get(frag.morph);
                let joined = left.combined;
                let joined_morph = morphemes.get(joined);

                let (lm_score, lm_node) = chunked_lm_score(lm, lm_states[ci], joined, morphemes);

                let mut score = arena[ci].acc_score + lm_score + joined_morph.user_score - next_node.typo_cost.abs() * rules.typo_cost_weight + rules.combine_join_bonus;
                let mut sp_state = arena[ci].sp_state;
                if joined_morph.dialect != Dialect::Standard {
                    score -= rules.dialect_cost;
                }
                let (prev_tag, prev_jamo) = preceding_context(&arena[ci], lattice, forms, morphemes);
                score += rule_adjustments(rules, joined_morph, &form.form, prev_tag, &prev_jamo, true);
                update_quote_and_bullet_state(&mut sp_state, joined_morph, &form.form, rules, &mut score);

                arena.push(WordLL {
                    node: next_id,
                    emitted: Some(Emitted::Morph(joined)),
                    span: Some((frag.start, next_node.end)),
                    pending: None,
                    acc_score: score,
                    first_chunk_score: lm_score,
                    sp_state,
                    prev: Some(ci),
                });
                lm_states.push(lm_node);
                cells_next.push(arena.len() - 1);
                continue;
            }

            // spec.md §4.4: a preceding closing-punctuation morpheme
            // (e.g. a closing quote/bracket) makes vowel/polarity
            // conditions on the following morpheme moot — there is no
            // phonological left-context to check.
            let waived = preceding_is_closing_punctuation(&arena[ci], morphemes);
            let mut cond_penalty = 0.0f32;
            if !waived {
                let preceding_jamo = preceding_form_jamo(lattice, forms, arena[ci].node);
                let ok = satisfies_vowel(morph.vowel, &preceding_jamo) && satisfies_polarity(morph.polar, &preceding_jamo);
                if !ok {
                    if !ignore_cond {
                        cond_rejected = true;
                        continue;
                    }
                    cond_penalty = rules.condition_violation_penalty;
                }
            }

            if morph.combine_socket != 0 && morph.is_single() {
                arena.push(WordLL {
                    node: next_id,
                    emitted: None,
                    span: None,
                    pending: Some(PendingFrag { morph: morph_id, socket: morph.combine_socket, start: next_node.start }),
                    acc_score: arena[ci].acc_score + cond_penalty,
                    first_chunk_score: 0.0,
                    sp_state: arena[ci].sp_state,
                    prev: Some(ci),
                });
                lm_states.push(lm_states[ci]);
                cells_next.push(arena.len() - 1);
                continue;
            }

            let (lm_score, lm_node) = chunked_lm_score(lm, lm_states[ci], morph_id, morphemes);

            let mut score = arena[ci].acc_score + lm_score + morph.user_score - next_node.typo_cost.abs() * rules.typo_cost_weight + cond_penalty;
            let mut sp_state = arena[ci].sp_state;

            if morph.dialect != Dialect::Standard {
                score -= rules.dialect_cost;
            }
            let (prev_tag, prev_jamo) = preceding_context(&arena[ci], lattice, forms, morphemes);
            score += rule_adjustments(rules, morph, &form.form, prev_tag, &prev_jamo, false);
            update_quote_and_bullet_state(&mut sp_state, morph, &form.form, rules, &mut score);

            arena.push(WordLL {
                node: next_id,
                emitted: Some(Emitted::Morph(morph_id)),
                span: Some((next_node.start, next_node.end)),
                pending: None,
                acc_score: score,
                first_chunk_score: lm_score,
                sp_state,
                prev: Some(ci),
            });
            lm_states.push(lm_node);
            cells_next.push(arena.len() - 1);
        }
    }

    cond_rejected
}

/// `(tag, surface jamo)` of the morpheme `cell` emitted, for the handful
/// of rules keyed on the immediately preceding morpheme. `None`/empty for
/// a cell with no emitted morpheme (BOS, pending fragment, unknown span).
fn preceding_context(cell: &WordLL, lattice: &Lattice, forms: &FormStore, morphemes: &MorphemeStore) -> (Option<PosTag>, Vec<JamoChar>) {
    let tag = match cell.emitted {
        Some(Emitted::Morph(m)) => Some(morphemes.get(m).tag),
        _ => None,
    };
    (tag, preceding_form_jamo(lattice, forms, cell.node))
}

#[allow(clippy::too_many_arguments)]
fn run_pass(
    lattice: &Lattice,
    lm: &LangModel,
    forms: &FormStore,
    morphemes: &MorphemeStore,
    top_n: usize,
    cutoff: f32,
    rules: &ScoreRules,
    allowed_dialects: &[Dialect],
    initial_state: SpecialState,
) -> Vec<PathResult> {
    let n = lattice.nodes.len();
    let bos = NodeId((n - 2) as u32);
    let eos = NodeId((n - 1) as u32);

    // `cells` holds, per node, the beam of live `WordLL` candidates that
    // end at that node, referenced by index into the flat `arena`.
    let mut cells: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut arena: Vec<WordLL> = Vec::new();
    let mut lm_states: Vec<LmNodeId> = Vec::new();

    arena.push(WordLL { node: bos, emitted: None, span: None, pending: None, acc_score: 0.0, first_chunk_score: 0.0, sp_state: initial_state, prev: None });
    lm_states.push(lm.root());
    cells[bos.0 as usize].push(0);

    let order: Vec<NodeId> = topological_order(lattice, bos);

    // Reverse adjacency, built once, so a node found empty after its
    // strict pass can have its incoming edges retried with the
    // vowel/polarity condition softened (spec.md §4.7's per-node retry).
    // Predecessors of `cur_id` all share `end == cur_id.start`, and the
    // topological order (sorted by `end`) guarantees they are fully
    // processed before `cur_id` is visited, so the retry always sees
    // each predecessor's final beam.
    let mut rev_edges: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for (i, succs) in lattice.edges.iter().enumerate() {
        for &s in succs {
            rev_edges[s.0 as usize].push(NodeId(i as u32));
        }
    }
    let mut cond_rejected_at: Vec<bool> = vec![false; n];

    for &cur_id in &order {
        if cur_id != bos && cells[cur_id.0 as usize].is_empty() && cond_rejected_at[cur_id.0 as usize] {
            retry_node_with_softened_condition(cur_id, &rev_edges, lattice, lm, forms, morphemes, rules, allowed_dialects, cutoff, &mut cells, &mut arena, &mut lm_states);
        }

        let cur_candidates = cells[cur_id.0 as usize].clone();
        if cur_candidates.is_empty() {
            continue;
        }
        let max_score = cur_candidates.iter().map(|&i| arena[i].acc_score).fold(f32::NEG_INFINITY, f32::max);

        for &next_id in lattice.successors(cur_id) {
            if next_id == eos {
                for &ci in &cur_candidates {
                    if arena[ci].acc_score + cutoff < max_score {
                        continue;
                    }
                    // A still-pending fragment can never reach EOS: every
                    // pending cell must be resolved by a matching partner
                    // before the sentence ends (spec.md §3 invariant).
                    if arena[ci].pending.is_some() {
                        continue;
                    }
                    arena.push(WordLL {
                        node: eos,
                        emitted: None,
                        span: None,
                        pending: None,
                        acc_score: arena[ci].acc_score,
                        first_chunk_score: 0.0,
                        sp_state: arena[ci].sp_state,
                        prev: Some(ci),
                    });
                    lm_states.push(lm_states[ci]);
                    cells[eos.0 as usize].push(arena.len() - 1);
                }
                continue;
            }

            let next_node = lattice.node(next_id);
            // A typo-variant node (spec.md §4.5) carries no real `form` but
            // matches via `typo_form_id` instead; treat it as an ordinary
            // dictionary node keyed on that id — its `typo_cost` is already
            // deducted generically below like any other node's.
            let Some(form_id) = next_node.form.or(next_node.typo_form_id) else {
                // unknown-form node: one synthetic morpheme-less hop with
                // the node's own typo/unknown-form penalty as its score.
                // A pending fragment cannot be followed by an unknown
                // span (no socket to match), so it is rejected here too.
                for &ci in &cur_candidates {
                    if arena[ci].acc_score + cutoff < max_score || arena[ci].pending.is_some() {
                        continue;
                    }
                    let score = arena[ci].acc_score + next_node.typo_cost + rules.unknown_form_extra_penalty;
                    arena.push(WordLL {
                        node: next_id,
                        emitted: Some(Emitted::Unknown(next_node.class_tag)),
                        span: Some((next_node.start, next_node.end)),
                        pending: None,
                        acc_score: score,
                        first_chunk_score: 0.0,
                        sp_state: arena[ci].sp_state,
                        prev: Some(ci),
                    });
                    lm_states.push(lm_states[ci]);
                    cells[next_id.0 as usize].push(arena.len() - 1);
                }
                continue;
            };

            let form = forms.get(form_id);
            if !allowed_dialects.is_empty() && form.dialect != Dialect::Standard && !allowed_dialects.contains(&form.dialect) {
                continue;
            }

            let mut cells_next = std::mem::take(&mut cells[next_id.0 as usize]);
            let cond_rejected = transition_into_dict_node(
                &cur_candidates,
                next_id,
                next_node,
                form,
                lm,
                forms,
                lattice,
                morphemes,
                rules,
                cutoff,
                max_score,
                false,
                &mut arena,
                &mut lm_states,
                &mut cells_next,
            );
            cells[next_id.0 as usize] = cells_next;
            if cond_rejected {
                cond_rejected_at[next_id.0 as usize] = true;
            }
        }

        prune_beam(&mut cells[cur_id.0 as usize], &arena, top_n.max(1) * 4);
    }

    prune_beam(&mut cells[eos.0 as usize], &arena, top_n);

    let mut finals: Vec<usize> = cells[eos.0 as usize].clone();
    finals.sort_by(|&a, &b| arena[b].acc_score.partial_cmp(&arena[a].acc_score).unwrap_or(std::cmp::Ordering::Equal));
    finals.truncate(top_n.max(1));

    finals.into_iter().map(|idx| reconstruct(&arena, idx)).collect()
}

/// spec.md §4.7's per-node retry: called only for a node that ended up
/// with zero surviving candidates after its strict pass, and only when
/// at least one rejection there was purely a condition failure. Redoes
/// every incoming dict-form edge with the condition softened to
/// `condition_violation_penalty` instead of a hard reject.
#[allow(clippy::too_many_arguments)]
fn retry_node_with_softened_condition(
    node_id: NodeId,
    rev_edges: &[Vec<NodeId>],
    lattice: &Lattice,
    lm: &LangModel,
    forms: &FormStore,
    morphemes: &MorphemeStore,
    rules: &ScoreRules,
    allowed_dialects: &[Dialect],
    cutoff: f32,
    cells: &mut [Vec<usize>],
    arena: &mut Vec<WordLL>,
    lm_states: &mut Vec<LmNodeId>,
) {
    let Some(form_id) = lattice.node(node_id).form else { return };
    let form = forms.get(form_id);
    if !allowed_dialects.is_empty() && form.dialect != Dialect::Standard && !allowed_dialects.contains(&form.dialect) {
        return;
    }
    let next_node = lattice.node(node_id);
    let mut cells_next = std::mem::take(&mut cells[node_id.0 as usize]);
    for &pred_id in &rev_edges[node_id.0 as usize] {
        let pred_candidates = cells[pred_id.0 as usize].clone();
        if pred_candidates.is_empty() {
            continue;
        }
        let max_score = pred_candidates.iter().map(|&i| arena[i].acc_score).fold(f32::NEG_INFINITY, f32::max);
        transition_into_dict_node(
            &pred_candidates, node_id, next_node, form, lm, forms, lattice, morphemes, rules, cutoff, max_score, true, arena, lm_states, &mut cells_next,
        );
    }
    cells[node_id.0 as usize] = cells_next;
}

fn prune_beam(cell: &mut Vec<usize>, arena: &[WordLL], keep: usize) {
    cell.sort_by(|&a, &b| arena[b].acc_score.partial_cmp(&arena[a].acc_score).unwrap_or(std::cmp::Ordering::Equal));
    cell.truncate(keep.max(1));
}

fn preceding_form_jamo(lattice: &Lattice, forms: &FormStore, node: NodeId) -> Vec<JamoChar> {
    match lattice.node(node).form {
        Some(id) => forms.get(id).form.clone(),
        None => Vec::new(),
    }
}

/// True if the morpheme that produced `cell` is tagged as closing
/// punctuation (spec.md §4.4's condition-ignoring policy). A `bos`/pending
/// cell with no emitted morpheme is not closing punctuation.
fn preceding_is_closing_punctuation(cell: &WordLL, morphemes: &MorphemeStore) -> bool {
    match cell.emitted {
        Some(Emitted::Morph(m)) => morphemes.get(m).tag.is_closing_punctuation(),
        _ => false,
    }
}

/// DAG nodes are produced in non-decreasing `start`/`end` order by the
/// lattice builder, so a sort by `end` gives a valid topological order
/// without needing a separate graph traversal.
fn topological_order(lattice: &Lattice, bos: NodeId) -> Vec<NodeId> {
    let mut order: Vec<NodeId> = (0..lattice.nodes.len() as u32).map(NodeId).collect();
    order.sort_by_key(|id| lattice.node(*id).end);
    order.retain(|&id| id != bos);
    let mut full = vec![bos];
    full.extend(order);
    full
}

fn reconstruct(arena: &[WordLL], mut idx: usize) -> PathResult {
    let mut morphs = Vec::new();
    let mut spans = Vec::new();
    let mut typo_costs = Vec::new();
    let mut first_chunk_scores = Vec::new();
    let mut class_tags = Vec::new();
    let score = arena[idx].acc_score;
    let final_state = arena[idx].sp_state;
    loop {
        match arena[idx].emitted {
            Some(Emitted::Morph(m)) => {
                morphs.push(Some(m));
                spans.push(arena[idx].span.unwrap());
                typo_costs.push(0.0);
                first_chunk_scores.push(arena[idx].first_chunk_score);
                class_tags.push(None);
            }
            Some(Emitted::Unknown(class_tag)) => {
                morphs.push(None);
                spans.push(arena[idx].span.unwrap());
                typo_costs.push(1.0);
                first_chunk_scores.push(0.0);
                class_tags.push(class_tag);
            }
            None => {}
        }
        match arena[idx].prev {
            Some(p) => idx = p,
            None => break,
        }
    }
    morphs.reverse();
    spans.reverse();
    typo_costs.reverse();
    first_chunk_scores.reverse();
    class_tags.reverse();
    PathResult { morphs, spans, typo_costs, first_chunk_scores, class_tags, score, final_state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{bake as bake_form, FormRaw};
    use crate::lattice::GraphNode;
    use crate::lm::LangModelBuilder;
    use crate::morpheme::{bake as bake_morph, Chunk, MorphemeRaw};
    use crate::types::{CondPolarity, CondVowel, PosTag};

    fn tiny_setup() -> (Lattice, LangModel, FormStore, MorphemeStore) {
        let mut forms = FormStore::new();
        let mut morphemes = MorphemeStore::new();

        let mraw = MorphemeRaw::new(PosTag::Nng, CondVowel::None, CondPolarity::None, false, 0);
        let morph_id = morphemes.push(bake_morph(&mraw, 0));

        let mut fraw = FormRaw::new(vec![1, 2]);
        fraw.candidates.push(morph_id);
        let form_id = forms.push(bake_form(&fraw, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        let bos = NodeId(1);
        let eos = NodeId(2);
        let nodes = vec![
            GraphNode { start: 0, end: 2, form: Some(form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 2, end: 2, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![eos], vec![NodeId(0)], vec![]];
        let lattice = Lattice { nodes, edges, len: 2 };

        let mut b = LangModelBuilder {
            order: 2,
            vocab_size: 2,
            unk_id: 0,
            bos_id: 0,
            eos_id: 1,
            quant: None,
            ..Default::default()
        };
        b.nodes.push((0, 0, 0, -1.0, 0.0));
        let lm = b.build();

        (lattice, lm, forms, morphemes)
    }

    #[test]
    fn finds_single_path_through_trivial_lattice() {
        let (lattice, lm, forms, morphemes) = tiny_setup();
        let rules = ScoreRules::default();
        let results = find_best_paths(&lattice, &lm, &forms, &morphemes, 1, -5.0, &rules, &[], SpecialState::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].morphs.len(), 1);
        assert_eq!(results[0].spans[0], (0, 2));
        assert_eq!(results[0].first_chunk_scores.len(), 1);
    }

    #[test]
    fn unused_chunk_import_compiles() {
        let _: Option<Chunk> = None;
    }

    #[test]
    fn bullet_hash_collides_on_identical_surface_and_rarely_on_different_ones() {
        assert_eq!(bullet_hash(&[1, 2]), bullet_hash(&[1, 2]));
        // not a guarantee for all inputs (collisions are expected and
        // accepted, per spec.md §9), but this pair happens to separate —
        // pinning it catches an accidental hash-width change.
        assert_ne!(bullet_hash(&[1, 2]), bullet_hash(&[3, 4, 5]));
    }

    /// Two sentence-boundary (`Sf`) nodes sharing the same surface jamo
    /// should score higher than the same skeleton with differing surfaces,
    /// since the second `Sf` then lands in an already-memoized bullet-hash
    /// bucket (spec.md §4.7's "+3" rule).
    #[test]
    fn repeated_bullet_surface_scores_higher_than_distinct_ones() {
        fn build(second_jamo: Vec<JamoChar>) -> (Lattice, LangModel, FormStore, MorphemeStore) {
            let mut forms = FormStore::new();
            let mut morphemes = MorphemeStore::new();

            let sf_raw = MorphemeRaw::new(PosTag::Sf, CondVowel::None, CondPolarity::None, false, 0);
            let sf_id = morphemes.push(bake_morph(&sf_raw, 0));

            let mut first_form = FormRaw::new(vec![1, 2]);
            first_form.candidates.push(sf_id);
            let first_form_id = forms.push(bake_form(&first_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let mut second_form = FormRaw::new(second_jamo);
            second_form.candidates.push(sf_id);
            let second_form_id = forms.push(bake_form(&second_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let bos = NodeId(2);
            let eos = NodeId(3);
            let nodes = vec![
                GraphNode { start: 0, end: 1, form: Some(first_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 1, end: 2, form: Some(second_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 2, end: 2, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            ];
            let edges = vec![vec![NodeId(1)], vec![eos], vec![NodeId(0)], vec![]];
            let lattice = Lattice { nodes, edges, len: 2 };

            let mut b = LangModelBuilder {
                order: 2,
                vocab_size: 2,
                unk_id: 0,
                bos_id: 0,
                eos_id: 1,
                quant: None,
                ..Default::default()
            };
            b.nodes.push((0, 0, 0, -1.0, 0.0));
            let lm = b.build();

            (lattice, lm, forms, morphemes)
        }

        let rules = ScoreRules::default();
        let (same_lattice, lm1, forms1, morphemes1) = build(vec![1, 2]);
        let same_results = find_best_paths(&same_lattice, &lm1, &forms1, &morphemes1, 1, -50.0, &rules, &[], SpecialState::default());

        let (diff_lattice, lm2, forms2, morphemes2) = build(vec![3, 4, 5]);
        let diff_results = find_best_paths(&diff_lattice, &lm2, &forms2, &morphemes2, 1, -50.0, &rules, &[], SpecialState::default());

        assert_eq!(same_results.len(), 1);
        assert_eq!(diff_results.len(), 1);
        assert!(same_results[0].score > diff_results[0].score);
    }

    /// Builds a two-node lattice modeling `더` (combine_socket=1, pending)
    /// followed by `ㅂ` (combine_socket=1), which must resolve to the
    /// canonical combined morpheme `덥/VA` as one joined cell rather than
    /// surfacing the split halves (spec.md §3, scenario 3 in spec.md §8).
    #[test]
    fn combine_socket_join_resolves_to_combined_morpheme() {
        let mut forms = FormStore::new();
        let mut morphemes = MorphemeStore::new();

        // canonical combined morpheme 덥/VA lives at index 0.
        let combined_raw = MorphemeRaw::new(PosTag::Va, CondVowel::None, CondPolarity::None, false, 0);
        let combined_id = morphemes.push(bake_morph(&combined_raw, 0));

        // 더/V: pending left fragment, combine_socket=1, combined points
        // back to the canonical morpheme above (self-relative offset 0
        // from this morpheme's own index since `combined` stores an
        // absolute offset resolved at bake time).
        let mut left_raw = MorphemeRaw::new(PosTag::V, CondVowel::None, CondPolarity::None, false, 1);
        left_raw.combined = combined_id.0 as i32 - 1; // self_index will be 1
        let left_id = morphemes.push(bake_morph(&left_raw, 1));
        assert_eq!(morphemes.get(left_id).combined, combined_id);

        // ㅂ/V: the matching right partner, same socket.
        let right_raw = MorphemeRaw::new(PosTag::V, CondVowel::None, CondPolarity::None, false, 1);
        let right_id = morphemes.push(bake_morph(&right_raw, 2));

        let mut left_form = FormRaw::new(vec![10]);
        left_form.candidates.push(left_id);
        let left_form_id = forms.push(bake_form(&left_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        let mut right_form = FormRaw::new(vec![20]);
        right_form.candidates.push(right_id);
        let right_form_id = forms.push(bake_form(&right_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        let bos = NodeId(2);
        let eos = NodeId(3);
        let nodes = vec![
            GraphNode { start: 0, end: 1, form: Some(left_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 1, end: 2, form: Some(right_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 2, end: 2, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![NodeId(1)], vec![eos], vec![NodeId(0)], vec![]];
        let lattice = Lattice { nodes, edges, len: 2 };

        let mut b = LangModelBuilder {
            order: 2,
            vocab_size: 2,
            unk_id: 0,
            bos_id: 0,
            eos_id: 1,
            quant: None,
            ..Default::default()
        };
        b.nodes.push((0, 0, 0, -1.0, 0.0));
        let lm = b.build();

        let rules = ScoreRules::default();
        let results = find_best_paths(&lattice, &lm, &forms, &morphemes, 1, -50.0, &rules, &[], SpecialState::default());
        assert_eq!(results.len(), 1);
        // exactly one emitted token, spanning both nodes, resolved to the
        // canonical combined morpheme — not two split tokens.
        assert_eq!(results[0].morphs.len(), 1);
        assert_eq!(results[0].morphs[0], Some(combined_id));
        assert_eq!(results[0].spans[0], (0, 2));
    }

    /// A pending fragment that never meets its partner before EOS must
    /// not leak through as a completed path (spec.md §3 invariant).
    #[test]
    fn unmatched_pending_fragment_yields_no_path_through_that_branch() {
        let mut forms = FormStore::new();
        let mut morphemes = MorphemeStore::new();

        let left_raw = MorphemeRaw::new(PosTag::V, CondVowel::None, CondPolarity::None, false, 1);
        let left_id = morphemes.push(bake_morph(&left_raw, 0));

        let mut left_form = FormRaw::new(vec![10]);
        left_form.candidates.push(left_id);
        let left_form_id = forms.push(bake_form(&left_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        let bos = NodeId(1);
        let eos = NodeId(2);
        let nodes = vec![
            GraphNode { start: 0, end: 1, form: Some(left_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 1, end: 1, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![eos], vec![NodeId(0)], vec![]];
        let lattice = Lattice { nodes, edges, len: 1 };

        let mut b = LangModelBuilder {
            order: 2,
            vocab_size: 2,
            unk_id: 0,
            bos_id: 0,
            eos_id: 1,
            quant: None,
            ..Default::default()
        };
        b.nodes.push((0, 0, 0, -1.0, 0.0));
        let lm = b.build();

        let rules = ScoreRules::default();
        let results = find_best_paths(&lattice, &lm, &forms, &morphemes, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());
        assert!(results.is_empty());
    }

    /// A morpheme requiring a vowel-final left context must normally reject
    /// a consonant-final predecessor, but spec.md §4.4 says that check is
    /// waived entirely when the predecessor is closing punctuation.
    #[test]
    fn closing_punctuation_predecessor_waives_vowel_condition() {
        let mut forms = FormStore::new();
        let mut morphemes = MorphemeStore::new();

        // Sf (closing punctuation) form ending in a consonant jamo (not a vowel).
        let sf_raw = MorphemeRaw::new(PosTag::Sf, CondVowel::None, CondPolarity::None, false, 0);
        let sf_id = morphemes.push(bake_morph(&sf_raw, 0));
        let mut sf_form = FormRaw::new(vec![0x1100]); // lone onset consonant, not a vowel
        sf_form.candidates.push(sf_id);
        let sf_form_id = forms.push(bake_form(&sf_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        // second morpheme requires a vowel-final predecessor.
        let ec_raw = MorphemeRaw::new(PosTag::Ec, CondVowel::Vowel, CondPolarity::None, false, 0);
        let ec_id = morphemes.push(bake_morph(&ec_raw, 1));
        let mut ec_form = FormRaw::new(vec![0x1161]);
        ec_form.candidates.push(ec_id);
        let ec_form_id = forms.push(bake_form(&ec_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        let bos = NodeId(2);
        let eos = NodeId(3);
        let nodes = vec![
            GraphNode { start: 0, end: 1, form: Some(sf_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 1, end: 2, form: Some(ec_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 2, end: 2, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![NodeId(1)], vec![eos], vec![NodeId(0)], vec![]];
        let lattice = Lattice { nodes, edges, len: 2 };

        let mut b = LangModelBuilder {
            order: 2,
            vocab_size: 2,
            unk_id: 0,
            bos_id: 0,
            eos_id: 1,
            quant: None,
            ..Default::default()
        };
        b.nodes.push((0, 0, 0, -1.0, 0.0));
        let lm = b.build();

        let rules = ScoreRules::default();
        let results = find_best_paths(&lattice, &lm, &forms, &morphemes, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].morphs, vec![Some(sf_id), Some(ec_id)]);
    }

    /// Rule 1: a vowel-initial ending landing directly on a just-resolved
    /// combine-socket join (e.g. 되+어 after the 돼 join already absorbed
    /// the contraction) must score lower than an otherwise-identical path
    /// whose next morpheme is consonant-initial.
    #[test]
    fn irregular_vowel_ending_after_combine_join_is_penalized() {
        fn build(ending_jamo: Vec<JamoChar>) -> (Lattice, LangModel, FormStore, MorphemeStore) {
            let mut forms = FormStore::new();
            let mut morphemes = MorphemeStore::new();

            let combined_raw = MorphemeRaw::new(PosTag::Vv, CondVowel::None, CondPolarity::None, false, 0);
            let combined_id = morphemes.push(bake_morph(&combined_raw, 0));

            let mut left_raw = MorphemeRaw::new(PosTag::V, CondVowel::None, CondPolarity::None, false, 1);
            left_raw.combined = combined_id.0 as i32 - 1;
            let left_id = morphemes.push(bake_morph(&left_raw, 1));

            let right_raw = MorphemeRaw::new(PosTag::V, CondVowel::None, CondPolarity::None, false, 1);
            let right_id = morphemes.push(bake_morph(&right_raw, 2));

            let ending_raw = MorphemeRaw::new(PosTag::Ec, CondVowel::None, CondPolarity::None, false, 0);
            let ending_id = morphemes.push(bake_morph(&ending_raw, 3));

            let mut left_form = FormRaw::new(vec![10]);
            left_form.candidates.push(left_id);
            let left_form_id = forms.push(bake_form(&left_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let mut right_form = FormRaw::new(vec![20]);
            right_form.candidates.push(right_id);
            let right_form_id = forms.push(bake_form(&right_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let mut ending_form = FormRaw::new(ending_jamo);
            ending_form.candidates.push(ending_id);
            let ending_form_id = forms.push(bake_form(&ending_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let bos = NodeId(3);
            let eos = NodeId(4);
            let nodes = vec![
                GraphNode { start: 0, end: 1, form: Some(left_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 1, end: 2, form: Some(right_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 2, end: 3, form: Some(ending_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 3, end: 3, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            ];
            let edges = vec![vec![NodeId(1)], vec![NodeId(2)], vec![eos], vec![NodeId(0)], vec![]];
            let lattice = Lattice { nodes, edges, len: 3 };

            let mut b = LangModelBuilder {
                order: 2,
                vocab_size: 2,
                unk_id: 0,
                bos_id: 0,
                eos_id: 1,
                quant: None,
                ..Default::default()
            };
            b.nodes.push((0, 0, 0, -1.0, 0.0));
            let lm = b.build();

            (lattice, lm, forms, morphemes)
        }

        let rules = ScoreRules::default();
        // `ㅇㅏ` (vowel onset, V_BASE offset 0) triggers rule 1; an onset
        // consonant jamo does not.
        let (vowel_lattice, lm1, forms1, morphemes1) = build(vec![0x1161]);
        let vowel_results = find_best_paths(&vowel_lattice, &lm1, &forms1, &morphemes1, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());
        let (cons_lattice, lm2, forms2, morphemes2) = build(vec![0x1102]);
        let cons_results = find_best_paths(&cons_lattice, &lm2, &forms2, &morphemes2, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());

        assert_eq!(vowel_results.len(), 1);
        assert_eq!(cons_results.len(), 1);
        assert!(vowel_results[0].score < cons_results[0].score);
    }

    /// Rule 2: subject-marker 가 directly after 저 should score lower than
    /// the same marker after an unrelated noun.
    #[test]
    fn subject_marker_after_pronoun_is_penalized() {
        fn build(first_jamo: Vec<JamoChar>, first_tag: PosTag) -> (Lattice, LangModel, FormStore, MorphemeStore) {
            let mut forms = FormStore::new();
            let mut morphemes = MorphemeStore::new();

            let first_raw = MorphemeRaw::new(first_tag, CondVowel::None, CondPolarity::None, false, 0);
            let first_id = morphemes.push(bake_morph(&first_raw, 0));
            let ga_raw = MorphemeRaw::new(PosTag::Jks, CondVowel::None, CondPolarity::None, false, 0);
            let ga_id = morphemes.push(bake_morph(&ga_raw, 1));

            let mut first_form = FormRaw::new(first_jamo);
            first_form.candidates.push(first_id);
            let first_form_id = forms.push(bake_form(&first_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let ga_jamo = crate::jamo::normalize("가", false).jamo;
            let mut ga_form = FormRaw::new(ga_jamo);
            ga_form.candidates.push(ga_id);
            let ga_form_id = forms.push(bake_form(&ga_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

            let bos = NodeId(2);
            let eos = NodeId(3);
            let nodes = vec![
                GraphNode { start: 0, end: 1, form: Some(first_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 1, end: 2, form: Some(ga_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
                GraphNode { start: 2, end: 2, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            ];
            let edges = vec![vec![NodeId(1)], vec![eos], vec![NodeId(0)], vec![]];
            let lattice = Lattice { nodes, edges, len: 2 };

            let mut b = LangModelBuilder {
                order: 2,
                vocab_size: 2,
                unk_id: 0,
                bos_id: 0,
                eos_id: 1,
                quant: None,
                ..Default::default()
            };
            b.nodes.push((0, 0, 0, -1.0, 0.0));
            let lm = b.build();

            (lattice, lm, forms, morphemes)
        }

        let rules = ScoreRules::default();
        let jeo_jamo = crate::jamo::normalize("저", false).jamo;
        let (pronoun_lattice, lm1, forms1, morphemes1) = build(jeo_jamo, PosTag::Np);
        let pronoun_results = find_best_paths(&pronoun_lattice, &lm1, &forms1, &morphemes1, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());
        let (noun_lattice, lm2, forms2, morphemes2) = build(vec![0x1100, 0x1161], PosTag::Nng);
        let noun_results = find_best_paths(&noun_lattice, &lm2, &forms2, &morphemes2, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());

        assert_eq!(pronoun_results.len(), 1);
        assert_eq!(noun_results.len(), 1);
        assert!(pronoun_results[0].score < noun_results[0].score);
    }

    /// spec.md §4.7's per-node retry: a vowel-condition violation that
    /// would otherwise leave a node completely empty must still produce a
    /// path, just at a score penalty, rather than silently vanishing.
    #[test]
    fn retry_pass_recovers_condition_violation_as_soft_penalty() {
        let mut forms = FormStore::new();
        let mut morphemes = MorphemeStore::new();

        // predecessor ends in a consonant (not a vowel).
        let noun_raw = MorphemeRaw::new(PosTag::Nng, CondVowel::None, CondPolarity::None, false, 0);
        let noun_id = morphemes.push(bake_morph(&noun_raw, 0));
        let mut noun_form = FormRaw::new(vec![0x1102]); // lone consonant ㄴ
        noun_form.candidates.push(noun_id);
        let noun_form_id = forms.push(bake_form(&noun_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        // only candidate requires a vowel-final predecessor — with no
        // alternative route, this node would otherwise end up empty.
        let ec_raw = MorphemeRaw::new(PosTag::Ec, CondVowel::Vowel, CondPolarity::None, false, 0);
        let ec_id = morphemes.push(bake_morph(&ec_raw, 1));
        let mut ec_form = FormRaw::new(vec![0x1161]);
        ec_form.candidates.push(ec_id);
        let ec_form_id = forms.push(bake_form(&ec_form, 0, CondVowel::None, CondPolarity::None, false, false, Dialect::Standard, &[]));

        let bos = NodeId(2);
        let eos = NodeId(3);
        let nodes = vec![
            GraphNode { start: 0, end: 1, form: Some(noun_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 1, end: 2, form: Some(ec_form_id), typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 0, end: 0, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
            GraphNode { start: 2, end: 2, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None },
        ];
        let edges = vec![vec![NodeId(1)], vec![eos], vec![NodeId(0)], vec![]];
        let lattice = Lattice { nodes, edges, len: 2 };

        let mut b = LangModelBuilder {
            order: 2,
            vocab_size: 2,
            unk_id: 0,
            bos_id: 0,
            eos_id: 1,
            quant: None,
            ..Default::default()
        };
        b.nodes.push((0, 0, 0, -1.0, 0.0));
        let lm = b.build();

        let rules = ScoreRules::default();
        let results = find_best_paths(&lattice, &lm, &forms, &morphemes, 1, f32::NEG_INFINITY, &rules, &[], SpecialState::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].morphs, vec![Some(noun_id), Some(ec_id)]);
        // the condition-violation penalty must actually have applied.
        assert!(results[0].score <= rules.condition_violation_penalty + 0.5);
    }
}
