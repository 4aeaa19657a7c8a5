//! C9: Result assembler — walks a [`crate::path::PathResult`] back into a
//! flat [`TokenInfo`] list, spreads typo cost, and splits tokens into
//! sentences (spec.md §4.8).
//!
//! `SentenceParser` is grounded directly on `original_source/src/Kiwi.cpp`'s
//! `SentenceParser` state machine (ending-tag -> optional `요` particle ->
//! trailing closing-punctuation run -> sentence break), adapted to this
//! crate's `PosTag` set (which folds the original's `z_coda`/`ssc`/`sso`
//! tags into the lattice builder's `Match::Z_CODA` handling rather than
//! carrying them as distinct POS tags).

use crate::form::FormStore;
use crate::jamo::Normalized;
use crate::morpheme::{MorphId, MorphemeStore};
use crate::path::PathResult;
use crate::types::{Match, PosTag, TokenInfo, TokenResult};

/// Converts one searched path into caller-facing tokens, mapping jamo
/// positions back to original-text character offsets via `normalized`'s
/// position map, and spreading each node's typo cost evenly across the
/// chunks it covers (spec.md §4.8 item 3).
///
/// A chunked, non-complex, non-saisiot morpheme (spec.md §4.8 item 2 —
/// e.g. `돼` -> chunks `되/VV` + `어/EC`) is expanded into one
/// `TokenInfo` per chunk rather than a single token for the whole
/// composite; `Morpheme::is_single` draws that line, unless
/// `Match::SPLIT_COMPLEX` overrides it (spec.md §4.8 item 2's match-flag
/// clause).
///
/// `match_options` also drives spec.md §4.8 items 5 and 6:
/// affix-into-host merging (`JOIN_NOUN_PREFIX`/`JOIN_NOUN_SUFFIX`/
/// `JOIN_VERB_SUFFIX`/`JOIN_ADJ_SUFFIX`) and allomorph canonicalization
/// (`integrate_allomorph`).
pub fn assemble(
    path: &PathResult,
    forms: &FormStore,
    morphemes: &MorphemeStore,
    normalized: &Normalized,
    match_options: Match,
    integrate_allomorph: bool,
) -> TokenResult {
    let mut tokens = Vec::with_capacity(path.morphs.len());
    let mut word_position: u16 = 0;
    let mut last_word_start: Option<u32> = None;

    for ((((&morph_opt, &(jamo_start, jamo_end)), &typo_cost_share), &first_chunk_score), &class_tag) in path
        .morphs
        .iter()
        .zip(path.spans.iter())
        .zip(path.typo_costs.iter())
        .zip(path.first_chunk_scores.iter())
        .zip(path.class_tags.iter())
    {
        let char_start = jamo_to_char(normalized, jamo_start);

        if last_word_start != Some(char_start) && is_new_word_boundary(&tokens, char_start) {
            word_position += 1;
        }
        last_word_start = Some(char_start);

        match morph_opt {
            None => {
                let char_end = jamo_to_char(normalized, jamo_end);
                let length = (char_end.saturating_sub(char_start)).max(1) as u16;
                let jamo_slice = normalized.jamo.get(jamo_start as usize..jamo_end as usize).unwrap_or(&[]);
                tokens.push(TokenInfo {
                    form: decode_form_to_string(jamo_slice),
                    tag: class_tag.unwrap_or(PosTag::Unknown),
                    position: char_start,
                    length,
                    word_position,
                    sent_position: 0,
                    sub_sent_position: 0,
                    word_score: path.score / path.morphs.len().max(1) as f32,
                    typo_cost: typo_cost_share,
                    paired_token: None,
                });
            }
            Some(morph_id) => {
                push_morpheme_tokens(
                    &mut tokens,
                    morph_id,
                    jamo_start,
                    jamo_end,
                    forms,
                    morphemes,
                    normalized,
                    path,
                    word_position,
                    typo_cost_share,
                    first_chunk_score,
                    match_options,
                );
            }
        }
    }

    if integrate_allomorph {
        canonicalize_allomorphs(&mut tokens);
    }
    let mut tokens = apply_affix_joins(tokens, match_options);
    pair_quotes_and_brackets(&mut tokens);
    assign_sentences(&mut tokens);

    TokenResult { tokens, score: path.score }
}

/// spec.md §4.8 item 6: with allomorph integration enabled, a tag-conditioned
/// ending allomorph is rewritten to its canonical surface so the returned
/// `(form, tag)` pair no longer distinguishes `아`/`여` from `어` (the
/// "Allomorph stability" property, spec.md §8). Left disabled, the surface
/// that the lattice/Viterbi search actually matched is kept verbatim — which
/// is already polarity-correct, since each allomorph is a separate dictionary
/// entry gated by `CondPolarity` (spec.md §4.8 item 6's "if disabled" clause).
fn canonicalize_allomorphs(tokens: &mut [TokenInfo]) {
    for token in tokens.iter_mut() {
        if token.tag == PosTag::Ec && matches!(token.form.as_str(), "아" | "여") {
            token.form = "어".to_string();
        }
    }
}

fn is_noun_like(tag: PosTag) -> bool {
    matches!(tag, PosTag::Nng | PosTag::Nnp | PosTag::Nnb | PosTag::Nr | PosTag::Np)
}

/// spec.md §4.8 item 5: merges an affix token into its adjacent host when
/// the matching `Match::JOIN_*` flag is set and the two tokens are
/// character-adjacent (no intervening gap). `N + Z_SIOT + N -> N` is not
/// covered here: this crate has no standalone Z_SIOT `PosTag` (z-siot is a
/// lattice shortcut that clones its predecessor cell rather than emitting
/// its own token, see `src/lattice.rs`), so there is no middle token to
/// match against.
fn apply_affix_joins(tokens: Vec<TokenInfo>, match_options: Match) -> Vec<TokenInfo> {
    let any_join = match_options.contains(Match::JOIN_NOUN_PREFIX)
        || match_options.contains(Match::JOIN_NOUN_SUFFIX)
        || match_options.contains(Match::JOIN_VERB_SUFFIX)
        || match_options.contains(Match::JOIN_ADJ_SUFFIX);
    if !any_join || tokens.len() < 2 {
        return tokens;
    }

    let mut out: Vec<TokenInfo> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len() {
            let left = &tokens[i];
            let right = &tokens[i + 1];
            let adjacent = left.position + left.length as u32 == right.position;
            let merged_tag = if adjacent && match_options.contains(Match::JOIN_NOUN_PREFIX) && left.tag == PosTag::Xpn && is_noun_like(right.tag) {
                Some(right.tag)
            } else if adjacent && match_options.contains(Match::JOIN_NOUN_SUFFIX) && is_noun_like(left.tag) && right.tag == PosTag::Xsn {
                Some(left.tag)
            } else if adjacent && match_options.contains(Match::JOIN_VERB_SUFFIX) && is_noun_like(left.tag) && right.tag == PosTag::Xsv {
                Some(PosTag::Vv)
            } else if adjacent && match_options.contains(Match::JOIN_ADJ_SUFFIX) && is_noun_like(left.tag) && right.tag == PosTag::Xsa {
                Some(PosTag::Va)
            } else {
                None
            };
            if let Some(tag) = merged_tag {
                out.push(TokenInfo {
                    form: format!("{}{}", left.form, right.form),
                    tag,
                    position: left.position,
                    length: left.length + right.length,
                    word_position: left.word_position,
                    sent_position: left.sent_position,
                    sub_sent_position: left.sub_sent_position,
                    word_score: left.word_score + right.word_score,
                    typo_cost: left.typo_cost + right.typo_cost,
                    paired_token: None,
                });
                i += 2;
                continue;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn push_morpheme_tokens(
    tokens: &mut Vec<TokenInfo>,
    morph_id: MorphId,
    jamo_start: u32,
    jamo_end: u32,
    forms: &FormStore,
    morphemes: &MorphemeStore,
    normalized: &Normalized,
    path: &PathResult,
    word_position: u16,
    typo_cost_share: f32,
    first_chunk_score: f32,
    match_options: Match,
) {
    let morph = morphemes.get(morph_id);

    // spec.md §4.8 item 2: `SPLIT_COMPLEX` forces a per-chunk split even for
    // a complex/saisiot morpheme that `Morpheme::is_single` would otherwise
    // keep merged into one token.
    let force_split = match_options.contains(Match::SPLIT_COMPLEX) && !morph.chunks.is_empty();
    if morph.is_single() && !force_split {
        let form = forms.get(morph.kform);
        let char_start = jamo_to_char(normalized, jamo_start);
        let char_end = jamo_to_char(normalized, jamo_end);
        let length = (char_end.saturating_sub(char_start)).max(1) as u16;
        tokens.push(TokenInfo {
            form: decode_form_to_string(&form.form),
            tag: morph.tag,
            position: char_start,
            length,
            word_position,
            sent_position: 0,
            sub_sent_position: 0,
            word_score: first_chunk_score,
            typo_cost: typo_cost_share,
            paired_token: None,
        });
        return;
    }

    // Composite morpheme: one token per chunk, each chunk's span given
    // relative to the parent form's own jamo sequence and offset by this
    // cell's jamo-char start. The first chunk carries `first_chunk_score`
    // verbatim; the remaining chunks split what is left of the word's own
    // fair share of the path score evenly (spec.md §4.8 item 3).
    let per_token_score = path.score / path.morphs.len().max(1) as f32;
    let chunk_count = morph.chunks.len().max(1);
    let remaining_chunks = chunk_count.saturating_sub(1).max(1);
    let remaining_share = (per_token_score - first_chunk_score) / remaining_chunks as f32;
    for (i, chunk) in morph.chunks.iter().enumerate() {
        let chunk_morph = morphemes.get(chunk.morph);
        let chunk_form = forms.get(chunk_morph.kform);
        let abs_start = jamo_start + chunk.span.start as u32;
        let abs_end = jamo_start + chunk.span.end as u32;
        let char_start = jamo_to_char(normalized, abs_start);
        let char_end = jamo_to_char(normalized, abs_end.min(jamo_end));
        let length = (char_end.saturating_sub(char_start)).max(1) as u16;
        let word_score = if i == 0 { first_chunk_score } else { remaining_share };
        tokens.push(TokenInfo {
            form: decode_form_to_string(&chunk_form.form),
            tag: chunk_morph.tag,
            position: char_start,
            length,
            word_position,
            sent_position: 0,
            sub_sent_position: 0,
            word_score,
            typo_cost: typo_cost_share / chunk_count as f32,
            paired_token: None,
        });
    }
}

fn jamo_to_char(normalized: &Normalized, jamo_pos: u32) -> u32 {
    if (jamo_pos as usize) < normalized.position_map.len() {
        normalized.position_map[jamo_pos as usize]
    } else {
        normalized.position_map.last().copied().unwrap_or(0) + 1
    }
}

fn is_new_word_boundary(tokens: &[TokenInfo], char_start: u32) -> bool {
    match tokens.last() {
        Some(prev) => prev.position + prev.length as u32 != char_start,
        None => false,
    }
}

/// Recomposes a form's jamo sequence back into its precomposed Hangul
/// surface string (spec.md §4.8's surface emission step).
fn decode_form_to_string(jamo: &[crate::jamo::JamoChar]) -> String {
    crate::jamo::recompose(jamo)
}

/// Marks matching quote/bracket token pairs via `paired_token` so callers
/// can reconstruct nested quoting without re-scanning (spec.md §4.8 item
/// 6). A simple stack handles the non-overlapping case; unmatched opens
/// or closes are left unpaired rather than guessed at.
fn pair_quotes_and_brackets(tokens: &mut [TokenInfo]) {
    let mut stack: Vec<usize> = Vec::new();
    for i in 0..tokens.len() {
        if tokens[i].tag == PosTag::Ss {
            if let Some(open_idx) = stack.pop() {
                let open_idx_u32 = open_idx as u32;
                let close_idx_u32 = i as u32;
                tokens[open_idx].paired_token = Some(close_idx_u32);
                tokens[i].paired_token = Some(open_idx_u32);
            } else {
                stack.push(i);
            }
        }
    }
}

/// Per-token `SentenceParser` state, threaded across the whole token
/// sequence (spec.md's "종결어미 (요)? (닫는 괄호)*" rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SentenceState {
    None,
    Ending,
    EndingYo,
    FinalPunct,
}

fn assign_sentences(tokens: &mut [TokenInfo]) {
    let mut state = SentenceState::None;
    let mut sent_pos: u32 = 0;
    let mut break_before: Vec<bool> = vec![false; tokens.len()];

    for i in 0..tokens.len() {
        let tag = tokens[i].tag;
        let mut broke = false;
        match state {
            SentenceState::None => {
                if tag == PosTag::Ef {
                    state = SentenceState::Ending;
                } else if tag == PosTag::Sf {
                    state = SentenceState::FinalPunct;
                }
            }
            SentenceState::Ending | SentenceState::EndingYo => {
                if tag == PosTag::Vx {
                    state = SentenceState::None;
                } else if tag.is_closing_punctuation() {
                    state = SentenceState::FinalPunct;
                } else if is_yo_particle(tag) {
                    state = SentenceState::EndingYo;
                } else if is_ending_continuation(tag) {
                    state = SentenceState::None;
                } else {
                    broke = true;
                    state = SentenceState::None;
                }
            }
            SentenceState::FinalPunct => {
                if !tag.is_closing_punctuation() {
                    broke = true;
                    state = if tag == PosTag::Ef {
                        SentenceState::Ending
                    } else if tag == PosTag::Sf {
                        SentenceState::FinalPunct
                    } else {
                        SentenceState::None
                    };
                }
            }
        }
        if broke {
            break_before[i] = true;
        }
    }

    for i in 0..tokens.len() {
        if break_before[i] {
            sent_pos += 1;
        }
        tokens[i].sent_position = sent_pos;
        tokens[i].sub_sent_position = 0;
    }
}

fn is_yo_particle(tag: PosTag) -> bool {
    matches!(tag, PosTag::Jx)
}

fn is_ending_continuation(tag: PosTag) -> bool {
    matches!(tag, PosTag::Jc | PosTag::Jkb | PosTag::Jkc | PosTag::Jkg | PosTag::Jko | PosTag::Jkq | PosTag::Jks | PosTag::Jkv | PosTag::Vcp | PosTag::Etm | PosTag::Ec)
}
