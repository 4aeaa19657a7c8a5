//! C6: Lattice builder — scans a jamo-normalized sentence through the
//! frozen trie to build a DAG of candidate forms (spec.md §4.5).
//!
//! Grounded on `original_source/src/KTrie.h`'s `KGraphNode` (`uform`,
//! `form`, `startPos`/`endPos`, `typoCost`, `spaceErrors`) and
//! `splitByTrie`'s trie-driven scan, and on the teacher's `src/ugm.rs`
//! `encode_segment` forward-DP-array idiom (here generalized from a
//! single best-path array into a full node DAG, since spec.md wants
//! top-N search downstream rather than greedy single-best segmentation).
//! Per the REDESIGN FLAGS, the original's self-relative `prev`/`sibling`
//! pointer pairs become an explicit adjacency list keyed by [`NodeId`].
//!
//! The character-ending scan now drives `FrozenTrie` as a true
//! Aho-Corasick multi-pattern matcher (spec.md §4.5, DESIGN.md): one pass
//! over the jamo buffer via `find_fail`, walking each position's fail
//! chain to collect every dictionary match ending there, recovering each
//! match's start from `depth` rather than restarting a fresh root scan at
//! every character position.

use crate::form::FormStore;
use crate::jamo::{is_z_coda_candidate, JamoChar, Normalized};
use crate::morpheme::FormId;
use crate::trie::FrozenTrie;
use crate::types::{Match, PosTag};

/// Index into a [`Lattice`]'s flat node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// One DAG node: a candidate form (dictionary hit or unknown fallback)
/// spanning `[start, end)` in jamo-char positions.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub start: u32,
    pub end: u32,
    /// Dictionary form, or `None` for an unknown-form/class-tagged node
    /// (its jamo slice is recovered from the lattice's source buffer by
    /// `[start,end)`).
    pub form: Option<FormId>,
    pub typo_cost: f32,
    pub space_errors: u32,
    /// Set on a typo-variant node (spec.md §4.5): the dictionary form this
    /// span matches only after applying a typo-transform substitution.
    /// The path evaluator treats a node with `typo_form_id` but no `form`
    /// exactly like a dictionary node, keyed on this id instead.
    pub typo_form_id: Option<FormId>,
    /// Set on a character-class-coalesced special node (digit/Latin/Han/
    /// punctuation runs, and web-entity spans) that has no backing
    /// dictionary `Form` — spec.md §3's tag-class sentinels, represented
    /// here directly as a tag rather than as reserved `FormId` indices
    /// (DESIGN.md Open Question: full sentinel-form integration).
    pub class_tag: Option<PosTag>,
}

impl GraphNode {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }
}

/// A sentence's full candidate DAG plus its forward adjacency.
#[derive(Debug, Clone, Default)]
pub struct Lattice {
    pub nodes: Vec<GraphNode>,
    /// `edges[i]` lists the nodes that begin exactly where node `i` ends —
    /// the DAG's forward adjacency, used by the path evaluator's Viterbi
    /// sweep (spec.md §4.7).
    pub edges: Vec<Vec<NodeId>>,
    pub len: u32,
}

impl Lattice {
    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0 as usize]
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        &self.edges[id.0 as usize]
    }
}

/// Penalty applied to an unknown-form node, analogous to the teacher's
/// `unknown_token_score` in `src/ugm.rs` (there: `min_score - 10.0`).
const UNKNOWN_FORM_PENALTY: f32 = -10.0;

/// Additional penalty folded into an unknown node's `typo_cost` when its
/// first jamo looks like an (BMP-range) emoji glyph (spec.md §4.5).
const EMOJI_PENALTY: f32 = -10.0;

/// Upper bound on how many jamo chars an unknown-form node may span
/// before it is forced to end, preventing pathological all-unknown runs
/// from producing a single giant low-confidence node (`maxUnkFormSize` in
/// the original `splitByTrie`).
const DEFAULT_MAX_UNKNOWN_FORM_SIZE: u32 = 6;

/// Cost charged per substituted jamo in a typo-variant match (spec.md
/// §4.5's `typo-cost` > 0 requirement); scaled by `ScoreRules::typo_cost_weight`
/// downstream exactly like any other node's `typo_cost`.
const TYPO_SUBSTITUTION_COST: f32 = 1.0;

/// Small table of commonly confused jamo pairs a typo-tolerant match may
/// substitute one-for-the-other (vowel and fortis/lenis consonant
/// confusions that account for most real-world Hangul typos). Grounded on
/// spec.md §4.5's "if a typo-transform table is present" — this crate
/// ships a fixed table rather than a loadable one (DESIGN.md).
fn typo_transform_table() -> &'static [(JamoChar, JamoChar)] {
    const V_BASE: u32 = 0x1161;
    static TABLE: std::sync::OnceLock<Vec<(JamoChar, JamoChar)>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            // ㅐ/ㅔ (offsets 1 and 5) — the single most common Korean typo.
            ((V_BASE + 1) as JamoChar, (V_BASE + 5) as JamoChar),
            // ㅙ/ㅞ (offsets 10 and 15).
            ((V_BASE + 10) as JamoChar, (V_BASE + 15) as JamoChar),
            // ㅒ/ㅖ (offsets 6 and 16).
            ((V_BASE + 6) as JamoChar, (V_BASE + 16) as JamoChar),
        ]
    })
}

fn typo_substitutes(c: JamoChar) -> impl Iterator<Item = JamoChar> {
    typo_transform_table().iter().filter_map(move |&(a, b)| if a == c { Some(b) } else if b == c { Some(a) } else { None })
}

/// Builds the candidate DAG for one normalized sentence.
///
/// `pretokenized` lists caller-supplied `[start, end)` jamo-char spans
/// (spec.md §4.5 pretokenized spans) that must appear as single nodes,
/// taking precedence over trie-discovered matches that would otherwise
/// cross them. `space_tolerance` bounds how many whitespace chars a
/// single dictionary match may skip over (spec.md §4.5's space-tolerant
/// skip).
pub fn build_lattice(
    normalized: &Normalized,
    trie: &FrozenTrie,
    forms: &FormStore,
    match_options: Match,
    pretokenized: &[(u32, u32, FormId)],
) -> Lattice {
    build_lattice_with_tolerance(normalized, trie, forms, match_options, pretokenized, 0)
}

#[allow(clippy::too_many_arguments)]
pub fn build_lattice_with_tolerance(
    normalized: &Normalized,
    trie: &FrozenTrie,
    forms: &FormStore,
    match_options: Match,
    pretokenized: &[(u32, u32, FormId)],
    space_tolerance: u32,
) -> Lattice {
    let n = normalized.len() as u32;
    let mut nodes = Vec::new();
    let jamo = &normalized.jamo;

    for &(start, end, form_id) in pretokenized {
        nodes.push(plain_node(start, end, Some(form_id)));
    }
    let mut blocked: Vec<(u32, u32)> = pretokenized.iter().map(|&(s, e, _)| (s, e)).collect();

    if match_options.0 & (Match::URL.0 | Match::EMAIL.0 | Match::HASHTAG.0 | Match::MENTION.0) != 0 {
        scan_web_entities(jamo, match_options, &mut nodes, &mut blocked);
    }

    // Aho-Corasick single pass: walk the whole buffer once via `find_fail`,
    // and at every position collect every dictionary match ending there by
    // walking the fail chain (spec.md §4.5, DESIGN.md — replaces a
    // per-start restart scan with real multi-pattern matching).
    let mut covered_start: Vec<bool> = vec![false; n as usize];
    let mut cur = trie.root();
    for pos in 0..n {
        cur = trie.find_fail(cur, jamo[pos as usize]);
        let mut node = cur;
        loop {
            if let Some(val) = trie.value(node) {
                let depth = trie.depth(node);
                let end = pos + 1;
                let start = end - depth;
                if !crosses_blocked_span(start, end, &blocked) {
                    nodes.push(plain_node(start, end, Some(FormId(val))));
                    covered_start[start as usize] = true;
                }
            }
            if node == trie.root() {
                break;
            }
            node = trie.fail(node);
        }
    }

    if space_tolerance > 0 {
        scan_space_tolerant(jamo, trie, &covered_start, &blocked, space_tolerance, &mut nodes);
    }

    // A typo-transform table is always present in this crate (a fixed
    // confusion set rather than a loadable one, DESIGN.md), so typo
    // variants are generated unconditionally, same as the primary scan.
    emit_typo_variants(jamo, trie, &covered_start, &blocked, &mut nodes);

    let compatible_jamo = match_options.contains(Match::COMPATIBLE_JAMO);
    scan_uncovered_spans(jamo, &covered_start, &blocked, match_options, compatible_jamo, &mut nodes);

    if match_options.contains(Match::Z_CODA) {
        for start in 1..n {
            let is_candidate = char::from_u32(jamo[start as usize] as u32).map(is_z_coda_candidate).unwrap_or(false);
            if is_candidate {
                nodes.push(plain_node(start, start + 1, None));
            }
        }
    }

    // Sentinel start/end nodes bracket the DAG so the path evaluator has a
    // single root and single sink to search from.
    let bos = NodeId(nodes.len() as u32);
    nodes.push(plain_node(0, 0, None));
    let eos = NodeId(nodes.len() as u32);
    nodes.push(plain_node(n, n, None));

    let mut lattice = Lattice { nodes, edges: Vec::new(), len: n };
    lattice.edges = vec![Vec::new(); lattice.nodes.len()];
    if n == 0 {
        // empty input: no content nodes were ever generated above, so
        // wire BOS directly to EOS rather than leaving EOS unreachable
        // (spec.md §7: empty input must still yield one trivial, empty,
        // zero-score analysis rather than "no path found").
        lattice.edges[bos.0 as usize].push(eos);
        return lattice;
    }
    for i in 0..lattice.nodes.len() {
        let id = NodeId(i as u32);
        if id == bos || id == eos {
            continue;
        }
        let node_end = lattice.nodes[i].end;
        let node_start = lattice.nodes[i].start;
        if node_start == 0 {
            lattice.edges[bos.0 as usize].push(id);
        }
        for (j, other) in lattice.nodes.iter().enumerate() {
            if j == i {
                continue;
            }
            if NodeId(j as u32) == bos || NodeId(j as u32) == eos {
                continue;
            }
            if other.start == node_end {
                lattice.edges[i].push(NodeId(j as u32));
            }
        }
        if node_end == n {
            lattice.edges[i].push(eos);
        }
    }
    prune_unreachable(&mut lattice, bos, eos);
    let _ = forms; // FormStore is consulted by callers resolving FormId -> Form, kept for API symmetry
    lattice
}

fn plain_node(start: u32, end: u32, form: Option<FormId>) -> GraphNode {
    GraphNode { start, end, form, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: None }
}

fn crosses_blocked_span(start: u32, end: u32, blocked: &[(u32, u32)]) -> bool {
    blocked.iter().any(|&(s, e)| start < e && end > s && !(start == s && end == e))
}

fn within_blocked_span(pos: u32, blocked: &[(u32, u32)]) -> bool {
    blocked.iter().any(|&(s, e)| pos >= s && pos < e)
}

/// Character classes the unmatched-span coalescing state machine
/// distinguishes (spec.md §4.5's state table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Hangul,
    Digit,
    Latin,
    Han,
    Punct,
    Space,
    Other,
}

fn classify(c: JamoChar) -> CharClass {
    let Some(ch) = char::from_u32(c as u32) else { return CharClass::Other };
    if ch.is_whitespace() {
        return CharClass::Space;
    }
    if ('\u{1100}'..='\u{11FF}').contains(&ch) || ('\u{AC00}'..='\u{D7A3}').contains(&ch) || ('\u{3130}'..='\u{318F}').contains(&ch) {
        return CharClass::Hangul;
    }
    if ch.is_ascii_digit() {
        return CharClass::Digit;
    }
    if ch.is_ascii_alphabetic() {
        return CharClass::Latin;
    }
    if ('\u{4E00}'..='\u{9FFF}').contains(&ch) {
        return CharClass::Han;
    }
    if ch.is_ascii_punctuation() {
        return CharClass::Punct;
    }
    CharClass::Other
}

fn class_sentinel_tag(class: CharClass) -> Option<PosTag> {
    match class {
        CharClass::Digit => Some(PosTag::Sn),
        CharClass::Latin => Some(PosTag::Sl),
        CharClass::Han => Some(PosTag::Sh),
        CharClass::Punct => Some(PosTag::Sw),
        CharClass::Hangul | CharClass::Space | CharClass::Other => None,
    }
}

/// Looks emoji-like within this crate's BMP-only jamo representation
/// (`JamoChar` is `u16`, so true supplementary-plane emoji never survive
/// normalization — DESIGN.md records this as a pre-existing limitation,
/// not something this pass can fix). Covers the common BMP symbol/dingbat
/// blocks real-world emoji shorthand still uses.
fn looks_emoji(c: JamoChar) -> bool {
    matches!(c as u32, 0x2600..=0x27BF | 0x2190..=0x21FF | 0x2B00..=0x2BFF)
}

/// Coalesces runs of uncovered positions (no dictionary match starts
/// there) by character class, emitting one node per run instead of a
/// fixed-length capped unknown span (spec.md §4.5's state machine).
/// `Match::SERIAL` relaxes the digit/Latin class boundary so an
/// alphanumeric-with-dashes serial code coalesces into one run;
/// `compatible_jamo` additionally trims a Hangul run so it never starts
/// or ends mid-syllable on a bare lone consonant (`Match::COMPATIBLE_JAMO`).
fn scan_uncovered_spans(jamo: &[JamoChar], covered_start: &[bool], blocked: &[(u32, u32)], match_options: Match, compatible_jamo: bool, nodes: &mut Vec<GraphNode>) {
    let n = jamo.len() as u32;
    let serial = match_options.contains(Match::SERIAL);
    let mut start = 0u32;
    while start < n {
        if covered_start[start as usize] || within_blocked_span(start, blocked) {
            start += 1;
            continue;
        }
        let class = classify(jamo[start as usize]);

        if class == CharClass::Space {
            start += 1;
            continue;
        }

        let mut end = start + 1;
        while end < n && !within_blocked_span(end, blocked) {
            let next_class = classify(jamo[end as usize]);
            let same_run = next_class == class || (serial && is_alnum_class(class) && is_alnum_class(next_class));
            if !same_run || end - start >= DEFAULT_MAX_UNKNOWN_FORM_SIZE {
                break;
            }
            end += 1;
        }

        if class == CharClass::Hangul && compatible_jamo {
            while end > start + 1 && !crate::feature::is_correct_end(&jamo[start as usize..end as usize]) {
                end -= 1;
            }
            if !crate::feature::is_correct_start(&jamo[start as usize..end as usize]) && end > start + 1 {
                // A malformed lone-consonant opener: shrink to a single
                // jamo so it still produces *some* node rather than none.
                end = start + 1;
            }
        }

        match class_sentinel_tag(class) {
            Some(tag) => nodes.push(GraphNode { start, end, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: Some(tag) }),
            None => {
                let mut typo_cost = UNKNOWN_FORM_PENALTY;
                if match_options.contains(Match::EMOJI) && looks_emoji(jamo[start as usize]) {
                    typo_cost += EMOJI_PENALTY;
                }
                nodes.push(GraphNode { start, end, form: None, typo_cost, space_errors: 0, typo_form_id: None, class_tag: None });
            }
        }

        start = end;
    }
}

fn is_alnum_class(c: CharClass) -> bool {
    matches!(c, CharClass::Digit | CharClass::Latin)
}

/// Hand-rolled scanners for the `URL`/`EMAIL`/`HASHTAG`/`MENTION` match
/// options (spec.md §4.5's "special separators"/pretokenized policy):
/// no regex crate is available in this stack, so each pattern is matched
/// by a small manual character scan over the (already jamo-normalized,
/// but ASCII-passthrough) buffer.
fn scan_web_entities(jamo: &[JamoChar], match_options: Match, nodes: &mut Vec<GraphNode>, blocked: &mut Vec<(u32, u32)>) {
    let n = jamo.len() as u32;
    let mut pos = 0u32;
    while pos < n {
        if within_blocked_span(pos, blocked) {
            pos += 1;
            continue;
        }
        let c = char::from_u32(jamo[pos as usize] as u32).unwrap_or('\0');

        if match_options.contains(Match::URL) && starts_with_lit(jamo, pos, "http://") || (match_options.contains(Match::URL) && starts_with_lit(jamo, pos, "https://")) {
            let end = scan_non_space_run(jamo, pos);
            push_special(nodes, blocked, pos, end, PosTag::WUrl);
            pos = end;
            continue;
        }
        if match_options.contains(Match::URL) && starts_with_lit(jamo, pos, "www.") {
            let end = scan_non_space_run(jamo, pos);
            push_special(nodes, blocked, pos, end, PosTag::WUrl);
            pos = end;
            continue;
        }
        if match_options.contains(Match::MENTION) && c == '@' && pos + 1 < n && is_word_char(jamo[pos as usize + 1]) {
            let end = scan_word_run(jamo, pos + 1);
            if match_options.contains(Match::EMAIL) && looks_like_email_from(jamo, pos, end) {
                let full_end = scan_non_space_run(jamo, pos);
                push_special(nodes, blocked, pos.saturating_sub(local_part_len(jamo, pos)), full_end, PosTag::WEmail);
                pos = full_end;
                continue;
            }
            push_special(nodes, blocked, pos, end, PosTag::WMention);
            pos = end;
            continue;
        }
        if match_options.contains(Match::HASHTAG) && c == '#' && pos + 1 < n && is_word_char(jamo[pos as usize + 1]) {
            let end = scan_word_run(jamo, pos + 1);
            push_special(nodes, blocked, pos, end, PosTag::WHashtag);
            pos = end;
            continue;
        }
        if match_options.contains(Match::EMAIL) && is_word_char(jamo[pos as usize]) {
            if let Some(end) = try_match_email(jamo, pos) {
                push_special(nodes, blocked, pos, end, PosTag::WEmail);
                pos = end;
                continue;
            }
        }
        pos += 1;
    }
}

fn push_special(nodes: &mut Vec<GraphNode>, blocked: &mut Vec<(u32, u32)>, start: u32, end: u32, tag: PosTag) {
    if end <= start {
        return;
    }
    nodes.push(GraphNode { start, end, form: None, typo_cost: 0.0, space_errors: 0, typo_form_id: None, class_tag: Some(tag) });
    blocked.push((start, end));
}

fn starts_with_lit(jamo: &[JamoChar], pos: u32, lit: &str) -> bool {
    let chars: Vec<char> = lit.chars().collect();
    for (i, &lc) in chars.iter().enumerate() {
        match jamo.get(pos as usize + i).and_then(|&c| char::from_u32(c as u32)) {
            Some(c) if c == lc => {}
            _ => return false,
        }
    }
    true
}

fn is_word_char(c: JamoChar) -> bool {
    char::from_u32(c as u32).map(|ch| ch.is_ascii_alphanumeric() || ch == '_').unwrap_or(false)
}

fn scan_non_space_run(jamo: &[JamoChar], start: u32) -> u32 {
    let n = jamo.len() as u32;
    let mut end = start;
    while end < n && char::from_u32(jamo[end as usize] as u32).map(|c| !c.is_whitespace()).unwrap_or(true) {
        end += 1;
    }
    end
}

fn scan_word_run(jamo: &[JamoChar], start: u32) -> u32 {
    let n = jamo.len() as u32;
    let mut end = start;
    while end < n && is_word_char(jamo[end as usize]) {
        end += 1;
    }
    end
}

fn local_part_len(jamo: &[JamoChar], at_sign: u32) -> u32 {
    let mut len = 0;
    let mut i = at_sign;
    while i > 0 && is_word_char(jamo[i as usize - 1]) {
        i -= 1;
        len += 1;
    }
    len
}

fn looks_like_email_from(jamo: &[JamoChar], at_sign: u32, domain_end: u32) -> bool {
    local_part_len(jamo, at_sign) > 0 && jamo[at_sign as usize..domain_end as usize].iter().any(|&c| c as u32 == '.' as u32)
}

fn try_match_email(jamo: &[JamoChar], start: u32) -> Option<u32> {
    let n = jamo.len() as u32;
    let mut i = start;
    while i < n && is_word_char(jamo[i as usize]) {
        i += 1;
    }
    if i >= n || jamo[i as usize] as u32 != '@' as u32 {
        return None;
    }
    let domain_start = i + 1;
    let domain_end = scan_word_run(jamo, domain_start);
    if domain_end == domain_start || !looks_like_email_from(jamo, i, domain_end) {
        return None;
    }
    Some(domain_end)
}

/// Space-tolerant fallback: for an uncovered, unblocked start immediately
/// before (or spanning) whitespace, retries the trie walk treating up to
/// `space_tolerance` whitespace chars as transparent — skipped from the
/// match but counted into the resulting node's `space_errors` (spec.md
/// §4.5's "dropped ... per-space space-errors counter" policy).
fn scan_space_tolerant(jamo: &[JamoChar], trie: &FrozenTrie, covered_start: &[bool], blocked: &[(u32, u32)], space_tolerance: u32, nodes: &mut Vec<GraphNode>) {
    let n = jamo.len() as u32;
    for start in 0..n {
        if covered_start[start as usize] || within_blocked_span(start, blocked) {
            continue;
        }
        if classify(jamo[start as usize]) == CharClass::Space {
            continue;
        }
        let mut cur = trie.root();
        let mut pos = start;
        let mut skipped = 0u32;
        while pos < n {
            if classify(jamo[pos as usize]) == CharClass::Space {
                if skipped >= space_tolerance {
                    break;
                }
                skipped += 1;
                pos += 1;
                continue;
            }
            match trie.next(cur, jamo[pos as usize]) {
                Some(next) => {
                    cur = next;
                    pos += 1;
                    if skipped > 0 {
                        if let Some(val) = trie.value(cur) {
                            if !crosses_blocked_span(start, pos, blocked) {
                                nodes.push(GraphNode {
                                    start,
                                    end: pos,
                                    form: Some(FormId(val)),
                                    typo_cost: 0.0,
                                    space_errors: skipped,
                                    typo_form_id: None,
                                    class_tag: None,
                                });
                            }
                        }
                    }
                }
                None => break,
            }
        }
    }
}

fn emit_typo_variants(jamo: &[JamoChar], trie: &FrozenTrie, covered_start: &[bool], blocked: &[(u32, u32)], nodes: &mut Vec<GraphNode>) {
    let n = jamo.len() as u32;
    for start in 0..n {
        // A typo variant is worth trying even at an already-covered start:
        // the exact-match candidate and the substituted one simply compete
        // in the path evaluator like any two overlapping nodes would.
        let _ = covered_start;
        if within_blocked_span(start, blocked) {
            continue;
        }
        for alt in typo_substitutes(jamo[start as usize]) {
            let mut cur = match trie.next(trie.root(), alt) {
                Some(c) => c,
                None => continue,
            };
            let mut pos = start + 1;
            loop {
                if let Some(val) = trie.value(cur) {
                    if !crosses_blocked_span(start, pos, blocked) {
                        nodes.push(GraphNode {
                            start,
                            end: pos,
                            form: None,
                            typo_cost: TYPO_SUBSTITUTION_COST,
                            space_errors: 0,
                            typo_form_id: Some(FormId(val)),
                            class_tag: None,
                        });
                    }
                }
                if pos >= n {
                    break;
                }
                match trie.next(cur, jamo[pos as usize]) {
                    Some(next) => {
                        cur = next;
                        pos += 1;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Removes nodes that cannot be reached from the root or cannot reach the
/// sink — spec.md §8's reachability invariant, enforced at construction
/// time rather than trusted of the scan above.
fn prune_unreachable(lattice: &mut Lattice, bos: NodeId, eos: NodeId) {
    let n = lattice.nodes.len();
    let mut reachable_from_start = vec![false; n];
    let mut stack = vec![bos];
    reachable_from_start[bos.0 as usize] = true;
    while let Some(cur) = stack.pop() {
        for &next in &lattice.edges[cur.0 as usize] {
            if !reachable_from_start[next.0 as usize] {
                reachable_from_start[next.0 as usize] = true;
                stack.push(next);
            }
        }
    }

    let mut rev_edges = vec![Vec::new(); n];
    for (i, succs) in lattice.edges.iter().enumerate() {
        for &s in succs {
            rev_edges[s.0 as usize].push(NodeId(i as u32));
        }
    }
    let mut can_reach_end = vec![false; n];
    let mut stack = vec![eos];
    can_reach_end[eos.0 as usize] = true;
    while let Some(cur) = stack.pop() {
        for &prev in &rev_edges[cur.0 as usize] {
            if !can_reach_end[prev.0 as usize] {
                can_reach_end[prev.0 as usize] = true;
                stack.push(prev);
            }
        }
    }

    for i in 0..n {
        let keep = reachable_from_start[i] && can_reach_end[i];
        if !keep {
            lattice.edges[i].clear();
        }
    }
    for i in 0..n {
        lattice.edges[i].retain(|id| reachable_from_start[id.0 as usize] && can_reach_end[id.0 as usize]);
    }
}
