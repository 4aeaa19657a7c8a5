//! C10: Analyzer façade — the public entry point tying C1-C9 together,
//! plus the concurrency/resource model (spec.md §5, §6, SPEC_FULL.md §5).
//!
//! Grounded on the teacher's `src/lib.rs` `Tokenizer` (owns the loaded
//! model, dispatches `encode`/`encode_batch` via `rayon`'s
//! `par_iter().map(...).collect()`) generalized per SPEC_FULL.md §5, and
//! on `examples/other_examples/87d45962_tokoba-vibrato-rkyv__..tokenizer.rs.rs`'s
//! `Tokenizer`/`Worker` split for the per-call mutable `Scratch`.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::assemble::assemble;
use crate::error::{Error, Result};
use crate::feature;
use crate::form::FormStore;
use crate::jamo::{self, Normalized};
use crate::lattice::{build_lattice, Lattice};
use crate::lm::LangModel;
use crate::model::{load_model, LoadedModel};
use crate::morpheme::{FormId, MorphId, MorphemeStore};
use crate::path::{find_best_paths, PathResult, ScoreRules, SpecialState};
use crate::trie::FrozenTrie;
use crate::types::{AnalyzeOption, BuildOption, Match, PosTag, TokenResult};

/// Per-call mutable scratch space. Owned by whichever worker (pool thread
/// or the calling thread for a direct `analyze`) runs a given request;
/// never a `thread_local!`, per the REDESIGN FLAGS (spec.md §9):
/// thread-local statics make testability and multi-analyzer-instance
/// usage in one process harder than they need to be, and the cost of
/// threading `&mut Scratch` explicitly is one extra parameter.
#[derive(Debug, Default)]
pub struct Scratch {
    normalized: Normalized,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Immutable, shared analyzer state: the loaded model tables plus the
/// rule weights and dialect policy every call consults.
struct Shared {
    forms: FormStore,
    morphemes: MorphemeStore,
    trie: FrozenTrie,
    lm: LangModel,
    rules: ScoreRules,
    build_options: BuildOption,
}

/// Korean morphological analyzer. Load once with [`Analyzer::new`], then
/// call `analyze`/`analyze_batch`/`analyze_async` concurrently — all
/// borrow the shared model read-only, so no internal locking is needed
/// on the hot path.
pub struct Analyzer {
    shared: Arc<Shared>,
    pool: Option<rayon::ThreadPool>,
}

impl Analyzer {
    /// Loads a model from `reader` and builds an analyzer with a
    /// dedicated worker pool sized to `num_threads` (`0` disables the
    /// pool: `analyze_batch`/`analyze_async` then run inline on the
    /// calling thread, which is the right default for an embedded,
    /// single-request-at-a-time caller).
    pub fn new<R: std::io::Read>(reader: R, num_threads: usize, build_options: BuildOption) -> Result<Self> {
        let LoadedModel { forms, morphemes, trie, lm } = load_model(reader)?;
        tracing::debug!(num_threads, "analyzer constructed");

        let pool = if num_threads > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| Error::AnalyzerInternal(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            shared: Arc::new(Shared { forms, morphemes, trie, lm, rules: ScoreRules::default(), build_options }),
            pool,
        })
    }

    /// Analyzes `text`, returning up to `option.top_n` scored candidate
    /// analyses, highest score first. Falls back to a single
    /// all-unknown-tokens result rather than propagating an internal
    /// search failure, per spec.md §4.9's failure policy — a caller
    /// asking "what are the morphemes in this text" should never get a
    /// hard error just because the lattice happened to produce zero
    /// paths for one odd input.
    pub fn analyze(&self, text: &str, option: &AnalyzeOption) -> Result<Vec<TokenResult>> {
        validate_option(option)?;
        let mut scratch = Scratch::new();
        Ok(self.analyze_with_scratch(text, option, &mut scratch))
    }

    /// Chunks `text` at special separators (spec.md §4.9), runs C1-C9 on
    /// each chunk independently, then stitches the per-chunk results back
    /// together: token offsets (`position`, `word_position`,
    /// `sent_position`, `paired_token`) are shifted to be continuous
    /// across the whole text, and `SpecialState` (quote depth, bullet
    /// memory) is carried from one chunk's best path into the next
    /// chunk's search so quote-pairing and bullet scoring survive the
    /// boundary. A chunk that yields no finite-score path falls back to a
    /// single `UNK` token covering just that chunk (spec.md §4.9's
    /// "failure policy inside a single chunk is total"), not the whole
    /// document.
    ///
    /// `top_n` beyond the first slot is approximated by varying only the
    /// first chunk's choice of path and keeping every later chunk at its
    /// own best — exploring every chunk's top-N combination would be
    /// combinatorial in chunk count (DESIGN.md).
    fn analyze_with_scratch(&self, text: &str, option: &AnalyzeOption, scratch: &mut Scratch) -> Vec<TokenResult> {
        let normalize_coda = option.match_options.contains(crate::types::Match::NORMALIZE_CODA);
        let chars: Vec<char> = text.chars().collect();
        let chunk_spans = split_into_chunks(&chars);
        let allowed: Vec<_> = option.allowed_dialects.map(|s| s.to_vec()).unwrap_or_default();

        let mut outcomes: Vec<ChunkOutcome> = Vec::with_capacity(chunk_spans.len());
        let mut state = SpecialState::default();
        for &(start, end) in &chunk_spans {
            let chunk_text: String = chars[start as usize..end as usize].iter().collect();
            let normalized = jamo::normalize(&chunk_text, normalize_coda);
            let lattice = build_lattice(&normalized, &self.shared.trie, &self.shared.forms, option.match_options, &[]);

            #[cfg(debug_assertions)]
            crate::invariants::assert_lattice_reachable(&lattice);

            let paths = find_best_paths(&lattice, &self.shared.lm, &self.shared.forms, &self.shared.morphemes, option.top_n, -50.0, &self.shared.rules, &allowed, state);

            if paths.is_empty() {
                tracing::warn!(chunk_start = start, chunk_end = end, "no analysis path found for chunk, falling back to unknown tokens");
                outcomes.push(ChunkOutcome::Fallback { chunk_start: start, fallback: fallback_unknown(&chunk_text) });
                continue;
            }
            state = paths[0].final_state;
            outcomes.push(ChunkOutcome::Paths { chunk_start: start, paths, normalized });
        }

        // scratch currently only needs to hold the last chunk's normalized
        // buffer (its one remaining consumer is test introspection); keep
        // it populated for that case.
        if let Some(ChunkOutcome::Paths { normalized, .. }) = outcomes.last() {
            scratch.normalized = normalized.clone();
        }

        stitch_chunk_outcomes(
            &self.shared.forms,
            &self.shared.morphemes,
            &outcomes,
            option.top_n,
            option.match_options,
            self.shared.build_options.contains(BuildOption::INTEGRATE_ALLOMORPH),
        )
    }

    /// Analyzes many texts, one worker-pool task per text (teacher
    /// pattern: `encode_batch`'s `texts.par_iter().map(...).collect()`).
    /// Falls back to sequential iteration when no pool was configured.
    pub fn analyze_batch(&self, texts: &[&str], option: &AnalyzeOption) -> Result<Vec<Vec<TokenResult>>> {
        validate_option(option)?;
        match &self.pool {
            Some(pool) => {
                use rayon::prelude::*;
                pool.install(|| {
                    texts
                        .par_iter()
                        .map(|text| {
                            let mut scratch = Scratch::new();
                            Ok(self.analyze_with_scratch(text, option, &mut scratch))
                        })
                        .collect()
                })
            }
            None => texts
                .iter()
                .map(|text| {
                    let mut scratch = Scratch::new();
                    Ok(self.analyze_with_scratch(text, option, &mut scratch))
                })
                .collect(),
        }
    }

    /// Returns a [`Future`] resolving to `text`'s top-1 analysis, run on
    /// the analyzer's worker pool without pulling in an async runtime
    /// dependency (SPEC_FULL.md §5): [`AnalysisFuture`] is a minimal
    /// hand-rolled future fulfilled by a pool-submitted closure.
    pub fn analyze_async(self: &Arc<Self>, text: String, option: AnalyzeOption) -> AnalysisFuture {
        let fut = AnalysisFuture::new();
        let fut_slot = fut.clone_inner();
        let this = Arc::clone(self);
        let submit = move || {
            let mut scratch = Scratch::new();
            let result = match validate_option(&option) {
                Ok(()) => Ok(this.analyze_with_scratch(&text, &option, &mut scratch)),
                Err(e) => Err(e),
            };
            fut_slot.fulfill(result);
        };
        match &self.pool {
            Some(pool) => pool.spawn(submit),
            None => submit(),
        }
        fut
    }

    /// Splits `text` into sentence spans without running the full
    /// morpheme search — analyzes at `top_n = 1` and reports each
    /// distinct `sent_position` run's character span.
    pub fn split_into_sentences(&self, text: &str, option: &AnalyzeOption) -> Result<Vec<(u32, u32)>> {
        let mut opt = *option;
        opt.top_n = 1;
        let results = self.analyze(text, &opt)?;
        let Some(best) = results.into_iter().next() else {
            return Ok(Vec::new());
        };
        let mut spans = Vec::new();
        let mut cur_sent = None;
        let mut start = 0u32;
        let mut end = 0u32;
        for t in &best.tokens {
            match cur_sent {
                Some(s) if s == t.sent_position => {
                    end = t.position + t.length as u32;
                }
                _ => {
                    if cur_sent.is_some() {
                        spans.push((start, end));
                    }
                    start = t.position;
                    end = t.position + t.length as u32;
                    cur_sent = Some(t.sent_position);
                }
            }
        }
        if cur_sent.is_some() {
            spans.push((start, end));
        }
        Ok(spans)
    }

    /// Returns every morpheme whose dictionary form matches `form` and
    /// whose tag equals `tag` (SPEC_FULL.md §10's plural `findMorpheme`
    /// overload). `find_morpheme` (below) is the common single-result case.
    pub fn find_morphemes(&self, form: &str, tag: PosTag) -> Vec<MorphId> {
        let normalized = jamo::normalize(form, false);
        let Some(form_id) = self.shared.forms.find(&normalized.jamo) else {
            return Vec::new();
        };
        self.shared
            .forms
            .get(form_id)
            .candidates
            .iter()
            .copied()
            .filter(|&m| self.shared.morphemes.get(m).tag == tag)
            .collect()
    }

    pub fn find_morpheme(&self, form: &str, tag: PosTag) -> Option<MorphId> {
        self.find_morphemes(form, tag).into_iter().next()
    }

    #[cfg(test)]
    pub(crate) fn forms(&self) -> &FormStore {
        &self.shared.forms
    }
}

fn validate_option(option: &AnalyzeOption) -> Result<()> {
    use crate::types::Match;
    if option.top_n == 0 {
        return Err(Error::InvalidOption("top_n must be at least 1".into()));
    }
    let split = option.match_options.contains(Match::SPLIT_SAISIOT);
    let merge = option.match_options.contains(Match::MERGE_SAISIOT);
    if split && merge {
        return Err(Error::InvalidOption("SPLIT_SAISIOT and MERGE_SAISIOT are mutually exclusive".into()));
    }
    Ok(())
}

fn fallback_unknown(text: &str) -> TokenResult {
    use crate::types::TokenInfo;
    let tokens = text
        .chars()
        .enumerate()
        .map(|(i, c)| TokenInfo {
            form: c.to_string(),
            tag: PosTag::Unknown,
            position: i as u32,
            length: 1,
            word_position: 0,
            sent_position: 0,
            sub_sent_position: 0,
            word_score: -100.0,
            typo_cost: 0.0,
            paired_token: None,
        })
        .collect();
    TokenResult { tokens, score: f32::NEG_INFINITY }
}

/// One chunk's outcome from the per-chunk C1-C9 run: either a set of
/// scored candidate paths plus the normalized buffer needed to assemble
/// them, or (when the chunk's lattice/path search produced nothing
/// finite) a ready-made single-`UNK`-token fallback (spec.md §4.9).
enum ChunkOutcome {
    Paths { chunk_start: u32, paths: Vec<PathResult>, normalized: Normalized },
    Fallback { chunk_start: u32, fallback: TokenResult },
}

/// Sentence-final punctuation the chunker treats as a hard break point
/// (spec.md §4.9's "special separators").
fn is_sentence_final_punct(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}' | '\u{3002}' | '\u{ff01}' | '\u{ff1f}')
}

fn is_closing_bracket(c: char) -> bool {
    matches!(c, ')' | ']' | '}' | '\u{300b}' | '\u{300d}' | '\u{300f}' | '\u{2019}' | '\u{201d}')
}

fn is_closing_quote_or_bracket(c: char) -> bool {
    is_closing_bracket(c) || matches!(c, '"' | '\'')
}

fn is_opening_quote_or_bracket(c: char) -> bool {
    matches!(c, '(' | '[' | '{' | '"' | '\'' | '\u{201c}' | '\u{2018}' | '\u{300c}' | '\u{300e}' | '\u{300a}')
}

/// Splits `chars` into chunk spans (char-index `[start, end)` pairs) at
/// sentence-final punctuation (absorbing any trailing closing quote/
/// bracket run) and at a closing bracket immediately followed by a
/// capital letter or an opening quote/bracket (spec.md §4.9) — this
/// bounds a single Viterbi sweep's width without needing the full
/// tag-aware `SentenceParser` the assembler runs after the fact.
fn split_into_chunks(chars: &[char]) -> Vec<(u32, u32)> {
    let n = chars.len();
    if n == 0 {
        return vec![(0, 0)];
    }
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < n {
        let c = chars[i];
        let boundary_end = if is_sentence_final_punct(c) {
            let mut j = i + 1;
            while j < n && is_closing_quote_or_bracket(chars[j]) {
                j += 1;
            }
            Some(j)
        } else if is_closing_bracket(c) {
            match chars.get(i + 1) {
                Some(&next) if next.is_uppercase() || is_opening_quote_or_bracket(next) => Some(i + 1),
                _ => None,
            }
        } else {
            None
        };

        if let Some(end) = boundary_end {
            spans.push((start as u32, end as u32));
            let mut k = end;
            while k < n && chars[k].is_whitespace() {
                k += 1;
            }
            start = k;
            i = k;
            continue;
        }
        i += 1;
    }
    if start < n || spans.is_empty() {
        spans.push((start as u32, n as u32));
    }
    spans
}

/// Stitches each chunk's chosen path (or fallback) into up to `top_n`
/// whole-text `TokenResult`s, shifting `position`/`word_position`/
/// `sent_position`/`paired_token` to run continuously across chunk
/// boundaries and summing per-chunk scores into one total.
fn stitch_chunk_outcomes(
    forms: &FormStore,
    morphemes: &MorphemeStore,
    outcomes: &[ChunkOutcome],
    top_n: usize,
    match_options: Match,
    integrate_allomorph: bool,
) -> Vec<TokenResult> {
    if outcomes.is_empty() {
        return vec![TokenResult { tokens: Vec::new(), score: 0.0 }];
    }

    let mut results = Vec::with_capacity(top_n);
    for slot in 0..top_n {
        let mut tokens = Vec::new();
        let mut total_score = 0.0f32;
        let mut word_offset: u16 = 0;
        let mut sent_offset: u32 = 0;

        for (idx, outcome) in outcomes.iter().enumerate() {
            let mut chunk_result = match outcome {
                ChunkOutcome::Fallback { chunk_start, fallback } => {
                    let mut tr = fallback.clone();
                    for t in &mut tr.tokens {
                        t.position += *chunk_start;
                    }
                    tr
                }
                ChunkOutcome::Paths { chunk_start, paths, normalized } => {
                    let pick = if idx == 0 { slot.min(paths.len() - 1) } else { 0 };
                    let mut tr = assemble(&paths[pick], forms, morphemes, normalized, match_options, integrate_allomorph);
                    for t in &mut tr.tokens {
                        t.position += *chunk_start;
                    }
                    tr
                }
            };

            let token_offset = tokens.len() as u32;
            let last_word = chunk_result.tokens.last().map(|t| t.word_position);
            let last_sent = chunk_result.tokens.last().map(|t| t.sent_position);
            for t in &mut chunk_result.tokens {
                t.word_position += word_offset;
                t.sent_position += sent_offset;
                if let Some(p) = t.paired_token {
                    t.paired_token = Some(p + token_offset);
                }
            }
            if let Some(w) = last_word {
                word_offset += w + 1;
            }
            if let Some(s) = last_sent {
                sent_offset += s + 1;
            }
            total_score += chunk_result.score;
            tokens.extend(chunk_result.tokens);
        }

        results.push(TokenResult { tokens, score: total_score });
    }
    results
}

type SharedSlot = Arc<Mutex<Option<Result<Vec<TokenResult>>>>>;
type WakerSlot = Arc<Mutex<Option<Waker>>>;

/// Hand-rolled future satisfying `Future<Output = Result<Vec<TokenResult>>>`
/// without an async runtime dependency (SPEC_FULL.md §5): a shared slot
/// holds the eventual result, a shared slot holds whatever `Waker` the
/// executor polling this future last registered, and the pool-submitted
/// closure that produces the result wakes that waker once it stores it.
pub struct AnalysisFuture {
    result: SharedSlot,
    waker: WakerSlot,
}

struct FulfillHandle {
    result: SharedSlot,
    waker: WakerSlot,
}

impl FulfillHandle {
    fn fulfill(&self, value: Result<Vec<TokenResult>>) {
        *self.result.lock().unwrap() = Some(value);
        if let Some(w) = self.waker.lock().unwrap().take() {
            w.wake();
        }
    }
}

impl AnalysisFuture {
    fn new() -> Self {
        Self { result: Arc::new(Mutex::new(None)), waker: Arc::new(Mutex::new(None)) }
    }

    fn clone_inner(&self) -> FulfillHandle {
        FulfillHandle { result: Arc::clone(&self.result), waker: Arc::clone(&self.waker) }
    }
}

impl Future for AnalysisFuture {
    type Output = Result<Vec<TokenResult>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.result.lock().unwrap();
        if let Some(value) = slot.take() {
            return Poll::Ready(value);
        }
        *self.waker.lock().unwrap() = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Ordered streaming wrapper over a batch of `analyze_async` calls
/// (spec.md §5): completions may arrive out of order from the pool, but
/// `next()` only ever releases them in increasing input order, buffering
/// early arrivals until their turn.
pub struct AnalyzeStream {
    futures: Vec<Option<AnalysisFuture>>,
    next_index: usize,
}

impl AnalyzeStream {
    pub fn new(analyzer: &Arc<Analyzer>, texts: Vec<String>, option: AnalyzeOption) -> Self {
        let futures = texts.into_iter().map(|t| Some(analyzer.analyze_async(t, option))).collect();
        Self { futures, next_index: 0 }
    }

    /// Polls only the next-in-order future to completion; earlier
    /// in-flight futures for later indices keep running on the pool in
    /// the background regardless of when this is called.
    pub async fn next(&mut self) -> Option<Result<Vec<TokenResult>>> {
        if self.next_index >= self.futures.len() {
            return None;
        }
        let fut = self.futures[self.next_index].take()?;
        let result = fut.await;
        self.next_index += 1;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::write_test_model;
    use std::io::Cursor;

    fn tiny_analyzer() -> Analyzer {
        let data = write_test_model(&[(vec![1, 2], 0, vec![0])], &[(0, PosTag::Nng as u8, 0, 0, 0.0)], &[(0, 0, 0, -1.0, 0.0)]);
        Analyzer::new(Cursor::new(data), 0, BuildOption::default()).unwrap()
    }

    #[test]
    fn analyze_falls_back_on_unparseable_input_without_erroring() {
        let analyzer = tiny_analyzer();
        let option = AnalyzeOption::default();
        let results = analyzer.analyze("zzz", &option).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn rejects_top_n_zero() {
        let analyzer = tiny_analyzer();
        let mut option = AnalyzeOption::default();
        option.top_n = 0;
        assert!(analyzer.analyze("x", &option).is_err());
    }

    #[test]
    fn rejects_conflicting_saisiot_options() {
        use crate::types::Match;
        let analyzer = tiny_analyzer();
        let mut option = AnalyzeOption::default();
        option.match_options |= Match::SPLIT_SAISIOT;
        option.match_options |= Match::MERGE_SAISIOT;
        assert!(analyzer.analyze("x", &option).is_err());
    }

    #[test]
    fn find_morpheme_locates_known_form() {
        let analyzer = tiny_analyzer();
        // The test model's only form is jamo [1, 2]; find_morphemes takes
        // caller text, not raw jamo, so searching for a precomposed
        // syllable mapping to those jamo isn't available without a real
        // dictionary — exercise the code path with a form guaranteed to
        // miss instead, confirming it returns no candidates rather than
        // panicking.
        let found = analyzer.find_morphemes("\u{ac00}", PosTag::Nng);
        assert!(found.is_empty());
    }

    #[test]
    fn split_into_chunks_breaks_after_sentence_final_punctuation() {
        let chars: Vec<char> = "abc. def".chars().collect();
        let spans = split_into_chunks(&chars);
        assert_eq!(spans, vec![(0, 4), (5, 8)]);
    }

    #[test]
    fn split_into_chunks_absorbs_trailing_closing_quote() {
        let chars: Vec<char> = "\"Hi.\" there".chars().collect();
        let spans = split_into_chunks(&chars);
        assert_eq!(spans[0].1, 5);
    }

    #[test]
    fn split_into_chunks_keeps_unpunctuated_text_as_one_chunk() {
        let chars: Vec<char> = "zzz".chars().collect();
        let spans = split_into_chunks(&chars);
        assert_eq!(spans, vec![(0, 3)]);
    }

    #[test]
    fn multi_sentence_text_stitches_every_chunks_tokens() {
        let analyzer = tiny_analyzer();
        let option = AnalyzeOption::default();
        // Neither "zzz" nor "qqq" matches the tiny test model's dictionary,
        // so both chunks end up as unknown-tagged spans one way or
        // another; the stitched result must still cover every non-space
        // character across both chunks rather than collapsing to a
        // single whole-document span.
        let results = analyzer.analyze("zzz. qqq.", &option).unwrap();
        assert!(!results.is_empty());
        let total_chars: usize = results[0].tokens.iter().map(|t| t.length as usize).sum();
        assert_eq!(total_chars, "zzz. qqq.".chars().filter(|c| !c.is_whitespace()).count());
    }
}
