//! C3: Morpheme store — the frozen, immutable morpheme table produced by
//! model loading (spec.md §3, §4.2).
//!
//! Mirrors the raw/frozen split in `original_source/include/kiwi/Form.h`
//! (`MorphemeRaw` vs `Morpheme`): the raw struct is what the model reader
//! builds incrementally; the frozen struct is what the rest of the
//! pipeline indexes into. Self-relative pointers (`combined`, `chunks` of
//! morpheme pointers) become typed arena indices per the REDESIGN FLAGS.

use crate::types::{CondPolarity, CondVowel, Dialect, PosTag};

/// Index into a [`MorphemeStore`]'s flat morpheme arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MorphId(pub u32);

/// Index into a [`crate::form::FormStore`]'s flat form arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId(pub u32);

/// A position span `(start, end)` within a morpheme's combined chunk list,
/// in jamo-char units (`chunkPositions` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: u8,
    pub end: u8,
}

/// One entry in a split morpheme's chunk list: which morpheme fills this
/// slot, and what span of the combined surface form it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub morph: MorphId,
    pub span: ChunkSpan,
}

/// Builder-time, growable morpheme record (`MorphemeRaw` analog).
#[derive(Debug, Clone, Default)]
pub struct MorphemeRaw {
    pub kform: FormId,
    pub tag: PosTag,
    pub vowel: CondVowel,
    pub polar: CondPolarity,
    pub complex: bool,
    pub sense_id: u8,
    /// Non-zero socket id groups together the split halves of an
    /// irregularly-conjugating morpheme (e.g. `더/V` and `ㅂ/V` both carry
    /// the same socket so the path evaluator knows they may recombine).
    pub combine_socket: u8,
    pub chunks: Vec<Chunk>,
    /// Self-relative offset (in arena index units) to the canonical,
    /// unsplit morpheme. Zero for morphemes that are not split halves.
    pub combined: i32,
    pub user_score: f32,
    pub lm_morpheme_id: u32,
    pub orig_morpheme_id: u32,
    pub group_id: u32,
    pub dialect: Dialect,
}

impl MorphemeRaw {
    pub fn new(tag: PosTag, vowel: CondVowel, polar: CondPolarity, complex: bool, combine_socket: u8) -> Self {
        Self {
            tag,
            vowel,
            polar,
            complex,
            combine_socket,
            ..Default::default()
        }
    }
}

impl Default for CondVowel {
    fn default() -> Self {
        CondVowel::None
    }
}

impl Default for CondPolarity {
    fn default() -> Self {
        CondPolarity::None
    }
}

impl Default for PosTag {
    fn default() -> Self {
        PosTag::Unknown
    }
}

/// Frozen, read-only morpheme record. Carries a [`saisiot`] bit the raw
/// form packs elsewhere (spec.md's compound-noun sai-siot handling).
#[derive(Debug, Clone, PartialEq)]
pub struct Morpheme {
    pub kform: FormId,
    pub tag: PosTag,
    pub vowel: CondVowel,
    pub polar: CondPolarity,
    pub complex: bool,
    pub saisiot: bool,
    pub sense_id: u8,
    pub combine_socket: u8,
    /// Arena index of the canonical combined morpheme. Equal to this
    /// morpheme's own id when it is not a split half.
    pub combined: MorphId,
    pub chunks: Vec<Chunk>,
    pub user_score: f32,
    pub lm_morpheme_id: u32,
    pub orig_morpheme_id: u32,
    pub dialect: Dialect,
}

impl Morpheme {
    /// True if this morpheme stands alone (no chunk decomposition, or a
    /// complex/saisiot morpheme that the assembler should not re-split).
    pub fn is_single(&self) -> bool {
        self.chunks.is_empty() || self.complex || self.saisiot
    }

    pub fn has_complex(&self, store: &MorphemeStore) -> bool {
        if store.get(self.combined).complex {
            return true;
        }
        self.chunks.iter().any(|c| store.get(c.morph).complex)
    }
}

/// Flat immutable arena of baked morphemes, indexed by [`MorphId`].
#[derive(Debug, Clone, Default)]
pub struct MorphemeStore {
    morphemes: Vec<Morpheme>,
}

impl MorphemeStore {
    pub fn new() -> Self {
        Self { morphemes: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { morphemes: Vec::with_capacity(cap) }
    }

    pub fn push(&mut self, m: Morpheme) -> MorphId {
        let id = MorphId(self.morphemes.len() as u32);
        self.morphemes.push(m);
        id
    }

    pub fn get(&self, id: MorphId) -> &Morpheme {
        &self.morphemes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.morphemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.morphemes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MorphId, &Morpheme)> {
        self.morphemes
            .iter()
            .enumerate()
            .map(|(i, m)| (MorphId(i as u32), m))
    }
}

/// Bakes a raw, builder-time morpheme into its frozen form. `self_index` is
/// this morpheme's own arena position, used to resolve the raw struct's
/// self-relative `combined` offset into an absolute [`MorphId`].
pub fn bake(raw: &MorphemeRaw, self_index: u32) -> Morpheme {
    let combined = if raw.combined == 0 {
        MorphId(self_index)
    } else {
        MorphId((self_index as i64 + raw.combined as i64) as u32)
    };
    Morpheme {
        kform: raw.kform,
        tag: raw.tag,
        vowel: raw.vowel,
        polar: raw.polar,
        complex: raw.complex,
        saisiot: false,
        sense_id: raw.sense_id,
        combine_socket: raw.combine_socket,
        combined,
        chunks: raw.chunks.clone(),
        user_score: raw.user_score,
        lm_morpheme_id: raw.lm_morpheme_id,
        orig_morpheme_id: raw.orig_morpheme_id,
        dialect: raw.dialect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_morpheme(combined: MorphId) -> Morpheme {
        Morpheme {
            kform: FormId(0),
            tag: PosTag::Vv,
            vowel: CondVowel::None,
            polar: CondPolarity::None,
            complex: false,
            saisiot: false,
            sense_id: 0,
            combine_socket: 0,
            combined,
            chunks: Vec::new(),
            user_score: 0.0,
            lm_morpheme_id: 0,
            orig_morpheme_id: 0,
            dialect: Dialect::Standard,
        }
    }

    #[test]
    fn is_single_without_chunks() {
        let m = sample_morpheme(MorphId(0));
        assert!(m.is_single());
    }

    #[test]
    fn bake_resolves_self_relative_combined_offset() {
        // morpheme at index 5 whose raw `combined` is -2 should resolve to index 3
        let mut raw = MorphemeRaw::new(PosTag::V, CondVowel::None, CondPolarity::None, false, 3);
        raw.combined = -2;
        let baked = bake(&raw, 5);
        assert_eq!(baked.combined, MorphId(3));
    }

    #[test]
    fn bake_unsplit_combined_points_to_self() {
        let raw = MorphemeRaw::new(PosTag::Vv, CondVowel::None, CondPolarity::None, false, 0);
        let baked = bake(&raw, 7);
        assert_eq!(baked.combined, MorphId(7));
    }

    #[test]
    fn store_push_and_get_roundtrip() {
        let mut store = MorphemeStore::new();
        let id = store.push(sample_morpheme(MorphId(0)));
        assert_eq!(store.get(id).tag, PosTag::Vv);
        assert_eq!(store.len(), 1);
    }
}
