//! C2: Form store — the frozen surface-form table (spec.md §3, §4.2).
//!
//! A "form" is a jamo-normalized surface string plus the list of
//! morphemes it can realize (homograph candidates). Grounded on
//! `original_source/include/kiwi/Form.h`'s `FormRaw`/`Form` split, and on
//! the teacher's `src/vocab.rs` (flat `Vec` + lookup map) shape.

use std::collections::HashMap;

use crate::jamo::JamoChar;
use crate::morpheme::{FormId, MorphId};
use crate::types::{CondPolarity, CondVowel, Dialect};

/// Builder-time, growable form record (`FormRaw` analog).
#[derive(Debug, Clone, Default)]
pub struct FormRaw {
    pub form: Vec<JamoChar>,
    pub candidates: Vec<MorphId>,
}

impl FormRaw {
    pub fn new(form: Vec<JamoChar>) -> Self {
        Self { form, candidates: Vec::new() }
    }
}

/// Frozen, read-only surface form record.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub form: Vec<JamoChar>,
    pub candidates: Vec<MorphId>,
    /// Count of absorbed internal spaces (SPEC_FULL.md §10, space
    /// tolerance in the lattice builder).
    pub num_spaces: u32,
    pub vowel: CondVowel,
    pub polar: CondPolarity,
    /// Cheap 8-bit hash of `form`, used by the trie/lattice fast paths to
    /// skip a full string compare before falling back to one.
    pub form_hash: u8,
    /// Whether a "zombie coda" (spec.md §4.7 z-coda) may be appended after
    /// this form without breaking tokenization.
    pub z_coda_appendable: bool,
    pub z_siot_appendable: bool,
    pub dialect: Dialect,
}

impl Form {
    /// Character count excluding absorbed spaces (`sizeWithoutSpace` in
    /// the original).
    pub fn size_without_space(&self) -> usize {
        self.form.len() - self.num_spaces as usize
    }
}

/// Hashes a jamo-char slice into an 8-bit fingerprint (FNV-1a folded to
/// one byte), used for `Form::form_hash`.
fn hash_form(form: &[JamoChar]) -> u8 {
    let mut h: u32 = 0x811c_9dc5;
    for &c in form {
        h ^= c as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    ((h >> 24) ^ (h >> 16) ^ (h >> 8) ^ h) as u8
}

/// Bakes a raw form into its frozen form, given whether the lattice
/// builder determined the surface string may host a trailing z-coda or
/// z-siot extension.
pub fn bake(raw: &FormRaw, num_spaces: u32, vowel: CondVowel, polar: CondPolarity, z_coda_appendable: bool, z_siot_appendable: bool, dialect: Dialect, additional_cands: &[MorphId]) -> Form {
    let mut candidates = raw.candidates.clone();
    candidates.extend_from_slice(additional_cands);
    Form {
        form_hash: hash_form(&raw.form),
        form: raw.form.clone(),
        candidates,
        num_spaces,
        vowel,
        polar,
        z_coda_appendable,
        z_siot_appendable,
        dialect,
    }
}

/// Flat immutable arena of baked forms, indexed by [`FormId`], plus a
/// lookup map from the jamo-normalized surface string back to its id
/// (teacher pattern: `Vocabulary::token_to_id`).
#[derive(Debug, Clone, Default)]
pub struct FormStore {
    forms: Vec<Form>,
    form_to_id: HashMap<Vec<JamoChar>, FormId>,
}

impl FormStore {
    pub fn new() -> Self {
        Self { forms: Vec::new(), form_to_id: HashMap::new() }
    }

    pub fn push(&mut self, form: Form) -> FormId {
        let id = FormId(self.forms.len() as u32);
        self.form_to_id.insert(form.form.clone(), id);
        self.forms.push(form);
        id
    }

    pub fn get(&self, id: FormId) -> &Form {
        &self.forms[id.0 as usize]
    }

    pub fn find(&self, form: &[JamoChar]) -> Option<FormId> {
        self.form_to_id.get(form).copied()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FormId, &Form)> {
        self.forms.iter().enumerate().map(|(i, f)| (FormId(i as u32), f))
    }
}
