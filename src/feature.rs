//! C5: Feature tester — jamo-level predicates used to decide whether a
//! morpheme's left-context condition (`CondVowel`/`CondPolarity`) is
//! satisfied by the preceding form (spec.md §4.4).
//!
//! Grounded on `original_source/KiwiLibrary/KFeatureTestor.{h,cpp}`: that
//! implementation inspects the last jamo of a legacy byte-indexed form
//! buffer (`end[-1]`); this crate's forms are full-Unicode jamo
//! (`U+1100`..`U+11FF`), so the same predicates are re-expressed in terms
//! of Unicode jamo code-point ranges rather than the original's raw
//! index constants.

use crate::jamo::JamoChar;
use crate::types::{CondPolarity, CondVowel};

const V_BASE: u32 = 0x1161;
const V_COUNT: u32 = 21;
const T_BASE: u32 = 0x11A7;

/// Coda index (1-based within the 27 non-empty codas) of `ㄹ`.
const RIEUL_CODA: u16 = (T_BASE + 8) as u16;
/// Coda index of `ㅎ`.
const HIEUT_CODA: u16 = (T_BASE + 27) as u16;

/// Vowel offsets (relative to `V_BASE`) belonging to the "positive"
/// (bright/yang) vowel-harmony group: `ㅏ ㅑ ㅗ ㅘ ㅛ`.
const POSITIVE_VOWEL_OFFSETS: [u32; 5] = [0, 2, 8, 9, 12];
/// `ㅣ` and other neutral/negative vowels are treated as negative, matching
/// the original's fallthrough-to-`false` behavior for unmatched vowels.
const NEGATIVE_VOWEL_OFFSETS: [u32; 6] = [4, 6, 13, 14, 17, 20];

fn is_vowel_char(c: JamoChar) -> bool {
    let cp = c as u32;
    (V_BASE..V_BASE + V_COUNT).contains(&cp)
}

fn is_vocalic_char(c: JamoChar) -> bool {
    is_vowel_char(c) || c == RIEUL_CODA
}

fn is_vocalic_h_char(c: JamoChar) -> bool {
    is_vocalic_char(c) || c == HIEUT_CODA
}

/// Last jamo of `form`, or `None` for an empty form (the original treats
/// an empty buffer as failing every condition via its `begin < end` guard).
fn last(form: &[JamoChar]) -> Option<JamoChar> {
    form.last().copied()
}

pub fn is_vowel(form: &[JamoChar]) -> bool {
    last(form).is_some_and(is_vowel_char)
}

pub fn is_vocalic(form: &[JamoChar]) -> bool {
    last(form).is_some_and(is_vocalic_char)
}

pub fn is_vocalic_h(form: &[JamoChar]) -> bool {
    last(form).is_some_and(is_vocalic_h_char)
}

pub fn not_vowel(form: &[JamoChar]) -> bool {
    !form.is_empty() && !is_vowel(form)
}

pub fn not_vocalic(form: &[JamoChar]) -> bool {
    !form.is_empty() && !is_vocalic(form)
}

pub fn not_vocalic_h(form: &[JamoChar]) -> bool {
    !form.is_empty() && !is_vocalic_h(form)
}

/// Walks backward past filler/neutral jamo to find the governing vowel,
/// mirroring the original's backward scan that skips indices `<= 30` (its
/// non-vowel marker range) before testing harmony.
pub fn is_positive(form: &[JamoChar]) -> bool {
    for &c in form.iter().rev() {
        if !is_vowel_char(c) {
            continue;
        }
        let offset = c as u32 - V_BASE;
        if POSITIVE_VOWEL_OFFSETS.contains(&offset) {
            return true;
        }
        return false;
    }
    false
}

pub fn is_negative(form: &[JamoChar]) -> bool {
    for &c in form.iter().rev() {
        if !is_vowel_char(c) {
            continue;
        }
        let offset = c as u32 - V_BASE;
        return NEGATIVE_VOWEL_OFFSETS.contains(&offset) || !POSITIVE_VOWEL_OFFSETS.contains(&offset);
    }
    false
}

/// True if `form` is non-empty — the minimal condition every postposition
/// must satisfy (a postposition cannot attach to nothing).
pub fn is_postposition(form: &[JamoChar]) -> bool {
    !form.is_empty()
}

/// Two onset-only consonant jamo cannot legally open a form (spec.md
/// §4.5 lattice legality check).
pub fn is_correct_start(form: &[JamoChar]) -> bool {
    if form.len() < 2 {
        return true;
    }
    !(is_lone_consonant(form[0]) && is_lone_consonant(form[1]))
}

/// Two coda-only consonant jamo cannot legally close a form.
pub fn is_correct_end(form: &[JamoChar]) -> bool {
    let n = form.len();
    if n == 1 {
        return !is_lone_consonant(form[0]);
    }
    if n >= 2 && is_lone_consonant(form[n - 1]) && is_lone_consonant(form[n - 2]) {
        return false;
    }
    true
}

fn is_lone_consonant(c: JamoChar) -> bool {
    let cp = c as u32;
    (0x1100..0x1113).contains(&cp) || (T_BASE + 1..T_BASE + 28).contains(&cp)
}

/// Evaluates a morpheme's [`CondVowel`] condition against the jamo of the
/// immediately preceding form.
pub fn satisfies_vowel(cond: CondVowel, preceding_form: &[JamoChar]) -> bool {
    match cond {
        CondVowel::None | CondVowel::Any => true,
        CondVowel::Vowel => is_vowel(preceding_form),
        CondVowel::Vocalic => is_vocalic(preceding_form),
        CondVowel::VocalicH => is_vocalic_h(preceding_form),
        CondVowel::NonVowel => not_vowel(preceding_form),
        CondVowel::NonVocalic => not_vocalic(preceding_form),
        CondVowel::NonVocalicH => not_vocalic_h(preceding_form),
    }
}

/// Evaluates a morpheme's [`CondPolarity`] condition.
pub fn satisfies_polarity(cond: CondPolarity, preceding_form: &[JamoChar]) -> bool {
    match cond {
        CondPolarity::None => true,
        CondPolarity::Positive => is_positive(preceding_form),
        CondPolarity::Negative => is_negative(preceding_form),
    }
}

/// Onset `ㄴ` (spec.md §4.7's "ㅇ/ㅆ/ㄴ-initial suffix" rule).
pub const ONSET_NIEUN: u32 = 0x1102;
/// Onset `ㅆ` (ssang-siot).
pub const ONSET_SSANGSIOT: u32 = 0x110A;
/// Onset `ㅇ` (the null/filler onset).
pub const ONSET_IEUNG: u32 = 0x110B;

/// Vowel offset of `ㅏ`/`ㅇㅏ` (relative to `V_BASE`) — the 아-ending the
/// "아-after-non-positive-verb" rule keys on.
pub const VOWEL_OFFSET_A: u32 = 0;
/// Vowel offset of `ㅓ` — the 어-ending rule's key vowel.
pub const VOWEL_OFFSET_EO: u32 = 4;

/// First jamo of `form`, or `None` if empty.
pub fn first(form: &[JamoChar]) -> Option<JamoChar> {
    form.first().copied()
}

/// True if `form`'s last jamo is the `ㄹ` coda.
pub fn ends_in_rieul_coda(form: &[JamoChar]) -> bool {
    last(form) == Some(RIEUL_CODA)
}

/// True if `form`'s first jamo is an onset consonant among `onsets`
/// (raw `0x11xx` code points, not offsets).
pub fn starts_with_onset_in(form: &[JamoChar], onsets: &[u32]) -> bool {
    first(form).is_some_and(|c| onsets.contains(&(c as u32)))
}

/// True if `form`'s first jamo is the vowel at `offset` from `V_BASE`
/// (e.g. `VOWEL_OFFSET_A` for 아, `VOWEL_OFFSET_EO` for 어).
pub fn starts_with_vowel_offset(form: &[JamoChar], offset: u32) -> bool {
    first(form).is_some_and(|c| c as u32 == V_BASE + offset)
}

/// True if `form`'s first jamo is any vowel (an ending beginning directly
/// on a vowel rather than a consonant onset).
pub fn starts_with_vowel(form: &[JamoChar]) -> bool {
    first(form).is_some_and(is_vowel_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vowel(offset: u32) -> JamoChar {
        (V_BASE + offset) as JamoChar
    }

    #[test]
    fn empty_form_fails_every_condition() {
        assert!(!is_vowel(&[]));
        assert!(!not_vowel(&[]));
        assert!(!is_positive(&[]));
    }

    #[test]
    fn vowel_ending_form_is_vowel_and_vocalic() {
        let form = [vowel(0)]; // ㅏ
        assert!(is_vowel(&form));
        assert!(is_vocalic(&form));
        assert!(is_vocalic_h(&form));
        assert!(!not_vowel(&form));
    }

    #[test]
    fn rieul_coda_is_vocalic_but_not_vowel() {
        let form = [vowel(0), RIEUL_CODA];
        assert!(!is_vowel(&form));
        assert!(is_vocalic(&form));
    }

    #[test]
    fn hieut_coda_is_vocalic_h_only() {
        let form = [vowel(0), HIEUT_CODA];
        assert!(!is_vocalic(&form));
        assert!(is_vocalic_h(&form));
    }

    #[test]
    fn positive_vowel_harmony() {
        assert!(is_positive(&[vowel(0)])); // ㅏ
        assert!(!is_positive(&[vowel(4)])); // ㅓ
    }

    #[test]
    fn satisfies_vowel_any_always_true() {
        assert!(satisfies_vowel(CondVowel::Any, &[]));
    }

    #[test]
    fn correct_start_rejects_double_lone_consonant() {
        let bad = [0x1100u16 as JamoChar, 0x1101u16 as JamoChar];
        assert!(!is_correct_start(&bad));
    }
}
