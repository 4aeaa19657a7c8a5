//! C1: Hangul jamo normalizer (spec.md §4.1).
//!
//! Decomposes Hangul syllable blocks into onset/vowel/(coda) jamo and
//! tracks a position map back to the caller's original character offsets.
//! Non-Hangul code points pass through unchanged. The syllable-base
//! arithmetic mirrors the standard Unicode Hangul composition formula
//! (cross-checked against `examples/atcupps-hangul-cd/lib/src/jamo.rs`'s
//! `S_BASE`/`L_BASE`/`V_BASE`/`T_BASE` constants, used there for the
//! inverse operation).

const S_BASE: u32 = 0xAC00;
const L_BASE: u32 = 0x1100;
const V_BASE: u32 = 0x1161;
const T_BASE: u32 = 0x11A7;
const V_COUNT: u32 = 21;
const T_COUNT: u32 = 28;
const N_COUNT: u32 = V_COUNT * T_COUNT;
const S_COUNT: u32 = 19 * N_COUNT;

/// A single normalized jamo code point (onset, vowel, coda, or passthrough).
pub type JamoChar = u16;

/// Result of normalizing an input string: the jamo-level string plus a map
/// from each output position back to the input `char` index it came from.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub jamo: Vec<JamoChar>,
    /// `position_map[i]` is the `char` index in the original input that
    /// produced `jamo[i]`.
    pub position_map: Vec<u32>,
}

impl Normalized {
    pub fn len(&self) -> usize {
        self.jamo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jamo.is_empty()
    }
}

/// Decompose a single Hangul syllable into (onset, vowel, coda-or-none).
/// Returns `None` if `c` is not in the precomposed syllable block.
pub fn decompose_syllable(c: char) -> Option<(JamoChar, JamoChar, Option<JamoChar>)> {
    let cp = c as u32;
    if !(S_BASE..S_BASE + S_COUNT).contains(&cp) {
        return None;
    }
    let s_index = cp - S_BASE;
    let l = s_index / N_COUNT;
    let v = (s_index % N_COUNT) / T_COUNT;
    let t = s_index % T_COUNT;

    let onset = (L_BASE + l) as JamoChar;
    let vowel = (V_BASE + v) as JamoChar;
    let coda = if t == 0 { None } else { Some((T_BASE + t) as JamoChar) };
    Some((onset, vowel, coda))
}

/// Normalize a UTF-8 input string into a jamo-level buffer with a
/// char-index position map (spec.md §4.1).
///
/// `normalize_coda` merges a trailing coda with the onset of the next
/// syllable when the two phonologically agree (simplified: only when the
/// following syllable has no onset consonant of its own, i.e. starts with
/// the filler consonant `ㅇ`), matching the `Match::NORMALIZE_CODA` option.
pub fn normalize(text: &str, normalize_coda: bool) -> Normalized {
    let chars: Vec<char> = text.chars().collect();
    let mut jamo = Vec::with_capacity(chars.len() * 2);
    let mut position_map = Vec::with_capacity(chars.len() * 2);

    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match decompose_syllable(c) {
            Some((onset, vowel, coda)) => {
                jamo.push(onset);
                position_map.push(i as u32);
                jamo.push(vowel);
                position_map.push(i as u32);
                if let Some(coda_jamo) = coda {
                    if normalize_coda {
                        if let Some(moved) = try_merge_coda_to_next(coda_jamo, &chars, i) {
                            jamo.push(moved);
                            position_map.push(i as u32);
                        } else {
                            jamo.push(coda_jamo);
                            position_map.push(i as u32);
                        }
                    } else {
                        jamo.push(coda_jamo);
                        position_map.push(i as u32);
                    }
                }
            }
            None => {
                jamo.push(c as u32 as JamoChar);
                position_map.push(i as u32);
            }
        }
        i += 1;
    }

    Normalized { jamo, position_map }
}

/// Const `ㅇ` onset jamo — the "filler" consonant that carries no sound;
/// a syllable beginning with it is a candidate for coda-merging.
const FILLER_ONSET: u32 = L_BASE + 11;

fn try_merge_coda_to_next(coda: JamoChar, chars: &[char], i: usize) -> Option<JamoChar> {
    let next = *chars.get(i + 1)?;
    let (onset, _, _) = decompose_syllable(next)?;
    if onset as u32 == FILLER_ONSET {
        Some(coda)
    } else {
        None
    }
}

/// Detects a "zombie coda" appendage: a stray emotive consonant (`ㅋ`,
/// `ㅎ`) immediately following a full syllable, e.g. `ㅋㅋㅋ` trailing text.
/// Used by the lattice builder's z_coda shortcut (spec.md §4.7).
pub fn is_z_coda_candidate(c: char) -> bool {
    matches!(c, 'ㅋ' | 'ㅎ' | 'ㅠ' | 'ㅜ')
}

/// Inverse of [`decompose_syllable`]: composes an onset/vowel/optional-coda
/// jamo triple back into one precomposed Hangul syllable, following the
/// standard Unicode composition formula (cross-checked against
/// `examples/atcupps-hangul-cd/lib/src/compose.rs`'s `BlockComposer`, which
/// builds up the same triple incrementally as a user types).
pub fn compose_syllable(onset: JamoChar, vowel: JamoChar, coda: Option<JamoChar>) -> Option<char> {
    let l = (onset as u32).checked_sub(L_BASE)?;
    let v = (vowel as u32).checked_sub(V_BASE)?;
    let t = match coda {
        Some(c) => (c as u32).checked_sub(T_BASE)?,
        None => 0,
    };
    if l >= 19 || v >= V_COUNT || t >= T_COUNT {
        return None;
    }
    char::from_u32(S_BASE + (l * V_COUNT + v) * T_COUNT + t)
}

/// Recomposes a jamo-level buffer back into a surface string: runs of
/// onset-vowel(-coda) jamo are merged into their precomposed syllable;
/// any jamo that doesn't fit that shape (a bare coda left over from a
/// split morpheme, a non-Hangul passthrough char) is emitted as-is.
pub fn recompose(jamo: &[JamoChar]) -> String {
    let mut out = String::with_capacity(jamo.len());
    let mut i = 0usize;
    while i < jamo.len() {
        let is_onset = |c: JamoChar| (L_BASE..L_BASE + 19).contains(&(c as u32));
        let is_vowel = |c: JamoChar| (V_BASE..V_BASE + V_COUNT).contains(&(c as u32));
        let is_coda = |c: JamoChar| (T_BASE + 1..T_BASE + T_COUNT).contains(&(c as u32));

        if is_onset(jamo[i]) && i + 1 < jamo.len() && is_vowel(jamo[i + 1]) {
            let onset = jamo[i];
            let vowel = jamo[i + 1];
            let coda = if i + 2 < jamo.len() && is_coda(jamo[i + 2]) { Some(jamo[i + 2]) } else { None };
            match compose_syllable(onset, vowel, coda) {
                Some(ch) => {
                    out.push(ch);
                    i += if coda.is_some() { 3 } else { 2 };
                    continue;
                }
                None => {}
            }
        }

        if let Some(ch) = char::from_u32(jamo[i] as u32) {
            out.push(ch);
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_full_syllable() {
        // 안 = ㅇ + ㅏ + ㄴ
        let (onset, vowel, coda) = decompose_syllable('안').unwrap();
        assert_eq!(onset, (L_BASE + 11) as JamoChar); // ㅇ
        assert_eq!(vowel, (V_BASE + 0) as JamoChar); // ㅏ
        assert_eq!(coda, Some((T_BASE + 4) as JamoChar)); // ㄴ
    }

    #[test]
    fn decomposes_syllable_without_coda() {
        let (_, _, coda) = decompose_syllable('가').unwrap();
        assert_eq!(coda, None);
    }

    #[test]
    fn non_hangul_passes_through() {
        assert_eq!(decompose_syllable('A'), None);
        assert_eq!(decompose_syllable('1'), None);
    }

    #[test]
    fn normalize_preserves_position_map_length() {
        let n = normalize("안녕! a", false);
        assert_eq!(n.jamo.len(), n.position_map.len());
        // '안' -> 3 jamo, '녕' -> 3 jamo, '!' -> 1, ' ' -> 1, 'a' -> 1 = 9
        assert_eq!(n.jamo.len(), 9);
        assert_eq!(n.position_map[0], 0);
        assert_eq!(n.position_map[3], 1);
        assert_eq!(n.position_map[6], 2);
    }

    #[test]
    fn normalize_empty_input() {
        let n = normalize("", false);
        assert!(n.is_empty());
    }

    #[test]
    fn position_map_is_monotonic_nondecreasing() {
        let n = normalize("나는 학교에 간다.", false);
        for w in n.position_map.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn compose_is_inverse_of_decompose() {
        for ch in ['안', '가', '값', '뷁'] {
            let (onset, vowel, coda) = decompose_syllable(ch).unwrap();
            assert_eq!(compose_syllable(onset, vowel, coda), Some(ch));
        }
    }

    #[test]
    fn recompose_round_trips_full_decomposition() {
        let text = "한국어를 분석합니다";
        let normalized = normalize(text, false);
        assert_eq!(recompose(&normalized.jamo), text);
    }

    #[test]
    fn recompose_passes_through_bare_coda() {
        // a lone coda jamo with no preceding onset/vowel (e.g. a split
        // morpheme chunk) is emitted as its own code point rather than
        // silently dropped.
        let coda_only = [(T_BASE + 4) as JamoChar];
        let s = recompose(&coda_only);
        assert_eq!(s.chars().count(), 1);
    }
}
