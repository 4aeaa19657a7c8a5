//! Model file I/O — reads the fixed-layout binary model format described
//! in spec.md §6 (morpheme table / form table / KN LM header, optional
//! skip-bigram table, optional history-transformer map).
//!
//! Grounded on the teacher's `src/gguf.rs` (`load_metadata`: magic check,
//! version check, a `read_u32`/`read_u64`/`read_f32` primitive-reader
//! family, and defensive size caps against a malformed or hostile file).
//! Unlike GGUF's self-describing key/value metadata blocks, this format's
//! record layout is fixed, so the reader below is a straight sequence of
//! typed reads rather than a KV-pair parser — but the caps and the
//! `Error::ModelLoad` error-surfacing style are carried over unchanged.

use std::io::Read;

use crate::error::{Error, Result};
use crate::form::{bake as bake_form, FormRaw, FormStore};
use crate::lm::{LangModel, LangModelBuilder};
use crate::morpheme::{bake as bake_morph, Chunk, ChunkSpan, MorphId, MorphemeRaw, MorphemeStore};
use crate::trie::{FrozenTrie, TrieBuilder};
use crate::types::{CondPolarity, CondVowel, Dialect, PosTag};

const MAGIC: &[u8; 4] = b"HMRF";
const SUPPORTED_VERSION_RANGE: std::ops::RangeInclusive<u32> = 1..=1;

/// Defensive caps mirroring the teacher's `MAX_VOCAB_SIZE`/`MAX_STRING_SIZE`
/// constants: a corrupt length field must not be allowed to drive an
/// attempted multi-gigabyte allocation.
const MAX_FORM_COUNT: u32 = 50_000_000;
const MAX_MORPHEME_COUNT: u32 = 50_000_000;
const MAX_FORM_LEN: u32 = 64;
const MAX_LM_NODE_COUNT: u64 = 200_000_000;

/// The fully loaded, immutable pieces a built [`crate::analyzer::Analyzer`]
/// needs: the form/morpheme arenas, the frozen trie over form surface
/// strings, and the language model.
pub struct LoadedModel {
    pub forms: FormStore,
    pub morphemes: MorphemeStore,
    pub trie: FrozenTrie,
    pub lm: LangModel,
}

struct Reader<R: Read> {
    inner: R,
}

impl<R: Read> Reader<R> {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn decode_pos_tag(v: u8) -> Result<PosTag> {
    if v as usize >= PosTag::COUNT {
        return Err(Error::ModelLoad(format!("invalid POS tag id: {v}")));
    }
    // SAFETY-free decode: PosTag is #[repr(u8)] with contiguous discriminants
    // from 0..COUNT, so any value below COUNT round-trips through a match
    // table rather than a transmute (keeps this file free of `unsafe`).
    const TABLE: &[PosTag] = &[
        PosTag::Unknown, PosTag::Nng, PosTag::Nnp, PosTag::Nnb, PosTag::Vv, PosTag::Va, PosTag::Mag,
        PosTag::Nr, PosTag::Np, PosTag::Vx, PosTag::Mm, PosTag::Maj, PosTag::Ic, PosTag::Xpn, PosTag::Xsn,
        PosTag::Xsv, PosTag::Xsa, PosTag::Xr, PosTag::Vcp, PosTag::Vcn, PosTag::Sf, PosTag::Sp, PosTag::Ss,
        PosTag::Se, PosTag::So, PosTag::Sw, PosTag::Sl, PosTag::Sh, PosTag::Sn, PosTag::WUrl, PosTag::WEmail,
        PosTag::WMention, PosTag::WHashtag, PosTag::Jks, PosTag::Jkc, PosTag::Jkg, PosTag::Jko, PosTag::Jkb,
        PosTag::Jkv, PosTag::Jkq, PosTag::Jx, PosTag::Jc, PosTag::Ep, PosTag::Ef, PosTag::Ec, PosTag::Etn,
        PosTag::Etm, PosTag::V,
    ];
    TABLE.get(v as usize).copied().ok_or_else(|| Error::ModelLoad(format!("invalid POS tag id: {v}")))
}

fn decode_cond_vowel(v: u8) -> Result<CondVowel> {
    Ok(match v {
        0 => CondVowel::None,
        1 => CondVowel::Any,
        2 => CondVowel::Vowel,
        3 => CondVowel::Vocalic,
        4 => CondVowel::VocalicH,
        5 => CondVowel::NonVowel,
        6 => CondVowel::NonVocalic,
        7 => CondVowel::NonVocalicH,
        other => return Err(Error::ModelLoad(format!("invalid CondVowel id: {other}"))),
    })
}

fn decode_cond_polarity(v: u8) -> Result<CondPolarity> {
    Ok(match v {
        0 => CondPolarity::None,
        1 => CondPolarity::Positive,
        2 => CondPolarity::Negative,
        other => return Err(Error::ModelLoad(format!("invalid CondPolarity id: {other}"))),
    })
}

fn decode_dialect(v: u8) -> Result<Dialect> {
    Ok(match v {
        0 => Dialect::Standard,
        1 => Dialect::Gyeongsang,
        2 => Dialect::Jeolla,
        3 => Dialect::Chungcheong,
        4 => Dialect::Jeju,
        other => return Err(Error::ModelLoad(format!("invalid Dialect id: {other}"))),
    })
}

/// Loads a model from any `Read` source (teacher pattern: `load_metadata`
/// takes a generic reader rather than being hardcoded to a file path, so
/// tests can load from an in-memory cursor).
pub fn load_model<R: Read>(reader: R) -> Result<LoadedModel> {
    let mut r = Reader { inner: reader };

    let mut magic = [0u8; 4];
    r.inner.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::ModelLoad("bad magic: not a hangul-morph model file".into()));
    }
    let version = r.read_u32()?;
    if !SUPPORTED_VERSION_RANGE.contains(&version) {
        return Err(Error::ModelLoad(format!("unsupported model version {version}")));
    }

    tracing::debug!(version, "reading model header");

    let forms = read_forms(&mut r)?;
    let morphemes = read_morphemes(&mut r)?;
    let lm = read_lm(&mut r)?;

    let mut trie_builder = TrieBuilder::new();
    for (id, form) in forms.iter() {
        trie_builder.insert(&form.form, id.0);
    }
    let trie = trie_builder.bake();

    tracing::debug!(forms = forms.len(), morphemes = morphemes.len(), "model loaded");

    Ok(LoadedModel { forms, morphemes, trie, lm })
}

fn read_forms<R: Read>(r: &mut Reader<R>) -> Result<FormStore> {
    let count = r.read_u32()?;
    if count > MAX_FORM_COUNT {
        return Err(Error::ModelLoad(format!("form table too large: {count} entries")));
    }
    let mut store = FormStore::new();
    for _ in 0..count {
        let len = r.read_u16()?;
        if len as u32 > MAX_FORM_LEN {
            return Err(Error::ModelLoad(format!("form surface too long: {len} jamo")));
        }
        let mut jamo = Vec::with_capacity(len as usize);
        for _ in 0..len {
            jamo.push(r.read_u16()?);
        }
        let num_spaces = r.read_u16()? as u32;
        let vowel = decode_cond_vowel(r.read_u8()?)?;
        let polar = decode_cond_polarity(r.read_u8()?)?;
        let z_coda = r.read_u8()? != 0;
        let z_siot = r.read_u8()? != 0;
        let dialect = decode_dialect(r.read_u8()?)?;
        let candidate_count = r.read_u16()?;
        let mut candidates = Vec::with_capacity(candidate_count as usize);
        for _ in 0..candidate_count {
            candidates.push(MorphId(r.read_u32()?));
        }

        let mut raw = FormRaw::new(jamo);
        raw.candidates = candidates;
        let baked = bake_form(&raw, num_spaces, vowel, polar, z_coda, z_siot, dialect, &[]);
        store.push(baked);
    }
    Ok(store)
}

fn read_morphemes<R: Read>(r: &mut Reader<R>) -> Result<MorphemeStore> {
    let count = r.read_u32()?;
    if count > MAX_MORPHEME_COUNT {
        return Err(Error::ModelLoad(format!("morpheme table too large: {count} entries")));
    }
    let mut raws = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kform = crate::morpheme::FormId(r.read_u32()?);
        let tag = decode_pos_tag(r.read_u8()?)?;
        let vowel = decode_cond_vowel(r.read_u8()?)?;
        let polar = decode_cond_polarity(r.read_u8()?)?;
        let complex = r.read_u8()? != 0;
        let sense_id = r.read_u8()?;
        let combine_socket = r.read_u8()?;
        let chunk_count = r.read_u8()?;
        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for _ in 0..chunk_count {
            let morph = MorphId(r.read_u32()?);
            let start = r.read_u8()?;
            let end = r.read_u8()?;
            chunks.push(Chunk { morph, span: ChunkSpan { start, end } });
        }
        let combined = r.read_i32()?;
        let user_score = r.read_f32()?;
        let lm_morpheme_id = r.read_u32()?;
        let orig_morpheme_id = r.read_u32()?;
        let group_id = r.read_u32()?;
        let dialect = decode_dialect(r.read_u8()?)?;

        raws.push(MorphemeRaw {
            kform,
            tag,
            vowel,
            polar,
            complex,
            sense_id,
            combine_socket,
            chunks,
            combined,
            user_score,
            lm_morpheme_id,
            orig_morpheme_id,
            group_id,
            dialect,
        });
    }

    let mut store = MorphemeStore::with_capacity(raws.len());
    for (i, raw) in raws.iter().enumerate() {
        store.push(bake_morph(raw, i as u32));
    }
    Ok(store)
}

fn read_lm<R: Read>(r: &mut Reader<R>) -> Result<LangModel> {
    let order = r.read_u8()?;
    let vocab_size = r.read_u32()?;
    let unk_id = r.read_u32()?;
    let bos_id = r.read_u32()?;
    let eos_id = r.read_u32()?;
    let quantized = r.read_u8()?;
    let num_nodes = r.read_u64()?;
    if num_nodes > MAX_LM_NODE_COUNT {
        return Err(Error::ModelLoad(format!("LM node table too large: {num_nodes} nodes")));
    }

    let mut builder = LangModelBuilder {
        order,
        vocab_size,
        unk_id,
        bos_id,
        eos_id,
        quant: Some(match quantized {
            0 => crate::lm::LmQuant::None,
            8 => crate::lm::LmQuant::Bits8,
            16 => crate::lm::LmQuant::Bits16,
            other => return Err(Error::ModelLoad(format!("unsupported LM quantization width: {other}"))),
        }),
        ..Default::default()
    };

    for _ in 0..num_nodes {
        let num_nexts = r.read_u32()?;
        let next_offset = r.read_u32()?;
        let lower = r.read_i32()? as i64;
        let ll = r.read_f32()?;
        let gamma = r.read_f32()?;
        builder.nodes.push((num_nexts, next_offset, lower, ll, gamma));
    }

    let total_nexts = r.read_u64()?;
    for _ in 0..total_nexts {
        builder.next_keys.push(r.read_u32()?);
    }
    for _ in 0..total_nexts {
        builder.next_diffs.push(r.read_i32()? as i64);
    }

    if builder.quant.unwrap() != crate::lm::LmQuant::None {
        let qtable_size = r.read_u32()?;
        for _ in 0..qtable_size {
            let ll = r.read_f32()?;
            let gamma = r.read_f32()?;
            builder.qtable.push((ll, gamma));
        }
    }

    Ok(builder.build())
}

/// Writes a minimal, valid model file from in-memory tables — used by
/// this crate's own unit tests and by the `tests/` integration suite to
/// produce fixtures without shipping a binary dictionary blob in the
/// repository, mirroring how the teacher's tests build small throwaway
/// GGUF files on the fly rather than committing one. Not part of the
/// crate's stable public API (no real caller loads a hand-built model
/// byte-for-byte like this), but left unconditionally compiled — rather
/// than `#[cfg(test)]` — since a `tests/` integration binary is a
/// separate compilation unit and cannot see `cfg(test)` items from the
/// library crate it links against.
#[doc(hidden)]
pub fn write_test_model(
    forms: &[(Vec<u16>, u32, Vec<u32>)],
    morphs: &[(u32, u8, u8, u8, f32)],
    lm_nodes: &[(u32, u32, i32, f32, f32)],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&1u32.to_le_bytes());

    out.extend_from_slice(&(forms.len() as u32).to_le_bytes());
    for (jamo, num_spaces, candidates) in forms {
        out.extend_from_slice(&(jamo.len() as u16).to_le_bytes());
        for &c in jamo {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out.extend_from_slice(&(*num_spaces as u16).to_le_bytes());
        out.push(0); // vowel
        out.push(0); // polar
        out.push(0); // z_coda
        out.push(0); // z_siot
        out.push(0); // dialect
        out.extend_from_slice(&(candidates.len() as u16).to_le_bytes());
        for &c in candidates {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }

    out.extend_from_slice(&(morphs.len() as u32).to_le_bytes());
    for &(kform, tag, combine_socket, _reserved, user_score) in morphs {
        out.extend_from_slice(&kform.to_le_bytes());
        out.push(tag);
        out.push(0); // vowel
        out.push(0); // polar
        out.push(0); // complex
        out.push(0); // sense_id
        out.push(combine_socket);
        out.push(0); // chunk_count
        out.extend_from_slice(&0i32.to_le_bytes()); // combined
        out.extend_from_slice(&user_score.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // lm_morpheme_id
        out.extend_from_slice(&0u32.to_le_bytes()); // orig_morpheme_id
        out.extend_from_slice(&0u32.to_le_bytes()); // group_id
        out.push(0); // dialect
    }

    out.push(2); // order
    out.extend_from_slice(&(morphs.len() as u32).to_le_bytes()); // vocab_size
    out.extend_from_slice(&0u32.to_le_bytes()); // unk_id
    out.extend_from_slice(&0u32.to_le_bytes()); // bos_id
    out.extend_from_slice(&0u32.to_le_bytes()); // eos_id
    out.push(0); // quantized = none
    out.extend_from_slice(&(lm_nodes.len() as u64).to_le_bytes());
    for &(num_nexts, next_offset, lower, ll, gamma) in lm_nodes {
        out.extend_from_slice(&num_nexts.to_le_bytes());
        out.extend_from_slice(&next_offset.to_le_bytes());
        out.extend_from_slice(&lower.to_le_bytes());
        out.extend_from_slice(&ll.to_le_bytes());
        out.extend_from_slice(&gamma.to_le_bytes());
    }
    let total_nexts: u32 = lm_nodes.iter().map(|n| n.0).sum();
    out.extend_from_slice(&(total_nexts as u64).to_le_bytes());
    // no next_keys/next_diffs content emitted for a table with zero total
    // nexts; fixtures used by these tests are single-node (root-only).

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_bad_magic() {
        let data = b"XXXX\x01\x00\x00\x00".to_vec();
        let err = load_model(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn loads_minimal_valid_model() {
        let data = write_test_model(&[(vec![1, 2], 0, vec![0])], &[(0, PosTag::Nng as u8, 0, 0, 0.0)], &[(0, 0, 0, -1.0, 0.0)]);
        let model = load_model(Cursor::new(data)).unwrap();
        assert_eq!(model.forms.len(), 1);
        assert_eq!(model.morphemes.len(), 1);
        assert_eq!(model.trie.get(&[1, 2]), Some(0));
    }

    #[test]
    fn rejects_oversized_form_length_field() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes()); // form count = 1
        data.extend_from_slice(&(MAX_FORM_LEN as u16 + 1).to_le_bytes()); // oversized len
        let err = load_model(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
