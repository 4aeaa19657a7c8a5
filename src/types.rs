//! Shared data types for the analysis pipeline.
//!
//! Tag names and field shapes are carried over from the Sejong tag set
//! used throughout the Korean NLP ecosystem.

/// A minimal bitflags-style macro: the teacher's dependency stack has no
/// bitflags crate anywhere in this pack slice, and a dozen flags is small
/// enough to hand-roll with plain `const` bit patterns and operator impls.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub $ty);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            pub const fn bits(self) -> $ty {
                self.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: $name) -> $name {
                $name(self.0 & rhs.0)
            }
        }
    };
}

/// Part-of-speech tag (Sejong tag set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum PosTag {
    Unknown = 0,
    Nng,
    Nnp,
    Nnb,
    Vv,
    Va,
    Mag,
    Nr,
    Np,
    Vx,
    Mm,
    Maj,
    Ic,
    Xpn,
    Xsn,
    Xsv,
    Xsa,
    Xr,
    Vcp,
    Vcn,
    Sf,
    Sp,
    Ss,
    Se,
    So,
    Sw,
    Sl,
    Sh,
    Sn,
    WUrl,
    WEmail,
    WMention,
    WHashtag,
    Jks,
    Jkc,
    Jkg,
    Jko,
    Jkb,
    Jkv,
    Jkq,
    Jx,
    Jc,
    Ep,
    Ef,
    Ec,
    Etn,
    Etm,
    /// Marks the left half of a morpheme split for irregular conjugation.
    V,
    /// Sentinel: the number of real tags; never assigned to a morpheme.
    Max,
}

/// The first tag index that is part of the default-tag-per-sentinel table.
pub const DEFAULT_TAG_SIZE: usize = PosTag::Jks as usize;

impl PosTag {
    pub const COUNT: usize = PosTag::Max as usize;

    /// True for the closing-punctuation class that, per spec.md §4.4, causes
    /// the feature tester to ignore vowel/polarity conditions on the next morpheme.
    pub fn is_closing_punctuation(self) -> bool {
        matches!(self, PosTag::Sf | PosTag::Sp | PosTag::Ss | PosTag::Se)
    }

    pub fn is_ending(self) -> bool {
        matches!(self, PosTag::Ep | PosTag::Ef | PosTag::Ec | PosTag::Etn | PosTag::Etm)
    }
}

/// Condition on whether the preceding form ends in a vowel or a particular coda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondVowel {
    None,
    Any,
    Vowel,
    Vocalic,
    VocalicH,
    NonVowel,
    NonVocalic,
    NonVocalicH,
}

/// Vowel-harmony polarity condition on the preceding form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondPolarity {
    None,
    Positive,
    Negative,
}

/// Regional dialect tag carried by forms/morphemes (SPEC_FULL.md §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Standard,
    Gyeongsang,
    Jeolla,
    Chungcheong,
    Jeju,
}

bitflags_like! {
    /// Bits controlling which pattern matchers and normalizations run.
    pub struct Match: u32 {
        const URL = 1 << 0;
        const EMAIL = 1 << 1;
        const HASHTAG = 1 << 2;
        const MENTION = 1 << 3;
        const SERIAL = 1 << 4;
        const EMOJI = 1 << 5;
        const NORMALIZE_CODA = 1 << 6;
        const JOIN_NOUN_PREFIX = 1 << 7;
        const JOIN_NOUN_SUFFIX = 1 << 8;
        const JOIN_VERB_SUFFIX = 1 << 9;
        const JOIN_ADJ_SUFFIX = 1 << 10;
        const JOIN_ADV_SUFFIX = 1 << 11;
        const SPLIT_COMPLEX = 1 << 12;
        const Z_CODA = 1 << 13;
        const COMPATIBLE_JAMO = 1 << 14;
        const SPLIT_SAISIOT = 1 << 15;
        const MERGE_SAISIOT = 1 << 16;
    }
}

impl Match {
    pub const ALL_WITH_NORMALIZING: Match = Match(
        Match::URL.0
            | Match::EMAIL.0
            | Match::HASHTAG.0
            | Match::MENTION.0
            | Match::SERIAL.0
            | Match::EMOJI.0
            | Match::NORMALIZE_CODA.0
            | Match::JOIN_NOUN_PREFIX.0
            | Match::JOIN_NOUN_SUFFIX.0
            | Match::JOIN_VERB_SUFFIX.0
            | Match::JOIN_ADJ_SUFFIX.0
            | Match::JOIN_ADV_SUFFIX.0,
    );
}

impl Default for Match {
    fn default() -> Self {
        Match::ALL_WITH_NORMALIZING
    }
}

bitflags_like! {
    /// Bits controlling builder-time behavior.
    pub struct BuildOption: u32 {
        const INTEGRATE_ALLOMORPH = 1 << 0;
        const LOAD_DEFAULT_DICT = 1 << 1;
        const LOAD_MULTI_DICT = 1 << 2;
    }
}

impl Default for BuildOption {
    fn default() -> Self {
        BuildOption::INTEGRATE_ALLOMORPH | BuildOption::LOAD_DEFAULT_DICT
    }
}

/// A single analyzed morpheme, mapped back to the caller's original offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    /// Surface form as it appears (post allomorph/affix handling).
    pub form: String,
    pub tag: PosTag,
    /// Character offset into the caller's original input.
    pub position: u32,
    /// Length in characters.
    pub length: u16,
    /// Word (whitespace-delimited chunk) index, 0-based.
    pub word_position: u16,
    /// Sentence index within the analyzed text, 0-based.
    pub sent_position: u32,
    /// Sub-sentence index for bulleted/numbered lines (spec.md §4.8 item 7).
    pub sub_sent_position: u32,
    /// Per-token contribution to the path score.
    pub word_score: f32,
    /// Typo cost attributed to this token (spec.md §4.8 item 3).
    pub typo_cost: f32,
    /// Index of this token's paired quote/bracket token, if any.
    pub paired_token: Option<u32>,
}

/// One candidate analysis: its tokens and total path score.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResult {
    pub tokens: Vec<TokenInfo>,
    pub score: f32,
}

/// Options governing a single `analyze` call.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOption {
    pub top_n: usize,
    pub match_options: Match,
    /// Allowed dialect bit mask (SPEC_FULL.md §10); `None` means standard-only.
    pub allowed_dialects: Option<&'static [Dialect]>,
    pub dialect_cost: f32,
}

impl Default for AnalyzeOption {
    fn default() -> Self {
        Self {
            top_n: 1,
            match_options: Match::default(),
            allowed_dialects: None,
            dialect_cost: 3.0,
        }
    }
}
