//! # hangul-morph
//!
//! Pure Rust Korean morphological analyzer: jamo normalization, a
//! dictionary trie, a Kneser-Ney n-gram language model, and a Viterbi
//! path search over the resulting lattice, wrapped in a small analyzer
//! façade with a dedicated worker pool for batch/async use.
//!
//! ## Example
//!
//! ```no_run
//! use hangul_morph::{Analyzer, AnalyzeOption, BuildOption};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("model.bin")?;
//! let analyzer = Analyzer::new(file, 4, BuildOption::default())?;
//! let option = AnalyzeOption::default();
//! let results = analyzer.analyze("한국어를 분석합니다", &option)?;
//! for token in &results[0].tokens {
//!     println!("{}/{:?}", token.form, token.tag);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod assemble;
pub mod error;
pub mod feature;
pub mod form;
pub mod invariants;
pub mod jamo;
pub mod lattice;
pub mod lm;
pub mod model;
pub mod morpheme;
pub mod path;
pub mod trie;
pub mod types;

pub use analyzer::{Analyzer, AnalyzeStream, AnalysisFuture, Scratch};
pub use error::{Error, Result};
pub use form::{Form, FormStore};
pub use jamo::{JamoChar, Normalized};
pub use lattice::{GraphNode, Lattice, NodeId};
pub use lm::LangModel;
pub use model::{load_model, LoadedModel};
pub use morpheme::{FormId, Morpheme, MorphId, MorphemeStore};
pub use path::{PathResult, ScoreRules};
pub use trie::FrozenTrie;
pub use types::{AnalyzeOption, BuildOption, CondPolarity, CondVowel, Dialect, Match, PosTag, TokenInfo, TokenResult};
