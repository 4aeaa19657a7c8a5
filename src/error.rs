//! Ambient error stack (SPEC_FULL.md §7).
//!
//! Grounded on the teacher's `src/lib.rs` `Error` enum shape
//! (`#[derive(Debug, thiserror::Error)] pub enum Error`), narrowed to the
//! four failure classes this crate actually surfaces.

/// Top-level error type returned by every fallible public entry point.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("invalid analyze option: {0}")]
    InvalidOption(String),
    #[error("internal analyzer error: {0}")]
    AnalyzerInternal(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
