//! Report formatters for run outcomes.
//!
//! - [`text`]: human-readable listing with a summary footer
//! - [`json`]: a single JSON document for scripting

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError, JsonSimilarityOutput};
