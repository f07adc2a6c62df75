//! Data shapes produced by the pipeline
//!
//! The parser produces statement lists, the densifier turns them into a
//! [`DenseTree`], and the extractor reduces that to a [`SemanticSummary`].

mod dense;
mod summary;

pub use dense::*;
pub use summary::*;
