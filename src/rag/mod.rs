//! Retrieval over the knowledge corpus.
//!
//! - `chunker`: builds the corpus text and splits it into overlapping chunks
//! - `index`: embeds chunks once and answers nearest-neighbour queries
//! - `retrieval`: query-time embedding plus top-k lookup

pub mod chunker;
pub mod index;
pub mod retrieval;

pub use chunker::{build_corpus, TextChunk, TextSplitter};
pub use index::{IndexBuildError, VectorIndex};
pub use retrieval::{RetrievedChunk, Retriever};
