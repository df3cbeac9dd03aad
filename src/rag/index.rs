use std::cmp::Ordering;

use thiserror::Error;

use super::chunker::TextChunk;
use crate::llm::{EmbeddingProvider, UpstreamError};

#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error("knowledge produced no chunks to index")]
    Empty,
    #[error("embedding provider failed: {0}")]
    Embedding(#[from] UpstreamError),
    #[error("embedding shape mismatch: {0}")]
    Shape(String),
}

/// Immutable in-memory vector index over the knowledge chunks.
pub struct VectorIndex {
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
}

impl VectorIndex {
    /// Embeds every chunk once, `batch_size` texts per provider call.
    pub async fn build(
        chunks: Vec<TextChunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, IndexBuildError> {
        if chunks.is_empty() {
            return Err(IndexBuildError::Empty);
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(IndexBuildError::Shape(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
            tracing::debug!(embedded = vectors.len(), total = chunks.len(), "Embedding chunks");
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if dimensions == 0 {
            return Err(IndexBuildError::Shape("empty embedding vectors".to_string()));
        }
        if let Some(position) = vectors.iter().position(|v| v.len() != dimensions) {
            return Err(IndexBuildError::Shape(format!(
                "chunk {} has dimension {}, expected {}",
                position,
                vectors[position].len(),
                dimensions
            )));
        }

        tracing::info!(
            chunks = chunks.len(),
            dimensions,
            provider = embedder.name(),
            "Vector index built"
        );
        Ok(Self {
            chunks,
            vectors,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn chunks(&self) -> &[TextChunk] {
        &self.chunks
    }

    /// Top `k` chunks by cosine distance, nearest first. Ties keep chunk order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(&TextChunk, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, cosine_distance(query, vector)))
            .collect();

        scored.sort_by(|left, right| {
            left.1
                .partial_cmp(&right.1)
                .unwrap_or(Ordering::Equal)
                .then(left.0.cmp(&right.0))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(idx, distance)| (&self.chunks[idx], distance))
            .collect()
    }
}

/// `1 - cosine similarity`; zero vectors count as unrelated.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        return 1.0;
    }
    1.0 - dot / denom
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::llm::HashingEmbedder;
    use crate::rag::chunker::TextSplitter;

    struct FixedEmbedder(Vec<Vec<f32>>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
            Err(UpstreamError::Transport("connection refused".to_string()))
        }
    }

    fn chunks(texts: &[&str]) -> Vec<TextChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| TextChunk {
                index,
                text: text.to_string(),
                start: 0,
                end: text.len(),
                overlap: 0,
            })
            .collect()
    }

    #[test]
    fn cosine_distance_bounds() {
        assert!((cosine_distance(&[1.0, 0.0], &[1.0, 0.0])).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[tokio::test]
    async fn empty_chunk_list_is_rejected() {
        let err = VectorIndex::build(Vec::new(), &HashingEmbedder::new(8), 4)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexBuildError::Empty));
    }

    #[tokio::test]
    async fn provider_failure_is_embedding_error() {
        let err = VectorIndex::build(chunks(&["a"]), &FailingEmbedder, 4)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexBuildError::Embedding(_)));
    }

    #[tokio::test]
    async fn wrong_vector_count_is_shape_error() {
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0]]);
        let err = VectorIndex::build(chunks(&["a", "b"]), &embedder, 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexBuildError::Shape(_)));
    }

    #[tokio::test]
    async fn search_ranks_by_distance_then_chunk_order() {
        let embedder = FixedEmbedder(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]]);
        let index = VectorIndex::build(chunks(&["far", "near-a", "near-b"]), &embedder, 8)
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        let texts: Vec<&str> = hits.iter().map(|(chunk, _)| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["near-a", "near-b"]);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[tokio::test]
    async fn builds_in_batches_over_real_chunks() {
        let corpus = "Question: What is chlamydia?\nAnswer: A common bacterial STI.\n\n\
Question: Where can I get tested?\nAnswer: At the youth clinic on Main Street.";
        let chunks = TextSplitter::new(60, 10).split(corpus);
        let embedder = HashingEmbedder::new(128);
        let index = VectorIndex::build(chunks, &embedder, 1).await.unwrap();

        assert!(index.len() >= 2);
        assert_eq!(index.dimensions(), 128);

        let query = embedder.embed_text("where can I get tested");
        let (best, _) = index.search(&query, 1)[0];
        assert!(best.text.contains("Where can I get tested?"));
    }
}
