use std::sync::Arc;

use serde::Serialize;

use super::index::VectorIndex;
use crate::llm::{EmbeddingProvider, UpstreamError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_index: usize,
    pub text: String,
    pub distance: f32,
}

#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k: top_k.max(1),
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Embeds `query` and returns the nearest chunks, closest first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, UpstreamError> {
        let mut embedded = self.embedder.embed(&[query.to_string()]).await?;
        let vector = embedded
            .pop()
            .ok_or_else(|| UpstreamError::Malformed("no embedding returned for query".into()))?;
        if vector.len() != self.index.dimensions() {
            return Err(UpstreamError::Malformed(format!(
                "query embedding has dimension {}, index has {}",
                vector.len(),
                self.index.dimensions()
            )));
        }

        let hits: Vec<RetrievedChunk> = self
            .index
            .search(&vector, self.top_k)
            .into_iter()
            .map(|(chunk, distance)| RetrievedChunk {
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                distance,
            })
            .collect();

        tracing::debug!(
            hits = hits.len(),
            best_distance = hits.first().map(|h| h.distance),
            "Retrieved context"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeRecord;
    use crate::llm::HashingEmbedder;
    use crate::rag::chunker::{build_corpus, TextSplitter};

    struct SilentEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for SilentEmbedder {
        fn name(&self) -> &str {
            "silent"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
            Ok(Vec::new())
        }
    }

    async fn retriever(top_k: usize) -> Retriever {
        let records = vec![
            KnowledgeRecord {
                question: "What are the symptoms of chlamydia?".to_string(),
                answer: "Often none, which is why testing matters.".to_string(),
                link: None,
            },
            KnowledgeRecord {
                question: "Where is the clinic?".to_string(),
                answer: "The clinic phone number is 1(869)664-8976.".to_string(),
                link: Some("https://example.org/clinic".to_string()),
            },
            KnowledgeRecord {
                question: "How do condoms help?".to_string(),
                answer: "They lower the risk of infection and pregnancy.".to_string(),
                link: None,
            },
        ];
        let chunks = TextSplitter::new(120, 20).split(&build_corpus(&records));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(256));
        let index = VectorIndex::build(chunks, embedder.as_ref(), 64).await.unwrap();
        Retriever::new(Arc::new(index), embedder, top_k)
    }

    #[tokio::test]
    async fn returns_top_k_nearest_first() {
        let retriever = retriever(2).await;
        let hits = retriever.retrieve("what is the clinic phone number").await.unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("1(869)664-8976"));
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn top_k_larger_than_index_returns_everything() {
        let retriever = retriever(50).await;
        let hits = retriever.retrieve("anything").await.unwrap();
        assert_eq!(hits.len(), retriever.index().len());
    }

    #[tokio::test]
    async fn query_embedding_of_wrong_dimension_is_malformed() {
        let built = retriever(3).await;
        let mismatched = Retriever::new(
            Arc::new(
                VectorIndex::build(
                    built.index().chunks().to_vec(),
                    &HashingEmbedder::new(256),
                    64,
                )
                .await
                .unwrap(),
            ),
            Arc::new(HashingEmbedder::new(64)),
            3,
        );

        let err = mismatched.retrieve("where is the clinic").await.unwrap_err();
        match err {
            UpstreamError::Malformed(msg) => {
                assert!(msg.contains("dimension 64"), "unexpected message: {}", msg);
                assert!(msg.contains("index has 256"), "unexpected message: {}", msg);
            }
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_query_embedding_is_malformed() {
        let built = retriever(3).await;
        let silent = Retriever::new(
            Arc::new(
                VectorIndex::build(
                    built.index().chunks().to_vec(),
                    &HashingEmbedder::new(256),
                    64,
                )
                .await
                .unwrap(),
            ),
            Arc::new(SilentEmbedder),
            3,
        );

        assert!(matches!(
            silent.retrieve("anything").await,
            Err(UpstreamError::Malformed(_))
        ));
    }
}
