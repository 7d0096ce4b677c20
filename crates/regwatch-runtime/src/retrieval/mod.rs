//! Semantic retrieval of document passages.
//!
//! Documents are chunked, embedded and stored in a [`VectorIndex`]; the
//! adjudicator asks for the passages closest to a rule and adds them to
//! its prompt. Retrieval is advisory: it never changes a verdict, and every
//! failure degrades to "no passages".

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use regwatch_core::{chunk_spans, ChunkConfig};

use crate::config::RetrievalSettings;

mod embedder;
mod index;
#[cfg(feature = "onnx")]
mod onnx;

pub use embedder::{cosine_similarity, l2_normalize, Embedder, HashingEmbedder, HASHING_EMBEDDER_DIM};
pub use index::{ChunkMatch, InMemoryVectorIndex, Metadata, VectorIndex};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;

/// Errors from embedding or index backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Embedding model unavailable: {0}")]
    Model(String),
}

/// Embedder selected by `settings`.
///
/// A configured `model_dir` loads the sentence-transformers model from it
/// and fails if that is impossible. Without one, the local
/// [`HashingEmbedder`] is used.
pub fn build_embedder(settings: &RetrievalSettings) -> Result<Arc<dyn Embedder>, RetrievalError> {
    let Some(dir) = &settings.model_dir else {
        debug!("No embedding model configured, using hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new()));
    };

    #[cfg(feature = "onnx")]
    {
        let embedder = OnnxEmbedder::load(dir)?;
        info!(model_dir = %dir.display(), dim = embedder.dim(), "Using ONNX sentence embedder");
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(RetrievalError::Model(format!(
            "{} is configured but regwatch was built without the `onnx` feature",
            dir.display()
        )))
    }
}

/// Chunks, indexes and queries documents.
pub struct SemanticRetriever {
    index: Arc<dyn VectorIndex>,
    chunk_config: ChunkConfig,
}

impl SemanticRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, chunk_config: ChunkConfig) -> Self {
        Self { index, chunk_config }
    }

    /// Retriever backed by a [`HashingEmbedder`] and an unbounded [`InMemoryVectorIndex`].
    pub fn in_memory(chunk_config: ChunkConfig) -> Self {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new());
        Self::new(Arc::new(InMemoryVectorIndex::new(embedder)), chunk_config)
    }

    /// In-memory retriever with the embedder and document capacity from `settings`.
    pub fn from_settings(
        settings: &RetrievalSettings,
        chunk_config: ChunkConfig,
    ) -> Result<Self, RetrievalError> {
        let embedder = build_embedder(settings)?;
        info!(
            max_documents = settings.max_documents,
            dim = embedder.dim(),
            "Semantic retrieval enabled"
        );
        let index = match settings.max_documents {
            0 => InMemoryVectorIndex::new(embedder),
            max => InMemoryVectorIndex::with_capacity(embedder, max),
        };
        Ok(Self::new(Arc::new(index), chunk_config))
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Chunk and index a document, replacing any earlier copy.
    ///
    /// Returns the number of chunks stored; 0 on failure.
    pub async fn index_document(&self, document_id: &str, text: &str, metadata: &Metadata) -> usize {
        let chunks = chunk_spans(document_id, text, &self.chunk_config);
        match self.index.add_batch(document_id, &chunks, metadata).await {
            Ok(()) => {
                debug!(document_id, chunks = chunks.len(), "Indexed document");
                chunks.len()
            }
            Err(e) => {
                warn!(document_id, error = %e, "Indexing failed, continuing without retrieval");
                0
            }
        }
    }

    /// Text of the `k` passages most relevant to `query`.
    pub async fn relevant_passages(&self, query: &str, k: usize) -> Vec<String> {
        self.relevant_passages_in(None, query, k).await
    }

    /// Like [`relevant_passages`](Self::relevant_passages), restricted to one document.
    pub async fn relevant_passages_in(
        &self,
        document_id: Option<&str>,
        query: &str,
        k: usize,
    ) -> Vec<String> {
        if k == 0 {
            return Vec::new();
        }

        match self.index.query(query, k, document_id).await {
            Ok(matches) => matches
                .into_iter()
                .filter(|m| m.score > 0.0)
                .map(|m| m.text)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Retrieval query failed, continuing without passages");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Err(RetrievalError::Embedding("model unavailable".to_string()))
        }

        fn dim(&self) -> usize {
            4
        }
    }

    fn retriever() -> SemanticRetriever {
        SemanticRetriever::in_memory(ChunkConfig::new(40, 10).unwrap())
    }

    #[tokio::test]
    async fn test_index_and_retrieve() {
        let retriever = retriever();
        let text = "Patient records are stored without encryption. \
                    The cafeteria menu changes every week. \
                    Quarterly revenue is reported to the board.";
        let stored = retriever.index_document("doc-1", text, &Metadata::new()).await;
        assert!(stored > 1);

        let passages = retriever.relevant_passages("encryption of patient records", 1).await;
        assert_eq!(passages.len(), 1);
        assert!(passages[0].contains("encryption") || passages[0].contains("Patient"));
    }

    #[tokio::test]
    async fn test_restricted_to_document() {
        let retriever = retriever();
        retriever.index_document("doc-1", "patient records", &Metadata::new()).await;
        retriever.index_document("doc-2", "patient records too", &Metadata::new()).await;

        let passages = retriever
            .relevant_passages_in(Some("doc-2"), "patient records", 5)
            .await;
        assert_eq!(passages, vec!["patient records too"]);
    }

    #[tokio::test]
    async fn test_unrelated_query_yields_nothing() {
        let retriever = retriever();
        retriever.index_document("doc-1", "alpha beta", &Metadata::new()).await;
        assert!(retriever.relevant_passages("", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let index = Arc::new(InMemoryVectorIndex::new(Arc::new(BrokenEmbedder)));
        let retriever = SemanticRetriever::new(index, ChunkConfig::default());

        assert_eq!(retriever.index_document("doc-1", "text", &Metadata::new()).await, 0);
        assert!(retriever.relevant_passages("text", 3).await.is_empty());
    }

    #[test]
    fn test_default_embedder_is_hashing() {
        let embedder = build_embedder(&RetrievalSettings::default()).unwrap();
        assert_eq!(embedder.dim(), HASHING_EMBEDDER_DIM);
    }

    #[test]
    fn test_configured_model_dir_must_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RetrievalSettings {
            model_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(build_embedder(&settings), Err(RetrievalError::Model(_))));
        assert!(SemanticRetriever::from_settings(&settings, ChunkConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_index_stays_within_document_capacity() {
        let settings = RetrievalSettings {
            max_documents: 3,
            ..Default::default()
        };
        let retriever =
            SemanticRetriever::from_settings(&settings, ChunkConfig::new(40, 10).unwrap()).unwrap();

        for i in 0..10 {
            let doc = format!("doc-{i}");
            retriever
                .index_document(&doc, &format!("patient record number {i}"), &Metadata::new())
                .await;
        }

        assert_eq!(retriever.index().document_count(), 3);
        assert!(retriever
            .relevant_passages_in(Some("doc-0"), "patient record", 3)
            .await
            .is_empty());
        assert_eq!(
            retriever.relevant_passages_in(Some("doc-9"), "patient record", 3).await,
            vec!["patient record number 9"]
        );
    }

    #[tokio::test]
    async fn test_unbounded_when_capacity_is_zero() {
        let settings = RetrievalSettings {
            max_documents: 0,
            ..Default::default()
        };
        let retriever = SemanticRetriever::from_settings(&settings, ChunkConfig::default()).unwrap();
        for i in 0..5 {
            retriever
                .index_document(&format!("doc-{i}"), "text", &Metadata::new())
                .await;
        }
        assert_eq!(retriever.index().document_count(), 5);
    }
}
