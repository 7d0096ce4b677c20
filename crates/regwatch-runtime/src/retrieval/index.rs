//! Vector index over document chunks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use regwatch_core::DocumentChunk;

use super::embedder::{cosine_similarity, Embedder};
use super::RetrievalError;

/// Free-form key/value metadata attached to indexed chunks.
pub type Metadata = BTreeMap<String, String>;

/// A chunk returned by [`VectorIndex::query`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChunkMatch {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,

    /// Cosine similarity to the query
    pub score: f32,

    pub metadata: Metadata,

    pub indexed_at: DateTime<Utc>,
}

/// Storage of embedded chunks, keyed by `(document_id, chunk_index)`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert one chunk.
    async fn add(&self, chunk: &DocumentChunk, metadata: &Metadata) -> Result<(), RetrievalError>;

    /// Replace every chunk of `document_id` with `chunks`.
    ///
    /// Entries at the same key are overwritten and chunks beyond the new
    /// count are removed, so indexing a document twice leaves one copy.
    async fn add_batch(
        &self,
        document_id: &str,
        chunks: &[DocumentChunk],
        metadata: &Metadata,
    ) -> Result<(), RetrievalError>;

    /// The `k` chunks most similar to `text`, best first, optionally only
    /// from `document_id`.
    async fn query(
        &self,
        text: &str,
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ChunkMatch>, RetrievalError>;

    /// Drop every chunk of a document; returns how many were removed.
    fn remove_document(&self, document_id: &str) -> usize;

    /// Number of stored chunks.
    fn len(&self) -> usize;

    /// Number of stored documents.
    fn document_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
    indexed_at: DateTime<Utc>,
}

type ChunkKey = (String, usize);

/// Write order of a document; the sequence breaks timestamp ties.
type Age = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct IndexState {
    entries: BTreeMap<ChunkKey, IndexEntry>,
    documents: BTreeMap<String, Age>,
    next_seq: u64,
}

impl IndexState {
    fn touch(&mut self, document_id: &str, at: DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.documents.insert(document_id.to_string(), (at, seq));
    }

    fn remove(&mut self, document_id: &str) -> usize {
        self.documents.remove(document_id);
        let keys: Vec<ChunkKey> = self
            .entries
            .range(document_range(document_id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        keys.len()
    }

    /// Drop the least recently indexed documents beyond `capacity`.
    fn evict_beyond(&mut self, capacity: usize) {
        while self.documents.len() > capacity {
            let Some(oldest) = self
                .documents
                .iter()
                .min_by_key(|(_, age)| **age)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            let chunks = self.remove(&oldest);
            debug!(document_id = %oldest, chunks, "Evicted document from index");
        }
    }
}

/// Key range covering every chunk of one document.
fn document_range(document_id: &str) -> std::ops::RangeInclusive<ChunkKey> {
    (document_id.to_string(), 0)..=(document_id.to_string(), usize::MAX)
}

/// Process-local [`VectorIndex`].
///
/// With a document capacity, storing a new document beyond it evicts the
/// documents indexed longest ago.
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    max_documents: Option<usize>,
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Index without a document limit.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            max_documents: None,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Index holding at most `max_documents` documents (at least one).
    pub fn with_capacity(embedder: Arc<dyn Embedder>, max_documents: usize) -> Self {
        Self {
            max_documents: Some(max_documents.max(1)),
            ..Self::new(embedder)
        }
    }

    pub fn max_documents(&self) -> Option<usize> {
        self.max_documents
    }

    /// Embed `chunks`, checking the embedder returned one vector per chunk.
    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    fn enforce_capacity(&self, state: &mut IndexState) {
        if let Some(capacity) = self.max_documents {
            state.evict_beyond(capacity);
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, chunk: &DocumentChunk, metadata: &Metadata) -> Result<(), RetrievalError> {
        let embedding = self
            .embed_chunks(std::slice::from_ref(chunk))
            .await?
            .pop()
            .unwrap_or_default();
        let now = Utc::now();

        let mut state = self.state.write();
        state.entries.insert(
            (chunk.document_id.clone(), chunk.chunk_index),
            IndexEntry {
                text: chunk.text.clone(),
                metadata: metadata.clone(),
                embedding,
                indexed_at: now,
            },
        );
        state.touch(&chunk.document_id, now);
        self.enforce_capacity(&mut state);
        Ok(())
    }

    async fn add_batch(
        &self,
        document_id: &str,
        chunks: &[DocumentChunk],
        metadata: &Metadata,
    ) -> Result<(), RetrievalError> {
        if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
            return Err(RetrievalError::Index(format!(
                "chunk of '{}' in batch for '{}'",
                stray.document_id, document_id
            )));
        }

        // Embed before taking the lock; the write below is all-or-nothing.
        let embeddings = self.embed_chunks(chunks).await?;
        let now = Utc::now();

        let mut state = self.state.write();
        state.remove(document_id);
        if chunks.is_empty() {
            return Ok(());
        }
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            state.entries.insert(
                (document_id.to_string(), chunk.chunk_index),
                IndexEntry {
                    text: chunk.text.clone(),
                    metadata: metadata.clone(),
                    embedding,
                    indexed_at: now,
                },
            );
        }
        state.touch(document_id, now);
        self.enforce_capacity(&mut state);
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ChunkMatch>, RetrievalError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("no embedding for query".to_string()))?;

        let state = self.state.read();
        let candidates: Box<dyn Iterator<Item = (&ChunkKey, &IndexEntry)>> = match document_id {
            Some(id) => Box::new(state.entries.range(document_range(id))),
            None => Box::new(state.entries.iter()),
        };

        // Score everything, clone only the winners.
        let mut scored: Vec<(f32, &ChunkKey, &IndexEntry)> = candidates
            .map(|(key, entry)| (cosine_similarity(&query, &entry.embedding), key, entry))
            .collect();
        // Stable sort keeps key order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, (document_id, chunk_index), entry)| ChunkMatch {
                document_id: document_id.clone(),
                chunk_index: *chunk_index,
                text: entry.text.clone(),
                score,
                metadata: entry.metadata.clone(),
                indexed_at: entry.indexed_at,
            })
            .collect())
    }

    fn remove_document(&self, document_id: &str) -> usize {
        self.state.write().remove(document_id)
    }

    fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }
}
