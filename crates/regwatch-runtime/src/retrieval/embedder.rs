//! Text embedding.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use super::RetrievalError;

/// Dimension of [`HashingEmbedder`] vectors.
pub const HASHING_EMBEDDER_DIM: usize = 384;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"[\p{L}\p{N}]+").unwrap();
}

/// Maps texts to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text; the output has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    /// Length of every vector this embedder returns.
    fn dim(&self) -> usize;
}

/// Local feature-hashing bag-of-words embedder.
///
/// Each lowercased token is hashed (FNV-1a) into a bucket with a hash-derived
/// sign, then the vector is L2-normalized. Lexical only: texts with no token
/// in common score zero. Used when no sentence-transformers model is
/// configured.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::with_dim(HASHING_EMBEDDER_DIM)
    }

    /// A zero `dim` is bumped to 1.
    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in TOKEN.find_iter(text) {
            let hash = fnv1a(token.as_str().to_lowercase().as_bytes());
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// L2-normalize a vector in place.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 when either vector is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_vectors_are_normalized() {
        let embedder = HashingEmbedder::new();
        let vectors = embedder
            .embed(&texts(&["patient records stored unencrypted", "quarterly revenue"]))
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            assert_eq!(v.len(), HASHING_EMBEDDER_DIM);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_deterministic_and_case_insensitive() {
        let embedder = HashingEmbedder::new();
        let a = embedder.embed(&texts(&["Patient Data"])).await.unwrap();
        let b = embedder.embed(&texts(&["patient data"])).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new();
        let v = embedder
            .embed(&texts(&[
                "patient health records encryption",
                "health records of the patient are not encrypted",
                "the quarterly earnings call is on friday",
            ]))
            .await
            .unwrap();

        assert!(cosine_similarity(&v[0], &v[1]) > cosine_similarity(&v[0], &v[2]));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::with_dim(8);
        let v = embedder.embed(&texts(&["  ...  "])).await.unwrap();
        assert_eq!(v[0], vec![0.0; 8]);
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_l2_normalize_leaves_zero_vector() {
        let mut v = vec![0.0f32; 3];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 3]);

        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }
}
