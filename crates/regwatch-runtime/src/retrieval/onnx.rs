//! Sentence-transformer embeddings on ONNX Runtime.
//!
//! Loads all-MiniLM-L6-v2 (or any BERT-style sentence-transformers export)
//! from a directory holding `model.onnx` and `tokenizer.json`, mean-pools
//! token embeddings under the attention mask and L2-normalizes the result.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use super::embedder::{l2_normalize, Embedder};
use super::RetrievalError;

/// Token limit of MiniLM-family models.
const MAX_SEQUENCE_LENGTH: usize = 256;

/// Fallback when the model does not declare its output width.
const DEFAULT_DIM: usize = 384;

/// [`Embedder`] backed by a local sentence-transformers model.
///
/// Inference runs on the blocking thread pool; one batch at a time per
/// embedder.
#[derive(Clone)]
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
}

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dim: usize,
}

fn model_error(context: &str, e: impl Display) -> RetrievalError {
    RetrievalError::Model(format!("{context}: {e}"))
}

fn embedding_error(context: &str, e: impl Display) -> RetrievalError {
    RetrievalError::Embedding(format!("{context}: {e}"))
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, RetrievalError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(RetrievalError::Model(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(RetrievalError::Model(format!(
                "tokenizer.json not found in {}",
                model_dir.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| model_error("session builder", e))?
            .commit_from_file(&model_path)
            .map_err(|e| model_error("load model", e))?;
        let dim = session
            .outputs()
            .first()
            .and_then(|output| infer_dim(output.dtype()))
            .unwrap_or(DEFAULT_DIM);

        let mut tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|e| model_error("load tokenizer", e))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| model_error("set truncation", e))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "Loaded embedding model");
        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                dim,
            }),
        })
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed_batch(texts))
            .await
            .map_err(|e| embedding_error("embedding task", e))?
    }

    fn dim(&self) -> usize {
        self.model.dim
    }
}

impl OnnxModel {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let batch_size = texts.len();
        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| embedding_error("tokenize", e))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        // Flat [batch_size, seq_len] inputs.
        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * seq_len;
            for (j, &id) in encoding.get_ids().iter().enumerate() {
                input_ids[offset + j] = i64::from(id);
            }
            for (j, &mask) in encoding.get_attention_mask().iter().enumerate() {
                attention_mask[offset + j] = i64::from(mask);
            }
            for (j, &type_id) in encoding.get_type_ids().iter().enumerate() {
                token_type_ids[offset + j] = i64::from(type_id);
            }
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids = Tensor::from_array((shape, input_ids.into_boxed_slice()))
            .map_err(|e| embedding_error("input tensor", e))?;
        let mask = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))
            .map_err(|e| embedding_error("input tensor", e))?;
        let types = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))
            .map_err(|e| embedding_error("input tensor", e))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => types,
            ])
            .map_err(|e| embedding_error("inference", e))?;

        // Token embeddings: [batch_size, seq_len, dim].
        let (output_shape, output) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| embedding_error("output tensor", e))?;
        let dims: &[i64] = output_shape;
        if dims.len() != 3 || dims[0] as usize != batch_size || dims[2] as usize != self.dim {
            return Err(RetrievalError::Embedding(format!(
                "unexpected output shape {dims:?}, expected [{batch_size}, {seq_len}, {}]",
                self.dim
            )));
        }
        let output_seq_len = dims[1] as usize;

        Ok((0..batch_size)
            .map(|i| {
                mean_pool(
                    &output[i * output_seq_len * self.dim..(i + 1) * output_seq_len * self.dim],
                    &attention_mask[i * seq_len..(i + 1) * seq_len],
                    self.dim,
                )
            })
            .collect())
    }
}

/// Masked mean of `tokens` (row-major `[seq, dim]`), L2-normalized.
fn mean_pool(tokens: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for (row, &m) in tokens.chunks_exact(dim).zip(mask) {
        if m > 0 {
            for (p, x) in pooled.iter_mut().zip(row) {
                *p += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for p in &mut pooled {
            *p /= count;
        }
    }
    l2_normalize(&mut pooled);
    pooled
}

/// Last dimension of the model's first output, if declared.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
