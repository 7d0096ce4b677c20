//! Overlapping fixed-size text windows.
//!
//! Windows are measured in characters, never bytes, so a window boundary
//! never splits a code point. Each window starts `size - overlap` characters
//! after the previous one; the final window may be shorter than `size`.

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Invalid chunking parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidChunking { size: usize, overlap: usize },
}

/// Validated window size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

impl ChunkConfig {
    /// Create a chunking configuration.
    ///
    /// `overlap >= size` is rejected because windows would never advance.
    pub fn new(size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if overlap >= size {
            return Err(ConfigError::InvalidChunking { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts.
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// One window of a document.
///
/// Offsets are character positions in the source text, end-exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub offset_start: usize,
    pub offset_end: usize,
}

impl DocumentChunk {
    /// Identifier used by the vector index (`<document_id>_chunk_<index>`).
    pub fn chunk_id(&self) -> String {
        format!("{}_chunk_{}", self.document_id, self.chunk_index)
    }
}

/// Character-offset windows over `text`, as `(start, end)` pairs.
fn windows(char_count: usize, config: &ChunkConfig) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + config.size).min(char_count);
        spans.push((start, end));
        if end >= char_count {
            break;
        }
        start += config.stride();
    }

    spans
}

/// Split `text` into overlapping windows with their offsets.
pub fn chunk_spans(document_id: &str, text: &str, config: &ChunkConfig) -> Vec<DocumentChunk> {
    // Byte offset of every char boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    windows(char_count, config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (start, end))| DocumentChunk {
            document_id: document_id.to_string(),
            chunk_index,
            text: text[boundaries[start]..boundaries[end]].to_string(),
            offset_start: start,
            offset_end: end,
        })
        .collect()
}

/// Split `text` into overlapping windows.
pub fn chunk(text: &str, config: &ChunkConfig) -> Vec<String> {
    chunk_spans("", text, config)
        .into_iter()
        .map(|c| c.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_degenerate_overlap() {
        assert_eq!(
            ChunkConfig::new(100, 100),
            Err(ConfigError::InvalidChunking { size: 100, overlap: 100 })
        );
        assert!(ChunkConfig::new(100, 150).is_err());
        assert_eq!(ChunkConfig::new(0, 0), Err(ConfigError::ZeroChunkSize));
        assert!(ChunkConfig::new(100, 99).is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = ChunkConfig::default();
        assert_eq!(config.size(), 1000);
        assert_eq!(config.overlap(), 200);
        assert_eq!(config.stride(), 800);
    }

    #[test]
    fn test_short_text_is_single_window() {
        let config = ChunkConfig::default();
        assert_eq!(chunk("hello", &config), vec!["hello"]);
    }

    #[test]
    fn test_empty_text_has_no_windows() {
        assert!(chunk("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let config = ChunkConfig::new(4, 1).unwrap();
        assert_eq!(chunk("abcdefghij", &config), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_final_window_may_be_short() {
        let config = ChunkConfig::new(4, 2).unwrap();
        let chunks = chunk_spans("doc", "abcdefg", &config);
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "cdef", "efg"]);
        assert_eq!(chunks[2].offset_end, 7);
        assert_eq!(chunks[2].chunk_id(), "doc_chunk_2");
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let config = ChunkConfig::new(3, 1).unwrap();
        let chunks = chunk("näïvé façade", &config);
        assert_eq!(chunks[0], "näï");
        assert_eq!(chunks[1], "ïvé");
        assert_eq!(chunks.last().map(|c| c.chars().count() <= 3), Some(true));
    }

    proptest! {
        #[test]
        fn prop_window_offsets(text in "\\PC{1,400}", size in 1usize..60, overlap_seed in 0usize..60) {
            let overlap = overlap_seed % size;
            let config = ChunkConfig::new(size, overlap).unwrap();
            let chunks = chunk_spans("d", &text, &config);
            let len = text.chars().count();

            prop_assert!(!chunks.is_empty());
            prop_assert_eq!(chunks.last().unwrap().offset_end, len);

            for pair in chunks.windows(2) {
                prop_assert!(pair[0].offset_start < pair[1].offset_start);
                prop_assert_eq!(pair[0].offset_end - pair[1].offset_start, overlap);
            }

            for c in &chunks {
                prop_assert!(c.offset_end - c.offset_start <= size);
                prop_assert_eq!(c.text.chars().count(), c.offset_end - c.offset_start);
            }
        }
    }
}
