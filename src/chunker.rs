//! Splitting document units into overlapping chunks for embedding.
//!
//! All sizes are counted in characters, not bytes. A chunk ends at the last
//! natural boundary inside its window when one is available, otherwise at
//! the raw window edge. The next chunk always starts `overlap` characters
//! before the previous chunk's end.

use crate::error::{Error, Result};
use crate::loader::DocumentUnit;
use crate::vector_entry::Chunk;

/// Boundary classes, most preferred first: paragraph, line, sentence, word.
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn split(&self, units: &[DocumentUnit]) -> Vec<Chunk> {
        units
            .iter()
            .flat_map(|unit| {
                self.split_text(&unit.text)
                    .into_iter()
                    .enumerate()
                    .map(move |(sequence_index, text)| Chunk {
                        text,
                        metadata: unit.source_metadata.clone(),
                        sequence_index,
                    })
            })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // offsets[c] is the byte offset of character c; the extra slot is text.len().
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = offsets.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let mut end = (start + self.chunk_size).min(char_count);
            if end < char_count {
                let window = &text[offsets[start]..offsets[end]];
                if let Some(len) = self.find_break(window) {
                    end = start + len;
                }
            }

            chunks.push(text[offsets[start]..offsets[end]].to_string());

            if end >= char_count {
                break;
            }
            start = end - self.overlap;
        }

        chunks
    }

    /// Length in characters of the longest prefix of `window` that ends on a
    /// natural boundary and is still long enough to make progress.
    fn find_break(&self, window: &str) -> Option<usize> {
        let min_len = self.overlap.max(self.chunk_size / 2);

        for class in SEPARATORS {
            let best = class
                .iter()
                .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
                .max();
            if let Some(byte_end) = best {
                let len = window[..byte_end].chars().count();
                if len > min_len {
                    return Some(len);
                }
            }
        }

        None
    }
}

pub fn split(units: &[DocumentUnit], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(TextChunker::new(chunk_size, overlap)?.split(units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_entry::Metadata;

    fn unit(text: &str, page: &str) -> DocumentUnit {
        let mut metadata = Metadata::new();
        metadata.insert("page".to_string(), page.to_string());
        DocumentUnit::new(text, metadata)
    }

    fn assert_overlap(chunks: &[String], overlap: usize) {
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(TextChunker::new(0, 0), Err(Error::Config(_))));
        assert!(matches!(TextChunker::new(5, 5), Err(Error::Config(_))));
        assert!(matches!(TextChunker::new(5, 9), Err(Error::Config(_))));
        assert!(TextChunker::new(5, 4).is_ok());
    }

    #[test]
    fn test_sentence_boundaries_are_deterministic() {
        let chunker = TextChunker::new(5, 1).unwrap();
        let expected = vec!["A. ".to_string(), " B. ".to_string(), " C.".to_string()];
        for _ in 0..3 {
            assert_eq!(chunker.split_text("A. B. C."), expected);
        }
    }

    #[test]
    fn test_raw_slicing_without_boundaries() {
        let chunker = TextChunker::new(4, 1).unwrap();
        let chunks = chunker.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_small_text_is_single_chunk() {
        let chunker = TextChunker::new(100, 10).unwrap();
        assert_eq!(chunker.split_text("Hello world"), vec!["Hello world"]);
        assert!(chunker.split_text("   \n ").is_empty());
    }

    #[test]
    fn test_length_and_overlap_hold_for_prose() {
        let text = "This is a test sentence. Another one follows!\n\nA new paragraph starts here, \
                    with words that keep going for a while so the window has to move.\n"
            .repeat(12);
        for (chunk_size, overlap) in [(40, 0), (40, 10), (64, 20), (200, 50), (7, 6)] {
            let chunker = TextChunker::new(chunk_size, overlap).unwrap();
            let chunks = chunker.split_text(&text);
            assert!(chunks.len() > 1);
            for chunk in &chunks {
                assert!(chunk.chars().count() <= chunk_size);
            }
            assert_overlap(&chunks, overlap);
        }
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let chunker = TextChunker::new(3, 1).unwrap();
        let chunks = chunker.split_text("äöüßéèê");
        assert_eq!(chunks, vec!["äöü", "üßé", "éèê"]);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let chunker = TextChunker::new(30, 2).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph is here too.";
        let chunks = chunker.split_text(text);
        assert_eq!(chunks[0], "First paragraph here.\n\n");
    }

    #[test]
    fn test_split_units_keeps_metadata_and_sequence() {
        let units = vec![unit("abcdefgh", "0"), unit("", "1"), unit("xyz", "2")];
        let chunks = split(&units, 4, 1).unwrap();

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "abcd");
        assert_eq!(chunks[2].text, "gh");
        assert_eq!(chunks[2].sequence_index, 2);
        assert_eq!(chunks[3].text, "xyz");
        assert_eq!(chunks[3].sequence_index, 0);
        assert_eq!(chunks[3].metadata.get("page").map(String::as_str), Some("2"));
    }
}
