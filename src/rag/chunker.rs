//! Fixed-size character chunking with overlap.
//!
//! Windows are `size` characters wide and advance by `size - overlap`
//! characters, so consecutive chunks of one document share exactly
//! `overlap` characters. The last window stops at the end of the text.
//! Offsets are counted in characters, never bytes, so multi-byte scripts
//! (Devanagari, Gurmukhi, ...) are never split inside a code point.

use super::document::{Chunk, Document};
use super::error::{RagError, RagResult};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with `InvalidParameter` unless `size > overlap`.
    pub fn new(size: usize, overlap: usize) -> RagResult<Self> {
        if size == 0 || overlap >= size {
            return Err(RagError::InvalidParameter(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Lazily splits `text`. The returned iterator is `Clone`, so a sequence
    /// can be restarted by cloning it before consumption.
    pub fn split<'a>(&self, text: &'a str, source: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            source,
            size: self.size,
            step: self.step(),
            byte_pos: 0,
            char_pos: 0,
            index: 0,
            done: false,
        }
    }

    pub fn chunk_document<'a>(&self, document: &'a Document) -> Chunks<'a> {
        self.split(&document.text, &document.source)
    }
}

/// `chunk(text, size, overlap)`: validates the parameters and returns the
/// lazy chunk sequence.
pub fn chunk<'a>(
    text: &'a str,
    source: &'a str,
    size: usize,
    overlap: usize,
) -> RagResult<Chunks<'a>> {
    Ok(Chunker::new(size, overlap)?.split(text, source))
}

/// Lazy, finite sequence of chunks over one text.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    source: &'a str,
    size: usize,
    step: usize,
    byte_pos: usize,
    char_pos: usize,
    index: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.byte_pos..];
        let mut end_byte = rest.len();
        let mut next_byte = rest.len();
        let mut taken = 0;

        for (count, (offset, _)) in rest.char_indices().enumerate() {
            if count == self.step {
                next_byte = offset;
            }
            if count == self.size {
                end_byte = offset;
                break;
            }
            taken = count + 1;
        }

        let chunk = Chunk {
            text: rest[..end_byte].to_string(),
            start: self.char_pos,
            end: self.char_pos + taken,
            index: self.index,
            source: self.source.to_string(),
        };

        if end_byte == rest.len() {
            self.done = true;
        } else {
            self.byte_pos += next_byte;
            self.char_pos += self.step;
            self.index += 1;
        }

        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}
