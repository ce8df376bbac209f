//! Documents and chunks flowing through ingestion.

use serde::{Deserialize, Serialize};

/// Character range of one page inside a document's full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    /// 1-based page number.
    pub page: usize,
    pub start: usize,
    pub end: usize,
}

/// A raw ingested unit. Lives only until it has been chunked and indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source identifier, usually the file name inside the corpus.
    pub source: String,
    pub text: String,
    /// Page boundaries in character offsets, when the format has pages.
    #[serde(default)]
    pub pages: Vec<PageSpan>,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            pages: Vec::new(),
        }
    }

    /// Builds a document from per-page texts, joining pages with a newline
    /// and recording the character span of each page.
    pub fn from_pages<I, S>(source: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut spans = Vec::new();
        let mut offset = 0;

        for (idx, page) in pages.into_iter().enumerate() {
            if idx > 0 {
                text.push('\n');
                offset += 1;
            }
            let page = page.as_ref();
            let len = page.chars().count();
            text.push_str(page);
            spans.push(PageSpan {
                page: idx + 1,
                start: offset,
                end: offset + len,
            });
            offset += len;
        }

        Self {
            source: source.into(),
            text,
            pages: spans,
        }
    }

    /// Page number containing the given character offset.
    pub fn page_at(&self, offset: usize) -> Option<usize> {
        self.pages
            .iter()
            .find(|span| offset >= span.start && offset < span.end.max(span.start + 1))
            .map(|span| span.page)
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A contiguous, overlap-adjusted substring of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Start offset in characters (inclusive).
    pub start: usize,
    /// End offset in characters (exclusive).
    pub end: usize,
    /// Position of this chunk within its document.
    pub index: usize,
    /// Back-reference to the originating document.
    pub source: String,
}
