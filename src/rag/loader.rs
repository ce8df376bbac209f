//! Corpus discovery and text extraction.
//!
//! Supported formats: PDF (per-page text), DOCX (`word/document.xml`
//! paragraphs) and plain text / Markdown. Anything else in the corpus
//! directory is ignored.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use regex::Regex;

use super::document::Document;
use super::error::{RagError, RagResult};

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Lists every supported document under `corpus_dir`, recursively, in a
/// stable (sorted) order.
///
/// Fails with `CorpusEmpty` when the directory is missing or contains no
/// supported files.
pub fn discover(corpus_dir: &Path) -> RagResult<Vec<PathBuf>> {
    let display = corpus_dir.display().to_string();
    if !corpus_dir.is_dir() {
        return Err(RagError::CorpusEmpty(display));
    }

    let mut files = Vec::new();
    let mut pending = vec![corpus_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(RagError::store)?;
        for entry in entries {
            let path = entry.map_err(RagError::store)?.path();
            if path.is_dir() {
                pending.push(path);
            } else if DocumentFormat::from_path(&path).is_some() {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        return Err(RagError::CorpusEmpty(display));
    }
    files.sort();
    Ok(files)
}

/// Source identifier for a corpus file: its path relative to the corpus
/// root, with forward slashes.
pub fn source_id(corpus_dir: &Path, path: &Path) -> String {
    path.strip_prefix(corpus_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reads and parses one document. Documents without extractable text are
/// reported as `DocumentParse` failures.
pub async fn load_document(path: &Path, source: &str) -> RagResult<Document> {
    let parse_error = |reason: String| RagError::DocumentParse {
        document: source.to_string(),
        reason,
    };

    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        parse_error(format!(
            "unsupported extension (expected one of {})",
            SUPPORTED_EXTENSIONS.join(", ")
        ))
    })?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| parse_error(e.to_string()))?;

    let document = match format {
        DocumentFormat::Pdf => {
            let pages = pdf_pages(bytes, None).await.map_err(parse_error)?;
            Document::from_pages(source, pages)
        }
        DocumentFormat::Docx => {
            let text = docx_text(&bytes).map_err(parse_error)?;
            Document::new(source, text)
        }
        DocumentFormat::PlainText => {
            let text = String::from_utf8(bytes)
                .map_err(|_| parse_error("file is not valid UTF-8".to_string()))?;
            Document::new(source, text)
        }
    };

    if !document.has_text() {
        return Err(parse_error("no extractable text".to_string()));
    }
    Ok(document)
}

/// Extracts per-page text from PDF bytes, keeping at most `max_pages`
/// pages. Runs on the blocking pool; a panic inside the PDF parser is
/// reported as an ordinary failure.
pub async fn pdf_pages(bytes: Vec<u8>, max_pages: Option<usize>) -> Result<Vec<String>, String> {
    let extracted = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("PDF parser crashed: {}", e))??;

    let mut pages = extracted;
    if let Some(limit) = max_pages {
        pages.truncate(limit);
    }
    Ok(pages)
}

/// Pulls the visible text out of a DOCX package. Paragraph ends become
/// newlines.
pub fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a DOCX package: {}", e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing word/document.xml: {}", e))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable word/document.xml: {}", e))?;

    let tags = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|</w:p>|<w:tab/>|<w:br/>")
        .map_err(|e| e.to_string())?;
    let mut text = String::new();
    for caps in tags.captures_iter(&xml) {
        match caps.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => match caps.get(0).map(|m| m.as_str()) {
                Some("<w:tab/>") => text.push('\t'),
                _ => text.push('\n'),
            },
        }
    }
    Ok(text.trim_end().to_string())
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
