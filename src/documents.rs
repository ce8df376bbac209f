//! Document templating.
//!
//! Renders a template identifier plus a flat field map into either a
//! minimal WordprocessingML package (content types, relationships and
//! `word/document.xml`) or a single-font PDF. Both formats share one
//! paragraph model. Output only; no document is stored.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::core::errors::ApiError;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    LegalNotice,
    RentAgreement,
}

impl TemplateId {
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            TemplateId::LegalNotice => &["sender_name", "receiver_name", "amount", "reason", "act"],
            TemplateId::RentAgreement => &["landlord", "tenant", "rent", "address", "date"],
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            TemplateId::LegalNotice => "Legal_Notice",
            TemplateId::RentAgreement => "Rent_Agreement",
        }
    }

    /// Field whose value names the output file.
    fn name_field(self) -> &'static str {
        match self {
            TemplateId::LegalNotice => "receiver_name",
            TemplateId::RentAgreement => "tenant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub template: TemplateId,
    pub fields: BTreeMap<String, String>,
}

impl StructuredDocument {
    pub fn new<K, V>(template: TemplateId, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            template,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Title,
    Heading,
    Body,
    Bullet,
}

struct Paragraph {
    style: Style,
    text: String,
}

impl Paragraph {
    fn new(style: Style, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

pub fn render_docx(document: &StructuredDocument) -> Result<RenderedDocument, ApiError> {
    let paragraphs = paragraphs(document)?;
    let bytes = package(&paragraphs).map_err(ApiError::internal)?;
    Ok(RenderedDocument {
        filename: output_filename(document, "docx"),
        content_type: DOCX_CONTENT_TYPE,
        bytes,
    })
}

/// A4 pages in Helvetica. Characters outside Windows-1252 print as `?`.
pub fn render_pdf(document: &StructuredDocument) -> Result<RenderedDocument, ApiError> {
    let paragraphs = paragraphs(document)?;
    let bytes = pdf_bytes(&paragraphs).map_err(ApiError::internal)?;
    Ok(RenderedDocument {
        filename: output_filename(document, "pdf"),
        content_type: PDF_CONTENT_TYPE,
        bytes,
    })
}

fn output_filename(document: &StructuredDocument, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        document.template.file_stem(),
        sanitize_filename(document.field(document.template.name_field())),
        extension
    )
}

fn paragraphs(document: &StructuredDocument) -> Result<Vec<Paragraph>, ApiError> {
    let missing: Vec<&str> = document
        .template
        .required_fields()
        .iter()
        .copied()
        .filter(|f| document.field(f).trim().is_empty())
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "missing document fields: {}",
            missing.join(", ")
        )));
    }

    Ok(match document.template {
        TemplateId::LegalNotice => legal_notice(document),
        TemplateId::RentAgreement => rent_agreement(document),
    })
}

fn legal_notice(doc: &StructuredDocument) -> Vec<Paragraph> {
    let mut paragraphs = vec![
        Paragraph::new(Style::Title, "LEGAL NOTICE"),
        Paragraph::new(Style::Body, "To,"),
        Paragraph::new(Style::Body, doc.field("receiver_name")),
        Paragraph::new(Style::Body, "(Address Unknown)"),
        Paragraph::new(
            Style::Heading,
            "SUBJECT: LEGAL NOTICE FOR RECOVERY OF DUES / GRIEVANCE REDRESSAL",
        ),
        Paragraph::new(Style::Body, "Sir/Madam,"),
    ];
    let clauses = [
        format!(
            "1. Under the instruction of my client, {}, I hereby serve you this legal notice.",
            doc.field("sender_name")
        ),
        format!(
            "2. That you are legally liable to pay/resolve the issue regarding: {}.",
            doc.field("reason")
        ),
        format!(
            "3. That despite repeated reminders, you have failed to comply. The outstanding amount involved is {}.",
            doc.field("amount")
        ),
        format!(
            "4. This act of yours falls under {} and other relevant provisions of law.",
            doc.field("act")
        ),
        "5. I hereby call upon you to resolve this matter within 15 days of receipt of this notice, \
         failing which my client shall be constrained to initiate civil/criminal proceedings against \
         you at your risk and cost."
            .to_string(),
    ];
    paragraphs.extend(clauses.into_iter().map(|c| Paragraph::new(Style::Body, c)));
    paragraphs.push(Paragraph::new(Style::Body, "Sincerely,"));
    paragraphs.push(Paragraph::new(Style::Body, "Nyay Sahayak Legal Cell"));
    paragraphs
}

fn rent_agreement(doc: &StructuredDocument) -> Vec<Paragraph> {
    vec![
        Paragraph::new(Style::Title, "RENT AGREEMENT"),
        Paragraph::new(Style::Body, format!("Date: {}", doc.field("date"))),
        Paragraph::new(Style::Bullet, format!("LANDLORD: {}", doc.field("landlord"))),
        Paragraph::new(Style::Bullet, format!("TENANT: {}", doc.field("tenant"))),
        Paragraph::new(Style::Heading, "TERMS:"),
        Paragraph::new(Style::Body, format!("Property: {}", doc.field("address"))),
        Paragraph::new(Style::Body, format!("Rent: Rs. {}/- per month", doc.field("rent"))),
        Paragraph::new(Style::Body, "Standard legal terms apply."),
    ]
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn package(paragraphs: &[Paragraph]) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(RELS_XML.as_bytes())?;
    zip.start_file("word/document.xml", options)?;
    zip.write_all(document_xml(paragraphs).as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

fn document_xml(paragraphs: &[Paragraph]) -> String {
    let mut body = String::new();
    for p in paragraphs {
        let (ppr, rpr) = match p.style {
            Style::Title => (r#"<w:pPr><w:jc w:val="center"/></w:pPr>"#, r#"<w:rPr><w:b/><w:sz w:val="36"/></w:rPr>"#),
            Style::Heading => ("", r#"<w:rPr><w:b/><w:sz w:val="28"/></w:rPr>"#),
            Style::Bullet => (r#"<w:pPr><w:ind w:left="360"/></w:pPr>"#, ""),
            Style::Body => ("", ""),
        };
        let text = match p.style {
            Style::Bullet => format!("\u{2022} {}", escape_xml(&p.text)),
            _ => escape_xml(&p.text),
        };
        body.push_str(&format!(
            r#"<w:p>{ppr}<w:r>{rpr}<w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;

fn pdf_bytes(paragraphs: &[Paragraph]) -> lopdf::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for operations in layout_pages(paragraphs) {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                PAGE_WIDTH.into(),
                PAGE_HEIGHT.into(),
            ],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Text operations per page, top to bottom.
fn layout_pages(paragraphs: &[Paragraph]) -> Vec<Vec<Operation>> {
    let mut pages = Vec::new();
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for p in paragraphs {
        let (font, size, columns, indent) = match p.style {
            Style::Title => ("F2", 18.0_f32, 45, 0.0),
            Style::Heading => ("F2", 12.0, 75, 0.0),
            Style::Bullet => ("F1", 11.0, 84, 18.0),
            Style::Body => ("F1", 11.0, 88, 0.0),
        };
        let text = match p.style {
            Style::Bullet => format!("\u{2022} {}", p.text),
            _ => p.text.clone(),
        };
        let leading = size * 1.4;

        for line in wrap_line(&text, columns) {
            if y - leading < MARGIN {
                pages.push(std::mem::take(&mut ops));
                y = PAGE_HEIGHT - MARGIN;
            }
            y -= leading;
            let x = if p.style == Style::Title {
                ((PAGE_WIDTH - line.chars().count() as f32 * size * 0.6) / 2.0).max(MARGIN)
            } else {
                MARGIN + indent
            };
            ops.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), size.into()]),
                Operation::new("Td", vec![x.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(win_ansi(&line))]),
                Operation::new("ET", vec![]),
            ]);
        }
        y -= size * 0.6;
    }

    if !ops.is_empty() || pages.is_empty() {
        pages.push(ops);
    }
    pages
}

/// Greedy word wrap by character count. Over-long words are split.
fn wrap_line(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > columns {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(columns);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if !current.is_empty() && current.chars().count() + 1 + word.len() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Windows-1252 bytes for the standard PDF fonts.
fn win_ansi(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{20B9}' => bytes.extend_from_slice(b"Rs."),
            c if c.is_control() => bytes.push(b' '),
            c if (c as u32) < 0x80 => bytes.push(c as u8),
            c if (0xA0..=0xFF).contains(&(c as u32)) => bytes.push(c as u32 as u8),
            '\u{20AC}' => bytes.push(0x80),
            '\u{2018}' => bytes.push(0x91),
            '\u{2019}' => bytes.push(0x92),
            '\u{201C}' => bytes.push(0x93),
            '\u{201D}' => bytes.push(0x94),
            '\u{2022}' => bytes.push(0x95),
            '\u{2013}' => bytes.push(0x96),
            '\u{2014}' => bytes.push(0x97),
            _ => bytes.push(b'?'),
        }
    }
    bytes
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn sanitize_filename(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::loader::{docx_text, pdf_pages};

    fn notice() -> StructuredDocument {
        StructuredDocument::new(
            TemplateId::LegalNotice,
            [
                ("sender_name", "Asha"),
                ("receiver_name", "Ravi Kumar"),
                ("amount", "Rs. 50,000"),
                ("reason", "cheque bounce <returned>"),
                ("act", "Negotiable Instruments Act"),
            ],
        )
    }

    #[test]
    fn legal_notice_renders_readable_docx() {
        let rendered = render_docx(&notice()).unwrap();
        assert_eq!(rendered.filename, "Legal_Notice_Ravi_Kumar.docx");
        assert_eq!(rendered.content_type, DOCX_CONTENT_TYPE);

        let text = docx_text(&rendered.bytes).unwrap();
        assert!(text.starts_with("LEGAL NOTICE"));
        assert!(text.contains("cheque bounce <returned>"));
        assert!(text.contains("within 15 days"));
    }

    #[test]
    fn rent_agreement_lists_parties() {
        let doc = StructuredDocument::new(
            TemplateId::RentAgreement,
            [
                ("landlord", "Meera"),
                ("tenant", "Karan"),
                ("rent", "12000"),
                ("address", "Flat 4, Pune"),
                ("date", "2026-10-01"),
            ],
        );
        let text = docx_text(&render_docx(&doc).unwrap().bytes).unwrap();
        assert!(text.contains("LANDLORD: Meera"));
        assert!(text.contains("Rent: Rs. 12000/- per month"));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let doc = StructuredDocument::new(TemplateId::RentAgreement, [("landlord", "Meera")]);
        let err = render_docx(&doc).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("tenant")));
        assert!(render_pdf(&doc).is_err());
    }

    #[tokio::test]
    async fn legal_notice_renders_readable_pdf() {
        let rendered = render_pdf(&notice()).unwrap();
        assert_eq!(rendered.filename, "Legal_Notice_Ravi_Kumar.pdf");
        assert_eq!(rendered.content_type, PDF_CONTENT_TYPE);
        assert!(rendered.bytes.starts_with(b"%PDF-1.5"));

        let pages = pdf_pages(rendered.bytes, None).await.unwrap();
        let text = pages.join("\n");
        assert!(text.contains("LEGAL"));
        assert!(text.contains("Ravi"));
        assert!(text.contains("Negotiable"));
    }

    #[test]
    fn long_text_flows_onto_more_pages() {
        let mut doc = notice();
        doc.fields.insert("reason".to_string(), "unpaid invoice ".repeat(600));
        let bytes = render_pdf(&doc).unwrap().bytes;
        let parsed = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(parsed.get_pages().len() > 1);
    }

    #[test]
    fn wrapping_respects_the_column_limit() {
        let lines = wrap_line("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
        assert_eq!(wrap_line("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_line("", 10), vec![""]);
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(win_ansi("Rs \u{20B9}5 caf\u{e9} \u{928}"), b"Rs Rs.5 caf\xe9 ?".to_vec());
    }
}
