//! Multi-format text extraction into the uniform page model.
//!
//! The dispatcher ([`extract_file`]) maps a declared [`FileKind`] to exactly
//! one extractor — a pure routing table, not a fallback chain. Each extractor
//! either produces a non-empty page sequence or an explicit error, never a
//! silently-partial result: "ran and found nothing" yields sentinel pages,
//! "failed to run" yields `Err`.
//!
//! Paginated sources (PDF, slide decks) produce one page per physical
//! page/slide; unpaginated sources (text, Word, images) always produce
//! exactly one page. Images have no native text layer and are delegated to
//! the vision-capable inference provider through the retry wrapper.

use std::io::Read;
use std::path::Path;

use crate::inference::Inference;
use crate::models::Page;
use crate::retry::{with_retry, Outcome, RetryPolicy};

/// Sentinel contents distinguishing "no discoverable text" from failure.
pub const NO_TEXT_IN_IMAGE: &str = "[No text detected in image]";
pub const NO_TEXT_IN_DOCUMENT: &str = "[No text found in document]";
pub const NO_TEXT_ON_SLIDE: &str = "[No text on this slide]";
pub const EMPTY_PRESENTATION: &str = "[Empty presentation]";
pub const EMPTY_FILE: &str = "[Empty file]";

/// Longest image edge submitted to the vision capability; larger images are
/// downscaled to respect payload limits.
const MAX_IMAGE_EDGE: u32 = 2048;
const JPEG_QUALITY: u8 = 85;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const VISION_INSTRUCTION: &str = "Extract ALL text visible in this image. Return ONLY the \
     extracted text exactly as it appears, preserving the layout and formatting as much as \
     possible. If there is no text in the image, respond with '[No text detected in image]'.";

/// Declared input kind, resolved from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
    Image,
    Word,
    Slides,
}

impl FileKind {
    /// Static routing table from extension to extractor. Unknown extensions
    /// are rejected here, before any extractor runs.
    pub fn from_extension(ext: &str) -> Option<FileKind> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(FileKind::Text),
            "pdf" => Some(FileKind::Pdf),
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "webp" => Some(FileKind::Image),
            "docx" => Some(FileKind::Word),
            "pptx" => Some(FileKind::Slides),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<FileKind> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(FileKind::from_extension)
    }
}

/// Extraction failure. Callers must distinguish this from a successful
/// extraction whose pages carry sentinel content.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file extension: {0}")]
    Unsupported(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("image decoding failed: {0}")]
    Image(String),
    #[error("image-to-text capability unavailable: {0}")]
    Vision(String),
}

/// Extract a file's text as an ordered, contiguous, non-empty page sequence.
///
/// `vision` and `policy` are only exercised for image inputs.
pub async fn extract_file(
    path: &Path,
    kind: FileKind,
    vision: &dyn Inference,
    policy: &RetryPolicy,
) -> Result<Vec<Page>, ExtractError> {
    match kind {
        FileKind::Text => extract_text_file(path).await,
        FileKind::Pdf => {
            let bytes = tokio::fs::read(path).await?;
            extract_pdf(&bytes)
        }
        FileKind::Image => {
            let bytes = tokio::fs::read(path).await?;
            extract_image(&bytes, vision, policy).await
        }
        FileKind::Word => {
            let bytes = tokio::fs::read(path).await?;
            extract_docx(&bytes)
        }
        FileKind::Slides => {
            let bytes = tokio::fs::read(path).await?;
            extract_pptx(&bytes)
        }
    }
}

/// Resolve the kind from the path and extract; unknown extensions are
/// rejected without invoking any extractor.
pub async fn extract_path(
    path: &Path,
    vision: &dyn Inference,
    policy: &RetryPolicy,
) -> Result<Vec<Page>, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let kind = FileKind::from_extension(ext)
        .ok_or_else(|| ExtractError::Unsupported(ext.to_string()))?;
    extract_file(path, kind, vision, policy).await
}

// ============ Plain text ============

/// Read a text file as UTF-8, falling back to Latin-1 on decode failure.
/// The whole file is one page; blank lines never auto-paginate.
async fn extract_text_file(path: &Path) -> Result<Vec<Page>, ExtractError> {
    let bytes = tokio::fs::read(path).await?;
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => latin1_decode(e.as_bytes()),
    };

    if text.trim().is_empty() {
        return Ok(vec![Page::new(1, EMPTY_FILE)]);
    }
    Ok(vec![Page::new(1, text)])
}

/// Permissive fallback: every byte maps to the code point of the same
/// value, so decoding never fails (ISO-8859-1 semantics).
fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// ============ PDF ============

/// One page per physical page; a page with no text layer (e.g. scanned)
/// is a legitimately empty page, not an error.
fn extract_pdf(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let page_texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    if page_texts.is_empty() {
        return Ok(vec![Page::new(1, NO_TEXT_IN_DOCUMENT)]);
    }

    Ok(page_texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page::new(i as u32 + 1, text))
        .collect())
}

// ============ Image (vision capability) ============

/// Normalize, downscale, and JPEG-encode an image, then delegate to the
/// image-to-text capability through the retry wrapper. Always one page.
async fn extract_image(
    bytes: &[u8],
    vision: &dyn Inference,
    policy: &RetryPolicy,
) -> Result<Vec<Page>, ExtractError> {
    let jpeg = prepare_image(bytes)?;
    let jpeg_ref = &jpeg;

    let outcome = with_retry(policy, "image-to-text", move || async move {
        vision.image_to_text(jpeg_ref, VISION_INSTRUCTION).await
    })
    .await;

    match outcome {
        Outcome::Success(text) => {
            let text = text.trim().to_string();
            if text.is_empty() || text == NO_TEXT_IN_IMAGE {
                Ok(vec![Page::new(1, NO_TEXT_IN_IMAGE)])
            } else {
                Ok(vec![Page::new(1, text)])
            }
        }
        Outcome::Unavailable { reason, .. } => Err(ExtractError::Vision(reason)),
    }
}

/// Decode, flatten palette/alpha modes to 3-channel RGB, cap the longest
/// edge at [`MAX_IMAGE_EDGE`], and encode as JPEG for transport.
fn prepare_image(bytes: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let img = image::load_from_memory(bytes).map_err(|e| ExtractError::Image(e.to_string()))?;

    let img = if img.width().max(img.height()) > MAX_IMAGE_EDGE {
        img.resize(
            MAX_IMAGE_EDGE,
            MAX_IMAGE_EDGE,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|e| ExtractError::Image(e.to_string()))?;
    Ok(jpeg)
}

// ============ OOXML helpers ============

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Collect paragraphs from an OOXML part: text runs (`<t>` elements) are
/// concatenated within each paragraph (`<p>` element), and non-empty
/// paragraphs are returned in document order. The same shape covers both
/// WordprocessingML (`w:p`/`w:t`) and DrawingML (`a:p`/`a:t`).
fn collect_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    // No trim_text: inter-run spacing inside <t> elements is significant.
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"p" => current.clear(),
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

// ============ Word (.docx) ============

/// Concatenate non-empty paragraphs of `word/document.xml` in document
/// order. A Word file has no page structure, so the result is one page.
fn extract_docx(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    let paragraphs = collect_paragraphs(&doc_xml)?;

    if paragraphs.is_empty() {
        return Ok(vec![Page::new(1, NO_TEXT_IN_DOCUMENT)]);
    }
    Ok(vec![Page::new(1, paragraphs.join("\n"))])
}

// ============ Slides (.pptx) ============

/// One page per slide, in slide-number order. An empty slide yields a
/// sentinel page for that slide only, never document-wide failure.
fn extract_pptx(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    if slide_names.is_empty() {
        return Ok(vec![Page::new(1, EMPTY_PRESENTATION)]);
    }

    let mut pages = Vec::with_capacity(slide_names.len());
    for (i, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        let paragraphs = collect_paragraphs(&xml)?;
        let content = if paragraphs.is_empty() {
            NO_TEXT_ON_SLIDE.to_string()
        } else {
            paragraphs.join("\n")
        };
        pages.push(Page::new(i as u32 + 1, content));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_routing_table() {
        assert_eq!(FileKind::from_extension("pdf"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_extension("PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_extension("jpeg"), Some(FileKind::Image));
        assert_eq!(FileKind::from_extension("webp"), Some(FileKind::Image));
        assert_eq!(FileKind::from_extension("docx"), Some(FileKind::Word));
        assert_eq!(FileKind::from_extension("pptx"), Some(FileKind::Slides));
        assert_eq!(FileKind::from_extension("txt"), Some(FileKind::Text));
        assert_eq!(FileKind::from_extension("exe"), None);
        assert_eq!(FileKind::from_extension(""), None);
    }

    #[test]
    fn latin1_fallback_never_loses_bytes() {
        let bytes = [0x63, 0x61, 0x66, 0xE9]; // "café" in Latin-1, invalid UTF-8
        assert!(String::from_utf8(bytes.to_vec()).is_err());
        assert_eq!(latin1_decode(&bytes), "café");
    }

    #[test]
    fn invalid_pdf_is_an_error_not_empty_pages() {
        assert!(matches!(
            extract_pdf(b"not a pdf"),
            Err(ExtractError::Pdf(_))
        ));
    }

    #[test]
    fn invalid_zip_is_an_error_for_docx() {
        assert!(matches!(
            extract_docx(b"not a zip"),
            Err(ExtractError::Ooxml(_))
        ));
    }

    #[test]
    fn paragraphs_group_runs_and_skip_empty() {
        let xml = br#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>
                <w:p></w:p>
                <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let paragraphs = collect_paragraphs(xml).unwrap();
        assert_eq!(paragraphs, vec!["Hello world", "Second paragraph"]);
    }

    #[test]
    fn slide_xml_with_no_runs_is_empty() {
        let xml = br#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
                        xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
              <p:cSld><p:spTree></p:spTree></p:cSld>
            </p:sld>"#;
        assert!(collect_paragraphs(xml).unwrap().is_empty());
    }
}
