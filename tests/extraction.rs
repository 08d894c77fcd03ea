//! Integration tests for multi-format extraction.
//!
//! Fixtures are built in-process: a hand-assembled minimal PDF, ZIP-packed
//! docx/pptx archives, and an encoded PNG for the vision path.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use docsift::extract::{
    self, FileKind, EMPTY_PRESENTATION, NO_TEXT_IN_IMAGE, NO_TEXT_ON_SLIDE,
};
use docsift::inference::{GenerationRequest, Inference};
use docsift::models;
use docsift::retry::{CallError, RetryPolicy};

/// Minimal valid PDF with one page. Builds the body then the xref table
/// with correct byte offsets so pdf parsers accept it.
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 48 >> stream\nBT /F1 12 Tf 100 700 Td (lease agreement) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal docx: a ZIP containing only `word/document.xml`.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let mut xml = String::from(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>",
        );
        for p in paragraphs {
            xml.push_str(&format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p));
        }
        xml.push_str("</w:body></w:document>");
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Minimal pptx: one `ppt/slides/slideN.xml` per entry; `None` makes a
/// slide with no text runs.
fn minimal_pptx(slides: &[Option<&str>]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (i, slide) in slides.iter().enumerate() {
            zip.start_file(
                format!("ppt/slides/slide{}.xml", i + 1),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let body = match slide {
                Some(text) => format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", text),
                None => String::new(),
            };
            let xml = format!(
                "<?xml version=\"1.0\"?><p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">{}</p:sld>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn write_fixture(suffix: &str, bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file
}

/// Vision provider returning a fixed transcript, counting invocations.
struct FixedVision {
    reply: String,
    calls: AtomicUsize,
}

impl FixedVision {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Inference for FixedVision {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, CallError> {
        Err(CallError::terminal("text generation not under test"))
    }

    async fn image_to_text(&self, jpeg: &[u8], _instruction: &str) -> Result<String, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // The extractor must hand us re-encoded JPEG, whatever came in.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "expected a JPEG payload");
        Ok(self.reply.clone())
    }
}

#[tokio::test]
async fn docx_paragraphs_become_a_single_page() {
    let file = write_fixture(".docx", &minimal_docx(&["Tenant obligations", "Rent is due monthly"]));
    let pages = extract::extract_path(file.path(), &FixedVision::new(""), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page_number, 1);
    assert_eq!(pages[0].content, "Tenant obligations\nRent is due monthly");
}

#[tokio::test]
async fn pptx_maps_slides_to_pages_with_blank_slide_sentinel() {
    let file = write_fixture(".pptx", &minimal_pptx(&[Some("Q1 Revenue"), None]));
    let pages = extract::extract_path(file.path(), &FixedVision::new(""), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].page_number, 1);
    assert_eq!(pages[0].content, "Q1 Revenue");
    assert_eq!(pages[1].page_number, 2);
    assert_eq!(pages[1].content, NO_TEXT_ON_SLIDE);
}

#[tokio::test]
async fn pptx_slides_order_numerically_not_lexically() {
    // slide2 < slide10 numerically; lexical ordering would invert them.
    let labels: Vec<String> = (1..=10).map(|i| format!("s{}", i)).collect();
    let slides: Vec<Option<&str>> = labels.iter().map(|l| Some(l.as_str())).collect();
    let file = write_fixture(".pptx", &minimal_pptx(&slides));
    let pages = extract::extract_path(file.path(), &FixedVision::new(""), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(pages.len(), 10);
    assert_eq!(pages[1].content, "s2");
    assert_eq!(pages[9].content, "s10");
    let numbers: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<u32>>());
}

#[tokio::test]
async fn pptx_without_slides_is_an_empty_presentation() {
    let file = write_fixture(".pptx", &minimal_pptx(&[]));
    let pages = extract::extract_path(file.path(), &FixedVision::new(""), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].content, EMPTY_PRESENTATION);
}

#[tokio::test]
async fn pdf_extraction_yields_at_least_one_page() {
    // Text recovery from a hand-built PDF depends on font encoding details,
    // so assert the page contract rather than exact content.
    let file = write_fixture(".pdf", &minimal_pdf());
    let pages = extract::extract_path(file.path(), &FixedVision::new(""), &RetryPolicy::default())
        .await
        .unwrap();
    assert!(!pages.is_empty());
    assert_eq!(pages[0].page_number, 1);
    assert!(!pages[0].content.is_empty());
}

#[tokio::test]
async fn image_extraction_calls_the_vision_provider_once() {
    let mut png = Vec::new();
    image::RgbImage::from_pixel(6, 4, image::Rgb([200, 10, 10]))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let file = write_fixture(".png", &png);

    let vision = FixedVision::new("INVOICE #42\nTotal due: $100");
    let pages = extract::extract_path(file.path(), &vision, &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].content, "INVOICE #42\nTotal due: $100");
}

#[tokio::test]
async fn image_with_no_readable_text_gets_the_sentinel_page() {
    let mut png = Vec::new();
    image::RgbImage::from_pixel(2, 2, image::Rgb([255, 255, 255]))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let file = write_fixture(".png", &png);

    let pages = extract::extract_path(file.path(), &FixedVision::new("   "), &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].content, NO_TEXT_IN_IMAGE);
}

#[tokio::test]
async fn multi_page_extraction_round_trips_through_markers() {
    let file = write_fixture(
        ".pptx",
        &minimal_pptx(&[Some("Opening"), None, Some("Closing")]),
    );
    let pages = extract::extract_file(
        file.path(),
        FileKind::Slides,
        &FixedVision::new(""),
        &RetryPolicy::default(),
    )
    .await
    .unwrap();

    let body = models::full_text(&pages);
    assert!(body.starts_with("--- Page 1 ---\n"));
    assert_eq!(models::split_pages(&body), pages);
}
