//! Ingestion pipeline orchestration.
//!
//! Coordinates the full upload flow: validation → extraction → document
//! classification → persistence. Validation failures (oversized upload,
//! unsupported extension) are synchronous rejections and are never
//! retried; only the outbound classification and storage calls go
//! through the retry wrapper.

use std::path::Path;

use crate::analysis;
use crate::config::Config;
use crate::extract::{self, ExtractError, FileKind};
use crate::inference::Inference;
use crate::models::{self, DocumentRecord, Page};
use crate::retry::{with_retry, CallError, Outcome};
use crate::store::DocumentStore;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("file is {size} bytes, exceeding the {max} byte upload limit")]
    TooLarge { size: u64, max: u64 },
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error("document store unavailable: {0}")]
    Storage(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a successful ingestion.
#[derive(Debug)]
pub struct IngestReport {
    pub record: DocumentRecord,
    pub pages: Vec<Page>,
    pub document_type: String,
}

/// Validate, extract, classify, and persist one uploaded file.
pub async fn ingest_file(
    config: &Config,
    store: &dyn DocumentStore,
    inference: &dyn Inference,
    path: &Path,
    owner_id: &str,
) -> Result<IngestReport, IngestError> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > config.upload.max_bytes {
        return Err(IngestError::TooLarge {
            size: meta.len(),
            max: config.upload.max_bytes,
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let kind = FileKind::from_extension(ext)
        .ok_or_else(|| ExtractError::Unsupported(ext.to_string()))?;

    let policy = config.inference.retry_policy();
    let pages = extract::extract_file(path, kind, inference, &policy).await?;
    tracing::info!(
        path = %path.display(),
        pages = pages.len(),
        "extracted document"
    );

    // Classify on the raw text; persist the marker-annotated form so pages
    // can be reconstituted from the flattened record.
    let raw_text: String = pages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let document_type = analysis::classify_document(inference, &config.inference, &raw_text).await;

    let body = models::full_text(&pages);
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let page_count = pages.len() as i64;
    let filename_ref = filename.as_str();
    let body_ref = body.as_str();
    let document_type_ref = document_type.as_str();
    let outcome = with_retry(&policy, "document-save", move || async move {
        store
            .save(owner_id, filename_ref, document_type_ref, body_ref, page_count)
            .await
            // Storage failures are worth retrying: the backend cannot be
            // classified more precisely from here.
            .map_err(CallError::Transient)
    })
    .await;

    match outcome {
        Outcome::Success(record) => Ok(IngestReport {
            record,
            pages,
            document_type,
        }),
        Outcome::Unavailable { reason, .. } => Err(IngestError::Storage(reason)),
    }
}
