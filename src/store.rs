//! Document persistence behind a pluggable store trait.
//!
//! [`DocumentStore`] defines the operations the pipeline needs; the SQLite
//! implementation backs the CLI and the in-memory one backs tests. Bodies
//! are truncated to a configured maximum before persistence, so round-trip
//! fidelity is not guaranteed for very large documents.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{DocumentRecord, DocumentSummary};

/// Persistent document store, accessed by opaque id and owner id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a document, truncating the body first. Returns the stored record.
    async fn save(
        &self,
        owner_id: &str,
        filename: &str,
        kind: &str,
        full_text: &str,
        page_count: i64,
    ) -> Result<DocumentRecord>;

    /// Fetch by id; when `owner_id` is given, ownership is verified too.
    async fn get(&self, id: &str, owner_id: Option<&str>) -> Result<Option<DocumentRecord>>;

    /// All documents for an owner, most recent first.
    async fn list(&self, owner_id: &str) -> Result<Vec<DocumentSummary>>;

    /// Delete an owned document; `false` when nothing matched.
    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool>;

    /// Upsert a cached analysis result for (document, analysis kind).
    async fn save_analysis(&self, document_id: &str, kind: &str, result_json: &str) -> Result<()>;

    /// Fetch a cached analysis result, if any.
    async fn get_analysis(&self, document_id: &str, kind: &str) -> Result<Option<String>>;
}

/// Truncate on a char boundary to at most `max` characters.
fn truncate_body(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============ SQLite store ============

pub struct SqliteStore {
    pool: SqlitePool,
    max_stored_chars: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, max_stored_chars: usize) -> Self {
        Self {
            pool,
            max_stored_chars,
        }
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        filename: row.get("filename"),
        kind: row.get("kind"),
        body: row.get("body"),
        page_count: row.get("page_count"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn save(
        &self,
        owner_id: &str,
        filename: &str,
        kind: &str,
        full_text: &str,
        page_count: i64,
    ) -> Result<DocumentRecord> {
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            kind: kind.to_string(),
            body: truncate_body(full_text, self.max_stored_chars).to_string(),
            page_count,
            created_at: Utc::now().timestamp(),
        };

        sqlx::query(
            "INSERT INTO documents (id, owner_id, filename, kind, body, page_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.filename)
        .bind(&record.kind)
        .bind(&record.body)
        .bind(record.page_count)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, id: &str, owner_id: Option<&str>) -> Result<Option<DocumentRecord>> {
        let row = match owner_id {
            Some(owner) => {
                sqlx::query(
                    "SELECT id, owner_id, filename, kind, body, page_count, created_at
                     FROM documents WHERE id = ? AND owner_id = ?",
                )
                .bind(id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, owner_id, filename, kind, body, page_count, created_at
                     FROM documents WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.as_ref().map(record_from_row))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            "SELECT id, filename, kind, page_count, created_at
             FROM documents WHERE owner_id = ? ORDER BY created_at DESC, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentSummary {
                id: row.get("id"),
                filename: row.get("filename"),
                kind: row.get("kind"),
                page_count: row.get("page_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_analysis(&self, document_id: &str, kind: &str, result_json: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO analyses (id, document_id, kind, result_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(document_id, kind)
             DO UPDATE SET result_json = excluded.result_json, updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(document_id)
        .bind(kind)
        .bind(result_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analysis(&self, document_id: &str, kind: &str) -> Result<Option<String>> {
        let row =
            sqlx::query("SELECT result_json FROM analyses WHERE document_id = ? AND kind = ?")
                .bind(document_id)
                .bind(kind)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.get("result_json")))
    }
}

// ============ In-memory store ============

/// In-memory store for tests; same contracts as the SQLite backing.
pub struct MemoryStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    analyses: RwLock<HashMap<(String, String), String>>,
    max_stored_chars: usize,
    /// Monotonic tiebreaker: timestamps can collide within a test run.
    seq: std::sync::atomic::AtomicI64,
}

impl MemoryStore {
    pub fn new(max_stored_chars: usize) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            analyses: RwLock::new(HashMap::new()),
            max_stored_chars,
            seq: std::sync::atomic::AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn save(
        &self,
        owner_id: &str,
        filename: &str,
        kind: &str,
        full_text: &str,
        page_count: i64,
    ) -> Result<DocumentRecord> {
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            kind: kind.to_string(),
            body: truncate_body(full_text, self.max_stored_chars).to_string(),
            page_count,
            created_at: self
                .seq
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        };
        self.docs
            .write()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str, owner_id: Option<&str>) -> Result<Option<DocumentRecord>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .get(id)
            .filter(|r| owner_id.map_or(true, |o| r.owner_id == o))
            .cloned())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        let docs = self.docs.read().unwrap();
        let mut summaries: Vec<(i64, DocumentSummary)> = docs
            .values()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| {
                (
                    r.created_at,
                    DocumentSummary {
                        id: r.id.clone(),
                        filename: r.filename.clone(),
                        kind: r.kind.clone(),
                        page_count: r.page_count,
                        created_at: r.created_at,
                    },
                )
            })
            .collect();
        summaries.sort_by_key(|(ts, _)| std::cmp::Reverse(*ts));
        Ok(summaries.into_iter().map(|(_, s)| s).collect())
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool> {
        let mut docs = self.docs.write().unwrap();
        match docs.get(id) {
            Some(r) if r.owner_id == owner_id => {
                docs.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_analysis(&self, document_id: &str, kind: &str, result_json: &str) -> Result<()> {
        self.analyses.write().unwrap().insert(
            (document_id.to_string(), kind.to_string()),
            result_json.to_string(),
        );
        Ok(())
    }

    async fn get_analysis(&self, document_id: &str, kind: &str) -> Result<Option<String>> {
        Ok(self
            .analyses
            .read()
            .unwrap()
            .get(&(document_id.to_string(), kind.to_string()))
            .cloned())
    }
}
