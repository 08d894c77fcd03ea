//! End-to-end pipeline tests against a real SQLite database.

use std::io::Write;

use tempfile::TempDir;

use docsift::config::{Config, InferenceConfig, StorageConfig};
use docsift::inference::DisabledProvider;
use docsift::models;
use docsift::store::{DocumentStore, SqliteStore};
use docsift::{analysis, db, ingest};

async fn sqlite_store(tmp: &TempDir) -> (Config, SqliteStore) {
    let config = Config {
        storage: StorageConfig {
            path: tmp.path().join("data").join("dsift.sqlite"),
        },
        upload: Default::default(),
        inference: InferenceConfig {
            retry_base_ms: 1,
            ..Default::default()
        },
        chat: Default::default(),
        video: Default::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    db::init_schema(&pool).await.unwrap();
    let store = SqliteStore::new(pool, config.upload.max_stored_chars);
    (config, store)
}

#[tokio::test]
async fn ingest_persists_and_round_trips_pages() {
    let tmp = TempDir::new().unwrap();
    let (config, store) = sqlite_store(&tmp).await;

    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"This agreement is made between the landlord and the tenant.")
        .unwrap();

    let report = ingest::ingest_file(&config, &store, &DisabledProvider, file.path(), "alice")
        .await
        .unwrap();

    // Long enough to classify, but the provider is disabled.
    assert_eq!(report.document_type, analysis::CLASSIFICATION_ERROR);
    assert_eq!(report.record.page_count, 1);

    let stored = store
        .get(&report.record.id, Some("alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(models::split_pages(&stored.body), report.pages);
}

#[tokio::test]
async fn listing_and_deletion_are_owner_scoped() {
    let tmp = TempDir::new().unwrap();
    let (config, store) = sqlite_store(&tmp).await;

    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"Utility bill for the month of March, total due 52 dollars.")
        .unwrap();

    let report = ingest::ingest_file(&config, &store, &DisabledProvider, file.path(), "alice")
        .await
        .unwrap();

    assert_eq!(store.list("alice").await.unwrap().len(), 1);
    assert!(store.list("bob").await.unwrap().is_empty());

    assert!(!store.delete(&report.record.id, "bob").await.unwrap());
    assert!(store.delete(&report.record.id, "alice").await.unwrap());
    assert!(store.list("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn analysis_cache_survives_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let (config, store) = sqlite_store(&tmp).await;

    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"Insurance policy covering accidental damage up to 10,000.")
        .unwrap();

    let report = ingest::ingest_file(&config, &store, &DisabledProvider, file.path(), "alice")
        .await
        .unwrap();
    let id = report.record.id;

    assert!(store.get_analysis(&id, "risks").await.unwrap().is_none());
    store
        .save_analysis(&id, "risks", "{\"overall_risk_score\":10}")
        .await
        .unwrap();
    store
        .save_analysis(&id, "risks", "{\"overall_risk_score\":60}")
        .await
        .unwrap();
    assert_eq!(
        store.get_analysis(&id, "risks").await.unwrap().as_deref(),
        Some("{\"overall_risk_score\":60}")
    );
    // Other kinds stay independent.
    assert!(store.get_analysis(&id, "terms").await.unwrap().is_none());
}
