use super::*;
use tempfile::TempDir;

const TEST_DIMENSION: u32 = 4;

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::load(temp_dir.path()).expect("Failed to load config");
    config.ollama.embedding_dimension = TEST_DIMENSION;
    config
}

fn test_record(id: &str, embedding: Vec<f32>, text: &str) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        embedding,
        text: text.to_string(),
        metadata: ChunkMetadata {
            document_name: "manual".to_string(),
            source: "manual.pdf".to_string(),
            page_number: 1,
            chunk_id: id.to_string(),
            chunk_index: 0,
            token_length: 2,
            ingestion_time: "2026-01-01T00:00:00+00:00".to_string(),
        },
    }
}

#[tokio::test]
async fn store_initialization() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);

    let store = VectorStore::new(&config).await.expect("Failed to create store");

    assert_eq!(store.table_name, "documents");
    assert_eq!(store.dimension, TEST_DIMENSION as usize);
    assert!(config.index_manifest_path().exists());
    assert_eq!(store.count().await.expect("Failed to count"), 0);
}

#[tokio::test]
async fn add_and_count() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    let stored = store
        .add(vec![
            test_record("a_p1_0", vec![0.1, 0.2, 0.3, 0.4], "first chunk"),
            test_record("a_p1_1", vec![0.5, 0.6, 0.7, 0.8], "second chunk"),
        ])
        .await
        .expect("Failed to add records");

    assert_eq!(stored, 2);
    assert_eq!(store.count().await.expect("Failed to count"), 2);
}

#[tokio::test]
async fn upsert_same_id_does_not_grow() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    store
        .add(vec![test_record("a_p1_0", vec![0.1, 0.2, 0.3, 0.4], "original")])
        .await
        .expect("Failed to add record");
    store
        .add(vec![test_record("a_p1_0", vec![0.1, 0.2, 0.3, 0.4], "updated")])
        .await
        .expect("Failed to upsert record");

    assert_eq!(store.count().await.expect("Failed to count"), 1);

    let matches = store.search(&[0.1, 0.2, 0.3, 0.4], 5).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].text, "updated");
}

#[tokio::test]
async fn invalid_records_skipped_not_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    let stored = store
        .add(vec![
            test_record("", vec![0.1, 0.2, 0.3, 0.4], "missing id"),
            test_record("bad_dim", vec![0.1, 0.2], "wrong dimension"),
            test_record("bad_nan", vec![0.1, f32::NAN, 0.3, 0.4], "non-finite"),
            test_record("bad_text", vec![0.1, 0.2, 0.3, 0.4], ""),
            test_record("good", vec![0.1, 0.2, 0.3, 0.4], "kept"),
        ])
        .await
        .expect("Batch with invalid records should not fail");

    assert_eq!(stored, 1);
    assert_eq!(store.count().await.expect("Failed to count"), 1);
}

#[tokio::test]
async fn empty_batch_is_noop() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    let stored = store.add(Vec::new()).await.expect("Empty batch should succeed");

    assert_eq!(stored, 0);
    assert_eq!(store.count().await.expect("Failed to count"), 0);
}

#[tokio::test]
async fn search_orders_by_distance_and_caps() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    store
        .add(vec![
            test_record("far", vec![10.0, 10.0, 10.0, 10.0], "far away"),
            test_record("near", vec![1.0, 0.0, 0.0, 0.0], "very close"),
            test_record("mid", vec![3.0, 0.0, 0.0, 0.0], "somewhere between"),
        ])
        .await
        .expect("Failed to add records");

    let matches = store.search(&[1.0, 0.0, 0.0, 0.0], 2).await;

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].text, "very close");
    assert_eq!(matches[1].text, "somewhere between");
    assert!(matches[0].score <= matches[1].score);
}

#[tokio::test]
async fn search_empty_store_returns_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    let matches = store.search(&[0.1, 0.2, 0.3, 0.4], 5).await;

    assert!(matches.is_empty());
}

#[tokio::test]
async fn search_top_k_exceeding_corpus_returns_all() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    store
        .add(vec![
            test_record("a", vec![0.1, 0.2, 0.3, 0.4], "one"),
            test_record("b", vec![0.5, 0.6, 0.7, 0.8], "two"),
        ])
        .await
        .expect("Failed to add records");

    let matches = store.search(&[0.1, 0.2, 0.3, 0.4], 50).await;

    assert_eq!(matches.len(), 2);
}

#[tokio::test]
async fn mismatched_query_dimension_degrades_to_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    store
        .add(vec![test_record("a", vec![0.1, 0.2, 0.3, 0.4], "one")])
        .await
        .expect("Failed to add record");

    let matches = store.search(&[0.1, 0.2], 5).await;

    assert!(matches.is_empty());
}

#[tokio::test]
async fn reset_clears_records() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let store = VectorStore::new(&config).await.expect("Failed to create store");

    store
        .add(vec![test_record("a", vec![0.1, 0.2, 0.3, 0.4], "one")])
        .await
        .expect("Failed to add record");
    assert_eq!(store.count().await.expect("Failed to count"), 1);

    store.reset().await.expect("Failed to reset store");

    assert_eq!(store.count().await.expect("Failed to count"), 0);
}

#[tokio::test]
async fn manifest_mismatch_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);

    drop(VectorStore::new(&config).await.expect("Failed to create store"));

    let mut changed = test_config(&temp_dir);
    changed.ollama.model = "some-other-model:latest".to_string();

    let result = VectorStore::new(&changed).await;
    assert!(matches!(result, Err(crate::RagError::Config(_))));
}

#[tokio::test]
async fn manifest_dimension_change_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);

    drop(VectorStore::new(&config).await.expect("Failed to create store"));

    let mut changed = test_config(&temp_dir);
    changed.ollama.embedding_dimension = 8;

    let result = VectorStore::new(&changed).await;
    assert!(matches!(result, Err(crate::RagError::Config(_))));
}

#[tokio::test]
async fn failed_initialization_writes_no_manifest() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);

    // A regular file where the vector directory should go makes setup fail.
    std::fs::write(config.vector_database_path(), b"").expect("Failed to write blocker");

    let result = VectorStore::new(&config).await;

    assert!(result.is_err());
    assert!(!config.index_manifest_path().exists());
}

#[tokio::test]
async fn reopen_with_matching_manifest_succeeds() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);

    {
        let store = VectorStore::new(&config).await.expect("Failed to create store");
        store
            .add(vec![test_record("a", vec![0.1, 0.2, 0.3, 0.4], "one")])
            .await
            .expect("Failed to add record");
    }

    let reopened = VectorStore::new(&config).await.expect("Failed to reopen store");
    assert_eq!(reopened.count().await.expect("Failed to count"), 1);
}
