#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB vector store with realistic data
use docs_qa::database::{
    EntryMetadata, IndexEntry, IndexSpec, IndexStatus, LanceVectorStore, Similarity, VectorStore,
};
use docs_qa::document::DocumentMetadata;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 768;
const INDEX: &str = "coach-index-1";

fn spec() -> IndexSpec {
    IndexSpec {
        dimension: DIMENSION,
        similarity: Similarity::Cosine,
    }
}

fn realistic_vector(variation: f32) -> Vec<f32> {
    (0..DIMENSION)
        .map(|i| (i as f32).mul_add(0.01, variation).sin() * 0.1)
        .collect()
}

fn entry(text: &str, page: u32, variation: f32) -> IndexEntry {
    IndexEntry {
        text: text.to_string(),
        vector: realistic_vector(variation),
        metadata: EntryMetadata {
            document: DocumentMetadata {
                source: "researchJournal".to_string(),
                page,
            },
            chunk_index: 0,
        },
    }
}

fn store_uri(temp_dir: &TempDir) -> String {
    temp_dir.path().join("vectors").to_string_lossy().into_owned()
}

#[tokio::test]
async fn entries_survive_reconnect() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    {
        let store = LanceVectorStore::connect(&store_uri(&temp_dir), INDEX)
            .await
            .expect("should connect");
        store.create_index(&spec()).await.expect("should create index");
        store
            .add_entries(vec![
                entry("Methods: randomized controlled trial.", 0, 0.0),
                entry("Results: healing time shortened.", 1, 1.5),
                entry("Discussion: limitations of the study.", 2, 3.0),
            ])
            .await
            .expect("should add entries");
    }

    let store = LanceVectorStore::connect(&store_uri(&temp_dir), INDEX)
        .await
        .expect("should reconnect");

    assert_eq!(store.describe().await.expect("should describe"), Some(spec()));
    assert_eq!(store.count().await.expect("should count"), 3);
    assert_eq!(
        store.create_index(&spec()).await.expect("should accept identical parameters"),
        IndexStatus::AlreadyExists
    );

    let hits = store
        .search(&realistic_vector(1.5), 4)
        .await
        .expect("should search");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].text, "Results: healing time shortened.");
    assert_eq!(hits[0].metadata.document.page, 1);
    assert!((hits[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn separate_indices_do_not_mix() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let uri = store_uri(&temp_dir);

    let first = LanceVectorStore::connect(&uri, "first-index")
        .await
        .expect("should connect");
    let second = LanceVectorStore::connect(&uri, "second-index")
        .await
        .expect("should connect");
    first.create_index(&spec()).await.expect("should create first");
    second
        .create_index(&IndexSpec {
            dimension: 4,
            similarity: Similarity::Euclidean,
        })
        .await
        .expect("should create second with other parameters");

    first
        .add_entries(vec![entry("only in first", 0, 0.0)])
        .await
        .expect("should add entry");

    assert_eq!(first.count().await.expect("should count"), 1);
    assert_eq!(second.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn concurrent_writes_get_unique_sequence_numbers() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = Arc::new(
        LanceVectorStore::connect(&store_uri(&temp_dir), INDEX)
            .await
            .expect("should connect"),
    );
    store.create_index(&spec()).await.expect("should create index");

    let mut handles = Vec::new();
    for writer in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let entries = (0..5)
                .map(|i| entry(&format!("writer {} chunk {}", writer, i), writer, i as f32))
                .collect();
            store.add_entries(entries).await
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("writer should finish")
            .expect("write should succeed");
    }

    assert_eq!(store.count().await.expect("should count"), 20);

    let hits = store
        .search(&realistic_vector(0.0), 20)
        .await
        .expect("should search");
    let seqs: HashSet<u64> = hits.iter().map(|hit| hit.seq).collect();
    assert_eq!(seqs.len(), 20);
    assert!(seqs.iter().all(|seq| *seq < 20));
}
