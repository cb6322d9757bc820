//! Index lifecycle: build, persist, load, query, extend.

mod common;

use answersmith::chunk::Chunk;
use answersmith::embedding::{EmbeddingProvider, MockEmbeddingProvider};
use answersmith::index::{IndexError, SqliteChunkIndex};

use common::{temp_index_path, vpn_chunks};

fn corpus() -> Vec<Chunk> {
    vec![
        Chunk::with_id("c0", "kb", 0, "Reset VPN via portal X"),
        Chunk::with_id("c1", "kb", 1, "Contact network team for VPN issues"),
        Chunk::with_id("c2", "kb", 2, "Printer toner is stored in the supply room"),
        Chunk::with_id("c3", "kb", 3, "Request laptops through the hardware desk"),
    ]
}

#[tokio::test]
async fn build_then_load_round_trips_query_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_index_path(&dir);
    let provider = MockEmbeddingProvider::new();

    let built = SqliteChunkIndex::build(&path, &provider, corpus())
        .await
        .unwrap();
    let question = provider.embed("my vpn is broken").await.unwrap();
    let before = built.query(&question, 3).await.unwrap();

    let loaded = SqliteChunkIndex::load(&path)
        .await
        .unwrap()
        .expect("index was persisted");
    let after = loaded.query(&question, 3).await.unwrap();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.chunk.id, a.chunk.id);
        assert!((b.score - a.score).abs() < 1e-5);
    }
}

#[tokio::test]
async fn query_length_and_ordering_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockEmbeddingProvider::new();
    let index = SqliteChunkIndex::build(temp_index_path(&dir), &provider, corpus())
        .await
        .unwrap();
    let vector = provider.embed("vpn access").await.unwrap();

    // k larger than the corpus: every entry comes back, no padding.
    let all = index.query(&vector, 10).await.unwrap();
    assert_eq!(all.len(), 4);
    for pair in all.windows(2) {
        assert!(
            pair[0].score >= pair[1].score,
            "scores must be non-increasing: {} then {}",
            pair[0].score,
            pair[1].score
        );
    }

    // k smaller than the corpus: exactly k, and they are the best k.
    let top = index.query(&vector, 2).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].chunk.id, all[0].chunk.id);
    assert_eq!(top[1].chunk.id, all[1].chunk.id);
}

#[tokio::test]
async fn vpn_question_ranks_vpn_chunks_first() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockEmbeddingProvider::new();
    let index = SqliteChunkIndex::build(temp_index_path(&dir), &provider, corpus())
        .await
        .unwrap();
    let vector = provider.embed("My VPN is broken").await.unwrap();

    let top = index.query(&vector, 2).await.unwrap();
    let ids: Vec<&str> = top.iter().map(|s| s.chunk.id.as_str()).collect();
    assert!(ids.contains(&"c0") && ids.contains(&"c1"), "got {ids:?}");
}

#[tokio::test]
async fn empty_build_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockEmbeddingProvider::new();
    let err = SqliteChunkIndex::build(temp_index_path(&dir), &provider, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::EmptyBuild));
    // All-or-nothing: the failed build must not leave a store behind.
    assert!(
        SqliteChunkIndex::load(temp_index_path(&dir))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn load_from_untouched_path_is_absent_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = SqliteChunkIndex::load(dir.path().join("nothing-here.db"))
        .await
        .unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockEmbeddingProvider::new();
    let index = SqliteChunkIndex::build(temp_index_path(&dir), &provider, vpn_chunks())
        .await
        .unwrap();

    let wrong = vec![0.5f32; index.dimension() + 1];
    let err = index.query(&wrong, 3).await.unwrap_err();
    assert!(matches!(err, IndexError::Dimension { .. }));
}

#[tokio::test]
async fn add_makes_new_chunks_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_index_path(&dir);
    let provider = MockEmbeddingProvider::new();
    let index = SqliteChunkIndex::build(&path, &provider, vpn_chunks())
        .await
        .unwrap();
    assert_eq!(index.len().await.unwrap(), 2);

    index
        .add(
            &provider,
            vec![Chunk::with_id("c9", "kb", 2, "Badge readers are managed by facilities")],
        )
        .await
        .unwrap();
    assert_eq!(index.len().await.unwrap(), 3);

    // The addition is persisted, not just in memory.
    let reloaded = SqliteChunkIndex::load(&path).await.unwrap().unwrap();
    let vector = provider.embed("badge readers facilities").await.unwrap();
    let top = reloaded.query(&vector, 1).await.unwrap();
    assert_eq!(top[0].chunk.id, "c9");
}

#[tokio::test]
async fn rebuilding_replaces_the_previous_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_index_path(&dir);
    let provider = MockEmbeddingProvider::new();

    SqliteChunkIndex::build(&path, &provider, corpus())
        .await
        .unwrap();
    let rebuilt = SqliteChunkIndex::build(&path, &provider, vpn_chunks())
        .await
        .unwrap();
    assert_eq!(rebuilt.len().await.unwrap(), 2);
}
