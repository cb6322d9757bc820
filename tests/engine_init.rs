//! Warm-up lifecycle: the build-or-load singleton runs at most once per
//! process, under any amount of concurrent first access.

mod common;

use std::sync::Arc;

use answersmith::completion::MockCompletionModel;
use answersmith::engine::WarmUpError;
use answersmith::pipeline::PipelineError;

use common::{CountingSource, engine_with, vpn_chunks};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_build_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(vpn_chunks());
    let engine = Arc::new(engine_with(
        &dir,
        source.clone(),
        MockCompletionModel::with_reply("ok"),
        2,
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.run("My VPN is broken", false).await
        }));
    }
    for handle in handles {
        let state = handle.await.unwrap().unwrap();
        assert!(state.answer.is_some());
        assert_eq!(state.context.len(), 2, "every request sees the same index");
    }

    assert_eq!(source.calls(), 1, "the chunk batch must be pulled exactly once");
}

#[tokio::test]
async fn persisted_index_is_loaded_not_rebuilt() {
    let dir = tempfile::tempdir().unwrap();

    let first_source = CountingSource::new(vpn_chunks());
    let first = engine_with(
        &dir,
        first_source.clone(),
        MockCompletionModel::with_reply("ok"),
        2,
    );
    first.warm_up().await.unwrap();
    assert_eq!(first_source.calls(), 1);
    drop(first);

    // A second process lifetime over the same path: load wins, the chunk
    // source is never consulted.
    let second_source = CountingSource::new(vpn_chunks());
    let second = engine_with(
        &dir,
        second_source.clone(),
        MockCompletionModel::with_reply("ok"),
        2,
    );
    let state = second.run("My VPN is broken", false).await.unwrap();
    assert!(state.answer.is_some());
    assert_eq!(second_source.calls(), 0, "load precedence: no rebuild");
}

#[tokio::test]
async fn failed_warm_up_is_cached_for_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::failing();
    let engine = engine_with(
        &dir,
        source.clone(),
        MockCompletionModel::with_reply("never seen"),
        2,
    );

    for _ in 0..3 {
        let err = engine.run("My VPN is broken", false).await.unwrap_err();
        match err {
            PipelineError::WarmUp(WarmUpError::Source(_)) => {}
            other => panic!("expected cached warm-up failure, got {other:?}"),
        }
    }
    assert_eq!(
        source.calls(),
        1,
        "one initialisation attempt runs to completion; later requests observe its outcome"
    );
}

#[tokio::test]
async fn explicit_warm_up_covers_later_requests() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(vpn_chunks());
    let engine = engine_with(
        &dir,
        source.clone(),
        MockCompletionModel::with_reply("ok"),
        2,
    );

    engine.warm_up().await.unwrap();
    let state = engine.run("My VPN is broken", false).await.unwrap();
    assert!(state.answer.is_some());
    assert_eq!(source.calls(), 1, "warm_up and the request share one initialisation");
}
