//! Demo: streaming answers frame by frame.
//!
//! The same engine as the blocking demo, but the answer arrives as a
//! sequence of tagged frames: zero or more `Delta`s followed by exactly one
//! `Done` or `Error`. A second engine with a deliberately broken backend
//! shows the error framing; the stream still terminates explicitly.
//!
//! Run with:
//!   cargo run --example stream_answer

use std::io::Write;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use answersmith::chunk::StaticSource;
use answersmith::completion::MockCompletionModel;
use answersmith::config::EngineConfig;
use answersmith::embedding::MockEmbeddingProvider;
use answersmith::engine::AnswerEngine;
use answersmith::relay::StreamFrame;

fn engine(dir: &tempfile::TempDir, model: MockCompletionModel) -> AnswerEngine {
    let source = StaticSource::from_texts(
        "it-handbook",
        [
            "Reset VPN via portal X",
            "Contact network team for VPN issues",
        ],
    );
    let config = EngineConfig::default()
        .with_index_path(dir.path().join("stream_index.db"))
        .with_top_k(2);
    AnswerEngine::new(
        config,
        Arc::new(source),
        Arc::new(MockEmbeddingProvider::new()),
        Arc::new(model),
    )
}

async fn print_frames(engine: &AnswerEngine, question: &str) {
    println!("--- Question: {question}");
    let mut frames = engine.run_stream(question).await;
    while let Some(frame) = frames.next().await {
        match frame {
            StreamFrame::Delta(text) => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            StreamFrame::Done => println!("\n[done]"),
            StreamFrame::Error(message) => println!("\n[error] {message}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    println!("=== answersmith: streaming demo ===\n");

    let clean_dir = tempfile::tempdir()?;
    let clean = engine(
        &clean_dir,
        MockCompletionModel::with_reply(
            "Reset the VPN via portal X; if that does not help, contact the network team.",
        ),
    );
    print_frames(&clean, "My VPN is broken").await;

    println!("\nNow with a backend that dies after two deltas:\n");
    let broken_dir = tempfile::tempdir()?;
    let broken = engine(
        &broken_dir,
        MockCompletionModel::with_reply("This answer never finishes properly.")
            .break_stream_after(2),
    );
    print_frames(&broken, "My VPN is broken").await;

    println!("\nEvery stream ended with exactly one terminal frame.");
    Ok(())
}
