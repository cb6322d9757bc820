//! Demo: blocking question answering over a small knowledge base.
//!
//! Builds an engine entirely from the exported mock backends, warms the
//! index up once, then runs two questions through the blocking pipeline
//! (one the knowledge base covers, one it does not) with classification
//! requested for both.
//!
//! Run with:
//!   cargo run --example ask

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use answersmith::chunk::StaticSource;
use answersmith::completion::MockCompletionModel;
use answersmith::config::EngineConfig;
use answersmith::embedding::MockEmbeddingProvider;
use answersmith::engine::AnswerEngine;

fn knowledge_base() -> StaticSource {
    StaticSource::from_texts(
        "it-handbook",
        [
            "Reset VPN via portal X",
            "Contact network team for VPN issues",
            "Printer toner is stored in the supply room",
            "Request laptops through the hardware desk",
        ],
    )
}

/// Scripted stand-in for a real chat backend: classification prompts get a
/// label, grounded prompts get an answer (or an honest gap admission).
fn scripted_model() -> MockCompletionModel {
    MockCompletionModel::with_handler(|prompt| {
        if prompt.contains("Classify") {
            Ok("Network & connectivity".to_string())
        } else if prompt.contains("holiday") {
            Ok("The knowledge base does not contain information about the \
                holiday schedule."
                .to_string())
        } else {
            Ok("Reset the VPN via portal X; if that does not help, contact \
                the network team."
                .to_string())
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    println!("=== answersmith: blocking ask demo ===\n");

    let dir = tempfile::tempdir()?;
    let config = EngineConfig::default()
        .with_index_path(dir.path().join("demo_index.db"))
        .with_top_k(2);
    let engine = AnswerEngine::new(
        config,
        Arc::new(knowledge_base()),
        Arc::new(MockEmbeddingProvider::new()),
        Arc::new(scripted_model()),
    );

    println!("Warming up (build-or-load happens exactly once)...");
    engine.warm_up().await?;

    for question in ["My VPN is broken", "What is the company holiday schedule?"] {
        println!("\n--- Question: {question}");
        let state = engine.run(question, true).await?;

        println!("Classification: {}", state.classification.as_deref().unwrap_or("-"));
        println!("Context ({} chunks):", state.context.len());
        for scored in &state.context {
            println!("  [{:.3}] {}", scored.score, scored.chunk.text);
        }
        println!("Answer: {}", state.answer.as_deref().unwrap_or("-"));
    }

    println!("\nDone.");
    Ok(())
}
