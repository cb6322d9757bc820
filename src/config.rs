//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::retriever::DEFAULT_TOP_K;

/// Settings for the engine and its index lifecycle.
///
/// Values come from the environment (`.env` files are honoured via
/// `dotenvy`) with sensible defaults; backend credentials live on the HTTP
/// client constructors instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where the persisted index lives. One path identifies one index for
    /// the process lifetime.
    pub index_path: PathBuf,
    /// Knowledge-base text file used when the index must be built.
    pub knowledge_base: PathBuf,
    /// Chunks retrieved per question.
    pub top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("support_index.db"),
            knowledge_base: PathBuf::from("data/knowledge_base.txt"),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl EngineConfig {
    /// Configuration from `ANSWERSMITH_INDEX_PATH`,
    /// `ANSWERSMITH_KNOWLEDGE_BASE`, and `ANSWERSMITH_TOP_K`, falling back
    /// to the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(path) = std::env::var("ANSWERSMITH_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("ANSWERSMITH_KNOWLEDGE_BASE") {
            config.knowledge_base = PathBuf::from(path);
        }
        if let Ok(k) = std::env::var("ANSWERSMITH_TOP_K")
            && let Ok(k) = k.parse::<usize>()
            && k > 0
        {
            config.top_k = k;
        }
        config
    }

    /// Override the index path.
    #[must_use]
    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }

    /// Override the knowledge-base path.
    #[must_use]
    pub fn with_knowledge_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base = path.into();
        self
    }

    /// Override the retrieval count (minimum 1).
    #[must_use]
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k.max(1);
        self
    }
}
