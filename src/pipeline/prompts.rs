//! Prompt templates for the classification and generation stages.
//!
//! The generation prompt concatenates the retrieved chunk texts in
//! retrieval order, blank-line separated, ahead of the question, and
//! instructs the model to answer only from that context and to say so when
//! the context is insufficient. The classification prompt carries the raw
//! question only; retrieved context never leaks into it.

use crate::index::ScoredChunk;

pub(crate) fn classification(question: &str) -> String {
    format!(
        "You are an IT support assistant. Classify the user's question and name \
         the department or support team best placed to resolve it. Keep the tone \
         friendly and answer briefly and to the point.\n\
         \n\
         User question:\n\
         {question}\n"
    )
}

pub(crate) fn grounded_answer(context: &[ScoredChunk], question: &str) -> String {
    let knowledge_base = context
        .iter()
        .map(|scored| scored.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are an IT support assistant. Answer the user's question using only \
         the knowledge base below.\n\
         \n\
         Knowledge base:\n\
         {knowledge_base}\n\
         \n\
         User question: {question}\n\
         \n\
         Answer as thoroughly and helpfully as you can. If the knowledge base \
         does not contain the information, say so honestly.\n"
    )
}
