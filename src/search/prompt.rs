//! Prompt construction from retrieved passages.

use super::Passage;

/// Default system instruction for the answering model.
pub const SYSTEM_PROMPT: &str = "You are an intelligent and helpful assistant that accurately \
answers queries using my memory palace \u{2013} a location where my personal learnings are \
stored. You will be provided with a subset of passages from this memory database, which could \
contain the most likely answer to my query. Please use the context provided to form your \
answer, but try to avoid copying word-for-word from the passages. Use your own knowledge \
database only if you don't find a relavant answer in the provided context and keep your \
answer concise.";

/// Build the user prompt: a header naming the query, then the retrieved
/// passage contents joined by blank lines.
#[must_use]
pub fn answer_prompt(query: &str, passages: &[Passage]) -> String {
    let mut out = format!(
        "Use the following passages from my memory palace to provide an answer to the query: \"{query}\"\n\n"
    );
    let mut first = true;
    for passage in passages {
        if !first {
            out.push_str("\n\n");
        }
        out.push_str(&passage.content);
        first = false;
    }
    out
}
