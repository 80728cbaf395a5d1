//! Prompt text and fixed answers used by the answer paths.

use crate::models::{Document, VectorHit};

/// Answer returned without calling the model when retrieval finds nothing
/// above the similarity threshold.
pub const NO_EVIDENCE_ANSWER: &str = "I couldn't find any relevant information in your documents to answer this question. Please make sure you've uploaded relevant documents or try rephrasing your question.";

/// Answer used when documents were found but no text could be generated.
pub const FOUND_BUT_FAILED_ANSWER: &str = "I found relevant documents but encountered an issue generating a response. Please try asking your question again.";

/// Answer used when the tool loop ends empty-handed.
pub const NOTHING_FOUND_ANSWER: &str = "I searched through your documents but couldn't find any information related to your question. Please make sure you've uploaded the relevant documents.";

/// System prompt for the tool-driven chat loop.
pub const AGENT_SYSTEM_PROMPT: &str = r#"You are a research assistant that answers questions using the user's uploaded documents.

You can call two tools:
1. search_documents - keyword search over the user's documents, with optional type, year, and date filters
2. get_document - fetch the full text of one document by id

How to work:
1. Search before answering. Try several short keyword variations of the question and expand acronyms (for example "adjusted gross income" instead of "AGI").
2. Fetch a document with get_document when the search snippets are not enough.
3. Answer only from what the documents say and cite every source as [filename].
4. If nothing relevant turns up, say that the documents do not contain the answer.

If the question contains a "Referenced Documents:" section, the user already chose the documents: answer from those directly without searching, and cite them as [filename].

Keep answers concise and focused on the question."#;

/// Build the grounding system prompt listing each hit under a `[n]` tag.
pub fn grounding_prompt(hits: &[VectorHit]) -> String {
    let sources = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{} From \"{}\" (chunk {}):\n{}\n",
                source_tag(i),
                hit.filename.as_deref().unwrap_or("Unknown"),
                hit.chunk_index() + 1,
                hit.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a research assistant that helps users understand their uploaded documents.\n\n\
         The excerpts below were retrieved as relevant to the user's question. Each one is tagged with a source identifier such as [1] or [2].\n\n\
         {sources}\n\
         When you answer, cite the source identifiers (e.g. [1], [2]) right after the sentence or paragraph that uses them. List every identifier that contributed when several sources support the same point.\n\n\
         If the excerpts do not contain enough information to answer fully, say so plainly and answer only as far as the excerpts allow. Do not invent facts."
    )
}

/// The `[n]` tag of the hit at position `index` (zero-based).
pub fn source_tag(index: usize) -> String {
    format!("[{}]", index + 1)
}

/// One-shot prompt used to recover from a stalled tool loop.
pub fn recovery_prompt(question: &str, filename: &str, content: &str, max_chars: usize) -> String {
    let excerpt: String = content.chars().take(max_chars).collect();
    format!(
        "Based on the following document, answer this question: \"{question}\"\n\n\
         Document: {filename}\n\
         Content:\n{excerpt}\n\n\
         Please provide a concise answer and cite the document name in your response."
    )
}

/// Context block appended to a question for documents the user referenced.
pub fn referenced_documents_context(docs: &[Document]) -> String {
    if docs.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n---\n\nReferenced Documents:\n\n");
    for doc in docs {
        if doc.content.trim().is_empty() {
            out.push_str(&format!(
                "### {}\n\n[Document is still being processed or contains no extractable text]\n\n---\n\n",
                doc.filename
            ));
        } else {
            out.push_str(&format!("### {}\n\n{}\n\n---\n\n", doc.filename, doc.content));
        }
    }
    out
}
