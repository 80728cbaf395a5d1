//! Tool-driven answer loop against the in-memory store and a scripted model.

mod common;

use common::*;
use groundwork::agent::{AgentError, ChatRequest, HistoryMessage, HistoryRole, Termination};
use groundwork::cancel::{cancel_pair, CancelToken};
use groundwork_core::llm::{ModelTurn, Role};
use groundwork_core::models::{ActivityAction, Document};
use groundwork_core::prompt::{FOUND_BUT_FAILED_ANSWER, NOTHING_FOUND_ANSWER};
use groundwork_core::store::Store;
use std::time::Duration;

async fn store_doc(h: &Harness, owner: &str, filename: &str, content: &str) -> Document {
    let doc = Document::new(owner, filename, content);
    h.store.upsert_document(&doc).await.unwrap();
    doc
}

const TAX_TEXT: &str = "Form 1040 summary. Your AGI (adjusted gross income) for 2023 was $85,000.";

#[tokio::test]
async fn test_stalled_loop_recovers_from_first_citation() {
    let model = ScriptedModel::new(vec![
        tool_turn(&[("search_documents", r#"{"query":"AGI"}"#)]),
        ModelTurn::default(),
        ModelTurn::text("Your AGI for 2023 was $85,000 [taxes-2023.txt]."),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    let doc = store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;
    store_doc(&h, "alice", "recipes.txt", "Bake at 180 degrees.").await;

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "What is my AGI?"), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(response.answer, "Your AGI for 2023 was $85,000 [taxes-2023.txt].");
    assert_eq!(response.termination, Termination::Stalled);
    assert!(response.recovered);
    assert_eq!(response.tool_call_count, 1);
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].document_id, doc.id);
    assert_eq!(response.activities.len(), 1);
    assert_eq!(response.activities[0].action, ActivityAction::Search);
    assert_eq!(response.activities[0].details, "AGI");
    assert_eq!(response.tool_call_details[0].tool_name, "search_documents");
    assert_eq!(response.tool_call_details[0].result["total"], 1);

    assert_eq!(h.model.calls(), 3);
    let recovery = h.model.request(2);
    assert!(recovery.tools.is_empty());
    let prompt = &recovery.messages[0].content;
    assert!(prompt.starts_with("Based on the following document, answer this question: \"What is my AGI?\""));
    assert!(prompt.contains("Document: taxes-2023.txt"));
    assert!(prompt.contains("$85,000"));
}

#[tokio::test]
async fn test_tool_results_are_fed_back_in_call_order() {
    let model = ScriptedModel::new(vec![
        tool_turn(&[
            ("search_documents", r#"{"query":"form"}"#),
            ("search_documents", r#"{"query":"bake"}"#),
        ]),
        ModelTurn::text("Done."),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;
    store_doc(&h, "alice", "recipes.txt", "Bake at 180 degrees.").await;

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "summarize"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.termination, Termination::Answered);
    assert!(!response.recovered);
    assert_eq!(response.tool_call_count, 2);
    assert_eq!(response.citations.len(), 2);
    assert_eq!(response.citations[0].filename, "taxes-2023.txt");
    assert_eq!(response.citations[1].filename, "recipes.txt");
    assert!(response.citations[0]
        .snippet
        .as_deref()
        .unwrap()
        .contains("<b>Form</b>"));

    let second = h.model.request(1);
    let tail: Vec<_> = second.messages.iter().rev().take(3).collect();
    assert_eq!(tail[2].role, Role::Assistant);
    assert_eq!(tail[2].tool_calls.len(), 2);
    assert_eq!(tail[1].tool_call_id.as_deref(), Some("call_1"));
    assert!(tail[1].content.contains("taxes-2023.txt"));
    assert_eq!(tail[0].tool_call_id.as_deref(), Some("call_2"));
    assert!(tail[0].content.contains("recipes.txt"));
}

#[tokio::test]
async fn test_repeated_citations_keep_last_metadata() {
    let doc = Document::new("alice", "taxes-2023.txt", TAX_TEXT);
    let fetch_args = format!(r#"{{"documentId":"{}","maxLength":10}}"#, doc.id);
    let model = ScriptedModel::new(vec![
        tool_turn(&[("search_documents", r#"{"query":"AGI"}"#)]),
        tool_turn(&[("get_document", fetch_args.as_str())]),
        ModelTurn::text("It was $85,000."),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    h.store.upsert_document(&doc).await.unwrap();

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.tool_call_count, 2);
    assert_eq!(response.citations.len(), 1);
    // The fetch ran last; its snippet is document text only.
    assert_eq!(response.citations[0].snippet.as_deref(), Some("Form 1040 "));
    assert!(response.tool_call_details[1].result["content"]
        .as_str()
        .unwrap()
        .ends_with("[Content truncated...]"));
    assert_eq!(response.activities[1].action, ActivityAction::Retrieve);
    assert_eq!(response.tool_call_details[1].result["success"], true);
    assert_eq!(response.tool_call_details[1].result["size"], TAX_TEXT.chars().count());
}

#[tokio::test]
async fn test_malformed_arguments_are_reported_to_model() {
    let model = ScriptedModel::new(vec![
        tool_turn(&[("get_document", "{documentId: nope")]),
        tool_turn(&[("get_document", "{}")]),
        ModelTurn::text("I could not open that document."),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "open it"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.termination, Termination::Answered);
    assert_eq!(response.answer, "I could not open that document.");
    assert_eq!(response.tool_call_count, 2);
    assert!(response.citations.is_empty());
    assert!(response.tool_call_details[0].result["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid arguments for get_document"));
    assert!(response.tool_call_details[1].result["error"]
        .as_str()
        .unwrap()
        .contains("documentId"));

    let second = h.model.request(1);
    let last = second.messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert!(last.content.contains("\"error\""));
}

#[tokio::test]
async fn test_fetch_of_foreign_document_reports_not_found() {
    let foreign = Document::new("bob", "secret.txt", "Bob's secret.");
    let args = format!(r#"{{"documentId":"{}"}}"#, foreign.id);
    let model = ScriptedModel::new(vec![
        tool_turn(&[("get_document", args.as_str())]),
        ModelTurn::text("No access."),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    h.store.upsert_document(&foreign).await.unwrap();

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "read bob's file"), &CancelToken::never())
        .await
        .unwrap();
    let result = &response.tool_call_details[0].result;
    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "Document not found or you do not have access to it.");
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn test_turn_limit_falls_back_when_recovery_is_empty() {
    let mut config = test_config();
    config.agent.max_turns = 3;
    let model = ScriptedModel::new(vec![])
        .repeating(tool_turn(&[("search_documents", r#"{"query":"AGI"}"#)]));
    let h = harness(config, TableEmbedder::new(), model);
    store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.termination, Termination::TurnLimit);
    assert_eq!(response.tool_call_count, 3);
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.answer, FOUND_BUT_FAILED_ANSWER);
    // Three loop turns plus one recovery attempt.
    assert_eq!(h.model.calls(), 4);
}

#[tokio::test]
async fn test_recovery_failure_falls_back() {
    let model = ScriptedModel::new(vec![
        tool_turn(&[("search_documents", r#"{"query":"AGI"}"#)]),
        ModelTurn::default(),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.answer, FOUND_BUT_FAILED_ANSWER);
    assert!(response.recovered);
}

#[tokio::test]
async fn test_nothing_found_fallback() {
    let model = ScriptedModel::new(vec![
        tool_turn(&[("search_documents", r#"{"query":"unicorns"}"#)]),
        ModelTurn::default(),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "unicorns?"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.answer, NOTHING_FOUND_ANSWER);
    assert!(response.citations.is_empty());
    assert_eq!(response.tool_call_count, 1);
    assert_eq!(h.model.calls(), 2);
}

#[tokio::test]
async fn test_empty_answer_without_tools_uses_nothing_found() {
    let h = harness(test_config(), TableEmbedder::new(), ScriptedModel::new(vec![]));

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "hello"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.termination, Termination::Stalled);
    assert_eq!(response.answer, NOTHING_FOUND_ANSWER);
    assert_eq!(response.tool_call_count, 0);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let h = harness(test_config(), TableEmbedder::new(), ScriptedModel::new(vec![]));
    let (handle, token) = cancel_pair();
    handle.cancel();

    let err = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_cancel_interrupts_model_call() {
    let model = ScriptedModel::new(vec![])
        .repeating(tool_turn(&[("search_documents", r#"{"query":"AGI"}"#)]))
        .delayed(Duration::from_secs(30));
    let h = harness(test_config(), TableEmbedder::new(), model);
    let (handle, token) = cancel_pair();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        h.app.agent.chat(&ChatRequest::new("alice", "AGI?"), &token),
    )
    .await
    .expect("cancellation should end the loop promptly");
    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert_eq!(h.model.calls(), 1);
}

#[tokio::test]
async fn test_zero_deadline_terminates_without_model_calls() {
    let mut config = test_config();
    config.agent.deadline_secs = 0;
    let h = harness(config, TableEmbedder::new(), ScriptedModel::new(vec![]));

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.termination, Termination::Deadline);
    assert_eq!(response.answer, NOTHING_FOUND_ANSWER);
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_recovery_is_skipped_once_deadline_is_spent() {
    let mut config = test_config();
    config.agent.deadline_secs = 1;
    let model = ScriptedModel::new(vec![tool_turn(&[("search_documents", r#"{"query":"AGI"}"#)])])
        .repeating(ModelTurn::text("late answer"))
        .delayed(Duration::from_millis(700));
    let h = harness(config, TableEmbedder::new(), model);
    store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;

    let started = std::time::Instant::now();
    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(response.termination, Termination::Deadline);
    assert!(response.recovered);
    assert_eq!(response.answer, FOUND_BUT_FAILED_ANSWER);
    assert_eq!(response.citations.len(), 1);
    assert_eq!(h.model.calls(), 2);
    assert!(started.elapsed() < Duration::from_millis(1400), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_out_of_range_page_is_reported_to_model() {
    let model = ScriptedModel::new(vec![
        tool_turn(&[("search_documents", r#"{"query":"x","page":18446744073709551615}"#)]),
        ModelTurn::text("No such page."),
    ]);
    let h = harness(test_config(), TableEmbedder::new(), model);
    store_doc(&h, "alice", "taxes-2023.txt", TAX_TEXT).await;

    let response = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "page?"), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(response.termination, Termination::Answered);
    assert_eq!(response.answer, "No such page.");
    assert_eq!(response.tool_call_count, 1);
    assert!(response.citations.is_empty());
    let error = response.tool_call_details[0].result["error"].as_str().unwrap();
    assert!(error.contains("out of range"), "{error}");
}

#[tokio::test]
async fn test_model_error_propagates() {
    let h = harness(test_config(), TableEmbedder::new(), ScriptedModel::failing("rate limited"));

    let err = h
        .app
        .agent
        .chat(&ChatRequest::new("alice", "AGI?"), &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Model(_)));
    assert!(err.to_string().contains("rate limited"));
}

#[tokio::test]
async fn test_referenced_documents_are_inlined_and_cited() {
    let h = harness(
        test_config(),
        TableEmbedder::new(),
        ScriptedModel::new(vec![ModelTurn::text("Per notes.md, the meeting is Monday.")]),
    );
    let notes = store_doc(&h, "alice", "notes.md", "Meeting moved to Monday.").await;

    let mut request = ChatRequest::new("alice", "When is the meeting?");
    request.history = vec![
        HistoryMessage {
            role: HistoryRole::User,
            content: "Hi".to_string(),
        },
        HistoryMessage {
            role: HistoryRole::Assistant,
            content: "Hello! How can I help?".to_string(),
        },
    ];
    request.referenced_document_ids = vec![notes.id.clone()];

    let response = h.app.agent.chat(&request, &CancelToken::never()).await.unwrap();
    assert_eq!(response.answer, "Per notes.md, the meeting is Monday.");
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].document_id, notes.id);

    let sent = h.model.request(0);
    assert_eq!(sent.messages.len(), 3);
    assert_eq!(sent.messages[0].content, "Hi");
    assert_eq!(sent.messages[1].role, Role::Assistant);
    let question = &sent.messages[2].content;
    assert!(question.starts_with("When is the meeting?\n\n---\n\nReferenced Documents:"));
    assert!(question.contains("### notes.md\n\nMeeting moved to Monday."));
    assert_eq!(sent.tools.len(), 2);
}

#[tokio::test]
async fn test_missing_referenced_document_is_an_error() {
    let h = harness(test_config(), TableEmbedder::new(), ScriptedModel::new(vec![]));
    let foreign = store_doc(&h, "bob", "bob.txt", "private").await;

    let mut request = ChatRequest::new("alice", "What does it say?");
    request.referenced_document_ids = vec![foreign.id.clone()];

    let err = h.app.agent.chat(&request, &CancelToken::never()).await.unwrap_err();
    assert!(matches!(err, AgentError::DocumentNotFound(id) if id == foreign.id));
    assert_eq!(h.model.calls(), 0);
}
