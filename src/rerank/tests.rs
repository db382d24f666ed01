use super::*;
use crate::config::OllamaConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUESTION: &str = "How do I enable caching?";

async fn mock_score(server: &MockServer, passage: &str, reply: serde_json::Value) {
    let prompt = json!({ "query": QUESTION, "passage": passage }).to_string();
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "reranker",
            "prompt": prompt,
            "stream": false,
            "temperature": 0.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .expect(1)
        .mount(server)
        .await;
}

fn reranker_for(server: &MockServer, concurrency: usize) -> Reranker {
    let mut config = OllamaConfig::default();
    config
        .set_base_url(&server.uri())
        .expect("mock server uri should be valid");
    let client = OllamaClient::new(&config).expect("should create client");
    Reranker::new(client, "reranker", concurrency)
}

fn passages(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| (*t).to_string()).collect()
}

#[test]
fn parse_score_reads_leading_number() {
    assert!((parse_score("0.87") - 0.87).abs() < 1e-6);
    assert!((parse_score("  0.5 because it matches") - 0.5).abs() < 1e-6);
    assert!((parse_score("-1.25") + 1.25).abs() < 1e-6);
    assert!((parse_score("3e-1") - 0.3).abs() < 1e-6);
    assert!((parse_score("0.8.") - 0.8).abs() < 1e-6);
    assert!((parse_score("7e") - 7.0).abs() < 1e-6);
}

#[test]
fn parse_score_defaults_to_zero() {
    assert_eq!(parse_score(""), 0.0);
    assert_eq!(parse_score("relevant"), 0.0);
    assert_eq!(parse_score("Score: 0.9"), 0.0);
    assert_eq!(parse_score("-"), 0.0);
    assert_eq!(parse_score("1e999"), 0.0);
}

#[tokio::test]
async fn rerank_sorts_by_descending_score() {
    let server = MockServer::start().await;
    mock_score(&server, "Caching is configured in cache.toml.", json!({"response": "0.9"})).await;
    mock_score(&server, "Logging goes to stdout.", json!({"response": "0.1"})).await;
    mock_score(&server, "Set CACHE_ENABLED=true.", json!({"generated_text": "0.95"})).await;

    let reranker = reranker_for(&server, 1);
    let ranked = reranker
        .rerank(
            QUESTION,
            &passages(&[
                "Caching is configured in cache.toml.",
                "Logging goes to stdout.",
                "Set CACHE_ENABLED=true.",
            ]),
        )
        .await
        .expect("rerank should succeed");

    let order: Vec<&str> = ranked.iter().map(|c| c.chunk.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "Set CACHE_ENABLED=true.",
            "Caching is configured in cache.toml.",
            "Logging goes to stdout."
        ]
    );
    assert!((ranked[0].score - 0.95).abs() < 1e-6);
}

#[tokio::test]
async fn ties_keep_candidate_order() {
    let server = MockServer::start().await;
    for text in ["first", "second", "third"] {
        mock_score(&server, text, json!({"response": "0.5"})).await;
    }

    let reranker = reranker_for(&server, 3);
    let ranked = reranker
        .rerank(QUESTION, &passages(&["first", "second", "third"]))
        .await
        .expect("rerank should succeed");

    let order: Vec<&str> = ranked.iter().map(|c| c.chunk.as_str()).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn unparsable_and_chat_replies() {
    let server = MockServer::start().await;
    mock_score(&server, "words", json!({"response": "very relevant"})).await;
    mock_score(
        &server,
        "chat",
        json!({"message": {"role": "assistant", "content": "0.7"}}),
    )
    .await;

    let reranker = reranker_for(&server, 2);
    let ranked = reranker
        .rerank(QUESTION, &passages(&["words", "chat"]))
        .await
        .expect("rerank should succeed");

    assert_eq!(ranked[0].chunk, "chat");
    assert!((ranked[0].score - 0.7).abs() < 1e-6);
    assert_eq!(ranked[1].score, 0.0);
}

#[tokio::test]
async fn one_failed_pair_fails_the_rerank() {
    let server = MockServer::start().await;
    mock_score(&server, "good", json!({"response": "0.9"})).await;
    let prompt = json!({ "query": QUESTION, "passage": "bad" }).to_string();
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "prompt": prompt })))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let reranker = reranker_for(&server, 1);
    let result = reranker.rerank(QUESTION, &passages(&["good", "bad"])).await;
    assert!(matches!(result, Err(RagError::Rerank(_))));
}

#[tokio::test]
async fn empty_input_makes_no_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let reranker = reranker_for(&server, 1);
    let ranked = reranker.rerank(QUESTION, &[]).await.expect("nothing to rerank");
    assert!(ranked.is_empty());
}
