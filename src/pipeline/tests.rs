use super::*;
use crate::RagError;
use crate::vector_store::PointPayload;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUESTION: &str = "How do I enable caching?";
const ID_A: &str = "9b2f7a3e-4c1d-5e6f-8a9b-0c1d2e3f4a5b";
const ID_B: &str = "1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d";

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config
        .ollama
        .set_base_url(&server.uri())
        .expect("mock server uri should be valid");
    config.vector_store.url = server.uri();
    config
}

fn point(id: &str, text: &str, source: &str, score: f32) -> IndexedPoint {
    IndexedPoint {
        id: id.to_string(),
        vector: Vec::new(),
        payload: PointPayload {
            text: text.to_string(),
            source: source.to_string(),
            section: None,
            ..PointPayload::default()
        },
        score: Some(score),
    }
}

fn ranked(chunk: &str, score: f32) -> RerankedCandidate {
    RerankedCandidate {
        chunk: chunk.to_string(),
        score,
    }
}

async fn mock_embedding(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.5, 0.5]})))
        .mount(server)
        .await;
}

async fn mock_search(server: &MockServer, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/collections/docs_chunks/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mock_rerank(server: &MockServer, passage: &str, score: &str) {
    let prompt = json!({ "query": QUESTION, "passage": passage }).to_string();
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "qllama/bge-reranker-v2-m3",
            "prompt": prompt
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": score })))
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn select_sources_follows_reranked_order() {
    let candidates = vec![
        point(ID_A, "alpha", "a.md", 0.9),
        point(ID_B, "beta", "b.md", 0.8),
    ];
    let sources = select_sources(&[ranked("beta", 0.9), ranked("alpha", 0.1)], &candidates);

    let ids: Vec<&str> = sources.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![ID_B, ID_A]);
}

#[test]
fn select_sources_prefers_first_duplicate() {
    let candidates = vec![
        point(ID_A, "same text", "first.md", 0.9),
        point(ID_B, "same text", "second.md", 0.8),
    ];
    let sources = select_sources(&[ranked("same text", 0.5), ranked("same text", 0.5)], &candidates);

    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|p| p.payload.source == "first.md"));
}

#[test]
fn select_sources_drops_unmatched_text() {
    let candidates = vec![point(ID_A, "alpha", "a.md", 0.9)];
    let sources = select_sources(&[ranked("alpha ", 0.9), ranked("alpha", 0.2)], &candidates);

    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].id, ID_A);
    assert!(select_sources(&[], &candidates).is_empty());
}

#[test]
fn step_names() {
    let names: Vec<String> = [
        PipelineStep::Checking,
        PipelineStep::Sourcing,
        PipelineStep::Optimizing,
        PipelineStep::Reading,
        PipelineStep::Thinking,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(names, ["checking", "sourcing", "optimizing", "reading", "thinking"]);
}

#[test]
fn result_serializes_answer_and_sources() {
    let result = PipelineResult {
        answer: "Use the cache.".to_string(),
        sources: vec![point(ID_A, "alpha", "a.md", 0.5)],
    };
    let value = serde_json::to_value(&result).expect("serializable");

    assert_eq!(value["answer"], "Use the cache.");
    assert_eq!(value["sources"][0]["id"], ID_A);
    assert_eq!(value["sources"][0]["payload"]["source"], "a.md");
    assert_eq!(value["sources"][0]["score"], 0.5);
}

#[tokio::test]
async fn zero_candidates_return_sentinel_without_generation() {
    let server = MockServer::start().await;
    mock_embedding(&server).await;
    mock_search(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = QueryPipeline::from_config(&config_for(&server))
        .await
        .expect("pipeline should build");
    let result = pipeline.ask(QUESTION).await.expect("ask should succeed");

    assert_eq!(result.answer, NO_INFORMATION_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn ask_reranks_and_generates() {
    let server = MockServer::start().await;
    mock_embedding(&server).await;
    mock_search(
        &server,
        json!([
            {"id": ID_A, "score": 0.91, "payload": {"text": "Caching is off by default.", "source": "env.md", "lang": "en", "tokens": 5}},
            {"id": ID_B, "score": 0.88, "payload": {"text": "Set CACHE_ENABLED=true.", "source": "cache.md", "section": "Enabling", "lang": "en", "tokens": 2}}
        ]),
    )
    .await;
    mock_rerank(&server, "Caching is off by default.", "0.2").await;
    mock_rerank(&server, "Set CACHE_ENABLED=true.", "0.9").await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "dolphin3", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Set CACHE_ENABLED."})))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = QueryPipeline::from_config(&config_for(&server))
        .await
        .expect("pipeline should build");
    let result = pipeline.ask(QUESTION).await.expect("ask should succeed");

    assert_eq!(result.answer, "Set CACHE_ENABLED.");
    let ids: Vec<&str> = result.sources.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![ID_B, ID_A]);
    assert_eq!(result.sources[0].payload.section.as_deref(), Some("Enabling"));
}

#[tokio::test]
async fn generation_failure_propagates() {
    let server = MockServer::start().await;
    mock_embedding(&server).await;
    mock_search(
        &server,
        json!([{"id": ID_A, "score": 0.9, "payload": {"text": "alpha", "source": "a.md"}}]),
    )
    .await;
    mock_rerank(&server, "alpha", "0.9").await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "dolphin3"})))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let pipeline = QueryPipeline::from_config(&config_for(&server))
        .await
        .expect("pipeline should build");
    let err = pipeline.ask(QUESTION).await.expect_err("generation fails");
    assert_eq!(err.status(), Some(503));
    assert!(matches!(err, RagError::Generation { .. }));
}

#[tokio::test]
async fn safeguard_rejection_skips_retrieval() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llama3:latest", "max_tokens": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "no"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.pipeline.safeguard = true;
    let pipeline = QueryPipeline::from_config(&config)
        .await
        .expect("pipeline should build");
    let result = pipeline
        .ask("What is the capital of France?")
        .await
        .expect("ask should succeed");

    assert_eq!(result.answer, OFF_TOPIC_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn search_returns_store_order() {
    let server = MockServer::start().await;
    mock_embedding(&server).await;
    mock_search(
        &server,
        json!([
            {"id": ID_A, "score": 0.9, "payload": {"text": "alpha", "source": "a.md"}},
            {"id": ID_B, "score": 0.8, "payload": {"text": "beta", "source": "b.md"}}
        ]),
    )
    .await;

    let pipeline = QueryPipeline::from_config(&config_for(&server))
        .await
        .expect("pipeline should build");
    let points = pipeline.search(QUESTION, 2).await.expect("search succeeds");

    assert_eq!(points.len(), 2);
    assert_eq!(points[0].payload.text, "alpha");
    assert_eq!(points[1].score, Some(0.8));
}
