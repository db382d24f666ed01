use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OllamaClient {
    let mut config = OllamaConfig::default();
    config
        .set_base_url(&server.uri())
        .expect("mock server uri should be valid");
    OllamaClient::new(&config).expect("should create client")
}

fn generate_request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        model: "dolphin3".to_string(),
        prompt: prompt.to_string(),
        stream: false,
        temperature: 0.5,
        stop: None,
        max_tokens: None,
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config)
        .expect("should create client")
        .with_timeout(Duration::from_secs(60));

    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
}

#[test]
fn completion_text_prefers_response_field() {
    let both: GenerateResponse =
        serde_json::from_value(json!({"response": "a", "generated_text": "b"}))
            .expect("should parse");
    assert_eq!(both.completion_text(), "a");

    let empty_response: GenerateResponse =
        serde_json::from_value(json!({"response": "", "generated_text": "b"}))
            .expect("should parse");
    assert_eq!(empty_response.completion_text(), "b");

    let neither: GenerateResponse =
        serde_json::from_value(json!({"done": true})).expect("should parse");
    assert_eq!(neither.completion_text(), "");

    let chat: GenerateResponse =
        serde_json::from_value(json!({"message": {"role": "assistant", "content": "0.8"}}))
            .expect("should parse");
    assert_eq!(chat.completion_text(), "");
    assert_eq!(chat.any_text(), "0.8");
}

#[test]
fn optional_generation_fields_are_omitted() {
    let request = generate_request("hi");
    let value = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(
        value,
        json!({"model": "dolphin3", "prompt": "hi", "stream": false, "temperature": 0.5})
    );

    let request = GenerateRequest {
        stop: Some(vec!["\n".to_string()]),
        max_tokens: Some(2),
        ..generate_request("hi")
    };
    let value = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(value["stop"], json!(["\n"]));
    assert_eq!(value["max_tokens"], json!(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_posts_model_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_json(json!({"model": "bge-m3", "prompt": "How do I install it?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2, 0.3]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let vector = client
        .embedding("bge-m3", "How do I install it?")
        .expect("embedding should succeed");
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_failures_are_embedding_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_json(json!({"model": "broken", "prompt": "some text here"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_json(json!({"model": "empty", "prompt": "some text here"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_json(json!({"model": "garbled", "prompt": "some text here"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    for model in ["broken", "empty", "garbled"] {
        let result = client.embedding(model, "some text here");
        assert!(
            matches!(result, Err(RagError::Embedding(_))),
            "{model} should fail with an embedding error, got {result:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_returns_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({
            "model": "dolphin3",
            "prompt": "Say hi",
            "stream": false,
            "temperature": 0.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hi!", "done": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .generate(&generate_request("Say hi"))
        .expect("generation should succeed");
    assert_eq!(response.completion_text(), "Hi!");
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client
        .generate(&generate_request("Say hi"))
        .expect_err("generation should fail");

    assert_eq!(error.status(), Some(503));
    assert!(matches!(
        error,
        RagError::Generation { ref body, .. } if body == "overloaded"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_models_parses_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "bge-m3:latest", "size": 1_200_000_000_u64, "digest": "abc"},
                {"name": "dolphin3:latest"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = client.list_models().expect("should list models");
    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["bge-m3:latest", "dolphin3:latest"]);
    assert!(client.ping().is_ok());
}
