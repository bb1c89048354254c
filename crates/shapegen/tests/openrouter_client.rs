//! HTTP-level tests for the OpenRouter client and oracle against a mock
//! server.

use std::time::Duration;

use shapegen::api::retry::RetryConfig;
use shapegen::prelude::*;
use shapegen::{ChatRequest, Message};

const OK_BODY: &str = r#"{
    "choices": [{
        "message": { "role": "assistant", "content": "Car|A motor vehicle" },
        "finish_reason": "stop"
    }],
    "usage": { "prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128 }
}"#;

fn client(url: &str) -> OpenRouterClient {
    OpenRouterClient::with_base_url("test-key", url, Duration::from_secs(5)).unwrap()
}

fn fast_config() -> GeneratorConfig {
    let mut config = GeneratorConfig::default().with_model("openai/gpt-4o-mini");
    config.retry = RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: false,
        ..Default::default()
    };
    config
}

#[tokio::test]
async fn chat_parses_content_and_usage() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(OK_BODY)
        .create_async()
        .await;

    let request = ChatRequest {
        model: "openai/gpt-4o".into(),
        messages: vec![Message::user("List the entities.")],
        max_tokens: 100,
        temperature: 0.7,
    };
    let completion = client(&server.url()).chat(&request).await.unwrap();

    assert_eq!(completion.content.as_deref(), Some("Car|A motor vehicle"));
    assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    assert_eq!(completion.usage.unwrap().total_tokens, Some(128));
    mock.assert_async().await;
}

#[tokio::test]
async fn api_error_body_becomes_provider_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"error": {"message": "model not found"}}"#)
        .create_async()
        .await;

    let err = client(&server.url())
        .chat(&ChatRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Provider { .. }));
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn oracle_does_not_retry_auth_failures() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body("unauthorized")
        .expect(1)
        .create_async()
        .await;

    let config = fast_config();
    let oracle = OpenRouterOracle::new(client(&server.url()), &config);
    let err = oracle.complete("List the entities.").await.unwrap_err();

    assert!(err.to_string().contains("401"));
    mock.assert_async().await;
}

#[tokio::test]
async fn oracle_retries_transient_failures_then_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("upstream unavailable")
        .expect(1)
        .create_async()
        .await;
    // Matching mocks are used in creation order until their expected hits are met.
    let ok = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;

    let config = fast_config();
    let oracle = OpenRouterOracle::new(client(&server.url()), &config);
    let costs = oracle.costs();
    let completion = oracle.complete("List the entities.").await.unwrap();

    assert_eq!(completion.text, "Car|A motor vehicle");
    assert_eq!(costs.lock().unwrap().calls, 1);
    failing.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn oracle_rejects_empty_content() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices": [{"message": {"content": "  "}, "finish_reason": "length"}]}"#)
        .create_async()
        .await;

    let oracle = OpenRouterOracle::new(client(&server.url()), &fast_config());
    let err = oracle.complete("List the entities.").await.unwrap_err();
    assert!(err.to_string().contains("finish_reason=length"));
}
