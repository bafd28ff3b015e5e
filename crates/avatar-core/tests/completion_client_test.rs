//! Integration test: ChatCompletionClient against a mock OpenAI-compatible endpoint.
//!
//! ## Scenarios
//! 1. Success: reply text is `choices[0].message.content`, request carries auth + persona prompt.
//! 2. Non-2xx status: fixed error fallback, flagged degraded.
//! 3. Success without content: empty-reply fallback.
//! 4. Malformed body: error fallback.
//! 5. Unreachable service: error fallback, never an Err.

use avatar_core::{
    ChatCompletionClient, CompletionConfig, CompletionService, ConversationMessage,
    DegradedReason, FALLBACK_EMPTY_REPLY, FALLBACK_ERROR_REPLY,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT_PATH: &str = "/openai/v1/chat/completions";

fn client_for(server: &MockServer) -> ChatCompletionClient {
    let config = CompletionConfig {
        endpoint: format!("{}{}", server.uri(), CHAT_PATH),
        api_key: Some("groq-test-key".to_string()),
        timeout_secs: 5,
        ..Default::default()
    };
    ChatCompletionClient::from_config(&config).expect("client")
}

fn history() -> Vec<ConversationMessage> {
    vec![ConversationMessage::user("What's the weather like on the moon?")]
}

#[tokio::test]
async fn returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("authorization", "Bearer groq-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Airless and very quiet." } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client_for(&server).complete(&history(), "You are Luna.").await;
    assert_eq!(completion.text, "Airless and very quiet.");
    assert!(!completion.is_degraded());

    let requests = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["messages"][0], json!({ "role": "system", "content": "You are Luna." }));
    assert_eq!(
        body["messages"][1],
        json!({ "role": "user", "content": "What's the weather like on the moon?" })
    );
    assert_eq!(body["model"], "mixtral-8x7b-32768");
    assert_eq!(body["max_tokens"], 1024);
}

#[tokio::test]
async fn non_success_status_yields_error_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let completion = client_for(&server).complete(&history(), "You are Luna.").await;
    assert_eq!(completion.text, FALLBACK_ERROR_REPLY);
    assert_eq!(completion.degraded, Some(DegradedReason::Status(503)));
}

#[tokio::test]
async fn missing_content_yields_empty_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let completion = client_for(&server).complete(&history(), "You are Luna.").await;
    assert_eq!(completion.text, FALLBACK_EMPTY_REPLY);
    assert_eq!(completion.degraded, Some(DegradedReason::MissingContent));
}

#[tokio::test]
async fn malformed_body_yields_error_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let completion = client_for(&server).complete(&history(), "You are Luna.").await;
    assert_eq!(completion.text, FALLBACK_ERROR_REPLY);
    assert!(matches!(completion.degraded, Some(DegradedReason::Malformed(_))));
}

#[tokio::test]
async fn unreachable_service_yields_error_fallback() {
    let config = CompletionConfig {
        endpoint: "http://127.0.0.1:9/chat/completions".to_string(),
        api_key: Some("k".to_string()),
        timeout_secs: 2,
        ..Default::default()
    };
    let client = ChatCompletionClient::from_config(&config).unwrap();

    let completion = client.complete(&history(), "You are Luna.").await;
    assert_eq!(completion.text, FALLBACK_ERROR_REPLY);
    assert!(matches!(completion.degraded, Some(DegradedReason::Transport(_))));
}
