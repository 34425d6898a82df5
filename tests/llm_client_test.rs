//! Integration tests for the completion client and the services built on it
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use incite_review::config::{LlmConfig, RequestConfig};
use incite_review::error::LlmError;
use incite_review::llm::{CompletionClient, MessagesRequest};
use incite_review::services::{KeywordService, LlmServices, OutlineService, PaperAnalyzer};

fn llm_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        model: "test-model".to_string(),
        keyword_model: "test-keyword-model".to_string(),
    }
}

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> CompletionClient {
    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };
    CompletionClient::new(&llm_config(base_url), request_config).expect("Failed to create client")
}

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_123",
        "type": "message",
        "role": "assistant",
        "model": "test-model",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }))
}

#[cfg(test)]
mod client_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({"model": "m", "max_tokens": 1024})))
            .respond_with(text_reply("Hello there"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let text = client.complete(MessagesRequest::new("m", "hi")).await.unwrap();
        assert_eq!(text, "Hello there");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "bad"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3);
        let result = client.complete(MessagesRequest::new("m", "hi")).await;

        match result {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("invalid_request_error"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_retried_then_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let result = client.complete(MessagesRequest::new("m", "hi")).await;

        match result {
            Err(LlmError::Unavailable { retries, message }) => {
                assert_eq!(retries, 3);
                assert!(message.contains("529"));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_recovers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_reply("after retry"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let text = client.complete(MessagesRequest::new("m", "hi")).await.unwrap();
        assert_eq!(text, "after retry");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.complete(MessagesRequest::new("m", "hi")).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.complete(MessagesRequest::new("m", "hi")).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }
}

#[cfg(test)]
mod service_tests {
    use super::*;

    fn services(base_url: &str) -> LlmServices {
        let client = create_test_client(base_url, 0);
        LlmServices::new(client, &llm_config(base_url))
    }

    #[tokio::test]
    async fn test_keywords_use_keyword_model() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"model": "test-keyword-model"})))
            .respond_with(text_reply("graph neural networks, message passing, GNN"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let keywords = services(&mock_server.uri())
            .keywords("learning on graphs")
            .await
            .unwrap();
        assert_eq!(keywords, vec!["graph neural networks", "message passing", "GNN"]);
    }

    #[tokio::test]
    async fn test_analyze_parses_tags() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"model": "test-model", "temperature": 0.0})))
            .respond_with(text_reply(
                "<summary>Two sentences.</summary>\
                 <methodological_issues>None</methodological_issues>\
                 <conflict_of_interest></conflict_of_interest>\
                 <future_research>Scale up\nNew domains</future_research>",
            ))
            .mount(&mock_server)
            .await;

        let analysis = services(&mock_server.uri())
            .analyze("Full paper text")
            .await
            .unwrap();
        assert_eq!(analysis.summary, "Two sentences.");
        assert_eq!(analysis.conflict_of_interest, "");
        assert_eq!(analysis.future_research, vec!["Scale up", "New domains"]);
    }

    #[tokio::test]
    async fn test_analyze_garbage_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_reply("I am unable to read this paper."))
            .mount(&mock_server)
            .await;

        let result = services(&mock_server.uri()).analyze("text").await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_outline_parses_fenced_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_reply(
                "```json\n{\"sections\": [{\"title\": \"Architectures\", \"description\": \"Model families\"}]}\n```",
            ))
            .mount(&mock_server)
            .await;

        let drafts = services(&mock_server.uri())
            .outline("Paper A\nSummary: ...")
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Architectures");
    }
}
