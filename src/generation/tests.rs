use super::*;
use crate::config::{Config, GenerationConfig};

fn test_config() -> Config {
    Config {
        generation: GenerationConfig {
            base_url: "https://completion.test".to_string(),
            model: "test-completion-model".to_string(),
            timeout_seconds: 5,
            retry_attempts: 1,
            api_key_env: "DOCRAG_TEST_MISSING_KEY".to_string(),
        },
        ..Config::default()
    }
}

#[test]
fn client_configuration() {
    let client = ChatClient::new(&test_config()).expect("Failed to create client");

    assert_eq!(client.model(), "test-completion-model");
    assert_eq!(
        client.endpoint.as_str(),
        "https://completion.test/v1/chat/completions"
    );
    assert_eq!(client.retry_attempts, 1);
    assert!(client.api_key.is_none());
}

#[test]
fn request_pins_temperature_to_zero() {
    let request = ChatRequest {
        model: "test-completion-model".to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: "What is in the manual?".to_string(),
        }],
        temperature: 0.0,
    };
    let value = serde_json::to_value(&request).expect("should serialize request");

    assert_eq!(value["model"], "test-completion-model");
    assert_eq!(value["temperature"], 0.0);
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["messages"][0]["content"], "What is in the manual?");
}

#[test]
fn response_parsing() {
    let response: ChatResponse = serde_json::from_str(
        r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": {"role": "assistant", "content": "  The warranty lasts two years.  "},
                    "finish_reason": "stop"
                }
            ]
        }"#,
    )
    .expect("should parse response");

    assert_eq!(response.choices.len(), 1);
    assert_eq!(
        response.choices[0].message.content,
        "  The warranty lasts two years.  "
    );
}

#[test]
fn empty_choices_is_generation_error() {
    let response: ChatResponse =
        serde_json::from_str(r#"{"choices": []}"#).expect("should parse response");

    assert!(response.choices.is_empty());
}
