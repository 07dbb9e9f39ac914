use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::environment::{Endpoint, API_KEY_HEADER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    /// Standard base64
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            parts: vec![Part::text(text)],
        }
    }
}

/// Request body for `generateContent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPayload {
    pub contents: Vec<Content>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API Error: {message}")]
    Status { status: StatusCode, message: String },
    #[error("Connection failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected response from API: {0}")]
    MalformedResponse(String),
    #[error("Request did not complete: {0}")]
    Interrupted(String),
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: Endpoint,
}

impl GeminiClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Issue one `generateContent` call and return the first candidate's text.
    pub async fn generate(&self, payload: &ApiPayload) -> Result<String, ApiError> {
        info!(
            mode = self.endpoint.mode.as_str(),
            turns = payload.contents.len(),
            "Sending generate request"
        );

        let mut request = self
            .client
            .post(&self.endpoint.url)
            .header("Content-Type", "application/json")
            .json(payload);

        // The key header never leaves a development build
        if let Some(key) = &self.endpoint.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
            warn!(status = status.as_u16(), %message, "Generate request failed");
            return Err(ApiError::Status { status, message });
        }

        let text = extract_text(&body)?;
        debug!(chars = text.len(), "Generate request succeeded");
        Ok(text)
    }
}

/// Human-readable message from an error body: `error.message`, then `message`
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn extract_text(body: &str) -> Result<String, ApiError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| ApiError::MalformedResponse("no generated text in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Mode;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, Request, ResponseTemplate,
    };

    fn client_for(server: &MockServer, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(Endpoint {
            mode: if api_key.is_some() { Mode::Development } else { Mode::Production },
            url: format!("{}/api/generate", server.uri()),
            api_key: api_key.map(str::to_string),
        })
    }

    fn payload() -> ApiPayload {
        ApiPayload {
            contents: vec![Content {
                role: None,
                parts: vec![Part::text("Solve x + 1 = 2")],
            }],
        }
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = ApiPayload {
            contents: vec![Content {
                role: None,
                parts: vec![
                    Part::text("describe"),
                    Part::inline_data("image/png", "aGVsbG8="),
                ],
            }],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "contents": [{
                    "parts": [
                        {"text": "describe"},
                        {"inline_data": {"mime_type": "image/png", "data": "aGVsbG8="}}
                    ]
                }]
            })
        );

        let chat = Content::new(Role::Model, "ok");
        assert_eq!(
            serde_json::to_value(&chat).unwrap(),
            json!({"role": "model", "parts": [{"text": "ok"}]})
        );
    }

    #[tokio::test]
    async fn test_generate_success_with_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_json(json!({"contents": [{"parts": [{"text": "Solve x + 1 = 2"}]}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "x = 1"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server, Some("test-key")).generate(&payload()).await.unwrap();
        assert_eq!(text, "x = 1");
    }

    #[tokio::test]
    async fn test_production_sends_no_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .mount(&server)
            .await;

        client_for(&server, None).generate(&payload()).await.unwrap();

        let received: Vec<Request> = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get(API_KEY_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"error": {"message": "quota exceeded"}})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate(&payload()).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status, .. } if status.as_u16() == 500));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_top_level_message_then_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flat"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad input"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/plain"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .mount(&server)
            .await;

        let flat = GeminiClient::new(Endpoint {
            mode: Mode::Production,
            url: format!("{}/flat", server.uri()),
            api_key: None,
        });
        assert_eq!(flat.generate(&payload()).await.unwrap_err().to_string(), "API Error: bad input");

        let plain = GeminiClient::new(Endpoint {
            mode: Mode::Production,
            url: format!("{}/plain", server.uri()),
            api_key: None,
        });
        assert_eq!(
            plain.generate(&payload()).await.unwrap_err().to_string(),
            "API Error: Service Unavailable"
        );
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate(&payload()).await.unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let client = GeminiClient::new(Endpoint {
            mode: Mode::Production,
            url: "http://127.0.0.1:1/api/generate".to_string(),
            api_key: None,
        });
        let err = client.generate(&payload()).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(err.to_string().starts_with("Connection failed"));
    }
}
