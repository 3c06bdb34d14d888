//! OpenAI chat-completions adapter.
//!
//! Wire format: `POST {base_url}/chat/completions` with a Bearer token and
//! `{ "model", "temperature", "messages": [{ "role", "content" }] }`; the
//! answer is read from `choices[0].message.content`.

use async_trait::async_trait;
use lawmate_core::text::truncate_chars;
use lawmate_core::{ChatMessage, ProviderConfig, ProviderKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LlmError, parse_retry_after};
use crate::provider::{ChatProvider, ChatRequest};

/// Longest error body kept in [`LlmError::Provider`].
const MAX_ERROR_BODY: usize = 500;

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: cfg.model_name.clone(),
            temperature: cfg.temperature,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::Auth("OPENAI_API_KEY is not set".into()));
        };

        let messages = request.messages();
        let body = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: &messages,
        };

        let url = self.completions_url();
        debug!(url = %url, model = %self.model, messages = messages.len(), "sending chat completion");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    LlmError::Auth(truncate_chars(&body, MAX_ERROR_BODY))
                }
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimit { retry_after },
                _ => LlmError::Provider {
                    status: status.as_u16(),
                    body: truncate_chars(&body, MAX_ERROR_BODY),
                },
            });
        }

        let parsed: CompletionResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::Provider {
                status: status.as_u16(),
                body: "response contained no answer text".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lawmate_core::LegalDomain;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: Option<&str>) -> OpenAiClient {
        let cfg = ProviderConfig::openai(key.map(String::from), "gpt-4o-mini")
            .with_base_url(format!("{}/v1", server.uri()));
        OpenAiClient::new(&cfg).unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(LegalDomain::General, "Co je smlouva?")
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Smlouva je dohoda.  " } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server, Some("sk-test"))
            .generate(&request())
            .await
            .unwrap();
        assert_eq!(answer, "Smlouva je dohoda.");
    }

    #[tokio::test]
    async fn sends_system_context_and_question() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{ "role": "system" }, { "role": "user", "content": "dřívější dotaz" }, { "role": "user" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "ok" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = request().with_context(vec![ChatMessage::user("dřívější dotaz")]);
        let answer = client_for(&server, Some("k")).generate(&req).await.unwrap();
        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("bad")).generate(&request()).await.unwrap_err();
        assert_eq!(err, LlmError::Auth("invalid api key".into()));
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::RateLimit {
                retry_after: Some(Duration::from_secs(3))
            }
        );
    }

    #[tokio::test]
    async fn server_error_maps_to_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::Provider {
                status: 503,
                body: "overloaded".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { status: 200, .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let cfg = ProviderConfig::openai(Some("k".into()), "m").with_base_url("http://127.0.0.1:9");
        let err = OpenAiClient::new(&cfg)
            .unwrap()
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Network(_)), "{err:?}");
    }
}
