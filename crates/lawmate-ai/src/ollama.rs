//! Ollama adapter for both a local server and Ollama Cloud.
//!
//! Endpoints (relative to the API root, see [`api_url`]):
//!
//! - `POST /chat`: `{ "model", "messages", "stream": false, "options": { "temperature" } }`,
//!   answer at `message.content`
//! - `GET /version`: liveness probe
//! - `GET /tags`: installed models, `{ "models": [{ "name" }] }`
//! - `POST /pull`: `{ "model", "stream": true }`, NDJSON progress lines
//!   `{ "status", "total", "completed" }` ending in `{ "status": "success" }`
//!   or `{ "error" }`
//!
//! The cloud flavour (`https://ollama.com`) authenticates with a Bearer key and
//! never pulls models.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lawmate_core::text::truncate_chars;
use lawmate_core::{ChatMessage, ProviderConfig, ProviderKind};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bootstrap::{BootstrapKey, ModelBackend, ProgressFn, PullProgress};
use crate::error::{LlmError, parse_retry_after};
use crate::provider::{ChatProvider, ChatRequest};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const TAGS_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 500;

pub const START_SERVER_HINT: &str = "start the local Ollama server (`ollama serve`) and try again";

/// Build an API URL for both `http://host:11434` and `https://ollama.com/api` style bases.
pub fn api_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/api") {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/api{endpoint}")
    }
}

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    kind: ProviderKind,
    temperature: f32,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullBody<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim().trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: cfg.model_name.trim().to_string(),
            kind: ProviderKind::for_ollama_url(&cfg.base_url),
            temperature: cfg.temperature,
            request_timeout: cfg.timeout(),
        })
    }

    pub fn is_cloud(&self) -> bool {
        self.kind == ProviderKind::OllamaCloud
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Map a transport failure: an unreachable local server is "unavailable".
    fn send_error(&self, err: reqwest::Error) -> LlmError {
        if !self.is_cloud() && (err.is_connect() || err.is_timeout()) {
            LlmError::BackendUnavailable {
                base_url: self.base_url.clone(),
                hint: START_SERVER_HINT.into(),
            }
        } else {
            LlmError::from(err)
        }
    }

    async fn status_error(&self, resp: reqwest::Response) -> LlmError {
        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => LlmError::ModelNotFound(self.model.clone()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                LlmError::Auth(truncate_chars(&body, MAX_ERROR_BODY))
            }
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimit { retry_after },
            _ if body.contains("not found") && body.contains("model") => {
                LlmError::ModelNotFound(self.model.clone())
            }
            _ => LlmError::Provider {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY),
            },
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let messages = request.messages();
        let body = ChatBody {
            model: &self.model,
            messages: &messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let url = api_url(&self.base_url, "/chat");
        debug!(url = %url, model = %self.model, messages = messages.len(), "sending ollama chat");
        let resp = self
            .authorize(self.client.post(&url))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !resp.status().is_success() {
            return Err(self.status_error(resp).await);
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(LlmError::Provider {
                status: 200,
                body: "response contained no answer text".into(),
            });
        }
        Ok(content)
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    fn key(&self) -> BootstrapKey {
        BootstrapKey::new(&self.base_url, &self.model)
    }

    fn pulls_models(&self) -> bool {
        !self.is_cloud()
    }

    async fn probe(&self) -> Result<(), LlmError> {
        if self.is_cloud() {
            if self.api_key.is_none() {
                return Err(LlmError::Auth("Ollama Cloud requires OLLAMA_API_KEY".into()));
            }
            // Listing tags checks both the key and reachability.
            self.list_models().await.map(|_| ())
        } else {
            let resp = self
                .client
                .get(api_url(&self.base_url, "/version"))
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
                .map_err(|_| LlmError::BackendUnavailable {
                    base_url: self.base_url.clone(),
                    hint: START_SERVER_HINT.into(),
                })?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(LlmError::BackendUnavailable {
                    base_url: self.base_url.clone(),
                    hint: format!("server answered {} to the status probe", resp.status()),
                })
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let resp = self
            .authorize(self.client.get(api_url(&self.base_url, "/tags")))
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp).await);
        }
        let tags: TagsResponse = resp.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self, model: &str, progress: &ProgressFn<'_>) -> Result<(), LlmError> {
        let url = api_url(&self.base_url, "/pull");
        info!(url = %url, model, "pulling model");
        let resp = self
            .authorize(self.client.post(&url))
            .json(&PullBody { model, stream: true })
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp).await);
        }

        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        let mut succeeded = false;

        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                succeeded |= handle_pull_line(model, &line, progress)?;
            }
        }
        if !buf.is_empty() {
            succeeded |= handle_pull_line(model, &buf, progress)?;
        }

        if succeeded {
            Ok(())
        } else {
            Err(LlmError::ModelAcquisition {
                model: model.to_string(),
                reason: "pull stream ended without success".into(),
            })
        }
    }
}

/// Process one NDJSON line; returns whether it reported success.
fn handle_pull_line(model: &str, line: &[u8], progress: &ProgressFn<'_>) -> Result<bool, LlmError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let parsed: PullLine = serde_json::from_str(text).map_err(|e| LlmError::ModelAcquisition {
        model: model.to_string(),
        reason: format!("unreadable progress line: {e}"),
    })?;

    if let Some(error) = parsed.error {
        return Err(LlmError::ModelAcquisition {
            model: model.to_string(),
            reason: error,
        });
    }

    let status = parsed.status.unwrap_or_default();
    if status == "success" {
        return Ok(true);
    }
    progress(PullProgress {
        status,
        completed: parsed.completed,
        total: parsed.total,
    });
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lawmate_core::LegalDomain;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        let cfg = ProviderConfig::ollama(server.uri(), "llama3.1:8b", None);
        OllamaClient::new(&cfg).unwrap()
    }

    #[test]
    fn api_url_handles_both_base_styles() {
        assert_eq!(api_url("http://localhost:11434", "/chat"), "http://localhost:11434/api/chat");
        assert_eq!(api_url("http://localhost:11434/", "/tags"), "http://localhost:11434/api/tags");
        assert_eq!(api_url("https://ollama.com/api", "/chat"), "https://ollama.com/api/chat");
        assert_eq!(api_url("https://ollama.com/api/", "/chat"), "https://ollama.com/api/chat");
    }

    #[test]
    fn cloud_url_sets_kind() {
        let cfg = ProviderConfig::ollama("https://ollama.com", "gpt-oss:20b", Some("k".into()));
        let client = OllamaClient::new(&cfg).unwrap();
        assert!(client.is_cloud());
        assert!(!client.pulls_models());
        assert_eq!(ChatProvider::kind(&client), ProviderKind::OllamaCloud);
    }

    #[tokio::test]
    async fn chat_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.1:8b",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "Odpověď." },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server)
            .generate(&ChatRequest::new(LegalDomain::Civil, "dotaz"))
            .await
            .unwrap();
        assert_eq!(answer, "Odpověď.");
    }

    #[tokio::test]
    async fn missing_model_maps_to_model_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model \"llama3.1:8b\" not found, try pulling it first"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&ChatRequest::new(LegalDomain::Civil, "dotaz"))
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::ModelNotFound("llama3.1:8b".into()));
    }

    #[tokio::test]
    async fn unreachable_local_server_is_backend_unavailable() {
        let cfg = ProviderConfig::ollama("http://127.0.0.1:9", "llama3.1:8b", None);
        let client = OllamaClient::new(&cfg).unwrap();

        let err = client
            .generate(&ChatRequest::new(LegalDomain::Civil, "dotaz"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BackendUnavailable { .. }), "{err:?}");

        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, LlmError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn cloud_sends_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer cloud-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "content": "ok" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = ProviderConfig::ollama(format!("{}/api", server.uri()), "m", Some("cloud-key".into()));
        let answer = OllamaClient::new(&cfg)
            .unwrap()
            .generate(&ChatRequest::new(LegalDomain::General, "q"))
            .await
            .unwrap();
        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn probe_and_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "version": "0.5.1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{ "name": "llama3.1:8b" }, { "name": "qwen2.5:7b" }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.probe().await.unwrap();
        assert_eq!(client.list_models().await.unwrap(), vec!["llama3.1:8b", "qwen2.5:7b"]);
    }

    #[tokio::test]
    async fn pull_reports_progress_until_success() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"status\":\"pulling manifest\"}\n",
            "{\"status\":\"downloading\",\"total\":200,\"completed\":50}\n",
            "{\"status\":\"downloading\",\"total\":200,\"completed\":200}\n",
            "{\"status\":\"success\"}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(serde_json::json!({ "model": "llama3.1:8b" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
            .expect(1)
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = move |p: PullProgress| sink.lock().unwrap().push(p);

        client_for(&server)
            .pull_model("llama3.1:8b", &progress)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].status, "pulling manifest");
        assert_eq!(seen[1].percent(), Some(25));
        assert_eq!(seen[2].percent(), Some(100));
    }

    #[tokio::test]
    async fn pull_error_line_fails_acquisition() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"status\":\"pulling manifest\"}\n{\"error\":\"pull model manifest: file does not exist\"}\n",
            ))
            .mount(&server)
            .await;

        let progress = |_: PullProgress| {};
        let err = client_for(&server)
            .pull_model("nope:1b", &progress)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LlmError::ModelAcquisition {
                model: "nope:1b".into(),
                reason: "pull model manifest: file does not exist".into(),
            }
        );
    }

    #[tokio::test]
    async fn pull_without_success_line_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"downloading\"}"))
            .mount(&server)
            .await;

        let progress = |_: PullProgress| {};
        let err = client_for(&server)
            .pull_model("llama3.1:8b", &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ModelAcquisition { .. }));
    }
}
