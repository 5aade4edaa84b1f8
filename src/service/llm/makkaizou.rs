//! Makkaizou backend client.
//!
//! A single form-encoded POST per prompt, carrying the integration key, model
//! code, talk id, and message. The JSON response carries either a `message`
//! (plus optional `references`) or an embedded `error_code`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::base::{errors::BackendError, types::BackendReply};

use super::{GenericLlmClient, LlmClient};

/// Fixed timeout for a single backend call.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

// Extra methods on `LlmClient` applied by the makkaizou implementation.

impl LlmClient {
    pub fn makkaizou(settings: BackendSettings) -> Self {
        let client = MakkaizouLlmClient::new(settings, BACKEND_TIMEOUT);
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// Endpoint and credentials for the Makkaizou API.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub api_key: String,
    pub api_url: String,
    pub learning_model_code: String,
}

/// Makkaizou LLM client implementation.
#[derive(Clone)]
pub struct MakkaizouLlmClient {
    client: reqwest::Client,
    settings: BackendSettings,
    timeout: Duration,
}

impl MakkaizouLlmClient {
    /// Create a new Makkaizou client with the given per-call timeout.
    #[instrument(name = "MakkaizouLlmClient::new", skip_all)]
    pub fn new(settings: BackendSettings, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            timeout,
        }
    }
}

#[async_trait]
impl GenericLlmClient for MakkaizouLlmClient {
    fn model_code(&self) -> &str {
        &self.settings.learning_model_code
    }

    #[instrument(name = "MakkaizouLlmClient::forward", skip(self, prompt))]
    async fn forward(&self, talk_id: &str, prompt: &str) -> Result<BackendReply, BackendError> {
        let form = [
            ("external_integration_key", self.settings.api_key.as_str()),
            ("learning_model_code", self.settings.learning_model_code.as_str()),
            ("message", prompt),
            ("talk_id", talk_id),
        ];

        let response = self.client.post(&self.settings.api_url).form(&form).timeout(self.timeout).send().await.map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(BackendError::HttpStatus { status: status.as_u16(), body });
        }

        info!("Received response from backend: {:.100}", body);

        parse_makkaizou_response(&body)
    }
}

/// Map a transport-level `reqwest` error onto the backend taxonomy.
fn classify_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(err.to_string())
    } else {
        BackendError::Connection(err.to_string())
    }
}

/// Parse a 2xx response body.
///
/// An embedded `error_code` wins over everything else; otherwise the body must carry a `message`.
pub fn parse_makkaizou_response(body: &str) -> Result<BackendReply, BackendError> {
    let value: Value = serde_json::from_str(body).map_err(|e| BackendError::MalformedResponse(format!("response is not JSON: {e}")))?;

    if let Some(code) = value.get("error_code") {
        let code = match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let message = value.get("message").and_then(Value::as_str).unwrap_or("Unknown error").to_string();

        return Err(BackendError::BackendReported { code, message });
    }

    serde_json::from_value::<BackendReply>(value).map_err(|e| {
        warn!("Could not extract reply from backend response: {}", e);
        BackendError::MalformedResponse(format!("response lacks the expected reply field: {e}"))
    })
}

// Tests.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Form, Json, Router, http::StatusCode, routing::post};
    use serde_json::json;

    use super::*;

    /// Serve `router` on an ephemeral local port and return its URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{addr}/api")
    }

    fn settings(api_url: String) -> BackendSettings {
        BackendSettings {
            api_key: "integration-key".to_string(),
            api_url,
            learning_model_code: "model-1".to_string(),
        }
    }

    #[test]
    fn test_parse_reply_with_references() {
        let body = json!({
            "message": "Hello!",
            "references": [
                { "content": "Doc A", "files": [{ "name": "a.pdf", "download_url": "https://x/a.pdf" }] },
                { "content": "Doc B", "files": null }
            ]
        })
        .to_string();

        let reply = parse_makkaizou_response(&body).unwrap();

        assert_eq!(reply.message, "Hello!");
        assert_eq!(reply.references.len(), 2);
        assert_eq!(reply.references[0].files[0].name.as_deref(), Some("a.pdf"));
        assert!(reply.references[1].files.is_empty());
    }

    #[test]
    fn test_parse_null_references() {
        let reply = parse_makkaizou_response(r#"{"message":"ok","references":null}"#).unwrap();
        assert!(reply.references.is_empty());
    }

    #[test]
    fn test_parse_embedded_error_code() {
        let err = parse_makkaizou_response(r#"{"error_code": 4001, "message": "invalid talk"}"#).unwrap_err();

        assert_eq!(err, BackendError::BackendReported { code: "4001".to_string(), message: "invalid talk".to_string() });
    }

    #[test]
    fn test_parse_missing_message_is_malformed() {
        let err = parse_makkaizou_response(r#"{"answer": "nope"}"#).unwrap_err();
        assert_eq!(err.kind(), "BackendMalformedResponse");

        let err = parse_makkaizou_response("<html>").unwrap_err();
        assert_eq!(err.kind(), "BackendMalformedResponse");
    }

    #[tokio::test]
    async fn test_forward_sends_form_fields() {
        let router = Router::new().route(
            "/api",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                Json(json!({
                    "message": format!(
                        "{}|{}|{}|{}",
                        form["external_integration_key"], form["learning_model_code"], form["talk_id"], form["message"]
                    )
                }))
            }),
        );
        let url = serve(router).await;

        let client = MakkaizouLlmClient::new(settings(url), BACKEND_TIMEOUT);
        let reply = client.forward("line-talk", "@Bot what is rust?").await.unwrap();

        assert_eq!(reply.message, "integration-key|model-1|line-talk|@Bot what is rust?");
    }

    #[tokio::test]
    async fn test_forward_non_success_status() {
        let router = Router::new().route("/api", post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }));
        let url = serve(router).await;

        let client = MakkaizouLlmClient::new(settings(url), BACKEND_TIMEOUT);
        let err = client.forward("t", "p").await.unwrap_err();

        assert_eq!(err, BackendError::HttpStatus { status: 502, body: "upstream down".to_string() });
    }

    #[tokio::test]
    async fn test_forward_timeout_makes_one_attempt() {
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();

        let router = Router::new().route(
            "/api",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!({ "message": "too late" }))
                }
            }),
        );
        let url = serve(router).await;

        let client = MakkaizouLlmClient::new(settings(url), Duration::from_millis(200));
        let err = client.forward("t", "p").await.unwrap_err();

        assert_eq!(err.kind(), "BackendTimeoutError");
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        // Bind and drop to get a port nothing is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = MakkaizouLlmClient::new(settings(format!("http://{addr}/api")), BACKEND_TIMEOUT);
        let err = client.forward("t", "p").await.unwrap_err();

        assert_eq!(err.kind(), "BackendConnectionError");
    }
}
