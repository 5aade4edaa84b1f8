//! LINE Messaging API reply client.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use crate::base::errors::SendError;

use super::{ChatClient, GenericChatClient};

// Extra methods on `ChatClient` applied by the LINE implementation.

impl ChatClient {
    /// Creates a new LINE chat client.
    pub fn line(credentials: LineCredentials, timeout: Duration) -> Self {
        let client = LineChatClient::new(credentials, timeout);
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// Credentials and endpoint for a LINE official account.
#[derive(Debug, Clone, Default)]
pub struct LineCredentials {
    /// Base URL of the Messaging API, e.g. `https://api.line.me`.
    pub api_base: String,
    /// The channel id of the account, when it came from a registered account.
    pub channel_id: Option<String>,
    pub channel_secret: String,
    pub channel_access_token: String,
}

/// Reply request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// LINE client implementation.
#[derive(Clone)]
struct LineChatClient {
    client: reqwest::Client,
    credentials: LineCredentials,
    timeout: Duration,
}

impl LineChatClient {
    #[instrument(name = "LineChatClient::new", skip_all)]
    fn new(credentials: LineCredentials, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            timeout,
        }
    }

    fn reply_url(&self) -> String {
        format!("{}/v2/bot/message/reply", self.credentials.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenericChatClient for LineChatClient {
    #[instrument(skip(self, text))]
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), SendError> {
        let request = ReplyRequest {
            reply_token,
            messages: [TextMessage { kind: "text", text }],
        };

        let response = self
            .client
            .post(self.reply_url())
            .bearer_auth(&self.credentials.channel_access_token)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::HttpStatus { status: status.as_u16(), body });
        }

        info!("Sent reply to LINE: {}", text);

        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn credentials(api_base: String) -> LineCredentials {
        LineCredentials {
            api_base,
            channel_id: None,
            channel_secret: "secret".to_string(),
            channel_access_token: "access-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_reply_posts_text_message() {
        let seen = Arc::new(Mutex::new(None::<(String, Value)>));
        let seen_clone = seen.clone();

        let router = Router::new().route(
            "/v2/bot/message/reply",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen_clone.clone();
                async move {
                    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
                    *seen.lock().await = Some((auth, body));
                    Json(json!({}))
                }
            }),
        );
        let base = serve(router).await;

        let chat = ChatClient::line(credentials(base), Duration::from_secs(5));
        chat.send_reply("reply-token", "hello").await.unwrap();

        let (auth, body) = seen.lock().await.clone().unwrap();
        assert_eq!(auth, "Bearer access-token");
        assert_eq!(body, json!({ "replyToken": "reply-token", "messages": [{ "type": "text", "text": "hello" }] }));
    }

    #[tokio::test]
    async fn test_send_reply_rejected() {
        let router = Router::new().route("/v2/bot/message/reply", post(|| async { (StatusCode::BAD_REQUEST, "Invalid reply token") }));
        let base = serve(router).await;

        let chat = ChatClient::line(credentials(base), Duration::from_secs(5));
        let err = chat.send_reply("expired", "hello").await.unwrap_err();

        assert_eq!(err, SendError::HttpStatus { status: 400, body: "Invalid reply token".to_string() });
    }
}
