//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use crate::base::messages;

use super::types::Res;

/// Default LINE Messaging API base URL.
fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}

/// Default timeout for reply sends, in seconds.
fn default_line_reply_timeout_secs() -> u64 {
    10
}

/// Default heading placed above the reference block of a reply.
fn default_references_heading() -> String {
    messages::REFERENCES_HEADING.to_string()
}

/// Default apology sent to the chat when the backend fails.
fn default_fallback_message() -> String {
    messages::FALLBACK_MESSAGE.to_string()
}

/// Default database endpoint (in-memory).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default host to bind the webhook server to.
fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Default port to bind the webhook server to.
fn default_port() -> u16 {
    8000
}

/// Configuration for the mention-relay application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// LINE channel secret used to verify webhook signatures (`MENTION_RELAY_LINE_CHANNEL_SECRET`).
    #[serde(default)]
    pub line_channel_secret: String,
    /// LINE channel access token used for replies (`MENTION_RELAY_LINE_CHANNEL_ACCESS_TOKEN`).
    #[serde(default)]
    pub line_channel_access_token: String,
    /// LINE Messaging API base URL (`MENTION_RELAY_LINE_API_BASE`).
    #[serde(default = "default_line_api_base")]
    pub line_api_base: String,
    /// Timeout for a single reply send, in seconds (`MENTION_RELAY_LINE_REPLY_TIMEOUT_SECS`).
    #[serde(default = "default_line_reply_timeout_secs")]
    pub line_reply_timeout_secs: u64,
    /// Makkaizou external integration key (`MENTION_RELAY_MAKKAIZOU_API_KEY`).
    #[serde(default)]
    pub makkaizou_api_key: String,
    /// Makkaizou endpoint URL (`MENTION_RELAY_MAKKAIZOU_API_URL`).
    #[serde(default)]
    pub makkaizou_api_url: String,
    /// Makkaizou learning model code (`MENTION_RELAY_MAKKAIZOU_LEARNING_MODEL_CODE`).
    #[serde(default)]
    pub makkaizou_learning_model_code: String,
    /// The literal handle a mention must match to address the assistant, e.g. `@Makkaizou` (`MENTION_RELAY_ASSISTANT_HANDLE`).
    pub assistant_handle: String,
    /// Heading placed above the reference block of a reply (`MENTION_RELAY_REFERENCES_HEADING`).
    #[serde(default = "default_references_heading")]
    pub references_heading: String,
    /// Message sent to the chat when the backend fails (`MENTION_RELAY_FALLBACK_MESSAGE`).
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Database endpoint URL, e.g. `mem://` or `ws://localhost:8000` (`MENTION_RELAY_DB_ENDPOINT`).
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username for remote endpoints (`MENTION_RELAY_DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password for remote endpoints (`MENTION_RELAY_DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Host the webhook server binds to (`MENTION_RELAY_HOST`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the webhook server binds to (`MENTION_RELAY_PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder();

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        // Environment wins over the file.
        cfg = cfg.add_source(config::Environment::default().prefix("MENTION_RELAY"));

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the invariants the rest of the application relies on.
    pub fn validate(&self) -> Res<()> {
        if self.assistant_handle.trim().is_empty() {
            return Err(anyhow::anyhow!("Assistant handle must not be empty."));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Port must be non-zero."));
        }

        Ok(())
    }
}

// Tests.
