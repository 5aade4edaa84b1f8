//! Runtime services and shared state for the mention-relay.

use std::time::Duration;

use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{
        chat::{ChatClient, line::LineCredentials},
        db::DbClient,
        llm::{LlmClient, makkaizou::BackendSettings},
        webhook,
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the configuration and every collaborator the pipeline
/// talks to. It is designed to be trivially cloneable, allowing it to be passed
/// around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// Channel secret of the active LINE account, used to verify webhooks.
    pub channel_secret: String,
    /// Channel id of the active LINE account, if it came from a registered account.
    pub line_channel_id: Option<String>,
}

impl Runtime {
    /// Create a new runtime instance.
    ///
    /// Credentials come from the first active registered account / backend
    /// configuration when there is one, and from `config` otherwise.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await?;

        // Resolve the active credentials.
        let credentials = resolve_line_credentials(&config, &db).await?;
        let settings = resolve_backend_settings(&config, &db).await?;

        // Initialize the LLM client.
        let llm = LlmClient::makkaizou(settings);

        // Initialize the chat client.
        let channel_secret = credentials.channel_secret.clone();
        let line_channel_id = credentials.channel_id.clone();
        let chat = ChatClient::line(credentials, Duration::from_secs(config.line_reply_timeout_secs));

        Ok(Self {
            config,
            db,
            llm,
            chat,
            channel_secret,
            line_channel_id,
        })
    }

    /// Serve the webhook until shutdown.
    pub async fn start(&self) -> Void {
        webhook::serve(self.clone()).await
    }
}

/// The first active LINE account, or the configured credentials.
async fn resolve_line_credentials(config: &Config, db: &DbClient) -> Res<LineCredentials> {
    let credentials = match db.get_active_line_account().await? {
        Some(account) => {
            info!("Using LINE account `{}`.", account.account_name);

            LineCredentials {
                api_base: config.line_api_base.clone(),
                channel_id: Some(account.channel_id),
                channel_secret: account.channel_secret,
                channel_access_token: account.channel_access_token,
            }
        }
        None => {
            info!("No registered LINE account, using configured credentials.");

            LineCredentials {
                api_base: config.line_api_base.clone(),
                channel_id: None,
                channel_secret: config.line_channel_secret.clone(),
                channel_access_token: config.line_channel_access_token.clone(),
            }
        }
    };

    Ok(credentials)
}

/// The first active backend configuration, or the configured settings.
async fn resolve_backend_settings(config: &Config, db: &DbClient) -> Res<BackendSettings> {
    let settings = match db.get_active_backend_config().await? {
        Some(backend) => BackendSettings {
            api_key: backend.api_key,
            api_url: backend.api_url,
            learning_model_code: backend.learning_model_code,
        },
        None => BackendSettings {
            api_key: config.makkaizou_api_key.clone(),
            api_url: config.makkaizou_api_url.clone(),
            learning_model_code: config.makkaizou_learning_model_code.clone(),
        },
    };

    Ok(settings)
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::{
        base::config::ConfigInner,
        service::db::{BackendConfig, LineAccount},
    };

    fn config() -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                line_channel_secret: "configured-secret".to_string(),
                line_channel_access_token: "configured-token".to_string(),
                makkaizou_api_url: "http://configured/api".to_string(),
                makkaizou_learning_model_code: "configured-model".to_string(),
                assistant_handle: "@Makkaizou".to_string(),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_configured_credentials() {
        let db = DbClient::surreal_memory().await.unwrap();
        let config = config();

        let credentials = resolve_line_credentials(&config, &db).await.unwrap();
        let settings = resolve_backend_settings(&config, &db).await.unwrap();

        assert_eq!(credentials.channel_secret, "configured-secret");
        assert_eq!(credentials.channel_id, None);
        assert_eq!(settings.learning_model_code, "configured-model");
    }

    #[tokio::test]
    async fn test_prefers_registered_credentials() {
        let db = DbClient::surreal_memory().await.unwrap();
        let config = config();

        db.add_line_account(LineAccount {
            account_name: "official".to_string(),
            channel_id: "1650000000".to_string(),
            channel_secret: "registered-secret".to_string(),
            channel_access_token: "registered-token".to_string(),
            is_active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        db.add_backend_config(BackendConfig {
            api_key: "registered-key".to_string(),
            api_url: "http://registered/api".to_string(),
            learning_model_code: "registered-model".to_string(),
            is_active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let credentials = resolve_line_credentials(&config, &db).await.unwrap();
        let settings = resolve_backend_settings(&config, &db).await.unwrap();

        assert_eq!(credentials.channel_secret, "registered-secret");
        assert_eq!(credentials.channel_id.as_deref(), Some("1650000000"));
        assert_eq!(settings.api_url, "http://registered/api");
    }
}
