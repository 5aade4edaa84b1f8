//! SurrealDB implementation for mention-relay data storage.

use std::sync::Arc;

use async_trait::async_trait;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{info, instrument, warn};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{BackendConfig, ConversationContext, DbClient, FailureRecord, GenericDbClient, InteractionRecord, LineAccount};

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Connects to the configured SurrealDB endpoint.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a fresh in-memory SurrealDB instance.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::connect("mem://", None).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// SurrealDB client implementation.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    /// Create a new database client from configuration.
    #[instrument(name = "SurrealDbClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let credentials = match (&config.db_username, &config.db_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        };

        Self::connect(&config.db_endpoint, credentials).await
    }

    /// Connect to an endpoint (`mem://`, `ws://...`, ...) and define the schema.
    async fn connect(endpoint: &str, credentials: Option<(&str, &str)>) -> Res<Self> {
        let db = any::connect(endpoint).await?;

        // Authenticate with the database if credentials were provided.
        if let Some((username, password)) = credentials {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns("mention_relay").use_db("relay").await?;

        // Define schemas.

        // One context per external group: the group id is the record key, and talk ids are unique.
        db.query("DEFINE TABLE IF NOT EXISTS conversation SCHEMALESS;")
            .query("DEFINE INDEX IF NOT EXISTS conversation_talk_id ON conversation FIELDS talk_id UNIQUE;")
            .query("DEFINE TABLE IF NOT EXISTS interaction SCHEMALESS;")
            .query("DEFINE TABLE IF NOT EXISTS failure SCHEMALESS;")
            .query("DEFINE TABLE IF NOT EXISTS line_account SCHEMALESS;")
            .query("DEFINE INDEX IF NOT EXISTS line_account_channel_id ON line_account FIELDS channel_id UNIQUE;")
            .query("DEFINE TABLE IF NOT EXISTS backend_config SCHEMALESS;")
            .await?
            .check()?;

        info!("Database initialized successfully at `{}`.", endpoint);

        Ok(Self { db })
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn get_or_create_conversation(&self, group_id: &str, line_channel_id: Option<&str>) -> Res<ConversationContext> {
        let existing: Option<ConversationContext> = self.db.select(("conversation", group_id)).await?;

        if let Some(context) = existing {
            info!("Conversation for group `{}` found.", group_id);
            return Ok(context);
        }

        info!("Conversation for group `{}` not found, creating a new one.", group_id);

        let new_context = ConversationContext::new(group_id, line_channel_id);
        let created: Res<Option<ConversationContext>> = self.db.create(("conversation", group_id)).content(new_context).await.map_err(Into::into);

        match created {
            Ok(Some(context)) => Ok(context),
            Ok(None) => Err(anyhow::anyhow!("Conversation for group `{group_id}` was not returned after creation.")),
            Err(err) => {
                // Another request won the race; its record is the one that counts.
                warn!("Conversation create for group `{}` lost a race, re-reading: {}", group_id, err);

                let winner: Option<ConversationContext> = self.db.select(("conversation", group_id)).await?;
                winner.ok_or(err)
            }
        }
    }

    #[instrument(skip_all)]
    async fn add_interaction(&self, record: InteractionRecord) -> Void {
        let _: Option<InteractionRecord> = self.db.create("interaction").content(record).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn add_failure(&self, record: FailureRecord) -> Void {
        let _: Option<FailureRecord> = self.db.create("failure").content(record).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent_interactions(&self, limit: usize) -> Res<Vec<InteractionRecord>> {
        let mut response = self
            .db
            .query("SELECT * FROM interaction ORDER BY created_at DESC LIMIT $limit")
            .bind(("limit", limit as i64))
            .await?;

        Ok(response.take(0)?)
    }

    #[instrument(skip(self))]
    async fn recent_failures(&self, limit: usize) -> Res<Vec<FailureRecord>> {
        let mut response = self.db.query("SELECT * FROM failure ORDER BY created_at DESC LIMIT $limit").bind(("limit", limit as i64)).await?;

        Ok(response.take(0)?)
    }

    #[instrument(skip(self))]
    async fn get_active_line_account(&self) -> Res<Option<LineAccount>> {
        let mut response = self.db.query("SELECT * FROM line_account WHERE is_active = true ORDER BY created_at ASC LIMIT 1").await?;
        let accounts: Vec<LineAccount> = response.take(0)?;

        Ok(accounts.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn get_active_backend_config(&self) -> Res<Option<BackendConfig>> {
        let mut response = self.db.query("SELECT * FROM backend_config WHERE is_active = true ORDER BY created_at ASC LIMIT 1").await?;
        let configs: Vec<BackendConfig> = response.take(0)?;

        Ok(configs.into_iter().next())
    }

    #[instrument(skip_all)]
    async fn add_line_account(&self, account: LineAccount) -> Void {
        let _: Option<LineAccount> = self.db.create("line_account").content(account).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn add_backend_config(&self, config: BackendConfig) -> Void {
        let _: Option<BackendConfig> = self.db.create("backend_config").content(config).await?;
        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::base::types::ReplyStatus;

    fn line_account(name: &str, is_active: bool, offset_secs: i64) -> LineAccount {
        LineAccount {
            account_name: name.to_string(),
            channel_id: format!("channel-{name}"),
            channel_secret: format!("secret-{name}"),
            channel_access_token: format!("token-{name}"),
            is_active,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = DbClient::surreal_memory().await.unwrap();

        let first = db.get_or_create_conversation("G1", None).await.unwrap();
        let second = db.get_or_create_conversation("G1", None).await.unwrap();

        assert_eq!(first.talk_id, second.talk_id);
        assert_eq!(first.group_id, "G1");
        assert!(first.talk_id.starts_with("line-"));
        assert!(first.id.is_some());
    }

    #[tokio::test]
    async fn test_get_or_create_distinct_groups_get_distinct_talk_ids() {
        let db = DbClient::surreal_memory().await.unwrap();

        let a = db.get_or_create_conversation("G1", Some("channel-a")).await.unwrap();
        let b = db.get_or_create_conversation("G2", Some("channel-a")).await.unwrap();

        assert_ne!(a.talk_id, b.talk_id);
        assert_eq!(a.line_channel_id.as_deref(), Some("channel-a"));
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_converges() {
        let db = DbClient::surreal_memory().await.unwrap();

        let (a, b) = tokio::join!(db.get_or_create_conversation("G-race", None), db.get_or_create_conversation("G-race", None));

        assert_eq!(a.unwrap().talk_id, b.unwrap().talk_id);
    }

    #[tokio::test]
    async fn test_active_line_account_first_active_wins() {
        let db = DbClient::surreal_memory().await.unwrap();

        assert!(db.get_active_line_account().await.unwrap().is_none());

        db.add_line_account(line_account("inactive", false, 0)).await.unwrap();
        db.add_line_account(line_account("first", true, 1)).await.unwrap();
        db.add_line_account(line_account("second", true, 2)).await.unwrap();

        let active = db.get_active_line_account().await.unwrap().unwrap();
        assert_eq!(active.account_name, "first");
    }

    #[tokio::test]
    async fn test_active_line_account_orders_by_time_across_precisions() {
        let db = DbClient::surreal_memory().await.unwrap();
        let base = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let mut second = line_account("second", true, 0);
        second.created_at = base + Duration::milliseconds(500);
        let mut third = line_account("third", true, 0);
        third.created_at = base + Duration::microseconds(123_456);
        let mut first = line_account("first", true, 0);
        first.created_at = base;

        db.add_line_account(second).await.unwrap();
        db.add_line_account(third).await.unwrap();
        db.add_line_account(first).await.unwrap();

        let active = db.get_active_line_account().await.unwrap().unwrap();
        assert_eq!(active.account_name, "first");
        assert_eq!(active.created_at, base);
    }

    #[tokio::test]
    async fn test_active_backend_config_orders_by_time_across_precisions() {
        let db = DbClient::surreal_memory().await.unwrap();
        let base = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        for (model, created_at) in [("later", base + Duration::milliseconds(500)), ("earliest", base), ("middle", base + Duration::nanoseconds(1))] {
            db.add_backend_config(BackendConfig {
                api_key: "key".to_string(),
                api_url: "http://localhost/api".to_string(),
                learning_model_code: model.to_string(),
                is_active: true,
                created_at,
            })
            .await
            .unwrap();
        }

        let active = db.get_active_backend_config().await.unwrap().unwrap();
        assert_eq!(active.learning_model_code, "earliest");
    }

    #[tokio::test]
    async fn test_recent_failures_newest_first_across_precisions() {
        let db = DbClient::surreal_memory().await.unwrap();
        let base = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        for (kind, created_at) in [("whole", base), ("half", base + Duration::milliseconds(500)), ("micro", base + Duration::microseconds(123_456))] {
            let mut record = FailureRecord::new(kind, "m");
            record.created_at = created_at;
            db.add_failure(record).await.unwrap();
        }

        let kinds = db.recent_failures(10).await.unwrap().into_iter().map(|r| r.kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec!["half".to_string(), "micro".to_string(), "whole".to_string()]);
    }

    #[tokio::test]
    async fn test_active_backend_config() {
        let db = DbClient::surreal_memory().await.unwrap();

        db.add_backend_config(BackendConfig {
            api_key: "key".to_string(),
            api_url: "http://localhost/api".to_string(),
            learning_model_code: "model".to_string(),
            is_active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let active = db.get_active_backend_config().await.unwrap().unwrap();
        assert_eq!(active.learning_model_code, "model");
    }

    #[tokio::test]
    async fn test_audit_log_round_trip() {
        let db = DbClient::surreal_memory().await.unwrap();

        let intent = InteractionRecord::intent("G1", "U1", "@Bot hello");
        db.log_interaction(intent.clone()).await;
        db.log_interaction(intent.completed("{}".to_string(), "{\"message\":\"hi\"}".to_string(), ReplyStatus::Success, 12)).await;
        db.log_failure(FailureRecord::new("BackendTimeoutError", "timed out").with_group_id(Some("G1"))).await;

        let interactions = db.recent_interactions(10).await.unwrap();
        assert_eq!(interactions.len(), 2);
        assert_eq!(interactions.iter().filter(|r| r.is_completed()).count(), 1);

        let failures = db.recent_failures(10).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, "BackendTimeoutError");
        assert_eq!(failures[0].group_id.as_deref(), Some("G1"));
    }
}
