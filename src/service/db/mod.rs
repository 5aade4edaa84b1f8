//! Persistence collaborator: conversation contexts, credentials, and the audit log.

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc, serde::ts_nanoseconds};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use surrealdb::RecordId;
use tracing::error;

use crate::base::types::{ReplyStatus, Res, Void};

pub mod surreal;

// Traits.

/// Generic database client trait that clients must implement.
///
/// This trait defines the storage contract the pipeline depends on. Implementing
/// this trait allows different database backends to be used with the mention-relay.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the conversation context for an external group; or, creates one if it doesn't exist.
    ///
    /// A new context gets a freshly generated talk id that stays stable for its lifetime.
    /// Concurrent first contact resolves to a single context: the first writer wins and
    /// the loser re-reads the winner's record.
    async fn get_or_create_conversation(&self, group_id: &str, line_channel_id: Option<&str>) -> Res<ConversationContext>;

    /// Appends an interaction record.
    async fn add_interaction(&self, record: InteractionRecord) -> Void;

    /// Appends a failure record.
    async fn add_failure(&self, record: FailureRecord) -> Void;

    /// Gets the most recent interaction records, newest first.
    async fn recent_interactions(&self, limit: usize) -> Res<Vec<InteractionRecord>>;

    /// Gets the most recent failure records, newest first.
    async fn recent_failures(&self, limit: usize) -> Res<Vec<FailureRecord>>;

    /// Gets the first active LINE account, in insertion order.
    async fn get_active_line_account(&self) -> Res<Option<LineAccount>>;

    /// Gets the first active backend configuration, in insertion order.
    async fn get_active_backend_config(&self) -> Res<Option<BackendConfig>>;

    /// Registers a LINE account.
    async fn add_line_account(&self, account: LineAccount) -> Void;

    /// Registers a backend configuration.
    async fn add_backend_config(&self, config: BackendConfig) -> Void;
}

// Structs.

/// Database client for mention-relay.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }

    /// Writes a failure record, and mirrors it to the log.
    ///
    /// Persistence errors are logged and swallowed: recording a failure must never fail the caller.
    pub async fn log_failure(&self, record: FailureRecord) {
        error!(kind = %record.kind, group_id = ?record.group_id, "{}", record.message);

        if let Err(err) = self.add_failure(record).await {
            error!("Failed to persist failure record: {}", err);
        }
    }

    /// Writes an interaction record, logging (not propagating) persistence errors.
    pub async fn log_interaction(&self, record: InteractionRecord) {
        if let Err(err) = self.add_interaction(record).await {
            error!("Failed to persist interaction record: {}", err);
        }
    }
}

// Records.
//
// Timestamps are stored as integer nanoseconds since the epoch, so the store orders them by time.

/// Durable mapping from an external chat group to a backend talk id.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: Option<RecordId>,
    pub group_id: String,
    pub line_channel_id: Option<String>,
    pub talk_id: String,
    pub is_active: bool,
    #[serde(with = "ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_nanoseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    /// A new, unsaved context with a fresh talk id.
    pub fn new(group_id: &str, line_channel_id: Option<&str>) -> Self {
        let now = Utc::now();

        Self {
            id: None,
            group_id: group_id.to_string(),
            line_channel_id: line_channel_id.map(str::to_string),
            talk_id: format!("line-{}", uuid::Uuid::new_v4()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A LINE official account's credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAccount {
    pub account_name: String,
    pub channel_id: String,
    pub channel_secret: String,
    pub channel_access_token: String,
    pub is_active: bool,
    #[serde(with = "ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
}

/// Makkaizou endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub api_key: String,
    pub api_url: String,
    pub learning_model_code: String,
    pub is_active: bool,
    #[serde(with = "ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
}

/// Write-once audit entry for a processed event.
///
/// The pre-send intent is recorded with only the message fields set; the
/// completed interaction carries the backend exchange, send outcome, and timing.
/// Payloads are stored as serialized JSON.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub group_id: String,
    pub user_id: String,
    pub message_text: String,
    pub is_mention: bool,
    pub backend_request: Option<String>,
    pub backend_response: Option<String>,
    pub reply_status: Option<ReplyStatus>,
    pub processing_time_ms: Option<u64>,
    #[serde(with = "ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    /// The pre-send intent for a mention.
    pub fn intent(group_id: &str, user_id: &str, message_text: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            message_text: message_text.to_string(),
            is_mention: true,
            backend_request: None,
            backend_response: None,
            reply_status: None,
            processing_time_ms: None,
            created_at: Utc::now(),
        }
    }

    /// The completed interaction.
    pub fn completed(self, backend_request: String, backend_response: String, reply_status: ReplyStatus, processing_time_ms: u64) -> Self {
        Self {
            backend_request: Some(backend_request),
            backend_response: Some(backend_response),
            reply_status: Some(reply_status),
            processing_time_ms: Some(processing_time_ms),
            created_at: Utc::now(),
            ..self
        }
    }

    /// Whether this record describes a finished pipeline rather than an intent.
    pub fn is_completed(&self) -> bool {
        self.processing_time_ms.is_some()
    }
}

/// Append-only record of a failure.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: String,
    pub message: String,
    pub trace: Option<String>,
    pub payload: Option<String>,
    pub group_id: Option<String>,
    #[serde(with = "ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: None,
            payload: None,
            group_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_group_id(mut self, group_id: Option<&str>) -> Self {
        self.group_id = group_id.map(str::to_string);
        self
    }
}
