use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as, skip_serializing_none};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Webhook payloads.

/// A batch of events delivered by a single webhook request.
///
/// Event order is the arrival order and is preserved during processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookBatch {
    pub destination: String,
    pub events: Vec<WebhookEvent>,
}

/// A single inbound webhook event.
///
/// `source` and `message` are kept loosely typed here; the classifier validates
/// them into [`EventSource`] and [`EventMessage`] and treats any shape mismatch
/// as "not addressed".
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    pub timestamp: i64,
    pub source: Value,
    pub reply_token: Option<String>,
    pub message: Option<Value>,
}

/// The origin of an event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventSource {
    #[serde(rename_all = "camelCase")]
    User { user_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Group { group_id: String, user_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Room { room_id: String, user_id: Option<String> },
    #[serde(other)]
    Unknown,
}

/// The message carried by a message event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventMessage {
    Text { text: String, mention: Option<Mention> },
    #[serde(other)]
    Other,
}

/// Platform-supplied mention metadata for a text message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Mention {
    #[serde(default)]
    pub mentionees: Vec<Mentionee>,
}

/// A single mentioned entity, located by character offset and length.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentionee {
    #[serde(rename = "type")]
    pub kind: String,
    pub index: usize,
    pub length: usize,
    #[serde(default)]
    pub is_self: bool,
    pub user_id: Option<String>,
}

// Backend payloads.

/// A normalized reply from the AI backend.
///
/// A `null` reference or file list is read as empty.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendReply {
    pub message: String,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub references: Vec<Reference>,
}

/// A reference the backend cited for its reply.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub content: Option<String>,
    #[serde(default)]
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub files: Vec<ReferenceFile>,
}

/// A file attached to a reference.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFile {
    pub name: Option<String>,
    pub download_url: Option<String>,
}

// Outcomes.

/// Outcome of a reply send, as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// Why an event was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event is not a text message that mentions the assistant first.
    NotAddressed,
    /// Group, user, text, or reply token was missing.
    MissingInformation,
}

/// Terminal state of a single event's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// No side effects beyond logging.
    Ignored(IgnoreReason),
    /// The backend answered and the answer was relayed.
    Replied { reply_status: ReplyStatus },
    /// The backend failed and the fallback message was relayed.
    FellBack { error_kind: &'static str, reply_status: ReplyStatus },
    /// An unanticipated fault was caught at the orchestrator boundary.
    Faulted,
}
