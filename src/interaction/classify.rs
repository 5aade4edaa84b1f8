//! Event classification: decides which events address the assistant, and
//! extracts the fields the pipeline needs.
//!
//! Every function here is total. Shape mismatches in the loosely-typed
//! payload read as "absent" or "not addressed", never as an error.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::base::types::{EventMessage, EventSource, Mentionee, WebhookEvent};

/// Whether `event` is a text message whose leading mention targets the assistant.
///
/// All of the following must hold:
/// - the event is a message event carrying a text message with mention metadata;
/// - some mentionee is a self-flagged user mention at index 0;
/// - that span, trimmed, is exactly `handle`;
/// - non-whitespace text remains after the span.
pub fn is_addressed_to_assistant(event: &WebhookEvent, handle: &str) -> bool {
    if event.kind != "message" {
        return false;
    }

    let Some(EventMessage::Text { text, mention: Some(mention) }) = parse_message(event) else {
        return false;
    };

    mention.mentionees.iter().any(|mentionee| mentionee_addresses_assistant(mentionee, &text, handle))
}

/// Check a single mentionee against the text it annotates.
fn mentionee_addresses_assistant(mentionee: &Mentionee, text: &str, handle: &str) -> bool {
    if mentionee.kind != "user" || !mentionee.is_self || mentionee.index != 0 {
        return false;
    }

    // Offsets come from the platform; re-check bounds before slicing.
    let chars = text.chars().collect::<Vec<_>>();
    let Some(end) = mentionee.index.checked_add(mentionee.length) else {
        return false;
    };

    if end > chars.len() {
        debug!("Mention span {}..{} exceeds text length {}.", mentionee.index, end, chars.len());
        return false;
    }

    let span = chars[mentionee.index..end].iter().collect::<String>();
    let rest = chars[end..].iter().collect::<String>();

    span.trim() == handle && !rest.trim().is_empty()
}

/// The group (or room) the event came from.
pub fn extract_group_id(event: &WebhookEvent) -> Option<String> {
    let group_id = match parse_source(event)? {
        EventSource::Group { group_id, .. } => group_id,
        EventSource::Room { room_id, .. } => room_id,
        EventSource::User { .. } | EventSource::Unknown => return None,
    };

    non_empty(group_id)
}

/// The user that sent the event.
pub fn extract_user_id(event: &WebhookEvent) -> Option<String> {
    // Read the field directly so unknown source kinds still yield their user.
    event.source.get("userId").and_then(Value::as_str).map(str::to_string).and_then(non_empty)
}

/// The message text, for text messages only.
pub fn extract_text(event: &WebhookEvent) -> Option<String> {
    match parse_message(event)? {
        EventMessage::Text { text, .. } => non_empty(text),
        EventMessage::Other => None,
    }
}

/// The single-use reply token, if the event carries one.
pub fn extract_reply_token(event: &WebhookEvent) -> Option<String> {
    event.reply_token.clone().and_then(non_empty)
}

/// Empty identifiers are as good as absent.
fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn parse_source(event: &WebhookEvent) -> Option<EventSource> {
    parse_lenient(&event.source)
}

fn parse_message(event: &WebhookEvent) -> Option<EventMessage> {
    parse_lenient(event.message.as_ref()?)
}

/// Deserialize, treating failure as absence.
fn parse_lenient<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match T::deserialize(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            debug!("Ignoring malformed payload: {}", err);
            None
        }
    }
}

// Tests.
