//! Per-event orchestration: classify, resolve the conversation, forward to the
//! backend, relay the reply, and record the outcome.

use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    panic::AssertUnwindSafe,
    sync::Once,
    time::Instant,
};

use futures::FutureExt;
use serde_json::json;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    base::types::{BackendReply, EventOutcome, IgnoreReason, ReplyStatus, Res, WebhookEvent},
    interaction::classify,
    runtime::Runtime,
    service::db::{FailureRecord, InteractionRecord},
};

/// Failure record kind for faults caught at the event boundary.
pub const EVENT_PROCESSING_ERROR: &str = "EventProcessingError";

thread_local! {
    /// Location and backtrace of the most recent panic on this thread.
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_TRACE_HOOK: Once = Once::new();

/// Handles a single webhook event.
///
/// Never fails: any error or panic raised while processing is recorded as an
/// `EventProcessingError` failure with the event attached, so the caller can move
/// on to the next event.
#[instrument(skip_all, fields(kind = %event.kind))]
pub async fn handle_webhook_event(event: WebhookEvent, runtime: &Runtime) -> EventOutcome {
    install_panic_trace_hook();

    // Keep what the failure record needs before the event moves into the pipeline.
    let payload = serde_json::to_string(&event).unwrap_or_default();
    let group_id = classify::extract_group_id(&event);

    // Process the event.
    let result = AssertUnwindSafe(handle_webhook_event_internal(event, runtime)).catch_unwind().in_current_span().await;

    // Record any faults.
    let (message, trace) = match result {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(err)) => (err.to_string(), format!("{err:?}")),
        Err(panic) => (panic_message(panic.as_ref()), take_panic_trace().unwrap_or_else(|| Backtrace::force_capture().to_string())),
    };

    error!("Error while handling: {}", message);

    let record = FailureRecord::new(EVENT_PROCESSING_ERROR, message).with_trace(trace).with_payload(payload).with_group_id(group_id.as_deref());
    runtime.db.log_failure(record).await;

    EventOutcome::Faulted
}

#[instrument(skip_all)]
async fn handle_webhook_event_internal(event: WebhookEvent, runtime: &Runtime) -> Res<EventOutcome> {
    let started = Instant::now();

    // Only act on mentions of the assistant.

    if !classify::is_addressed_to_assistant(&event, &runtime.config.assistant_handle) {
        debug!("Event is not addressed to the assistant, ignoring.");
        return Ok(EventOutcome::Ignored(IgnoreReason::NotAddressed));
    }

    let (Some(group_id), Some(user_id), Some(text), Some(reply_token)) = (
        classify::extract_group_id(&event),
        classify::extract_user_id(&event),
        classify::extract_text(&event),
        classify::extract_reply_token(&event),
    ) else {
        warn!("Missing required information from event, ignoring.");
        return Ok(EventOutcome::Ignored(IgnoreReason::MissingInformation));
    };

    // Resolve the conversation, and record the intent.

    let conversation = runtime.db.get_or_create_conversation(&group_id, runtime.line_channel_id.as_deref()).await?;

    let intent = InteractionRecord::intent(&group_id, &user_id, &text);
    runtime.db.add_interaction(intent.clone()).await?;

    // Forward to the backend.

    let backend_request = json!({
        "learning_model_code": runtime.llm.model_code(),
        "talk_id": conversation.talk_id,
        "message": text,
    })
    .to_string();

    info!("Processing message with backend for group `{}` ...", group_id);

    match runtime.llm.forward(&conversation.talk_id, &text).await {
        Ok(reply) => {
            let reply_text = compose_reply(&reply, &runtime.config.references_heading);
            let reply_status = send_reply(runtime, &reply_token, &reply_text, &group_id).await;

            let processing_time_ms = started.elapsed().as_millis() as u64;
            let backend_response = serde_json::to_string(&reply)?;

            runtime.db.log_interaction(intent.completed(backend_request, backend_response, reply_status, processing_time_ms)).await;

            Ok(EventOutcome::Replied { reply_status })
        }
        Err(err) => {
            warn!("Backend failed, sending fallback: {}", err);

            let reply_status = send_reply(runtime, &reply_token, &runtime.config.fallback_message, &group_id).await;

            let processing_time_ms = started.elapsed().as_millis() as u64;
            let backend_response = json!({ "error": err.to_string() }).to_string();

            let record = FailureRecord::new(err.kind(), err.to_string()).with_payload(backend_request.clone()).with_group_id(Some(&group_id));
            runtime.db.log_failure(record).await;

            runtime.db.log_interaction(intent.completed(backend_request, backend_response, reply_status, processing_time_ms)).await;

            Ok(EventOutcome::FellBack { error_kind: err.kind(), reply_status })
        }
    }
}

/// Send a reply, recording (not retrying) a failed send.
async fn send_reply(runtime: &Runtime, reply_token: &str, text: &str, group_id: &str) -> ReplyStatus {
    match runtime.chat.send_reply(reply_token, text).await {
        Ok(()) => ReplyStatus::Success,
        Err(err) => {
            let payload = json!({ "reply_token": reply_token, "message": text }).to_string();
            let record = FailureRecord::new(err.kind(), err.to_string()).with_payload(payload).with_group_id(Some(group_id));
            runtime.db.log_failure(record).await;

            ReplyStatus::Error
        }
    }
}

/// Compose the chat reply: the primary message, then a bulleted reference block if there is anything to cite.
///
/// Each reference contributes a `- content` line, and each of its files an
/// indented `  - name: url` line; entries missing those fields are skipped.
pub fn compose_reply(reply: &BackendReply, heading: &str) -> String {
    let mut lines = Vec::new();

    for reference in &reply.references {
        if let Some(content) = &reference.content {
            lines.push(format!("- {content}"));
        }

        for file in &reference.files {
            if let (Some(name), Some(url)) = (&file.name, &file.download_url) {
                lines.push(format!("  - {name}: {url}"));
            }
        }
    }

    if lines.is_empty() {
        return reply.message.clone();
    }

    format!("{}\n\n{}\n{}", reply.message, heading, lines.join("\n"))
}

/// Chain a panic hook that keeps the panic's location and backtrace for the failure record.
fn install_panic_trace_hook() {
    PANIC_TRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let trace = format!("{info}\n{}", Backtrace::force_capture());
            LAST_PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));

            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<String> {
    LAST_PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic: <non-string payload>".to_string()
    }
}

// Tests.
