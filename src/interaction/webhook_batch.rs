//! Batch processing for a single webhook request.

use tracing::{Instrument, error, info, instrument};

use crate::{
    base::types::{EventOutcome, WebhookBatch},
    interaction::webhook_event::handle_webhook_event,
    runtime::Runtime,
};

/// Handles every event in the batch, sequentially and in arrival order.
///
/// The work runs on its own task, so it runs to completion even if the
/// caller stops waiting (e.g., the webhook client disconnects).
#[instrument(skip_all, fields(destination = %batch.destination, events = batch.events.len()))]
pub async fn handle_webhook_batch(batch: WebhookBatch, runtime: Runtime) -> Vec<EventOutcome> {
    let task = tokio::spawn(
        async move {
            let mut outcomes = Vec::with_capacity(batch.events.len());

            for event in batch.events {
                outcomes.push(handle_webhook_event(event, &runtime).await);
            }

            outcomes
        }
        .in_current_span(),
    );

    match task.await {
        Ok(outcomes) => {
            info!("Processed {} events.", outcomes.len());
            outcomes
        }
        Err(err) => {
            // Events isolate their own faults, so this only happens on runtime shutdown.
            error!("Batch task failed: {}", err);
            Vec::new()
        }
    }
}
