//! Library root for `mention-relay`.
//!
//! Mention-relay connects a LINE official account to the Makkaizou AI backend:
//! - Authenticates inbound webhook deliveries
//! - Picks out text messages that @-mention the assistant first
//! - Forwards them within a per-group conversation and relays the answer
//! - Records every interaction and failure for later inspection
//!
//! The bot integrates with LINE for chat, SurrealDB for storage, and Makkaizou
//! for replies. Each collaborator sits behind a trait, so the orchestration can
//! be exercised against mocks.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the mention-relay runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database, LLM, and chat clients
/// - Serves the webhook until shutdown
pub async fn start(config: Config) -> Void {
    info!("Starting mention-relay ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}

/// Print the most recent interaction and failure records.
pub async fn show_logs(config: Config, limit: usize) -> Void {
    let db = service::db::DbClient::surreal(&config).await?;

    println!("\n=== Recent Interactions ===");
    for record in db.recent_interactions(limit).await? {
        println!("\nTimestamp: {}", record.created_at);
        println!("Group ID: {}", record.group_id);
        println!("User ID: {}", record.user_id);
        println!("Message: {}", record.message_text);
        println!("Is Mention: {}", record.is_mention);
        if let Some(status) = record.reply_status {
            println!("Reply Status: {status:?}");
        }
        if let Some(ms) = record.processing_time_ms {
            println!("Processing Time: {ms}ms");
        }
        println!("{}", "-".repeat(50));
    }

    println!("\n=== Recent Failures ===");
    for record in db.recent_failures(limit).await? {
        println!("\nTimestamp: {}", record.created_at);
        println!("Kind: {}", record.kind);
        println!("Message: {}", record.message);
        println!("Group ID: {}", record.group_id.as_deref().unwrap_or("-"));
        println!("{}", "-".repeat(50));
    }

    Ok(())
}
