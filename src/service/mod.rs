//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the mention-relay:
//! - Chat services (e.g., LINE)
//! - Database services (e.g., SurrealDB)
//! - LLM services (e.g., Makkaizou)
//! - The inbound webhook server
//!
//! Each client service module defines both a generic trait and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod llm;
pub mod webhook;
