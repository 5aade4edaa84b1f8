//! Core components, types, and utilities for the mention-relay.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Fixed user-facing messages.
//! - Webhook payload types, common result aliases, and the error taxonomy.

pub mod config;
pub mod errors;
pub mod messages;
pub mod types;
