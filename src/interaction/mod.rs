//! Event handling for mention-relay.
//!
//! This module provides functionality for handling inbound webhook events:
//! - Classifying events and extracting the fields the pipeline needs
//! - Orchestrating each qualifying event across the database, backend, and chat services
//! - Processing whole batches in arrival order with per-event fault isolation

pub mod classify;
pub mod webhook_batch;
pub mod webhook_event;
