//! Integration with the conversational AI backend.
//!
//! The module defines the `GenericLlmClient` trait that can be implemented
//! for different backends, with a default implementation for Makkaizou.

pub mod makkaizou;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::{errors::BackendError, types::BackendReply};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the single exchange the relay needs: forward a prompt
/// within a persistent talk, and get back a normalized reply or a classified failure.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// The model identifier sent with every request.
    ///
    /// Recorded in the audit log alongside the outbound request.
    fn model_code(&self) -> &str;

    /// Forward a prompt to the backend.
    ///
    /// Exactly one attempt is made, bounded by the client's timeout.
    async fn forward(&self, talk_id: &str, prompt: &str) -> Result<BackendReply, BackendError>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}
