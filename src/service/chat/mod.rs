//! Chat platform integration for mention-relay.
//!
//! The relay only ever talks back to the platform one way: a reply bound to the
//! single-use token that came with the triggering event. The `GenericChatClient`
//! trait captures that, with a default implementation for LINE.

pub mod line;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::errors::SendError;

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// Implementing this trait allows different chat services to be used with the mention-relay.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Send a reply to the chat the reply token was issued for.
    ///
    /// Reply tokens are single-use and short-lived, so a failed send is never retried.
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), SendError>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
