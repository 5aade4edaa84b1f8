//! Fixed, user-facing message texts.

/// Sent to the chat whenever the backend cannot produce a reply.
///
/// This never carries internal error detail.
pub const FALLBACK_MESSAGE: &str = "I'm sorry, but I'm having trouble processing your request. Please try again later.";

/// Heading placed above the reference block appended to a reply.
pub const REFERENCES_HEADING: &str = "参考情報:";
