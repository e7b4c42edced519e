//! Canonical raw-message types.
//!
//! A [`RawMessage`] is the provider-neutral form of one remote message as
//! fetched, before parsing into the persisted [`Email`](super::Email)
//! model. Raw messages are transient and never stored.

use super::{ExternalId, ThreadId};

/// Lightweight handle returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Provider-native message id.
    pub id: ExternalId,
    /// Conversation thread the message belongs to.
    pub thread_id: ThreadId,
}

/// One fully fetched remote message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Provider-native message id.
    pub id: ExternalId,
    /// Conversation thread the message belongs to.
    pub thread_id: ThreadId,
    /// Provider label names attached to the message.
    pub labels: Vec<String>,
    /// Short provider-generated preview of the content.
    pub snippet: String,
    /// Receipt time in milliseconds since the Unix epoch.
    pub internal_ms: Option<i64>,
    /// Root of the MIME part tree.
    pub payload: Option<MessagePart>,
}

/// A node in the MIME part tree.
///
/// Leaf parts carry body data; multipart containers carry nested parts.
/// Either side may be present on a given node, so both are walked.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    /// MIME type, e.g. `text/plain` or `multipart/alternative`.
    pub mime_type: String,
    /// Original filename for attachment parts. Empty or absent otherwise.
    pub filename: Option<String>,
    /// Headers present on this part.
    pub headers: Vec<Header>,
    /// Body content of this part, when it is a leaf.
    pub body: Option<PartBody>,
    /// Nested parts, when this is a multipart container.
    pub parts: Vec<MessagePart>,
}

/// A single message or part header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as sent by the provider.
    pub name: String,
    /// Raw header value.
    pub value: String,
}

impl Header {
    /// Creates a header from name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Body content of a leaf part.
#[derive(Debug, Clone, Default)]
pub struct PartBody {
    /// Base64url-encoded content, when delivered inline.
    pub data: Option<String>,
    /// Decoded size in bytes as reported by the provider.
    pub size: u64,
    /// Provider handle for separately downloadable content.
    pub attachment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_construction() {
        let h = Header::new("Subject", "Hello");
        assert_eq!(h.name, "Subject");
        assert_eq!(h.value, "Hello");
    }

    #[test]
    fn part_defaults_are_empty() {
        let part = MessagePart::default();
        assert!(part.mime_type.is_empty());
        assert!(part.parts.is_empty());
        assert!(part.body.is_none());
    }

    #[test]
    fn message_ref_equality() {
        let a = MessageRef {
            id: ExternalId::from("m1"),
            thread_id: ThreadId::from("t1"),
        };
        let b = MessageRef {
            id: ExternalId::from("m1"),
            thread_id: ThreadId::from("t1"),
        };
        assert_eq!(a, b);
    }
}
