use super::Shared;

/// A Message envelope: an opaque document of a given media `type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub shared: Shared,
    /// The media type of `content`, e.g. `text/plain` or `application/json`.
    pub r#type: Option<String>,
    /// The opaque message content.
    pub content: serde_json::Value,
}

impl Message {
    pub fn new(content: serde_json::Value) -> Self {
        Message {
            shared: Shared::default(),
            r#type: None,
            content,
        }
    }
}
