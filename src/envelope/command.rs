use super::{Reason, Shared};

/// The method a command requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMethod {
    Get,
    Set,
    Delete,
    Subscribe,
    Unsubscribe,
    Observe,
    Merge,
}

/// The outcome status of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Failure,
}

/// A Command envelope: a request/response against a `uri`-addressed
/// resource. Requires an `id` (unlike the other envelope kinds).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub shared: Shared,
    pub method: CommandMethod,
    pub uri: Option<String>,
    pub r#type: Option<String>,
    pub resource: Option<serde_json::Value>,
    pub status: Option<CommandStatus>,
    pub reason: Option<Reason>,
}

impl Command {
    pub fn new(id: impl Into<String>, method: CommandMethod) -> Self {
        Command {
            shared: Shared {
                id: Some(id.into()),
                ..Shared::default()
            },
            method,
            uri: None,
            r#type: None,
            resource: None,
            status: None,
            reason: None,
        }
    }
}
