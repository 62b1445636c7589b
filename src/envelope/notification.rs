use super::{Reason, Shared};

/// The lifecycle event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    Accepted,
    Dispatched,
    Received,
    Consumed,
    Failed,
}

/// A Notification envelope: reports a lifecycle event for a previously sent
/// envelope, identified by a shared `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub shared: Shared,
    pub event: NotificationEvent,
    pub reason: Option<Reason>,
}

impl Notification {
    pub fn new(event: NotificationEvent) -> Self {
        Notification {
            shared: Shared::default(),
            event,
            reason: None,
        }
    }
}
