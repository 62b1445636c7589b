//! The LIME envelope sum type: [`Message`], [`Notification`], [`Command`], and
//! [`Session`], plus the fields every envelope carries.

mod command;
mod message;
mod notification;
mod session;

pub use command::{Command, CommandMethod, CommandStatus};
pub use message::Message;
pub use notification::{Notification, NotificationEvent};
pub use session::{
    Authentication, AuthenticationScheme, Compression, Encryption, Session, SessionState,
};

use crate::node::Node;
use std::collections::BTreeMap;

/// Fields common to every envelope variant: `id`, `from`, `to`, `pp`, and
/// `metadata`. Composed into each variant rather than shared via
/// inheritance, per the redesign guidance to avoid runtime type checks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shared {
    pub id: Option<String>,
    pub from: Option<Node>,
    pub to: Option<Node>,
    pub pp: Option<Node>,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// The reason attached to a failed notification, command, or session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reason {
    pub code: i32,
    pub description: String,
}

/// One LIME envelope. The variant is determined solely by which of
/// `content`/`event`/`method`/`state` is present in the JSON document (see
/// [`crate::wire`] for the (de)serialization logic that enforces this).
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Message(Message),
    Notification(Notification),
    Command(Command),
    Session(Session),
}

impl Envelope {
    pub fn shared(&self) -> &Shared {
        match self {
            Envelope::Message(m) => &m.shared,
            Envelope::Notification(n) => &n.shared,
            Envelope::Command(c) => &c.shared,
            Envelope::Session(s) => &s.shared,
        }
    }

    pub fn shared_mut(&mut self) -> &mut Shared {
        match self {
            Envelope::Message(m) => &mut m.shared,
            Envelope::Notification(n) => &mut n.shared,
            Envelope::Command(c) => &mut c.shared,
            Envelope::Session(s) => &mut s.shared,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.shared().id.as_deref()
    }

    pub fn from(&self) -> Option<&Node> {
        self.shared().from.as_ref()
    }

    pub fn to(&self) -> Option<&Node> {
        self.shared().to.as_ref()
    }
}

impl From<Message> for Envelope {
    fn from(m: Message) -> Self {
        Envelope::Message(m)
    }
}

impl From<Notification> for Envelope {
    fn from(n: Notification) -> Self {
        Envelope::Notification(n)
    }
}

impl From<Command> for Envelope {
    fn from(c: Command) -> Self {
        Envelope::Command(c)
    }
}

impl From<Session> for Envelope {
    fn from(s: Session) -> Self {
        Envelope::Session(s)
    }
}
