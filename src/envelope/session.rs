use super::{Reason, Shared};

/// The client/server handshake state carried by a Session envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Negotiating,
    Authenticating,
    Established,
    Finishing,
    Finished,
    Failed,
}

/// The transport-layer encryption in force on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    None,
    Tls,
}

/// The compression scheme negotiated for the channel. This core implements
/// negotiation only; no compression codec is applied to the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
}

/// The authentication scheme named by a Session envelope's `scheme` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationScheme {
    Guest,
    Plain,
    Transport,
    /// An extension scheme not defined by the core protocol.
    Extension(String),
}

impl AuthenticationScheme {
    pub fn as_str(&self) -> &str {
        match self {
            AuthenticationScheme::Guest => "guest",
            AuthenticationScheme::Plain => "plain",
            AuthenticationScheme::Transport => "transport",
            AuthenticationScheme::Extension(s) => s.as_str(),
        }
    }
}

impl From<&str> for AuthenticationScheme {
    fn from(s: &str) -> Self {
        match s {
            "guest" => AuthenticationScheme::Guest,
            "plain" => AuthenticationScheme::Plain,
            "transport" => AuthenticationScheme::Transport,
            other => AuthenticationScheme::Extension(other.to_string()),
        }
    }
}

/// Scheme-specific authentication payload. The wire shape of each variant
/// (see [`crate::wire`]) is dictated by the Session's `scheme` field, not by
/// a tag on `Authentication` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// No credentials; an empty object on the wire.
    Guest,
    /// A cleartext password, base64-encoded on the wire.
    Plain { password: String },
    /// No credentials beyond the transport channel itself; an empty object
    /// on the wire.
    Transport,
    /// An extension scheme's opaque payload.
    Extension(serde_json::Value),
}

/// A Session envelope: negotiates the connection and carries the handshake
/// state machine between client and server.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub shared: Shared,
    pub state: SessionState,
    pub encryption_options: Option<Vec<Encryption>>,
    pub encryption: Option<Encryption>,
    pub compression_options: Option<Vec<Compression>>,
    pub compression: Option<Compression>,
    /// The authentication scheme that `authentication` is shaped for.
    pub scheme: Option<AuthenticationScheme>,
    pub scheme_options: Option<Vec<AuthenticationScheme>>,
    pub authentication: Option<Authentication>,
    pub reason: Option<Reason>,
}

impl Session {
    pub fn new(state: SessionState) -> Self {
        Session {
            shared: Shared::default(),
            state,
            encryption_options: None,
            encryption: None,
            compression_options: None,
            compression: None,
            scheme: None,
            scheme_options: None,
            authentication: None,
            reason: None,
        }
    }
}
