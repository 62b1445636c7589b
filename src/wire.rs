//! Discriminator-free JSON (de)serialization for [`Envelope`].
//!
//! The wire shape has no type tag: a document is a Message iff it has
//! `content`, a Notification iff it has `event`, a Command iff it has
//! `method`, a Session iff it has `state`. Field names are camelCase; absent
//! (`None`) fields are omitted on serialization. This mirrors the teacher's
//! `wire/dynamic.rs` in spirit — a hand-written encode/decode rather than a
//! derived one, because the shape isn't a plain tagged enum.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::envelope::{
    Authentication, AuthenticationScheme, Command, CommandMethod, CommandStatus, Compression,
    Encryption, Envelope, Message, Notification, NotificationEvent, Reason, Session,
    SessionState, Shared,
};
use crate::error::LimeError;
use crate::node::Node;

/// Serialize an envelope to its UTF-8 JSON wire representation.
pub fn serialize(envelope: &Envelope) -> Result<String, LimeError> {
    let value = to_value(envelope)?;
    Ok(serde_json::to_string(&value)?)
}

/// Parse one complete JSON document (one envelope) into an [`Envelope`].
pub fn deserialize(bytes: &[u8]) -> Result<Envelope, LimeError> {
    let value: Value = serde_json::from_slice(bytes)?;
    from_value(value)
}

fn to_value(envelope: &Envelope) -> Result<Value, LimeError> {
    let mut map = Map::new();

    let shared = envelope.shared();
    insert_opt(&mut map, "id", shared.id.as_ref().map(Value::from));
    insert_opt(
        &mut map,
        "from",
        shared.from.as_ref().map(|n| Value::from(n.to_string())),
    );
    insert_opt(
        &mut map,
        "to",
        shared.to.as_ref().map(|n| Value::from(n.to_string())),
    );
    insert_opt(
        &mut map,
        "pp",
        shared.pp.as_ref().map(|n| Value::from(n.to_string())),
    );
    insert_opt(&mut map, "metadata", shared.metadata.as_ref().map(metadata_to_value));

    match envelope {
        Envelope::Message(m) => {
            insert_opt(&mut map, "type", m.r#type.as_ref().map(Value::from));
            map.insert("content".to_string(), m.content.clone());
        }
        Envelope::Notification(n) => {
            map.insert("event".to_string(), Value::from(event_str(n.event)));
            insert_opt(&mut map, "reason", n.reason.as_ref().map(reason_to_value));
        }
        Envelope::Command(c) => {
            if shared.id.is_none() {
                return Err(LimeError::invalid_argument(
                    "command envelopes require an id",
                ));
            }
            map.insert("method".to_string(), Value::from(method_str(c.method)));
            insert_opt(&mut map, "uri", c.uri.as_ref().map(Value::from));
            insert_opt(&mut map, "type", c.r#type.as_ref().map(Value::from));
            insert_opt(&mut map, "resource", c.resource.clone());
            insert_opt(&mut map, "status", c.status.map(|s| Value::from(status_str(s))));
            insert_opt(&mut map, "reason", c.reason.as_ref().map(reason_to_value));
        }
        Envelope::Session(s) => {
            map.insert("state".to_string(), Value::from(state_str(s.state)));
            insert_opt(
                &mut map,
                "encryptionOptions",
                s.encryption_options
                    .as_ref()
                    .map(|opts| Value::Array(opts.iter().map(|e| Value::from(encryption_str(*e))).collect())),
            );
            insert_opt(
                &mut map,
                "encryption",
                s.encryption.map(|e| Value::from(encryption_str(e))),
            );
            insert_opt(
                &mut map,
                "compressionOptions",
                s.compression_options.as_ref().map(|opts| {
                    Value::Array(opts.iter().map(|c| Value::from(compression_str(*c))).collect())
                }),
            );
            insert_opt(
                &mut map,
                "compression",
                s.compression.map(|c| Value::from(compression_str(c))),
            );
            insert_opt(
                &mut map,
                "scheme",
                s.scheme.as_ref().map(|sc| Value::from(sc.as_str().to_string())),
            );
            insert_opt(
                &mut map,
                "schemeOptions",
                s.scheme_options.as_ref().map(|opts| {
                    Value::Array(
                        opts.iter()
                            .map(|sc| Value::from(sc.as_str().to_string()))
                            .collect(),
                    )
                }),
            );
            if let Some(auth) = &s.authentication {
                map.insert("authentication".to_string(), authentication_to_value(auth)?);
            }
            insert_opt(&mut map, "reason", s.reason.as_ref().map(reason_to_value));
        }
    }

    Ok(Value::Object(map))
}

fn from_value(value: Value) -> Result<Envelope, LimeError> {
    let mut map = match value {
        Value::Object(map) => map,
        _ => {
            return Err(LimeError::invalid_argument(
                "envelope must be a JSON object",
            ))
        }
    };

    let shared = extract_shared(&mut map)?;

    let has_content = map.contains_key("content");
    let has_event = map.contains_key("event");
    let has_method = map.contains_key("method");
    let has_state = map.contains_key("state");

    let variant_count = [has_content, has_event, has_method, has_state]
        .iter()
        .filter(|b| **b)
        .count();
    if variant_count != 1 {
        return Err(LimeError::invalid_argument(format!(
            "envelope JSON shape is ambiguous or empty: exactly one of content/event/method/state must be present, found {}",
            variant_count
        )));
    }

    if has_content {
        let r#type = take_str(&mut map, "type");
        let content = map.remove("content").unwrap_or(Value::Null);
        return Ok(Envelope::Message(Message {
            shared,
            r#type,
            content,
        }));
    }

    if has_event {
        let event = parse_event(map.remove("event").unwrap())?;
        let reason = take_reason(&mut map)?;
        return Ok(Envelope::Notification(Notification {
            shared,
            event,
            reason,
        }));
    }

    if has_method {
        if shared.id.is_none() {
            return Err(LimeError::invalid_argument(
                "command envelopes require an id",
            ));
        }
        let method = parse_method(map.remove("method").unwrap())?;
        let uri = take_str(&mut map, "uri");
        let r#type = take_str(&mut map, "type");
        let resource = map.remove("resource");
        let status = match map.remove("status") {
            Some(v) => Some(parse_status(v)?),
            None => None,
        };
        let reason = take_reason(&mut map)?;
        return Ok(Envelope::Command(Command {
            shared,
            method,
            uri,
            r#type,
            resource,
            status,
            reason,
        }));
    }

    // has_state
    let state = parse_state(map.remove("state").unwrap())?;
    let encryption_options = take_str_list(&mut map, "encryptionOptions")?
        .map(|v| v.iter().map(|s| parse_encryption_str(s)).collect::<Result<_, _>>())
        .transpose()?;
    let encryption = take_str(&mut map, "encryption")
        .map(|s| parse_encryption_str(&s))
        .transpose()?;
    let compression_options = take_str_list(&mut map, "compressionOptions")?
        .map(|v| v.iter().map(|s| parse_compression_str(s)).collect::<Result<_, _>>())
        .transpose()?;
    let compression = take_str(&mut map, "compression")
        .map(|s| parse_compression_str(&s))
        .transpose()?;
    let scheme = take_str(&mut map, "scheme").map(|s| AuthenticationScheme::from(s.as_str()));
    let scheme_options = take_str_list(&mut map, "schemeOptions")?
        .map(|v| v.iter().map(|s| AuthenticationScheme::from(s.as_str())).collect());
    let authentication = match map.remove("authentication") {
        Some(v) => Some(value_to_authentication(&scheme, v)?),
        None => None,
    };
    let reason = take_reason(&mut map)?;

    Ok(Envelope::Session(Session {
        shared,
        state,
        encryption_options,
        encryption,
        compression_options,
        compression,
        scheme,
        scheme_options,
        authentication,
        reason,
    }))
}

fn extract_shared(map: &mut Map<String, Value>) -> Result<Shared, LimeError> {
    let id = take_str(map, "id");
    let from = take_node(map, "from")?;
    let to = take_node(map, "to")?;
    let pp = take_node(map, "pp")?;
    let metadata = match map.remove("metadata") {
        Some(Value::Object(obj)) => {
            let mut out = BTreeMap::new();
            for (k, v) in obj {
                let s = v
                    .as_str()
                    .ok_or_else(|| LimeError::invalid_argument("metadata values must be strings"))?
                    .to_string();
                out.insert(k, s);
            }
            Some(out)
        }
        Some(_) => {
            return Err(LimeError::invalid_argument("metadata must be an object"))
        }
        None => None,
    };
    Ok(Shared {
        id,
        from,
        to,
        pp,
        metadata,
    })
}

fn take_str(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    map.remove(key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn take_node(map: &mut Map<String, Value>, key: &str) -> Result<Option<Node>, LimeError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(Some(Node::from_str(&s).map_err(|e| {
            LimeError::invalid_argument(format!("invalid node in `{}`: {}", key, e))
        })?)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(LimeError::invalid_argument(format!(
            "`{}` must be a string",
            key
        ))),
    }
}

fn take_str_list(map: &mut Map<String, Value>, key: &str) -> Result<Option<Vec<String>>, LimeError> {
    match map.remove(key) {
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(
                    item.as_str()
                        .ok_or_else(|| LimeError::invalid_argument(format!("`{}` must contain strings", key)))?
                        .to_string(),
                );
            }
            Ok(Some(out))
        }
        Some(_) => Err(LimeError::invalid_argument(format!("`{}` must be an array", key))),
        None => Ok(None),
    }
}

fn take_reason(map: &mut Map<String, Value>) -> Result<Option<Reason>, LimeError> {
    match map.remove("reason") {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

fn reason_to_value(reason: &Reason) -> Value {
    serde_json::to_value(reason).expect("Reason always serializes")
}

fn metadata_to_value(metadata: &BTreeMap<String, String>) -> Value {
    let mut map = Map::new();
    for (k, v) in metadata {
        map.insert(k.clone(), Value::from(v.clone()));
    }
    Value::Object(map)
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn event_str(e: NotificationEvent) -> &'static str {
    match e {
        NotificationEvent::Accepted => "accepted",
        NotificationEvent::Dispatched => "dispatched",
        NotificationEvent::Received => "received",
        NotificationEvent::Consumed => "consumed",
        NotificationEvent::Failed => "failed",
    }
}

fn parse_event(v: Value) -> Result<NotificationEvent, LimeError> {
    match v.as_str() {
        Some("accepted") => Ok(NotificationEvent::Accepted),
        Some("dispatched") => Ok(NotificationEvent::Dispatched),
        Some("received") => Ok(NotificationEvent::Received),
        Some("consumed") => Ok(NotificationEvent::Consumed),
        Some("failed") => Ok(NotificationEvent::Failed),
        other => Err(LimeError::invalid_argument(format!(
            "invalid notification event: {:?}",
            other
        ))),
    }
}

fn method_str(m: CommandMethod) -> &'static str {
    match m {
        CommandMethod::Get => "get",
        CommandMethod::Set => "set",
        CommandMethod::Delete => "delete",
        CommandMethod::Subscribe => "subscribe",
        CommandMethod::Unsubscribe => "unsubscribe",
        CommandMethod::Observe => "observe",
        CommandMethod::Merge => "merge",
    }
}

fn parse_method(v: Value) -> Result<CommandMethod, LimeError> {
    match v.as_str() {
        Some("get") => Ok(CommandMethod::Get),
        Some("set") => Ok(CommandMethod::Set),
        Some("delete") => Ok(CommandMethod::Delete),
        Some("subscribe") => Ok(CommandMethod::Subscribe),
        Some("unsubscribe") => Ok(CommandMethod::Unsubscribe),
        Some("observe") => Ok(CommandMethod::Observe),
        Some("merge") => Ok(CommandMethod::Merge),
        other => Err(LimeError::invalid_argument(format!(
            "invalid command method: {:?}",
            other
        ))),
    }
}

fn status_str(s: CommandStatus) -> &'static str {
    match s {
        CommandStatus::Success => "success",
        CommandStatus::Failure => "failure",
    }
}

fn parse_status(v: Value) -> Result<CommandStatus, LimeError> {
    match v.as_str() {
        Some("success") => Ok(CommandStatus::Success),
        Some("failure") => Ok(CommandStatus::Failure),
        other => Err(LimeError::invalid_argument(format!(
            "invalid command status: {:?}",
            other
        ))),
    }
}

fn state_str(s: SessionState) -> &'static str {
    match s {
        SessionState::New => "new",
        SessionState::Negotiating => "negotiating",
        SessionState::Authenticating => "authenticating",
        SessionState::Established => "established",
        SessionState::Finishing => "finishing",
        SessionState::Finished => "finished",
        SessionState::Failed => "failed",
    }
}

fn parse_state(v: Value) -> Result<SessionState, LimeError> {
    match v.as_str() {
        Some("new") => Ok(SessionState::New),
        Some("negotiating") => Ok(SessionState::Negotiating),
        Some("authenticating") => Ok(SessionState::Authenticating),
        Some("established") => Ok(SessionState::Established),
        Some("finishing") => Ok(SessionState::Finishing),
        Some("finished") => Ok(SessionState::Finished),
        Some("failed") => Ok(SessionState::Failed),
        other => Err(LimeError::invalid_argument(format!(
            "invalid session state: {:?}",
            other
        ))),
    }
}

fn encryption_str(e: Encryption) -> &'static str {
    match e {
        Encryption::None => "none",
        Encryption::Tls => "tls",
    }
}

fn parse_encryption_str(s: &str) -> Result<Encryption, LimeError> {
    match s {
        "none" => Ok(Encryption::None),
        "tls" => Ok(Encryption::Tls),
        other => Err(LimeError::invalid_argument(format!(
            "invalid encryption option: {}",
            other
        ))),
    }
}

fn compression_str(c: Compression) -> &'static str {
    match c {
        Compression::None => "none",
        Compression::Gzip => "gzip",
    }
}

fn parse_compression_str(s: &str) -> Result<Compression, LimeError> {
    match s {
        "none" => Ok(Compression::None),
        "gzip" => Ok(Compression::Gzip),
        other => Err(LimeError::invalid_argument(format!(
            "invalid compression option: {}",
            other
        ))),
    }
}

/// Serialize `authentication` according to its scheme, per the wire
/// contract: `plain` ⇒ `{"password": "<base64>"}`, `guest`/`transport` ⇒
/// empty object, an extension scheme ⇒ whatever opaque document it carries.
fn authentication_to_value(auth: &Authentication) -> Result<Value, LimeError> {
    Ok(match auth {
        Authentication::Guest => Value::Object(Map::new()),
        Authentication::Transport => Value::Object(Map::new()),
        Authentication::Plain { password } => {
            let mut map = Map::new();
            map.insert(
                "password".to_string(),
                Value::from(base64::encode(password.as_bytes())),
            );
            Value::Object(map)
        }
        Authentication::Extension(value) => value.clone(),
    })
}

/// Deserialize `authentication` by inspecting the sibling `scheme` field, as
/// the wire contract requires.
fn value_to_authentication(
    scheme: &Option<AuthenticationScheme>,
    value: Value,
) -> Result<Authentication, LimeError> {
    match scheme {
        Some(AuthenticationScheme::Guest) | None => Ok(Authentication::Guest),
        Some(AuthenticationScheme::Transport) => Ok(Authentication::Transport),
        Some(AuthenticationScheme::Plain) => {
            let password_b64 = value
                .get("password")
                .and_then(Value::as_str)
                .ok_or_else(|| LimeError::invalid_argument("plain authentication missing password"))?;
            let decoded = base64::decode(password_b64)
                .map_err(|e| LimeError::invalid_argument(format!("invalid base64 password: {}", e)))?;
            let password = String::from_utf8(decoded)
                .map_err(|e| LimeError::invalid_argument(format!("password is not UTF-8: {}", e)))?;
            Ok(Authentication::Plain { password })
        }
        Some(AuthenticationScheme::Extension(_)) => Ok(Authentication::Extension(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Command, CommandMethod, Message, Notification, NotificationEvent, Session, SessionState};

    #[test]
    fn message_round_trips() {
        let mut m = Message::new(serde_json::json!({"text": "hi"}));
        m.r#type = Some("application/json".to_string());
        m.shared.id = Some("1".to_string());
        m.shared.from = Some(Node::from_str("a@b.com").unwrap());
        let env = Envelope::Message(m.clone());
        let json = serialize(&env).unwrap();
        let back = deserialize(json.as_bytes()).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn notification_round_trips() {
        let n = Notification::new(NotificationEvent::Received);
        let env = Envelope::Notification(n);
        let json = serialize(&env).unwrap();
        let back = deserialize(json.as_bytes()).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn command_requires_id() {
        let c = Command {
            shared: Shared::default(),
            method: CommandMethod::Get,
            uri: None,
            r#type: None,
            resource: None,
            status: None,
            reason: None,
        };
        let env = Envelope::Command(c);
        assert!(serialize(&env).is_err());
    }

    #[test]
    fn session_plain_authentication_round_trips() {
        let mut s = Session::new(SessionState::Authenticating);
        s.scheme = Some(AuthenticationScheme::Plain);
        s.authentication = Some(Authentication::Plain {
            password: "hunter2".to_string(),
        });
        let env = Envelope::Session(s);
        let json = serialize(&env).unwrap();
        assert!(json.contains("\"password\""));
        let back = deserialize(json.as_bytes()).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn ambiguous_shape_is_rejected() {
        let json = r#"{"id":"1"}"#;
        assert!(deserialize(json.as_bytes()).is_err());
    }

    #[test]
    fn conflicting_shape_is_rejected() {
        let json = r#"{"content": {}, "event": "received"}"#;
        assert!(deserialize(json.as_bytes()).is_err());
    }

    #[test]
    fn null_fields_are_omitted() {
        let env = Envelope::Notification(Notification::new(NotificationEvent::Accepted));
        let json = serialize(&env).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("\"reason\""));
    }
}
