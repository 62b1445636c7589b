//! The optional built-in keepalive responder (component E): answers
//! `GET /ping` commands without ever handing them to subscribers.

use crate::envelope::{Command, CommandMethod, CommandStatus};

/// Is `command` a ping request the channel should answer itself?
pub fn is_ping_request(command: &Command) -> bool {
    command.shared.id.is_some()
        && command.method == CommandMethod::Get
        && command.status.is_none()
        && command.uri.as_deref() == Some("/ping")
}

/// Build the synthesized response to a ping request, per spec.md §4.C: same
/// `id`, addressed back to the requester, `GET`/`success`, an empty
/// `application/vnd.lime.ping+json` resource.
pub fn ping_response(request: &Command) -> Command {
    Command {
        shared: crate::envelope::Shared {
            id: request.shared.id.clone(),
            from: None,
            to: request.shared.from.clone(),
            pp: None,
            metadata: None,
        },
        method: CommandMethod::Get,
        uri: None,
        r#type: Some("application/vnd.lime.ping+json".to_string()),
        resource: Some(serde_json::json!({})),
        status: Some(CommandStatus::Success),
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_ping_request() {
        let mut c = Command::new("1", CommandMethod::Get);
        c.uri = Some("/ping".to_string());
        assert!(is_ping_request(&c));
    }

    #[test]
    fn response_echoes_id_and_targets_requester() {
        let mut request = Command::new("42", CommandMethod::Get);
        request.uri = Some("/ping".to_string());
        request.shared.from = Some("a@b.com".parse().unwrap());

        let response = ping_response(&request);
        assert_eq!(response.shared.id, request.shared.id);
        assert_eq!(response.shared.to, request.shared.from);
        assert_eq!(response.status, Some(CommandStatus::Success));
    }

    #[test]
    fn rejects_non_ping_commands() {
        let mut c = Command::new("1", CommandMethod::Get);
        c.uri = Some("/other".to_string());
        assert!(!is_ping_request(&c));

        let mut c2 = Command::new("1", CommandMethod::Set);
        c2.uri = Some("/ping".to_string());
        assert!(!is_ping_request(&c2));
    }
}
