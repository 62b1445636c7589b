//! The optional envelope recipient filler (component F): backfills an
//! outgoing envelope's `from`/`to` addresses from the session's own
//! negotiated identity, so callers constructing envelopes don't have to
//! repeat the local and remote node on every send.

use crate::envelope::Envelope;
use crate::node::Node;

/// Fill `envelope`'s `from` with `local` and `to` with `remote`, but only
/// where the envelope does not already specify one explicitly.
pub fn fill_recipients(envelope: &mut Envelope, local: Option<&Node>, remote: Option<&Node>) {
    let shared = envelope.shared_mut();
    if shared.from.is_none() {
        shared.from = local.cloned();
    }
    if shared.to.is_none() {
        shared.to = remote.cloned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Message;

    #[test]
    fn fills_absent_from_and_to() {
        let local: Node = "me@here.com".parse().unwrap();
        let remote: Node = "you@there.com".parse().unwrap();
        let mut envelope = Envelope::Message(Message::new(serde_json::json!("hi")));

        fill_recipients(&mut envelope, Some(&local), Some(&remote));

        assert_eq!(envelope.from(), Some(&local));
        assert_eq!(envelope.to(), Some(&remote));
    }

    #[test]
    fn leaves_explicit_addresses_untouched() {
        let explicit: Node = "explicit@domain.com".parse().unwrap();
        let local: Node = "me@here.com".parse().unwrap();
        let mut envelope = Envelope::Message(Message::new(serde_json::json!("hi")));
        envelope.shared_mut().from = Some(explicit.clone());

        fill_recipients(&mut envelope, Some(&local), None);

        assert_eq!(envelope.from(), Some(&explicit));
    }
}
