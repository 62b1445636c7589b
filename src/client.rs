//! The client session driver (component D): drives the handshake state
//! machine on top of a [`ChannelBase`], exposing each phase
//! (`start_new_session`/`negotiate_session`/`authenticate_session`/
//! `send_finishing_session`) as its own call with per-call state validation,
//! plus an `establish_session` convenience that chains the first three.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::info;

use crate::channel::ChannelBase;
use crate::envelope::{
    Authentication, AuthenticationScheme, Compression, Encryption as SessionEncryption, Session,
    SessionState,
};
use crate::error::{LimeError, Result};
use crate::node::Node;
use crate::timeout::WithTimeout;
use crate::trace::TraceWriter;
use crate::transport::Encryption as TransportEncryption;

/// Credentials presented during the authenticating phase.
pub enum Credentials {
    Guest,
    Plain { password: String },
    Transport,
}

/// A LIME client session: owns a [`ChannelBase`] and drives it through the
/// handshake state machine (new → negotiating → authenticating →
/// established → finishing → finished | failed).
pub struct ClientSession {
    channel: Arc<ChannelBase>,
    /// The most recent inbound session response, kept around so
    /// `negotiate_session` can read the server's offered encryption/
    /// compression options without threading them through every call.
    last_response: StdMutex<Option<Session>>,
}

impl ClientSession {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        ClientSession {
            channel: ChannelBase::new(trace, true, true),
            last_response: StdMutex::new(None),
        }
    }

    pub fn channel(&self) -> &Arc<ChannelBase> {
        &self.channel
    }

    pub fn state(&self) -> SessionState {
        self.channel.state()
    }

    fn require_state(&self, allowed: &[SessionState]) -> Result<()> {
        let state = self.channel.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(LimeError::invalid_state(format!(
                "session driver operation not legal in state {:?}",
                state
            )))
        }
    }

    /// NEW → send one outbound `new` Session, await the server's reply, and
    /// transition to whichever state it picks (`negotiating`,
    /// `authenticating`, or `failed`).
    pub async fn start_new_session(&self, identity: &Node, timeout: Duration) -> Result<Session> {
        self.require_state(&[SessionState::New])?;
        self.channel.install().await;
        self.channel.set_local_node(Some(identity.clone()));

        let mut new_session = Session::new(SessionState::New);
        new_session.shared.from = Some(identity.clone());
        let response = self.send_session_waiting_for_ack(new_session, timeout).await?;
        self.apply_handshake_response(response)
    }

    /// NEGOTIATING → send an outbound Session proposing `compression` and
    /// `encryption`, await the server's reply. Passing `None` for a dimension
    /// picks the first option the server offered; passing `Some(x)` demands
    /// `x` verbatim and fails with *invalid-argument* if the server never
    /// offered it.
    pub async fn negotiate_session(
        &self,
        compression: Option<Compression>,
        encryption: Option<SessionEncryption>,
        timeout: Duration,
    ) -> Result<Session> {
        self.require_state(&[SessionState::Negotiating])?;

        let offer = self.last_response.lock().unwrap().clone();
        let offered_encryption = offer
            .as_ref()
            .and_then(|o| o.encryption_options.clone())
            .unwrap_or_default();
        let offered_compression = offer
            .as_ref()
            .and_then(|o| o.compression_options.clone())
            .unwrap_or_default();

        let chosen_encryption = match encryption {
            Some(e) if offered_encryption.is_empty() || offered_encryption.contains(&e) => e,
            Some(e) => {
                return Err(LimeError::invalid_argument(format!(
                    "server did not offer encryption {:?}",
                    e
                )))
            }
            None => offered_encryption
                .first()
                .copied()
                .unwrap_or(SessionEncryption::None),
        };
        let chosen_compression = match compression {
            Some(c) if offered_compression.is_empty() || offered_compression.contains(&c) => c,
            Some(c) => {
                return Err(LimeError::invalid_argument(format!(
                    "server did not offer compression {:?}",
                    c
                )))
            }
            None => offered_compression
                .first()
                .copied()
                .unwrap_or(Compression::None),
        };

        let mut negotiate = Session::new(SessionState::Negotiating);
        negotiate.shared.id = self.channel.session_id();
        negotiate.encryption = Some(chosen_encryption);
        negotiate.compression = Some(chosen_compression);
        let response = self.send_session_waiting_for_ack(negotiate, timeout).await?;

        if chosen_encryption == SessionEncryption::Tls {
            self.channel.set_encryption(TransportEncryption::Tls).await?;
        }

        self.apply_handshake_response(response)
    }

    /// AUTHENTICATING → send an outbound Session carrying `authentication`,
    /// optionally qualifying `identity` with `instance` (producing
    /// `from="u@d/instance"`), await the server's reply.
    pub async fn authenticate_session(
        &self,
        identity: &Node,
        authentication: Authentication,
        instance: Option<&str>,
        timeout: Duration,
    ) -> Result<Session> {
        self.require_state(&[SessionState::Authenticating])?;

        let scheme = match &authentication {
            Authentication::Guest => AuthenticationScheme::Guest,
            Authentication::Plain { .. } => AuthenticationScheme::Plain,
            Authentication::Transport => AuthenticationScheme::Transport,
            Authentication::Extension(_) => {
                return Err(LimeError::invalid_argument(
                    "extension authentication schemes are not supported by this driver",
                ))
            }
        };

        let from = match instance {
            Some(instance) => Node::new(
                identity.name().map(str::to_string),
                identity.domain().to_string(),
                Some(instance.to_string()),
            ),
            None => identity.clone(),
        };
        self.channel.set_local_node(Some(from.clone()));

        let mut authenticate = Session::new(SessionState::Authenticating);
        authenticate.shared.id = self.channel.session_id();
        authenticate.shared.from = Some(from);
        authenticate.scheme = Some(scheme);
        authenticate.authentication = Some(authentication);
        let response = self.send_session_waiting_for_ack(authenticate, timeout).await?;
        self.apply_handshake_response(response)
    }

    /// ESTABLISHED → send an outbound `finishing` Session, await the
    /// server's `finished` reply.
    pub async fn send_finishing_session(&self, timeout: Duration) -> Result<Session> {
        self.require_state(&[SessionState::Established])?;
        self.channel.set_state(SessionState::Finishing);
        let mut finishing = Session::new(SessionState::Finishing);
        finishing.shared.id = self.channel.session_id();
        let response = self.send_session_waiting_for_ack(finishing, timeout).await?;
        if response.state == SessionState::Finished {
            self.channel.set_state(SessionState::Finished);
        }
        Ok(response)
    }

    /// Drive NEW → ESTABLISHED by chaining `start_new_session`,
    /// `negotiate_session` (only if the server asks to negotiate), and
    /// `authenticate_session`. `identity` is this client's own node address.
    pub async fn establish_session(
        &self,
        uri: &str,
        identity: &Node,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<()> {
        self.channel.install().await;
        self.channel.open(uri).await?;

        let mut response = self.start_new_session(identity, timeout).await?;

        if response.state == SessionState::Negotiating {
            response = self.negotiate_session(None, None, timeout).await?;
        }

        if response.state != SessionState::Authenticating {
            return Err(LimeError::invalid_state(format!(
                "unexpected session state before authenticating: {:?}",
                response.state
            )));
        }

        let authentication = match credentials {
            Credentials::Guest => Authentication::Guest,
            Credentials::Plain { password } => Authentication::Plain { password },
            Credentials::Transport => Authentication::Transport,
        };
        let established = self
            .authenticate_session(identity, authentication, None, timeout)
            .await?;

        if established.state == SessionState::Established {
            info!(session_id = ?self.channel.session_id(), "session established");
            Ok(())
        } else {
            Err(LimeError::invalid_state(format!(
                "unexpected session state after authenticating: {:?}",
                established.state
            )))
        }
    }

    /// Send a `finishing` session envelope, wait for the server's `finished`
    /// acknowledgement (best-effort), then close the transport regardless.
    pub async fn finish_session(&self, timeout: Duration) -> Result<()> {
        let finishing_result = self.send_finishing_session(timeout).await;
        self.channel.close().await?;
        finishing_result.map(|_| ())
    }

    /// Apply a just-received session response: echo its `id`, remember the
    /// server's node, and either transition to its state or, for `failed`,
    /// surface the reason as an error.
    fn apply_handshake_response(&self, response: Session) -> Result<Session> {
        if let Some(id) = &response.shared.id {
            self.channel.set_session_id(Some(id.clone()));
        }
        if response.shared.from.is_some() {
            self.channel.set_remote_node(response.shared.from.clone());
        }

        match response.state {
            SessionState::Failed => {
                self.channel.set_state(SessionState::Failed);
                let reason = response
                    .reason
                    .clone()
                    .map(|r| r.description)
                    .unwrap_or_else(|| "session failed".to_string());
                Err(LimeError::invalid_state(reason))
            }
            other => {
                self.channel.set_state(other);
                *self.last_response.lock().unwrap() = Some(response.clone());
                Ok(response)
            }
        }
    }

    /// Queue a one-shot session listener and return the receiving end,
    /// without waiting on it. Callers enqueue before triggering whatever
    /// action (`send_session`) may provoke the response, so the listener is
    /// never dispatched-and-dropped before anyone is waiting for it.
    fn enqueue_session_wait(&self) -> oneshot::Receiver<Session> {
        let (tx, rx) = oneshot::channel();
        self.channel
            .enqueue_session_listener(Box::new(move |session| {
                let _ = tx.send(session);
            }));
        rx
    }

    async fn await_session(rx: oneshot::Receiver<Session>, timeout: Duration) -> Result<Session> {
        rx.with_timeout(timeout)
            .await
            .map_err(|_| LimeError::Timeout("session envelope".to_string()))?
            .map_err(|_| LimeError::invalid_state("channel closed while awaiting session envelope"))
    }

    async fn send_session_waiting_for_ack(
        &self,
        session: Session,
        timeout: Duration,
    ) -> Result<Session> {
        let rx = self.enqueue_session_wait();
        self.channel.send_session(session).await?;
        Self::await_session(rx, timeout).await
    }
}
